use qanun_server::{ServerConfig, init_tracing, run_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;
    init_tracing(config.log_format)?;

    run_server(config).await
}
