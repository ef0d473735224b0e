//! `qanun-server` serves the Qanun legal assistant over HTTP: a chat page,
//! a JSON chat endpoint backed by [`qanun_rag::QaPipeline`], and per-visitor
//! conversation history backed by [`qanun_session::ConversationStore`].

pub mod config;
pub mod identity;
pub mod server;
pub mod telemetry;

pub use config::ServerConfig;
pub use identity::Visitor;
pub use server::{ApiError, AppState, app_router, routes, run_server};
pub use telemetry::{LogFormat, init_tracing};
