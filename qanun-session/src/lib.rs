//! # qanun-session
//!
//! Per-visitor conversation history for the Qanun legal assistant.
//!
//! A visitor is identified by an opaque owner id and may hold many
//! sessions. Each session records question/answer exchanges; its owner is
//! fixed at creation and only that owner can read it back.
//!
//! [`ConversationStore::open`] persists every mutation to a per-session
//! append-only JSONL file (see [`log`]) and replays those files on start.
//! [`ConversationStore::in_memory`] keeps everything in memory.
//!
//! ```rust,ignore
//! use qanun_session::ConversationStore;
//!
//! let store = ConversationStore::open("./conversations").await?;
//! let (session_id, _) = store.resolve_session(cookie.as_deref(), &user_id).await?;
//! store.append_exchange(&session_id, question, &answer).await?;
//! let history = store.history(&user_id).await;
//! ```

pub mod error;
pub mod log;
pub mod model;
pub mod store;

pub use error::{Result, SessionError};
pub use log::{ConversationLog, LogRecord};
pub use model::{Conversation, EMPTY_TITLE, HistoryEntry, Message, OwnerId, Role, SessionId, title_for};
pub use store::ConversationStore;
