//! In-memory conversation store backed by the per-session log.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, SessionError};
use crate::log::{ConversationLog, LogRecord};
use crate::model::{Conversation, HistoryEntry, Message, OwnerId, Role, SessionId, title_for};

#[derive(Debug)]
struct SessionSlot {
    owner: OwnerId,
    created: DateTime<Utc>,
    messages: Mutex<Vec<Message>>,
}

impl SessionSlot {
    fn new(owner: OwnerId, created: DateTime<Utc>, messages: Vec<Message>) -> Self {
        Self { owner, created, messages: Mutex::new(messages) }
    }
}

/// Conversations for every visitor, keyed by session id.
///
/// Each session has its own async mutex. It is held across the log append
/// and the in-memory update, so overlapping requests on one session cannot
/// interleave their messages, while different sessions never contend.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<SessionSlot>>>>,
    log: Option<ConversationLog>,
}

impl ConversationStore {
    /// A store that keeps nothing on disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the log directory at `dir` and replay every session in it.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let log = ConversationLog::open(dir).await?;
        let replayed = log.replay().await?;

        let mut sessions = HashMap::with_capacity(replayed.len());
        for (id, conversation) in replayed {
            let Conversation { owner, created, messages } = conversation;
            sessions.insert(id, Arc::new(SessionSlot::new(owner, created, messages)));
        }
        info!(dir = %log.dir().display(), sessions = sessions.len(), "conversation store opened");

        Ok(Self { sessions: Arc::new(RwLock::new(sessions)), log: Some(log) })
    }

    /// Number of known sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session exists yet.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn slot(&self, session_id: &str) -> Option<Arc<SessionSlot>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Start an empty session for `owner` and return its id.
    pub async fn create_session(&self, owner: &str) -> Result<SessionId> {
        let session_id = Uuid::new_v4().to_string();
        let created = Utc::now();
        if let Some(log) = &self.log {
            log.append(&session_id, &[LogRecord::Created { owner: owner.to_string(), created }])
                .await?;
        }
        let slot = Arc::new(SessionSlot::new(owner.to_string(), created, Vec::new()));
        self.sessions.write().await.insert(session_id.clone(), slot);
        debug!(session_id = %session_id, "session created");
        Ok(session_id)
    }

    /// Pick the active session for a request.
    ///
    /// Reuses `requested` when it names a session owned by `owner`;
    /// otherwise a new session is created. The flag is `true` when the
    /// returned session is new.
    pub async fn resolve_session(
        &self,
        requested: Option<&str>,
        owner: &str,
    ) -> Result<(SessionId, bool)> {
        if let Some(id) = requested {
            if let Some(slot) = self.slot(id).await {
                if slot.owner == owner {
                    return Ok((id.to_string(), false));
                }
                debug!(session_id = %id, "session cookie presented by a different visitor");
            }
        }
        Ok((self.create_session(owner).await?, true))
    }

    /// Record a question and its answer as two consecutive messages.
    pub async fn append_exchange(&self, session_id: &str, question: &str, answer: &str) -> Result<()> {
        let slot = self
            .slot(session_id)
            .await
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        let mut messages = slot.messages.lock().await;
        let exchange = [Message::now(Role::User, question), Message::now(Role::Bot, answer)];
        if let Some(log) = &self.log {
            let records = exchange.iter().cloned().map(LogRecord::Message).collect::<Vec<_>>();
            log.append(session_id, &records).await?;
        }
        messages.extend(exchange);
        Ok(())
    }

    /// Remove every message of a session. The session itself stays.
    pub async fn clear(&self, session_id: &str) -> Result<()> {
        let slot = self
            .slot(session_id)
            .await
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        let mut messages = slot.messages.lock().await;
        if let Some(log) = &self.log {
            log.append(session_id, &[LogRecord::Cleared { time: Utc::now() }]).await?;
        }
        messages.clear();
        debug!(session_id, "session cleared");
        Ok(())
    }

    /// The sessions owned by `owner`, newest first.
    pub async fn history(&self, owner: &str) -> Vec<HistoryEntry> {
        let owned: Vec<(SessionId, Arc<SessionSlot>)> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|(_, slot)| slot.owner == owner)
            .map(|(id, slot)| (id.clone(), slot.clone()))
            .collect();

        let mut entries = Vec::with_capacity(owned.len());
        for (id, slot) in owned {
            let title = title_for(&slot.messages.lock().await);
            entries.push(HistoryEntry { id, title, timestamp: slot.created });
        }
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        entries
    }

    /// The full conversation, if it exists and belongs to `owner`.
    pub async fn transcript(&self, session_id: &str, owner: &str) -> Result<Conversation> {
        let slot = self
            .slot(session_id)
            .await
            .filter(|slot| slot.owner == owner)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        let messages = slot.messages.lock().await.clone();
        Ok(Conversation { owner: slot.owner.clone(), created: slot.created, messages })
    }
}
