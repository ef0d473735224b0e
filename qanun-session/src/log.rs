//! Append-only, per-session conversation log.
//!
//! Each session owns one `<session-id>.jsonl` file in the log directory.
//! The first record is always `created`; later records are appended and
//! never rewritten, so a crash can at worst leave one torn final line.
//!
//! ```text
//! {"type":"created","owner":"…","created":"2026-01-02T10:00:00Z"}
//! {"type":"message","role":"user","text":"…","time":"…"}
//! {"type":"message","role":"bot","text":"…","time":"…"}
//! {"type":"cleared","time":"…"}
//! ```

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::model::{Conversation, Message, OwnerId, SessionId};

const LOG_EXTENSION: &str = "jsonl";

/// One line of a session log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogRecord {
    /// The session was created for `owner`.
    Created { owner: OwnerId, created: DateTime<Utc> },
    /// A message was appended.
    Message(Message),
    /// All messages were removed; the session itself stays.
    Cleared { time: DateTime<Utc> },
}

/// Directory of per-session JSONL logs.
#[derive(Debug, Clone)]
pub struct ConversationLog {
    dir: PathBuf,
}

impl ConversationLog {
    /// Use `dir` as the log directory, creating it if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// The log directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.{LOG_EXTENSION}"))
    }

    /// Append `records` to the session's log in a single write.
    ///
    /// A torn final line left by an earlier crash is terminated first so the
    /// new records start on a line of their own.
    pub async fn append(&self, session_id: &str, records: &[LogRecord]) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(self.path(session_id))
            .await?;

        let mut buf = Vec::new();
        if !ends_with_newline(&mut file).await? {
            warn!(session_id, "terminating torn final line before append");
            buf.push(b'\n');
        }
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }

        file.write_all(&buf).await?;
        file.flush().await?;
        debug!(session_id, records = records.len(), "session log appended");
        Ok(())
    }

    /// Rebuild every session from its log.
    ///
    /// Files whose name is not a UUID or whose first record is not
    /// `created` are skipped with a warning, as are unparsable lines.
    pub async fn replay(&self) -> Result<Vec<(SessionId, Conversation)>> {
        let mut sessions = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            let Some(session_id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .filter(|s| Uuid::parse_str(s).is_ok())
                .map(str::to_string)
            else {
                warn!(path = %path.display(), "ignoring log file with a non-session name");
                continue;
            };

            let content = fs::read_to_string(&path).await?;
            if let Some(conversation) = replay_records(&session_id, &content) {
                sessions.push((session_id, conversation));
            }
        }
        Ok(sessions)
    }
}

/// True for an empty file or one whose last byte is `\n`.
async fn ends_with_newline(file: &mut File) -> Result<bool> {
    if file.metadata().await?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] == b'\n')
}

fn replay_records(session_id: &str, content: &str) -> Option<Conversation> {
    let mut conversation: Option<Conversation> = None;
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = match serde_json::from_str::<LogRecord>(line) {
            Ok(record) => record,
            Err(e) => {
                warn!(session_id, line = line_no + 1, error = %e, "skipping unreadable log line");
                continue;
            }
        };
        let Some(current) = conversation.as_mut() else {
            if let LogRecord::Created { owner, created } = record {
                conversation = Some(Conversation { owner, created, messages: Vec::new() });
                continue;
            }
            warn!(session_id, "session log does not start with a created record");
            return None;
        };
        match record {
            LogRecord::Created { .. } => {
                warn!(session_id, line = line_no + 1, "ignoring repeated created record");
            }
            LogRecord::Message(message) => current.messages.push(message),
            LogRecord::Cleared { .. } => current.messages.clear(),
        }
    }
    conversation
}
