//! Transcript persistence using JSONL files
//!
//! The first line holds session metadata; every following line is one
//! message. Appends are flushed immediately, bulk replacements rewrite the
//! whole file through a temp file and an atomic rename.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use recall_protocol::Message;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::ContextError;

const TRANSCRIPT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TranscriptLine {
    /// Session metadata (always first line)
    SessionMeta(SessionMeta),
    Message(TranscriptMessage),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TranscriptMessage {
    message: Message,
    timestamp: DateTime<Utc>,
}

/// Session metadata stored as first line of a transcript file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    TRANSCRIPT_VERSION
}

impl SessionMeta {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            created_at: Utc::now(),
            version: TRANSCRIPT_VERSION,
        }
    }
}

/// Open transcript file for one session
#[derive(Debug)]
pub struct TranscriptFile {
    file: File,
    path: PathBuf,
    meta: SessionMeta,
}

impl TranscriptFile {
    /// Create a new, empty transcript, replacing any file at `path`.
    pub fn create(path: impl Into<PathBuf>, session_id: &str) -> Result<Self, ContextError> {
        let path = path.into();
        let meta = SessionMeta::new(session_id);
        write_atomically(&path, &meta, &[])?;
        let file = OpenOptions::new().append(true).open(&path)?;
        Ok(Self { file, path, meta })
    }

    /// Open the transcript at `path`, returning its messages when it already
    /// held a session, or create it when it does not exist.
    pub fn open_or_create(
        path: impl Into<PathBuf>,
        session_id: &str,
    ) -> Result<(Self, Option<Vec<Message>>), ContextError> {
        let path = path.into();
        let has_content = fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);
        if !has_content {
            return Ok((Self::create(path, session_id)?, None));
        }

        let (meta, messages) = Self::load(&path)?;
        if meta.session_id != session_id {
            tracing::warn!(
                path = %path.display(),
                stored = %meta.session_id,
                requested = %session_id,
                "transcript belongs to a different session id"
            );
        }

        let file = OpenOptions::new().append(true).open(&path)?;
        Ok((Self { file, path, meta }, Some(messages)))
    }

    /// Read metadata and messages from a transcript file
    pub fn load(path: &Path) -> Result<(SessionMeta, Vec<Message>), ContextError> {
        let reader = BufReader::new(File::open(path)?);
        let mut meta = None;
        let mut messages = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let corrupt = |reason: String| ContextError::CorruptTranscript {
                path: path.to_path_buf(),
                line: idx + 1,
                reason,
            };

            match serde_json::from_str::<TranscriptLine>(&line) {
                Ok(TranscriptLine::SessionMeta(m)) if meta.is_none() => meta = Some(m),
                Ok(TranscriptLine::SessionMeta(_)) => {
                    return Err(corrupt("duplicate session metadata".to_string()))
                }
                Ok(TranscriptLine::Message(_)) if meta.is_none() => {
                    return Err(corrupt("message before session metadata".to_string()))
                }
                Ok(TranscriptLine::Message(m)) => messages.push(m.message),
                Err(e) => return Err(corrupt(e.to_string())),
            }
        }

        let meta = meta.ok_or_else(|| ContextError::CorruptTranscript {
            path: path.to_path_buf(),
            line: 0,
            reason: "missing session metadata".to_string(),
        })?;
        Ok((meta, messages))
    }

    /// Append one message (immediate flush)
    pub fn append(&mut self, message: &Message) -> std::io::Result<()> {
        let line = encode(&TranscriptLine::Message(TranscriptMessage {
            message: message.clone(),
            timestamp: Utc::now(),
        }))?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()
    }

    /// Replace the file contents with `messages`
    pub fn rewrite(&mut self, messages: &[Message]) -> std::io::Result<()> {
        write_atomically(&self.path, &self.meta, messages)?;
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        Ok(())
    }

    /// Default directory for transcripts
    pub fn sessions_dir() -> Option<PathBuf> {
        dirs::data_dir()
            .or_else(dirs::home_dir)
            .map(|dir| dir.join("recall").join("sessions"))
    }

    /// Transcript path for a session inside `dir`
    pub fn path_for(dir: &Path, session_id: &str) -> PathBuf {
        dir.join(format!("{session_id}.jsonl"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta(&self) -> &SessionMeta {
        &self.meta
    }
}

fn encode(line: &TranscriptLine) -> std::io::Result<String> {
    serde_json::to_string(line).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn write_atomically(path: &Path, meta: &SessionMeta, messages: &[Message]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let mut temp = NamedTempFile::new_in(&dir)?;
    writeln!(temp, "{}", encode(&TranscriptLine::SessionMeta(meta.clone()))?)?;
    let now = Utc::now();
    for message in messages {
        let line = encode(&TranscriptLine::Message(TranscriptMessage {
            message: message.clone(),
            timestamp: now,
        }))?;
        writeln!(temp, "{}", line)?;
    }
    temp.flush()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
