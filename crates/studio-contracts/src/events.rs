use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::now_utc_iso;

pub type EventPayload = Map<String, Value>;

const RESERVED_KEYS: [&str; 3] = ["type", "session_id", "ts"];

/// Kinds of entries written to the session journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    SessionStarted,
    GenerationStarted,
    GenerationSucceeded,
    GenerationFailed,
    TranslationFallback,
    AnalysisFallback,
    HistoryAdded,
    HistoryRemoved,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionStarted => "session_started",
            Self::GenerationStarted => "generation_started",
            Self::GenerationSucceeded => "generation_succeeded",
            Self::GenerationFailed => "generation_failed",
            Self::TranslationFallback => "translation_fallback",
            Self::AnalysisFallback => "analysis_fallback",
            Self::HistoryAdded => "history_added",
            Self::HistoryRemoved => "history_removed",
        }
    }
}

#[derive(Serialize)]
struct EventLine<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    session_id: &'a str,
    ts: String,
    #[serde(flatten)]
    payload: &'a EventPayload,
}

/// Append-only journal at `<home>/events.jsonl`, one compact object per line.
///
/// Clones share one file handle, opened on the first write.
#[derive(Debug, Clone)]
pub struct EventWriter {
    path: PathBuf,
    session_id: String,
    file: Arc<Mutex<Option<File>>>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            session_id: session_id.into(),
            file: Arc::new(Mutex::new(None)),
        }
    }

    /// Writer tagged with a fresh v4 session id.
    pub fn for_new_session(path: impl Into<PathBuf>) -> Self {
        Self::new(path, uuid::Uuid::new_v4().to_string())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Appends one event. `type`, `session_id` and `ts` always come from the
    /// writer; payload entries with those keys are dropped.
    pub fn emit(&self, kind: EventKind, mut payload: EventPayload) -> anyhow::Result<Value> {
        for key in RESERVED_KEYS {
            if payload.remove(key).is_some() {
                tracing::debug!(key, event = kind.as_str(), "reserved event key dropped");
            }
        }
        let value = serde_json::to_value(EventLine {
            kind: kind.as_str(),
            session_id: &self.session_id,
            ts: now_utc_iso(),
            payload: &payload,
        })?;

        let mut handle = self
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("event journal lock poisoned"))?;
        if handle.is_none() {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .with_context(|| format!("failed to open {}", self.path.display()))?;
            *handle = Some(file);
        }
        if let Some(file) = handle.as_mut() {
            serde_json::to_writer(&mut *file, &value)?;
            file.write_all(b"\n")?;
        }
        Ok(value)
    }

    /// Journal writes never interrupt a studio operation.
    pub fn record(&self, kind: EventKind, payload: EventPayload) {
        if let Err(err) = self.emit(kind, payload) {
            tracing::warn!(event = kind.as_str(), error = %err, "event journal write failed");
        }
    }
}
