//! Engine log protocol
//!
//! Build and push endpoints answer with a stream of JSON objects, one per
//! line. A build only counts as successful when the last non-empty line of
//! its output starts with [`SUCCESS_MARKER`]; anything else, including an
//! empty log, is a failure.

use serde::{Deserialize, Serialize};

/// Prefix of the line the engine prints after tagging a built image
pub const SUCCESS_MARKER: &str = "Successfully tagged";

/// One object of a build or push log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogEntry {
    /// Build output text, possibly several lines
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    /// Status message (pulls and pushes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Error reported by the engine
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Progress bar text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    /// Layer id the status refers to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl LogEntry {
    /// A build output entry
    pub fn stream(text: impl Into<String>) -> Self {
        Self {
            stream: Some(text.into()),
            ..Default::default()
        }
    }

    /// A status entry
    pub fn status(text: impl Into<String>) -> Self {
        Self {
            status: Some(text.into()),
            ..Default::default()
        }
    }

    /// An error entry
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Human readable text of the entry, if any
    pub fn text(&self) -> Option<String> {
        if let Some(stream) = &self.stream {
            let trimmed = stream.trim_end();
            return (!trimmed.is_empty()).then(|| trimmed.to_string());
        }
        let status = self.status.as_deref()?;
        let mut text = match &self.id {
            Some(id) => format!("{id}: {status}"),
            None => status.to_string(),
        };
        if let Some(progress) = &self.progress {
            text.push(' ');
            text.push_str(progress);
        }
        Some(text)
    }
}

/// Tracks the output of one build
#[derive(Debug, Clone, Default)]
pub struct BuildTranscript {
    last_line: Option<String>,
    errors: Vec<String>,
}

impl BuildTranscript {
    /// Fold one log entry into the transcript
    pub fn observe(&mut self, entry: &LogEntry) {
        if let Some(stream) = &entry.stream {
            if let Some(line) = stream.lines().rev().map(str::trim).find(|l| !l.is_empty()) {
                self.last_line = Some(line.to_string());
            }
        }
        if let Some(error) = &entry.error {
            self.errors.push(error.clone());
        }
    }

    /// Last non-empty output line seen so far
    pub fn last_line(&self) -> Option<&str> {
        self.last_line.as_deref()
    }

    /// Errors reported during the build
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Whether the build ended with the success marker
    pub fn succeeded(&self) -> bool {
        self.last_line
            .as_deref()
            .is_some_and(|line| line.starts_with(SUCCESS_MARKER))
    }
}
