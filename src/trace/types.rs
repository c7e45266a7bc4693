//! Thought-trace record definitions.
//!
//! [`NewTrace`] is what a client submits; [`ThoughtTrace`] is what the store holds,
//! with the server-assigned timestamp attached.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// A client submission. Every field is required; `files_changed` may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTrace {
    pub error_signature: String,
    pub summary: String,
    pub files_changed: Vec<String>,
    pub author: String,
}

/// A stored thought trace. Its position in the store is its identifier and matches
/// the position of its vector in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThoughtTrace {
    pub error_signature: String,
    pub summary: String,
    pub files_changed: Vec<String>,
    pub author: String,
    /// ISO 8601 UTC timestamp assigned when the trace was saved.
    pub timestamp: String,
}

impl NewTrace {
    /// Stamp the submission with the current UTC time.
    pub fn into_trace(self) -> ThoughtTrace {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        self.into_trace_at(timestamp)
    }

    pub fn into_trace_at(self, timestamp: String) -> ThoughtTrace {
        ThoughtTrace {
            error_signature: self.error_signature,
            summary: self.summary,
            files_changed: self.files_changed,
            author: self.author,
            timestamp,
        }
    }

    pub fn embedding_text(&self) -> String {
        trace_text(&self.error_signature, &self.summary)
    }
}

impl ThoughtTrace {
    pub fn embedding_text(&self) -> String {
        trace_text(&self.error_signature, &self.summary)
    }

    /// Case-insensitive containment against the error signature and summary.
    /// `needle` must already be lowercased.
    pub(crate) fn matches_lowercase(&self, needle: &str) -> bool {
        self.error_signature.to_lowercase().contains(needle)
            || self.summary.to_lowercase().contains(needle)
    }
}

/// The text embedded for a trace. Vectors already on disk were produced with this
/// exact joining, so it must not change.
pub fn trace_text(error_signature: &str, summary: &str) -> String {
    format!("{error_signature}. {summary}")
}
