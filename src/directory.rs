//! Conversation directory
//!
//! The summary list shown in the sidebar plus the active selection. It is
//! reconciled by full re-fetch only; the backend owns titles and counts.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Lightweight projection of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub created_at: String,
    #[serde(default)]
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ConversationSummary {
    pub fn new(id: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: created_at.into(),
            message_count: 0,
            title: None,
        }
    }

    /// Parsed creation time; the backend emits either RFC 3339 or naive
    /// ISO-8601 timestamps
    pub fn created(&self) -> Option<NaiveDateTime> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.naive_utc())
            .or_else(|_| NaiveDateTime::parse_from_str(&self.created_at, "%Y-%m-%dT%H:%M:%S%.f"))
            .ok()
    }
}

/// Selection after a removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub removed: bool,
    /// The active selection changed as a result
    pub selection_changed: bool,
    pub active: Option<String>,
}

/// Summary list ordered most-recently-created first, and the active id
#[derive(Debug, Clone, Default)]
pub struct ConversationDirectory {
    entries: Vec<ConversationSummary>,
    active: Option<String>,
}

impl ConversationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> &[ConversationSummary] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&ConversationSummary> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Select a conversation; returns false if the id is unknown
    pub fn select(&mut self, id: &str) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.active = Some(id.to_string());
        true
    }

    pub fn clear_selection(&mut self) {
        self.active = None;
    }

    /// Record a newly created conversation at the front
    pub fn insert_front(&mut self, summary: ConversationSummary) {
        self.entries.retain(|entry| entry.id != summary.id);
        self.entries.insert(0, summary);
    }

    /// Delete an entry; deleting the active one selects the new front entry
    /// or clears the selection
    pub fn remove(&mut self, id: &str) -> Removal {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        let removed = self.entries.len() != before;

        let selection_changed = self.active.as_deref() == Some(id);
        if selection_changed {
            self.active = self.entries.first().map(|entry| entry.id.clone());
        }

        Removal {
            removed,
            selection_changed,
            active: self.active.clone(),
        }
    }

    /// Replace every entry with a fresh listing from the backend.
    ///
    /// Returns true if the active selection had to move because the active
    /// conversation is no longer listed.
    pub fn replace_all(&mut self, summaries: Vec<ConversationSummary>) -> bool {
        self.entries = summaries;
        // Stable: equal or unparsable timestamps keep server order
        self.entries
            .sort_by_key(|entry| std::cmp::Reverse(entry.created()));

        match self.active.as_deref() {
            Some(active) if !self.contains(active) => {
                self.active = self.entries.first().map(|entry| entry.id.clone());
                true
            }
            _ => false,
        }
    }
}
