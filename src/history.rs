//! Dual history store
//!
//! Two independent append-only logs: the image thread drives image-to-image
//! continuation, the narrative thread drives choice generation. Entries are
//! immutable once appended; `reset` is the only way anything is removed.

use std::sync::Arc;

/// Author of a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    User,
    Model,
}

impl Actor {
    /// Role name on the wire
    pub fn as_str(self) -> &'static str {
        match self {
            Actor::User => "user",
            Actor::Model => "model",
        }
    }
}

/// One piece of an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    Image { data: Arc<[u8]>, mime_type: String },
}

impl Part {
    pub fn text(s: impl Into<String>) -> Self {
        Part::Text(s.into())
    }

    pub fn image(data: impl Into<Arc<[u8]>>, mime_type: impl Into<String>) -> Self {
        Part::Image {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(text) => Some(text),
            Part::Image { .. } => None,
        }
    }
}

/// A single turn in either thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub role: Actor,
    pub parts: Vec<Part>,
}

impl HistoryEntry {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Actor::User,
            parts: vec![Part::text(text)],
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: Actor::Model,
            parts: vec![Part::text(text)],
        }
    }

    /// Concatenated text of all text parts
    #[allow(dead_code)] // Used by tests
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[allow(dead_code)] // Used by tests
    pub fn has_image(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::Image { .. }))
    }
}

/// Which log an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Thread {
    Image,
    Narrative,
}

/// Owned, immutable copy of a thread at a point in time
///
/// Image bytes are shared, so taking a snapshot never copies pixel data.
pub type Snapshot = Vec<HistoryEntry>;

/// The two logs
#[derive(Debug, Default)]
pub struct HistoryStore {
    image: Vec<HistoryEntry>,
    narrative: Vec<HistoryEntry>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, thread: Thread) -> Snapshot {
        self.entries(thread).to_vec()
    }

    /// Append entries to the end of a thread
    pub fn commit(&mut self, thread: Thread, entries: impl IntoIterator<Item = HistoryEntry>) {
        let log = match thread {
            Thread::Image => &mut self.image,
            Thread::Narrative => &mut self.narrative,
        };
        log.extend(entries);
    }

    pub fn len(&self, thread: Thread) -> usize {
        self.entries(thread).len()
    }

    pub fn entries(&self, thread: Thread) -> &[HistoryEntry] {
        match thread {
            Thread::Image => &self.image,
            Thread::Narrative => &self.narrative,
        }
    }

    pub fn reset(&mut self) {
        self.image.clear();
        self.narrative.clear();
    }
}

/// Session-level flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Set permanently by the first successful turn
    pub turn_started: bool,
    /// True for the whole duration of one turn or refinement
    pub in_flight: bool,
}
