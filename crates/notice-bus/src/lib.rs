//! Topic-addressed delivery of user-visible notices ("toasts").
//!
//! Each page publishes under its own topic. Live subscribers receive notices
//! over a broadcast channel; a short per-topic history lets views that mount
//! late (or tests) read what was shown.

use std::collections::{HashMap, VecDeque};
use std::time::SystemTime;

use tokio::sync::broadcast;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 64;
const HISTORY_LIMIT: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    /// Dismissible failure; the operation was abandoned.
    Error,
    /// The credential is missing or expired; the user must sign in again.
    Blocking,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub topic: String,
    pub level: NoticeLevel,
    pub message: String,
    /// Record the notice is about, when there is one.
    pub record_id: Option<String>,
    pub issued_at: SystemTime,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            topic: String::new(),
            level,
            message: message.into(),
            record_id: None,
            issued_at: SystemTime::now(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }

    pub fn blocking(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Blocking, message)
    }

    pub fn for_record(mut self, record_id: impl Into<String>) -> Self {
        self.record_id = Some(record_id.into());
        self
    }
}

pub trait NoticeSink: Send + Sync {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<Notice>;
    /// Delivers `notice` under `topic`. Publishing with no live subscribers is not an error.
    fn publish(&self, topic: &str, notice: Notice);
    /// Most recent notices for `topic`, oldest first.
    fn recent(&self, topic: &str) -> Vec<Notice>;
}

struct Topic {
    sender: broadcast::Sender<Notice>,
    history: VecDeque<Notice>,
}

impl Topic {
    fn new() -> Self {
        Self {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
            history: VecDeque::with_capacity(HISTORY_LIMIT),
        }
    }
}

/// In-process notice bus.
#[derive(Default)]
pub struct LocalNoticeBus {
    topics: parking_lot::RwLock<HashMap<String, Topic>>,
}

impl LocalNoticeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the history of `topic` (the user dismissed everything).
    pub fn dismiss_all(&self, topic: &str) {
        if let Some(entry) = self.topics.write().get_mut(topic) {
            entry.history.clear();
        }
    }
}

impl NoticeSink for LocalNoticeBus {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<Notice> {
        let mut guard = self.topics.write();
        guard
            .entry(topic.to_string())
            .or_insert_with(Topic::new)
            .sender
            .subscribe()
    }

    fn publish(&self, topic: &str, mut notice: Notice) {
        notice.topic = topic.to_string();
        let mut guard = self.topics.write();
        let entry = guard.entry(topic.to_string()).or_insert_with(Topic::new);
        if entry.history.len() == HISTORY_LIMIT {
            entry.history.pop_front();
        }
        entry.history.push_back(notice.clone());
        let delivered = entry.sender.send(notice).unwrap_or(0);
        debug!(target: "notice.bus", topic, delivered, "published notice");
    }

    fn recent(&self, topic: &str) -> Vec<Notice> {
        self.topics
            .read()
            .get(topic)
            .map(|entry| entry.history.iter().cloned().collect())
            .unwrap_or_default()
    }
}
