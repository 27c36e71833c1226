//! Room state
//!
//! Who is present, who is alone, and a bounded log of recent messages.
//! Every access goes through one coarse lock; callers are the console,
//! the heartbeat and the agent proxies.

use chrono::{DateTime, Local};
use indexmap::IndexSet;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Where a message was addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// Everyone present
    Room,
    /// A single persona
    Persona(String),
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Room => write!(f, "room"),
            Recipient::Persona(name) => write!(f, "{}", name),
        }
    }
}

/// One entry in the room history
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub timestamp: DateTime<Local>,
    pub sender: String,
    pub content: String,
    pub recipient: Recipient,
}

impl MessageRecord {
    pub fn time(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }
}

#[derive(Debug)]
pub struct RoomState {
    present: IndexSet<String>,
    alone: IndexSet<String>,
    history: VecDeque<MessageRecord>,
    history_limit: usize,
    started_at: Instant,
}

impl RoomState {
    pub fn new(history_limit: usize) -> Self {
        Self {
            present: IndexSet::new(),
            alone: IndexSet::new(),
            history: VecDeque::with_capacity(history_limit + 1),
            history_limit,
            started_at: Instant::now(),
        }
    }

    fn record(&mut self, sender: &str, content: &str, recipient: Recipient) {
        self.history.push_back(MessageRecord {
            timestamp: Local::now(),
            sender: sender.to_string(),
            content: content.to_string(),
            recipient,
        });
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }

    fn mark_present(&mut self, name: &str) -> bool {
        self.alone.shift_remove(name);
        self.present.insert(name.to_string())
    }

    fn mark_alone(&mut self, name: &str) -> bool {
        self.present.shift_remove(name);
        self.alone.insert(name.to_string())
    }

    fn forget(&mut self, name: &str) {
        self.present.shift_remove(name);
        self.alone.shift_remove(name);
    }
}

/// Shared, lock-protected handle to the room state
#[derive(Debug, Clone)]
pub struct SharedRoom {
    inner: Arc<Mutex<RoomState>>,
}

impl SharedRoom {
    pub fn new(history_limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RoomState::new(history_limit))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RoomState> {
        // A panic while holding the lock cannot leave the state half-written
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a message, evicting the oldest entries past the limit
    pub fn record(&self, sender: &str, content: &str, recipient: Recipient) {
        self.lock().record(sender, content, recipient);
    }

    /// Run `f` with the state locked, for transitions that must stay atomic
    /// with the caller's own bookkeeping
    pub fn with_lock<T>(&self, f: impl FnOnce(&mut RoomPresence<'_>) -> T) -> T {
        let mut guard = self.lock();
        let mut presence = RoomPresence { state: &mut *guard };
        f(&mut presence)
    }

    pub fn present_list(&self) -> Vec<String> {
        self.lock().present.iter().cloned().collect()
    }

    pub fn alone_list(&self) -> Vec<String> {
        self.lock().alone.iter().cloned().collect()
    }

    /// Time since the room opened, as HH:MM:SS
    pub fn elapsed(&self) -> String {
        format_elapsed(self.lock().started_at.elapsed())
    }

    /// The last `n` messages, oldest first
    pub fn recent(&self, n: usize) -> Vec<MessageRecord> {
        let state = self.lock();
        let skip = state.history.len().saturating_sub(n);
        state.history.iter().skip(skip).cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.lock().history.len()
    }
}

/// Presence operations available inside `SharedRoom::with_lock`
pub struct RoomPresence<'a> {
    state: &'a mut RoomState,
}

impl RoomPresence<'_> {
    /// Move a persona into the room. Returns false if already present.
    pub fn mark_present(&mut self, name: &str) -> bool {
        self.state.mark_present(name)
    }

    /// Move a persona into solitude. Returns false if already alone.
    pub fn mark_alone(&mut self, name: &str) -> bool {
        self.state.mark_alone(name)
    }

    /// Drop a persona from both sides of the partition
    pub fn forget(&mut self, name: &str) {
        self.state.forget(name)
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (hours, rem) = (secs / 3600, secs % 3600);
    let (minutes, seconds) = (rem / 60, rem % 60);
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_record_and_recent() {
        let room = SharedRoom::new(50);
        room.record("Alice", "hello", Recipient::Room);
        room.record("Bob", "hi Alice", Recipient::Persona("Alice".to_string()));

        let recent = room.recent(5);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].sender, "Alice");
        assert_eq!(recent[0].recipient.to_string(), "room");
        assert_eq!(recent[1].recipient.to_string(), "Alice");
    }

    #[test]
    fn test_history_evicts_oldest() {
        let room = SharedRoom::new(50);
        for i in 0..51 {
            room.record("Alice", &format!("message {}", i), Recipient::Room);
        }

        assert_eq!(room.history_len(), 50);
        let all = room.recent(100);
        assert_eq!(all.first().unwrap().content, "message 1");
        assert_eq!(all.last().unwrap().content, "message 50");
        for (offset, record) in all.iter().enumerate() {
            assert_eq!(record.content, format!("message {}", offset + 1));
        }
    }

    #[test]
    fn test_recent_takes_tail() {
        let room = SharedRoom::new(50);
        for i in 0..10 {
            room.record("Bob", &i.to_string(), Recipient::Room);
        }
        let tail: Vec<String> = room.recent(3).into_iter().map(|r| r.content).collect();
        assert_eq!(tail, vec!["7", "8", "9"]);
    }

    #[test]
    fn test_presence_partition() {
        let room = SharedRoom::new(50);
        room.with_lock(|p| {
            assert!(p.mark_present("Alice"));
            assert!(p.mark_present("Bob"));
            assert!(!p.mark_present("Bob"));
        });

        room.with_lock(|p| {
            assert!(p.mark_alone("Bob"));
            assert!(!p.mark_alone("Bob"));
        });
        assert_eq!(room.present_list(), vec!["Alice"]);
        assert_eq!(room.alone_list(), vec!["Bob"]);

        assert!(room.with_lock(|p| p.mark_present("Bob")));
        assert_eq!(room.present_list(), vec!["Alice", "Bob"]);
        assert!(room.alone_list().is_empty());

        room.with_lock(|p| {
            p.mark_alone("Alice");
            p.forget("Alice");
            p.forget("Bob");
        });
        assert!(room.present_list().is_empty());
        assert!(room.alone_list().is_empty());
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let room = SharedRoom::new(1000);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let room = room.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        room.record(&format!("t{}", t), &i.to_string(), Recipient::Room);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(room.history_len(), 800);
    }

    #[test]
    fn test_concurrent_records_respect_cap() {
        let room = SharedRoom::new(50);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let room = room.clone();
                thread::spawn(move || {
                    for i in 0..100 {
                        room.record(&format!("t{}", t), &i.to_string(), Recipient::Room);
                        assert!(room.history_len() <= 50);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(room.history_len(), 50);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_elapsed(Duration::from_secs(3725)), "01:02:05");
        assert_eq!(format_elapsed(Duration::from_secs(90_000)), "25:00:00");
    }

    #[test]
    fn test_elapsed_starts_at_zero() {
        let room = SharedRoom::new(50);
        assert_eq!(room.elapsed(), "00:00:00");
    }
}
