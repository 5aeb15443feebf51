use crate::torrent::{Item, TorrentState};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Started,
    Finished,
}

impl TransitionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionKind::Started => "started",
            TransitionKind::Finished => "finished",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionEvent {
    pub kind: TransitionKind,
    pub id: String,
    pub name: String,
}

impl TransitionEvent {
    pub fn message(&self) -> String {
        match self.kind {
            TransitionKind::Started => format!("<--Downloading-->\n{}", self.name),
            TransitionKind::Finished => format!("<--Downloaded-->\n{}", self.name),
        }
    }
}

impl fmt::Display for TransitionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

#[derive(Debug, Default)]
pub struct StateTracker {
    // hash -> name; torrents that vanish mid-download are never evicted
    watching: HashMap<String, String>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diff(&mut self, snapshot: &[Item]) -> Vec<TransitionEvent> {
        let mut events = Vec::new();

        for item in snapshot {
            let kind = match item.state {
                TorrentState::Downloading if !self.watching.contains_key(&item.id) => {
                    self.watching.insert(item.id.clone(), item.name.clone());
                    TransitionKind::Started
                }
                TorrentState::Uploading if self.watching.remove(&item.id).is_some() => {
                    TransitionKind::Finished
                }
                _ => continue,
            };

            debug!("Torrent {} {}: {}", item.id, kind.as_str(), item.name);
            events.push(TransitionEvent {
                kind,
                id: item.id.clone(),
                name: item.name.clone(),
            });
        }

        events
    }

    #[cfg(test)]
    pub fn is_watching(&self, id: &str) -> bool {
        self.watching.contains_key(id)
    }

    pub fn watched_count(&self) -> usize {
        self.watching.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(events: &[TransitionEvent]) -> Vec<String> {
        events.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn test_downloading_then_uploading() {
        let mut tracker = StateTracker::new();
        let downloading = [Item::new("a", "Movie", TorrentState::Downloading)];
        let uploading = [Item::new("a", "Movie", TorrentState::Uploading)];

        assert_eq!(labels(&tracker.diff(&downloading)), vec!["started:a"]);
        assert!(tracker.diff(&downloading).is_empty());
        assert_eq!(labels(&tracker.diff(&uploading)), vec!["finished:a"]);
        assert!(!tracker.is_watching("a"));
        assert!(tracker.diff(&uploading).is_empty());
    }

    #[test]
    fn test_untracked_uploading_is_ignored() {
        let mut tracker = StateTracker::new();
        let events = tracker.diff(&[Item::new("seed", "Seeding", TorrentState::Uploading)]);
        assert!(events.is_empty());
        assert_eq!(tracker.watched_count(), 0);
    }

    #[test]
    fn test_undefined_state_is_ignored() {
        let mut tracker = StateTracker::new();
        let events = tracker.diff(&[Item::new("b", "Paused", TorrentState::Undefined)]);
        assert!(events.is_empty());
        assert!(!tracker.is_watching("b"));

        tracker.diff(&[Item::new("c", "Tracked", TorrentState::Downloading)]);
        let events = tracker.diff(&[Item::new("c", "Tracked", TorrentState::Undefined)]);
        assert!(events.is_empty());
        assert!(tracker.is_watching("c"));
    }

    #[test]
    fn test_events_follow_snapshot_order() {
        let mut tracker = StateTracker::new();
        tracker.diff(&[Item::new("x", "X", TorrentState::Downloading)]);

        let events = tracker.diff(&[
            Item::new("y", "Y", TorrentState::Downloading),
            Item::new("x", "X", TorrentState::Uploading),
            Item::new("z", "Z", TorrentState::Downloading),
        ]);
        assert_eq!(labels(&events), vec!["started:y", "finished:x", "started:z"]);
    }

    #[test]
    fn test_duplicate_id_in_one_snapshot_emits_once() {
        let mut tracker = StateTracker::new();
        let events = tracker.diff(&[
            Item::new("a", "A", TorrentState::Downloading),
            Item::new("a", "A", TorrentState::Downloading),
        ]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_vanished_torrent_stays_watched() {
        let mut tracker = StateTracker::new();
        tracker.diff(&[Item::new("gone", "Deleted", TorrentState::Downloading)]);
        assert!(tracker.diff(&[]).is_empty());
        assert!(tracker.is_watching("gone"));
    }

    #[test]
    fn test_messages() {
        let started = TransitionEvent {
            kind: TransitionKind::Started,
            id: "a".to_string(),
            name: "Movie".to_string(),
        };
        assert_eq!(started.message(), "<--Downloading-->\nMovie");

        let finished = TransitionEvent {
            kind: TransitionKind::Finished,
            ..started
        };
        assert_eq!(finished.message(), "<--Downloaded-->\nMovie");
    }
}
