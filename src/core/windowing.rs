//! Window management for grouping raw events into investigation windows.
//!
//! A window opens at its first event and covers a fixed duration (6 hours by
//! default). An event whose timestamp lies strictly beyond `start + duration`
//! closes the current window and opens the next one at its own timestamp, so
//! windows are anchored to data rather than to wall-clock boundaries.

use crate::events::RawEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A maximal run of events within one window duration of its first event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBucket {
    /// Timestamp of the first event
    pub start: i64,
    /// Timestamp of the last event
    pub end: i64,
    /// Events in ascending timestamp order
    pub events: Vec<RawEvent>,
}

impl EventBucket {
    /// Create a bucket opened by `event`.
    pub fn new(event: RawEvent) -> Self {
        Self {
            start: event.timestamp,
            end: event.timestamp,
            events: vec![event],
        }
    }

    /// Check if a timestamp still belongs to this bucket.
    pub fn accepts(&self, timestamp: i64, duration_secs: i64) -> bool {
        timestamp <= self.start.saturating_add(duration_secs)
    }

    pub fn add_event(&mut self, event: RawEvent) {
        self.end = self.end.max(event.timestamp);
        self.events.push(event);
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn span_secs(&self) -> i64 {
        self.end.saturating_sub(self.start)
    }

    /// Set of event timestamps, used for duplicate detection.
    pub fn timestamps(&self) -> HashSet<i64> {
        self.events.iter().map(|e| e.timestamp).collect()
    }

    /// Whether any event of this bucket has a timestamp in `known`.
    pub fn overlaps(&self, known: &HashSet<i64>) -> bool {
        self.events.iter().any(|e| known.contains(&e.timestamp))
    }
}

/// Streaming window builder. Events must arrive in ascending timestamp order.
pub struct WindowManager {
    /// Duration of each window
    window_duration_secs: i64,
    /// Current window being filled
    current_window: Option<EventBucket>,
    /// Completed windows ready for processing
    completed_windows: Vec<EventBucket>,
}

impl WindowManager {
    pub fn new(window_duration_secs: u64) -> Self {
        Self {
            window_duration_secs: i64::try_from(window_duration_secs).unwrap_or(i64::MAX),
            current_window: None,
            completed_windows: Vec::new(),
        }
    }

    /// Process an incoming event, completing the current window if the event
    /// lies beyond it.
    pub fn process_event(&mut self, event: RawEvent) {
        match self.current_window {
            Some(ref mut window) if window.accepts(event.timestamp, self.window_duration_secs) => {
                window.add_event(event);
            }
            _ => {
                self.complete_current_window();
                self.current_window = Some(EventBucket::new(event));
            }
        }
    }

    /// Force completion of the current window (end of input).
    pub fn flush(&mut self) {
        self.complete_current_window();
    }

    /// Get and remove completed windows.
    pub fn take_completed_windows(&mut self) -> Vec<EventBucket> {
        std::mem::take(&mut self.completed_windows)
    }

    pub fn has_completed_windows(&self) -> bool {
        !self.completed_windows.is_empty()
    }

    pub fn completed_window_count(&self) -> usize {
        self.completed_windows.len()
    }

    fn complete_current_window(&mut self) {
        if let Some(window) = self.current_window.take() {
            self.completed_windows.push(window);
        }
    }
}

/// Groups a whole event sequence into buckets.
#[derive(Debug, Clone, Copy)]
pub struct EventWindower {
    window_duration_secs: u64,
}

impl EventWindower {
    pub fn new(window_duration: std::time::Duration) -> Self {
        Self {
            window_duration_secs: window_duration.as_secs(),
        }
    }

    pub fn window_duration_secs(&self) -> u64 {
        self.window_duration_secs
    }

    /// Sort ascending (stable for equal timestamps), then scan once.
    pub fn group(&self, mut events: Vec<RawEvent>) -> Vec<EventBucket> {
        events.sort_by_key(|e| e.timestamp);

        let mut manager = WindowManager::new(self.window_duration_secs);
        for event in events {
            manager.process_event(event);
        }
        manager.flush();
        manager.take_completed_windows()
    }
}

impl Default for EventWindower {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(
            crate::config::DEFAULT_WINDOW_HOURS * 3600,
        ))
    }
}
