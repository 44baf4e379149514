//! Sensor event model and event-log ingestion.
//!
//! Events are produced upstream by the home installation and are read-only
//! once recorded. This module only parses producer output into [`RawEvent`]s.

pub mod types;

pub use types::RawEvent;

use std::io::BufRead;

/// Parse a line-delimited event export, skipping lines that do not hold an event.
///
/// Returns the parsed events and the number of skipped lines.
pub fn parse_event_lines<R: BufRead>(reader: R) -> std::io::Result<(Vec<RawEvent>, usize)> {
    let mut events = Vec::new();
    let mut skipped = 0;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RawEvent>(&line) {
            Ok(event) => events.push(event),
            Err(e) => {
                tracing::warn!(line = line_no + 1, error = %e, "skipping malformed event");
                skipped += 1;
            }
        }
    }

    Ok((events, skipped))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_lines_skips_garbage() {
        let input = "{\"timestamp\": 10, \"room\": \"kitchen\"}\nnot json\n\n{\"timestamp\": 20}\n";
        let (events, skipped) = parse_event_lines(input.as_bytes()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(skipped, 1);
        assert_eq!(events[1].room, "");
    }
}
