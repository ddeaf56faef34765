use super::filter::FilterSpec;
use super::record::{LineEvent, LineRecord, LineTag};
use crate::core::display;
use crate::domain::config::DisplayMode;
use std::collections::VecDeque;

/// Reassembles decoded text into lines and keeps a bounded history.
///
/// CR, LF and CRLF each terminate a line; a CRLF split across two `ingest`
/// calls still counts once. Text after the last terminator forms the partial
/// line, which is the only record ever mutated.
#[derive(Debug)]
pub struct LineBuffer {
    history: VecDeque<LineRecord>,
    capacity: usize,
    display_mode: DisplayMode,
    partial: bool,
    pending_cr: bool,
    next_sequence: u64,
    record_events: bool,
    events: Vec<LineEvent>,
}

impl LineBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::new(),
            capacity: capacity.max(1),
            display_mode: DisplayMode::Text,
            partial: false,
            pending_cr: false,
            next_sequence: 1,
            record_events: false,
            events: Vec::new(),
        }
    }

    pub fn with_display_mode(mut self, mode: DisplayMode) -> Self {
        self.display_mode = mode;
        self
    }

    /// Keep `LineEvent`s for `take_events`.
    pub fn with_events(mut self) -> Self {
        self.record_events = true;
        self
    }

    /// Feed received text. Returns the last record created or extended.
    pub fn ingest(&mut self, text: &str) -> Option<LineRecord> {
        let mut rest = text;
        let mut touched = None;

        if self.pending_cr && !rest.is_empty() {
            self.pending_cr = false;
            rest = rest.strip_prefix('\n').unwrap_or(rest);
        }

        while let Some(pos) = rest.find(['\r', '\n']) {
            let segment = &rest[..pos];
            let is_cr = rest.as_bytes()[pos] == b'\r';
            let mut after = &rest[pos + 1..];

            touched = Some(self.complete_line(segment));

            if is_cr {
                if let Some(stripped) = after.strip_prefix('\n') {
                    after = stripped;
                } else if after.is_empty() {
                    self.pending_cr = true;
                }
            }
            rest = after;
        }

        if !rest.is_empty() {
            touched = Some(self.extend_partial(rest));
        }

        touched
    }

    /// Record a locally echoed command as its own sealed line.
    pub fn push_sent(&mut self, text: &str) -> LineRecord {
        self.seal_partial();
        let record = self.push_record(LineTag::Sent, text.to_string());
        self.emit(LineEvent::Sealed(record.clone()));
        record
    }

    /// Seal the partial line, if any, without adding text.
    pub fn seal_partial(&mut self) -> Option<LineRecord> {
        if !self.partial {
            return None;
        }
        self.partial = false;
        let record = self.history.back().cloned()?;
        self.emit(LineEvent::Sealed(record.clone()));
        Some(record)
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.partial = false;
        self.pending_cr = false;
        self.emit(LineEvent::Cleared);
    }

    /// Records matching `filter`, oldest first.
    pub fn snapshot(&self, filter: &FilterSpec) -> Vec<LineRecord> {
        self.history
            .iter()
            .filter(|record| filter.matches(&record.text))
            .cloned()
            .collect()
    }

    /// The not-yet-terminated line, if any.
    pub fn partial_line(&self) -> Option<&LineRecord> {
        if self.partial {
            self.history.back()
        } else {
            None
        }
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.evict_overflow();
    }

    pub fn set_display_mode(&mut self, mode: DisplayMode) {
        self.display_mode = mode;
    }

    pub fn take_events(&mut self) -> Vec<LineEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &LineRecord> {
        self.history.iter()
    }

    fn complete_line(&mut self, segment: &str) -> LineRecord {
        let rendered = display::render(segment, self.display_mode);

        if self.partial {
            self.partial = false;
            if let Some(last) = self.history.back_mut() {
                last.text.push_str(&rendered);
                let record = last.clone();
                self.emit(LineEvent::Sealed(record.clone()));
                return record;
            }
        }

        let record = self.push_record(LineTag::Received, rendered);
        self.emit(LineEvent::Sealed(record.clone()));
        record
    }

    fn extend_partial(&mut self, segment: &str) -> LineRecord {
        let rendered = display::render(segment, self.display_mode);

        if self.partial {
            if let Some(last) = self.history.back_mut() {
                last.text.push_str(&rendered);
                let record = last.clone();
                self.emit(LineEvent::Extended(record.clone()));
                return record;
            }
        }

        let record = self.push_record(LineTag::Received, rendered);
        self.partial = true;
        record
    }

    fn push_record(&mut self, tag: LineTag, text: String) -> LineRecord {
        let record = LineRecord {
            sequence_id: self.next_sequence,
            tag,
            text,
        };
        self.next_sequence += 1;

        self.history.push_back(record.clone());
        self.emit(LineEvent::Appended(record.clone()));
        self.evict_overflow();
        record
    }

    fn evict_overflow(&mut self) {
        while self.history.len() > self.capacity {
            if let Some(evicted) = self.history.pop_front() {
                self.emit(LineEvent::Evicted(evicted));
            }
        }
    }

    fn emit(&mut self, event: LineEvent) {
        if self.record_events {
            self.events.push(event);
        }
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(10_000)
    }
}
