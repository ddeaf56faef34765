use crate::core::lines::LineEvent;
use crate::core::status::StatusSnapshot;

/// Receiver of line history changes, driven from the consumer's own context.
///
/// The session never calls a sink from the read loop thread; events are
/// handed over only inside `SerialSession::dispatch` and
/// `SerialSession::process_pending`.
pub trait LineSink {
    fn line_event(&mut self, event: &LineEvent);

    fn status_changed(&mut self, _status: &StatusSnapshot) {}
}

/// Collects events, mostly useful in tests.
impl LineSink for Vec<LineEvent> {
    fn line_event(&mut self, event: &LineEvent) {
        self.push(event.clone());
    }
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LineSink for NullSink {
    fn line_event(&mut self, _event: &LineEvent) {}
}
