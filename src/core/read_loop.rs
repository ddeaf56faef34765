//! Background reader.
//!
//! The loop runs on a dedicated OS thread because device reads block. Bytes
//! are accumulated and flushed as [`DataChunk`]s at most once per coalescing
//! window, so consumers see a bounded notification rate. Chunks go to an
//! optional unbounded queue that never drops data, for the loop's owner, and
//! to a `broadcast` channel where every subscriber receives every chunk unless
//! it falls more than `channel_capacity` chunks behind.
//!
//! Cancellation is cooperative: `stop` raises a flag checked at the top of
//! every iteration and between sleep slices, then waits a bounded time for
//! the thread to acknowledge. A worker that misses the deadline is reported,
//! never killed.

use crate::core::transport::{Transport, TransportError};
use crate::domain::error::{TermError, TermResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, trace, warn};

/// Timing knobs for the read loop.
#[derive(Debug, Clone)]
pub struct ReadLoopSettings {
    /// Deadline for a single chunk read
    pub read_timeout: Duration,
    /// First delay before reopening a closed transport
    pub reopen_base_delay: Duration,
    /// Upper bound for the reopen backoff
    pub reopen_max_delay: Duration,
    /// Minimum spacing between two data notifications
    pub coalesce_window: Duration,
    /// How long `stop` waits for the worker to exit
    pub join_timeout: Duration,
    /// Granularity of cancellable sleeps
    pub sleep_slice: Duration,
    /// Capacity of the notification channel
    pub channel_capacity: usize,
}

impl Default for ReadLoopSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(50),
            reopen_base_delay: Duration::from_millis(50),
            reopen_max_delay: Duration::from_millis(800),
            coalesce_window: Duration::from_millis(100),
            join_timeout: Duration::from_secs(2),
            sleep_slice: Duration::from_millis(10),
            channel_capacity: 256,
        }
    }
}

/// One coalesced batch of received data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChunk {
    /// Increments by one per flush for the lifetime of the loop
    pub sequence: u64,
    /// Decoded text
    pub text: String,
    /// Raw bytes consumed by this flush
    pub byte_count: usize,
}

/// Delay before the reopen attempt following `failures` consecutive failures.
pub fn reopen_delay(settings: &ReadLoopSettings, failures: u32) -> Duration {
    let shift = failures.min(16);
    settings
        .reopen_base_delay
        .saturating_mul(1u32 << shift)
        .min(settings.reopen_max_delay)
}

/// Bytes received since the last flush.
///
/// Decoding is deferred to flush time; an incomplete UTF-8 sequence at the
/// end is carried into the next window instead of being replaced.
#[derive(Debug, Default)]
pub(crate) struct PendingAccumulator {
    bytes: Vec<u8>,
    changed: bool,
}

impl PendingAccumulator {
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.bytes.extend_from_slice(bytes);
        self.changed = true;
    }

    pub(crate) fn has_changes(&self) -> bool {
        self.changed
    }

    /// Decode and drain everything that forms complete characters.
    /// Returns `None` when nothing new arrived since the last call.
    pub(crate) fn take(&mut self) -> Option<(String, usize)> {
        if !self.changed {
            return None;
        }
        self.changed = false;

        let mut text = String::with_capacity(self.bytes.len());
        let mut consumed = 0;

        while consumed < self.bytes.len() {
            match std::str::from_utf8(&self.bytes[consumed..]) {
                Ok(valid) => {
                    text.push_str(valid);
                    consumed = self.bytes.len();
                }
                Err(e) => {
                    let valid_end = consumed + e.valid_up_to();
                    // valid_up_to guarantees this slice is UTF-8
                    text.push_str(&String::from_utf8_lossy(&self.bytes[consumed..valid_end]));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            consumed = valid_end + len;
                        }
                        None => {
                            consumed = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.bytes.drain(..consumed);
        if text.is_empty() {
            None
        } else {
            Some((text, consumed))
        }
    }

    /// Flush at shutdown: nothing more will arrive, so a dangling partial
    /// sequence is replaced.
    pub(crate) fn take_all(&mut self) -> Option<(String, usize)> {
        let taken = self.take();
        if self.bytes.is_empty() {
            return taken;
        }

        let tail = String::from_utf8_lossy(&self.bytes).into_owned();
        let tail_len = self.bytes.len();
        self.bytes.clear();

        match taken {
            Some((mut text, n)) => {
                text.push_str(&tail);
                Some((text, n + tail_len))
            }
            None => Some((tail, tail_len)),
        }
    }
}

/// Owns the worker thread; `Stopped` when `worker` is `None`.
pub struct ReadLoop {
    transport: Arc<Transport>,
    settings: ReadLoopSettings,
    sender: broadcast::Sender<DataChunk>,
    queue: Option<UnboundedSender<DataChunk>>,
    worker: Option<Worker>,
}

struct Worker {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    exited: mpsc::Receiver<()>,
}

impl ReadLoop {
    pub fn new(transport: Arc<Transport>) -> Self {
        Self::with_settings(transport, ReadLoopSettings::default())
    }

    pub fn with_settings(transport: Arc<Transport>, settings: ReadLoopSettings) -> Self {
        let (sender, _) = broadcast::channel(settings.channel_capacity.max(1));
        Self {
            transport,
            settings,
            sender,
            queue: None,
            worker: None,
        }
    }

    /// Spawn the worker. Calling `start` while running does nothing.
    pub fn start(&mut self) -> TermResult<()> {
        if self.worker.is_some() {
            debug!("Read loop already running");
            return Ok(());
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let (exited_tx, exited) = mpsc::channel();
        let mut body = LoopBody {
            transport: Arc::clone(&self.transport),
            settings: self.settings.clone(),
            sender: self.sender.clone(),
            queue: self.queue.clone(),
            cancel: Arc::clone(&cancel),
            pending: PendingAccumulator::default(),
            last_flush: Instant::now(),
            next_sequence: 0,
            reopen_failures: 0,
        };

        let handle = thread::Builder::new()
            .name("lineterm-read".to_string())
            .spawn(move || {
                body.run();
                let _ = exited_tx.send(());
            })
            .map_err(|e| TermError::worker(format!("failed to spawn read loop: {}", e)))?;

        info!("Read loop started");
        self.worker = Some(Worker {
            cancel,
            handle,
            exited,
        });
        Ok(())
    }

    /// Signal the worker and wait for it to exit.
    ///
    /// After `Ok` returns no further chunks are sent. If the worker does not
    /// acknowledge within the join timeout the loop stays marked running and
    /// `TermError::Worker` is returned; `stop` may be retried.
    pub fn stop(&mut self) -> TermResult<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        worker.cancel.store(true, Ordering::Release);

        match worker.exited.recv_timeout(self.settings.join_timeout) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {}
            Err(mpsc::RecvTimeoutError::Timeout) => {
                error!(
                    "Read loop did not exit within {:?}",
                    self.settings.join_timeout
                );
                self.worker = Some(worker);
                return Err(TermError::worker("read loop did not exit in time"));
            }
        }

        worker
            .handle
            .join()
            .map_err(|_| TermError::worker("read loop panicked"))?;

        info!("Read loop stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// A new receiver; it sees chunks flushed after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<DataChunk> {
        self.sender.subscribe()
    }

    /// Attach the lossless queue, replacing any previous one. Chunks are
    /// kept until received, however far behind the receiver is. Takes effect
    /// at the next `start`.
    pub fn attach_queue(&mut self) -> UnboundedReceiver<DataChunk> {
        let (queue, receiver) = unbounded_channel();
        self.queue = Some(queue);
        receiver
    }

    pub fn settings(&self) -> &ReadLoopSettings {
        &self.settings
    }
}

impl Drop for ReadLoop {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Read loop not stopped cleanly: {}", e);
        }
    }
}

struct LoopBody {
    transport: Arc<Transport>,
    settings: ReadLoopSettings,
    sender: broadcast::Sender<DataChunk>,
    queue: Option<UnboundedSender<DataChunk>>,
    cancel: Arc<AtomicBool>,
    pending: PendingAccumulator,
    last_flush: Instant,
    next_sequence: u64,
    reopen_failures: u32,
}

impl LoopBody {
    fn run(&mut self) {
        while !self.cancelled() {
            if self.transport.is_open() {
                self.read_once();
            } else {
                self.reopen_after_delay();
            }
            self.flush_if_due();
        }

        if let Some((text, byte_count)) = self.pending.take_all() {
            self.emit(text, byte_count);
        }
        debug!("Read loop exiting");
    }

    fn read_once(&mut self) {
        match self.transport.read_chunk(self.settings.read_timeout) {
            Ok(chunk) => {
                trace!("Chunk of {} bytes", chunk.len());
                self.pending.push(&chunk.bytes);
            }
            Err(TransportError::Timeout) | Err(TransportError::NotOpen) => {}
            Err(err) => {
                if err.requires_recycle() {
                    info!("Read failed, recycling transport: {}", err);
                } else {
                    warn!("Unexpected read failure, recycling transport: {}", err);
                }
                if let Err(e) = self.transport.recycle() {
                    debug!("Recycle did not reopen: {}", e);
                }
            }
        }
    }

    fn reopen_after_delay(&mut self) {
        let delay = reopen_delay(&self.settings, self.reopen_failures);
        if !self.sleep(delay) {
            return;
        }

        match self.transport.reopen() {
            Ok(()) => {
                if self.reopen_failures > 0 {
                    info!("Reconnected after {} attempts", self.reopen_failures + 1);
                }
                self.reopen_failures = 0;
            }
            Err(e) => {
                self.reopen_failures = self.reopen_failures.saturating_add(1);
                debug!("Reopen attempt {} failed: {}", self.reopen_failures, e);
            }
        }
    }

    fn flush_if_due(&mut self) {
        if !self.pending.has_changes() {
            return;
        }
        if self.last_flush.elapsed() < self.settings.coalesce_window {
            return;
        }
        if let Some((text, byte_count)) = self.pending.take() {
            self.emit(text, byte_count);
            self.last_flush = Instant::now();
        }
    }

    fn emit(&mut self, text: String, byte_count: usize) {
        let chunk = DataChunk {
            sequence: self.next_sequence,
            text,
            byte_count,
        };
        self.next_sequence += 1;

        let queue_closed = self
            .queue
            .as_ref()
            .map_or(false, |queue| queue.send(chunk.clone()).is_err());
        if queue_closed {
            trace!("Queue receiver dropped");
            self.queue = None;
        }

        // No receivers is not an error; data is simply not observed.
        if self.sender.send(chunk).is_err() {
            trace!("No data subscribers");
        }
    }

    /// Sleep in slices; returns `false` if cancelled meanwhile.
    fn sleep(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if self.cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(self.settings.sleep_slice));
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::status::{ConnectionState, StatusPublisher};
    use crate::core::transport::MemoryDevice;
    use crate::domain::config::TransportConfig;

    fn fast_settings() -> ReadLoopSettings {
        ReadLoopSettings {
            read_timeout: Duration::from_millis(5),
            reopen_base_delay: Duration::from_millis(5),
            reopen_max_delay: Duration::from_millis(20),
            coalesce_window: Duration::from_millis(20),
            join_timeout: Duration::from_secs(2),
            sleep_slice: Duration::from_millis(2),
            channel_capacity: 64,
        }
    }

    fn transport_for(device: &MemoryDevice) -> Arc<Transport> {
        Arc::new(Transport::new(
            Arc::new(device.clone()),
            TransportConfig::new(device.name(), 9600),
            StatusPublisher::new(),
        ))
    }

    fn collect(receiver: &mut broadcast::Receiver<DataChunk>) -> String {
        let mut text = String::new();
        while let Ok(chunk) = receiver.try_recv() {
            text.push_str(&chunk.text);
        }
        text
    }

    #[test]
    fn test_reopen_delay_doubles_and_caps() {
        let settings = ReadLoopSettings::default();
        assert_eq!(reopen_delay(&settings, 0), Duration::from_millis(50));
        assert_eq!(reopen_delay(&settings, 1), Duration::from_millis(100));
        assert_eq!(reopen_delay(&settings, 3), Duration::from_millis(400));
        assert_eq!(reopen_delay(&settings, 4), Duration::from_millis(800));
        assert_eq!(reopen_delay(&settings, 1000), Duration::from_millis(800));
    }

    #[test]
    fn test_accumulator_carries_incomplete_utf8() {
        let mut pending = PendingAccumulator::default();
        let snowman = "\u{2603}".as_bytes();

        pending.push(b"hi ");
        pending.push(&snowman[..1]);
        assert_eq!(pending.take(), Some(("hi ".to_string(), 3)));
        assert!(pending.take().is_none());

        pending.push(&snowman[1..]);
        assert_eq!(pending.take(), Some(("\u{2603}".to_string(), 3)));
    }

    #[test]
    fn test_accumulator_replaces_invalid_bytes() {
        let mut pending = PendingAccumulator::default();
        pending.push(b"a\xffb");
        assert_eq!(pending.take(), Some(("a\u{fffd}b".to_string(), 3)));
    }

    #[test]
    fn test_accumulator_take_all_flushes_tail() {
        let mut pending = PendingAccumulator::default();
        pending.push(b"ok\xe2\x98");
        assert_eq!(pending.take_all(), Some(("ok\u{fffd}".to_string(), 5)));
        assert!(pending.take_all().is_none());
    }

    #[test]
    fn test_start_is_idempotent_and_stop_joins() {
        let device = MemoryDevice::new("LOOP0");
        let mut read_loop = ReadLoop::with_settings(transport_for(&device), fast_settings());

        read_loop.start().unwrap();
        read_loop.start().unwrap();
        assert!(read_loop.is_running());

        read_loop.stop().unwrap();
        assert!(!read_loop.is_running());
        read_loop.stop().unwrap();
    }

    #[test]
    fn test_loop_reopens_and_delivers_in_order() {
        let device = MemoryDevice::new("LOOP0");
        let transport = transport_for(&device);
        let mut read_loop = ReadLoop::with_settings(Arc::clone(&transport), fast_settings());
        let mut receiver = read_loop.subscribe();

        read_loop.start().unwrap();
        for part in ["one ", "two ", "three"] {
            device.feed(part.as_bytes());
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(150));
        read_loop.stop().unwrap();

        assert!(transport.is_open());
        assert_eq!(collect(&mut receiver), "one two three");
    }

    #[test]
    fn test_notifications_are_coalesced() {
        let device = MemoryDevice::new("LOOP0");
        let transport = transport_for(&device);
        transport.open(transport.config()).unwrap();

        let settings = ReadLoopSettings {
            coalesce_window: Duration::from_millis(200),
            ..fast_settings()
        };
        let mut read_loop = ReadLoop::with_settings(transport, settings);
        let mut receiver = read_loop.subscribe();
        read_loop.start().unwrap();

        for _ in 0..20 {
            device.feed(b"x");
            thread::sleep(Duration::from_millis(2));
        }
        thread::sleep(Duration::from_millis(300));
        read_loop.stop().unwrap();

        let mut chunks = Vec::new();
        while let Ok(chunk) = receiver.try_recv() {
            chunks.push(chunk);
        }
        let total: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(total, "x".repeat(20));
        assert!(chunks.len() <= 3, "got {} notifications", chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence, i as u64);
        }
    }

    #[test]
    fn test_nothing_delivered_after_stop() {
        let device = MemoryDevice::new("LOOP0");
        let mut read_loop = ReadLoop::with_settings(transport_for(&device), fast_settings());
        let mut receiver = read_loop.subscribe();

        read_loop.start().unwrap();
        device.feed(b"before");
        thread::sleep(Duration::from_millis(100));
        read_loop.stop().unwrap();
        let before = collect(&mut receiver);

        device.feed(b"after");
        thread::sleep(Duration::from_millis(100));

        assert_eq!(before, "before");
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_unplug_recovers() {
        let device = MemoryDevice::new("LOOP0");
        let transport = transport_for(&device);
        let mut read_loop = ReadLoop::with_settings(Arc::clone(&transport), fast_settings());
        let mut receiver = read_loop.subscribe();
        read_loop.start().unwrap();

        thread::sleep(Duration::from_millis(50));
        device.unplug();
        thread::sleep(Duration::from_millis(50));
        assert_ne!(transport.status().state(), ConnectionState::Open);

        device.plug();
        thread::sleep(Duration::from_millis(150));
        device.feed(b"back\n");
        thread::sleep(Duration::from_millis(100));
        read_loop.stop().unwrap();

        assert_eq!(transport.status().state(), ConnectionState::Open);
        assert_eq!(collect(&mut receiver), "back\n");
        assert!(device.open_count() >= 2);
    }

    #[test]
    fn test_queue_keeps_chunks_a_lagging_subscriber_loses() {
        let device = MemoryDevice::new("LOOP0");
        let settings = ReadLoopSettings {
            coalesce_window: Duration::from_millis(5),
            channel_capacity: 2,
            ..fast_settings()
        };
        let mut read_loop = ReadLoop::with_settings(transport_for(&device), settings);
        let mut queue = read_loop.attach_queue();
        let mut receiver = read_loop.subscribe();

        read_loop.start().unwrap();
        for i in 0..8 {
            device.feed(format!("L{}\n", i).as_bytes());
            thread::sleep(Duration::from_millis(15));
        }
        thread::sleep(Duration::from_millis(50));
        read_loop.stop().unwrap();

        let mut queued = String::new();
        while let Ok(chunk) = queue.try_recv() {
            queued.push_str(&chunk.text);
        }
        let expected: String = (0..8).map(|i| format!("L{}\n", i)).collect();
        assert_eq!(queued, expected);

        assert!(matches!(
            receiver.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(_))
        ));
    }

    #[test]
    fn test_steady_traffic_flushes_every_window() {
        let device = MemoryDevice::new("LOOP0");
        let window = Duration::from_millis(50);
        let settings = ReadLoopSettings {
            coalesce_window: window,
            ..fast_settings()
        };
        let mut read_loop = ReadLoop::with_settings(transport_for(&device), settings);
        let mut queue = read_loop.attach_queue();
        read_loop.start().unwrap();

        let feeder = {
            let device = device.clone();
            thread::spawn(move || {
                for _ in 0..80 {
                    device.feed(b"x");
                    thread::sleep(Duration::from_millis(5));
                }
            })
        };

        let started = Instant::now();
        let mut arrivals = Vec::new();
        let mut text = String::new();
        while !feeder.is_finished() {
            while let Ok(chunk) = queue.try_recv() {
                arrivals.push(started.elapsed());
                text.push_str(&chunk.text);
            }
            thread::sleep(Duration::from_millis(1));
        }
        feeder.join().unwrap();
        let traffic_ended = started.elapsed();

        thread::sleep(Duration::from_millis(150));
        read_loop.stop().unwrap();
        while let Ok(chunk) = queue.try_recv() {
            text.push_str(&chunk.text);
        }

        assert_eq!(text, "x".repeat(80));
        assert!(arrivals.len() >= 3, "got {} notifications", arrivals.len());
        assert!(arrivals[0] < traffic_ended);
        for pair in arrivals.windows(2) {
            assert!(
                pair[1] - pair[0] >= window - Duration::from_millis(10),
                "notifications {:?} apart",
                pair[1] - pair[0]
            );
        }
    }
}
