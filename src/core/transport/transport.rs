use super::error::{TransportError, TransportErrorKind};
use super::port::{PortHandle, PortOpener, RawChunk};
use crate::core::status::{ConnectionState, StatusPublisher};
use crate::domain::config::{LineEnding, TransportConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tunables for the device layer
#[derive(Debug, Clone)]
pub struct TransportSettings {
    /// Read deadline applied when a handle is opened
    pub read_timeout: Duration,
    /// Open calls made before giving up on a device that never reports open
    pub open_attempts: u32,
    /// Size of the scratch buffer for one read
    pub read_buffer_size: usize,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(50),
            open_attempts: 3,
            read_buffer_size: 4096,
        }
    }
}

/// Owns the physical connection.
///
/// All lifecycle methods take the same lock, so at most one open, reopen or
/// recycle is in flight and reads never observe a half-replaced handle.
pub struct Transport {
    opener: Arc<dyn PortOpener>,
    status: StatusPublisher,
    settings: TransportSettings,
    inner: Mutex<TransportInner>,
}

struct TransportInner {
    config: TransportConfig,
    line_ending: LineEnding,
    port: Option<Box<dyn PortHandle>>,
    timeout: Duration,
    scratch: Vec<u8>,
}

impl Transport {
    pub fn new(opener: Arc<dyn PortOpener>, config: TransportConfig, status: StatusPublisher) -> Self {
        Self::with_settings(opener, config, status, TransportSettings::default())
    }

    pub fn with_settings(
        opener: Arc<dyn PortOpener>,
        config: TransportConfig,
        status: StatusPublisher,
        settings: TransportSettings,
    ) -> Self {
        let inner = TransportInner {
            config,
            line_ending: LineEnding::default(),
            port: None,
            timeout: settings.read_timeout,
            scratch: vec![0u8; settings.read_buffer_size.max(1)],
        };

        Self {
            opener,
            status,
            settings,
            inner: Mutex::new(inner),
        }
    }

    /// Apply `config` and open the device, closing any existing handle first.
    pub fn open(&self, config: TransportConfig) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        inner.config = config;
        self.open_locked(&mut inner, true)
    }

    /// Open again with the configuration applied last.
    pub fn reopen(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        self.open_locked(&mut inner, false)
    }

    /// Tear down the current handle and open a fresh one.
    pub fn recycle(&self) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        if let Some(port) = inner.port.take() {
            info!("Recycling handle for {}", port.name());
        }
        self.open_locked(&mut inner, false)
    }

    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if let Some(port) = inner.port.take() {
            info!("Closed {}", port.name());
        }
        self.status.publish(ConnectionState::Closed, "Disconnected");
    }

    pub fn is_open(&self) -> bool {
        self.inner
            .lock()
            .port
            .as_ref()
            .map_or(false, |port| port.is_open())
    }

    /// Configuration used by the next open.
    pub fn config(&self) -> TransportConfig {
        self.inner.lock().config.clone()
    }

    /// Store `config` for the next open; an open handle keeps its settings.
    pub fn set_config(&self, config: TransportConfig) {
        self.inner.lock().config = config;
    }

    pub fn line_ending(&self) -> LineEnding {
        self.inner.lock().line_ending
    }

    pub fn set_line_ending(&self, line_ending: LineEnding) {
        self.inner.lock().line_ending = line_ending;
    }

    /// Read one chunk, blocking at most `timeout`.
    pub fn read_chunk(&self, timeout: Duration) -> Result<RawChunk, TransportError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let port = inner.port.as_mut().ok_or(TransportError::NotOpen)?;

        if inner.timeout != timeout {
            port.set_timeout(timeout)?;
            inner.timeout = timeout;
        }

        match port.read_bytes(&mut inner.scratch)? {
            0 => Err(TransportError::Timeout),
            n => {
                debug!("Read {} bytes from {}", n, port.name());
                Ok(RawChunk::new(inner.scratch[..n].to_vec()))
            }
        }
    }

    /// Write `data` followed by the configured line terminator.
    pub fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let line_ending = self.line_ending();
        self.send_with(data, line_ending)
    }

    /// Write `data` followed by `line_ending`.
    pub fn send_with(&self, data: &[u8], line_ending: LineEnding) -> Result<(), TransportError> {
        let mut inner = self.inner.lock();
        let port = inner.port.as_mut().ok_or(TransportError::NotOpen)?;

        let mut frame = Vec::with_capacity(data.len() + 2);
        frame.extend_from_slice(data);
        frame.extend_from_slice(line_ending.as_bytes());

        port.write_all(&frame)?;
        debug!("Sent {} bytes to {}", frame.len(), port.name());
        Ok(())
    }

    pub fn status(&self) -> &StatusPublisher {
        &self.status
    }

    fn open_locked(&self, inner: &mut TransportInner, announce: bool) -> Result<(), TransportError> {
        if let Some(port) = inner.port.take() {
            debug!("Closing {} before reopening", port.name());
        }

        let config = inner.config.clone();
        if let Err(e) = config.validate() {
            let err = TransportError::Config(e.to_string());
            self.report_failure(&err);
            return Err(err);
        }

        if announce {
            self.status
                .publish(ConnectionState::Opening, format!("Opening {}", config.port_id));
        }

        let attempts = self.settings.open_attempts.max(1);
        for attempt in 1..=attempts {
            match self.opener.open(&config, self.settings.read_timeout) {
                Ok(handle) if handle.is_open() => {
                    inner.port = Some(handle);
                    inner.timeout = self.settings.read_timeout;
                    self.status.publish(ConnectionState::Open, config.summary());
                    info!("Opened {} at {} bps", config.port_id, config.baud_rate);
                    return Ok(());
                }
                Ok(_) => {
                    debug!(
                        "{} not reporting open yet (attempt {}/{})",
                        config.port_id, attempt, attempts
                    );
                }
                Err(err) => {
                    self.report_failure(&err);
                    return Err(err);
                }
            }
        }

        let err = TransportError::invalid_state(
            &config.port_id,
            format!("device did not report open after {} attempts", attempts),
        );
        self.report_failure(&err);
        Err(err)
    }

    /// Publish an open failure. A Busy error is announced only when the
    /// published status is not already Busy, so a busy episode ends as soon
    /// as anything else is shown.
    fn report_failure(&self, err: &TransportError) {
        let kind = err.kind();

        if kind == TransportErrorKind::Busy
            && self.status.state() == ConnectionState::Error(TransportErrorKind::Busy)
        {
            debug!("Still busy: {}", err);
            return;
        }

        if self.status.publish(ConnectionState::Error(kind), err.to_string()) {
            warn!("Open failed: {}", err);
        } else {
            debug!("Open failed again: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct ScriptedPort {
        open: bool,
        reads: VecDeque<Result<Vec<u8>, TransportError>>,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl PortHandle for ScriptedPort {
        fn name(&self) -> &str {
            "scripted"
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError> {
            match self.reads.pop_front() {
                Some(Ok(bytes)) => {
                    buffer[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Err(e)) => Err(e),
                None => Err(TransportError::Timeout),
            }
        }

        fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
            self.written.lock().extend_from_slice(data);
            Ok(())
        }

        fn set_timeout(&mut self, _timeout: Duration) -> Result<(), TransportError> {
            Ok(())
        }
    }

    /// Fails with the scripted errors first, then hands out open ports.
    struct ScriptedOpener {
        failures: Mutex<VecDeque<TransportError>>,
        closed_handles_first: AtomicUsize,
        opens: AtomicUsize,
        reads: Mutex<VecDeque<Result<Vec<u8>, TransportError>>>,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl ScriptedOpener {
        fn new(failures: Vec<TransportError>) -> Self {
            Self {
                failures: Mutex::new(failures.into()),
                closed_handles_first: AtomicUsize::new(0),
                opens: AtomicUsize::new(0),
                reads: Mutex::new(VecDeque::new()),
                written: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl PortOpener for ScriptedOpener {
        fn open(
            &self,
            _config: &TransportConfig,
            _timeout: Duration,
        ) -> Result<Box<dyn PortHandle>, TransportError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.failures.lock().pop_front() {
                return Err(err);
            }
            let open = self
                .closed_handles_first
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_err();
            Ok(Box::new(ScriptedPort {
                open,
                reads: std::mem::take(&mut *self.reads.lock()),
                written: Arc::clone(&self.written),
            }))
        }
    }

    fn transport_with(opener: Arc<ScriptedOpener>) -> Transport {
        Transport::new(opener, TransportConfig::new("COM5", 9600), StatusPublisher::new())
    }

    #[test]
    fn test_open_publishes_summary() {
        let transport = transport_with(Arc::new(ScriptedOpener::new(Vec::new())));

        transport.open(TransportConfig::new("COM5", 9600)).unwrap();

        assert!(transport.is_open());
        let status = transport.status().current();
        assert_eq!(status.state, ConnectionState::Open);
        assert_eq!(status.text, "COM5: 9600 bps, Serial Port");
    }

    #[test]
    fn test_open_retries_until_device_reports_open() {
        let opener = Arc::new(ScriptedOpener::new(Vec::new()));
        opener.closed_handles_first.store(2, Ordering::SeqCst);
        let transport = transport_with(Arc::clone(&opener));

        transport.open(TransportConfig::new("COM5", 9600)).unwrap();
        assert_eq!(opener.opens.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_open_gives_up_after_bounded_attempts() {
        let opener = Arc::new(ScriptedOpener::new(Vec::new()));
        opener.closed_handles_first.store(10, Ordering::SeqCst);
        let transport = transport_with(Arc::clone(&opener));

        let err = transport.open(TransportConfig::new("COM5", 9600)).unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::InvalidState);
        assert_eq!(opener.opens.load(Ordering::SeqCst), 3);
        assert!(!transport.is_open());
    }

    #[test]
    fn test_not_found_sets_status() {
        let opener = Arc::new(ScriptedOpener::new(vec![TransportError::NotFound(
            "COM5".to_string(),
        )]));
        let transport = transport_with(opener);

        let err = transport.open(TransportConfig::new("COM5", 9600)).unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::NotFound);

        let status = transport.status().current();
        assert_eq!(
            status.state,
            ConnectionState::Error(TransportErrorKind::NotFound)
        );
        assert_eq!(status.text, "COM5 does not exist");
    }

    #[tokio::test]
    async fn test_busy_reported_once_per_episode() {
        let opener = Arc::new(ScriptedOpener::new(vec![
            TransportError::Busy("COM5".to_string()),
            TransportError::Busy("COM5".to_string()),
            TransportError::Busy("COM5".to_string()),
        ]));
        let transport = transport_with(opener);
        let mut status = transport.status().subscribe();

        assert!(transport.reopen().is_err());
        assert!(status.has_changed().unwrap());
        assert_eq!(status.borrow_and_update().text, "COM5 already in use");

        assert!(transport.reopen().is_err());
        assert!(transport.reopen().is_err());
        assert!(!status.has_changed().unwrap());

        transport.reopen().unwrap();
        assert_eq!(status.borrow_and_update().state, ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_busy_announced_again_after_opening() {
        let opener = Arc::new(ScriptedOpener::new(vec![
            TransportError::Busy("COM5".to_string()),
            TransportError::Busy("COM5".to_string()),
            TransportError::Busy("COM5".to_string()),
        ]));
        let transport = transport_with(opener);
        let mut status = transport.status().subscribe();

        assert!(transport.open(TransportConfig::new("COM5", 9600)).is_err());
        assert_eq!(status.borrow_and_update().text, "COM5 already in use");

        // The second explicit open publishes "Opening COM5" first.
        assert!(transport.open(TransportConfig::new("COM5", 9600)).is_err());
        let snapshot = status.borrow_and_update().clone();
        assert_eq!(
            snapshot.state,
            ConnectionState::Error(TransportErrorKind::Busy)
        );
        assert_eq!(snapshot.text, "COM5 already in use");

        assert!(transport.reopen().is_err());
        assert!(!status.has_changed().unwrap());
    }

    #[test]
    fn test_send_appends_line_ending() {
        let opener = Arc::new(ScriptedOpener::new(Vec::new()));
        let transport = transport_with(Arc::clone(&opener));
        transport.open(TransportConfig::new("COM5", 9600)).unwrap();

        transport.set_line_ending(LineEnding::CrLf);
        transport.send(b"AT").unwrap();
        transport.send_with(b"ATI", LineEnding::None).unwrap();

        assert_eq!(opener.written.lock().as_slice(), b"AT\r\nATI");
    }

    #[test]
    fn test_send_requires_open_transport() {
        let transport = transport_with(Arc::new(ScriptedOpener::new(Vec::new())));
        assert!(matches!(transport.send(b"AT"), Err(TransportError::NotOpen)));
    }

    #[test]
    fn test_read_chunk_and_recycle() {
        let opener = Arc::new(ScriptedOpener::new(Vec::new()));
        opener.reads.lock().extend([
            Ok(b"hello".to_vec()),
            Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "unplugged",
            ))),
        ]);
        let transport = transport_with(Arc::clone(&opener));
        transport.open(TransportConfig::new("COM5", 9600)).unwrap();

        let timeout = Duration::from_millis(50);
        assert_eq!(transport.read_chunk(timeout).unwrap().bytes, b"hello");

        let err = transport.read_chunk(timeout).unwrap_err();
        assert!(err.requires_recycle());

        transport.recycle().unwrap();
        assert_eq!(opener.opens.load(Ordering::SeqCst), 2);
        assert!(matches!(
            transport.read_chunk(timeout),
            Err(TransportError::Timeout)
        ));
    }

    #[test]
    fn test_close_reports_disconnected() {
        let transport = transport_with(Arc::new(ScriptedOpener::new(Vec::new())));
        transport.open(TransportConfig::new("COM5", 9600)).unwrap();

        transport.close();
        assert!(!transport.is_open());
        assert_eq!(transport.status().current().text, "Disconnected");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let transport = transport_with(Arc::new(ScriptedOpener::new(Vec::new())));
        let err = transport.open(TransportConfig::new("COM5", 0)).unwrap_err();
        assert!(matches!(err, TransportError::Config(_)));
    }
}
