use crate::core::lines::{FilterSpec, LineBuffer, LineRecord};
use crate::core::read_loop::{DataChunk, ReadLoop, ReadLoopSettings};
use crate::core::session::sink::LineSink;
use crate::core::status::{StatusPublisher, StatusSnapshot};
use crate::core::transport::{PortOpener, Transport, TransportSettings};
use crate::domain::config::{TermConfig, TerminalOptions, TransportConfig};
use crate::domain::error::TermResult;
use crate::infrastructure::log_sink::LineLogger;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// One terminal session: a transport, its read loop and the line history.
///
/// Open failures never surface as errors from `connect`; they show up in the
/// status and the read loop keeps retrying until `disconnect`. Line events
/// and status changes reach a [`LineSink`] only when the owner calls
/// [`dispatch`](Self::dispatch) or [`process_pending`](Self::process_pending).
/// Received data queues up without loss until then.
pub struct SerialSession {
    transport: Arc<Transport>,
    read_loop: ReadLoop,
    lines: LineBuffer,
    data: UnboundedReceiver<DataChunk>,
    status: watch::Receiver<StatusSnapshot>,
    options: TerminalOptions,
    filter_input: String,
    filter: FilterSpec,
    logger: Option<LineLogger>,
}

impl SerialSession {
    pub fn new(config: TermConfig, opener: Arc<dyn PortOpener>) -> TermResult<Self> {
        Self::with_settings(
            config,
            opener,
            TransportSettings::default(),
            ReadLoopSettings::default(),
        )
    }

    pub fn with_settings(
        config: TermConfig,
        opener: Arc<dyn PortOpener>,
        transport_settings: TransportSettings,
        loop_settings: ReadLoopSettings,
    ) -> TermResult<Self> {
        config.options.validate()?;

        let publisher = StatusPublisher::new();
        let status = publisher.subscribe();
        let transport = Arc::new(Transport::with_settings(
            opener,
            config.port,
            publisher,
            transport_settings,
        ));
        transport.set_line_ending(config.options.append_to_send);

        let mut read_loop = ReadLoop::with_settings(Arc::clone(&transport), loop_settings);
        let data = read_loop.attach_queue();

        let lines = LineBuffer::new(config.options.max_lines)
            .with_display_mode(config.options.display_mode)
            .with_events();

        let logger = match &config.options.log_file {
            Some(path) => Some(LineLogger::open(path)?),
            None => None,
        };

        let filter = FilterSpec::parse(
            "",
            &config.options.filter_delimiter,
            config.options.filter_case_sensitive,
        );

        Ok(Self {
            transport,
            read_loop,
            lines,
            data,
            status,
            options: config.options,
            filter_input: String::new(),
            filter,
            logger,
        })
    }

    /// Open the transport and start reading.
    pub fn connect(&mut self) -> TermResult<()> {
        if let Err(e) = self.transport.open(self.transport.config()) {
            debug!("Initial open failed, read loop will retry: {}", e);
        }
        self.read_loop.start()
    }

    /// Stop reading, then release the device.
    pub fn disconnect(&mut self) -> TermResult<()> {
        self.read_loop.stop()?;
        self.transport.close();
        info!("Session disconnected");
        Ok(())
    }

    /// Replace the link parameters. The transport is closed and, if the
    /// session was reading, reopened with the new parameters.
    pub fn apply_port_config(&mut self, config: TransportConfig) -> TermResult<()> {
        config.validate()?;

        let was_reading = self.read_loop.is_running();
        self.read_loop.stop()?;
        self.transport.close();
        self.transport.set_config(config);

        if was_reading {
            self.connect()?;
        }
        Ok(())
    }

    /// Replace display and send options without touching the transport.
    pub fn apply_options(&mut self, options: TerminalOptions) -> TermResult<()> {
        options.validate()?;

        if options.log_file != self.options.log_file {
            self.logger = match &options.log_file {
                Some(path) => Some(LineLogger::open(path)?),
                None => None,
            };
        }

        self.transport.set_line_ending(options.append_to_send);
        self.lines.set_display_mode(options.display_mode);
        self.lines.set_capacity(options.max_lines);
        self.filter = FilterSpec::parse(
            &self.filter_input,
            &options.filter_delimiter,
            options.filter_case_sensitive,
        );
        self.options = options;
        Ok(())
    }

    /// Transmit `text` followed by the configured terminator. With local
    /// echo on, the text is also recorded as a sent line.
    pub fn send(&mut self, text: &str) -> TermResult<Option<LineRecord>> {
        self.transport.send(text.as_bytes())?;
        Ok(self.echo(text))
    }

    /// Transmit raw bytes followed by the configured terminator.
    pub fn send_bytes(&mut self, bytes: &[u8]) -> TermResult<Option<LineRecord>> {
        self.transport.send(bytes)?;
        Ok(self.echo(&String::from_utf8_lossy(bytes)))
    }

    /// Transmit the content of a file. Returns the number of bytes read.
    pub fn send_file(&mut self, path: &Path) -> TermResult<usize> {
        let content = std::fs::read(path)?;
        self.transport.send(&content)?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.echo(&format!("SendFile {}, {} byte(s)", name, content.len()));
        Ok(content.len())
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Set the filter from user input split on the configured delimiter.
    pub fn set_filter(&mut self, input: &str) {
        self.filter_input = input.to_string();
        self.filter = FilterSpec::parse(
            input,
            &self.options.filter_delimiter,
            self.options.filter_case_sensitive,
        );
    }

    pub fn filter(&self) -> &FilterSpec {
        &self.filter
    }

    /// Lines matching the current filter, oldest first.
    pub fn snapshot(&self) -> Vec<LineRecord> {
        self.lines.snapshot(&self.filter)
    }

    pub fn lines(&self) -> &LineBuffer {
        &self.lines
    }

    pub fn options(&self) -> &TerminalOptions {
        &self.options
    }

    pub fn port_config(&self) -> TransportConfig {
        self.transport.config()
    }

    /// Independent receiver of raw data notifications. Unlike the session's
    /// own queue it drops chunks once it falls `channel_capacity` behind.
    pub fn subscribe_data(&self) -> broadcast::Receiver<DataChunk> {
        self.read_loop.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.transport.status().subscribe()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.transport.status().current()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_open()
    }

    pub fn is_reading(&self) -> bool {
        self.read_loop.is_running()
    }

    /// Wait for the next data notification. Returns `None` once the read
    /// loop can no longer produce data.
    pub async fn recv(&mut self) -> Option<DataChunk> {
        self.data.recv().await
    }

    /// Wait for the next status change.
    pub async fn status_changed(&mut self) -> Option<StatusSnapshot> {
        self.status.changed().await.ok()?;
        Some(self.status.borrow_and_update().clone())
    }

    /// Feed one notification into the line history and forward the
    /// resulting events.
    pub fn dispatch(&mut self, chunk: &DataChunk, sink: &mut dyn LineSink) {
        self.lines.ingest(&chunk.text);
        self.forward_events(sink);
    }

    /// Drain every notification and status change queued so far.
    /// Returns the number of data notifications handled.
    pub fn process_pending(&mut self, sink: &mut dyn LineSink) -> usize {
        if self.status.has_changed().unwrap_or(false) {
            let snapshot = self.status.borrow_and_update().clone();
            sink.status_changed(&snapshot);
        }

        let mut handled = 0;
        while let Ok(chunk) = self.data.try_recv() {
            self.lines.ingest(&chunk.text);
            handled += 1;
        }

        self.forward_events(sink);
        handled
    }

    /// Forward events produced outside `dispatch`, such as echoed sends.
    pub fn flush_events(&mut self, sink: &mut dyn LineSink) {
        self.forward_events(sink);
    }

    fn echo(&mut self, text: &str) -> Option<LineRecord> {
        if self.options.local_echo {
            Some(self.lines.push_sent(text))
        } else {
            None
        }
    }

    fn forward_events(&mut self, sink: &mut dyn LineSink) {
        for event in self.lines.take_events() {
            if let Some(logger) = self.logger.as_mut() {
                logger.line_event(&event);
            }
            sink.line_event(&event);
        }
    }
}

impl Drop for SerialSession {
    fn drop(&mut self) {
        if let Err(e) = self.read_loop.stop() {
            warn!("Session dropped with a running read loop: {}", e);
        }
    }
}
