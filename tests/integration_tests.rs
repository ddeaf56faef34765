use lineterm::core::read_loop::ReadLoopSettings;
use lineterm::{
    ConnectionState, DataChunk, LineEvent, LineTag, MemoryDevice, NullSink, SerialSession, TermConfig,
    TerminalOptions, TransportConfig, TransportErrorKind, TransportSettings,
};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// End-to-end tests against an in-memory device
#[cfg(test)]
mod integration_tests {
    use super::*;

    fn fast_loop() -> ReadLoopSettings {
        ReadLoopSettings {
            read_timeout: Duration::from_millis(5),
            reopen_base_delay: Duration::from_millis(5),
            reopen_max_delay: Duration::from_millis(20),
            coalesce_window: Duration::from_millis(10),
            sleep_slice: Duration::from_millis(2),
            ..ReadLoopSettings::default()
        }
    }

    fn session_with(device: &MemoryDevice, options: TerminalOptions) -> SerialSession {
        let config = TermConfig {
            port: TransportConfig::new(device.name(), 115_200),
            options,
            ..TermConfig::default()
        };
        SerialSession::with_settings(
            config,
            Arc::new(device.clone()),
            TransportSettings::default(),
            fast_loop(),
        )
        .expect("valid configuration")
    }

    fn session_for(device: &MemoryDevice) -> SerialSession {
        session_with(device, TerminalOptions::default())
    }

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    fn pump(session: &mut SerialSession) -> Vec<LineEvent> {
        let mut events = Vec::new();
        session.process_pending(&mut events);
        events
    }

    fn drain(receiver: &mut broadcast::Receiver<DataChunk>) -> String {
        let mut text = String::new();
        while let Ok(chunk) = receiver.try_recv() {
            text.push_str(&chunk.text);
        }
        text
    }

    fn sealed_texts(session: &SerialSession) -> Vec<String> {
        let partial = session.lines().partial_line().map(|r| r.sequence_id);
        session
            .snapshot()
            .into_iter()
            .filter(|r| Some(r.sequence_id) != partial)
            .map(|r| r.text)
            .collect()
    }

    #[test]
    fn test_missing_port_reports_not_found_until_available() {
        let device = MemoryDevice::absent("LOOP0");
        let mut session = session_for(&device);

        session.connect().unwrap();
        thread::sleep(Duration::from_millis(60));

        let status = session.status();
        assert_eq!(
            status.state,
            ConnectionState::Error(TransportErrorKind::NotFound)
        );
        assert_eq!(status.text, "LOOP0 does not exist");
        assert!(session.is_reading());
        assert_eq!(device.open_count(), 0);

        device.plug();
        assert!(wait_until(Duration::from_secs(2), || session.is_connected()));
        assert_eq!(session.status().text, "LOOP0: 115200 bps, Serial Port");

        device.feed(b"ready\r\n");
        assert!(wait_until(Duration::from_secs(2), || {
            pump(&mut session);
            sealed_texts(&session) == ["ready"]
        }));

        session.disconnect().unwrap();
    }

    #[test]
    fn test_busy_port_recovers_when_released() {
        let device = MemoryDevice::new("LOOP0");
        device.set_busy(true);
        let mut session = session_for(&device);

        session.connect().unwrap();
        assert_eq!(
            session.status().state,
            ConnectionState::Error(TransportErrorKind::Busy)
        );
        assert_eq!(session.status().text, "LOOP0 already in use");

        device.set_busy(false);
        assert!(wait_until(Duration::from_secs(2), || session.is_connected()));
        session.disconnect().unwrap();
    }

    #[test]
    fn test_no_notifications_after_disconnect() {
        let device = MemoryDevice::new("LOOP0");
        let mut session = session_for(&device);
        let mut data = session.subscribe_data();

        session.connect().unwrap();
        device.feed(b"one\n");
        let mut received = String::new();
        assert!(wait_until(Duration::from_secs(2), || {
            received.push_str(&drain(&mut data));
            received == "one\n"
        }));
        session.disconnect().unwrap();

        drain(&mut data);
        device.feed(b"two\n");
        thread::sleep(Duration::from_millis(100));

        assert!(data.try_recv().is_err());
        assert!(!session.is_reading());
        assert!(!session.is_connected());
    }

    #[test]
    fn test_every_subscriber_receives_every_chunk() {
        let device = MemoryDevice::new("LOOP0");
        let mut session = session_for(&device);
        let mut first = session.subscribe_data();
        let mut second = session.subscribe_data();

        session.connect().unwrap();
        for i in 0..5 {
            device.feed(format!("line {}\n", i).as_bytes());
            thread::sleep(Duration::from_millis(15));
        }
        thread::sleep(Duration::from_millis(50));
        session.disconnect().unwrap();

        let expected: String = (0..5).map(|i| format!("line {}\n", i)).collect();
        assert_eq!(drain(&mut first), expected);
        assert_eq!(drain(&mut second), expected);
    }

    #[test]
    fn test_unplug_and_replug_preserves_order() {
        let device = MemoryDevice::new("LOOP0");
        let mut session = session_for(&device);
        session.connect().unwrap();

        device.feed(b"before\n");
        assert!(wait_until(Duration::from_secs(2), || {
            pump(&mut session);
            sealed_texts(&session) == ["before"]
        }));

        device.unplug();
        assert!(wait_until(Duration::from_secs(2), || !session.is_connected()));
        device.plug();
        assert!(wait_until(Duration::from_secs(2), || session.is_connected()));

        device.feed(b"after\n");
        assert!(wait_until(Duration::from_secs(2), || {
            pump(&mut session);
            sealed_texts(&session) == ["before", "after"]
        }));

        session.disconnect().unwrap();
        assert!(device.open_count() >= 2);
    }

    #[test]
    fn test_read_error_recycles_handle() {
        let device = MemoryDevice::new("LOOP0");
        let mut session = session_for(&device);
        session.connect().unwrap();
        assert_eq!(device.open_count(), 1);

        device.fail_next_read(io::ErrorKind::BrokenPipe);
        assert!(wait_until(Duration::from_secs(2), || device.open_count() >= 2));

        device.feed(b"still here\n");
        assert!(wait_until(Duration::from_secs(2), || {
            pump(&mut session);
            sealed_texts(&session) == ["still here"]
        }));
        session.disconnect().unwrap();
    }

    #[test]
    fn test_history_capacity_scenario() {
        let device = MemoryDevice::new("LOOP0");
        let options = TerminalOptions {
            max_lines: 3,
            ..TerminalOptions::default()
        };
        let mut session = session_with(&device, options);
        session.connect().unwrap();

        device.feed(b"L1\nL2\nL3\nL4\nL5\n");
        assert!(wait_until(Duration::from_secs(2), || {
            pump(&mut session);
            sealed_texts(&session) == ["L3", "L4", "L5"]
        }));
        session.disconnect().unwrap();
    }

    #[test]
    fn test_echoed_commands_interleave_with_received_lines() {
        let device = MemoryDevice::new("LOOP0");
        let mut session = session_for(&device);
        session.connect().unwrap();

        session.send("AT").unwrap();
        assert_eq!(device.written(), b"AT\r");
        device.feed(b"OK\r\n");
        assert!(wait_until(Duration::from_secs(2), || {
            pump(&mut session);
            session.lines().len() == 2
        }));
        session.disconnect().unwrap();

        let tags: Vec<LineTag> = session.snapshot().iter().map(|r| r.tag).collect();
        assert_eq!(tags, [LineTag::Sent, LineTag::Received]);
        assert_eq!(sealed_texts(&session), ["AT", "OK"]);
    }

    #[test]
    fn test_port_reconfiguration_applies_on_reopen() {
        let device = MemoryDevice::new("LOOP0");
        let mut session = session_for(&device);
        session.connect().unwrap();

        let mut config = session.port_config();
        config.baud_rate = 9600;
        session.apply_port_config(config).unwrap();

        assert!(session.is_reading());
        assert_eq!(session.status().text, "LOOP0: 9600 bps, Serial Port");
        session.disconnect().unwrap();
        session.process_pending(&mut NullSink);
    }

    #[tokio::test]
    async fn test_async_consumer() {
        let device = MemoryDevice::new("LOOP0");
        let mut session = session_for(&device);
        let mut status = session.subscribe_status();
        session.connect().unwrap();

        assert!(status.has_changed().unwrap());
        assert_eq!(status.borrow_and_update().state, ConnectionState::Open);

        device.feed(b"temp=21\n");
        let chunk = tokio::time::timeout(Duration::from_secs(2), session.recv())
            .await
            .expect("data within deadline")
            .expect("read loop alive");
        session.dispatch(&chunk, &mut NullSink);
        session.disconnect().unwrap();

        assert_eq!(sealed_texts(&session), ["temp=21"]);
    }
}
