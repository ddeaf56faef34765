use crate::domain::error::{TermError, TermResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// LineTerm configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermConfig {
    /// Default log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Link parameters
    #[serde(default)]
    pub port: TransportConfig,
    /// Display and send options
    #[serde(default)]
    pub options: TerminalOptions,
}

/// Link parameters applied when the transport opens.
///
/// Changing a field has no effect on an open transport; close and reopen to
/// apply it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Device path or name (`/dev/ttyUSB0`, `COM3`)
    #[serde(default = "default_port_id")]
    pub port_id: String,
    /// Human-readable bus description shown in the status line
    #[serde(default = "default_bus_label")]
    pub bus_label: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default)]
    pub stop_bits: StopBits,
    #[serde(default)]
    pub handshake: Handshake,
}

/// Parity configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
    Mark,
    Space,
}

/// Stop bit configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    #[default]
    #[serde(rename = "1")]
    One,
    #[serde(rename = "1.5")]
    OnePointFive,
    #[serde(rename = "2")]
    Two,
}

/// Flow control negotiated on the link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handshake {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "xon-xoff")]
    XOnXOff,
    #[serde(rename = "rts")]
    RequestToSend,
    #[serde(rename = "rts-xon-xoff")]
    RequestToSendXOnXOff,
}

/// Terminator appended to every transmitted line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    None,
    #[default]
    Cr,
    Lf,
    CrLf,
}

/// How received text is rendered into line records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Text,
    Hex,
}

/// Display, send and history options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalOptions {
    #[serde(default)]
    pub append_to_send: LineEnding,
    #[serde(default)]
    pub display_mode: DisplayMode,
    #[serde(default = "default_local_echo")]
    pub local_echo: bool,
    #[serde(default)]
    pub filter_case_sensitive: bool,
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    #[serde(default = "default_filter_delimiter")]
    pub filter_delimiter: String,
    /// Sealed lines are appended here when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_port_id() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_bus_label() -> String {
    "Serial Port".to_string()
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_data_bits() -> u8 {
    8
}

fn default_local_echo() -> bool {
    true
}

fn default_max_lines() -> usize {
    10_000
}

fn default_filter_delimiter() -> String {
    ",".to_string()
}

impl Default for TermConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            port: TransportConfig::default(),
            options: TerminalOptions::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port_id: default_port_id(),
            bus_label: default_bus_label(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            handshake: Handshake::default(),
        }
    }
}

impl Default for TerminalOptions {
    fn default() -> Self {
        Self {
            append_to_send: LineEnding::default(),
            display_mode: DisplayMode::default(),
            local_echo: default_local_echo(),
            filter_case_sensitive: false,
            max_lines: default_max_lines(),
            filter_delimiter: default_filter_delimiter(),
            log_file: None,
        }
    }
}

impl TermConfig {
    pub fn validate(&self) -> TermResult<()> {
        self.port.validate()?;
        self.options.validate()
    }
}

impl TransportConfig {
    pub fn new(port_id: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_id: port_id.into(),
            baud_rate,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> TermResult<()> {
        if self.port_id.trim().is_empty() {
            return Err(TermError::config("port identifier must not be empty"));
        }
        if self.baud_rate == 0 {
            return Err(TermError::config("baud rate must be positive"));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(TermError::config(format!(
                "data bits must be between 5 and 8, got {}",
                self.data_bits
            )));
        }
        Ok(())
    }

    /// Status line shown while the link is open
    pub fn summary(&self) -> String {
        format!("{}: {} bps, {}", self.port_id, self.baud_rate, self.bus_label)
    }
}

impl TerminalOptions {
    pub fn validate(&self) -> TermResult<()> {
        if self.max_lines == 0 {
            return Err(TermError::config("max_lines must be at least 1"));
        }
        if self.filter_delimiter.is_empty() {
            return Err(TermError::config("filter delimiter must not be empty"));
        }
        Ok(())
    }
}

impl LineEnding {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            LineEnding::None => b"",
            LineEnding::Cr => b"\r",
            LineEnding::Lf => b"\n",
            LineEnding::CrLf => b"\r\n",
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parity::None => write!(f, "none"),
            Parity::Odd => write!(f, "odd"),
            Parity::Even => write!(f, "even"),
            Parity::Mark => write!(f, "mark"),
            Parity::Space => write!(f, "space"),
        }
    }
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopBits::One => write!(f, "1"),
            StopBits::OnePointFive => write!(f, "1.5"),
            StopBits::Two => write!(f, "2"),
        }
    }
}

impl fmt::Display for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handshake::None => write!(f, "no handshake"),
            Handshake::XOnXOff => write!(f, "XOnXOff"),
            Handshake::RequestToSend => write!(f, "RequestToSend"),
            Handshake::RequestToSendXOnXOff => write!(f, "RequestToSendXOnXOff"),
        }
    }
}

impl fmt::Display for LineEnding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineEnding::None => write!(f, "none"),
            LineEnding::Cr => write!(f, "cr"),
            LineEnding::Lf => write!(f, "lf"),
            LineEnding::CrLf => write!(f, "crlf"),
        }
    }
}
