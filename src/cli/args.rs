use crate::domain::config::{
    DisplayMode, Handshake, LineEnding, Parity, StopBits, TermConfig,
};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Command line arguments for LineTerm
#[derive(Parser, Debug)]
#[command(
    name = "lineterm",
    version = env!("CARGO_PKG_VERSION"),
    about = "Line-oriented serial terminal",
    long_about = "A line-oriented serial terminal that reconnects automatically, reassembles received data into lines and forwards typed commands to the device."
)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress status output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List available serial ports
    Ports,
    /// Open a port, print received lines and forward stdin as commands
    Monitor(MonitorArgs),
    /// Send one payload and print the lines received shortly after
    Send(SendArgs),
    /// Configuration management commands
    Config(ConfigArgs),
    /// Display version information
    Version,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
    /// Table output
    Table,
    /// CSV output
    Csv,
}

/// Link parameter overrides shared by `monitor` and `send`
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct PortArgs {
    /// Serial port path
    #[arg(short, long)]
    pub port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Data bits
    #[arg(long)]
    pub data_bits: Option<u8>,

    /// Parity
    #[arg(long, value_enum)]
    pub parity: Option<ParityArg>,

    /// Stop bits
    #[arg(long, value_enum)]
    pub stop_bits: Option<StopBitsArg>,

    /// Handshake
    #[arg(long, value_enum)]
    pub handshake: Option<HandshakeArg>,

    /// Terminator appended to sent lines
    #[arg(short, long, value_enum)]
    pub append: Option<AppendArg>,
}

/// Monitor arguments
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub port: PortArgs,

    /// Render received characters as hex
    #[arg(long)]
    pub hex: bool,

    /// Do not echo sent commands into the history
    #[arg(long)]
    pub no_echo: bool,

    /// Only print lines containing one of these terms
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Match filter terms case-sensitively
    #[arg(long)]
    pub case_sensitive: bool,

    /// Maximum number of retained lines
    #[arg(long)]
    pub max_lines: Option<usize>,

    /// Append sealed lines to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Send arguments
#[derive(ClapArgs, Debug, Clone)]
pub struct SendArgs {
    #[command(flatten)]
    pub port: PortArgs,

    /// Data to send
    pub data: String,

    /// Data format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: DataFormat,

    /// Milliseconds to keep reading after sending
    #[arg(short, long, default_value = "500")]
    pub wait: u64,
}

/// Configuration management arguments
#[derive(ClapArgs, Debug)]
pub struct ConfigArgs {
    /// Configuration subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Configuration management subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,
    /// Validate configuration
    Validate {
        /// Configuration file path
        file: Option<PathBuf>,
    },
    /// Create default configuration
    Init {
        /// Project directory (defaults to the current directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// Write the global configuration instead
        #[arg(short, long)]
        global: bool,
    },
    /// Print configuration file locations
    Path,
}

/// Parity argument
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParityArg {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

/// Stop bits argument
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBitsArg {
    #[value(name = "1")]
    One,
    #[value(name = "1.5")]
    OnePointFive,
    #[value(name = "2")]
    Two,
}

/// Handshake argument
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeArg {
    None,
    XonXoff,
    Rts,
    RtsXonXoff,
}

/// Line terminator argument
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendArg {
    None,
    Cr,
    Lf,
    Crlf,
}

/// Data format argument
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Text,
    Hex,
    Base64,
}

impl PortArgs {
    /// Apply the given overrides on top of `config`
    pub fn apply(&self, config: &mut TermConfig) {
        if let Some(port) = &self.port {
            config.port.port_id = port.clone();
        }
        if let Some(baud) = self.baud {
            config.port.baud_rate = baud;
        }
        if let Some(bits) = self.data_bits {
            config.port.data_bits = bits;
        }
        if let Some(parity) = self.parity {
            config.port.parity = parity.into();
        }
        if let Some(stop_bits) = self.stop_bits {
            config.port.stop_bits = stop_bits.into();
        }
        if let Some(handshake) = self.handshake {
            config.port.handshake = handshake.into();
        }
        if let Some(append) = self.append {
            config.options.append_to_send = append.into();
        }
    }
}

impl MonitorArgs {
    pub fn apply(&self, config: &mut TermConfig) {
        self.port.apply(config);
        if self.hex {
            config.options.display_mode = DisplayMode::Hex;
        }
        if self.no_echo {
            config.options.local_echo = false;
        }
        if self.case_sensitive {
            config.options.filter_case_sensitive = true;
        }
        if let Some(max_lines) = self.max_lines {
            config.options.max_lines = max_lines;
        }
        if let Some(log_file) = &self.log_file {
            config.options.log_file = Some(log_file.clone());
        }
    }
}

impl From<ParityArg> for Parity {
    fn from(parity: ParityArg) -> Self {
        match parity {
            ParityArg::None => Self::None,
            ParityArg::Odd => Self::Odd,
            ParityArg::Even => Self::Even,
            ParityArg::Mark => Self::Mark,
            ParityArg::Space => Self::Space,
        }
    }
}

impl From<StopBitsArg> for StopBits {
    fn from(stop_bits: StopBitsArg) -> Self {
        match stop_bits {
            StopBitsArg::One => Self::One,
            StopBitsArg::OnePointFive => Self::OnePointFive,
            StopBitsArg::Two => Self::Two,
        }
    }
}

impl From<HandshakeArg> for Handshake {
    fn from(handshake: HandshakeArg) -> Self {
        match handshake {
            HandshakeArg::None => Self::None,
            HandshakeArg::XonXoff => Self::XOnXOff,
            HandshakeArg::Rts => Self::RequestToSend,
            HandshakeArg::RtsXonXoff => Self::RequestToSendXOnXOff,
        }
    }
}

impl From<AppendArg> for LineEnding {
    fn from(append: AppendArg) -> Self {
        match append {
            AppendArg::None => Self::None,
            AppendArg::Cr => Self::Cr,
            AppendArg::Lf => Self::Lf,
            AppendArg::Crlf => Self::CrLf,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataFormat::Text => write!(f, "text"),
            DataFormat::Hex => write!(f, "hex"),
            DataFormat::Base64 => write!(f, "base64"),
        }
    }
}
