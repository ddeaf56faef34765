use crate::cli::args::OutputFormat;
use crate::core::lines::LineRecord;
use crate::core::status::StatusSnapshot;
use crate::domain::config::TermConfig;
use crate::infrastructure::serial::PortDescriptor;
use std::io;
use tabled::{Table, Tabled};

/// Output writer trait for different formats
pub trait OutputWriter {
    fn write_ports(&self, ports: &[PortDescriptor]) -> Result<(), OutputError>;
    fn write_config(&self, config: &TermConfig) -> Result<(), OutputError>;
    fn write_line(&self, line: &LineRecord) -> Result<(), OutputError>;
    fn write_status(&self, status: &StatusSnapshot) -> Result<(), OutputError>;
    fn write_message(&self, message: &str) -> Result<(), OutputError>;
    fn write_error(&self, error: &str) -> Result<(), OutputError>;
}

/// Output formatting errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("TOML serialization error: {0}")]
    TomlError(#[from] toml::ser::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl From<OutputError> for crate::domain::error::TermError {
    fn from(err: OutputError) -> Self {
        Self::Output(err.to_string())
    }
}

/// Console output writer
///
/// Data goes to stdout; status and errors go to stderr so that piping the
/// output yields only terminal lines.
pub struct ConsoleWriter {
    format: OutputFormat,
    quiet: bool,
}

impl ConsoleWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            quiet: false,
        }
    }

    /// Suppress status messages
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }
}

impl OutputWriter for ConsoleWriter {
    fn write_ports(&self, ports: &[PortDescriptor]) -> Result<(), OutputError> {
        print!("{}", format_ports(self.format, ports)?);
        Ok(())
    }

    fn write_config(&self, config: &TermConfig) -> Result<(), OutputError> {
        print!("{}", format_config(self.format, config)?);
        Ok(())
    }

    fn write_line(&self, line: &LineRecord) -> Result<(), OutputError> {
        println!("{}", format_line(self.format, line)?);
        Ok(())
    }

    fn write_status(&self, status: &StatusSnapshot) -> Result<(), OutputError> {
        if self.quiet {
            return Ok(());
        }
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "status": status.state.to_string(),
                    "text": status.text,
                });
                eprintln!("{}", serde_json::to_string(&output)?);
            }
            _ => eprintln!("[{}]", status.text),
        }
        Ok(())
    }

    fn write_message(&self, message: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "message": message,
                    "level": "info"
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            _ => {
                println!("{}", message);
            }
        }
        Ok(())
    }

    fn write_error(&self, error: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "error": error,
                    "level": "error"
                });
                eprintln!("{}", serde_json::to_string_pretty(&output)?);
            }
            _ => {
                eprintln!("Error: {}", error);
            }
        }
        Ok(())
    }
}

/// Render the port list; the result ends with a newline unless empty.
pub fn format_ports(format: OutputFormat, ports: &[PortDescriptor]) -> Result<String, OutputError> {
    let mut out = String::new();
    match format {
        OutputFormat::Text => {
            if ports.is_empty() {
                out.push_str("No serial ports found\n");
            }
            for port in ports {
                out.push_str(&format!("{}\t{}\n", port.id, port.label));
            }
        }
        OutputFormat::Json => {
            out.push_str(&serde_json::to_string_pretty(ports)?);
            out.push('\n');
        }
        OutputFormat::Table => {
            if !ports.is_empty() {
                out.push_str(&Table::new(ports).to_string());
                out.push('\n');
            }
        }
        OutputFormat::Csv => {
            out.push_str("id,label\n");
            for port in ports {
                out.push_str(&format!("{},{}\n", csv_field(&port.id), csv_field(&port.label)));
            }
        }
    }
    Ok(out)
}

pub fn format_config(format: OutputFormat, config: &TermConfig) -> Result<String, OutputError> {
    let out = match format {
        OutputFormat::Text => toml::to_string_pretty(config)?,
        OutputFormat::Json => format!("{}\n", serde_json::to_string_pretty(config)?),
        OutputFormat::Table => {
            let rows = config_rows(config);
            format!("{}\n", Table::new(rows))
        }
        OutputFormat::Csv => {
            let mut csv = "key,value\n".to_string();
            for row in config_rows(config) {
                csv.push_str(&format!("{},{}\n", row.key, csv_field(&row.value)));
            }
            csv
        }
    };
    Ok(out)
}

/// Render one line without a trailing newline.
pub fn format_line(format: OutputFormat, line: &LineRecord) -> Result<String, OutputError> {
    let out = match format {
        OutputFormat::Text => line.text.clone(),
        OutputFormat::Json => serde_json::to_string(line)?,
        OutputFormat::Table => format!("{:>6} {} | {}", line.sequence_id, line.tag, line.text),
        OutputFormat::Csv => format!("{},{},{}", line.sequence_id, line.tag, csv_field(&line.text)),
    };
    Ok(out)
}

/// Table row for configuration values
#[derive(Tabled)]
struct ConfigRow {
    key: &'static str,
    value: String,
}

fn config_rows(config: &TermConfig) -> Vec<ConfigRow> {
    let port = &config.port;
    let options = &config.options;
    let row = |key, value: String| ConfigRow { key, value };

    vec![
        row("log_level", config.log_level.clone()),
        row("port", port.port_id.clone()),
        row("bus_label", port.bus_label.clone()),
        row("baud_rate", port.baud_rate.to_string()),
        row("data_bits", port.data_bits.to_string()),
        row("parity", port.parity.to_string()),
        row("stop_bits", port.stop_bits.to_string()),
        row("handshake", port.handshake.to_string()),
        row("append_to_send", format!("{:?}", options.append_to_send)),
        row("display_mode", format!("{:?}", options.display_mode)),
        row("local_echo", options.local_echo.to_string()),
        row("filter_case_sensitive", options.filter_case_sensitive.to_string()),
        row("max_lines", options.max_lines.to_string()),
        row("filter_delimiter", options.filter_delimiter.clone()),
        row(
            "log_file",
            options
                .log_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        ),
    ]
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
