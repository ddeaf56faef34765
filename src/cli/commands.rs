use crate::cli::args::{Args, Command, ConfigCommand, DataFormat, MonitorArgs, SendArgs};
use crate::cli::output::{ConsoleWriter, OutputWriter};
use crate::core::lines::{FilterSpec, LineEvent, LineTag};
use crate::core::session::{LineSink, SerialSession};
use crate::core::status::StatusSnapshot;
use crate::domain::config::TermConfig;
use crate::domain::error::{TermError, TermResult};
use crate::infrastructure::config::ConfigManager;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::serial::{find_port, list_ports, SystemPortOpener};
use base64::Engine;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

/// Execute CLI command
pub async fn execute_command(args: Args) -> TermResult<()> {
    let writer = ConsoleWriter::new(args.output).quiet(args.quiet);

    let config_manager = ConfigManager::new()?;
    let config = match &args.config {
        Some(path) => config_manager.load_config_from_path(path)?,
        None => config_manager.load_config()?,
    };

    if !args.quiet {
        init_logging(&config.log_level, args.verbose)?;
    }

    match args.command {
        Command::Ports => {
            let ports = list_ports()?;
            writer.write_ports(&ports)?;
            Ok(())
        }
        Command::Monitor(monitor_args) => execute_monitor(monitor_args, &writer, config).await,
        Command::Send(send_args) => execute_send(send_args, &writer, config).await,
        Command::Config(config_args) => {
            execute_config_command(config_args.command, &writer, &config, &config_manager)
        }
        Command::Version => {
            writer.write_message(&format!("lineterm {}", env!("CARGO_PKG_VERSION")))?;
            Ok(())
        }
    }
}

/// Prints sealed lines that pass the filter and every status change.
struct LinePrinter<'a> {
    writer: &'a ConsoleWriter,
    filter: FilterSpec,
}

impl LineSink for LinePrinter<'_> {
    fn line_event(&mut self, event: &LineEvent) {
        if let LineEvent::Sealed(record) = event {
            if self.filter.matches(&record.text) {
                if let Err(e) = self.writer.write_line(record) {
                    warn!("Failed to print line: {}", e);
                }
            }
        }
    }

    fn status_changed(&mut self, status: &StatusSnapshot) {
        if let Err(e) = self.writer.write_status(status) {
            warn!("Failed to print status: {}", e);
        }
    }
}

impl LinePrinter<'_> {
    /// Print the unterminated line left at shutdown.
    fn finish(&self, session: &SerialSession) -> TermResult<()> {
        if let Some(partial) = session.lines().partial_line() {
            if partial.tag == LineTag::Received && self.filter.matches(&partial.text) {
                self.writer.write_line(partial)?;
            }
        }
        Ok(())
    }
}

fn open_session(mut config: TermConfig) -> TermResult<SerialSession> {
    config.validate()?;
    if let Some(port) = find_port(&config.port.port_id) {
        port.apply_to(&mut config.port);
    }
    SerialSession::new(config, Arc::new(SystemPortOpener))
}

async fn execute_monitor(
    args: MonitorArgs,
    writer: &ConsoleWriter,
    mut config: TermConfig,
) -> TermResult<()> {
    args.apply(&mut config);
    let mut session = open_session(config)?;
    if let Some(filter) = &args.filter {
        session.set_filter(filter);
    }

    let mut printer = LinePrinter {
        writer,
        filter: session.filter().clone(),
    };
    let mut status = session.subscribe_status();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    session.connect()?;
    writer.write_status(&status.borrow_and_update())?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                break;
            }
            chunk = session.recv() => match chunk {
                Some(chunk) => session.dispatch(&chunk, &mut printer),
                None => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status.borrow_and_update().clone();
                writer.write_status(&snapshot)?;
            }
            line = stdin.next_line() => match line? {
                Some(line) => {
                    if let Err(e) = session.send(&line) {
                        writer.write_error(&e.to_string())?;
                    }
                    session.flush_events(&mut printer);
                }
                None => {
                    debug!("Input closed");
                    break;
                }
            },
        }
    }

    session.disconnect()?;
    session.process_pending(&mut printer);
    printer.finish(&session)
}

async fn execute_send(args: SendArgs, writer: &ConsoleWriter, mut config: TermConfig) -> TermResult<()> {
    args.port.apply(&mut config);
    let payload = decode_payload(&args.data, args.format)?;

    let mut session = open_session(config)?;
    let mut printer = LinePrinter {
        writer,
        filter: FilterSpec::all(),
    };

    session.connect()?;
    if !session.is_connected() {
        let status = session.status();
        session.disconnect()?;
        return Err(TermError::Io(io::Error::new(
            io::ErrorKind::NotConnected,
            status.text,
        )));
    }

    session.send_bytes(&payload)?;
    session.flush_events(&mut printer);

    let deadline = tokio::time::sleep(Duration::from_millis(args.wait));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            chunk = session.recv() => match chunk {
                Some(chunk) => session.dispatch(&chunk, &mut printer),
                None => break,
            },
        }
    }

    session.disconnect()?;
    session.process_pending(&mut printer);
    printer.finish(&session)
}

/// Decode a command line payload in the given format.
pub fn decode_payload(data: &str, format: DataFormat) -> TermResult<Vec<u8>> {
    match format {
        DataFormat::Text => Ok(data.as_bytes().to_vec()),
        DataFormat::Hex => {
            let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
            hex::decode(compact)
                .map_err(|e| TermError::InvalidInput(format!("invalid hex payload: {}", e)))
        }
        DataFormat::Base64 => base64::engine::general_purpose::STANDARD
            .decode(data.trim())
            .map_err(|e| TermError::InvalidInput(format!("invalid base64 payload: {}", e))),
    }
}

fn execute_config_command(
    command: ConfigCommand,
    writer: &ConsoleWriter,
    config: &TermConfig,
    config_manager: &ConfigManager,
) -> TermResult<()> {
    match command {
        ConfigCommand::Show => {
            writer.write_config(config)?;
        }
        ConfigCommand::Validate { file } => {
            match file {
                Some(path) => {
                    config_manager.load_config_from_path(&path)?;
                }
                None => config.validate()?,
            }
            writer.write_message("Configuration is valid")?;
        }
        ConfigCommand::Init { dir, global } => {
            let path = if global {
                let path = config_manager.get_global_config_path_ref().clone();
                if path.exists() {
                    return Err(TermError::config(format!(
                        "Global configuration already exists at {}",
                        path.display()
                    )));
                }
                config_manager.save_config(&TermConfig::default())?;
                path
            } else {
                let dir = match dir {
                    Some(dir) => dir,
                    None => std::env::current_dir()?,
                };
                config_manager.init_project_config(&dir)?
            };
            writer.write_message(&format!("Created {}", path.display()))?;
        }
        ConfigCommand::Path => {
            writer.write_message(&format!(
                "global: {}",
                config_manager.get_global_config_path_ref().display()
            ))?;
            let project = config_manager
                .get_project_config_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "none".to_string());
            writer.write_message(&format!("project: {}", project))?;
        }
    }
    Ok(())
}
