//! System serial driver behind the transport's port traits.

use crate::core::transport::{PortHandle, PortOpener, TransportError};
use crate::domain::config::{Handshake, Parity, StopBits, TransportConfig};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// Opens real devices through the `serialport` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortOpener;

impl PortOpener for SystemPortOpener {
    fn open(
        &self,
        config: &TransportConfig,
        timeout: Duration,
    ) -> Result<Box<dyn PortHandle>, TransportError> {
        let port = serialport::new(config.port_id.as_str(), config.baud_rate)
            .data_bits(data_bits(config.data_bits)?)
            .parity(parity(config.parity)?)
            .stop_bits(stop_bits(config.stop_bits)?)
            .flow_control(flow_control(config.handshake)?)
            .timeout(timeout)
            .open()
            .map_err(|e| TransportError::classify_open_error(&config.port_id, e))?;

        debug!("Driver opened {}", config.port_id);
        Ok(Box::new(SystemPort {
            port,
            name: config.port_id.clone(),
        }))
    }
}

/// An open system serial port.
pub struct SystemPort {
    port: Box<dyn serialport::SerialPort>,
    name: String,
}

impl PortHandle for SystemPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, TransportError> {
        match self.port.read(buffer) {
            Ok(0) => Err(TransportError::Timeout),
            Ok(n) => Ok(n),
            Err(e) => Err(TransportError::from_io_error(&self.name, e)),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.port
            .write_all(data)
            .and_then(|_| self.port.flush())
            .map_err(|e| TransportError::from_io_error(&self.name, e))
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| TransportError::classify_open_error(&self.name, e))
    }
}

impl std::fmt::Debug for SystemPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemPort")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate().ok())
            .finish()
    }
}

fn data_bits(bits: u8) -> Result<serialport::DataBits, TransportError> {
    match bits {
        5 => Ok(serialport::DataBits::Five),
        6 => Ok(serialport::DataBits::Six),
        7 => Ok(serialport::DataBits::Seven),
        8 => Ok(serialport::DataBits::Eight),
        other => Err(TransportError::Config(format!("{} data bits", other))),
    }
}

fn parity(parity: Parity) -> Result<serialport::Parity, TransportError> {
    match parity {
        Parity::None => Ok(serialport::Parity::None),
        Parity::Odd => Ok(serialport::Parity::Odd),
        Parity::Even => Ok(serialport::Parity::Even),
        Parity::Mark | Parity::Space => Err(TransportError::Config(format!(
            "{} parity is not supported by the serial driver",
            parity
        ))),
    }
}

fn stop_bits(stop_bits: StopBits) -> Result<serialport::StopBits, TransportError> {
    match stop_bits {
        StopBits::One => Ok(serialport::StopBits::One),
        StopBits::Two => Ok(serialport::StopBits::Two),
        StopBits::OnePointFive => Err(TransportError::Config(
            "1.5 stop bits are not supported by the serial driver".to_string(),
        )),
    }
}

fn flow_control(handshake: Handshake) -> Result<serialport::FlowControl, TransportError> {
    match handshake {
        Handshake::None => Ok(serialport::FlowControl::None),
        Handshake::XOnXOff => Ok(serialport::FlowControl::Software),
        Handshake::RequestToSend => Ok(serialport::FlowControl::Hardware),
        Handshake::RequestToSendXOnXOff => Err(TransportError::Config(
            "combined hardware and software handshake is not supported".to_string(),
        )),
    }
}
