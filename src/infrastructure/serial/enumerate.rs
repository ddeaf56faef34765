//! Listing of serial devices known to the operating system.

use crate::core::transport::TransportError;
use crate::domain::config::TransportConfig;
use serde::Serialize;
use serialport::{SerialPortInfo, SerialPortType};
use tabled::Tabled;

/// An available port and a human-readable description of its bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Tabled)]
pub struct PortDescriptor {
    #[tabled(rename = "Port")]
    pub id: String,
    #[tabled(rename = "Description")]
    pub label: String,
}

impl PortDescriptor {
    /// Link parameters for this port with the bus label filled in.
    pub fn apply_to(&self, config: &mut TransportConfig) {
        config.port_id = self.id.clone();
        config.bus_label = self.label.clone();
    }
}

impl From<SerialPortInfo> for PortDescriptor {
    fn from(info: SerialPortInfo) -> Self {
        Self {
            label: describe(&info.port_type),
            id: info.port_name,
        }
    }
}

pub fn list_ports() -> Result<Vec<PortDescriptor>, TransportError> {
    let mut ports: Vec<PortDescriptor> = serialport::available_ports()
        .map_err(|e| TransportError::invalid_state("port enumeration", e.description))?
        .into_iter()
        .map(PortDescriptor::from)
        .collect();

    ports.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(ports)
}

/// Find the descriptor for `port_id`, if the system lists it.
pub fn find_port(port_id: &str) -> Option<PortDescriptor> {
    list_ports()
        .ok()?
        .into_iter()
        .find(|port| port.id == port_id)
}

fn describe(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb) => {
            let name = match (&usb.manufacturer, &usb.product) {
                (Some(manufacturer), Some(product)) => format!("{} {}", manufacturer, product),
                (None, Some(product)) => product.clone(),
                (Some(manufacturer), None) => manufacturer.clone(),
                (None, None) => "USB Serial Device".to_string(),
            };
            format!("{} ({:04x}:{:04x})", name, usb.vid, usb.pid)
        }
        SerialPortType::PciPort => "PCI Serial Port".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth Serial Port".to_string(),
        SerialPortType::Unknown => "Serial Port".to_string(),
    }
}
