// Serial module - System serial driver and device enumeration
pub mod enumerate;
pub mod port;

pub use enumerate::{find_port, list_ports, PortDescriptor};
pub use port::{SystemPort, SystemPortOpener};
