//! Serial port enumeration.

use crate::port::PortError;
use serde::Serialize;
use serialport::{SerialPortInfo, SerialPortType};
use std::fmt;

/// One serial port present on the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortSummary {
    pub name: String,
    pub kind: PortKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vid: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortKind {
    Usb,
    Pci,
    Bluetooth,
    Unknown,
}

impl From<SerialPortInfo> for PortSummary {
    fn from(info: SerialPortInfo) -> Self {
        let mut summary = PortSummary {
            name: info.port_name,
            kind: PortKind::Unknown,
            manufacturer: None,
            product: None,
            vid: None,
            pid: None,
        };
        match info.port_type {
            SerialPortType::UsbPort(usb) => {
                summary.kind = PortKind::Usb;
                summary.manufacturer = usb.manufacturer;
                summary.product = usb.product;
                summary.vid = Some(usb.vid);
                summary.pid = Some(usb.pid);
            }
            SerialPortType::PciPort => summary.kind = PortKind::Pci,
            SerialPortType::BluetoothPort => summary.kind = PortKind::Bluetooth,
            SerialPortType::Unknown => {}
        }
        summary
    }
}

impl fmt::Display for PortSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        match (&self.manufacturer, self.vid, self.pid) {
            (Some(manufacturer), Some(vid), Some(pid)) => {
                write!(f, " ({manufacturer}, {vid:04x}:{pid:04x})")
            }
            (Some(manufacturer), _, _) => write!(f, " ({manufacturer})"),
            (None, Some(vid), Some(pid)) => write!(f, " ({vid:04x}:{pid:04x})"),
            _ => Ok(()),
        }
    }
}

/// List the serial ports the OS reports, sorted by name.
pub fn list_ports() -> Result<Vec<PortSummary>, PortError> {
    let mut ports: Vec<PortSummary> = serialport::available_ports()?
        .into_iter()
        .map(PortSummary::from)
        .collect();
    ports.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::debug!(count = ports.len(), "enumerated serial ports");
    Ok(ports)
}
