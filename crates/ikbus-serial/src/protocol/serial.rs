//! Serial port handling
//!
//! Port discovery, opening, and the fixed I/K-bus line discipline.

use serde::Serialize;
use serialport::{DataBits, FlowControl, Parity, SerialPortInfo, SerialPortType, StopBits};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::io;
use std::time::Duration;

use super::stream::{PortHandle, SystemPort};
use super::{IKBUS_BAUD_RATE, NATIVE_TIMEOUT_MS};

/// Electrical and framing parameters of a serial line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineParameters {
    /// Bits per second
    pub baud_rate: u32,
    /// Data bits per character
    pub data_bits: DataBits,
    /// Stop bits per character
    pub stop_bits: StopBits,
    /// Parity mode
    pub parity: Parity,
    /// Flow control mode
    pub flow_control: FlowControl,
}

impl LineParameters {
    /// I/K-bus line discipline: 9600 8E1 with RTS/CTS flow control in both directions
    pub const IKBUS: LineParameters = LineParameters {
        baud_rate: IKBUS_BAUD_RATE,
        data_bits: DataBits::Eight,
        stop_bits: StopBits::One,
        parity: Parity::Even,
        flow_control: FlowControl::Hardware,
    };
}

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,

    /// Serial number (if available)
    pub serial_number: Option<String>,
}

impl PortInfo {
    /// Port known only by name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb_info) => Self {
                name: info.port_name,
                vid: Some(usb_info.vid),
                pid: Some(usb_info.pid),
                manufacturer: usb_info.manufacturer,
                product: usb_info.product,
                serial_number: usb_info.serial_number,
            },
            _ => Self::named(info.port_name),
        }
    }
}

/// Native serial layer: opens ports and enumerates them
pub trait SerialTransport {
    /// Handle type produced by [`SerialTransport::open`]
    type Handle: PortHandle;

    /// Open the named port
    fn open(&self, port_name: &str) -> io::Result<Self::Handle>;

    /// Ports currently present, empty when there are none
    fn list_ports(&self) -> Vec<PortInfo>;
}

/// [`SerialTransport`] over the host's serial ports
#[derive(Debug, Clone)]
pub struct SystemTransport {
    /// Timeout of each native read or write call
    pub timeout: Duration,
}

impl Default for SystemTransport {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(NATIVE_TIMEOUT_MS),
        }
    }
}

impl SerialTransport for SystemTransport {
    type Handle = SystemPort;

    fn open(&self, port_name: &str) -> io::Result<SystemPort> {
        let port = serialport::new(port_name, IKBUS_BAUD_RATE)
            .timeout(self.timeout)
            .open()?;
        Ok(SystemPort::new(port_name, port))
    }

    fn list_ports(&self) -> Vec<PortInfo> {
        list_ports()
    }
}

/// Helper used to sort port names so that:
///  - ttyACM* ports come first (sorted numerically by suffix)
///  - then ttyUSB* ports (sorted numerically)
///  - then other ports (sorted by name)
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (1, num, basename.to_string());
    }
    (2, 0, basename.to_string())
}

/// List all available serial ports, with /dev fallbacks and deterministic ordering
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    match serialport::available_ports() {
        Ok(ports) => {
            for info in ports {
                let p = PortInfo::from(info);
                map.entry(p.name.clone()).or_insert(p);
            }
        }
        Err(e) => tracing::debug!("serial port enumeration failed: {e}"),
    }

    // Adapters the enumeration API misses still show up in /dev
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyACM") || fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone())
                        .or_insert_with(|| PortInfo::named(full));
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    sort_ports(&mut v);
    v
}

pub(crate) fn port_names(ports: Vec<PortInfo>) -> Vec<String> {
    ports.into_iter().map(|p| p.name).collect()
}

fn sort_ports(ports: &mut [PortInfo]) {
    ports.sort_by_key(|p| port_sort_key(&p.name));
}

/// Apply the I/K-bus line parameters to a freshly opened port
pub fn configure_port<H: PortHandle + ?Sized>(port: &mut H) -> io::Result<()> {
    let params = LineParameters::IKBUS;
    port.configure(&params)?;
    tracing::debug!(
        port = %port.name(),
        baud = params.baud_rate,
        "configured 8E1 with RTS/CTS flow control"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_ports() {
        // This test just ensures the function doesn't panic
        let ports = list_ports();
        for port in &ports {
            println!("Found port: {} - {:?}", port.name, port.product);
        }
    }

    #[test]
    fn test_port_info_json() {
        let mut info = PortInfo::named("/dev/ttyUSB0");
        info.vid = Some(0x0403);
        info.product = Some("FT232R USB UART".to_string());

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "/dev/ttyUSB0",
                "vid": 1027,
                "pid": null,
                "manufacturer": null,
                "product": "FT232R USB UART",
                "serial_number": null
            })
        );
    }

    #[test]
    fn test_ikbus_line_parameters() {
        let params = LineParameters::IKBUS;
        assert_eq!(params.baud_rate, 9600);
        assert_eq!(params.data_bits, DataBits::Eight);
        assert_eq!(params.stop_bits, StopBits::One);
        assert_eq!(params.parity, Parity::Even);
        assert_eq!(params.flow_control, FlowControl::Hardware);
    }

    #[test]
    fn test_port_sorting() {
        let names = vec![
            "/dev/ttyUSB1",
            "/dev/ttyACM1",
            "/dev/ttyUSB0",
            "/dev/ttyACM0",
            "/dev/someport",
            "/dev/ttyACM10",
        ];
        let mut ports: Vec<PortInfo> = names.into_iter().map(PortInfo::named).collect();

        sort_ports(&mut ports);

        assert_eq!(
            port_names(ports),
            vec![
                "/dev/ttyACM0",
                "/dev/ttyACM1",
                "/dev/ttyACM10",
                "/dev/ttyUSB0",
                "/dev/ttyUSB1",
                "/dev/someport",
            ]
        );
    }
}
