//! Byte transports to the debug port
//!
//! The debug port is normally reached over a USB serial adapter, but it can
//! also be reached through a TCP relay (see [crate::relay]). A port name
//! containing a `:` is treated as a `host:port` address.

use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::debug;

use crate::error::{ConnectionError, Error};

/// Default serial data rate
pub const DEFAULT_DATA_RATE: u32 = 6_000_000;
/// Default read timeout, in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A bidirectional byte stream to the debug port
pub trait Transport: Read + Write + Send {}

impl<T: Read + Write + Send> Transport for T {}

/// Settings used when opening a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSettings {
    pub data_rate: u32,
    pub timeout: Duration,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            data_rate: DEFAULT_DATA_RATE,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Whether the port name designates a TCP relay rather than a serial device
pub fn is_tcp_address(port: &str) -> bool {
    port.contains(':')
}

/// Open the transport described by `port`
pub fn open(port: &str, settings: &PortSettings) -> Result<Box<dyn Transport>, Error> {
    if is_tcp_address(port) {
        Ok(Box::new(open_tcp(port, settings)?))
    } else {
        open_serial(port, settings)
    }
}

/// Connect to a TCP relay
pub fn open_tcp(address: &str, settings: &PortSettings) -> Result<TcpStream, Error> {
    let addrs: Vec<SocketAddr> = address.to_socket_addrs()?.collect();
    let mut last_err = None;

    for addr in addrs {
        debug!("Connecting to {addr}");
        match TcpStream::connect_timeout(&addr, TCP_CONNECT_TIMEOUT) {
            Ok(stream) => {
                stream.set_read_timeout(Some(settings.timeout))?;
                stream.set_write_timeout(Some(settings.timeout))?;
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }

    match last_err {
        Some(err) => Err(err.into()),
        None => Err(Error::Connection(ConnectionError::DeviceNotFound)),
    }
}

/// Open a serial device, 8N1 without flow control
#[cfg(feature = "serialport")]
pub fn open_serial(port: &str, settings: &PortSettings) -> Result<Box<dyn Transport>, Error> {
    use serialport::{DataBits, FlowControl, Parity, StopBits};

    debug!("Opening {port} at {} bps", settings.data_rate);

    let serial = serialport::new(port, settings.data_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(settings.timeout)
        .open()?;

    Ok(Box::new(serial))
}

#[cfg(not(feature = "serialport"))]
pub fn open_serial(_port: &str, _settings: &PortSettings) -> Result<Box<dyn Transport>, Error> {
    Err(Error::Connection(ConnectionError::DeviceNotFound))
}

/// Names of the serial ports present on this host
#[cfg(feature = "serialport")]
pub fn available_ports() -> Result<Vec<String>, Error> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|port| port.port_name)
        .collect())
}
