//! TCP to serial relay
//!
//! Lets a remote host drive a machine attached to this one. Every request
//! frame received from a TCP client is forwarded unchanged over a freshly
//! opened transport, and the response is passed back unchanged.
//!
//! Each client runs on its own thread. Transactions from different clients
//! against the same serial device are not serialized with each other.

use std::{
    fmt,
    io::{Read, Write},
    net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    sync::Arc,
    thread,
};

use log::{debug, info, warn};

use crate::{
    connection::{
        command::{RequestHeader, HEADER_LEN},
        transport::Transport,
    },
    error::Error,
};

/// Opens the device side of one relayed transaction
pub trait TransportOpener: Send + Sync + 'static {
    fn open(&self) -> Result<Box<dyn Transport>, Error>;
}

impl<F> TransportOpener for F
where
    F: Fn() -> Result<Box<dyn Transport>, Error> + Send + Sync + 'static,
{
    fn open(&self) -> Result<Box<dyn Transport>, Error> {
        self()
    }
}

/// A listening relay server
pub struct Relay {
    listener: TcpListener,
    opener: Arc<dyn TransportOpener>,
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("listener", &self.listener)
            .finish_non_exhaustive()
    }
}

impl Relay {
    pub fn bind(address: impl ToSocketAddrs, opener: impl TransportOpener) -> Result<Self, Error> {
        let listener = TcpListener::bind(address)?;

        Ok(Self {
            listener,
            opener: Arc::new(opener),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients forever
    pub fn serve(self) -> Result<(), Error> {
        info!("Listening for connections on {}", self.local_addr()?);

        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    warn!("Error accepting connection: {err}");
                    continue;
                }
            };

            let opener = self.opener.clone();
            thread::spawn(move || handle_client(stream, opener.as_ref()));
        }

        Ok(())
    }
}

fn handle_client(mut stream: TcpStream, opener: &dyn TransportOpener) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown peer".into());
    info!("Received connection from {peer}");

    loop {
        match relay_transaction(&mut stream, opener) {
            Ok(true) => {}
            Ok(false) => {
                info!("Connection from {peer} closed");
                break;
            }
            Err(err) => {
                warn!("Relay for {peer} failed: {err}");
                break;
            }
        }
    }
}

/// Relay one request/response pair
///
/// Returns `false` when the client closed the connection before sending
/// another request.
pub fn relay_transaction<C>(client: &mut C, opener: &dyn TransportOpener) -> Result<bool, Error>
where
    C: Read + Write + ?Sized,
{
    let mut header = [0u8; HEADER_LEN];
    if client.read(&mut header[..1])? == 0 {
        return Ok(false);
    }
    client.read_exact(&mut header[1..])?;

    let parsed = RequestHeader::from_bytes(header);
    let command = parsed.command_type();
    let length = parsed.length() as usize;

    let request_data = command.is_some_and(|c| c.has_request_data());
    let mut request = header.to_vec();
    request.resize(HEADER_LEN + if request_data { length } else { 0 } + 1, 0);
    client.read_exact(&mut request[HEADER_LEN..])?;

    debug!(
        "Relaying {} byte request for command {:#04x}",
        request.len(),
        parsed.command
    );

    let response = {
        let mut device = opener.open()?;
        device.write_all(&request)?;
        device.flush()?;

        let response_data = command.is_some_and(|c| c.has_response_data());
        let mut response = vec![0u8; 3 + if response_data { length } else { 0 } + 1];
        device.read_exact(&mut response)?;
        response
    };

    client.write_all(&response)?;
    client.flush()?;

    Ok(true)
}
