//! TCP server for the simulated switch controller.
//!
//! Accepts incoming connections and runs one SCPI handler task per
//! connection against the shared device.

use crate::config::Config;
use crate::device::DeviceState;
use crate::protocols::scpi;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Listen backlog
const BACKLOG: i32 = 1024;

/// Server instance
pub struct Server {
    config: Config,
    device: Arc<DeviceState>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        let device = DeviceState::new(config.actuation_delay);

        Server { config, device }
    }

    /// Bind the configured address and serve forever
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = self.bind()?;
        info!(
            host = %self.config.host,
            port = self.config.port,
            "Server listening"
        );

        self.serve(listener).await;
        Ok(())
    }

    /// Create the address-reusable listening socket
    pub fn bind(&self) -> io::Result<TcpListener> {
        let addr = (self.config.host.as_str(), self.config.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("cannot resolve {}", self.config.host),
                )
            })?;

        TcpListener::from_std(create_listener(addr)?)
    }

    /// Accept connections until the process is stopped
    pub async fn serve(&self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "New connection");

                    let device = Arc::clone(&self.device);
                    let idle_timeout = self.config.idle_timeout;

                    tokio::spawn(async move {
                        if let Err(e) =
                            scpi::handle_connection(stream, addr, device, idle_timeout).await
                        {
                            warn!(peer = %addr, error = %e, "Connection error");
                        }
                        debug!(peer = %addr, "Connection closed");
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Get a reference to the device for testing
    #[cfg(test)]
    pub fn device(&self) -> &Arc<DeviceState> {
        &self.device
    }
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;

    Ok(socket.into())
}
