//! Listening socket and accept loop

use crate::session::SessionFactory;
use crate::{Error, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Pause after a failed accept so a full fd table does not spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Socket options for the listening socket
#[derive(Debug, Clone, Copy)]
pub struct BindOptions {
    pub backlog: i32,
    pub reuse_port: bool,
}

impl Default for BindOptions {
    fn default() -> Self {
        Self {
            backlog: 1024,
            reuse_port: false,
        }
    }
}

/// Resolve a listen address such as `"0.0.0.0"`, `"::1"` or `"localhost"`
pub fn resolve(address: &str, port: u16) -> Result<SocketAddr> {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    (address, port)
        .to_socket_addrs()
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", address, e)))?
        .next()
        .ok_or_else(|| Error::InvalidAddress(address.to_string()))
}

/// Create a bound, listening, non-blocking socket
pub fn create_listener(addr: &SocketAddr, options: BindOptions) -> std::io::Result<Socket> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // SO_REUSEADDR - allow binding to address in TIME_WAIT
    socket.set_reuse_address(true)?;

    // SO_REUSEPORT - only when asked, otherwise a second bind must fail
    #[cfg(unix)]
    if options.reuse_port {
        socket.set_reuse_port(true)?;
    }

    socket.set_nonblocking(true)?;
    socket.bind(&(*addr).into())?;
    socket.listen(options.backlog)?;

    Ok(socket)
}

/// A bound listening socket waiting to be driven
#[derive(Debug)]
pub struct Acceptor {
    listener: std::net::TcpListener,
    local_addr: SocketAddr,
}

impl Acceptor {
    /// Bind synchronously so address errors surface to the caller
    pub fn bind(addr: SocketAddr, options: BindOptions) -> Result<Self> {
        let socket = create_listener(&addr, options).map_err(|source| Error::Bind { addr, source })?;
        let listener: std::net::TcpListener = socket.into();
        let local_addr = listener.local_addr()?;

        tracing::debug!(%local_addr, "listening socket bound");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Bound address; reports the real port when bound to port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` turns true or its sender is dropped
    ///
    /// Must be polled inside a tokio runtime. Each accepted socket becomes
    /// a new session; accept failures are logged and accepting continues.
    pub async fn run(
        self,
        sessions: SessionFactory,
        tcp_nodelay: bool,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let listener = TcpListener::from_std(self.listener)?;
        tracing::info!(addr = %self.local_addr, scheme = sessions.scheme(), "accepting connections");

        loop {
            let accepted = tokio::select! {
                biased;

                _ = stop_requested(&mut shutdown) => break,

                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((tcp, peer)) => {
                    if tcp_nodelay {
                        if let Err(e) = tcp.set_nodelay(true) {
                            tracing::debug!(%peer, error = %e, "set_nodelay failed");
                        }
                    }
                    sessions.start(tcp, peer);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }

        tracing::info!(addr = %self.local_addr, "stopped accepting");
        Ok(())
    }
}

/// Resolves once a stop is signalled or the sender is gone
///
/// The borrow guard returned by `wait_for` is dropped here so it never
/// lives across another await.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}
