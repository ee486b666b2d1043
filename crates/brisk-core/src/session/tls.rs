use super::{State, Transport};
use crate::codec::Limits;
use std::io;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;

/// HTTPS: TLS over TCP
///
/// Sessions start in the handshake state; no request is read before the
/// handshake completes. Closing sends `close_notify` before the TCP FIN.
#[derive(Clone)]
pub struct Tls {
    acceptor: TlsAcceptor,
}

impl Tls {
    pub fn new(acceptor: TlsAcceptor) -> Self {
        Self { acceptor }
    }
}

impl Transport for Tls {
    type Stream = TlsStream<TcpStream>;

    const SCHEME: &'static str = "https";

    fn open(&self, tcp: TcpStream, _limits: Limits) -> State<Self::Stream> {
        State::Handshaking(tcp)
    }

    async fn handshake(&self, tcp: TcpStream) -> io::Result<Self::Stream> {
        self.acceptor.accept(tcp).await
    }

    async fn close(stream: &mut Self::Stream) -> io::Result<()> {
        match stream.shutdown().await {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            result => result,
        }
    }
}
