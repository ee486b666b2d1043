use super::{Conn, State, Transport};
use crate::codec::Limits;
use std::io;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Cleartext HTTP over TCP
#[derive(Debug, Clone, Copy, Default)]
pub struct Plain;

impl Transport for Plain {
    type Stream = TcpStream;

    const SCHEME: &'static str = "http";

    fn open(&self, tcp: TcpStream, limits: Limits) -> State<TcpStream> {
        State::Reading(Conn::new(tcp, limits))
    }

    async fn handshake(&self, tcp: TcpStream) -> io::Result<TcpStream> {
        Ok(tcp)
    }

    async fn close(stream: &mut TcpStream) -> io::Result<()> {
        // The peer may already be gone
        match stream.shutdown().await {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            result => result,
        }
    }
}
