//! HTTP sessions
//!
//! A session owns one accepted connection and walks it through
//! handshake, read, dispatch, write and close. Every step runs as a job on
//! the session's [`Strand`], and each job holds an `Arc` to the session, so
//! the session is destroyed as soon as no step remains queued.
//!
//! The transport-specific parts (handshake, graceful close) live behind the
//! [`Transport`] trait, implemented by [`Plain`] and, with the `tls`
//! feature, [`Tls`].

mod plain;
#[cfg(feature = "tls")]
mod tls;

pub use plain::Plain;
#[cfg(feature = "tls")]
pub use tls::Tls;

use crate::codec::{Http1Codec, Limits, ReadError};
use crate::handler::{dispatch, Routes};
use crate::request::Request;
use crate::response::Response;
use crate::strand::Strand;
use crate::tracker::{ConnectionTracker, SessionGuard};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tracing::Instrument;

/// Byte transport underneath a session
pub trait Transport: Send + Sync + 'static {
    /// Stream the HTTP codec reads from and writes to
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Scheme name used in logs
    const SCHEME: &'static str;

    /// First state of a freshly accepted connection
    fn open(&self, tcp: TcpStream, limits: Limits) -> State<Self::Stream>;

    /// Server-side handshake
    fn handshake(&self, tcp: TcpStream) -> impl Future<Output = io::Result<Self::Stream>> + Send;

    /// Graceful shutdown of the write side
    fn close(stream: &mut Self::Stream) -> impl Future<Output = io::Result<()>> + Send;
}

/// A connection that finished its handshake
pub struct Conn<S> {
    stream: S,
    codec: Http1Codec,
}

impl<S> Conn<S> {
    pub fn new(stream: S, limits: Limits) -> Self {
        Self {
            stream,
            codec: Http1Codec::new(limits),
        }
    }
}

/// Session lifecycle
///
/// `Handshaking` only occurs for TLS sessions. `Closing` is entered at most
/// once and is never followed by another read.
pub enum State<S> {
    Handshaking(TcpStream),
    Reading(Conn<S>),
    Dispatching(Conn<S>, Request),
    Writing(Conn<S>, Response),
    Closing(Conn<S>),
    Closed,
}

impl<S> State<S> {
    pub fn name(&self) -> &'static str {
        match self {
            State::Handshaking(_) => "handshaking",
            State::Reading(_) => "reading",
            State::Dispatching(..) => "dispatching",
            State::Writing(..) => "writing",
            State::Closing(_) => "closing",
            State::Closed => "closed",
        }
    }
}

/// Per-session settings copied from the server configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionSettings {
    pub limits: Limits,
    pub read_timeout: Option<Duration>,
}

/// State shared by every session of one listener
pub struct Shared<T> {
    transport: T,
    routes: Arc<Routes>,
    settings: SessionSettings,
    tracker: Arc<ConnectionTracker>,
    handle: Handle,
}

impl<T: Transport> Shared<T> {
    pub fn new(
        transport: T,
        routes: Arc<Routes>,
        settings: SessionSettings,
        tracker: Arc<ConnectionTracker>,
        handle: Handle,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            routes,
            settings,
            tracker,
            handle,
        })
    }
}

/// One HTTP or HTTPS connection
pub struct Session<T: Transport> {
    peer: SocketAddr,
    shared: Arc<Shared<T>>,
    strand: Strand,
    span: tracing::Span,
    guard: SessionGuard,
}

impl<T: Transport> Session<T> {
    /// Take ownership of an accepted socket and begin serving it
    pub fn start(shared: &Arc<Shared<T>>, tcp: TcpStream, peer: SocketAddr) {
        let guard = shared.tracker.open();
        let span = tracing::debug_span!("session", id = guard.id(), %peer, scheme = T::SCHEME);
        let session = Arc::new(Session {
            peer,
            shared: Arc::clone(shared),
            strand: Strand::new(shared.handle.clone()),
            span,
            guard,
        });

        let state = shared.transport.open(tcp, shared.settings.limits);
        session.span.in_scope(|| tracing::debug!("session opened"));
        session.schedule(state);
    }

    fn id(&self) -> u64 {
        self.guard.id()
    }

    fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Queue the next step on the strand
    fn schedule(self: &Arc<Self>, state: State<T::Stream>) {
        let me = Arc::clone(self);
        let span = self.span.clone();
        self.strand.post(
            async move {
                let next = me.step(state).await;
                if !matches!(next, State::Closed) {
                    me.schedule(next);
                }
            }
            .instrument(span),
        );
    }

    async fn step(&self, state: State<T::Stream>) -> State<T::Stream> {
        tracing::trace!(state = state.name(), "step");

        match state {
            State::Handshaking(tcp) => match self.shared.transport.handshake(tcp).await {
                Ok(stream) => State::Reading(Conn::new(stream, self.shared.settings.limits)),
                Err(e) => {
                    self.fail(&e, "handshake");
                    State::Closed
                }
            },

            State::Reading(mut conn) => {
                let mut request = Request::default();
                match self.read(&mut conn, &mut request).await {
                    Ok(()) => State::Dispatching(conn, request),
                    Err(ReadError::EndOfStream) => State::Closing(conn),
                    Err(ReadError::TimedOut) => {
                        tracing::debug!("idle timeout");
                        State::Closing(conn)
                    }
                    Err(e) => {
                        self.fail(&e, "read");
                        State::Closed
                    }
                }
            }

            State::Dispatching(conn, request) => {
                let method = request.method;
                let path = request.path.clone();
                let response = dispatch(&self.shared.routes, request).await;
                tracing::debug!(%method, %path, status = %response.status, "request handled");
                State::Writing(conn, response)
            }

            State::Writing(mut conn, response) => {
                match conn.codec.write_response(&mut conn.stream, &response).await {
                    Ok(_) if response.need_eof() => State::Closing(conn),
                    Ok(_) => State::Reading(conn),
                    Err(e) => {
                        self.fail(&e, "write");
                        State::Closed
                    }
                }
            }

            State::Closing(mut conn) => {
                if let Err(e) = T::close(&mut conn.stream).await {
                    self.fail(&e, "shutdown");
                }
                State::Closed
            }

            State::Closed => State::Closed,
        }
    }

    async fn read(&self, conn: &mut Conn<T::Stream>, request: &mut Request) -> Result<(), ReadError> {
        let read = conn.codec.read_request(&mut conn.stream, request);
        match self.shared.settings.read_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .unwrap_or(Err(ReadError::TimedOut)),
            None => read.await,
        }
    }

    /// Report a failed step; the connection is dropped afterwards
    fn fail(&self, error: &dyn std::error::Error, what: &str) {
        tracing::warn!(session = self.id(), peer = %self.peer(), error = %error, "{} failed", what);
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.span.in_scope(|| tracing::debug!("session closed"));
    }
}

/// Starts sessions of whichever transport a listener serves
#[derive(Clone)]
pub enum SessionFactory {
    Plain(Arc<Shared<Plain>>),
    #[cfg(feature = "tls")]
    Tls(Arc<Shared<Tls>>),
}

impl SessionFactory {
    pub fn start(&self, tcp: TcpStream, peer: SocketAddr) {
        match self {
            SessionFactory::Plain(shared) => Session::start(shared, tcp, peer),
            #[cfg(feature = "tls")]
            SessionFactory::Tls(shared) => Session::start(shared, tcp, peer),
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            SessionFactory::Plain(_) => Plain::SCHEME,
            #[cfg(feature = "tls")]
            SessionFactory::Tls(_) => Tls::SCHEME,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler;
    use crate::Method;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn routes() -> Arc<Routes> {
        let mut routes = Routes::new();
        routes.insert(
            Method::Get.as_str(),
            "/hello",
            handler(|_req| async { Response::text("world") }),
        );
        Arc::new(routes)
    }

    async fn serve(settings: SessionSettings) -> (TcpStream, Arc<ConnectionTracker>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (tcp, peer) = listener.accept().await.unwrap();

        let tracker = ConnectionTracker::new();
        let shared = Shared::new(Plain, routes(), settings, Arc::clone(&tracker), Handle::current());
        Session::start(&shared, tcp, peer);
        (client, tracker)
    }

    /// Read until the buffer holds `count` complete responses to GET /hello
    async fn read_responses(client: &mut TcpStream, count: usize) -> String {
        let mut out = Vec::new();
        let mut buf = [0u8; 1024];
        while String::from_utf8_lossy(&out).matches("world").count() < count {
            let n = client.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed early");
            out.extend_from_slice(&buf[..n]);
        }
        String::from_utf8(out).unwrap()
    }

    async fn wait_for_zero(tracker: &ConnectionTracker) {
        for _ in 0..200 {
            if tracker.active() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session was never destroyed");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_keep_alive_reuses_connection() {
        let (mut client, tracker) = serve(SessionSettings::default()).await;

        for _ in 0..3 {
            client
                .write_all(b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n")
                .await
                .unwrap();
            let text = read_responses(&mut client, 1).await;
            assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        }
        assert_eq!(tracker.accepted(), 1);
        assert_eq!(tracker.active(), 1);

        drop(client);
        wait_for_zero(&tracker).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pipelined_requests_answered_in_order() {
        let (mut client, _tracker) = serve(SessionSettings::default()).await;

        client
            .write_all(b"GET /hello HTTP/1.1\r\n\r\nGET /nope HTTP/1.1\r\n\r\nGET /hello HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        let text = read_responses(&mut client, 2).await;
        let first = text.find("200 OK").unwrap();
        let missing = text.find("404 Not Found").unwrap();
        assert!(first < missing);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_connection_close_ends_session() {
        let (mut client, tracker) = serve(SessionSettings::default()).await;

        client
            .write_all(b"GET /hello HTTP/1.1\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("HTTP/1.1 ").count(), 1);
        assert!(text.contains("connection: close\r\n"));

        wait_for_zero(&tracker).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_no_read_after_close_requested() {
        let (mut client, _tracker) = serve(SessionSettings::default()).await;

        client
            .write_all(b"GET /hello HTTP/1.1\r\nConnection: close\r\n\r\nGET /hello HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        let mut out = Vec::new();
        let _ = client.read_to_end(&mut out).await;
        let text = String::from_utf8_lossy(&out);
        assert_eq!(text.matches("world").count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_http10_closes_by_default() {
        let (mut client, tracker) = serve(SessionSettings::default()).await;

        client.write_all(b"GET /hello HTTP/1.0\r\n\r\n").await.unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("HTTP/1.0 200 OK\r\n"));

        wait_for_zero(&tracker).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_malformed_request_drops_connection() {
        let (mut client, tracker) = serve(SessionSettings::default()).await;

        client.write_all(b"NOT HTTP AT ALL\r\n\r\n").await.unwrap();
        let mut out = Vec::new();
        let _ = client.read_to_end(&mut out).await;
        assert!(out.is_empty());

        wait_for_zero(&tracker).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_clean_eof_destroys_session() {
        let (client, tracker) = serve(SessionSettings::default()).await;
        assert_eq!(tracker.active(), 1);

        drop(client);
        wait_for_zero(&tracker).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_idle_timeout_closes() {
        let settings = SessionSettings {
            read_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let (mut client, tracker) = serve(settings).await;

        let mut out = Vec::new();
        let n = client.read_to_end(&mut out).await.unwrap();
        assert_eq!(n, 0);

        wait_for_zero(&tracker).await;
    }

    #[test]
    fn test_state_names() {
        let state: State<TcpStream> = State::Closed;
        assert_eq!(state.name(), "closed");
    }
}
