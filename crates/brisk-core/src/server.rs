//! Server façade
//!
//! ```no_run
//! use brisk_core::{Response, Server};
//!
//! let mut server = Server::new();
//! server
//!     .get("/hello", |_req| async { Response::text("world") })
//!     .listen(8080, "0.0.0.0")
//!     .unwrap();
//! server.run().unwrap();
//! ```

use crate::acceptor::{self, Acceptor, BindOptions};
use crate::config::ServerConfig;
use crate::context::ExecutionContext;
use crate::handler::{handler, Routes};
use crate::session::{Plain, SessionFactory, SessionSettings, Shared};
use crate::tracker::ConnectionTracker;
use crate::{Error, Method, Request, Response, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;

#[cfg(feature = "tls")]
use crate::session::Tls;
#[cfg(feature = "tls")]
use crate::tls::TlsConfig;
#[cfg(feature = "tls")]
use tokio_rustls::TlsAcceptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

/// Embeddable HTTP/HTTPS server
pub struct Server {
    config: ServerConfig,
    context: Arc<ExecutionContext>,
    /// The context was created by this server and is stopped with it
    owns_context: bool,
    routes: Routes,
    /// Route table shared with sessions once started
    frozen: Option<Arc<Routes>>,
    acceptor: Option<Acceptor>,
    endpoint: Option<SocketAddr>,
    shutdown: Arc<watch::Sender<bool>>,
    tracker: Arc<ConnectionTracker>,
    lifecycle: Lifecycle,
    #[cfg(feature = "tls")]
    tls: Option<TlsAcceptor>,
}

impl Server {
    /// Plaintext server with the default configuration
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            context: ExecutionContext::new(),
            owns_context: true,
            routes: Routes::new(),
            frozen: None,
            acceptor: None,
            endpoint: None,
            shutdown: Arc::new(shutdown),
            tracker: ConnectionTracker::new(),
            lifecycle: Lifecycle::Idle,
            #[cfg(feature = "tls")]
            tls: None,
        }
    }

    /// HTTPS server: every accepted connection performs a TLS handshake
    #[cfg(feature = "tls")]
    pub fn with_tls(tls: TlsConfig) -> Result<Self> {
        Self::new().tls(tls)
    }

    /// Run on a shared execution context instead of a private one
    ///
    /// A shared context is left running by [`Server::stop`].
    pub fn with_context(context: Arc<ExecutionContext>) -> Self {
        Self::new().context(context)
    }

    /// Replace the configuration
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Switch to TLS sessions using the given certificate material
    #[cfg(feature = "tls")]
    pub fn tls(mut self, tls: TlsConfig) -> Result<Self> {
        self.tls = Some(tls.acceptor()?);
        Ok(self)
    }

    pub fn context(mut self, context: Arc<ExecutionContext>) -> Self {
        self.context = context;
        self.owns_context = false;
        self
    }

    /// Bind the listening socket
    ///
    /// Binding happens immediately so an address in use or an invalid
    /// address is reported here. Port 0 picks an ephemeral port; see
    /// [`Server::endpoint`].
    pub fn listen(&mut self, port: u16, address: &str) -> Result<&mut Self> {
        match self.lifecycle {
            Lifecycle::Idle if self.shutdown_requested() => return Err(Error::Stopped),
            Lifecycle::Idle => {}
            Lifecycle::Running => return Err(Error::AlreadyRunning),
            Lifecycle::Stopped => return Err(Error::Stopped),
        }

        let addr = acceptor::resolve(address, port)?;
        let acceptor = Acceptor::bind(
            addr,
            BindOptions {
                backlog: self.config.backlog,
                reuse_port: self.config.reuse_port,
            },
        )?;

        self.endpoint = Some(acceptor.local_addr());
        self.acceptor = Some(acceptor);
        Ok(self)
    }

    /// Register a route; the first registered match wins
    pub fn route<F, Fut>(&mut self, method: Method, path: &str, f: F) -> &mut Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        if self.lifecycle != Lifecycle::Idle {
            tracing::warn!(%method, path, "route registered after start ignored");
            return self;
        }
        self.routes.insert(method.as_str(), path, handler(f));
        self
    }

    pub fn get<F, Fut>(&mut self, path: &str, f: F) -> &mut Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.route(Method::Get, path, f)
    }

    pub fn put<F, Fut>(&mut self, path: &str, f: F) -> &mut Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.route(Method::Put, path, f)
    }

    pub fn post<F, Fut>(&mut self, path: &str, f: F) -> &mut Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.route(Method::Post, path, f)
    }

    pub fn options<F, Fut>(&mut self, path: &str, f: F) -> &mut Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.route(Method::Options, path, f)
    }

    /// Register a DELETE route
    pub fn del<F, Fut>(&mut self, path: &str, f: F) -> &mut Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.route(Method::Delete, path, f)
    }

    pub fn patch<F, Fut>(&mut self, path: &str, f: F) -> &mut Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.route(Method::Patch, path, f)
    }

    pub fn head<F, Fut>(&mut self, path: &str, f: F) -> &mut Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.route(Method::Head, path, f)
    }

    /// Start accepting on `concurrency` worker threads and return
    pub fn start(&mut self, concurrency: usize) -> Result<()> {
        self.check_startable()?;
        let handle = self.context.start(concurrency)?;
        let accept = self.launch(handle.clone())?;
        handle.spawn(accept);
        Ok(())
    }

    /// Serve on the calling thread until stopped
    ///
    /// Listens on the configured port and hostname if `listen` was never
    /// called, and starts `config.workers` worker threads. The calling
    /// thread drives the accept loop while the workers run sessions.
    /// Returns once [`ShutdownHandle::stop`] is called; the context is
    /// released before returning.
    ///
    /// On a server already started with [`Server::start`] this only blocks
    /// until a shutdown is requested.
    pub fn run(&mut self) -> Result<()> {
        if self.lifecycle == Lifecycle::Running {
            let handle = self.context.handle().ok_or(Error::NotListening)?;
            let mut stopped = self.shutdown.subscribe();
            let _ = handle.block_on(stopped.wait_for(|done| *done));
            self.stop();
            return Ok(());
        }

        if self.acceptor.is_none() && self.lifecycle == Lifecycle::Idle {
            let hostname = self.config.hostname.clone();
            self.listen(self.config.port, &hostname)?;
        }
        self.check_startable()?;

        let handle = self.context.start(self.config.workers)?;
        let accept = self.launch(handle.clone())?;
        handle.block_on(accept);

        self.stop();
        Ok(())
    }

    /// Stop accepting and release the worker threads
    ///
    /// Sessions still open are cancelled when the context is private to
    /// this server. Idempotent.
    pub fn stop(&mut self) {
        if self.lifecycle == Lifecycle::Stopped {
            return;
        }

        self.shutdown.send_replace(true);
        self.acceptor = None;
        if self.owns_context {
            self.context.stop();
        }
        if self.lifecycle == Lifecycle::Running {
            tracing::info!(active_sessions = self.tracker.active(), "server stopped");
        }
        self.lifecycle = Lifecycle::Stopped;
    }

    /// Handle that can request a shutdown from another thread or a handler
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Bound address, once `listen` succeeded
    pub fn endpoint(&self) -> Option<SocketAddr> {
        self.endpoint
    }

    /// Sessions currently alive
    pub fn active_sessions(&self) -> u64 {
        self.tracker.active()
    }

    /// Accepting connections: started and no shutdown requested
    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running && !self.shutdown_requested()
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn is_tls(&self) -> bool {
        #[cfg(feature = "tls")]
        {
            self.tls.is_some()
        }
        #[cfg(not(feature = "tls"))]
        {
            false
        }
    }

    /// Number of registered routes
    pub fn route_count(&self) -> usize {
        match &self.frozen {
            Some(routes) => routes.len(),
            None => self.routes.len(),
        }
    }

    fn check_startable(&self) -> Result<()> {
        if self.shutdown_requested() {
            return Err(Error::Stopped);
        }
        match self.lifecycle {
            Lifecycle::Running => Err(Error::AlreadyRunning),
            Lifecycle::Stopped => Err(Error::Stopped),
            Lifecycle::Idle if self.acceptor.is_none() => Err(Error::NotListening),
            Lifecycle::Idle => Ok(()),
        }
    }

    /// Freeze the route table and build the accept loop
    fn launch(&mut self, handle: Handle) -> Result<impl Future<Output = ()> + Send + 'static> {
        let acceptor = self.acceptor.take().ok_or(Error::NotListening)?;
        let routes = Arc::new(std::mem::take(&mut self.routes));
        let route_count = routes.len();
        self.frozen = Some(Arc::clone(&routes));
        let settings = SessionSettings {
            limits: self.config.limits,
            read_timeout: self.config.read_timeout,
        };
        let tracker = Arc::clone(&self.tracker);

        #[cfg(feature = "tls")]
        let sessions = match &self.tls {
            Some(tls) => SessionFactory::Tls(Shared::new(
                Tls::new(tls.clone()),
                routes,
                settings,
                tracker,
                handle,
            )),
            None => SessionFactory::Plain(Shared::new(Plain, routes, settings, tracker, handle)),
        };
        #[cfg(not(feature = "tls"))]
        let sessions = SessionFactory::Plain(Shared::new(Plain, routes, settings, tracker, handle));

        tracing::info!(addr = %acceptor.local_addr(), routes = route_count, "server started");
        self.lifecycle = Lifecycle::Running;

        let accept = acceptor.run(sessions, self.config.tcp_nodelay, self.shutdown.subscribe());
        Ok(async move {
            if let Err(e) = accept.await {
                tracing::error!(error = %e, "acceptor failed");
            }
        })
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Requests a server shutdown from any thread
#[derive(Clone)]
pub struct ShutdownHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Ask the accept loop to finish; a blocked [`Server::run`] returns
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }
}
