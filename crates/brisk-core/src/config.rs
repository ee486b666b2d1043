//! Server configuration

use crate::codec::Limits;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port used by `run()` when `listen()` was never called
    pub port: u16,
    /// Address used by `run()` when `listen()` was never called
    pub hostname: String,
    /// Worker threads used by `run()`
    pub workers: usize,
    /// Listen backlog
    pub backlog: i32,
    /// Set TCP_NODELAY on accepted connections
    pub tcp_nodelay: bool,
    /// Set SO_REUSEPORT on the listening socket (unix only)
    pub reuse_port: bool,
    /// HTTP parser limits
    pub limits: Limits,
    /// Close a session whose next request does not arrive in time.
    /// `None` waits forever.
    pub read_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            hostname: "0.0.0.0".to_string(),
            workers: num_cpus::get(),
            backlog: 1024,
            tcp_nodelay: true,
            reuse_port: false,
            limits: Limits::default(),
            read_timeout: None,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }

    pub fn reuse_port(mut self, enabled: bool) -> Self {
        self.reuse_port = enabled;
        self
    }

    pub fn max_header_size(mut self, bytes: usize) -> Self {
        self.limits.max_header_size = bytes;
        self
    }

    pub fn max_headers(mut self, count: usize) -> Self {
        self.limits.max_headers = count;
        self
    }

    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.limits.max_body_size = bytes;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }
}
