//! brisk-core: embeddable HTTP/HTTPS server engine
//!
//! A [`Server`] binds a listening socket, accepts connections and runs each
//! one as a session: a small state machine that reads a request, routes it
//! to a handler, writes the response and either reads again (keep-alive) or
//! closes. Sessions run on a shared multi-threaded [`ExecutionContext`];
//! each session's steps are serialized by its own [`Strand`].
//!
//! ## Features
//! - `tls` (default) - HTTPS sessions via rustls

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod acceptor;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod logging;
pub mod request;
pub mod response;
pub mod server;
pub mod session;
pub mod strand;
pub mod tracker;

#[cfg(feature = "tls")]
pub mod tls;

// Re-exports
pub use codec::{Http1Codec, Limits, ReadError};
pub use config::ServerConfig;
pub use context::ExecutionContext;
pub use error::{Error, Result};
pub use handler::{dispatch, handler, Handler, Routes};
pub use request::{Method, Request, RequestBuilder, Version};
pub use response::{Response, ResponseBuilder, StatusCode};
pub use server::{Server, ShutdownHandle};
pub use strand::Strand;
pub use tracker::ConnectionTracker;

pub use brisk_router::{Match, Pattern, Route, Router};

#[cfg(feature = "tls")]
pub use tls::{load_certs, load_private_key, TlsConfig};
