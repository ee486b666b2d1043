//! Minimal brisk server
//!
//! Usage: `brisk-hello [port] [cert.pem key.pem]`
//!
//! Serves `GET /hello` and `GET /hello/:name`. With a certificate and key
//! the server speaks HTTPS.

use brisk_core::{logging, Response, Server, ServerConfig};
use std::process::ExitCode;

fn main() -> ExitCode {
    logging::init();

    let mut args = std::env::args().skip(1);
    let port = match args.next().map(|p| p.parse::<u16>()) {
        Some(Ok(port)) => port,
        Some(Err(e)) => {
            tracing::error!(error = %e, "invalid port");
            return ExitCode::FAILURE;
        }
        None => 8080,
    };

    let config = ServerConfig::new().port(port);
    let server = match (args.next(), args.next()) {
        (Some(cert), Some(key)) => {
            Server::with_config(config).tls(brisk_core::TlsConfig::new(cert, key))
        }
        _ => Ok(Server::with_config(config)),
    };
    let mut server = match server {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "failed to load certificate");
            return ExitCode::FAILURE;
        }
    };

    server
        .get("/hello", |_req| async { Response::text("world") })
        .get("/hello/:name", |req| async move {
            let name = req.param("name").unwrap_or("stranger").to_string();
            Response::text(format!("hello, {}", name))
        });

    if let Err(e) = server.run() {
        tracing::error!(error = %e, "server failed");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
