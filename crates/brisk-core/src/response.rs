//! HTTP Response types

use crate::request::Version;
use bytes::{BufMut, BytesMut};
use smallvec::SmallVec;

/// Value of the `server` header written on every response
pub const SERVER_NAME: &str = concat!("brisk/", env!("CARGO_PKG_VERSION"));

/// HTTP Status Code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    // 2xx Success
    pub const OK: StatusCode = StatusCode(200);
    pub const CREATED: StatusCode = StatusCode(201);
    pub const ACCEPTED: StatusCode = StatusCode(202);
    pub const NO_CONTENT: StatusCode = StatusCode(204);

    // 3xx Redirection
    pub const MOVED_PERMANENTLY: StatusCode = StatusCode(301);
    pub const FOUND: StatusCode = StatusCode(302);
    pub const SEE_OTHER: StatusCode = StatusCode(303);
    pub const NOT_MODIFIED: StatusCode = StatusCode(304);
    pub const TEMPORARY_REDIRECT: StatusCode = StatusCode(307);
    pub const PERMANENT_REDIRECT: StatusCode = StatusCode(308);

    // 4xx Client Errors
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const UNAUTHORIZED: StatusCode = StatusCode(401);
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    pub const CONFLICT: StatusCode = StatusCode(409);
    pub const PAYLOAD_TOO_LARGE: StatusCode = StatusCode(413);
    pub const UNPROCESSABLE_ENTITY: StatusCode = StatusCode(422);

    // 5xx Server Errors
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);
    pub const NOT_IMPLEMENTED: StatusCode = StatusCode(501);
    pub const SERVICE_UNAVAILABLE: StatusCode = StatusCode(503);

    /// Get the numeric code
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Get the reason phrase
    pub fn reason_phrase(&self) -> &'static str {
        match self.0 {
            100 => "Continue",
            101 => "Switching Protocols",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            304 => "Not Modified",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            409 => "Conflict",
            413 => "Payload Too Large",
            422 => "Unprocessable Entity",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            503 => "Service Unavailable",
            _ => "Unknown",
        }
    }

    /// Check if this is a success status (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }

    /// Check if this is a client error status (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.0)
    }

    /// Check if this is a server error status (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.0)
    }

    /// Responses with this status never carry a body
    pub fn forbids_body(&self) -> bool {
        (100..200).contains(&self.0) || self.0 == 204 || self.0 == 304
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        StatusCode(code)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.0, self.reason_phrase())
    }
}

/// HTTP Response
///
/// `version`, `keep_alive` and `head` are protocol decisions applied by
/// [`Response::prepare`] once the request is known; handlers normally leave
/// them alone.
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code
    pub status: StatusCode,
    /// Response headers (stack-allocated for small header counts)
    pub headers: SmallVec<[(String, String); 8]>,
    /// Response body
    pub body: bytes::Bytes,
    version: Version,
    keep_alive: bool,
    head: bool,
}

impl Response {
    /// Create a new response
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: SmallVec::new(),
            body: bytes::Bytes::new(),
            version: Version::Http11,
            keep_alive: true,
            head: false,
        }
    }

    /// Create a 200 OK response
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// Create a JSON response
    pub fn json(body: impl Into<bytes::Bytes>) -> Self {
        ResponseBuilder::new(StatusCode::OK)
            .header("content-type", "application/json")
            .body(body)
            .build()
    }

    /// Create a text response
    pub fn text(body: impl Into<bytes::Bytes>) -> Self {
        ResponseBuilder::new(StatusCode::OK)
            .header("content-type", "text/plain; charset=utf-8")
            .body(body)
            .build()
    }

    /// Create an HTML response
    pub fn html(body: impl Into<bytes::Bytes>) -> Self {
        ResponseBuilder::new(StatusCode::OK)
            .header("content-type", "text/html; charset=utf-8")
            .body(body)
            .build()
    }

    /// Create a redirect response
    pub fn redirect(location: &str, permanent: bool) -> Self {
        let status = if permanent {
            StatusCode::PERMANENT_REDIRECT
        } else {
            StatusCode::TEMPORARY_REDIRECT
        };
        ResponseBuilder::new(status)
            .header("location", location)
            .build()
    }

    /// Create a 404 Not Found response
    pub fn not_found() -> Self {
        ResponseBuilder::new(StatusCode::NOT_FOUND)
            .header("content-type", "text/plain")
            .body("Not Found")
            .build()
    }

    /// Create a 400 Bad Request response
    pub fn bad_request(message: &str) -> Self {
        ResponseBuilder::new(StatusCode::BAD_REQUEST)
            .header("content-type", "text/plain")
            .body(message.to_string())
            .build()
    }

    /// Create a 500 Internal Server Error response
    pub fn internal_error(message: &str) -> Self {
        ResponseBuilder::new(StatusCode::INTERNAL_SERVER_ERROR)
            .header("content-type", "text/plain")
            .body(message.to_string())
            .build()
    }

    /// Get a header value
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get content-type header
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Get body as string (if UTF-8)
    pub fn body_string(&self) -> Option<String> {
        std::str::from_utf8(&self.body).ok().map(|s| s.to_string())
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Whether the connection must be closed after this response is written
    pub fn need_eof(&self) -> bool {
        !self.keep_alive
    }

    /// Apply the request's protocol decisions
    ///
    /// The response keeps the connection alive only if the client asked for
    /// it and the handler did not set `connection: close` itself.
    pub fn prepare(&mut self, version: Version, keep_alive: bool, head: bool) {
        let handler_closes = self
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("connection"))
            .any(|(_, v)| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("close")));

        self.version = version;
        self.keep_alive = keep_alive && !handler_closes;
        self.head = head;
    }

    /// Serialize to HTTP/1.x wire format
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(256 + self.body.len());

        // Status line
        buf.put_slice(self.version.as_str().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.status.0.to_string().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.status.reason_phrase().as_bytes());
        buf.put_slice(b"\r\n");

        let mut has_server = false;
        for (name, value) in &self.headers {
            // Framing headers are owned by the codec
            if name.eq_ignore_ascii_case("content-length")
                || name.eq_ignore_ascii_case("connection")
                || name.eq_ignore_ascii_case("transfer-encoding")
            {
                continue;
            }
            has_server |= name.eq_ignore_ascii_case("server");
            put_header(buf, name, value);
        }

        if !has_server {
            put_header(buf, "server", SERVER_NAME);
        }

        if !self.status.forbids_body() {
            put_header(buf, "content-length", &self.body.len().to_string());
        }

        if !self.keep_alive {
            put_header(buf, "connection", "close");
        } else if self.version == Version::Http10 {
            put_header(buf, "connection", "keep-alive");
        }

        // End of headers
        buf.put_slice(b"\r\n");

        if !self.head && !self.status.forbids_body() {
            buf.put_slice(&self.body);
        }
    }

    /// Serialize to a standalone buffer
    pub fn to_http1_bytes(&self) -> bytes::Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

fn put_header(buf: &mut BytesMut, name: &str, value: &str) {
    buf.put_slice(name.as_bytes());
    buf.put_slice(b": ");
    buf.put_slice(value.as_bytes());
    buf.put_slice(b"\r\n");
}

impl Default for Response {
    fn default() -> Self {
        Self::ok()
    }
}

/// Builder for constructing responses
pub struct ResponseBuilder {
    response: Response,
}

impl ResponseBuilder {
    /// Create a new builder
    pub fn new(status: StatusCode) -> Self {
        Self {
            response: Response::new(status),
        }
    }

    /// Set status code
    pub fn status(mut self, status: StatusCode) -> Self {
        self.response.status = status;
        self
    }

    /// Add a header
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.response.headers.push((name.into(), value.into()));
        self
    }

    /// Set body
    pub fn body(mut self, body: impl Into<bytes::Bytes>) -> Self {
        self.response.body = body.into();
        self
    }

    /// Build the response
    pub fn build(self) -> Response {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(res: &Response) -> String {
        String::from_utf8(res.to_http1_bytes().to_vec()).unwrap()
    }

    #[test]
    fn test_status_code() {
        assert!(StatusCode::OK.is_success());
        assert!(StatusCode::NOT_FOUND.is_client_error());
        assert!(StatusCode::INTERNAL_SERVER_ERROR.is_server_error());
        assert!(StatusCode::NO_CONTENT.forbids_body());
        assert!(!StatusCode::OK.forbids_body());
    }

    #[test]
    fn test_response_json() {
        let res = Response::json(r#"{"foo":"bar"}"#);
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.content_type(), Some("application/json"));
    }

    #[test]
    fn test_response_to_http1() {
        let res = ResponseBuilder::new(StatusCode::OK)
            .header("x-custom", "value")
            .body("Hello")
            .build();

        let s = wire(&res);
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("x-custom: value\r\n"));
        assert!(s.contains("content-length: 5\r\n"));
        assert!(s.contains(&format!("server: {}\r\n", SERVER_NAME)));
        assert!(!s.contains("connection:"));
        assert!(s.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn test_empty_body_still_framed() {
        let s = wire(&Response::ok());
        assert!(s.contains("content-length: 0\r\n"));
    }

    #[test]
    fn test_prepare_close() {
        let mut res = Response::text("bye");
        assert!(!res.need_eof());

        res.prepare(Version::Http11, false, false);
        assert!(res.need_eof());
        assert!(wire(&res).contains("connection: close\r\n"));
    }

    #[test]
    fn test_prepare_http10_keep_alive() {
        let mut res = Response::text("hi");
        res.prepare(Version::Http10, true, false);

        let s = wire(&res);
        assert!(s.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(s.contains("connection: keep-alive\r\n"));
        assert!(!res.need_eof());
    }

    #[test]
    fn test_handler_close_header_wins() {
        let mut res = ResponseBuilder::new(StatusCode::OK)
            .header("Connection", "close")
            .build();
        res.prepare(Version::Http11, true, false);

        assert!(res.need_eof());
        // Written once, by the codec
        assert_eq!(wire(&res).matches("onnection").count(), 1);
    }

    #[test]
    fn test_head_omits_body() {
        let mut res = Response::text("world");
        res.prepare(Version::Http11, true, true);

        let s = wire(&res);
        assert!(s.contains("content-length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_no_content_has_no_length() {
        let s = wire(&Response::new(StatusCode::NO_CONTENT));
        assert!(!s.contains("content-length"));
    }
}
