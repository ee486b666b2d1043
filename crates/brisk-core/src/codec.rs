//! HTTP/1.1 wire codec
//!
//! Reads one full request message from a byte stream and writes one
//! response back. The codec owns the connection's read buffer, so bytes
//! belonging to a pipelined follow-up request stay buffered for the next
//! [`Http1Codec::read_request`] call.

use crate::request::{Method, Request, Version};
use crate::response::Response;
use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Bytes reserved before each socket read
const READ_CHUNK: usize = 8 * 1024;

/// Interim response sent to clients waiting on `Expect: 100-continue`
const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Parser limits
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Maximum size of the request line plus headers
    pub max_header_size: usize,
    /// Maximum number of headers
    pub max_headers: usize,
    /// Maximum decoded body size
    pub max_body_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_header_size: 16 * 1024,
            max_headers: 64,
            max_body_size: 1024 * 1024,
        }
    }
}

/// Failure to read a request
#[derive(Debug, Error)]
pub enum ReadError {
    /// The peer closed the stream between messages
    #[error("end of stream")]
    EndOfStream,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed request: {0}")]
    Parse(String),

    #[error("Request head exceeds {limit} bytes")]
    HeadersTooLarge { limit: usize },

    #[error("Body too large: {size} bytes exceeds limit of {limit} bytes")]
    BodyTooLarge { size: usize, limit: usize },

    #[error("Timed out waiting for request")]
    TimedOut,
}

impl ReadError {
    /// Whether this is the clean end-of-stream condition rather than a failure
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, ReadError::EndOfStream)
    }
}

/// Per-connection HTTP/1.1 codec
#[derive(Debug)]
pub struct Http1Codec {
    read_buf: BytesMut,
    write_buf: BytesMut,
    limits: Limits,
}

impl Http1Codec {
    pub fn new(limits: Limits) -> Self {
        Self {
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            write_buf: BytesMut::new(),
            limits,
        }
    }

    /// Bytes received but not yet consumed by a request
    pub fn buffered(&self) -> usize {
        self.read_buf.len()
    }

    /// Read one complete request into `request`
    ///
    /// `request` should be empty; every field the wire carries is overwritten.
    pub async fn read_request<S>(
        &mut self,
        stream: &mut S,
        request: &mut Request,
    ) -> Result<(), ReadError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let head_len = loop {
            if !self.read_buf.is_empty() {
                if let Some(len) = parse_head(&self.read_buf, &self.limits, request)? {
                    break len;
                }
            }

            if self.read_buf.len() >= self.limits.max_header_size {
                return Err(ReadError::HeadersTooLarge {
                    limit: self.limits.max_header_size,
                });
            }

            if self.fill(stream).await? == 0 {
                return Err(if self.read_buf.is_empty() {
                    ReadError::EndOfStream
                } else {
                    unexpected_eof()
                });
            }
        };
        self.read_buf.advance(head_len);

        // Framing and size are settled before a client is invited to upload
        let framing = body_framing(request, &self.limits)?;

        if expects_continue(request) {
            stream.write_all(CONTINUE).await?;
            stream.flush().await?;
        }

        request.body = match framing {
            Framing::Empty => Bytes::new(),
            Framing::Length(len) => {
                self.fill_to(stream, len).await?;
                self.read_buf.split_to(len).freeze()
            }
            Framing::Chunked => self.read_chunked(stream).await?,
        };
        Ok(())
    }

    /// Serialize and flush one response, returning the bytes written
    pub async fn write_response<S>(
        &mut self,
        stream: &mut S,
        response: &Response,
    ) -> std::io::Result<usize>
    where
        S: AsyncWrite + Unpin,
    {
        self.write_buf.clear();
        response.encode(&mut self.write_buf);
        stream.write_all(&self.write_buf).await?;
        stream.flush().await?;
        Ok(self.write_buf.len())
    }

    async fn read_chunked<S>(&mut self, stream: &mut S) -> Result<Bytes, ReadError>
    where
        S: AsyncRead + Unpin,
    {
        let mut body = BytesMut::new();
        loop {
            let line = self.read_line(stream).await?;
            let size_str = line.split(';').next().unwrap_or("").trim();
            let size = usize::from_str_radix(size_str, 16)
                .map_err(|_| ReadError::Parse(format!("invalid chunk size: {}", size_str)))?;

            if size == 0 {
                // Trailers are read and discarded
                while !self.read_line(stream).await?.is_empty() {}
                return Ok(body.freeze());
            }

            let total = body.len().saturating_add(size);
            if total > self.limits.max_body_size {
                return Err(ReadError::BodyTooLarge {
                    size: total,
                    limit: self.limits.max_body_size,
                });
            }

            self.fill_to(stream, size + 2).await?;
            if &self.read_buf[size..size + 2] != b"\r\n" {
                return Err(ReadError::Parse("chunk missing CRLF terminator".to_string()));
            }
            body.extend_from_slice(&self.read_buf[..size]);
            self.read_buf.advance(size + 2);
        }
    }

    async fn read_line<S>(&mut self, stream: &mut S) -> Result<String, ReadError>
    where
        S: AsyncRead + Unpin,
    {
        loop {
            if let Some(pos) = self.read_buf.windows(2).position(|w| w == b"\r\n") {
                let line = self.read_buf.split_to(pos + 2);
                return String::from_utf8(line[..pos].to_vec())
                    .map_err(|_| ReadError::Parse("chunk line is not UTF-8".to_string()));
            }

            if self.read_buf.len() >= self.limits.max_header_size {
                return Err(ReadError::HeadersTooLarge {
                    limit: self.limits.max_header_size,
                });
            }

            if self.fill(stream).await? == 0 {
                return Err(unexpected_eof());
            }
        }
    }

    async fn fill_to<S>(&mut self, stream: &mut S, len: usize) -> Result<(), ReadError>
    where
        S: AsyncRead + Unpin,
    {
        while self.read_buf.len() < len {
            if self.fill(stream).await? == 0 {
                return Err(unexpected_eof());
            }
        }
        Ok(())
    }

    async fn fill<S>(&mut self, stream: &mut S) -> std::io::Result<usize>
    where
        S: AsyncRead + Unpin,
    {
        self.read_buf.reserve(READ_CHUNK);
        stream.read_buf(&mut self.read_buf).await
    }
}

impl Default for Http1Codec {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}

/// Parse a request head, returning its length once complete
fn parse_head(buf: &[u8], limits: &Limits, request: &mut Request) -> Result<Option<usize>, ReadError> {
    let mut headers = vec![httparse::EMPTY_HEADER; limits.max_headers];
    let mut parsed = httparse::Request::new(&mut headers);

    let len = match parsed.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => return Err(ReadError::Parse(e.to_string())),
    };

    if len > limits.max_header_size {
        return Err(ReadError::HeadersTooLarge {
            limit: limits.max_header_size,
        });
    }

    let method = parsed.method.unwrap_or_default();
    request.method = Method::parse(method.as_bytes())
        .ok_or_else(|| ReadError::Parse(format!("unsupported method: {}", method)))?;

    let target = parsed.path.unwrap_or("/");
    match target.split_once('?') {
        Some((path, query)) => {
            request.path = path.to_string();
            request.query = Some(query.to_string());
        }
        None => {
            request.path = target.to_string();
            request.query = None;
        }
    }

    request.version = match parsed.version {
        Some(0) => Version::Http10,
        _ => Version::Http11,
    };

    request.headers.clear();
    for header in parsed.headers.iter() {
        request.headers.push((
            header.name.to_string(),
            String::from_utf8_lossy(header.value).into_owned(),
        ));
    }

    Ok(Some(len))
}

/// How the body of a request is delimited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Empty,
    Length(usize),
    Chunked,
}

/// Decide body framing from the request head
///
/// Anything that two parsers could read differently is rejected: a
/// transfer coding other than a lone `chunked`, `Transfer-Encoding`
/// together with `Content-Length`, and `Content-Length` values that are
/// not plain digits or disagree with each other.
fn body_framing(request: &Request, limits: &Limits) -> Result<Framing, ReadError> {
    let codings: Vec<&str> = header_values(request, "transfer-encoding").collect();
    let lengths: Vec<&str> = header_values(request, "content-length").collect();

    if !codings.is_empty() {
        if !lengths.is_empty() {
            return Err(ReadError::Parse(
                "both transfer-encoding and content-length present".to_string(),
            ));
        }
        return match codings.as_slice() {
            [coding] if coding.eq_ignore_ascii_case("chunked") => Ok(Framing::Chunked),
            _ => Err(ReadError::Parse(format!(
                "unsupported transfer-encoding: {}",
                codings.join(", ")
            ))),
        };
    }

    let mut len = None;
    for value in lengths {
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ReadError::Parse(format!("invalid content-length: {}", value)));
        }
        let parsed = value
            .parse::<usize>()
            .map_err(|_| ReadError::Parse(format!("invalid content-length: {}", value)))?;
        match len {
            Some(prev) if prev != parsed => {
                return Err(ReadError::Parse("conflicting content-length values".to_string()));
            }
            _ => len = Some(parsed),
        }
    }

    match len {
        None | Some(0) => Ok(Framing::Empty),
        Some(size) if size > limits.max_body_size => Err(ReadError::BodyTooLarge {
            size,
            limit: limits.max_body_size,
        }),
        Some(size) => Ok(Framing::Length(size)),
    }
}

/// Comma-separated elements of every header named `name`
fn header_values<'a>(request: &'a Request, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    request
        .headers
        .iter()
        .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
        .flat_map(|(_, v)| v.split(','))
        .map(str::trim)
}

fn expects_continue(request: &Request) -> bool {
    request.version == Version::Http11
        && request
            .header("expect")
            .map(|v| v.trim().eq_ignore_ascii_case("100-continue"))
            .unwrap_or(false)
}

fn unexpected_eof() -> ReadError {
    ReadError::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "connection closed mid-request",
    ))
}
