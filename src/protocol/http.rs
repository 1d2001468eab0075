//! HTTP/1.1 framing for XML-RPC messages.
//!
//! Only what an XML-RPC endpoint needs: a start line, headers, and a body
//! delimited by `Content-Length`. Chunked transfer encoding is rejected.
//! Parsers work on a caller-owned buffer and report how many bytes a
//! complete message consumed, so pipelined requests stay in the buffer.

use crate::protocol::error::{ProtocolError, Result};

/// Upper bound for the start line plus headers
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Upper bound for a message body
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Value of the `Server` and `User-Agent` headers
pub const AGENT: &str = concat!("pulse-rpc/", env!("CARGO_PKG_VERSION"));

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    fn parse(text: &str) -> Result<Self> {
        match text {
            "HTTP/1.1" => Ok(Version::Http11),
            "HTTP/1.0" => Ok(Version::Http10),
            other => Err(ProtocolError::MalformedHttp(format!(
                "unsupported HTTP version {other:?}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }
}

/// Parse result
#[derive(Debug)]
pub enum ParseResult<T> {
    /// Successfully parsed a message with bytes consumed
    Complete(T, usize),
    /// Need more data
    Incomplete,
    /// The buffer can never become a valid message
    Error(ProtocolError),
}

impl<T> From<Result<Option<(T, usize)>>> for ParseResult<T> {
    fn from(result: Result<Option<(T, usize)>>) -> Self {
        match result {
            Ok(Some((message, consumed))) => ParseResult::Complete(message, consumed),
            Ok(None) => ParseResult::Incomplete,
            Err(e) => ParseResult::Error(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub version: Version,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    /// Build an XML-RPC POST request.
    pub fn post(host: &str, path: &str, body: Vec<u8>) -> Self {
        let headers = vec![
            ("Host".to_string(), host.to_string()),
            ("User-Agent".to_string(), AGENT.to_string()),
            ("Content-Type".to_string(), "text/xml".to_string()),
            ("Content-Length".to_string(), body.len().to_string()),
        ];
        Self {
            method: "POST".to_string(),
            path: path.to_string(),
            version: Version::Http11,
            headers,
            body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Whether the client expects the connection to stay open after the response.
    pub fn keep_alive(&self) -> bool {
        keep_alive(self.version, self.header("Connection"))
    }

    pub fn encode(&self) -> Vec<u8> {
        let start_line = format!("{} {} {}", self.method, self.path, self.version.as_str());
        encode_message(&start_line, &self.headers, &self.body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub version: Version,
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    /// `200 OK` carrying an XML-RPC response document.
    pub fn xml(body: Vec<u8>, keep_alive: bool) -> Self {
        Self::with_body(200, "text/xml", body, keep_alive)
    }

    /// Plain-text error response; the connection is always closed afterwards.
    pub fn error(status: u16, message: &str) -> Self {
        Self::with_body(status, "text/plain", format!("{message}\n").into_bytes(), false)
    }

    fn with_body(status: u16, content_type: &str, body: Vec<u8>, keep_alive: bool) -> Self {
        let connection = if keep_alive { "keep-alive" } else { "close" };
        let headers = vec![
            ("Server".to_string(), AGENT.to_string()),
            ("Content-Type".to_string(), content_type.to_string()),
            ("Content-Length".to_string(), body.len().to_string()),
            ("Connection".to_string(), connection.to_string()),
        ];
        Self {
            version: Version::Http11,
            status,
            reason: reason_phrase(status).to_string(),
            headers,
            body,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Whether the server keeps the connection open after this response.
    pub fn keep_alive(&self) -> bool {
        keep_alive(self.version, self.header("Connection"))
    }

    pub fn encode(&self) -> Vec<u8> {
        let start_line = format!("{} {} {}", self.version.as_str(), self.status, self.reason);
        encode_message(&start_line, &self.headers, &self.body)
    }
}

/// Parse one request from the front of `buf`.
///
/// Blank lines preceding the request line are skipped and counted as consumed.
/// They share the header size limit.
pub fn parse_request(buf: &[u8]) -> ParseResult<Request> {
    let skip = leading_blank_lines(buf);
    if skip > MAX_HEADER_BYTES {
        return ParseResult::Error(ProtocolError::HeaderTooLarge {
            limit: MAX_HEADER_BYTES,
        });
    }
    try_parse_request(&buf[skip..])
        .map(|parsed| parsed.map(|(request, consumed)| (request, skip + consumed)))
        .into()
}

/// Parse one response from the front of `buf`.
pub fn parse_response(buf: &[u8]) -> ParseResult<Response> {
    try_parse_response(buf).into()
}

/// HTTP status used to reject a request that failed to parse.
pub fn status_for(error: &ProtocolError) -> u16 {
    match error {
        ProtocolError::MissingContentLength => 411,
        ProtocolError::BodyTooLarge { .. } => 413,
        ProtocolError::UnsupportedTransferEncoding(_) => 501,
        _ => 400,
    }
}

fn try_parse_request(buf: &[u8]) -> Result<Option<(Request, usize)>> {
    let Some(head) = parse_head(buf)? else {
        return Ok(None);
    };

    let mut parts = head.start_line.split_whitespace();
    let (method, path, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(path), Some(version), None) => (method, path, Version::parse(version)?),
        _ => {
            return Err(ProtocolError::MalformedHttp(format!(
                "invalid request line {:?}",
                head.start_line
            )))
        }
    };

    let length = body_length(&head.headers, method.eq_ignore_ascii_case("POST"))?;
    let end = head.body_start + length;
    if buf.len() < end {
        return Ok(None);
    }

    let request = Request {
        method: method.to_string(),
        path: path.to_string(),
        version,
        body: buf[head.body_start..end].to_vec(),
        headers: head.headers,
    };
    Ok(Some((request, end)))
}

fn try_parse_response(buf: &[u8]) -> Result<Option<(Response, usize)>> {
    let Some(head) = parse_head(buf)? else {
        return Ok(None);
    };

    let mut parts = head.start_line.splitn(3, ' ');
    let version = Version::parse(parts.next().unwrap_or_default())?;
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| {
            ProtocolError::MalformedHttp(format!("invalid status line {:?}", head.start_line))
        })?;
    let reason = parts.next().unwrap_or_default().to_string();

    let length = body_length(&head.headers, true)?;
    let end = head.body_start + length;
    if buf.len() < end {
        return Ok(None);
    }

    let response = Response {
        version,
        status,
        reason,
        body: buf[head.body_start..end].to_vec(),
        headers: head.headers,
    };
    Ok(Some((response, end)))
}

struct Head<'a> {
    start_line: &'a str,
    headers: Vec<(String, String)>,
    body_start: usize,
}

fn parse_head(buf: &[u8]) -> Result<Option<Head<'_>>> {
    let searchable = &buf[..buf.len().min(MAX_HEADER_BYTES + HEAD_TERMINATOR.len())];
    let head_end = match searchable
        .windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
    {
        Some(end) if end <= MAX_HEADER_BYTES => end,
        None if buf.len() <= MAX_HEADER_BYTES => return Ok(None),
        _ => {
            return Err(ProtocolError::HeaderTooLarge {
                limit: MAX_HEADER_BYTES,
            })
        }
    };

    let head = std::str::from_utf8(&buf[..head_end])
        .map_err(|_| ProtocolError::MalformedHttp("header section is not valid UTF-8".into()))?;

    let mut lines = head.split("\r\n");
    let start_line = lines.next().unwrap_or_default();
    let mut headers = Vec::new();
    for line in lines {
        let (name, value) = line.split_once(':').ok_or_else(|| {
            ProtocolError::MalformedHttp(format!("invalid header line {line:?}"))
        })?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok(Some(Head {
        start_line,
        headers,
        body_start: head_end + HEAD_TERMINATOR.len(),
    }))
}

fn body_length(headers: &[(String, String)], required: bool) -> Result<usize> {
    if let Some(encoding) = find_header(headers, "Transfer-Encoding") {
        if !encoding.eq_ignore_ascii_case("identity") {
            return Err(ProtocolError::UnsupportedTransferEncoding(
                encoding.to_string(),
            ));
        }
    }

    match find_header(headers, "Content-Length") {
        Some(value) => {
            let length: usize = value.parse().map_err(|_| {
                ProtocolError::MalformedHttp(format!("invalid Content-Length {value:?}"))
            })?;
            if length > MAX_BODY_BYTES {
                return Err(ProtocolError::BodyTooLarge {
                    length,
                    limit: MAX_BODY_BYTES,
                });
            }
            Ok(length)
        }
        None if required => Err(ProtocolError::MissingContentLength),
        None => Ok(0),
    }
}

/// Length of the run of CRLF pairs at the front of `buf`, counted no further
/// than just past the header limit.
fn leading_blank_lines(buf: &[u8]) -> usize {
    let mut skip = 0;
    while skip <= MAX_HEADER_BYTES && buf[skip..].starts_with(b"\r\n") {
        skip += 2;
    }
    skip
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(header, _)| header.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

fn keep_alive(version: Version, connection: Option<&str>) -> bool {
    let has_token = |token: &str| {
        connection.is_some_and(|value| {
            value
                .split(',')
                .any(|item| item.trim().eq_ignore_ascii_case(token))
        })
    };
    match version {
        Version::Http11 => !has_token("close"),
        Version::Http10 => has_token("keep-alive"),
    }
}

fn encode_message(start_line: &str, headers: &[(String, String)], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(start_line.len() + 160 + body.len());
    out.extend_from_slice(start_line.as_bytes());
    out.extend_from_slice(b"\r\n");
    for (name, value) in headers {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        411 => "Length Required",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST: &[u8] = b"POST /RPC2 HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";

    #[test]
    fn test_parse_complete_request() {
        match parse_request(REQUEST) {
            ParseResult::Complete(request, consumed) => {
                assert_eq!(consumed, REQUEST.len());
                assert_eq!(request.method, "POST");
                assert_eq!(request.path, "/RPC2");
                assert_eq!(request.version, Version::Http11);
                assert_eq!(request.header("host"), Some("localhost"));
                assert_eq!(request.body, b"hello");
                assert!(request.keep_alive());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_incomplete_head_and_body() {
        assert!(matches!(
            parse_request(&REQUEST[..20]),
            ParseResult::Incomplete
        ));
        assert!(matches!(
            parse_request(&REQUEST[..REQUEST.len() - 1]),
            ParseResult::Incomplete
        ));
    }

    #[test]
    fn test_pipelined_requests_consume_one_at_a_time() {
        let mut buf = REQUEST.to_vec();
        buf.extend_from_slice(REQUEST);
        match parse_request(&buf) {
            ParseResult::Complete(_, consumed) => {
                assert_eq!(consumed, REQUEST.len());
                assert!(matches!(
                    parse_request(&buf[consumed..]),
                    ParseResult::Complete(_, _)
                ));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_leading_blank_lines_skipped() {
        let mut buf = b"\r\n\r\n".to_vec();
        buf.extend_from_slice(REQUEST);
        match parse_request(&buf) {
            ParseResult::Complete(_, consumed) => assert_eq!(consumed, buf.len()),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_endless_blank_lines_rejected() {
        match parse_request(&b"\r\n".repeat(1 << 20)) {
            ParseResult::Error(e) => {
                assert!(matches!(e, ProtocolError::HeaderTooLarge { .. }));
                assert_eq!(status_for(&e), 400);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_blank_lines_within_limit_wait_for_more() {
        assert!(matches!(
            parse_request(&b"\r\n".repeat(MAX_HEADER_BYTES / 2)),
            ParseResult::Incomplete
        ));
    }

    #[test]
    fn test_post_requires_content_length() {
        match parse_request(b"POST / HTTP/1.1\r\nHost: x\r\n\r\n") {
            ParseResult::Error(e) => {
                assert!(matches!(e, ProtocolError::MissingContentLength));
                assert_eq!(status_for(&e), 411);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_get_without_body_parses() {
        match parse_request(b"GET / HTTP/1.0\r\n\r\n") {
            ParseResult::Complete(request, _) => {
                assert_eq!(request.method, "GET");
                assert!(request.body.is_empty());
                assert!(!request.keep_alive());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_chunked_rejected() {
        let input = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n";
        match parse_request(input) {
            ParseResult::Error(e) => assert_eq!(status_for(&e), 501),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_oversized_body_rejected() {
        let input = format!("POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\n", MAX_BODY_BYTES + 1);
        match parse_request(input.as_bytes()) {
            ParseResult::Error(e) => assert_eq!(status_for(&e), 413),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_oversized_head_rejected() {
        let mut input = b"POST / HTTP/1.1\r\nX-Padding: ".to_vec();
        input.extend(std::iter::repeat(b'a').take(MAX_HEADER_BYTES));
        assert!(matches!(
            parse_request(&input),
            ParseResult::Error(ProtocolError::HeaderTooLarge { .. })
        ));
    }

    #[test]
    fn test_malformed_request_line() {
        assert!(matches!(
            parse_request(b"POST /\r\n\r\n"),
            ParseResult::Error(ProtocolError::MalformedHttp(_))
        ));
        assert!(matches!(
            parse_request(b"POST / HTTP/2\r\n\r\n"),
            ParseResult::Error(ProtocolError::MalformedHttp(_))
        ));
    }

    #[test]
    fn test_connection_close_disables_keep_alive() {
        let input = b"POST / HTTP/1.1\r\nConnection: close\r\nContent-Length: 0\r\n\r\n";
        match parse_request(input) {
            ParseResult::Complete(request, _) => assert!(!request.keep_alive()),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_http10_keep_alive_opt_in() {
        let input = b"POST / HTTP/1.0\r\nConnection: Keep-Alive\r\nContent-Length: 0\r\n\r\n";
        match parse_request(input) {
            ParseResult::Complete(request, _) => assert!(request.keep_alive()),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_response_encode_then_parse() {
        let response = Response::xml(b"<xml/>".to_vec(), true);
        let encoded = response.encode();
        assert!(encoded.starts_with(b"HTTP/1.1 200 OK\r\n"));
        match parse_response(&encoded) {
            ParseResult::Complete(parsed, consumed) => {
                assert_eq!(consumed, encoded.len());
                assert_eq!(parsed, response);
                assert!(parsed.keep_alive());
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_error_response_closes() {
        let response = Response::error(405, "only POST is supported").with_header("Allow", "POST");
        assert_eq!(response.reason, "Method Not Allowed");
        assert_eq!(response.header("allow"), Some("POST"));
        assert!(!response.keep_alive());
    }

    #[test]
    fn test_request_post_encodes_content_length() {
        let request = Request::post("127.0.0.1:50002", "/RPC2", b"abc".to_vec());
        let encoded = String::from_utf8(request.encode()).unwrap();
        assert!(encoded.starts_with("POST /RPC2 HTTP/1.1\r\n"));
        assert!(encoded.contains("Content-Length: 3\r\n"));
        assert!(encoded.ends_with("\r\n\r\nabc"));
    }
}
