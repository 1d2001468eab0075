//! Serving a single keep-alive connection

use crate::protocol::http::{self, ParseResult, Request, Response};
use crate::server::error::Result;
use crate::server::monitor::ServerCounters;
use crate::server::registry::MethodRegistry;
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Instant;
use tracing::{debug, warn};

/// Size of each socket read
const READ_CHUNK_SIZE: usize = 8192;

/// Serve requests on `stream` until the peer closes it, asks for the
/// connection to be closed, or sends something that cannot be framed.
pub fn serve_connection(
    mut stream: TcpStream,
    registry: &MethodRegistry,
    counters: &ServerCounters,
) -> Result<()> {
    let peer = stream.peer_addr().ok();
    stream.set_nodelay(true)?;

    let mut buffer = Vec::with_capacity(READ_CHUNK_SIZE);
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match http::parse_request(&buffer) {
            ParseResult::Complete(request, consumed) => {
                buffer.drain(..consumed);
                let keep_alive = request.keep_alive();
                let response = handle_request(&request, registry, counters, keep_alive);
                stream.write_all(&response.encode())?;

                if !response.keep_alive() {
                    debug!(peer = ?peer, "Closing connection after response");
                    return Ok(());
                }
            }
            ParseResult::Incomplete => {
                let n = match stream.read(&mut chunk) {
                    Ok(n) => n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                };
                if n == 0 {
                    if buffer.is_empty() {
                        debug!(peer = ?peer, "Client disconnected");
                    } else {
                        debug!(peer = ?peer, pending = buffer.len(), "Client disconnected mid-request");
                    }
                    return Ok(());
                }
                buffer.extend_from_slice(&chunk[..n]);
            }
            ParseResult::Error(e) => {
                warn!(peer = ?peer, error = %e, "Rejecting malformed request");
                let response = Response::error(http::status_for(&e), &e.to_string());
                stream.write_all(&response.encode())?;
                return Ok(());
            }
        }
    }
}

/// Turn one framed request into a response.
pub fn handle_request(
    request: &Request,
    registry: &MethodRegistry,
    counters: &ServerCounters,
    keep_alive: bool,
) -> Response {
    if !request.method.eq_ignore_ascii_case("POST") {
        debug!(method = %request.method, path = %request.path, "Rejecting non-POST request");
        return Response::error(405, "XML-RPC requests must use POST").with_header("Allow", "POST");
    }

    let start = Instant::now();
    let result = registry.handle_xml(&request.body);
    counters.record_execution(start.elapsed());
    counters.increment_call();
    if result.is_fault() {
        counters.increment_fault();
    }

    Response::xml(result.encode(), keep_alive)
}
