use crate::client::error::{ClientError, Result};
use crate::protocol::http::{self, ParseResult, Request};
use crate::protocol::{MethodCall, MethodResponse, Value, RPC_PATH};
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;
use tracing::{debug, warn};

/// Size of each socket read
const READ_CHUNK_SIZE: usize = 8192;

/// Trait for XML-RPC call transport
pub trait RpcTransport: Send {
    /// Send one call and wait for its response
    fn call(&mut self, call: &MethodCall) -> Result<MethodResponse>;

    /// Set the read timeout applied to responses
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Send one call and treat a fault response as an error
    fn invoke(&mut self, call: &MethodCall) -> Result<Value> {
        match self.call(call)? {
            MethodResponse::Success(value) => Ok(value),
            MethodResponse::Fault(fault) => Err(ClientError::Fault(fault)),
        }
    }
}

/// XML-RPC over a persistent HTTP/1.1 connection.
///
/// The connection is opened lazily, reused across calls, and dropped after
/// any I/O error or when the server announces `Connection: close`; the next
/// call then reconnects.
#[derive(Debug)]
pub struct HttpTransport {
    addr: String,
    timeout: Option<Duration>,
    stream: Option<TcpStream>,
    buffer: Vec<u8>,
}

impl HttpTransport {
    /// Create a transport without connecting yet
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            timeout: None,
            stream: None,
            buffer: Vec::with_capacity(READ_CHUNK_SIZE),
        }
    }

    /// Create a transport and open its connection immediately
    pub fn connect(addr: &str) -> Result<Self> {
        let mut transport = Self::new(addr);
        transport.ensure_connected()?;
        Ok(transport)
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn ensure_connected(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        debug!(addr = %self.addr, "Connecting to server");
        let stream = TcpStream::connect(&self.addr).map_err(|e| {
            warn!(error = %e, "Failed to connect");
            ClientError::Transport(format!("Failed to connect to {}: {}", self.addr, e))
        })?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.timeout)?;

        self.buffer.clear();
        self.stream = Some(stream);
        debug!("Connected successfully");
        Ok(())
    }

    fn disconnect(&mut self) {
        self.stream = None;
        self.buffer.clear();
    }

    fn round_trip(&mut self, request: &Request) -> Result<http::Response> {
        self.ensure_connected()?;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ClientError::Transport("not connected".into()))?;

        stream.write_all(&request.encode())?;

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match http::parse_response(&self.buffer) {
                ParseResult::Complete(response, consumed) => {
                    self.buffer.drain(..consumed);
                    return Ok(response);
                }
                ParseResult::Incomplete => {
                    let n = match stream.read(&mut chunk) {
                        Ok(n) => n,
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e.into()),
                    };
                    if n == 0 {
                        return Err(ClientError::Transport(
                            "server closed the connection before responding".into(),
                        ));
                    }
                    self.buffer.extend_from_slice(&chunk[..n]);
                }
                ParseResult::Error(e) => return Err(e.into()),
            }
        }
    }
}

impl RpcTransport for HttpTransport {
    fn call(&mut self, call: &MethodCall) -> Result<MethodResponse> {
        let request = Request::post(&self.addr, RPC_PATH, call.encode());

        let response = match self.round_trip(&request) {
            Ok(response) => response,
            Err(e) => {
                // A partially read response leaves the stream unusable.
                self.disconnect();
                return Err(e);
            }
        };

        if !response.keep_alive() {
            debug!("Server closed keep-alive connection");
            self.disconnect();
        }

        if response.status != 200 {
            return Err(ClientError::HttpStatus {
                status: response.status,
                reason: response.reason,
            });
        }

        let decoded = MethodResponse::decode(&response.body)?;
        debug!(fault = decoded.is_fault(), "Response decoded");
        Ok(decoded)
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        debug!(timeout_ms = timeout.as_millis(), "Setting read timeout");
        self.timeout = Some(timeout);
        if let Some(stream) = &self.stream {
            stream.set_read_timeout(self.timeout).map_err(|e| {
                warn!(error = %e, "Failed to set timeout");
                ClientError::Transport(format!("Failed to set timeout: {}", e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::http::Response;
    use mockall::mock;
    use std::net::TcpListener;
    use std::thread;

    mock! {
        pub RpcTransport {}

        impl RpcTransport for RpcTransport {
            fn call(&mut self, call: &MethodCall) -> Result<MethodResponse>;
            fn set_timeout(&mut self, timeout: Duration) -> Result<()>;
        }
    }

    /// One-connection server answering each request with the given responses in order.
    fn scripted_server(responses: Vec<Response>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buffer = Vec::new();
            let mut chunk = [0u8; 1024];
            for response in responses {
                loop {
                    if let ParseResult::Complete(_, consumed) = http::parse_request(&buffer) {
                        buffer.drain(..consumed);
                        break;
                    }
                    let n = stream.read(&mut chunk).unwrap();
                    if n == 0 {
                        return;
                    }
                    buffer.extend_from_slice(&chunk[..n]);
                }
                stream.write_all(&response.encode()).unwrap();
            }
        });
        addr
    }

    fn ack() -> MethodResponse {
        MethodResponse::Success(Value::Array(vec![Value::from("OK")]))
    }

    #[test]
    fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        assert!(HttpTransport::connect(&addr).is_err());
    }

    #[test]
    fn test_keep_alive_reuses_connection() {
        let body = ack().encode();
        let addr = scripted_server(vec![
            Response::xml(body.clone(), true),
            Response::xml(body, true),
        ]);

        let mut transport = HttpTransport::connect(&addr).unwrap();
        let call = MethodCall::new("unpack_data", vec![Value::from("x")]);
        assert_eq!(transport.call(&call).unwrap(), ack());
        assert_eq!(transport.call(&call).unwrap(), ack());
        assert!(transport.is_connected());
    }

    #[test]
    fn test_connection_close_drops_stream() {
        let addr = scripted_server(vec![Response::xml(ack().encode(), false)]);

        let mut transport = HttpTransport::connect(&addr).unwrap();
        let call = MethodCall::new("unpack_data", vec![Value::from("x")]);
        assert_eq!(transport.call(&call).unwrap(), ack());
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_http_error_status() {
        let addr = scripted_server(vec![Response::error(405, "no")]);

        let mut transport = HttpTransport::connect(&addr).unwrap();
        let call = MethodCall::new("unpack_data", Vec::new());
        match transport.call(&call) {
            Err(ClientError::HttpStatus { status, .. }) => assert_eq!(status, 405),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_invoke_turns_fault_into_error() {
        let mut transport = MockRpcTransport::new();
        transport.expect_call().times(1).returning(|_| {
            Ok(MethodResponse::Fault(crate::protocol::Fault::invalid_params(
                "missing",
            )))
        });

        let call = MethodCall::new("unpack_data", Vec::new());
        assert!(matches!(
            transport.invoke(&call),
            Err(ClientError::Fault(_))
        ));
    }
}

#[cfg(test)]
pub use tests::MockRpcTransport;
