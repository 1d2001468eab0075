use crate::server::config::ServerConfig;
use crate::server::connection::serve_connection;
use crate::server::error::{Result, ServerError};
use crate::server::monitor::ServerCounters;
use crate::server::registry::MethodRegistry;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info};

/// Bound XML-RPC server
pub struct Server {
    listener: TcpListener,
    registry: Arc<MethodRegistry>,
    counters: ServerCounters,
}

impl Server {
    /// Bind the listening socket described by `config`.
    pub fn bind(
        config: &ServerConfig,
        registry: MethodRegistry,
        counters: ServerCounters,
    ) -> Result<Self> {
        let address = config.address();
        let listener = TcpListener::bind(&address).map_err(|source| {
            error!(address = %address, error = %source, "Listener could not be bound");
            ServerError::Bind {
                port: config.port,
                source,
            }
        })?;

        info!(
            address = %address,
            methods = ?registry.method_names(),
            "XML-RPC server listening"
        );

        Ok(Self {
            listener,
            registry: Arc::new(registry),
            counters,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, serving each on its own thread.
    pub fn run(self) -> Result<()> {
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => {
                    let peer = stream.peer_addr().ok();
                    debug!(peer = ?peer, "New client connected");
                    self.counters.increment_connection();

                    let registry = Arc::clone(&self.registry);
                    let counters = self.counters.clone();
                    thread::spawn(move || {
                        if let Err(e) = serve_connection(stream, &registry, &counters) {
                            debug!(error = %e, peer = ?peer, "Connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::monitor::ServerMonitor;

    fn config(port: u16) -> ServerConfig {
        ServerConfig {
            bind: "127.0.0.1".to_string(),
            port,
            stats_interval: 0,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }

    #[test]
    fn test_bind_ephemeral_port() {
        let monitor = ServerMonitor::new(None).unwrap();
        let server = Server::bind(&config(0), MethodRegistry::new(), monitor.counters()).unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn test_bind_failure_names_port() {
        let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();
        let monitor = ServerMonitor::new(None).unwrap();

        let err = match Server::bind(&config(port), MethodRegistry::new(), monitor.counters()) {
            Ok(_) => panic!("second bind on port {port} succeeded"),
            Err(e) => e,
        };

        assert!(matches!(err, ServerError::Bind { .. }));
        assert!(err.to_string().starts_with(&format!("Error binding to port {port}")));
    }
}
