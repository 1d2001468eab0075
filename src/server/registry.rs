use crate::protocol::{Fault, MethodCall, MethodResponse, Value};
use crate::server::handler::TimedEchoHandler;
use crate::server::monitor::ServerCounters;
use std::collections::HashMap;
use tracing::{debug, warn};

/// A method callable over XML-RPC
pub trait RpcMethod: Send + Sync {
    /// Name the method is registered under
    fn name(&self) -> &str;

    /// Run the method with decoded parameters
    fn execute(&self, params: &[Value]) -> Result<Value, Fault>;
}

/// Name-to-handler mapping used by connection threads
#[derive(Default)]
pub struct MethodRegistry {
    methods: HashMap<String, Box<dyn RpcMethod>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method, returning any method previously registered under
    /// the same name.
    pub fn register(&mut self, method: Box<dyn RpcMethod>) -> Option<Box<dyn RpcMethod>> {
        let name = method.name().to_string();
        let replaced = self.methods.insert(name.clone(), method);
        if replaced.is_some() {
            warn!(method = %name, "Replaced previously registered method");
        } else {
            debug!(method = %name, "Registered method");
        }
        replaced
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    /// Registered method names in sorted order
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Invoke the method named by `call`.
    pub fn dispatch(&self, call: &MethodCall) -> MethodResponse {
        match self.methods.get(&call.name) {
            Some(method) => method.execute(&call.params).into(),
            None => {
                debug!(method = %call.name, "Unknown method");
                MethodResponse::Fault(Fault::method_not_found(&call.name))
            }
        }
    }

    /// Decode an XML-RPC request body and dispatch it.
    ///
    /// Bodies that are not XML yield a parse-error fault; well-formed XML
    /// that is not a valid `methodCall` yields an invalid-request fault.
    pub fn handle_xml(&self, body: &[u8]) -> MethodResponse {
        match MethodCall::decode(body) {
            Ok(call) => self.dispatch(&call),
            Err(e) if e.is_malformed_xml() => {
                debug!(error = %e, "Request body is not well-formed XML");
                MethodResponse::Fault(Fault::parse_error(e.to_string()))
            }
            Err(e) => {
                debug!(error = %e, "Request body is not a valid methodCall");
                MethodResponse::Fault(Fault::invalid_request(e.to_string()))
            }
        }
    }
}

/// Registry exposing only the timed `unpack_data` handler.
pub fn default_registry(counters: ServerCounters) -> MethodRegistry {
    let mut registry = MethodRegistry::new();
    registry.register(Box::new(TimedEchoHandler::new().with_counters(counters)));
    registry
}
