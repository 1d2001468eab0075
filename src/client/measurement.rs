use crate::client::error::{ClientError, Result};
use crate::client::progress::ProgressTracker;
use crate::client::transport::RpcTransport;
use crate::protocol::{MethodCall, MethodResponse, Value, ACKNOWLEDGEMENT};
use std::io::{self, Write};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Results from a complete measurement phase
#[derive(Debug, Clone)]
pub struct MeasurementResult {
    pub latencies: Vec<u64>,
    pub failed_calls: usize,
    pub total_calls: usize,
    pub elapsed: Duration,
}

impl MeasurementResult {
    pub fn successful_calls(&self) -> usize {
        self.latencies.len()
    }
}

fn is_acknowledgement(value: &Value) -> bool {
    matches!(
        value.as_array(),
        Some([first, ..]) if first.as_str() == Some(ACKNOWLEDGEMENT)
    )
}

/// Measure the round-trip latency of a single call
///
/// Returns `None` when the server answers with a fault or an unexpected
/// value, or when the read times out. Other transport errors are returned.
pub fn measure_single_call<T: RpcTransport>(
    transport: &mut T,
    call: &MethodCall,
) -> Result<Option<u64>> {
    let t1 = Instant::now();

    debug!(method = %call.name, "Sending call");
    match transport.call(call) {
        Ok(MethodResponse::Success(value)) => {
            let t2 = Instant::now();

            if is_acknowledgement(&value) {
                let latency_ns = (t2 - t1).as_nanos() as u64;
                debug!(latency_ns = latency_ns, "Call acknowledged");
                Ok(Some(latency_ns))
            } else {
                warn!(
                    received = value.type_name(),
                    "Unexpected response value"
                );
                Ok(None)
            }
        }
        Ok(MethodResponse::Fault(fault)) => {
            warn!(code = fault.code, message = %fault.message, "Call faulted");
            Ok(None)
        }
        Err(e) if e.is_timeout() => {
            debug!("Call timed out");
            Ok(None)
        }
        Err(e) => {
            warn!(error = %e, "Call failed");
            Err(e)
        }
    }
}

/// Perform warmup calls before measuring
///
/// Opens the connection, warms CPU/OS caches and lets the server settle
/// before any latency is recorded.
pub fn warmup_phase<T: RpcTransport>(
    transport: &mut T,
    call: &MethodCall,
    warmup_count: usize,
    quiet: bool,
) -> Result<()> {
    let spinner_chars = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
    let mut spinner_idx = 0;
    let mut successful_calls = 0usize;
    let mut failed_calls = 0usize;

    for n in 0..warmup_count {
        match measure_single_call(transport, call) {
            Ok(Some(_)) => {
                successful_calls += 1;
                debug!(call_num = n + 1, "Warmup call completed");
            }
            Ok(None) => {
                failed_calls += 1;
                warn!(call_num = n + 1, "Warmup call failed or timed out");
            }
            Err(e) => {
                return Err(ClientError::Measurement(format!(
                    "Warmup phase interrupted after {} calls ({} successful, {} failed): {}",
                    successful_calls + failed_calls,
                    successful_calls,
                    failed_calls,
                    e
                )));
            }
        }

        if !quiet && n % 10 == 0 {
            print!(
                "\rWarming up {} ({}/{})",
                spinner_chars[spinner_idx],
                n + 1,
                warmup_count
            );
            io::stdout().flush()?;
            spinner_idx = (spinner_idx + 1) % spinner_chars.len();
        }
    }

    if !quiet {
        println!("\rWarming up ✓ ({}/{})", warmup_count, warmup_count);
        println!();
    }
    Ok(())
}

/// Perform measurement phase and collect latency samples
pub fn measurement_phase<T: RpcTransport>(
    transport: &mut T,
    call: &MethodCall,
    call_count: usize,
    update_interval: usize,
    quiet: bool,
) -> Result<MeasurementResult> {
    let mut latencies = Vec::with_capacity(call_count);
    let mut failed_calls = 0usize;

    let start_time = Instant::now();
    let mut progress = ProgressTracker::new(call_count, update_interval, quiet)?;

    for i in 0..call_count {
        match measure_single_call(transport, call) {
            Ok(Some(latency_ns)) => {
                latencies.push(latency_ns);
            }
            Ok(None) => {
                failed_calls += 1;
                warn!(call_num = i + 1, "Measurement call failed or timed out");
            }
            Err(e) => {
                progress.finish();
                return Err(ClientError::Measurement(format!(
                    "Measurement phase interrupted after {} calls ({} successful, {} failed): {}",
                    latencies.len() + failed_calls,
                    latencies.len(),
                    failed_calls,
                    e
                )));
            }
        }

        progress.update(&latencies, start_time, i)?;
    }

    debug!(
        calls_acknowledged = latencies.len(),
        calls_failed = failed_calls,
        "Measurement phase completed"
    );

    progress.final_update(&latencies, start_time)?;
    progress.finish();
    if !quiet {
        println!();
    }

    Ok(MeasurementResult {
        latencies,
        failed_calls,
        total_calls: call_count,
        elapsed: start_time.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::MockRpcTransport;
    use crate::protocol::Fault;
    use std::io::ErrorKind;

    fn call() -> MethodCall {
        MethodCall::new("unpack_data", vec![Value::from("payload")])
    }

    fn ack() -> MethodResponse {
        MethodResponse::Success(Value::Array(vec![Value::from("OK")]))
    }

    #[test]
    fn test_measure_single_call_success() -> Result<()> {
        let mut transport = MockRpcTransport::new();
        transport.expect_call().times(1).returning(|_| Ok(ack()));

        let result = measure_single_call(&mut transport, &call())?;
        assert!(result.is_some());
        Ok(())
    }

    #[test]
    fn test_measure_single_call_fault() -> Result<()> {
        let mut transport = MockRpcTransport::new();
        transport
            .expect_call()
            .times(1)
            .returning(|_| Ok(MethodResponse::Fault(Fault::invalid_params("missing"))));

        assert!(measure_single_call(&mut transport, &call())?.is_none());
        Ok(())
    }

    #[test]
    fn test_measure_single_call_unexpected_value() -> Result<()> {
        let mut transport = MockRpcTransport::new();
        transport
            .expect_call()
            .times(1)
            .returning(|_| Ok(MethodResponse::Success(Value::from("OK"))));

        assert!(measure_single_call(&mut transport, &call())?.is_none());
        Ok(())
    }

    #[test]
    fn test_measure_single_call_timeout() -> Result<()> {
        let mut transport = MockRpcTransport::new();
        transport
            .expect_call()
            .times(1)
            .returning(|_| Err(ClientError::Io(std::io::Error::from(ErrorKind::WouldBlock))));

        assert!(measure_single_call(&mut transport, &call())?.is_none());
        Ok(())
    }

    #[test]
    fn test_measure_single_call_transport_error() {
        let mut transport = MockRpcTransport::new();
        transport.expect_call().times(1).returning(|_| {
            Err(ClientError::Io(std::io::Error::from(
                ErrorKind::ConnectionRefused,
            )))
        });

        assert!(measure_single_call(&mut transport, &call()).is_err());
    }

    #[test]
    fn test_measurement_phase_counts_failures() -> Result<()> {
        let mut transport = MockRpcTransport::new();
        let mut n = 0;
        transport.expect_call().times(10).returning(move |_| {
            n += 1;
            if n % 5 == 0 {
                Ok(MethodResponse::Fault(Fault::internal_error("busy")))
            } else {
                Ok(ack())
            }
        });

        let result = measurement_phase(&mut transport, &call(), 10, 5, true)?;
        assert_eq!(result.total_calls, 10);
        assert_eq!(result.successful_calls(), 8);
        assert_eq!(result.failed_calls, 2);
        Ok(())
    }

    #[test]
    fn test_warmup_phase_stops_on_error() {
        let mut transport = MockRpcTransport::new();
        transport
            .expect_call()
            .times(1)
            .returning(|_| Err(ClientError::Transport("gone".into())));

        let err = warmup_phase(&mut transport, &call(), 5, true).unwrap_err();
        assert!(matches!(err, ClientError::Measurement(_)));
    }
}
