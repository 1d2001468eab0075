//! Timed echo handler for `unpack_data`
//!
//! Every call reports the time elapsed since the start of the previous call
//! and is answered with `["OK"]`. The gap is measured start-to-start, so it
//! includes the previous call's own execution time as well as the idle time
//! between calls.

use crate::protocol::{Fault, Value, ACKNOWLEDGEMENT, UNPACK_DATA_METHOD};
use crate::server::monitor::ServerCounters;
use crate::server::registry::RpcMethod;
use std::fmt;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Width of the right-aligned microsecond column in the timing line
const GAP_COLUMN_WIDTH: usize = 8;

/// Source of monotonic timestamps
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Clock backed by `Instant::now`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Time since the previous call started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallGap {
    /// No previous call since the handler was created
    First,
    Elapsed(Duration),
}

impl CallGap {
    /// Gap in whole microseconds, None for the first call
    pub fn micros(&self) -> Option<u64> {
        match self {
            CallGap::First => None,
            CallGap::Elapsed(gap) => Some(u64::try_from(gap.as_micros()).unwrap_or(u64::MAX)),
        }
    }
}

impl fmt::Display for CallGap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.micros() {
            None => write!(
                f,
                "prev RPC .. {:>width$} μs (first call)",
                "-",
                width = GAP_COLUMN_WIDTH
            ),
            Some(micros) => write!(
                f,
                "prev RPC .. {:>width$} us",
                micros,
                width = GAP_COLUMN_WIDTH
            ),
        }
    }
}

/// Handler that acknowledges every call and prints inter-call timing.
///
/// The timestamp of the previous call start is owned by the handler and
/// guarded by a mutex, so concurrent connections each see a consistent
/// read-then-replace of the slot.
pub struct TimedEchoHandler<C: Clock = SystemClock> {
    clock: C,
    last_call: Mutex<Option<Instant>>,
    counters: Option<ServerCounters>,
}

impl TimedEchoHandler<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for TimedEchoHandler<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> TimedEchoHandler<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            last_call: Mutex::new(None),
            counters: None,
        }
    }

    /// Also record each gap into the server's gap histogram.
    pub fn with_counters(mut self, counters: ServerCounters) -> Self {
        self.counters = Some(counters);
        self
    }

    /// Store the start time of the current call and return the gap to the
    /// previous one.
    pub fn mark_call(&self) -> CallGap {
        let now = self.clock.now();
        let previous = self
            .last_call
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(now);

        match previous {
            None => CallGap::First,
            Some(previous) => CallGap::Elapsed(now.saturating_duration_since(previous)),
        }
    }
}

/// Write the timing line. Write failures such as a closed stdout pipe are
/// logged and otherwise ignored.
fn report_gap<W: Write>(out: &mut W, gap: CallGap) {
    if let Err(e) = writeln!(out, "{gap}") {
        debug!(error = %e, "Could not write timing line");
    }
}

impl<C: Clock> RpcMethod for TimedEchoHandler<C> {
    fn name(&self) -> &str {
        UNPACK_DATA_METHOD
    }

    fn execute(&self, params: &[Value]) -> Result<Value, Fault> {
        let gap = self.mark_call();
        report_gap(&mut io::stdout().lock(), gap);
        if let (Some(counters), CallGap::Elapsed(elapsed)) = (&self.counters, gap) {
            counters.record_gap(elapsed);
        }

        let payload = params.first().ok_or_else(|| {
            Fault::invalid_params(format!(
                "{UNPACK_DATA_METHOD} expects 1 string parameter, got 0"
            ))
        })?;
        let payload = payload.as_str().ok_or_else(|| {
            Fault::invalid_params(format!(
                "{UNPACK_DATA_METHOD} expects a string parameter, got {}",
                payload.type_name()
            ))
        })?;
        debug!(payload_len = payload.len(), "unpack_data payload received");

        Ok(Value::Array(vec![Value::from(ACKNOWLEDGEMENT)]))
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_any_string_payload_is_acknowledged(payload in any::<String>()) {
            let handler = TimedEchoHandler::new();
            let result = handler.execute(&[Value::String(payload)]);
            prop_assert_eq!(result, Ok(Value::Array(vec![Value::from("OK")])));
        }
    }
}
