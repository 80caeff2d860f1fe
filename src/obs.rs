//! Optional observability helpers for gateway operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `oauth2_gateway.op` with the `op`
//!   (operation) and `stage` (call site) fields, plus point events for retries, revocation
//!   failures, cache misses, and probe results.
//! - Enable `metrics` to increment the `oauth2_gateway_op_total` counter for every
//!   attempt/success/failure/retry, labeled by `op` + `outcome`, and to publish the
//!   `oauth2_gateway_consecutive_failures` gauge.

mod metrics;
mod span;

pub use metrics::*;
pub use span::*;

// self
use crate::_prelude::*;

/// Emits a `tracing` event when the `tracing` feature is enabled.
///
/// Without `tracing` the field values are only borrowed, so bindings that exist for the log
/// line alone stay used.
macro_rules! log_event {
	(@discard $field:ident = % $value:expr, $($rest:tt)+) => {
		let _ = &$value;
		$crate::obs::log_event!(@discard $($rest)+);
	};
	(@discard $field:ident = ? $value:expr, $($rest:tt)+) => {
		let _ = &$value;
		$crate::obs::log_event!(@discard $($rest)+);
	};
	(@discard $field:ident = $value:expr, $($rest:tt)+) => {
		let _ = &$value;
		$crate::obs::log_event!(@discard $($rest)+);
	};
	(@discard $field:ident, $($rest:tt)+) => {
		let _ = &$field;
		$crate::obs::log_event!(@discard $($rest)+);
	};
	(@discard $message:literal $(, $arg:expr)* $(,)?) => {
		$(let _ = &$arg;)*
	};
	($level:ident, $($arg:tt)+) => {{
		#[cfg(feature = "tracing")]
		{
			::tracing::$level!($($arg)+);
		}
		#[cfg(not(feature = "tracing"))]
		{
			$crate::obs::log_event!(@discard $($arg)+);
		}
	}};
}
pub(crate) use log_event;

/// Gateway operations observed by spans and metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
	/// Client-credentials exchange.
	Authenticate,
	/// Refresh-token exchange.
	Refresh,
	/// Token revocation.
	Revoke,
	/// Outbound API call through the pipeline.
	Request,
	/// Liveness probe.
	HealthProbe,
}
impl Op {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Op::Authenticate => "authenticate",
			Op::Refresh => "refresh",
			Op::Revoke => "revoke",
			Op::Request => "request",
			Op::HealthProbe => "health_probe",
		}
	}
}
impl Display for Op {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Transient failure that will be retried.
	Retry,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
			OpOutcome::Retry => "retry",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::NetworkError;

	#[test]
	fn log_events_accept_every_field_form() {
		let request_id = "req-1";
		let status = 503_u16;
		let error = NetworkError::new("connection reset");

		log_event!(warn, request_id, status = status, error = %error, detail = ?error, "Field forms.");
		log_event!(debug, "Status {} observed.", status);

		assert_eq!(Op::Request.to_string(), "request");
		assert_eq!(OpOutcome::Retry.to_string(), "retry");
	}
}
