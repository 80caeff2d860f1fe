// self
use crate::obs::{Op, OpOutcome};

/// Records an operation outcome via the global metrics recorder (when enabled).
pub fn record_op_outcome(op: Op, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_gateway_op_total",
			"op" => op.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (op, outcome);
	}
}

/// Publishes the health monitor's consecutive-failure count (when enabled).
pub fn record_consecutive_failures(count: u32) {
	#[cfg(feature = "metrics")]
	{
		metrics::gauge!("oauth2_gateway_consecutive_failures").set(f64::from(count));
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = count;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_noop_without_an_installed_recorder() {
		record_op_outcome(Op::Request, OpOutcome::Retry);
		record_consecutive_failures(3);
	}
}
