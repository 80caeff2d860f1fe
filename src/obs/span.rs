// self
use crate::{
	_prelude::*,
	obs::{self, Op, OpOutcome},
};

/// Future returned by [`OpSpan::instrument`]; a plain passthrough without `tracing`.
#[cfg(feature = "tracing")]
pub type InstrumentedOp<F> = tracing::instrument::Instrumented<F>;
/// Future returned by [`OpSpan::instrument`]; a plain passthrough without `tracing`.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOp<F> = F;

/// `oauth2_gateway.op` span of one gateway operation.
///
/// Besides `op` and `stage`, the span declares `request_id`, `attempts` and `outcome`, which
/// are filled in as the operation progresses. [`OpSpan::record_outcome`] also feeds the
/// `oauth2_gateway_op_total` counter, so the span and the metric never disagree.
#[derive(Clone, Debug)]
pub struct OpSpan {
	op: Op,
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OpSpan {
	/// Opens a span for `op` at `stage`.
	pub fn new(op: Op, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"oauth2_gateway.op",
				op = op.as_str(),
				stage,
				request_id = tracing::field::Empty,
				attempts = tracing::field::Empty,
				outcome = tracing::field::Empty,
			);

			Self { op, span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = stage;

			Self { op }
		}
	}

	/// Operation the span describes.
	pub fn op(&self) -> Op {
		self.op
	}

	/// Tags the span with the request identifier sent upstream.
	pub fn with_request_id(self, request_id: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			self.span.record("request_id", request_id);
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = request_id;
		}

		self
	}

	/// Records how many transport attempts the operation made.
	pub fn record_attempts(&self, attempts: u32) {
		#[cfg(feature = "tracing")]
		{
			self.span.record("attempts", attempts);
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = attempts;
		}
	}

	/// Records `outcome` on the span and in the operation counter.
	pub fn record_outcome(&self, outcome: OpOutcome) {
		#[cfg(feature = "tracing")]
		{
			self.span.record("outcome", outcome.as_str());
		}

		obs::record_op_outcome(self.op, outcome);
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn spans_carry_their_operation_through_instrumentation() {
		let span = OpSpan::new(Op::Request, "dispatch").with_request_id("req-7");
		let value = span.instrument(async { 42 }).await;

		span.record_attempts(2);
		span.record_outcome(OpOutcome::Success);

		assert_eq!(value, 42);
		assert_eq!(span.op(), Op::Request);
	}
}
