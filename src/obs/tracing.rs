// self
use crate::{
	_prelude::*,
	auth::{TargetId, UserId},
	obs::FlowKind,
	throttle::ThrottleScope,
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by broker flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("guild_join_broker.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
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

/// Emits a warning when a rate-limit signal blocks a scope.
pub fn record_throttle_trip(scope: &ThrottleScope, until: OffsetDateTime) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(%scope, %until, "provider rate limit tripped");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (scope, until);
	}
}

/// Emits a debug event for a per-user join that did not succeed.
pub fn record_join_failure(target: &TargetId, user: &UserId, reason: &'static str) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(%target, %user, reason, "join failed");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (target, user, reason);
	}
}

/// Emits a debug event once a refresh replaced a user's credential pair.
pub fn record_refresh_rotation(user: &UserId) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(%user, "credential pair refreshed");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = user;
	}
}

/// Emits a summary event for a finished batch.
pub fn record_batch_summary(target: &TargetId, attempted: usize, success: usize, failed: usize) {
	#[cfg(feature = "tracing")]
	{
		tracing::info!(%target, attempted, success, failed, "batch join finished");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (target, attempted, success, failed);
	}
}
