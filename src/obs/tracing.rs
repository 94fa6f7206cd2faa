// self
use crate::{_prelude::*, obs::FlowKind};

/// Resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// Span wrapper used by gate operations.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a span tagged with the operation kind and call site.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("marketplace_gate.flow", flow = kind.as_str(), stage);

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

pub(crate) fn quota_exhausted(day: Date, limit: u64, retry_at: OffsetDateTime) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(%day, limit, %retry_at, "Daily call quota exhausted; call refused.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (day, limit, retry_at);
	}
}

pub(crate) fn refresh_failed(error: &Error) {
	#[cfg(feature = "tracing")]
	{
		tracing::warn!(%error, "Access token refresh failed.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = error;
	}
}

pub(crate) fn credential_stored(rotated_refresh_token: bool) {
	#[cfg(feature = "tracing")]
	{
		tracing::info!(rotated_refresh_token, "Marketplace credential stored.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = rotated_refresh_token;
	}
}
