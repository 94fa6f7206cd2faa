//! Optional observability hooks for gate operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit spans named `marketplace_gate.flow` with `flow` and `stage` fields,
//!   plus warn-level events on quota exhaustion and refresh failures.
//! - Enable `metrics` to increment the `marketplace_gate_flow_total` counter labeled by `flow`
//!   and `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Gate operations that are observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Access-token refresh.
	Refresh,
	/// Authorization-code exchange during the interactive setup step.
	CodeExchange,
	/// Daily call-budget admission.
	Admission,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Refresh => "refresh",
			Self::CodeExchange => "code_exchange",
			Self::Admission => "admission",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded per operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Operation started.
	Attempt,
	/// Operation completed.
	Success,
	/// Operation failed with an error.
	Failure,
	/// Admission refused because the daily budget is spent.
	Denied,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Attempt => "attempt",
			Self::Success => "success",
			Self::Failure => "failure",
			Self::Denied => "denied",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
