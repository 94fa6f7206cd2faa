//! Daily outbound call budget.
//!
//! Every marketplace call is charged against a counter keyed by the calendar day of the
//! configured reference offset. The increment and the limit check happen in one critical
//! section inside the [`CallBudgetCounter`], so concurrent callers can never overshoot the
//! limit. A new day starts at zero; old days are never consulted again.

// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{BudgetOutcome, CallBudgetCounter},
};

/// Result of a budget evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
	/// The call was admitted and counted.
	Allow {
		/// Day key the call was charged to.
		day: Date,
		/// Calls admitted for the day, including this one.
		count: u64,
	},
	/// The budget for the day is spent; nothing was counted.
	Deny(RetryDirective),
}
impl RateLimitDecision {
	/// Returns `true` when the call may proceed.
	pub fn is_allowed(&self) -> bool {
		matches!(self, Self::Allow { .. })
	}
}

/// Tells callers when a denied call can be retried.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryDirective {
	/// Day key whose budget is exhausted.
	pub day: Date,
	/// Configured daily limit.
	pub limit: u64,
	/// Start of the next day key.
	pub earliest_retry_at: OffsetDateTime,
	/// Time left until `earliest_retry_at`.
	pub recommended_backoff: Duration,
}
impl From<RetryDirective> for Error {
	fn from(directive: RetryDirective) -> Self {
		Self::QuotaExceeded {
			day: directive.day,
			limit: directive.limit,
			retry_at: directive.earliest_retry_at,
		}
	}
}

/// Proof that one call was admitted against the daily budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Admission {
	/// Day key the call was charged to.
	pub day: Date,
	/// Calls admitted for the day, including this one.
	pub count: u64,
}

/// Counts outbound calls per day and refuses them once the daily limit is reached.
#[derive(Clone)]
pub struct RateLimiter {
	counter: Arc<dyn CallBudgetCounter>,
	clock: Arc<dyn Clock>,
	daily_limit: u64,
	day_offset: UtcOffset,
}
impl RateLimiter {
	/// Daily limit applied when none is configured.
	pub const DEFAULT_DAILY_LIMIT: u64 = 2_000_000;

	/// Creates a limiter with UTC day keys and the system clock.
	pub fn new(counter: Arc<dyn CallBudgetCounter>, daily_limit: u64) -> Self {
		Self { counter, clock: Arc::new(SystemClock), daily_limit, day_offset: UtcOffset::UTC }
	}

	/// Replaces the wall clock.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Uses the calendar day at `offset` as the day key.
	pub fn with_day_offset(mut self, offset: UtcOffset) -> Self {
		self.day_offset = offset;

		self
	}

	/// Configured daily limit.
	pub fn daily_limit(&self) -> u64 {
		self.daily_limit
	}

	/// Day key for `instant`.
	pub fn day_key_at(&self, instant: OffsetDateTime) -> Date {
		instant.to_offset(self.day_offset).date()
	}

	/// First instant of the day key following `day`.
	pub fn next_day_start(&self, day: Date) -> OffsetDateTime {
		day.midnight().assume_offset(self.day_offset).saturating_add(Duration::DAY)
	}

	/// Charges one call against today's budget and reports the decision.
	pub async fn evaluate(&self) -> Result<RateLimitDecision> {
		const KIND: FlowKind = FlowKind::Admission;

		let span = FlowSpan::new(KIND, "evaluate");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let now = self.clock.now();
				let day = self.day_key_at(now);
				let outcome = self.counter.increment_if_under(day, self.daily_limit).await?;

				Ok(match outcome {
					BudgetOutcome::Admitted { count } => RateLimitDecision::Allow { day, count },
					BudgetOutcome::Exhausted { .. } => {
						let earliest_retry_at = self.next_day_start(day);

						RateLimitDecision::Deny(RetryDirective {
							day,
							limit: self.daily_limit,
							earliest_retry_at,
							recommended_backoff: earliest_retry_at - now,
						})
					},
				})
			})
			.await;

		match &result {
			Ok(RateLimitDecision::Allow { .. }) =>
				obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Ok(RateLimitDecision::Deny(directive)) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Denied);
				obs::quota_exhausted(directive.day, directive.limit, directive.earliest_retry_at);
			},
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Charges one call and returns whether it may proceed.
	pub async fn admit_call(&self) -> Result<bool> {
		Ok(self.evaluate().await?.is_allowed())
	}

	/// Charges one call, turning a denial into [`Error::QuotaExceeded`].
	pub async fn ensure_admitted(&self) -> Result<Admission> {
		match self.evaluate().await? {
			RateLimitDecision::Allow { day, count } => Ok(Admission { day, count }),
			RateLimitDecision::Deny(directive) => Err(directive.into()),
		}
	}

	/// Calls admitted on `day`.
	pub async fn calls_on(&self, day: Date) -> Result<u64> {
		Ok(self.counter.count(day).await?)
	}

	/// Calls admitted under the current day key.
	pub async fn calls_today(&self) -> Result<u64> {
		self.calls_on(self.day_key_at(self.clock.now())).await
	}

	/// Drops counters for days before `day`.
	pub async fn prune_before(&self, day: Date) -> Result<usize> {
		Ok(self.counter.prune_before(day).await?)
	}
}
impl Debug for RateLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RateLimiter")
			.field("daily_limit", &self.daily_limit)
			.field("day_offset", &self.day_offset)
			.finish_non_exhaustive()
	}
}
