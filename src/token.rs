//! Access-token lifecycle: cached reads, single-flight refresh, and the initial code exchange.
//!
//! [`TokenManager::valid_access_token`] hands out the stored access token while it is outside
//! the safety margin. Otherwise one caller refreshes it through the [`Authenticator`] while
//! the rest wait on the same guard and reuse the result. The refreshed credential is written
//! with [`CredentialStore::compare_and_swap_refresh`], keyed on the refresh token that was
//! spent, so a concurrent writer in another process never gets a half-applied record.

mod metrics;

pub use metrics::{RefreshCounts, RefreshMetrics};

// self
use crate::{
	_prelude::*,
	auth::{Credential, ScopeSet, TokenSecret},
	clock::{Clock, SystemClock},
	error::ConfigError,
	oauth::Authenticator,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{CompareAndSwapOutcome, CredentialStore},
};

/// Owns the stored credential and keeps its access token fresh.
#[derive(Clone)]
pub struct TokenManager {
	store: Arc<dyn CredentialStore>,
	authenticator: Arc<dyn Authenticator>,
	clock: Arc<dyn Clock>,
	scope: ScopeSet,
	safety_margin: Duration,
	refresh_metrics: Arc<RefreshMetrics>,
	refresh_guard: Arc<AsyncMutex<()>>,
}
impl TokenManager {
	/// Time before expiry at which the access token is already treated as unusable.
	pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::minutes(5);

	/// Creates a manager that requests `scope` on every refresh.
	pub fn new(
		store: Arc<dyn CredentialStore>,
		authenticator: Arc<dyn Authenticator>,
		scope: ScopeSet,
	) -> Self {
		Self {
			store,
			authenticator,
			clock: Arc::new(SystemClock),
			scope,
			safety_margin: Self::DEFAULT_SAFETY_MARGIN,
			refresh_metrics: Default::default(),
			refresh_guard: Default::default(),
		}
	}

	/// Replaces the wall clock, e.g. with a [`ManualClock`](crate::clock::ManualClock).
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Overrides the safety margin; negative values clamp to zero.
	pub fn with_safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	/// Safety margin currently applied to expiry checks.
	pub fn safety_margin(&self) -> Duration {
		self.safety_margin
	}

	/// Scopes requested on refresh.
	pub fn scope(&self) -> &ScopeSet {
		&self.scope
	}

	/// Refresh counters shared by all clones of this manager.
	pub fn refresh_metrics(&self) -> Arc<RefreshMetrics> {
		self.refresh_metrics.clone()
	}

	/// Returns the stored credential.
	pub async fn current_credential(&self) -> Result<Credential> {
		self.store.load().await?.ok_or(Error::NoCredential)
	}

	/// Returns an access token that is valid for at least the safety margin, refreshing it
	/// first when needed.
	pub async fn valid_access_token(&self) -> Result<TokenSecret> {
		const KIND: FlowKind = FlowKind::Refresh;

		let current = self.current_credential().await?;

		if current.is_usable_at(self.clock.now(), self.safety_margin) {
			return Ok(current.access_token);
		}

		let span = FlowSpan::new(KIND, "valid_access_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.refresh_single_flight()).await;

		match &result {
			Ok(_) => {
				self.refresh_metrics.record_success();
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
			},
			Err(err) => {
				self.refresh_metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				obs::refresh_failed(err);
			},
		}

		result.map(|credential| credential.access_token)
	}

	/// Exchanges the authorization code from the consent redirect and stores the resulting
	/// credential, overwriting any previous one while keeping its `created_at`.
	pub async fn store_initial_credential(&self, code: &str) -> Result<Credential> {
		const KIND: FlowKind = FlowKind::CodeExchange;

		let span = FlowSpan::new(KIND, "store_initial_credential");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				if code.trim().is_empty() {
					let reason = "Authorization code is empty".into();

					return Err(Error::InvalidGrant { reason });
				}

				let _singleflight = self.refresh_guard.lock().await;
				let grant = self.authenticator.exchange_code(code).await?;
				let previous = self.store.load().await?;
				let mut builder = Credential::builder().grant(&grant).updated_at(self.clock.now());

				if let Some(previous) = previous {
					builder = builder.created_at(previous.created_at);
				}

				let credential = builder.build().map_err(ConfigError::from)?;

				self.store.save(credential.clone()).await?;
				obs::credential_stored(true);

				Ok(credential)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn refresh_single_flight(&self) -> Result<Credential> {
		let _singleflight = self.refresh_guard.lock().await;
		// Another caller may have refreshed while this one waited on the guard.
		let current = self.current_credential().await?;

		if current.is_usable_at(self.clock.now(), self.safety_margin) {
			return Ok(current);
		}

		self.refresh_metrics.record_attempt();

		let grant = self
			.authenticator
			.refresh(current.refresh_token.expose(), &self.scope)
			.await
			.map_err(|err| Error::refresh_failed("token endpoint refused the refresh", Some(err)))?;

		if grant.access_token.is_blank() {
			return Err(Error::refresh_failed("token endpoint returned no access token", None));
		}
		if !grant.access_token_expires_in.is_positive() {
			return Err(Error::refresh_failed(
				"token endpoint returned a non-positive access token lifetime",
				None,
			));
		}
		if grant.access_token_expires_in > Credential::MAX_LIFETIME {
			return Err(Error::refresh_failed(
				"token endpoint returned an access token lifetime beyond the supported range",
				None,
			));
		}

		let rotated = grant.refresh_token.is_some();
		let updated = current.refreshed(&grant, self.clock.now());
		let outcome = self
			.store
			.compare_and_swap_refresh(current.refresh_token.expose(), updated.clone())
			.await?;

		match outcome {
			CompareAndSwapOutcome::Updated => {
				obs::credential_stored(rotated);

				Ok(updated)
			},
			CompareAndSwapOutcome::RefreshMismatch => match self.store.load().await? {
				Some(existing) => Ok(existing),
				None => self.save_refreshed(updated, rotated).await,
			},
			CompareAndSwapOutcome::Missing => self.save_refreshed(updated, rotated).await,
		}
	}

	async fn save_refreshed(&self, updated: Credential, rotated: bool) -> Result<Credential> {
		self.store.save(updated.clone()).await?;
		obs::credential_stored(rotated);

		Ok(updated)
	}
}
impl Debug for TokenManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("scope", &self.scope)
			.field("safety_margin", &self.safety_margin)
			.field("refresh_metrics", &self.refresh_metrics)
			.finish_non_exhaustive()
	}
}
