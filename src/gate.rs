//! Per-call composition of the daily budget and the access-token lifecycle.
//!
//! Every outbound marketplace call goes through [`ApiCallGate::authorize_call`] exactly once.
//! The budget is charged first; only an admitted call resolves a token, so an exhausted day
//! never triggers a refresh.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	clock::Clock,
	config::GateConfig,
	error::ConfigError,
	oauth::Authenticator,
	rate_limit::{Admission, RateLimiter},
	store::{CallBudgetCounter, CredentialStore},
	token::TokenManager,
};

/// Gate that every outbound marketplace call passes through.
#[derive(Clone, Debug)]
pub struct ApiCallGate {
	limiter: RateLimiter,
	tokens: TokenManager,
	base_url: Url,
}
impl ApiCallGate {
	/// Composes a gate from prepared parts.
	pub fn new(limiter: RateLimiter, tokens: TokenManager, base_url: Url) -> Self {
		Self { limiter, tokens, base_url }
	}

	/// Builds a gate whose credential and budget share one store.
	pub fn from_config<S>(
		config: &GateConfig,
		store: Arc<S>,
		authenticator: Arc<dyn Authenticator>,
	) -> Self
	where
		S: 'static + CredentialStore + CallBudgetCounter,
	{
		let credentials: Arc<dyn CredentialStore> = store.clone();
		let budget: Arc<dyn CallBudgetCounter> = store;
		let limiter = RateLimiter::new(budget, config.daily_call_quota)
			.with_day_offset(config.day_offset);
		let tokens = TokenManager::new(credentials, authenticator, config.scope.clone());

		Self::new(limiter, tokens, config.endpoints.api_base.clone())
	}

	/// Builds a gate with the default reqwest-backed authenticator.
	#[cfg(feature = "reqwest")]
	pub fn with_reqwest<S>(config: &GateConfig, store: Arc<S>) -> Result<Self>
	where
		S: 'static + CredentialStore + CallBudgetCounter,
	{
		let authenticator = crate::oauth::ReqwestAuthenticator::new(config)?;

		Ok(Self::from_config(config, store, Arc::new(authenticator)))
	}

	/// Drives both the limiter and the token manager from `clock`.
	pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
		Self {
			limiter: self.limiter.with_clock(clock.clone()),
			tokens: self.tokens.with_clock(clock),
			base_url: self.base_url,
		}
	}

	/// Daily budget shared by all calls through this gate.
	pub fn limiter(&self) -> &RateLimiter {
		&self.limiter
	}

	/// Token lifecycle used for admitted calls.
	pub fn tokens(&self) -> &TokenManager {
		&self.tokens
	}

	/// Base URL of the marketplace REST API.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// Admits one outbound call and resolves a valid access token for it.
	///
	/// Fails with [`Error::QuotaExceeded`] when the day's budget is spent, or with the token
	/// manager's error when no usable token can be produced. The budget stays charged in the
	/// second case because the admission already happened.
	pub async fn authorize_call(&self) -> Result<CallPermit> {
		let admission = self.limiter.ensure_admitted().await?;
		let access_token = self.tokens.valid_access_token().await?;

		Ok(CallPermit { access_token, base_url: self.base_url.clone(), admission })
	}
}

/// Authorization for exactly one outbound marketplace call.
#[derive(Clone)]
pub struct CallPermit {
	access_token: TokenSecret,
	base_url: Url,
	admission: Admission,
}
impl CallPermit {
	/// Bearer token for this call.
	pub fn access_token(&self) -> &TokenSecret {
		&self.access_token
	}

	/// Budget admission this permit consumed.
	pub fn admission(&self) -> Admission {
		self.admission
	}

	/// Resolves an API path (e.g. `/sell/inventory/v1/offer`) against the environment base URL.
	pub fn endpoint(&self, path: &str) -> Result<Url> {
		self.base_url
			.join(path)
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "api call", source }.into())
	}

	/// `Authorization` header value.
	pub fn authorization_header(&self) -> String {
		format!("Bearer {}", self.access_token.expose())
	}

	/// Adds the bearer token and JSON `Accept` header to a reqwest request.
	#[cfg(feature = "reqwest")]
	pub fn sign(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
		request
			.bearer_auth(self.access_token.expose())
			.header(reqwest::header::ACCEPT, "application/json")
	}
}
impl Debug for CallPermit {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CallPermit")
			.field("access_token", &"<redacted>")
			.field("base_url", &self.base_url)
			.field("admission", &self.admission)
			.finish()
	}
}
