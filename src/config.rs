//! Gate configuration with eager validation.
//!
//! [`GateConfig`] is built once at startup. The environment is resolved to concrete endpoints
//! inside [`GateConfigBuilder::build`], so an unknown environment name fails before any
//! marketplace call is attempted.

// crates.io
use time::macros;
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	environment::{MarketplaceEndpoints, MarketplaceEnvironment},
	error::ConfigError,
};

/// Environment variable naming the marketplace environment (`Production` or `Sandbox`).
pub const ENV_ENVIRONMENT: &str = "MARKETPLACE_ENVIRONMENT";
/// Environment variable holding the OAuth client identifier.
pub const ENV_CLIENT_ID: &str = "MARKETPLACE_CLIENT_ID";
/// Environment variable holding the OAuth client secret.
pub const ENV_CLIENT_SECRET: &str = "MARKETPLACE_CLIENT_SECRET";
/// Environment variable holding the registered redirect URI (RuName).
pub const ENV_REDIRECT_URI: &str = "MARKETPLACE_REDIRECT_URI";
/// Environment variable holding the space-delimited scope list.
pub const ENV_SCOPE: &str = "MARKETPLACE_SCOPE";
/// Environment variable overriding the daily call quota.
pub const ENV_DAILY_CALL_QUOTA: &str = "MARKETPLACE_DAILY_CALL_QUOTA";
/// Environment variable setting the day-key offset (`+hh:mm`).
pub const ENV_DAY_OFFSET: &str = "MARKETPLACE_DAY_OFFSET";

/// Validated gate configuration.
#[derive(Clone, Debug)]
pub struct GateConfig {
	/// Selected marketplace environment.
	pub environment: MarketplaceEnvironment,
	/// Endpoints resolved from the environment (or an explicit override).
	pub endpoints: MarketplaceEndpoints,
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret used for HTTP Basic client authentication.
	pub client_secret: TokenSecret,
	/// Redirect URI registered with the marketplace, sent verbatim.
	pub redirect_uri: String,
	/// Scopes requested on consent and on every refresh.
	pub scope: ScopeSet,
	/// Maximum number of outbound calls per day key.
	pub daily_call_quota: u64,
	/// Offset whose calendar day defines the day key.
	pub day_offset: UtcOffset,
}
impl GateConfig {
	/// Default daily call quota.
	pub const DEFAULT_DAILY_CALL_QUOTA: u64 = crate::rate_limit::RateLimiter::DEFAULT_DAILY_LIMIT;

	/// Creates a builder for the provided environment.
	pub fn builder(environment: MarketplaceEnvironment) -> GateConfigBuilder {
		GateConfigBuilder::new(environment)
	}

	/// Reads the configuration from the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Reads the configuration through an arbitrary key lookup.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let required = |key: &'static str| {
			lookup(key)
				.filter(|value| !value.trim().is_empty())
				.ok_or(ConfigError::MissingSetting { key })
		};
		let environment = required(ENV_ENVIRONMENT)?.trim().parse::<MarketplaceEnvironment>()?;
		let scope = ScopeSet::from_str(&required(ENV_SCOPE)?)?;
		let mut builder = Self::builder(environment)
			.client_id(required(ENV_CLIENT_ID)?)
			.client_secret(required(ENV_CLIENT_SECRET)?)
			.redirect_uri(required(ENV_REDIRECT_URI)?)
			.scope(scope);

		if let Some(raw) = lookup(ENV_DAILY_CALL_QUOTA).filter(|value| !value.trim().is_empty()) {
			let quota = raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidSetting {
				key: ENV_DAILY_CALL_QUOTA,
				reason: e.to_string(),
			})?;

			builder = builder.daily_call_quota(quota);
		}
		if let Some(raw) = lookup(ENV_DAY_OFFSET).filter(|value| !value.trim().is_empty()) {
			builder = builder.day_offset(parse_day_offset(raw.trim())?);
		}

		builder.build()
	}
}

/// Builder for [`GateConfig`].
#[derive(Debug)]
pub struct GateConfigBuilder {
	environment: MarketplaceEnvironment,
	endpoints: Option<MarketplaceEndpoints>,
	client_id: Option<String>,
	client_secret: Option<TokenSecret>,
	redirect_uri: Option<String>,
	scope: ScopeSet,
	daily_call_quota: u64,
	day_offset: UtcOffset,
}
impl GateConfigBuilder {
	fn new(environment: MarketplaceEnvironment) -> Self {
		Self {
			environment,
			endpoints: None,
			client_id: None,
			client_secret: None,
			redirect_uri: None,
			scope: ScopeSet::default(),
			daily_call_quota: GateConfig::DEFAULT_DAILY_CALL_QUOTA,
			day_offset: UtcOffset::UTC,
		}
	}

	/// Sets the OAuth client identifier.
	pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id = Some(client_id.into());

		self
	}

	/// Sets the OAuth client secret.
	pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(TokenSecret::new(secret));

		self
	}

	/// Sets the registered redirect URI.
	pub fn redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
		self.redirect_uri = Some(redirect_uri.into());

		self
	}

	/// Sets the requested scopes.
	pub fn scope(mut self, scope: ScopeSet) -> Self {
		self.scope = scope;

		self
	}

	/// Overrides the daily call quota.
	pub fn daily_call_quota(mut self, quota: u64) -> Self {
		self.daily_call_quota = quota;

		self
	}

	/// Overrides the offset that defines calendar days for the call budget.
	pub fn day_offset(mut self, offset: UtcOffset) -> Self {
		self.day_offset = offset;

		self
	}

	/// Replaces the environment endpoints, e.g. with a local mock server.
	pub fn endpoints(mut self, endpoints: MarketplaceEndpoints) -> Self {
		self.endpoints = Some(endpoints);

		self
	}

	/// Validates the settings and resolves the environment endpoints.
	pub fn build(self) -> Result<GateConfig, ConfigError> {
		let endpoints = match self.endpoints {
			Some(endpoints) => endpoints,
			None => self.environment.endpoints()?,
		};
		let client_id = non_empty("client_id", self.client_id)?;
		let client_secret = self
			.client_secret
			.filter(|secret| !secret.is_blank())
			.ok_or(ConfigError::MissingSetting { key: "client_secret" })?;
		let redirect_uri = non_empty("redirect_uri", self.redirect_uri)?;

		if self.scope.is_empty() {
			return Err(ConfigError::MissingSetting { key: "scope" });
		}

		Ok(GateConfig {
			environment: self.environment,
			endpoints,
			client_id,
			client_secret,
			redirect_uri,
			scope: self.scope,
			daily_call_quota: self.daily_call_quota,
			day_offset: self.day_offset,
		})
	}
}

fn non_empty(key: &'static str, value: Option<String>) -> Result<String, ConfigError> {
	value
		.map(|v| v.trim().to_owned())
		.filter(|v| !v.is_empty())
		.ok_or(ConfigError::MissingSetting { key })
}

fn parse_day_offset(raw: &str) -> Result<UtcOffset, ConfigError> {
	let format = macros::format_description!("[offset_hour sign:mandatory]:[offset_minute]");

	UtcOffset::parse(raw, format)
		.map_err(|e| ConfigError::InvalidSetting { key: ENV_DAY_OFFSET, reason: e.to_string() })
}
