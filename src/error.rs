//! Gate-level error types shared across the token manager, rate limiter, and stores.

// self
use crate::_prelude::*;

/// Gate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical gate error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// No credential has been stored yet; the interactive authorization step never completed.
	#[error("No marketplace credential is stored; complete the authorization step first.")]
	NoCredential,
	/// The access token could not be refreshed. The in-flight call must not proceed.
	#[error("Failed to refresh the access token: {reason}.")]
	RefreshFailed {
		/// Gate-supplied reason string.
		reason: String,
		/// Underlying authenticator failure, when there is one.
		#[source]
		source: Option<Box<Error>>,
	},
	/// The daily call budget is spent. The call was not attempted.
	#[error("Daily call quota of {limit} is exhausted for {day}; retry at {retry_at}.")]
	QuotaExceeded {
		/// Day key whose budget is exhausted.
		day: Date,
		/// Configured daily limit.
		limit: u64,
		/// Start of the next day key.
		retry_at: OffsetDateTime,
	},
	/// Provider rejected the grant (e.g., bad code or refresh token).
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider- or gate-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider- or gate-supplied reason string.
		reason: String,
	},
}
impl Error {
	/// Returns `true` for failures the caller should treat as backpressure rather than a hard
	/// failure.
	pub fn is_backpressure(&self) -> bool {
		matches!(self, Self::QuotaExceeded { .. } | Self::Transient(_))
	}

	pub(crate) fn refresh_failed(reason: impl Into<String>, source: Option<Error>) -> Self {
		Self::RefreshFailed { reason: reason.into(), source: source.map(Box::new) }
	}
}

/// Configuration and validation failures raised by the gate.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Environment name is not one of the supported marketplace environments.
	#[error("Unknown marketplace environment `{value}`; expected `Production` or `Sandbox`.")]
	UnknownEnvironment {
		/// Rejected environment name.
		value: String,
	},
	/// Endpoint URL cannot be parsed.
	#[error("The {endpoint} endpoint is not a valid URL.")]
	InvalidEndpoint {
		/// Which endpoint failed to parse.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Required setting is absent or empty.
	#[error("Required setting `{key}` is missing or empty.")]
	MissingSetting {
		/// Setting name.
		key: &'static str,
	},
	/// Setting is present but malformed.
	#[error("Setting `{key}` is invalid: {reason}.")]
	InvalidSetting {
		/// Setting name.
		key: &'static str,
		/// Human-readable reason.
		reason: String,
	},
	/// Requested scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Credential builder validation failed.
	#[error("Unable to build credential.")]
	CredentialBuild(#[from] crate::auth::CredentialBuilderError),
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for ConfigError {
	fn from(e: reqwest::Error) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider- or gate-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
