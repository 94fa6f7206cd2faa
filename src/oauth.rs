//! Token endpoint client: authorization-code exchange and refresh-token grants.
//!
//! [`Authenticator`] is the seam the token manager depends on. [`OAuthAuthenticator`] implements
//! it over the `oauth2` crate with HTTP Basic client authentication and the marketplace's extra
//! `refresh_token_expires_in` response field.

pub use oauth2;

// crates.io
use oauth2::{
	AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	ExtraTokenFields, HttpClientError, RefreshToken, RequestTokenError, Scope,
	StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRequestTokenError, BasicRevocationErrorResponse,
		BasicTokenIntrospectionResponse, BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialBuilderError, ScopeSet, TokenGrant, TokenSecret},
	config::GateConfig,
	error::{ConfigError, TransientError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

/// Boxed future returned by [`Authenticator`] methods.
pub type AuthFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;
/// Token endpoint response carrying the marketplace's extra fields.
pub type MarketplaceTokenResponse = StandardTokenResponse<MarketplaceTokenFields, BasicTokenType>;
/// Reqwest-backed authenticator used by default.
#[cfg(feature = "reqwest")]
pub type ReqwestAuthenticator = OAuthAuthenticator<ReqwestHttpClient, ReqwestTransportErrorMapper>;

type ConfiguredClient = Client<
	BasicErrorResponse,
	MarketplaceTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;

/// Grants the gate performs against the token endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GrantType {
	/// One-time exchange of the consent redirect code.
	AuthorizationCode,
	/// Access-token renewal.
	RefreshToken,
}
impl GrantType {
	/// Returns the RFC 6749 identifier for the grant type.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::AuthorizationCode => "authorization_code",
			Self::RefreshToken => "refresh_token",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Extra token response fields returned by the marketplace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketplaceTokenFields {
	/// Lifetime of the issued refresh token in seconds.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub refresh_token_expires_in: Option<u64>,
}
impl ExtraTokenFields for MarketplaceTokenFields {}

/// Performs token endpoint grants on behalf of the token manager.
pub trait Authenticator
where
	Self: Send + Sync,
{
	/// Exchanges a refresh token for a new access token, requesting `scope`.
	fn refresh<'a>(
		&'a self,
		refresh_token: &'a str,
		scope: &'a ScopeSet,
	) -> AuthFuture<'a, TokenGrant>;

	/// Exchanges the authorization code from the consent redirect.
	fn exchange_code<'a>(&'a self, code: &'a str) -> AuthFuture<'a, TokenGrant>;
}

/// Maps HTTP transport failures into gate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a gate error.
	fn map_transport_error(
		&self,
		grant: GrantType,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		grant: GrantType,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(grant, meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) =>
				transient(meta, format!("{grant} request failed in the HTTP client: {message}")),
			_ => transient(meta, format!("{grant} request failed in the HTTP client")),
		}
	}
}

/// [`Authenticator`] backed by the `oauth2` crate.
pub struct OAuthAuthenticator<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredClient,
	redirect_uri: String,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
#[cfg(feature = "reqwest")]
impl OAuthAuthenticator<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Builds an authenticator with a default reqwest transport.
	pub fn new(config: &GateConfig) -> Result<Self> {
		Self::from_config(config, ReqwestHttpClient::default(), ReqwestTransportErrorMapper)
	}
}
impl<C, M> OAuthAuthenticator<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds an authenticator from the gate configuration and a custom transport.
	pub fn from_config(
		config: &GateConfig,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self> {
		let auth_url = AuthUrl::new(config.endpoints.authorization.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "authorization", source })?;
		let token_url = TokenUrl::new(config.endpoints.token.to_string())
			.map_err(|source| ConfigError::InvalidEndpoint { endpoint: "token", source })?;
		let oauth_client = Client::new(ClientId::new(config.client_id.clone()))
			.set_client_secret(ClientSecret::new(config.client_secret.expose().to_owned()))
			.set_auth_uri(auth_url)
			.set_token_uri(token_url);

		Ok(Self {
			oauth_client,
			redirect_uri: config.redirect_uri.clone(),
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
		})
	}
}
impl<C, M> Authenticator for OAuthAuthenticator<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn refresh<'a>(
		&'a self,
		refresh_token: &'a str,
		scope: &'a ScopeSet,
	) -> AuthFuture<'a, TokenGrant> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let refresh_secret = RefreshToken::new(refresh_token.to_owned());
			let mut request = self.oauth_client.exchange_refresh_token(&refresh_secret);

			for value in scope.iter() {
				request = request.add_scope(Scope::new(value.to_owned()));
			}

			let response = request.request_async(&instrumented).await.map_err(|err| {
				map_request_error(
					GrantType::RefreshToken,
					meta.take(),
					err,
					self.error_mapper.as_ref(),
				)
			})?;

			map_token_response(response)
		})
	}

	fn exchange_code<'a>(&'a self, code: &'a str) -> AuthFuture<'a, TokenGrant> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			// The marketplace expects its registered RuName here, which is not a URL.
			let request = self
				.oauth_client
				.exchange_code(AuthorizationCode::new(code.to_owned()))
				.add_extra_param("redirect_uri", self.redirect_uri.clone());
			let response = request.request_async(&instrumented).await.map_err(|err| {
				map_request_error(
					GrantType::AuthorizationCode,
					meta.take(),
					err,
					self.error_mapper.as_ref(),
				)
			})?;

			map_token_response(response)
		})
	}
}
impl<C, M> Debug for OAuthAuthenticator<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthAuthenticator")
			.field("client_id", self.oauth_client.client_id())
			.field("redirect_uri", &self.redirect_uri)
			.finish_non_exhaustive()
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TokenErrorKind {
	InvalidGrant,
	InvalidClient,
	Transient,
}

fn map_token_response(response: MarketplaceTokenResponse) -> Result<TokenGrant> {
	let access_token = response.access_token().secret();

	if access_token.trim().is_empty() {
		return Err(ConfigError::from(CredentialBuilderError::MissingAccessToken).into());
	}

	let expires_in = response.expires_in().ok_or(ConfigError::MissingExpiresIn)?.as_secs();
	let expires_in = i64::try_from(expires_in).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

	if expires_in <= 0 {
		return Err(ConfigError::NonPositiveExpiresIn.into());
	}

	let expires_in = Duration::seconds(expires_in);

	if expires_in > Credential::MAX_LIFETIME {
		return Err(ConfigError::ExpiresInOutOfRange.into());
	}

	let mut grant = TokenGrant::access_only(access_token.to_owned(), expires_in);

	let refresh = response.refresh_token().filter(|token| !token.secret().trim().is_empty());

	if let Some(refresh) = refresh {
		let lifetime = response
			.extra_fields()
			.refresh_token_expires_in
			.and_then(|secs| i64::try_from(secs).ok())
			.filter(|secs| *secs > 0)
			.map(Duration::seconds)
			.filter(|lifetime| *lifetime <= Credential::MAX_LIFETIME);

		grant.refresh_token = Some(TokenSecret::new(refresh.secret().to_owned()));
		grant.refresh_token_expires_in = lifetime;
	}

	Ok(grant)
}

fn map_request_error<E, M>(
	grant: GrantType,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response(grant, response, meta),
		RequestTokenError::Request(error) => mapper.map_transport_error(grant, meta, error),
		RequestTokenError::Parse(source, _body) =>
			TransientError::TokenResponseParse { source, status: meta_status(meta) }.into(),
		RequestTokenError::Other(message) =>
			transient(meta, format!("{grant} grant got an unexpected response: {message}")),
	}
}

fn map_server_response(
	grant: GrantType,
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let code = response.error().as_ref();
	let description = response.error_description().map(String::as_str);
	let kind = classify_token_error(code, description, meta_status(meta));
	let message = match description {
		Some(description) => format!("{grant} grant failed with `{code}`: {description}"),
		None => format!("{grant} grant failed with `{code}`"),
	};

	match kind {
		TokenErrorKind::InvalidGrant => Error::InvalidGrant { reason: message },
		TokenErrorKind::InvalidClient => Error::InvalidClient { reason: message },
		TokenErrorKind::Transient => transient(meta, message),
	}
}

fn classify_token_error(
	code: &str,
	description: Option<&str>,
	status: Option<u16>,
) -> TokenErrorKind {
	match_exact_value(code)
		.or_else(|| description.and_then(match_exact_value))
		.or_else(|| description.and_then(classify_text))
		.unwrap_or_else(|| classify_status(status))
}

fn match_exact_value(value: &str) -> Option<TokenErrorKind> {
	const GRANT: [&str; 3] = ["invalid_grant", "access_denied", "invalid_scope"];
	const CLIENT: [&str; 2] = ["invalid_client", "unauthorized_client"];
	const TRANSIENT: [&str; 2] = ["temporarily_unavailable", "server_error"];

	let is = |set: &[&str]| set.iter().any(|known| value.eq_ignore_ascii_case(known));

	if is(&GRANT) {
		Some(TokenErrorKind::InvalidGrant)
	} else if is(&CLIENT) {
		Some(TokenErrorKind::InvalidClient)
	} else if is(&TRANSIENT) {
		Some(TokenErrorKind::Transient)
	} else {
		None
	}
}

fn classify_text(text: &str) -> Option<TokenErrorKind> {
	let lowered = text.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant") || text.contains("expired") =>
			Some(TokenErrorKind::InvalidGrant),
		text if text.contains("invalid_client") => Some(TokenErrorKind::InvalidClient),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(TokenErrorKind::Transient),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> TokenErrorKind {
	match status {
		Some(400 | 403 | 404 | 410) => TokenErrorKind::InvalidGrant,
		Some(401) => TokenErrorKind::InvalidClient,
		_ => TokenErrorKind::Transient,
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(
	grant: GrantType,
	meta: Option<&ResponseMetadata>,
	err: ReqwestError,
) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::TokenEndpoint {
			message: format!("{grant} request timed out while calling the token endpoint"),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	TransportError::from(err).into()
}

fn transient(meta: Option<&ResponseMetadata>, message: String) -> Error {
	TransientError::TokenEndpoint {
		message,
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::AccessToken;
	// self
	use super::*;

	fn response(
		access: &str,
		expires_in: Option<u64>,
		refresh: Option<&str>,
		refresh_expires_in: Option<u64>,
	) -> MarketplaceTokenResponse {
		let mut response = StandardTokenResponse::new(
			AccessToken::new(access.to_owned()),
			BasicTokenType::Bearer,
			MarketplaceTokenFields { refresh_token_expires_in: refresh_expires_in },
		);
		let expires_in = expires_in.map(std::time::Duration::from_secs);

		response.set_expires_in(expires_in.as_ref());
		response.set_refresh_token(refresh.map(|value| RefreshToken::new(value.to_owned())));

		response
	}

	#[test]
	fn token_response_maps_rotation_fields() {
		let grant =
			map_token_response(response("access", Some(7200), Some("refresh"), Some(47_304_000)))
				.expect("Complete response should map.");

		assert_eq!(grant.access_token.expose(), "access");
		assert_eq!(grant.access_token_expires_in, Duration::hours(2));
		assert_eq!(grant.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh"));
		assert_eq!(grant.refresh_token_expires_in, Some(Duration::seconds(47_304_000)));
	}

	#[test]
	fn token_response_without_refresh_token_is_access_only() {
		let grant = map_token_response(response("access", Some(7200), None, Some(100)))
			.expect("Refresh responses may omit the refresh token.");

		assert!(grant.refresh_token.is_none());
		assert!(grant.refresh_token_expires_in.is_none());
	}

	#[test]
	fn token_response_requires_positive_expiry_and_access_token() {
		let err = map_token_response(response("access", None, None, None))
			.expect_err("Missing expires_in should be rejected.");

		assert!(matches!(err, Error::Config(ConfigError::MissingExpiresIn)));

		let err = map_token_response(response("access", Some(0), None, None))
			.expect_err("Zero expires_in should be rejected.");

		assert!(matches!(err, Error::Config(ConfigError::NonPositiveExpiresIn)));

		let err = map_token_response(response(" ", Some(60), None, None))
			.expect_err("Blank access tokens should be rejected.");

		assert!(matches!(err, Error::Config(ConfigError::CredentialBuild(_))));
	}

	#[test]
	fn oversized_lifetimes_are_rejected_or_dropped() {
		let err = map_token_response(response("access", Some(10_000_000_000_000), Some("r"), None))
			.expect_err("Unrepresentable expires_in should be rejected.");

		assert!(matches!(err, Error::Config(ConfigError::ExpiresInOutOfRange)));

		let grant = map_token_response(response(
			"access",
			Some(7200),
			Some("refresh"),
			Some(10_000_000_000_000),
		))
		.expect("Oversized refresh lifetimes should be ignored.");

		assert_eq!(grant.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh"));
		assert!(grant.refresh_token_expires_in.is_none());
	}

	#[test]
	fn token_errors_are_classified() {
		assert_eq!(
			classify_token_error("invalid_grant", None, Some(400)),
			TokenErrorKind::InvalidGrant
		);
		assert_eq!(
			classify_token_error("invalid_client", None, Some(401)),
			TokenErrorKind::InvalidClient
		);
		assert_eq!(
			classify_token_error("server_error", None, Some(500)),
			TokenErrorKind::Transient
		);
		assert_eq!(
			classify_token_error(
				"invalid_request",
				Some("the provided authorization refresh token is invalid_grant"),
				Some(400)
			),
			TokenErrorKind::InvalidGrant
		);
		assert_eq!(classify_token_error("custom", None, Some(401)), TokenErrorKind::InvalidClient);
		assert_eq!(classify_token_error("custom", None, Some(503)), TokenErrorKind::Transient);
		assert_eq!(classify_token_error("custom", None, None), TokenErrorKind::Transient);
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn builds_from_config() {
		let config = GateConfig::builder(crate::environment::MarketplaceEnvironment::Production)
			.client_id("client-id")
			.client_secret("client-secret")
			.redirect_uri("Shop-App-PRD-xyz")
			.scope("https://api.ebay.com/oauth/api_scope".parse().expect("Scope should parse."))
			.build()
			.expect("Config fixture should build.");
		let authenticator =
			ReqwestAuthenticator::new(&config).expect("Authenticator should build from config.");
		let rendered = format!("{authenticator:?}");

		assert!(rendered.contains("client-id"));
		assert!(!rendered.contains("client-secret"));
	}
}
