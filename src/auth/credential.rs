//! The single stored OAuth 2.0 credential, its expiry math, and rotation rules.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Lifecycle status of the access token at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialStatus {
	/// The access token is usable and outside the safety margin.
	Active,
	/// The access token has not expired yet but falls inside the safety margin.
	Expiring,
	/// The access token exceeded its lifetime.
	Expired,
}

/// Errors produced by [`CredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no refresh token value was provided.
	#[error("Refresh token is required.")]
	MissingRefreshToken,
	/// Issued when no access token lifetime was configured.
	#[error("Access token lifetime is required.")]
	MissingExpiry,
	/// Issued when the access token lifetime is zero or negative.
	#[error("Access token lifetime must be positive.")]
	NonPositiveExpiry,
	/// Issued when a lifetime exceeds [`Credential::MAX_LIFETIME`] or its expiry cannot be
	/// represented.
	#[error("Token lifetime exceeds the supported range.")]
	ExpiryOutOfRange,
}

/// Token endpoint result normalized for the credential lifecycle.
///
/// Providers may omit the refresh token on a refresh response; in that case the stored
/// refresh token and its lifetime stay in place.
#[derive(Clone)]
pub struct TokenGrant {
	/// Newly issued access token.
	pub access_token: TokenSecret,
	/// Lifetime of the access token (`expires_in`).
	pub access_token_expires_in: Duration,
	/// Rotated refresh token, when the provider issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Lifetime of the rotated refresh token (`refresh_token_expires_in`).
	pub refresh_token_expires_in: Option<Duration>,
}
impl TokenGrant {
	/// Creates a grant that carries only a new access token.
	pub fn access_only(access_token: impl Into<String>, expires_in: Duration) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			access_token_expires_in: expires_in,
			refresh_token: None,
			refresh_token_expires_in: None,
		}
	}

	/// Attaches a rotated refresh token and its optional lifetime.
	pub fn with_refresh_token(
		mut self,
		refresh_token: impl Into<String>,
		expires_in: Option<Duration>,
	) -> Self {
		self.refresh_token = Some(TokenSecret::new(refresh_token));
		self.refresh_token_expires_in = expires_in;

		self
	}
}
impl Debug for TokenGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenGrant")
			.field("access_token", &"<redacted>")
			.field("access_token_expires_in", &self.access_token_expires_in)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("refresh_token_expires_in", &self.refresh_token_expires_in)
			.finish()
	}
}

/// The single OAuth 2.0 grant held for the downstream marketplace account.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Credential {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret used to mint new access tokens.
	pub refresh_token: TokenSecret,
	/// Lifetime of the access token, counted from `updated_at`.
	pub access_token_expires_in: Duration,
	/// Lifetime of the refresh token, if the provider reported one.
	pub refresh_token_expires_in: Option<Duration>,
	/// Instant the credential was first acquired.
	pub created_at: OffsetDateTime,
	/// Instant of the last acquisition or refresh.
	pub updated_at: OffsetDateTime,
}
impl Credential {
	/// Longest access or refresh token lifetime accepted from the token endpoint.
	pub const MAX_LIFETIME: Duration = Duration::days(3_650);

	/// Returns a builder for constructing credentials.
	pub fn builder() -> CredentialBuilder {
		CredentialBuilder::default()
	}

	/// Instant the access token stops being accepted by the provider.
	pub fn access_token_expires_at(&self) -> OffsetDateTime {
		self.updated_at.saturating_add(self.access_token_expires_in)
	}

	/// Instant the refresh token stops being accepted, when its lifetime is known.
	///
	/// Rotation without a new refresh token keeps the old lifetime while `updated_at` moves, so
	/// this is an upper bound rather than an exact instant.
	pub fn refresh_token_expires_at(&self) -> Option<OffsetDateTime> {
		self.refresh_token_expires_in.map(|lifetime| self.updated_at.saturating_add(lifetime))
	}

	/// Computes the access-token status at `instant`, treating the final `margin` of the
	/// lifetime as already unusable.
	///
	/// A lifetime whose expiry cannot be represented counts as expired.
	pub fn status_at(&self, instant: OffsetDateTime, margin: Duration) -> CredentialStatus {
		let Some(expires_at) = self.updated_at.checked_add(self.access_token_expires_in) else {
			return CredentialStatus::Expired;
		};

		if instant >= expires_at {
			return CredentialStatus::Expired;
		}
		if instant >= expires_at.saturating_sub(margin) {
			return CredentialStatus::Expiring;
		}

		CredentialStatus::Active
	}

	/// Returns `true` when the access token can be handed out at `instant`.
	pub fn is_usable_at(&self, instant: OffsetDateTime, margin: Duration) -> bool {
		matches!(self.status_at(instant, margin), CredentialStatus::Active)
	}

	/// Applies a refresh response, keeping the stored refresh token when none was issued.
	pub fn refreshed(&self, grant: &TokenGrant, now: OffsetDateTime) -> Self {
		let (refresh_token, refresh_token_expires_in) = match &grant.refresh_token {
			Some(rotated) => (
				rotated.clone(),
				grant.refresh_token_expires_in.or(self.refresh_token_expires_in),
			),
			None => (self.refresh_token.clone(), self.refresh_token_expires_in),
		};

		Self {
			access_token: grant.access_token.clone(),
			refresh_token,
			access_token_expires_in: grant.access_token_expires_in,
			refresh_token_expires_in,
			created_at: self.created_at,
			updated_at: now,
		}
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("access_token_expires_in", &self.access_token_expires_in)
			.field("refresh_token_expires_in", &self.refresh_token_expires_in)
			.field("created_at", &self.created_at)
			.field("updated_at", &self.updated_at)
			.finish()
	}
}

/// Builder for [`Credential`].
#[derive(Clone, Debug, Default)]
pub struct CredentialBuilder {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	access_token_expires_in: Option<Duration>,
	refresh_token_expires_in: Option<Duration>,
	created_at: Option<OffsetDateTime>,
	updated_at: Option<OffsetDateTime>,
}
impl CredentialBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the access token lifetime.
	pub fn access_token_expires_in(mut self, lifetime: Duration) -> Self {
		self.access_token_expires_in = Some(lifetime);

		self
	}

	/// Sets the refresh token lifetime.
	pub fn refresh_token_expires_in(mut self, lifetime: Duration) -> Self {
		self.refresh_token_expires_in = Some(lifetime);

		self
	}

	/// Sets the creation instant (defaults to `updated_at`).
	pub fn created_at(mut self, instant: OffsetDateTime) -> Self {
		self.created_at = Some(instant);

		self
	}

	/// Sets the last-update instant (defaults to the current clock).
	pub fn updated_at(mut self, instant: OffsetDateTime) -> Self {
		self.updated_at = Some(instant);

		self
	}

	/// Seeds the builder from a token endpoint grant.
	pub fn grant(mut self, grant: &TokenGrant) -> Self {
		self.access_token = Some(grant.access_token.clone());
		self.refresh_token = grant.refresh_token.clone();
		self.access_token_expires_in = Some(grant.access_token_expires_in);
		self.refresh_token_expires_in = grant.refresh_token_expires_in;

		self
	}

	/// Consumes the builder and produces a [`Credential`].
	pub fn build(self) -> Result<Credential, CredentialBuilderError> {
		let access_token = self
			.access_token
			.filter(|secret| !secret.is_blank())
			.ok_or(CredentialBuilderError::MissingAccessToken)?;
		let refresh_token = self
			.refresh_token
			.filter(|secret| !secret.is_blank())
			.ok_or(CredentialBuilderError::MissingRefreshToken)?;
		let access_token_expires_in =
			self.access_token_expires_in.ok_or(CredentialBuilderError::MissingExpiry)?;

		if !access_token_expires_in.is_positive() {
			return Err(CredentialBuilderError::NonPositiveExpiry);
		}

		let updated_at = self.updated_at.unwrap_or_else(OffsetDateTime::now_utc);
		let in_range = |lifetime: Duration| {
			lifetime <= Credential::MAX_LIFETIME && updated_at.checked_add(lifetime).is_some()
		};

		if !in_range(access_token_expires_in)
			|| self.refresh_token_expires_in.is_some_and(|lifetime| !in_range(lifetime))
		{
			return Err(CredentialBuilderError::ExpiryOutOfRange);
		}

		Ok(Credential {
			access_token,
			refresh_token,
			access_token_expires_in,
			refresh_token_expires_in: self.refresh_token_expires_in,
			created_at: self.created_at.unwrap_or(updated_at),
			updated_at,
		})
	}
}
