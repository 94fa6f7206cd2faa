//! Consent URL construction for the one-time interactive authorization step.
//!
//! The marketplace redirects the seller back to the registered redirect URI with `code` and
//! `state`. Callers validate `state` with [`AuthorizationRequest::validate_state`] and then hand
//! the code to [`TokenManager::store_initial_credential`].
//!
//! [`TokenManager::store_initial_credential`]: crate::token::TokenManager::store_initial_credential

// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{_prelude::*, auth::ScopeSet, config::GateConfig};

const STATE_LEN: usize = 32;

/// Consent page request handed to the seller's browser.
#[derive(Clone, Debug)]
pub struct AuthorizationRequest {
	/// Scopes shown on the consent screen.
	pub scope: ScopeSet,
	/// Opaque state value that must round-trip via the redirect handler.
	pub state: String,
	/// Fully formed consent URL.
	pub authorize_url: Url,
}
impl AuthorizationRequest {
	/// Builds a consent request with a fresh random state.
	pub fn new(config: &GateConfig) -> Self {
		Self::with_state(config, random_string(STATE_LEN))
	}

	/// Builds a consent request with a caller-provided state value.
	pub fn with_state(config: &GateConfig, state: impl Into<String>) -> Self {
		let state = state.into();
		let mut authorize_url = config.endpoints.authorization.clone();
		let mut pairs = authorize_url.query_pairs_mut();

		pairs.append_pair("client_id", &config.client_id);
		pairs.append_pair("redirect_uri", &config.redirect_uri);
		pairs.append_pair("response_type", "code");
		pairs.append_pair("scope", &config.scope.normalized());
		pairs.append_pair("state", &state);

		drop(pairs);

		Self { scope: config.scope.clone(), state, authorize_url }
	}

	/// Validates the returned `state` parameter after the consent redirect.
	pub fn validate_state(&self, returned_state: &str) -> Result<()> {
		if returned_state == self.state {
			Ok(())
		} else {
			Err(Error::InvalidGrant { reason: "Authorization state mismatch.".into() })
		}
	}
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}
