//! Call gate for a rate-limited marketplace REST API: one OAuth 2.0 credential kept fresh with
//! single-flight refreshes, and a per-day outbound call budget checked before every request.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod authorize;
pub mod clock;
pub mod config;
pub mod environment;
pub mod error;
pub mod gate;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod rate_limit;
pub mod store;
pub mod token;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{
		collections::VecDeque,
		sync::atomic::{AtomicUsize, Ordering},
	};
	// self
	use crate::{
		auth::{Credential, ScopeSet, TokenGrant},
		config::GateConfig,
		environment::{MarketplaceEndpoints, MarketplaceEnvironment},
		error::TransientError,
		http::ReqwestHttpClient,
		oauth::{AuthFuture, Authenticator},
	};

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Sandbox configuration whose endpoints all point at `base` (usually an `httpmock` server).
	pub fn test_gate_config(base: &str) -> GateConfig {
		let base = base.trim_end_matches('/');
		let endpoints = MarketplaceEndpoints::custom(
			format!("{base}/"),
			format!("{base}/oauth2/authorize"),
			format!("{base}/identity/v1/oauth2/token"),
		)
		.expect("Mock endpoints should parse.");

		GateConfig::builder(MarketplaceEnvironment::Sandbox)
			.client_id("test-client")
			.client_secret("test-secret")
			.redirect_uri("Test_Owner-TestApp-SBX-redirect")
			.scope(test_scope())
			.endpoints(endpoints)
			.build()
			.expect("Test gate config should build.")
	}

	/// Scope set used across tests.
	pub fn test_scope() -> ScopeSet {
		ScopeSet::new([
			"https://api.ebay.com/oauth/api_scope",
			"https://api.ebay.com/oauth/api_scope/sell.inventory",
		])
		.expect("Test scope should be valid.")
	}

	/// Credential updated at `updated_at` whose access token lives for `lifetime`.
	pub fn test_credential(
		access: &str,
		refresh: &str,
		updated_at: OffsetDateTime,
		lifetime: Duration,
	) -> Credential {
		Credential::builder()
			.access_token(access)
			.refresh_token(refresh)
			.access_token_expires_in(lifetime)
			.refresh_token_expires_in(Duration::days(547))
			.updated_at(updated_at)
			.build()
			.expect("Test credential should build.")
	}

	/// [`Authenticator`] that replays queued results and counts calls.
	///
	/// An empty queue yields a transient error so unexpected calls fail loudly.
	#[derive(Debug, Default)]
	pub struct ScriptedAuthenticator {
		refresh_results: Mutex<VecDeque<Result<TokenGrant>>>,
		code_results: Mutex<VecDeque<Result<TokenGrant>>>,
		refresh_calls: AtomicUsize,
		code_calls: AtomicUsize,
		seen_refresh_tokens: Mutex<Vec<String>>,
	}
	impl ScriptedAuthenticator {
		/// Queues the result of the next refresh call.
		pub fn push_refresh(self, result: Result<TokenGrant>) -> Self {
			self.refresh_results.lock().push_back(result);

			self
		}

		/// Queues the result of the next code exchange.
		pub fn push_code(self, result: Result<TokenGrant>) -> Self {
			self.code_results.lock().push_back(result);

			self
		}

		/// Number of refresh calls received.
		pub fn refresh_calls(&self) -> usize {
			self.refresh_calls.load(Ordering::SeqCst)
		}

		/// Number of code exchanges received.
		pub fn code_calls(&self) -> usize {
			self.code_calls.load(Ordering::SeqCst)
		}

		/// Refresh tokens presented so far, in call order.
		pub fn seen_refresh_tokens(&self) -> Vec<String> {
			self.seen_refresh_tokens.lock().clone()
		}

		fn next(queue: &Mutex<VecDeque<Result<TokenGrant>>>) -> Result<TokenGrant> {
			queue.lock().pop_front().unwrap_or_else(|| {
				Err(TransientError::TokenEndpoint {
					message: "No scripted response left".into(),
					status: None,
					retry_after: None,
				}
				.into())
			})
		}
	}
	impl Authenticator for ScriptedAuthenticator {
		fn refresh<'a>(
			&'a self,
			refresh_token: &'a str,
			_scope: &'a ScopeSet,
		) -> AuthFuture<'a, TokenGrant> {
			self.refresh_calls.fetch_add(1, Ordering::SeqCst);
			self.seen_refresh_tokens.lock().push(refresh_token.to_owned());

			let result = Self::next(&self.refresh_results);

			Box::pin(async move { result })
		}

		fn exchange_code<'a>(&'a self, _code: &'a str) -> AuthFuture<'a, TokenGrant> {
			self.code_calls.fetch_add(1, Ordering::SeqCst);

			let result = Self::next(&self.code_results);

			Box::pin(async move { result })
		}
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Date, Duration, OffsetDateTime, UtcOffset};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use time;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
