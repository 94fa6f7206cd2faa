//! Marketplace environments and the fixed endpoints each one exposes.
//!
//! The environment set is closed: `Production` and `Sandbox`. Anything else is a
//! configuration error raised when the configuration is built, never at call time.

// self
use crate::{_prelude::*, error::ConfigError};

const PRODUCTION_API_BASE: &str = "https://api.ebay.com";
const PRODUCTION_AUTHORIZATION: &str = "https://auth.ebay.com/oauth2/authorize";
const PRODUCTION_TOKEN: &str = "https://api.ebay.com/identity/v1/oauth2/token";
const SANDBOX_API_BASE: &str = "https://api.sandbox.ebay.com";
const SANDBOX_AUTHORIZATION: &str = "https://auth.sandbox.ebay.com/oauth2/authorize";
const SANDBOX_TOKEN: &str = "https://api.sandbox.ebay.com/identity/v1/oauth2/token";

/// Marketplace environment the gate talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MarketplaceEnvironment {
	/// Live marketplace.
	Production,
	/// Developer sandbox.
	Sandbox,
}
impl MarketplaceEnvironment {
	/// Returns the canonical environment name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Production => "Production",
			Self::Sandbox => "Sandbox",
		}
	}

	/// Resolves the endpoint set for this environment.
	pub fn endpoints(self) -> Result<MarketplaceEndpoints, ConfigError> {
		let (api_base, authorization, token) = match self {
			Self::Production => (PRODUCTION_API_BASE, PRODUCTION_AUTHORIZATION, PRODUCTION_TOKEN),
			Self::Sandbox => (SANDBOX_API_BASE, SANDBOX_AUTHORIZATION, SANDBOX_TOKEN),
		};

		Ok(MarketplaceEndpoints {
			api_base: parse_endpoint("api base", api_base)?,
			authorization: parse_endpoint("authorization", authorization)?,
			token: parse_endpoint("token", token)?,
		})
	}
}
impl Display for MarketplaceEnvironment {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for MarketplaceEnvironment {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"Production" => Ok(Self::Production),
			"Sandbox" => Ok(Self::Sandbox),
			other => Err(ConfigError::UnknownEnvironment { value: other.to_owned() }),
		}
	}
}
impl TryFrom<String> for MarketplaceEnvironment {
	type Error = ConfigError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}
impl From<MarketplaceEnvironment> for String {
	fn from(value: MarketplaceEnvironment) -> Self {
		value.as_str().to_owned()
	}
}

/// Endpoint set for one environment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketplaceEndpoints {
	/// Base URL for REST API calls (inventory, offers, listings).
	pub api_base: Url,
	/// Consent page used by the interactive authorization step.
	pub authorization: Url,
	/// Token endpoint used for code exchanges and refreshes.
	pub token: Url,
}
impl MarketplaceEndpoints {
	/// Builds an endpoint set from arbitrary URLs, e.g. a local mock or egress proxy.
	pub fn custom(
		api_base: impl AsRef<str>,
		authorization: impl AsRef<str>,
		token: impl AsRef<str>,
	) -> Result<Self, ConfigError> {
		Ok(Self {
			api_base: parse_endpoint("api base", api_base.as_ref())?,
			authorization: parse_endpoint("authorization", authorization.as_ref())?,
			token: parse_endpoint("token", token.as_ref())?,
		})
	}
}

/// Resolves the REST API base URL for an environment name.
pub fn resolve_base_url(environment: &str) -> Result<Url, ConfigError> {
	Ok(environment.parse::<MarketplaceEnvironment>()?.endpoints()?.api_base)
}

/// Resolves the consent page URL for an environment name.
pub fn resolve_auth_url(environment: &str) -> Result<Url, ConfigError> {
	Ok(environment.parse::<MarketplaceEnvironment>()?.endpoints()?.authorization)
}

/// Resolves the token endpoint URL for an environment name.
pub fn resolve_token_url(environment: &str) -> Result<Url, ConfigError> {
	Ok(environment.parse::<MarketplaceEnvironment>()?.endpoints()?.token)
}

fn parse_endpoint(endpoint: &'static str, raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|source| ConfigError::InvalidEndpoint { endpoint, source })
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn environments_resolve_distinct_fixed_endpoints() {
		let production = MarketplaceEnvironment::Production
			.endpoints()
			.expect("Production endpoints should resolve.");
		let sandbox =
			MarketplaceEnvironment::Sandbox.endpoints().expect("Sandbox endpoints should resolve.");

		assert_eq!(production.api_base.as_str(), "https://api.ebay.com/");
		assert_eq!(sandbox.api_base.as_str(), "https://api.sandbox.ebay.com/");
		assert_ne!(production, sandbox);
	}

	#[test]
	fn resolvers_return_the_fixed_urls_per_name() {
		let expect = |resolved: Result<Url, ConfigError>| {
			resolved.expect("Known environment names should resolve.").to_string()
		};

		assert_eq!(expect(resolve_base_url("Production")), "https://api.ebay.com/");
		assert_eq!(expect(resolve_base_url("Sandbox")), "https://api.sandbox.ebay.com/");
		assert_eq!(
			expect(resolve_auth_url("Production")),
			"https://auth.ebay.com/oauth2/authorize"
		);
		assert_eq!(
			expect(resolve_auth_url("Sandbox")),
			"https://auth.sandbox.ebay.com/oauth2/authorize"
		);
		assert_eq!(
			expect(resolve_token_url("Production")),
			"https://api.ebay.com/identity/v1/oauth2/token"
		);
		assert_eq!(
			expect(resolve_token_url("Sandbox")),
			"https://api.sandbox.ebay.com/identity/v1/oauth2/token"
		);

		for name in ["Staging", "production"] {
			for resolved in [resolve_base_url(name), resolve_auth_url(name), resolve_token_url(name)]
			{
				assert!(matches!(
					resolved,
					Err(ConfigError::UnknownEnvironment { ref value }) if value == name
				));
			}
		}
	}

	#[test]
	fn unknown_names_are_rejected() {
		for name in ["production", "Staging", "", " Sandbox"] {
			let err = name
				.parse::<MarketplaceEnvironment>()
				.expect_err("Only exact environment names should parse.");

			assert!(matches!(err, ConfigError::UnknownEnvironment { ref value } if value == name));
		}
	}

	#[test]
	fn serde_uses_canonical_names() {
		let payload = serde_json::to_string(&MarketplaceEnvironment::Sandbox)
			.expect("Environment should serialize.");

		assert_eq!(payload, "\"Sandbox\"");
		assert!(serde_json::from_str::<MarketplaceEnvironment>("\"Qa\"").is_err());
	}
}
