//! Prints the consent URL for the one-time seller authorization and checks a returned `state`.
//!
//! Reads `MARKETPLACE_*` variables when present and falls back to sandbox demo values.

// crates.io
use color_eyre::Result;
// self
use marketplace_gate::{
	auth::ScopeSet,
	authorize::AuthorizationRequest,
	config::GateConfig,
	environment::MarketplaceEnvironment,
};

fn main() -> Result<()> {
	color_eyre::install()?;

	let config = match GateConfig::from_env() {
		Ok(config) => config,
		Err(err) => {
			eprintln!("Falling back to demo settings ({err}).");

			GateConfig::builder(MarketplaceEnvironment::Sandbox)
				.client_id("Demo-Shop-SBX-0123456789")
				.client_secret("SBX-demo-secret")
				.redirect_uri("Demo_Owner-DemoShop-SBX-abcdef")
				.scope(ScopeSet::new([
					"https://api.ebay.com/oauth/api_scope",
					"https://api.ebay.com/oauth/api_scope/sell.inventory",
				])?)
				.build()?
		},
	};
	let request = AuthorizationRequest::new(&config);

	println!("Send the seller to {}.", &request.authorize_url);
	println!("Requested scopes: {}.", &request.scope);

	// Simulate the redirect handler receiving the same `state` back.
	request.validate_state(&request.state)?;
	println!("State validated; pass the returned `code` to TokenManager::store_initial_credential.");

	Ok(())
}
