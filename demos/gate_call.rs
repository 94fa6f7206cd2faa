//! Runs one gated marketplace call against a file-backed credential and call budget.
//!
//! On first use the program prints the consent URL and asks for the `code` query parameter from
//! the redirect. Later runs reuse the stored credential, refreshing it when it is about to expire.
//!
//! Requires the `MARKETPLACE_*` variables read by `GateConfig::from_env`.

// std
use std::{
	io::{self, Write},
	sync::Arc,
};
// crates.io
use color_eyre::Result;
// self
use marketplace_gate::{
	authorize::AuthorizationRequest,
	config::GateConfig,
	error::Error,
	gate::ApiCallGate,
	store::{CredentialStore, FileStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let config = GateConfig::from_env()?;
	let store = Arc::new(FileStore::open("marketplace-gate.json")?);
	let gate = ApiCallGate::with_reqwest(&config, store.clone())?;

	if store.load().await?.is_none() {
		let request = AuthorizationRequest::new(&config);

		println!("Authorize the seller account: {}", &request.authorize_url);

		let returned_state = prompt("State from the redirect")?;

		request.validate_state(&returned_state)?;

		let code = prompt("Code from the redirect")?;
		let credential = gate.tokens().store_initial_credential(&code).await?;

		println!(
			"Stored credential; access token expires at {}.",
			credential.access_token_expires_at()
		);
	}

	let permit = match gate.authorize_call().await {
		Ok(permit) => permit,
		Err(Error::QuotaExceeded { day, limit, retry_at }) => {
			println!("Daily budget of {limit} calls for {day} is spent; retry at {retry_at}.");

			return Ok(());
		},
		Err(err) => return Err(err.into()),
	};
	let url = permit.endpoint("sell/inventory/v1/inventory_item?limit=1")?;
	let response = permit.sign(marketplace_gate::reqwest::Client::new().get(url)).send().await?;

	println!("Call #{} today returned {}.", permit.admission().count, response.status());
	println!("{}", response.text().await?);

	Ok(())
}

fn prompt(label: &str) -> Result<String> {
	print!("{label}: ");
	io::stdout().flush()?;

	let mut buffer = String::new();

	io::stdin().read_line(&mut buffer)?;

	Ok(buffer.trim().to_owned())
}
