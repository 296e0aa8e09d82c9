//! Acquires one token through a locally spawned headless browser and prints its expiry.
//!
//! Honors `WEBTOKEN_BROWSER_PATH`, `WEBTOKEN_HEADLESS`, and `WEBTOKEN_BROWSER_WS`.

// crates.io
use color_eyre::Result;
use url::Url;
// self
use webtoken_broker::{
	browser::cdp::CdpEngine,
	flows::{Broker, TokenRequest},
	provider::SiteDescriptor,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let descriptor = SiteDescriptor::builder(Url::parse("https://open.example-music.app/")?)
		.token_endpoint_fragment("/api/token")
		.cookie_domain(".example-music.app")
		.build()?;
	let broker = Broker::new(CdpEngine::from_env(), descriptor);

	match broker.token(TokenRequest::new()).await {
		Some(grant) => println!(
			"Acquired {} token expiring at {} ms.",
			if grant.record.is_anonymous { "an anonymous" } else { "an authenticated" },
			grant.record.expires_at_ms(),
		),
		None => println!("No token could be acquired."),
	}

	Ok(())
}
