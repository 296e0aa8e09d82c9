//! Serves the token API over HTTP with a background proactive-refresh scheduler.
//!
//! `GET /api/token?force=1` returns the cached or freshly intercepted token;
//! `GET /health` is liveness only. The port comes from `PORT` (default 3000).

// std
use std::net::SocketAddr;
// crates.io
use color_eyre::Result;
use url::Url;
// self
use webtoken_broker::{
	api,
	browser::cdp::CdpEngine,
	flows::Broker,
	provider::SiteDescriptor,
	scheduler::RefreshScheduler,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let descriptor = SiteDescriptor::builder(Url::parse("https://open.example-music.app/")?)
		.token_endpoint_fragment("/api/token")
		.cookie_domain(".example-music.app")
		.build()?;
	let broker = Broker::new(CdpEngine::from_env(), descriptor);
	let scheduler = RefreshScheduler::spawn(broker.clone());
	let port = std::env::var("PORT").ok().and_then(|value| value.parse().ok()).unwrap_or(3000);
	let addr = SocketAddr::from(([127, 0, 0, 1], port));
	let listener = tokio::net::TcpListener::bind(addr).await?;

	println!("Serving on http://{addr}/api/token");

	axum::serve(listener, api::router(broker)).await?;

	scheduler.shutdown_and_wait().await;

	Ok(())
}
