//! Browser seam for token acquisition.
//!
//! The module exposes [`BrowserEngine`], [`BrowserSession`], and [`BrowserPage`] so the
//! acquisition flow can drive any browser stack without depending on one. The traits act as
//! the broker's only dependency on a browser: implementations own their transport (the
//! `cdp` feature ships a Chrome-DevTools-Protocol engine) and deliver intercepted responses
//! through an [`ExchangeCapture`] channel whose receiving half the flow consumes exactly
//! once. Dropping the capture is how observers are removed; there is no explicit
//! unsubscribe call to forget on an error path.

#[cfg(feature = "cdp")] pub mod cdp;

// crates.io
use tokio::sync::mpsc;
// self
use crate::{_prelude::*, auth::CookieSet, provider::ResourceFilter};

/// Boxed future returned by fallible engine operations.
pub type EngineFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, EngineError>> + 'a + Send>>;
/// Boxed future returned by teardown operations; infallible by contract.
pub type TeardownFuture<'a> = Pin<Box<dyn Future<Output = ()> + 'a + Send>>;

/// Error type produced by [`BrowserEngine`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum EngineError {
	/// Browser executable could not be located or spawned.
	#[error("Browser could not be launched: {message}.")]
	Launch {
		/// Human-readable launch failure.
		message: String,
	},
	/// Connection to the browser's control channel failed.
	#[error("Browser control connection failed: {message}.")]
	Connect {
		/// Human-readable connection failure.
		message: String,
	},
	/// A browser protocol command failed or timed out.
	#[error("Browser command `{command}` failed: {message}.")]
	Command {
		/// Protocol command that failed.
		command: &'static str,
		/// Human-readable command failure.
		message: String,
	},
	/// Navigation reported an error before completing.
	#[error("Navigation failed: {message}.")]
	Navigation {
		/// Human-readable navigation failure.
		message: String,
	},
}

/// Launches browser execution contexts.
///
/// Implementations must be `'static + Send + Sync` so one engine can be shared by the
/// broker, the scheduler, and any number of concurrent callers without extra wrappers.
pub trait BrowserEngine
where
	Self: 'static + Send + Sync,
{
	/// Opens a fresh browser execution context.
	fn launch(&self) -> EngineFuture<'_, Box<dyn BrowserSession>>;
}

/// One launched browser execution context.
pub trait BrowserSession
where
	Self: Send + Sync,
{
	/// Opens (or returns) the session's page.
	fn page(&self) -> EngineFuture<'_, Box<dyn BrowserPage>>;

	/// Tears the session down.
	///
	/// Never raises: teardown runs on cleanup paths that must not themselves fail, so
	/// implementations catch and log their own errors. Calling it more than once is safe.
	fn close(&self) -> TeardownFuture<'_>;
}

/// One page inside a browser session.
pub trait BrowserPage
where
	Self: Send + Sync,
{
	/// Installs the request filter table on the page.
	fn install_filter<'a>(&'a self, filter: &'a ResourceFilter) -> EngineFuture<'a, ()>;

	/// Starts capturing completed responses whose URL contains `url_fragment`.
	///
	/// Must be called before [`BrowserPage::navigate`]; matching exchanges arrive on the
	/// returned channel until it is dropped.
	fn capture<'a>(&'a self, url_fragment: &'a str) -> EngineFuture<'a, ExchangeCapture>;

	/// Installs authentication cookies scoped to `domain` (non-HTTP-only, secure,
	/// lax-same-site). Implementations log the count, never the values.
	fn set_cookies<'a>(&'a self, cookies: &'a CookieSet, domain: &'a str) -> EngineFuture<'a, ()>;

	/// Navigates the page. Completion means the navigation was accepted, not that the
	/// token exchange happened; the capture channel is the success signal.
	fn navigate<'a>(&'a self, url: &'a Url) -> EngineFuture<'a, ()>;
}

/// One completed network exchange captured from the page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedExchange {
	/// Full URL of the intercepted response.
	pub url: String,
	/// HTTP status of the intercepted response.
	pub status: u16,
	/// Raw response body.
	pub body: Vec<u8>,
}

/// Receiving half of a response capture.
///
/// Consuming the first exchange (or dropping the capture) is the single resolution point:
/// a deadline that abandons the wait simply drops this value, leaving any late-arriving
/// response with nowhere to land.
#[derive(Debug)]
pub struct ExchangeCapture(mpsc::Receiver<CapturedExchange>);
impl ExchangeCapture {
	/// Creates a connected sender/capture pair.
	pub fn channel() -> (mpsc::Sender<CapturedExchange>, Self) {
		let (sender, receiver) = mpsc::channel(8);

		(sender, Self(receiver))
	}

	/// Waits for the first captured exchange; `None` means the session ended without one.
	pub async fn first(mut self) -> Option<CapturedExchange> {
		self.0.recv().await
	}
}
