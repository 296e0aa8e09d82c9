//! Rust’s turnkey browser-token broker—keep a headless-intercepted bearer token cached,
//! serialized behind a fair refresh lock, and proactively refreshed in one crate built for
//! production.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

#[cfg(feature = "api")] pub mod api;
pub mod auth;
pub mod browser;
pub mod error;
pub mod flows;
pub mod obs;
pub mod provider;
pub mod scheduler;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and scripted-engine helpers for integration tests; enabled via
	//! `cfg(test)` or the `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{
		collections::VecDeque,
		sync::atomic::{AtomicBool, AtomicUsize, Ordering},
	};
	// crates.io
	use tokio::sync::mpsc;
	// self
	use crate::{
		auth::CookieSet,
		browser::{
			BrowserEngine, BrowserPage, BrowserSession, CapturedExchange, EngineError,
			EngineFuture, ExchangeCapture, TeardownFuture,
		},
		flows::Broker,
		provider::{ResourceFilter, SiteDescriptor},
	};

	/// One scripted acquisition attempt played back by [`ScriptedEngine`].
	#[derive(Clone, Debug)]
	pub enum ScriptedCall {
		/// The capture yields a token-endpoint exchange once navigation starts.
		Respond {
			/// HTTP status of the intercepted exchange.
			status: u16,
			/// Raw response body delivered to the capture.
			body: String,
		},
		/// The exchange is delivered first, then navigation reports a failure.
		RespondThenNavigationFailure {
			/// HTTP status of the intercepted exchange.
			status: u16,
			/// Raw response body delivered to the capture.
			body: String,
		},
		/// Navigation fails before any exchange is observed.
		NavigationFailure,
		/// Navigation succeeds but no matching exchange ever arrives.
		Silence,
	}

	#[derive(Debug, Default)]
	struct ScriptedState {
		calls: Mutex<VecDeque<ScriptedCall>>,
		fallback: Mutex<Option<ScriptedCall>>,
		launches: AtomicUsize,
		closes: AtomicUsize,
		in_flight: AtomicUsize,
		max_in_flight: AtomicUsize,
		cookie_batches: Mutex<Vec<usize>>,
	}
	impl ScriptedState {
		fn next_call(&self) -> ScriptedCall {
			if let Some(call) = self.calls.lock().pop_front() {
				return call;
			}

			self.fallback.lock().clone().unwrap_or(ScriptedCall::Silence)
		}
	}

	/// Deterministic [`BrowserEngine`] that plays back a script of attempt outcomes while
	/// counting launches, teardowns, and concurrent sessions.
	#[derive(Debug, Default)]
	pub struct ScriptedEngine(Arc<ScriptedState>);
	impl ScriptedEngine {
		/// Creates an engine that plays the provided calls in order, then falls back to
		/// [`ScriptedCall::Silence`].
		pub fn scripted(calls: impl IntoIterator<Item = ScriptedCall>) -> Arc<Self> {
			let state = ScriptedState {
				calls: Mutex::new(calls.into_iter().collect()),
				..ScriptedState::default()
			};

			Arc::new(Self(Arc::new(state)))
		}

		/// Creates an engine that repeats the same call for every launch.
		pub fn always(call: ScriptedCall) -> Arc<Self> {
			let state =
				ScriptedState { fallback: Mutex::new(Some(call)), ..ScriptedState::default() };

			Arc::new(Self(Arc::new(state)))
		}

		/// Number of sessions launched so far.
		pub fn launches(&self) -> usize {
			self.0.launches.load(Ordering::SeqCst)
		}

		/// Number of sessions torn down so far.
		pub fn closes(&self) -> usize {
			self.0.closes.load(Ordering::SeqCst)
		}

		/// Highest number of sessions that were ever open at the same instant.
		pub fn max_in_flight(&self) -> usize {
			self.0.max_in_flight.load(Ordering::SeqCst)
		}

		/// Cookie counts observed per `set_cookies` call, in order.
		pub fn cookie_batches(&self) -> Vec<usize> {
			self.0.cookie_batches.lock().clone()
		}
	}
	impl BrowserEngine for ScriptedEngine {
		fn launch(&self) -> EngineFuture<'_, Box<dyn BrowserSession>> {
			Box::pin(async move {
				// Yield once so launches interleave with concurrent callers the way a real
				// browser spawn would.
				tokio::task::yield_now().await;

				let state = self.0.clone();

				state.launches.fetch_add(1, Ordering::SeqCst);

				let in_flight = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;

				state.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

				let session = ScriptedSession {
					call: state.next_call(),
					state,
					capture: Arc::new(Mutex::new(None)),
					closed: AtomicBool::new(false),
				};

				Ok(Box::new(session) as Box<dyn BrowserSession>)
			})
		}
	}

	struct ScriptedSession {
		state: Arc<ScriptedState>,
		call: ScriptedCall,
		capture: Arc<Mutex<Option<mpsc::Sender<CapturedExchange>>>>,
		closed: AtomicBool,
	}
	impl BrowserSession for ScriptedSession {
		fn page(&self) -> EngineFuture<'_, Box<dyn BrowserPage>> {
			Box::pin(async move {
				let page = ScriptedPage {
					state: self.state.clone(),
					call: self.call.clone(),
					capture: self.capture.clone(),
				};

				Ok(Box::new(page) as Box<dyn BrowserPage>)
			})
		}

		fn close(&self) -> TeardownFuture<'_> {
			Box::pin(async move {
				if self.closed.swap(true, Ordering::SeqCst) {
					return;
				}

				self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
				self.state.closes.fetch_add(1, Ordering::SeqCst);
			})
		}
	}

	struct ScriptedPage {
		state: Arc<ScriptedState>,
		call: ScriptedCall,
		capture: Arc<Mutex<Option<mpsc::Sender<CapturedExchange>>>>,
	}
	impl ScriptedPage {
		fn deliver(&self, status: u16, body: &str) {
			if let Some(sender) = self.capture.lock().clone() {
				let _ = sender.try_send(CapturedExchange {
					url: "https://site.test/api/token?reason=init".into(),
					status,
					body: body.as_bytes().to_vec(),
				});
			}
		}
	}
	impl BrowserPage for ScriptedPage {
		fn install_filter<'a>(&'a self, _filter: &'a ResourceFilter) -> EngineFuture<'a, ()> {
			Box::pin(async { Ok(()) })
		}

		fn capture<'a>(&'a self, _url_fragment: &'a str) -> EngineFuture<'a, ExchangeCapture> {
			Box::pin(async move {
				let (sender, capture) = ExchangeCapture::channel();

				*self.capture.lock() = Some(sender);

				Ok(capture)
			})
		}

		fn set_cookies<'a>(
			&'a self,
			cookies: &'a CookieSet,
			_domain: &'a str,
		) -> EngineFuture<'a, ()> {
			Box::pin(async move {
				self.state.cookie_batches.lock().push(cookies.len());

				Ok(())
			})
		}

		fn navigate<'a>(&'a self, _url: &'a Url) -> EngineFuture<'a, ()> {
			Box::pin(async move {
				match &self.call {
					ScriptedCall::Respond { status, body } => {
						self.deliver(*status, body);

						Ok(())
					},
					ScriptedCall::RespondThenNavigationFailure { status, body } => {
						self.deliver(*status, body);

						Err(EngineError::Navigation {
							message: "scripted navigation failure".into(),
						})
					},
					ScriptedCall::NavigationFailure =>
						Err(EngineError::Navigation {
							message: "scripted navigation failure".into(),
						}),
					ScriptedCall::Silence => Ok(()),
				}
			})
		}
	}

	/// Site descriptor fixture shared by integration tests.
	pub fn test_site_descriptor() -> SiteDescriptor {
		SiteDescriptor::builder(Url::parse("https://site.test/").expect("Test root URL should parse."))
			.token_endpoint_fragment("/api/token")
			.cookie_domain(".site.test")
			.build()
			.expect("Test site descriptor should build.")
	}

	/// Builds a broker driven by a [`ScriptedEngine`] playing the provided calls in order.
	pub fn build_scripted_broker(
		calls: impl IntoIterator<Item = ScriptedCall>,
	) -> (Broker<ScriptedEngine>, Arc<ScriptedEngine>) {
		let engine = ScriptedEngine::scripted(calls);
		let broker = Broker::new(engine.clone(), test_site_descriptor());

		(broker, engine)
	}

	/// JSON token payload body whose expiry lies `expires_in_ms` ahead of the current clock.
	pub fn payload_body(access_token: &str, expires_in_ms: i64, is_anonymous: bool) -> String {
		let expires_at_ms =
			(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64 + expires_in_ms;

		format!(
			"{{\"accessToken\":\"{access_token}\",\"expiresAtMs\":{expires_at_ms},\"isAnonymous\":{is_anonymous}}}"
		)
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tower as _, webtoken_broker as _};
