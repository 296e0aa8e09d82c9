//! The acquisition protocol: one browser-driven attempt to intercept a token.
//!
//! One call of [`Broker::acquire_once`] opens a session, installs the request filter,
//! registers a response capture for the token endpoint, optionally installs authentication
//! cookies, navigates the root page, and resolves with the first captured exchange. A single
//! deadline spans the whole attempt, and teardown runs exactly once on every exit path
//! (success, navigation failure, capture loss, or deadline), because open browser sessions
//! are the expensive resource here.

// self
use crate::{
	_prelude::*,
	auth::{CookieSet, TokenPayload, TokenRecord},
	browser::{BrowserEngine, BrowserSession, CapturedExchange},
	error::AcquisitionError,
	flows::Broker,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::SiteDescriptor,
};

impl<E> Broker<E>
where
	E: ?Sized + BrowserEngine,
{
	/// Performs one end-to-end acquisition attempt.
	pub(crate) async fn acquire_once(
		&self,
		cookies: &CookieSet,
	) -> Result<TokenRecord, AcquisitionError> {
		const KIND: FlowKind = FlowKind::Acquire;

		let span = FlowSpan::new(KIND, "acquire_once");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.acquire_inner(cookies)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn acquire_inner(&self, cookies: &CookieSet) -> Result<TokenRecord, AcquisitionError> {
		let session = self.engine.launch().await.map_err(AcquisitionError::engine)?;
		let deadline = self.descriptor.acquisition_deadline;
		let outcome = match tokio::time::timeout(
			deadline.unsigned_abs(),
			drive_page(session.as_ref(), &self.descriptor, cookies),
		)
		.await
		{
			Ok(result) => result,
			Err(_) => Err(AcquisitionError::DeadlineExceeded { deadline }),
		};

		// Teardown before the outcome is interpreted, so it runs on every exit path; the
		// session contract guarantees it never raises.
		session.close().await;

		let exchange = outcome?;

		if !(200..300).contains(&exchange.status) {
			return Err(AcquisitionError::EndpointStatus { status: exchange.status });
		}

		let payload = TokenPayload::parse_sanitized(&exchange.body)
			.map_err(|source| AcquisitionError::PayloadParse { source })?;

		Ok(TokenRecord::try_from(payload)?)
	}
}

async fn drive_page(
	session: &dyn BrowserSession,
	descriptor: &SiteDescriptor,
	cookies: &CookieSet,
) -> Result<CapturedExchange, AcquisitionError> {
	let page = session.page().await.map_err(AcquisitionError::engine)?;

	page.install_filter(&descriptor.filter).await.map_err(AcquisitionError::engine)?;

	let capture = page
		.capture(&descriptor.token_endpoint_fragment)
		.await
		.map_err(AcquisitionError::engine)?;

	if !cookies.is_empty() {
		page.set_cookies(cookies, &descriptor.cookie_domain)
			.await
			.map_err(AcquisitionError::engine)?;

		#[cfg(feature = "tracing")]
		tracing::info!(count = cookies.len(), "navigating with authentication cookies");
	}

	let first = capture.first();
	let navigation = page.navigate(&descriptor.root_url);

	tokio::pin!(first);
	tokio::pin!(navigation);

	let mut navigating = true;

	loop {
		tokio::select! {
			// A captured exchange beats a simultaneous navigation error: once the token
			// response is in hand, a late navigation failure is irrelevant.
			biased;

			exchange = &mut first => return exchange.ok_or(AcquisitionError::CaptureClosed),
			outcome = &mut navigation, if navigating => match outcome {
				Ok(()) => navigating = false,
				Err(source) => return Err(AcquisitionError::engine(source)),
			},
		}
	}
}
