//! Broker-level error types shared across flows, the browser seam, and the scheduler.
//!
//! The taxonomy separates what the retry policy may replay from what it must not:
//! [`AcquisitionError`] covers a single browser-driven attempt and is always retryable, while
//! [`ConfigError`] marks local misconfiguration that no amount of retrying can repair.
//! [`Error::Exhausted`] is what a caller observes once every attempt has been spent.

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Single acquisition attempt failure; retryable by the retry policy.
	#[error(transparent)]
	Acquisition(#[from] AcquisitionError),
	/// Local configuration problem; never retried.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Every acquisition attempt failed; carries the final attempt's error.
	#[error("Token acquisition failed after {attempts} attempts.")]
	Exhausted {
		/// Number of attempts performed before giving up.
		attempts: u32,
		/// Error produced by the final attempt.
		#[source]
		source: AcquisitionError,
	},
}

/// Failure of one end-to-end browser-driven acquisition attempt.
///
/// Every browser, transport, and parse fault inside an attempt is normalized into one of
/// these variants at the acquisition boundary, so the retry policy can treat the whole
/// family as retryable without inspecting messages.
#[derive(Debug, ThisError)]
pub enum AcquisitionError {
	/// The overall acquisition deadline elapsed before a token response was captured.
	#[error("Acquisition deadline of {deadline} elapsed before a token response was captured.")]
	DeadlineExceeded {
		/// Deadline that was applied to the attempt.
		deadline: Duration,
	},
	/// Navigation failed before any matching response was observed.
	#[error("Navigation to the target site failed.")]
	Navigation {
		/// Engine-level navigation failure.
		#[source]
		source: crate::browser::EngineError,
	},
	/// The intercepted exchange completed with a non-success HTTP status.
	#[error("Token endpoint responded with HTTP status {status}.")]
	EndpointStatus {
		/// HTTP status code of the intercepted exchange.
		status: u16,
	},
	/// The intercepted response body was not a valid token payload.
	#[error("Token payload could not be parsed.")]
	PayloadParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// The payload parsed but violated the token contract.
	#[error(transparent)]
	Payload(#[from] crate::auth::TokenPayloadError),
	/// The browser session ended before a matching response arrived.
	#[error("Browser session ended before a token response was captured.")]
	CaptureClosed,
	/// Browser engine failure (launch, protocol command, cookie install).
	#[error("Browser engine failure.")]
	Engine {
		/// Engine-level failure.
		#[source]
		source: crate::browser::EngineError,
	},
}
impl AcquisitionError {
	/// Normalizes an engine fault into an acquisition error, keeping navigation failures
	/// distinguishable for the before/after-capture edge case.
	pub fn engine(source: crate::browser::EngineError) -> Self {
		match source {
			crate::browser::EngineError::Navigation { .. } => Self::Navigation { source },
			_ => Self::Engine { source },
		}
	}
}

/// Configuration and validation failures raised by the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// Site descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] crate::provider::SiteDescriptorError),
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::browser::EngineError;

	#[test]
	fn engine_faults_keep_navigation_distinct() {
		let navigation =
			AcquisitionError::engine(EngineError::Navigation { message: "net::ERR_FAILED".into() });

		assert!(matches!(navigation, AcquisitionError::Navigation { .. }));

		let command = AcquisitionError::engine(EngineError::Command {
			command: "Network.setCookie",
			message: "target detached".into(),
		});

		assert!(matches!(command, AcquisitionError::Engine { .. }));
	}

	#[test]
	fn exhausted_exposes_final_attempt_as_source() {
		let error = Error::Exhausted {
			attempts: 3,
			source: AcquisitionError::EndpointStatus { status: 502 },
		};

		assert!(error.to_string().contains("3 attempts"));

		let source = StdError::source(&error)
			.expect("Exhausted error should expose the final attempt as its source.");

		assert!(source.to_string().contains("502"));
	}
}
