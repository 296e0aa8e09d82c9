//! Immutable token record and lifecycle helpers.

// self
use crate::_prelude::*;
use crate::auth::token::secret::TokenSecret;

/// Immutable record describing one intercepted bearer credential.
///
/// The expiry instant is whatever the remote system assigned; the broker never extends or
/// recomputes it. Records are replaced wholesale behind an [`Arc`] on every successful
/// acquisition, never mutated field by field, so unsynchronized readers always observe a
/// consistent snapshot.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenRecord {
	/// Bearer token value; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Server-assigned absolute expiry instant.
	pub expires_at: OffsetDateTime,
	/// Remote-assigned client identifier correlated with the token, when provided.
	pub client_id: Option<String>,
	/// Whether the token was issued without presented authentication cookies.
	pub is_anonymous: bool,
	/// Instant this record was captured locally.
	pub fetched_at: OffsetDateTime,
}
impl TokenRecord {
	/// Server-assigned expiry as epoch milliseconds.
	pub fn expires_at_ms(&self) -> i64 {
		(self.expires_at.unix_timestamp_nanos() / 1_000_000) as i64
	}

	/// Remaining lifetime at the provided instant; negative once expired.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		self.expires_at - instant
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("access_token", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.field("client_id", &self.client_id)
			.field("is_anonymous", &self.is_anonymous)
			.field("fetched_at", &self.fetched_at)
			.finish()
	}
}
