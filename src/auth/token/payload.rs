//! Wire-shape token payload captured from the intercepted exchange.

// self
use crate::{_prelude::*, auth::token::record::TokenRecord, auth::token::secret::TokenSecret};

/// Errors produced while promoting a parsed payload into a [`TokenRecord`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenPayloadError {
	/// The expiresAtMs value must be positive.
	#[error("The expiresAtMs value must be positive.")]
	NonPositiveExpiry,
	/// The expiresAtMs value exceeds the supported instant range.
	#[error("The expiresAtMs value exceeds the supported range.")]
	ExpiryOutOfRange,
}

/// Token payload exactly as the target page's token endpoint emits it.
///
/// Unknown sibling fields are tolerated; a diagnostic `_notes` member is stripped before
/// deserialization so upstream debug chatter never reaches the token contract.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
	/// Opaque bearer value.
	pub access_token: String,
	/// Server-assigned absolute expiry in epoch milliseconds.
	pub expires_at_ms: i64,
	/// Remote-assigned client identifier, when the endpoint includes one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub client_id: Option<String>,
	/// Whether the token was issued against anonymous browsing state.
	pub is_anonymous: bool,
}
impl TokenPayload {
	/// Parses a captured response body, stripping the `_notes` member when present.
	pub fn parse_sanitized(
		body: &[u8],
	) -> Result<Self, serde_path_to_error::Error<serde_json::Error>> {
		let mut deserializer = serde_json::Deserializer::from_slice(body);
		let mut value: serde_json::Value = serde_path_to_error::deserialize(&mut deserializer)?;

		if let Some(object) = value.as_object_mut() {
			object.remove("_notes");
		}

		serde_path_to_error::deserialize(value)
	}
}
impl Debug for TokenPayload {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenPayload")
			.field("access_token", &"<redacted>")
			.field("expires_at_ms", &self.expires_at_ms)
			.field("client_id", &self.client_id)
			.field("is_anonymous", &self.is_anonymous)
			.finish()
	}
}
impl TryFrom<TokenPayload> for TokenRecord {
	type Error = TokenPayloadError;

	fn try_from(payload: TokenPayload) -> Result<Self, Self::Error> {
		if payload.expires_at_ms <= 0 {
			return Err(TokenPayloadError::NonPositiveExpiry);
		}

		let expires_at =
			OffsetDateTime::from_unix_timestamp_nanos(payload.expires_at_ms as i128 * 1_000_000)
				.map_err(|_| TokenPayloadError::ExpiryOutOfRange)?;

		Ok(Self {
			access_token: TokenSecret::new(payload.access_token),
			expires_at,
			client_id: payload.client_id,
			is_anonymous: payload.is_anonymous,
			fetched_at: OffsetDateTime::now_utc(),
		})
	}
}
impl From<&TokenRecord> for TokenPayload {
	fn from(record: &TokenRecord) -> Self {
		Self {
			access_token: record.access_token.expose().to_owned(),
			expires_at_ms: record.expires_at_ms(),
			client_id: record.client_id.clone(),
			is_anonymous: record.is_anonymous,
		}
	}
}
