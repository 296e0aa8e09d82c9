//! Thin HTTP surface over the broker facade.
//!
//! The router is a delivery mechanism only: it maps one query flag and the request's
//! cookies onto [`Broker::token`] and translates the outcome into a fixed response
//! envelope. Every response (success, cache-unavailable, unknown route, bad query, or a
//! caught panic) carries the `success` discriminant and an epoch-millisecond timestamp, so
//! callers never see a transport-level fault.

// std
use std::any::Any;
// crates.io
use axum::{
	Json, Router,
	extract::{Query, State, rejection::QueryRejection},
	http::{HeaderMap, StatusCode, header},
	response::{IntoResponse, Response},
	routing::get,
};
use tower_http::catch_panic::CatchPanicLayer;
// self
use crate::{
	_prelude::*,
	auth::{CookieSet, TokenPayload},
	browser::BrowserEngine,
	flows::{Broker, TokenRequest},
};

/// Builds the broker's HTTP router: `GET /api/token` and `GET /health`.
pub fn router<E>(broker: Broker<E>) -> Router
where
	E: ?Sized + BrowserEngine,
{
	Router::new()
		.route("/api/token", get(token::<E>))
		.route("/health", get(health))
		.fallback(not_found)
		.layer(CatchPanicLayer::custom(panic_response))
		.with_state(broker)
}

/// Case-insensitive truthy parsing for the `force` query flag.
fn is_truthy(value: &str) -> bool {
	matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn epoch_ms() -> i64 {
	(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
	force: Option<String>,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
	success: bool,
	#[serde(flatten)]
	token: TokenPayload,
	cached: bool,
	timestamp: i64,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
	success: bool,
	error: String,
	timestamp: i64,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
	let envelope =
		ErrorEnvelope { success: false, error: message.into(), timestamp: epoch_ms() };

	(status, Json(envelope)).into_response()
}

async fn token<E>(
	State(broker): State<Broker<E>>,
	query: Result<Query<TokenQuery>, QueryRejection>,
	headers: HeaderMap,
) -> Response
where
	E: ?Sized + BrowserEngine,
{
	let Ok(Query(query)) = query else {
		return error_response(StatusCode::BAD_REQUEST, "invalid query string");
	};
	let force = query.force.as_deref().is_some_and(is_truthy);
	let cookies = headers
		.get(header::COOKIE)
		.and_then(|value| value.to_str().ok())
		.map(CookieSet::from_cookie_header)
		.unwrap_or_default();
	let request = TokenRequest::new().with_cookies(cookies).with_force(force);

	match broker.token(request).await {
		Some(grant) => {
			let body = TokenResponse {
				success: true,
				token: TokenPayload::from(grant.record.as_ref()),
				cached: grant.cached,
				timestamp: epoch_ms(),
			};

			(StatusCode::OK, Json(body)).into_response()
		},
		None => error_response(
			StatusCode::SERVICE_UNAVAILABLE,
			"token cache could not produce a usable token",
		),
	}
}

/// Liveness only; deliberately does not consult the cache.
async fn health() -> Response {
	(StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
}

async fn not_found() -> Response {
	error_response(StatusCode::NOT_FOUND, "route not found")
}

fn panic_response(_: Box<dyn Any + Send>) -> Response {
	error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn force_flag_parsing_is_case_insensitive_and_strict() {
		for truthy in ["1", "true", "TRUE", "Yes", " on "] {
			assert!(is_truthy(truthy), "`{truthy}` should parse as truthy");
		}
		for falsy in ["0", "false", "off", "2", "force", ""] {
			assert!(!is_truthy(falsy), "`{falsy}` should parse as falsy");
		}
	}
}
