#![cfg(feature = "api")]

// crates.io
use axum::{
	body::Body,
	http::{Request, StatusCode},
};
use tower::ServiceExt;
// self
use webtoken_broker::{_preludet::*, api, flows::RetryPolicy};

async fn body_json(response: axum::response::Response) -> serde_json::Value {
	let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
		.await
		.expect("Response body should be readable.");

	serde_json::from_slice(&bytes).expect("Response body should be JSON.")
}

fn get(uri: &str) -> Request<Body> {
	Request::builder().uri(uri).body(Body::empty()).expect("Request fixture should build.")
}

#[tokio::test]
async fn token_route_serves_and_marks_cache_hits() {
	let (broker, engine) = build_scripted_broker([ScriptedCall::Respond {
		status: 200,
		body: payload_body("abc", 600_000, true),
	}]);
	let app = api::router(broker);
	let response =
		app.clone().oneshot(get("/api/token")).await.expect("Router should respond.");

	assert_eq!(response.status(), StatusCode::OK);

	let payload = body_json(response).await;

	assert_eq!(payload["success"], serde_json::json!(true));
	assert_eq!(payload["accessToken"], serde_json::json!("abc"));
	assert_eq!(payload["isAnonymous"], serde_json::json!(true));
	assert_eq!(payload["cached"], serde_json::json!(false));
	assert!(payload["timestamp"].is_i64());

	let response = app.oneshot(get("/api/token")).await.expect("Router should respond.");
	let payload = body_json(response).await;

	assert_eq!(payload["cached"], serde_json::json!(true));
	assert_eq!(engine.launches(), 1);
}

#[tokio::test]
async fn force_flag_and_cookies_reach_the_broker() {
	let (broker, engine) = build_scripted_broker([
		ScriptedCall::Respond { status: 200, body: payload_body("anon", 600_000, true) },
		ScriptedCall::Respond { status: 200, body: payload_body("fresh", 600_000, true) },
		ScriptedCall::Respond { status: 200, body: payload_body("authed", 600_000, false) },
	]);
	let app = api::router(broker);

	app.clone().oneshot(get("/api/token")).await.expect("Priming request should respond.");

	let response = app
		.clone()
		.oneshot(get("/api/token?force=YES"))
		.await
		.expect("Forced request should respond.");
	let payload = body_json(response).await;

	assert_eq!(payload["accessToken"], serde_json::json!("fresh"));
	assert_eq!(payload["cached"], serde_json::json!(false));
	assert_eq!(engine.launches(), 2);

	let request = Request::builder()
		.uri("/api/token")
		.header("cookie", "sp_dc=opaque-session; theme=dark")
		.body(Body::empty())
		.expect("Cookie request fixture should build.");
	let response = app.oneshot(request).await.expect("Cookie request should respond.");
	let payload = body_json(response).await;

	assert_eq!(payload["isAnonymous"], serde_json::json!(false));
	assert_eq!(engine.launches(), 3);
	assert_eq!(engine.cookie_batches(), vec![2]);
}

#[tokio::test(start_paused = true)]
async fn unavailable_cache_maps_to_503_with_the_error_envelope() {
	let engine = ScriptedEngine::always(ScriptedCall::NavigationFailure);
	let broker: webtoken_broker::flows::Broker<ScriptedEngine> =
		webtoken_broker::flows::Broker::new(engine, test_site_descriptor())
		.with_retry(RetryPolicy { max_attempts: 1, ..RetryPolicy::default() });
	let response = api::router(broker)
		.oneshot(get("/api/token"))
		.await
		.expect("Router should respond.");

	assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

	let payload = body_json(response).await;

	assert_eq!(payload["success"], serde_json::json!(false));
	assert!(payload["error"].is_string());
	assert!(payload["timestamp"].is_i64());
}

#[tokio::test]
async fn unknown_routes_and_bad_queries_use_the_same_envelope() {
	let (broker, _engine) = build_scripted_broker([]);
	let app = api::router(broker);
	let response =
		app.clone().oneshot(get("/nope")).await.expect("Fallback should respond.");

	assert_eq!(response.status(), StatusCode::NOT_FOUND);
	assert_eq!(body_json(response).await["success"], serde_json::json!(false));

	let response = app
		.oneshot(get("/api/token?force=1&force=2"))
		.await
		.expect("Bad query should respond.");

	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	assert_eq!(body_json(response).await["success"], serde_json::json!(false));
}

#[tokio::test]
async fn health_is_liveness_only() {
	let (broker, engine) = build_scripted_broker([]);
	let response = api::router(broker)
		.oneshot(get("/health"))
		.await
		.expect("Health route should respond.");

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(body_json(response).await["status"], serde_json::json!("ok"));
	assert_eq!(engine.launches(), 0, "Liveness must not consult the cache or the browser.");
}
