//! Chrome-DevTools-Protocol implementation of the browser seam.
//!
//! [`CdpEngine`] either spawns a browser process with a fixed unattended argument set and
//! reads the DevTools WebSocket endpoint off its stderr, or attaches to an already-running
//! browser through its DevTools HTTP endpoint. One WebSocket connection multiplexes command
//! responses (routed by id) and domain events (fanned out to per-page subscriptions), the
//! same pending-request/reader-task shape used for other protocol-over-WebSocket clients.

// std
use std::{
	env,
	path::PathBuf,
	process::Stdio,
	sync::atomic::{AtomicU64, Ordering},
	time::Duration as StdDuration,
};
// crates.io
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::{
	io::{AsyncBufReadExt, BufReader},
	process::{Child, Command},
	sync::{mpsc, oneshot},
	task::JoinHandle,
	time::timeout,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
// self
use crate::{
	_prelude::*,
	auth::CookieSet,
	browser::{
		BrowserEngine, BrowserPage, BrowserSession, CapturedExchange, EngineError, EngineFuture,
		ExchangeCapture, TeardownFuture,
	},
	provider::{FilterDecision, ResourceFilter, ResourceKind},
};

const LAUNCH_TIMEOUT: StdDuration = StdDuration::from_secs(20);
const COMMAND_TIMEOUT: StdDuration = StdDuration::from_secs(10);
const DEVTOOLS_BANNER: &str = "DevTools listening on ";
// Tuned for unattended headless runs inside containers; the filter table handles the rest of
// the load shedding.
const FIXED_ARGS: &[&str] = &[
	"--disable-background-networking",
	"--disable-default-apps",
	"--disable-dev-shm-usage",
	"--disable-extensions",
	"--disable-gpu",
	"--disable-sync",
	"--mute-audio",
	"--no-default-browser-check",
	"--no-first-run",
	"--no-sandbox",
];

static LAUNCH_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Launch/attach configuration for [`CdpEngine`].
#[derive(Clone, Debug)]
pub struct CdpConfig {
	/// Browser executable spawned when not attaching.
	pub executable: PathBuf,
	/// Whether to pass the headless switch to the spawned browser.
	pub headless: bool,
	/// DevTools HTTP endpoint of an already-running browser to attach to instead of
	/// spawning one.
	pub attach_endpoint: Option<Url>,
	/// Per-navigation budget applied by [`BrowserPage::navigate`].
	pub navigation_timeout: StdDuration,
	/// Extra command-line switches appended after the fixed set.
	pub extra_args: Vec<String>,
}
impl CdpConfig {
	/// Builds a configuration from the process environment.
	///
	/// Honors `WEBTOKEN_BROWSER_PATH` (alternate executable), `WEBTOKEN_HEADLESS`
	/// (truthy/falsy switch, default on), and `WEBTOKEN_BROWSER_WS` (DevTools HTTP endpoint
	/// to attach to).
	pub fn from_env() -> Self {
		let mut config = Self::default();

		if let Ok(path) = env::var("WEBTOKEN_BROWSER_PATH") {
			config.executable = path.into();
		}
		if let Ok(switch) = env::var("WEBTOKEN_HEADLESS") {
			config.headless = parse_switch(&switch).unwrap_or(true);
		}
		if let Ok(endpoint) = env::var("WEBTOKEN_BROWSER_WS") {
			config.attach_endpoint = Url::parse(&endpoint).ok();
		}

		config
	}
}
impl Default for CdpConfig {
	fn default() -> Self {
		Self {
			executable: "chromium".into(),
			headless: true,
			attach_endpoint: None,
			navigation_timeout: StdDuration::from_secs(30),
			extra_args: Vec::new(),
		}
	}
}

/// [`BrowserEngine`] backed by the Chrome DevTools Protocol.
#[derive(Clone, Debug, Default)]
pub struct CdpEngine {
	config: CdpConfig,
}
impl CdpEngine {
	/// Creates an engine with the provided configuration.
	pub fn new(config: CdpConfig) -> Self {
		Self { config }
	}

	/// Creates an engine configured from the process environment.
	pub fn from_env() -> Self {
		Self::new(CdpConfig::from_env())
	}
}
impl BrowserEngine for CdpEngine {
	fn launch(&self) -> EngineFuture<'_, Box<dyn BrowserSession>> {
		Box::pin(async move {
			let (ws_url, child, profile_dir) = match &self.config.attach_endpoint {
				Some(endpoint) => (discover_websocket_url(endpoint).await?, None, None),
				None => {
					let (ws_url, child, profile_dir) = spawn_browser(&self.config).await?;

					(ws_url, Some(child), Some(profile_dir))
				},
			};
			let connection = CdpConnection::connect(&ws_url).await?;
			let created = connection
				.command("Target.createTarget", None, json!({ "url": "about:blank" }))
				.await?;
			let target_id = str_field(&created, "targetId", "Target.createTarget")?;
			let attached = connection
				.command(
					"Target.attachToTarget",
					None,
					json!({ "targetId": target_id, "flatten": true }),
				)
				.await?;
			let session_id = str_field(&attached, "sessionId", "Target.attachToTarget")?;
			let session = CdpSession {
				connection,
				session_id,
				target_id,
				child: Mutex::new(child),
				profile_dir,
				navigation_timeout: self.config.navigation_timeout,
			};

			Ok(Box::new(session) as Box<dyn BrowserSession>)
		})
	}
}

/// Resolves the DevTools WebSocket debugger URL advertised by a running browser's HTTP
/// endpoint (`/json/version`).
pub async fn discover_websocket_url(endpoint: &Url) -> Result<Url, EngineError> {
	let version_url = endpoint
		.join("json/version")
		.map_err(|error| EngineError::Connect { message: error.to_string() })?;
	let payload: Value = reqwest::get(version_url)
		.await
		.map_err(|error| EngineError::Connect { message: error.to_string() })?
		.json()
		.await
		.map_err(|error| EngineError::Connect { message: error.to_string() })?;
	let ws_url = payload
		.get("webSocketDebuggerUrl")
		.and_then(Value::as_str)
		.ok_or_else(|| EngineError::Connect {
			message: "version payload lacks webSocketDebuggerUrl".into(),
		})?;

	Url::parse(ws_url).map_err(|error| EngineError::Connect { message: error.to_string() })
}

async fn spawn_browser(config: &CdpConfig) -> Result<(Url, Child, PathBuf), EngineError> {
	let profile_dir = env::temp_dir().join(format!(
		"webtoken-broker-{}-{}",
		std::process::id(),
		LAUNCH_SEQUENCE.fetch_add(1, Ordering::Relaxed),
	));
	let mut command = Command::new(&config.executable);

	command
		.args(FIXED_ARGS)
		.arg("--remote-debugging-port=0")
		.arg(format!("--user-data-dir={}", profile_dir.display()));

	if config.headless {
		command.arg("--headless=new");
	}

	command
		.args(&config.extra_args)
		.arg("about:blank")
		.stdin(Stdio::null())
		.stdout(Stdio::null())
		.stderr(Stdio::piped())
		.kill_on_drop(true);

	let mut child =
		command.spawn().map_err(|error| EngineError::Launch { message: error.to_string() })?;
	let stderr = child
		.stderr
		.take()
		.ok_or_else(|| EngineError::Launch { message: "stderr unavailable".into() })?;
	let banner = timeout(LAUNCH_TIMEOUT, async {
		let mut lines = BufReader::new(stderr).lines();

		while let Ok(Some(line)) = lines.next_line().await {
			if let Some(ws_url) = parse_devtools_endpoint(&line) {
				return Some(ws_url);
			}
		}

		None
	})
	.await;
	let ws_url = match banner {
		Ok(Some(ws_url)) => ws_url,
		Ok(None) => {
			return Err(EngineError::Launch {
				message: "browser exited before advertising a DevTools endpoint".into(),
			});
		},
		Err(_) => {
			return Err(EngineError::Launch {
				message: "timed out waiting for the DevTools endpoint banner".into(),
			});
		},
	};

	Ok((ws_url, child, profile_dir))
}

/// Extracts the WebSocket debugger URL from the browser's stderr banner line.
fn parse_devtools_endpoint(line: &str) -> Option<Url> {
	let raw = line.trim().strip_prefix(DEVTOOLS_BANNER)?;

	Url::parse(raw.trim()).ok()
}

fn parse_switch(value: &str) -> Option<bool> {
	match value.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}

fn str_field(value: &Value, field: &str, command: &'static str) -> Result<String, EngineError> {
	value.get(field).and_then(Value::as_str).map(str::to_owned).ok_or_else(|| {
		EngineError::Command { command, message: format!("response lacks `{field}`") }
	})
}

fn warn_teardown(stage: &'static str, error: impl Display) {
	#[cfg(feature = "tracing")]
	tracing::warn!(stage, error = %error, "browser teardown step failed");
	#[cfg(not(feature = "tracing"))]
	let _ = (stage, &error);
}

struct Subscription {
	method: String,
	session_id: Option<String>,
	sender: mpsc::UnboundedSender<Value>,
}

/// One WebSocket connection to a browser, multiplexing commands and events.
struct CdpConnection {
	next_id: AtomicU64,
	pending: Mutex<HashMap<u64, oneshot::Sender<Result<Value, String>>>>,
	subscriptions: Mutex<Vec<Subscription>>,
	outgoing: mpsc::UnboundedSender<Message>,
	tasks: Mutex<Vec<JoinHandle<()>>>,
}
impl CdpConnection {
	async fn connect(ws_url: &Url) -> Result<Arc<Self>, EngineError> {
		let (stream, _) = connect_async(ws_url.as_str())
			.await
			.map_err(|error| EngineError::Connect { message: error.to_string() })?;
		let (mut sink, mut stream) = stream.split();
		let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
		let connection = Arc::new(Self {
			next_id: AtomicU64::new(0),
			pending: Mutex::new(HashMap::new()),
			subscriptions: Mutex::new(Vec::new()),
			outgoing,
			tasks: Mutex::new(Vec::new()),
		});
		let writer = tokio::spawn(async move {
			while let Some(message) = outgoing_rx.recv().await {
				if sink.send(message).await.is_err() {
					break;
				}
			}
		});
		let reader_handle = Arc::downgrade(&connection);
		let reader = tokio::spawn(async move {
			while let Some(Ok(message)) = stream.next().await {
				let Message::Text(text) = message else { continue };
				let Some(connection) = reader_handle.upgrade() else { break };

				connection.dispatch(&text);
			}
		});

		connection.tasks.lock().extend([writer, reader]);

		Ok(connection)
	}

	fn dispatch(&self, text: &str) {
		let Ok(value) = serde_json::from_str::<Value>(text) else { return };

		if let Some(id) = value.get("id").and_then(Value::as_u64) {
			if let Some(sender) = self.pending.lock().remove(&id) {
				let outcome = match value.get("error") {
					Some(error) => Err(error
						.get("message")
						.and_then(Value::as_str)
						.unwrap_or("unknown protocol error")
						.to_owned()),
					None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
				};
				let _ = sender.send(outcome);
			}

			return;
		}

		let Some(method) = value.get("method").and_then(Value::as_str) else { return };
		let session_id = value.get("sessionId").and_then(Value::as_str);
		let params = value.get("params").cloned().unwrap_or(Value::Null);

		self.subscriptions.lock().retain(|subscription| {
			if subscription.method != method {
				return true;
			}
			if let Some(expected) = &subscription.session_id {
				if session_id != Some(expected.as_str()) {
					return true;
				}
			}

			subscription.sender.send(params.clone()).is_ok()
		});
	}

	async fn command(
		&self,
		method: &'static str,
		session_id: Option<&str>,
		params: Value,
	) -> Result<Value, EngineError> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
		let (sender, receiver) = oneshot::channel();

		self.pending.lock().insert(id, sender);

		let mut message = json!({ "id": id, "method": method, "params": params });

		if let Some(session_id) = session_id {
			message["sessionId"] = json!(session_id);
		}
		if self.outgoing.send(Message::Text(message.to_string())).is_err() {
			self.pending.lock().remove(&id);

			return Err(EngineError::Command { command: method, message: "connection closed".into() });
		}

		match timeout(COMMAND_TIMEOUT, receiver).await {
			Err(_) => {
				self.pending.lock().remove(&id);

				Err(EngineError::Command { command: method, message: "timed out".into() })
			},
			Ok(Err(_)) =>
				Err(EngineError::Command { command: method, message: "connection closed".into() }),
			Ok(Ok(Err(message))) => Err(EngineError::Command { command: method, message }),
			Ok(Ok(Ok(result))) => Ok(result),
		}
	}

	fn subscribe(
		&self,
		method: impl Into<String>,
		session_id: Option<String>,
	) -> mpsc::UnboundedReceiver<Value> {
		let (sender, receiver) = mpsc::unbounded_channel();

		self.subscriptions.lock().push(Subscription { method: method.into(), session_id, sender });

		receiver
	}

	fn shutdown(&self) {
		for task in self.tasks.lock().drain(..) {
			task.abort();
		}

		self.pending.lock().clear();
		self.subscriptions.lock().clear();
	}
}

struct CdpSession {
	connection: Arc<CdpConnection>,
	session_id: String,
	target_id: String,
	child: Mutex<Option<Child>>,
	profile_dir: Option<PathBuf>,
	navigation_timeout: StdDuration,
}
impl BrowserSession for CdpSession {
	fn page(&self) -> EngineFuture<'_, Box<dyn BrowserPage>> {
		Box::pin(async move {
			self.connection.command("Page.enable", Some(&self.session_id), json!({})).await?;
			self.connection.command("Network.enable", Some(&self.session_id), json!({})).await?;

			let page = CdpPage {
				connection: self.connection.clone(),
				session_id: self.session_id.clone(),
				navigation_timeout: self.navigation_timeout,
				tasks: Mutex::new(Vec::new()),
			};

			Ok(Box::new(page) as Box<dyn BrowserPage>)
		})
	}

	fn close(&self) -> TeardownFuture<'_> {
		Box::pin(async move {
			if let Err(error) = self
				.connection
				.command("Target.closeTarget", None, json!({ "targetId": self.target_id }))
				.await
			{
				warn_teardown("Target.closeTarget", error);
			}

			let child = self.child.lock().take();

			if let Some(mut child) = child {
				if let Err(error) = self.connection.command("Browser.close", None, json!({})).await
				{
					warn_teardown("Browser.close", error);
				}
				if let Err(error) = child.start_kill() {
					warn_teardown("kill", error);
				}

				let _ = child.wait().await;

				if let Some(profile_dir) = &self.profile_dir {
					if let Err(error) = std::fs::remove_dir_all(profile_dir) {
						warn_teardown("profile cleanup", error);
					}
				}
			}

			self.connection.shutdown();
		})
	}
}

struct CdpPage {
	connection: Arc<CdpConnection>,
	session_id: String,
	navigation_timeout: StdDuration,
	tasks: Mutex<Vec<JoinHandle<()>>>,
}
impl Drop for CdpPage {
	fn drop(&mut self) {
		for task in self.tasks.lock().drain(..) {
			task.abort();
		}
	}
}
impl BrowserPage for CdpPage {
	fn install_filter<'a>(&'a self, filter: &'a ResourceFilter) -> EngineFuture<'a, ()> {
		Box::pin(async move {
			let mut paused =
				self.connection.subscribe("Fetch.requestPaused", Some(self.session_id.clone()));

			self.connection
				.command(
					"Fetch.enable",
					Some(&self.session_id),
					json!({ "patterns": [{ "urlPattern": "*", "requestStage": "Request" }] }),
				)
				.await?;

			let connection = self.connection.clone();
			let session_id = self.session_id.clone();
			let filter = filter.clone();
			let task = tokio::spawn(async move {
				while let Some(event) = paused.recv().await {
					let Some(request_id) =
						event.get("requestId").and_then(Value::as_str).map(str::to_owned)
					else {
						continue;
					};
					let url = event
						.pointer("/request/url")
						.and_then(Value::as_str)
						.unwrap_or_default()
						.to_owned();
					let kind = ResourceKind::from_protocol(
						event.get("resourceType").and_then(Value::as_str).unwrap_or("Other"),
					);
					let (method, params) = match filter.decide(kind, &url) {
						FilterDecision::Allow =>
							("Fetch.continueRequest", json!({ "requestId": request_id })),
						FilterDecision::Abort => (
							"Fetch.failRequest",
							json!({ "requestId": request_id, "errorReason": "Aborted" }),
						),
					};

					if connection.command(method, Some(&session_id), params).await.is_err() {
						break;
					}
				}
			});

			self.tasks.lock().push(task);

			Ok(())
		})
	}

	fn capture<'a>(&'a self, url_fragment: &'a str) -> EngineFuture<'a, ExchangeCapture> {
		Box::pin(async move {
			let mut responses = self
				.connection
				.subscribe("Network.responseReceived", Some(self.session_id.clone()));
			let mut finished =
				self.connection.subscribe("Network.loadingFinished", Some(self.session_id.clone()));
			let (sender, capture) = ExchangeCapture::channel();
			let connection = self.connection.clone();
			let session_id = self.session_id.clone();
			let fragment = url_fragment.to_owned();
			let task = tokio::spawn(async move {
				// Bodies are only retrievable once loading finishes, so matches wait here
				// keyed by request id.
				let mut matched: HashMap<String, (String, u16)> = HashMap::new();

				loop {
					tokio::select! {
						event = responses.recv() => {
							let Some(event) = event else { break };
							let url = event
								.pointer("/response/url")
								.and_then(Value::as_str)
								.unwrap_or_default()
								.to_owned();

							if !url.contains(&fragment) {
								continue;
							}

							let status = event
								.pointer("/response/status")
								.and_then(Value::as_u64)
								.unwrap_or_default() as u16;

							if let Some(request_id) = event.get("requestId").and_then(Value::as_str) {
								matched.insert(request_id.to_owned(), (url, status));
							}
						},
						event = finished.recv() => {
							let Some(event) = event else { break };
							let Some(request_id) =
								event.get("requestId").and_then(Value::as_str)
							else {
								continue;
							};
							let Some((url, status)) = matched.remove(request_id) else { continue };
							let Ok(body) = fetch_body(&connection, &session_id, request_id).await
							else {
								continue;
							};

							if sender.send(CapturedExchange { url, status, body }).await.is_err() {
								break;
							}
						},
					}
				}
			});

			self.tasks.lock().push(task);

			Ok(capture)
		})
	}

	fn set_cookies<'a>(&'a self, cookies: &'a CookieSet, domain: &'a str) -> EngineFuture<'a, ()> {
		Box::pin(async move {
			for cookie in cookies.iter() {
				let result = self
					.connection
					.command(
						"Network.setCookie",
						Some(&self.session_id),
						json!({
							"name": cookie.name(),
							"value": cookie.value(),
							"domain": domain,
							"path": "/",
							"secure": true,
							"httpOnly": false,
							"sameSite": "Lax",
						}),
					)
					.await?;

				if result.get("success").and_then(Value::as_bool) == Some(false) {
					return Err(EngineError::Command {
						command: "Network.setCookie",
						message: format!("cookie `{}` was rejected", cookie.name()),
					});
				}
			}

			#[cfg(feature = "tracing")]
			tracing::debug!(count = cookies.len(), "installed authentication cookies");

			Ok(())
		})
	}

	fn navigate<'a>(&'a self, url: &'a Url) -> EngineFuture<'a, ()> {
		Box::pin(async move {
			let result = timeout(
				self.navigation_timeout,
				self.connection.command(
					"Page.navigate",
					Some(&self.session_id),
					json!({ "url": url.as_str() }),
				),
			)
			.await
			.map_err(|_| EngineError::Navigation { message: "navigation timed out".into() })?
			.map_err(|error| EngineError::Navigation { message: error.to_string() })?;

			match result.get("errorText").and_then(Value::as_str) {
				Some(error_text) if !error_text.is_empty() =>
					Err(EngineError::Navigation { message: error_text.to_owned() }),
				_ => Ok(()),
			}
		})
	}
}

async fn fetch_body(
	connection: &CdpConnection,
	session_id: &str,
	request_id: &str,
) -> Result<Vec<u8>, EngineError> {
	let result = connection
		.command(
			"Network.getResponseBody",
			Some(session_id),
			json!({ "requestId": request_id }),
		)
		.await?;
	let body = result.get("body").and_then(Value::as_str).unwrap_or_default();

	if result.get("base64Encoded").and_then(Value::as_bool).unwrap_or(false) {
		base64::engine::general_purpose::STANDARD.decode(body).map_err(|error| {
			EngineError::Command { command: "Network.getResponseBody", message: error.to_string() }
		})
	} else {
		Ok(body.as_bytes().to_vec())
	}
}
