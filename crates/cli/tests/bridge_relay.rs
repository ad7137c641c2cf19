//! Bridge integration tests.
//!
//! Each test starts a real bridge on an ephemeral loopback port and plays the
//! extension over an in-memory duplex pipe speaking native-messaging frames.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{Value, json};
use tabctl_cli::bridge::native::{read_frame, write_frame};
use tabctl_cli::bridge::{Relay, bind, run_channel, serve};
use tabctl_cli::transport::{Client, HttpTransport, ProbePolicy, TransportError};
use tabctl_protocol::{
	BridgeMessage, CommandEnvelope, ExecuteScript, ExtensionMessage, FrameLogLevel, HealthState, HealthStatus,
	ListTabs, Registration, ResponseEnvelope, TabInfo,
};
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

const EXTENSION_ID: &str = "kjhgfdsaqwertyuiop";

struct Extension {
	reader: ReadHalf<DuplexStream>,
	writer: WriteHalf<DuplexStream>,
}

impl Extension {
	async fn send(&mut self, message: ExtensionMessage) {
		write_frame(&mut self.writer, &message).await.unwrap();
	}

	async fn recv(&mut self) -> BridgeMessage {
		tokio::time::timeout(Duration::from_secs(5), read_frame(&mut self.reader))
			.await
			.expect("bridge sent nothing")
			.unwrap()
			.expect("bridge closed the channel")
	}

	async fn register_as(&mut self, extension_id: &str) -> BridgeMessage {
		self.send(ExtensionMessage::Register(Registration {
			extension_id: extension_id.into(),
			version: "1.4.0".into(),
		}))
		.await;
		self.recv().await
	}

	async fn register(&mut self) {
		match self.register_as(EXTENSION_ID).await {
			BridgeMessage::Registered { .. } => {}
			other => panic!("expected registered, got {other:?}"),
		}
	}

	async fn next_command(&mut self) -> CommandEnvelope {
		match self.recv().await {
			BridgeMessage::Command(envelope) => envelope,
			other => panic!("expected command, got {other:?}"),
		}
	}

	async fn respond(&mut self, response: ResponseEnvelope) {
		self.send(ExtensionMessage::Response(response)).await;
	}
}

struct Bridge {
	port: u16,
	relay: Arc<Relay>,
	http: reqwest::Client,
	channel: JoinHandle<()>,
}

impl Bridge {
	async fn start() -> (Bridge, Extension) {
		let (listener, port) = bind(&[0]).await.unwrap();
		let relay = Arc::new(Relay::new(port));
		tokio::spawn(serve(listener, Arc::clone(&relay)));

		let (bridge_side, extension_side) = tokio::io::duplex(256 * 1024);
		let (bridge_reader, bridge_writer) = tokio::io::split(bridge_side);
		let channel = tokio::spawn(run_channel(Arc::clone(&relay), bridge_reader, bridge_writer));

		let (reader, writer) = tokio::io::split(extension_side);
		let bridge = Bridge {
			port,
			relay,
			http: reqwest::Client::builder().no_proxy().build().unwrap(),
			channel,
		};
		(bridge, Extension { reader, writer })
	}

	async fn health(&self) -> (StatusCode, HealthStatus) {
		let response = self
			.http
			.get(format!("http://127.0.0.1:{}/health", self.port))
			.send()
			.await
			.unwrap();
		let status = response.status();
		(status, response.json().await.unwrap())
	}

	fn post(&self, envelope: &CommandEnvelope) -> JoinHandle<(StatusCode, ResponseEnvelope)> {
		let request = self
			.http
			.post(format!("http://127.0.0.1:{}/command", self.port))
			.json(envelope);
		tokio::spawn(async move {
			let response = request.send().await.unwrap();
			let status = response.status();
			(status, response.json().await.unwrap())
		})
	}
}

fn script(caller_id: &str, code: &str) -> CommandEnvelope {
	CommandEnvelope::new(
		caller_id,
		&ExecuteScript {
			tab_id: 11,
			code: code.into(),
			await_promise: true,
		},
	)
	.unwrap()
}

async fn finish<T>(handle: JoinHandle<T>) -> T {
	tokio::time::timeout(Duration::from_secs(5), handle)
		.await
		.expect("request did not finish")
		.unwrap()
}

#[tokio::test]
async fn health_reports_registration() {
	let (bridge, mut ext) = Bridge::start().await;

	let (status, health) = bridge.health().await;
	assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
	assert_eq!(health.status, HealthState::Waiting);
	assert_eq!(health.port, bridge.port);

	match ext.register_as(EXTENSION_ID).await {
		BridgeMessage::Registered { port, version } => {
			assert_eq!(port, bridge.port);
			assert!(!version.is_empty());
		}
		other => panic!("expected registered, got {other:?}"),
	}

	let (status, health) = bridge.health().await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(health.extension_id.as_deref(), Some(EXTENSION_ID));
	assert_eq!(health.version.as_deref(), Some("1.4.0"));
}

#[tokio::test]
async fn command_round_trip_restores_caller_id() {
	let (bridge, mut ext) = Bridge::start().await;
	ext.register().await;

	let call = bridge.post(&script("caller-1", "document.title"));
	let relayed = ext.next_command().await;
	assert_ne!(relayed.id, "caller-1");
	assert_eq!(relayed.command, "execute_script");
	assert_eq!(relayed.data["code"], "document.title");

	ext.respond(ResponseEnvelope::ok(relayed.id, json!({ "value": "Example" }))).await;

	let (status, response) = finish(call).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(response.id, "caller-1");
	assert!(response.success);
	assert_eq!(response.result, Some(json!({ "value": "Example" })));
	assert_eq!(bridge.relay.pending_len(), 0);
}

#[tokio::test]
async fn concurrent_commands_are_correlated_out_of_order() {
	let (bridge, mut ext) = Bridge::start().await;
	ext.register().await;

	// Both callers pick the same id; the bridge's wire ids keep them apart.
	let first = bridge.post(&script("same", "'a'"));
	let second = bridge.post(&script("same", "'b'"));

	let one = ext.next_command().await;
	let two = ext.next_command().await;
	assert_ne!(one.id, two.id);

	for envelope in [two, one] {
		let code = envelope.data["code"].clone();
		ext.respond(ResponseEnvelope::ok(envelope.id, json!({ "echo": code }))).await;
	}

	let (_, a) = finish(first).await;
	let (_, b) = finish(second).await;
	assert_eq!(a.result.unwrap()["echo"], "'a'");
	assert_eq!(b.result.unwrap()["echo"], "'b'");
}

#[tokio::test]
async fn domain_failure_is_relayed_as_200() {
	let (bridge, mut ext) = Bridge::start().await;
	ext.register().await;

	let call = bridge.post(&script("c", "boom()"));
	let relayed = ext.next_command().await;
	ext.respond(ResponseEnvelope::failure(relayed.id, "script threw: boom is not defined"))
		.await;

	let (status, response) = finish(call).await;
	assert_eq!(status, StatusCode::OK);
	assert!(!response.success);
	assert_eq!(response.error.as_deref(), Some("script threw: boom is not defined"));
}

#[tokio::test]
async fn timeout_answers_504_and_drops_late_response() {
	let (bridge, mut ext) = Bridge::start().await;
	ext.register().await;

	let call = bridge.post(&script("slow", "new Promise(() => {})").with_timeout(Duration::from_millis(200)));
	let relayed = ext.next_command().await;

	let (status, response) = finish(call).await;
	assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
	assert_eq!(response.id, "slow");
	assert!(!response.success);
	assert_eq!(bridge.relay.pending_len(), 0);

	// A late answer must not disturb the next command.
	ext.respond(ResponseEnvelope::ok(relayed.id, json!("late"))).await;

	let call = bridge.post(&script("next", "1"));
	let relayed = ext.next_command().await;
	ext.respond(ResponseEnvelope::ok(relayed.id, json!(1))).await;
	let (status, response) = finish(call).await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(response.id, "next");
	assert_eq!(response.result, Some(json!(1)));
}

#[tokio::test]
async fn disconnect_fails_pending_commands_promptly() {
	let (mut bridge, mut ext) = Bridge::start().await;
	ext.register().await;

	let call = bridge.post(&script("orphan", "1").with_timeout(Duration::from_secs(60)));
	ext.next_command().await;
	drop(ext);

	let (status, response) = finish(call).await;
	assert_eq!(status, StatusCode::BAD_GATEWAY);
	assert_eq!(response.id, "orphan");
	assert_eq!(bridge.relay.pending_len(), 0);

	tokio::time::timeout(Duration::from_secs(5), &mut bridge.channel)
		.await
		.expect("channel pump still running")
		.unwrap();
	let (status, health) = bridge.health().await;
	assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
	assert_eq!(health.status, HealthState::Waiting);
}

#[tokio::test]
async fn unregistered_channel_answers_503() {
	let (bridge, _ext) = Bridge::start().await;

	let (status, response) = finish(bridge.post(&script("early", "1"))).await;
	assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
	assert!(!response.success);
	assert_eq!(bridge.relay.pending_len(), 0);
}

#[tokio::test]
async fn malformed_envelope_answers_400() {
	let (bridge, _ext) = Bridge::start().await;

	let response = bridge
		.http
		.post(format!("http://127.0.0.1:{}/command", bridge.port))
		.header("content-type", "application/json")
		.body("{\"command\": 12")
		.send()
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	let body: Value = response.json().await.unwrap();
	assert_eq!(body["success"], false);
}

#[tokio::test]
async fn duplicate_registration_keeps_first() {
	let (bridge, mut ext) = Bridge::start().await;
	ext.register().await;

	match ext.register_as("impostor").await {
		BridgeMessage::Error { message } => assert!(message.contains(EXTENSION_ID)),
		other => panic!("expected error, got {other:?}"),
	}

	let (status, health) = bridge.health().await;
	assert_eq!(status, StatusCode::OK);
	assert_eq!(health.extension_id.as_deref(), Some(EXTENSION_ID));
}

#[tokio::test]
async fn keep_alive_and_log_frames_are_absorbed() {
	let (bridge, mut ext) = Bridge::start().await;
	ext.register().await;
	ext.send(ExtensionMessage::KeepAlive).await;
	ext.send(ExtensionMessage::Log {
		level: FrameLogLevel::Warn,
		message: "debugger detached from tab 11".into(),
	})
	.await;

	let call = bridge.post(&script("after", "2"));
	let relayed = ext.next_command().await;
	ext.respond(ResponseEnvelope::ok(relayed.id, json!(2))).await;
	assert_eq!(finish(call).await.0, StatusCode::OK);
}

#[tokio::test]
async fn client_sends_typed_commands_through_real_bridge() {
	let (bridge, mut ext) = Bridge::start().await;
	ext.register().await;

	let extension = tokio::spawn(async move {
		let envelope = ext.next_command().await;
		assert_eq!(envelope.command, "list_tabs");
		let tabs = json!([
			{ "id": 501, "index": 0, "windowId": 1, "title": "Inbox", "url": "https://mail.example.com", "active": true },
			{ "id": 502, "index": 1, "windowId": 1, "title": "Docs", "url": "https://docs.example.com" },
		]);
		ext.respond(ResponseEnvelope::ok(envelope.id, tabs)).await;
		ext
	});

	let client = Client::new(HttpTransport::new(), vec![bridge.port]).extension_id(Some(EXTENSION_ID.into()));
	let tabs: Vec<TabInfo> = client.send(&ListTabs::default()).await.unwrap();
	assert_eq!(tabs.iter().map(|t| t.id).collect::<Vec<_>>(), [501, 502]);
	assert!(!tabs[1].active);
	finish(extension).await;
}

#[tokio::test]
async fn client_rejects_bridge_of_other_extension() {
	let (bridge, mut ext) = Bridge::start().await;
	ext.register().await;

	let client = Client::new(HttpTransport::new(), vec![bridge.port])
		.extension_id(Some("someone-else".into()))
		.probe(ProbePolicy {
			attempts: 2,
			delay: Duration::from_millis(10),
		});
	let err = client.send(&ListTabs::default()).await.unwrap_err();
	assert!(
		matches!(err, TransportError::ExtensionNotRegistered { port, .. } if port == bridge.port),
		"unexpected error: {err}"
	);
}
