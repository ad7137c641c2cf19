//! `chrome.*` bindings and the native-messaging connection loop.

use std::rc::Rc;
use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::{mpsc, oneshot};
use futures::{FutureExt, StreamExt, select};
use js_sys::{Array, Object, Promise, Reflect};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tabctl_protocol::{BridgeMessage, ExtensionMessage, NATIVE_HOST_NAME, Registration, TabId, TabInfo};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, spawn_local};

use crate::api::{BrowserApi, BrowserError, Clock, Debugger, TabUpdate};
use crate::background::{Background, heartbeat};
use crate::log_forward::FrameLogLayer;
use crate::session::{DetachReason, SessionEvent};

const DEBUGGER_PROTOCOL_VERSION: &str = "1.3";
const KEEPALIVE_INTERVAL_MS: i32 = 20_000;
const RECONNECT_BASE_MS: i32 = 1_000;
const RECONNECT_MAX_MS: i32 = 30_000;
const RELOAD_DELAY_MS: i32 = 100;
const LOG_QUEUE: usize = 64;

type ChromeBackground = Background<ChromeBrowser, ChromeDebugger, JsClock>;

#[wasm_bindgen(start)]
pub fn start() {
	console_error_panic_hook::set_once();
	let logs = forward_logs();
	spawn_local(run(logs));
}

/// Installs the global subscriber. Lines are mirrored to the console and
/// queued for the bridge; the queue drops lines while it is full.
fn forward_logs() -> mpsc::Receiver<ExtensionMessage> {
	let (tx, rx) = mpsc::channel(LOG_QUEUE);
	let tx = parking_lot::Mutex::new(tx);
	let layer = FrameLogLayer::new(move |frame: ExtensionMessage| {
		if let ExtensionMessage::Log { message, .. } = &frame {
			web_sys::console::log_1(&message.as_str().into());
		}
		let _ = tx.lock().try_send(frame);
	});
	let _ = tracing_subscriber::registry().with(layer).try_init();
	rx
}

async fn run(mut logs: mpsc::Receiver<ExtensionMessage>) {
	if let Err(err) = reset_debugger().await {
		warn!(target = "tabctl.ext", error = %err.message, "stale debugger cleanup failed");
	}

	let registration = Registration {
		extension_id: lookup(&["chrome", "runtime", "id"]).as_string().unwrap_or_default(),
		version: Reflect::get(&runtime_get_manifest(), &"version".into())
			.ok()
			.and_then(|v| v.as_string())
			.unwrap_or_default(),
	};
	let background = Rc::new(Background::new(
		Arc::new(ChromeBrowser),
		Arc::new(ChromeDebugger),
		Arc::new(JsClock),
		registration,
	));

	let events = listen_browser_events();
	{
		let background = Rc::clone(&background);
		spawn_local(async move { background.run_event_loop(events).await });
	}

	let mut backoff = RECONNECT_BASE_MS;
	loop {
		if serve_connection(&background, &mut logs).await {
			backoff = RECONNECT_BASE_MS;
		}
		background.disconnected();
		sleep(backoff).await;
		backoff = (backoff * 2).min(RECONNECT_MAX_MS);
	}
}

/// Detaches sessions left over from a previous worker instance.
async fn reset_debugger() -> Result<(), BrowserError> {
	let targets = call(debugger_get_targets()).await?;
	for target in Array::from(&targets).iter() {
		let attached = Reflect::get(&target, &"attached".into())
			.ok()
			.and_then(|v| v.as_bool())
			.unwrap_or(false);
		if let (true, Some(tab_id)) = (attached, tab_id_of(&target)) {
			let _ = call(debugger_detach(&debuggee(tab_id)?)).await;
		}
	}
	Ok(())
}

/// Runs one native-messaging connection; returns whether it registered.
async fn serve_connection(background: &Rc<ChromeBackground>, logs: &mut mpsc::Receiver<ExtensionMessage>) -> bool {
	let port = Rc::new(runtime_connect_native(NATIVE_HOST_NAME));

	let (frame_tx, mut frames) = mpsc::unbounded::<JsValue>();
	let on_message = Closure::<dyn FnMut(JsValue)>::new(move |raw: JsValue| {
		let _ = frame_tx.unbounded_send(raw);
	});
	port.on_message().add_listener(on_message.as_ref().unchecked_ref());

	let (closed_tx, closed_rx) = oneshot::channel::<String>();
	let mut closed_tx = Some(closed_tx);
	let on_disconnect = Closure::<dyn FnMut(JsValue)>::new(move |_port: JsValue| {
		let reason = lookup(&["chrome", "runtime", "lastError", "message"])
			.as_string()
			.unwrap_or_else(|| "port closed".into());
		if let Some(tx) = closed_tx.take() {
			let _ = tx.send(reason);
		}
	});
	port.on_disconnect().add_listener(on_disconnect.as_ref().unchecked_ref());

	post(&port, &background.register_frame());

	let mut registered = false;
	let mut closed = closed_rx.fuse();
	let mut keepalive = Box::pin(heartbeat(|| sleep(KEEPALIVE_INTERVAL_MS))).fuse();
	loop {
		select! {
			raw = frames.next() => {
				let Some(raw) = raw else { break };
				match serde_wasm_bindgen::from_value::<BridgeMessage>(raw) {
					Ok(frame) => {
						registered |= matches!(frame, BridgeMessage::Registered { .. });
						let background = Rc::clone(background);
						let port = Rc::clone(&port);
						spawn_local(async move {
							if let Some(reply) = background.handle_frame(frame).await {
								post(&port, &reply);
							}
						});
					}
					Err(err) => warn!(target = "tabctl.ext", error = %err, "undecodable frame"),
				}
			}
			reason = closed => {
				let reason = reason.unwrap_or_default();
				warn!(target = "tabctl.ext", %reason, "bridge disconnected");
				break;
			}
			line = logs.next() => {
				if let Some(line) = line {
					post(&port, &line);
				}
			}
			_ = keepalive.next() => post(&port, &ExtensionMessage::KeepAlive),
		}
	}

	drop(on_message);
	drop(on_disconnect);
	registered
}

fn post(port: &NativePort, message: &ExtensionMessage) {
	let sent = to_js(message).and_then(|value| port.post_message(&value).map_err(js_error));
	// Console only: a failed post must not queue another log frame.
	if let Err(err) = sent {
		web_sys::console::warn_1(&format!("tabctl: post failed: {}", err.message).into());
	}
}

fn listen_browser_events() -> mpsc::UnboundedReceiver<SessionEvent> {
	let (tx, rx) = mpsc::unbounded();

	let sender = tx.clone();
	let on_event = Closure::<dyn FnMut(JsValue, JsValue, JsValue)>::new(move |source: JsValue, method: JsValue, params: JsValue| {
		let Some(tab_id) = tab_id_of(&source) else { return };
		let _ = sender.unbounded_send(SessionEvent::Protocol {
			tab_id,
			method: method.as_string().unwrap_or_default(),
			params: serde_wasm_bindgen::from_value(params).unwrap_or(Value::Null),
		});
	});
	debugger_on_event_add_listener(&on_event);
	on_event.forget();

	let sender = tx.clone();
	let on_detach = Closure::<dyn FnMut(JsValue, JsValue)>::new(move |source: JsValue, reason: JsValue| {
		let Some(tab_id) = tab_id_of(&source) else { return };
		let _ = sender.unbounded_send(SessionEvent::Detached {
			tab_id,
			reason: DetachReason::External(reason.as_string().unwrap_or_default()),
		});
	});
	debugger_on_detach_add_listener(&on_detach);
	on_detach.forget();

	let on_removed = Closure::<dyn FnMut(JsValue, JsValue)>::new(move |tab_id: JsValue, _info: JsValue| {
		if let Some(tab_id) = tab_id.as_f64() {
			let _ = tx.unbounded_send(SessionEvent::TabRemoved { tab_id: tab_id as TabId });
		}
	});
	tabs_on_removed_add_listener(&on_removed);
	on_removed.forget();

	rx
}

pub struct ChromeDebugger;

#[async_trait(?Send)]
impl Debugger for ChromeDebugger {
	async fn attach(&self, tab_id: TabId) -> Result<(), BrowserError> {
		call(debugger_attach(&debuggee(tab_id)?, DEBUGGER_PROTOCOL_VERSION)).await?;
		Ok(())
	}

	async fn detach(&self, tab_id: TabId) -> Result<(), BrowserError> {
		call(debugger_detach(&debuggee(tab_id)?)).await?;
		Ok(())
	}

	async fn send_command(&self, tab_id: TabId, method: &str, params: Value) -> Result<Value, BrowserError> {
		let result = call(debugger_send_command(&debuggee(tab_id)?, method, &to_js(&params)?)).await?;
		if result.is_undefined() {
			return Ok(json!({}));
		}
		from_js(result)
	}
}

pub struct ChromeBrowser;

#[async_trait(?Send)]
impl BrowserApi for ChromeBrowser {
	async fn query_tabs(&self, current_window: bool) -> Result<Vec<TabInfo>, BrowserError> {
		let query = if current_window { json!({ "currentWindow": true }) } else { json!({}) };
		let tabs = call(tabs_query(&to_js(&query)?)).await?;
		// Tabs without an id (devtools windows) are not addressable.
		Ok(Array::from(&tabs)
			.iter()
			.filter_map(|tab| serde_wasm_bindgen::from_value(tab).ok())
			.collect())
	}

	async fn create_tab(&self, url: Option<&str>, active: bool) -> Result<TabInfo, BrowserError> {
		let mut props = json!({ "active": active });
		if let Some(url) = url {
			props["url"] = json!(url);
		}
		from_js(call(tabs_create(&to_js(&props)?)).await?)
	}

	async fn close_tab(&self, tab_id: TabId) -> Result<(), BrowserError> {
		call(tabs_remove(tab_id as f64)).await?;
		Ok(())
	}

	async fn update_tab(&self, tab_id: TabId, update: TabUpdate) -> Result<TabInfo, BrowserError> {
		let mut props = json!({});
		if let Some(url) = update.url {
			props["url"] = json!(url);
		}
		if let Some(active) = update.active {
			props["active"] = json!(active);
		}
		from_js(call(tabs_update(tab_id as f64, &to_js(&props)?)).await?)
	}

	async fn reload_tab(&self, tab_id: TabId, bypass_cache: bool) -> Result<(), BrowserError> {
		call(tabs_reload(tab_id as f64, &to_js(&json!({ "bypassCache": bypass_cache }))?)).await?;
		Ok(())
	}

	async fn focus_window(&self, window_id: i64) -> Result<(), BrowserError> {
		call(windows_update(window_id as f64, &to_js(&json!({ "focused": true }))?)).await?;
		Ok(())
	}

	fn reload_extension(&self) {
		spawn_local(async {
			sleep(RELOAD_DELAY_MS).await;
			runtime_reload();
		});
	}

	fn user_agent(&self) -> Option<String> {
		lookup(&["navigator", "userAgent"]).as_string()
	}
}

pub struct JsClock;

impl Clock for JsClock {
	fn now_ms(&self) -> f64 {
		js_sys::Date::now()
	}
}

async fn sleep(ms: i32) {
	let promise = Promise::new(&mut |resolve, _reject| {
		set_timeout(&resolve, ms);
	});
	let _ = JsFuture::from(promise).await;
}

async fn call(promise: Promise) -> Result<JsValue, BrowserError> {
	JsFuture::from(promise).await.map_err(js_error)
}

fn debuggee(tab_id: TabId) -> Result<JsValue, BrowserError> {
	let target = Object::new();
	Reflect::set(&target, &"tabId".into(), &JsValue::from_f64(tab_id as f64)).map_err(js_error)?;
	Ok(target.into())
}

fn tab_id_of(value: &JsValue) -> Option<TabId> {
	Reflect::get(value, &"tabId".into()).ok()?.as_f64().map(|id| id as TabId)
}

/// Walks a property path from the global object, yielding `undefined` on a miss.
fn lookup(path: &[&str]) -> JsValue {
	path.iter().fold(js_sys::global().into(), |value: JsValue, key| {
		if value.is_undefined() || value.is_null() {
			return JsValue::UNDEFINED;
		}
		Reflect::get(&value, &(*key).into()).unwrap_or(JsValue::UNDEFINED)
	})
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, BrowserError> {
	value
		.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
		.map_err(|err| BrowserError::new(err.to_string()))
}

fn from_js<T: DeserializeOwned>(value: JsValue) -> Result<T, BrowserError> {
	serde_wasm_bindgen::from_value(value).map_err(|err| BrowserError::new(err.to_string()))
}

fn js_error(err: JsValue) -> BrowserError {
	let message = Reflect::get(&err, &"message".into())
		.ok()
		.and_then(|m| m.as_string())
		.or_else(|| err.as_string())
		.or_else(|| js_sys::JSON::stringify(&err).ok()?.as_string())
		.unwrap_or_else(|| format!("{err:?}"));
	BrowserError::new(message)
}

#[wasm_bindgen]
extern "C" {
	type NativePort;

	#[wasm_bindgen(method, catch, js_name = postMessage)]
	fn post_message(this: &NativePort, message: &JsValue) -> Result<(), JsValue>;

	#[wasm_bindgen(method, getter, js_name = onMessage)]
	fn on_message(this: &NativePort) -> PortEvent;

	#[wasm_bindgen(method, getter, js_name = onDisconnect)]
	fn on_disconnect(this: &NativePort) -> PortEvent;

	type PortEvent;

	#[wasm_bindgen(method, js_name = addListener)]
	fn add_listener(this: &PortEvent, callback: &js_sys::Function);

	#[wasm_bindgen(js_namespace = ["chrome", "runtime"], js_name = connectNative)]
	fn runtime_connect_native(application: &str) -> NativePort;

	#[wasm_bindgen(js_namespace = ["chrome", "runtime"], js_name = getManifest)]
	fn runtime_get_manifest() -> JsValue;

	#[wasm_bindgen(js_namespace = ["chrome", "runtime"], js_name = reload)]
	fn runtime_reload();

	#[wasm_bindgen(js_namespace = ["chrome", "tabs"], js_name = query)]
	fn tabs_query(query: &JsValue) -> Promise;

	#[wasm_bindgen(js_namespace = ["chrome", "tabs"], js_name = create)]
	fn tabs_create(properties: &JsValue) -> Promise;

	#[wasm_bindgen(js_namespace = ["chrome", "tabs"], js_name = remove)]
	fn tabs_remove(tab_id: f64) -> Promise;

	#[wasm_bindgen(js_namespace = ["chrome", "tabs"], js_name = update)]
	fn tabs_update(tab_id: f64, properties: &JsValue) -> Promise;

	#[wasm_bindgen(js_namespace = ["chrome", "tabs"], js_name = reload)]
	fn tabs_reload(tab_id: f64, properties: &JsValue) -> Promise;

	#[wasm_bindgen(js_namespace = ["chrome", "tabs", "onRemoved"], js_name = addListener)]
	fn tabs_on_removed_add_listener(callback: &Closure<dyn FnMut(JsValue, JsValue)>);

	#[wasm_bindgen(js_namespace = ["chrome", "windows"], js_name = update)]
	fn windows_update(window_id: f64, properties: &JsValue) -> Promise;

	#[wasm_bindgen(js_namespace = ["chrome", "debugger"], js_name = attach)]
	fn debugger_attach(target: &JsValue, version: &str) -> Promise;

	#[wasm_bindgen(js_namespace = ["chrome", "debugger"], js_name = detach)]
	fn debugger_detach(target: &JsValue) -> Promise;

	#[wasm_bindgen(js_namespace = ["chrome", "debugger"], js_name = getTargets)]
	fn debugger_get_targets() -> Promise;

	#[wasm_bindgen(js_namespace = ["chrome", "debugger"], js_name = sendCommand)]
	fn debugger_send_command(target: &JsValue, method: &str, params: &JsValue) -> Promise;

	#[wasm_bindgen(js_namespace = ["chrome", "debugger", "onEvent"], js_name = addListener)]
	fn debugger_on_event_add_listener(callback: &Closure<dyn FnMut(JsValue, JsValue, JsValue)>);

	#[wasm_bindgen(js_namespace = ["chrome", "debugger", "onDetach"], js_name = addListener)]
	fn debugger_on_detach_add_listener(callback: &Closure<dyn FnMut(JsValue, JsValue)>);

	#[wasm_bindgen(js_name = setTimeout)]
	fn set_timeout(callback: &js_sys::Function, millis: i32) -> JsValue;
}
