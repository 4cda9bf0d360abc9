//! WebSocket lifecycle, wired to a rendering surface.
//!
//! The connection is deliberately fail-stop: once the socket closes or
//! errors, the failure is rendered in place of the page content and nothing
//! is retried. There is no reconnection, no heartbeat and no authentication;
//! this is a development client that prefers failing visibly to recovering
//! quietly.

use crate::{
	dispatch::ActionSink,
	dom::DomReconciler,
	error::ClientError,
	session::Session,
};
use std::{cell::RefCell, rc::Rc};
use tracing::{error, info, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{CloseEvent, Element, Event, MessageEvent, WebSocket};

/// Full-content replacement surface for lifecycle and failure reporting.
///
/// Successful updates never pass through here; the reconciler owns the
/// mount's children incrementally. The surface only ever replaces the whole
/// visible content at once.
pub struct Surface {
	mount: Element,
}

impl Surface {
	#[must_use]
	pub fn new(mount: Element) -> Self {
		Self { mount }
	}

	pub fn show_error(&self, error: &ClientError) {
		self.mount.set_inner_html(&error.to_page_content());
	}

	pub fn show_closed(&self) {
		self.mount.set_inner_html("socket closed");
	}

	pub fn show_socket_error(&self, error: &JsValue) {
		let text = error
			.dyn_ref::<js_sys::Object>()
			.map_or_else(|| format!("{:?}", error), |object| String::from(object.to_string()));
		let json = js_sys::JSON::stringify(error).map_or_else(|_| "null".to_owned(), String::from);
		self.mount.set_inner_html(&["socket error: ".to_owned(), text, json].join("<br>"));
	}
}

/// `ActionSink` over the connection's own socket.
struct SocketSink {
	socket: WebSocket,
}

impl ActionSink for SocketSink {
	fn send(&self, message: &str) {
		// Fire-and-forget: nothing to retry, nothing to surface.
		if let Err(error) = self.socket.send_with_str(message) {
			error!("Failed to send action message: {:?}", error);
		}
	}
}

/// One live connection: the socket and the JS handlers driving its session.
pub struct Connection {
	_socket: WebSocket,
	_onmessage: Closure<dyn FnMut(MessageEvent)>,
	_onerror: Closure<dyn FnMut(Event)>,
	_onclose: Closure<dyn FnMut(CloseEvent)>,
}

impl Connection {
	/// Opens a socket to `url` with the application subprotocol `protocol`
	/// and renders everything it pushes into `mount`.
	///
	/// The handlers stay attached only while the returned [`Connection`] is
	/// alive; a page-lifetime client leaks it.
	pub fn open(url: &str, protocol: &str, mount: Element) -> Result<Self, JsValue> {
		let socket = WebSocket::new_with_str(url, protocol)?;
		info!("Connecting to {} ({}).", url, protocol);

		let surface = Rc::new(Surface::new(mount.clone()));
		let sink = Rc::new(SocketSink { socket: socket.clone() });
		let session = Rc::new(RefCell::new(Session::new(DomReconciler::new(mount, sink))));

		let onmessage = Closure::wrap(Box::new({
			let session = Rc::clone(&session);
			let surface = Rc::clone(&surface);
			move |message: MessageEvent| {
				let data = match message.data().as_string() {
					Some(data) => data,
					// The server only ever pushes text frames.
					None => return warn!("Ignoring non-text message: {:?}", message.data()),
				};
				if let Err(error) = session.borrow_mut().handle_message(&data) {
					error!("Failed to process message: {}", error);
					surface.show_error(&error);
				}
			}
		}) as Box<dyn FnMut(MessageEvent)>);
		socket.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));

		let onclose = Closure::wrap(Box::new({
			let surface = Rc::clone(&surface);
			move |_: CloseEvent| {
				info!("Socket closed.");
				surface.show_closed();
			}
		}) as Box<dyn FnMut(CloseEvent)>);
		socket.set_onclose(Some(onclose.as_ref().unchecked_ref()));

		let onerror = Closure::wrap(Box::new({
			let surface = Rc::clone(&surface);
			move |event: Event| {
				error!("Socket error: {:?}", event);
				surface.show_socket_error(event.as_ref());
			}
		}) as Box<dyn FnMut(Event)>);
		socket.set_onerror(Some(onerror.as_ref().unchecked_ref()));

		Ok(Self {
			_socket: socket,
			_onmessage: onmessage,
			_onerror: onerror,
			_onclose: onclose,
		})
	}
}
