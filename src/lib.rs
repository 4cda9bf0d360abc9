#![doc(html_root_url = "https://docs.rs/lignin-remote/0.0.1")]
#![warn(clippy::pedantic)]

//! A remote-UI client for [`lignin`]: renders server-pushed tree
//! descriptions onto the DOM and forwards UI actions back over a WebSocket.
//!
//! The client's entire logic is: keep one socket open, translate every
//! inbound `{ "tree": … }` message into a `lignin` node graph, let the
//! [`patch`] engine reconcile the page, and answer user interactions with
//! `{ "tag": …, "data": …, "associated": … }` messages that capture live
//! element fields at dispatch time. There is no reconnection, no protocol
//! negotiation and no error recovery: failures replace the page content and
//! stay there.

pub use lignin;

pub mod bindings;
pub mod bridge;
pub mod connection;
pub mod dispatch;
pub mod dom;
pub mod error;
pub mod patch;
pub mod session;
pub mod wire;

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

use wasm_bindgen::{prelude::wasm_bindgen, JsValue, UnwrapThrowExt};

/// Endpoint of the UI server. Fixed, like the rest of the transport: no
/// configuration files, no environment variables.
pub const SERVER_URL: &str = "ws://localhost:8080";

/// Application-level subprotocol identifier negotiated with the UI server.
pub const SUBPROTOCOL: &str = "coap-browse";

/// Page entry point: mounts a connection on the document body.
#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
	console_error_panic_hook::set_once();
	tracing_wasm::set_as_global_default();

	let document = web_sys::window()
		.expect_throw("lignin-remote: No window to run in.")
		.document()
		.expect_throw("lignin-remote: No document to render into.");
	let body = document.body().expect_throw("lignin-remote: No document body to render into.");

	let connection = connection::Connection::open(SERVER_URL, SUBPROTOCOL, body.into())?;
	// The handlers stay attached for the page lifetime.
	std::mem::forget(connection);
	Ok(())
}
