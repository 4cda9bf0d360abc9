//! Bridging a DOM-originated event plus its action descriptor into one
//! outbound socket message.
//!
//! Dispatch is synchronous with the DOM event and fire-and-forget: no
//! batching, no debouncing, no delivery confirmation. The two capabilities a
//! dispatch needs, reading a named field off the event target and delivering
//! the serialized message, sit behind traits so nothing here depends on
//! untyped dynamic property access or on a live socket.

use crate::wire::{ActionDescriptor, ActionMessage};
use lignin::web::Event;
use serde_json::Value;
use std::{collections::BTreeMap, rc::Rc};
use tracing::error;
use wasm_bindgen::{JsValue, UnwrapThrowExt};

/// Outbound transport capability: delivers one serialized action message.
pub trait ActionSink {
	fn send(&self, message: &str);
}

/// Capability to resolve a named field of a live UI element.
pub trait FieldResolver {
	/// The field's current value, or [`Value::Null`] if the element has no
	/// such field (or its value has no JSON rendition).
	fn field(&self, name: &str) -> Value;
}

/// [`FieldResolver`] over the JS reflection of an event target.
pub struct TargetFields<'a> {
	target: &'a JsValue,
}

impl<'a> TargetFields<'a> {
	#[must_use]
	pub fn new(target: &'a JsValue) -> Self {
		Self { target }
	}
}

impl FieldResolver for TargetFields<'_> {
	fn field(&self, name: &str) -> Value {
		let value = match js_sys::Reflect::get(self.target, &JsValue::from_str(name)) {
			Ok(value) => value,
			Err(error) => {
				error!("Failed to read field {:?} off the event target: {:?}", name, error);
				return Value::Null;
			}
		};
		if let Some(string) = value.as_string() {
			Value::String(string)
		} else if let Some(number) = value.as_f64() {
			serde_json::Number::from_f64(number).map_or(Value::Null, Value::Number)
		} else if let Some(boolean) = value.as_bool() {
			Value::Bool(boolean)
		} else {
			if !value.is_null() && !value.is_undefined() {
				tracing::warn!("Field {:?} of the event target is not a JSON primitive; sending null.", name);
			}
			Value::Null
		}
	}
}

/// Resolves every `associated` entry of `action` through `fields` and
/// serializes the resulting action message.
#[must_use]
pub fn outbound_json(action: &ActionDescriptor, fields: &dyn FieldResolver) -> String {
	let associated: BTreeMap<&str, Value> = action
		.associated
		.iter()
		.map(|(key, field)| (key.as_str(), fields.field(field)))
		.collect();
	let message = ActionMessage {
		tag: &action.tag,
		data: &action.data,
		associated,
	};
	serde_json::to_string(&message).expect_throw("lignin-remote: Failed to serialize an action message.")
}

/// Dispatch context for one action binding.
///
/// The binding registry keeps this pinned for as long as the matching
/// callback registration is alive, which is what makes [`Self::handle`]'s
/// receiver pointer valid.
pub struct ActionContext {
	action: ActionDescriptor,
	sink: Rc<dyn ActionSink>,
}

impl ActionContext {
	pub(crate) fn new(action: ActionDescriptor, sink: Rc<dyn ActionSink>) -> Self {
		Self { action, sink }
	}

	/// Callback registration entry point.
	pub(crate) fn handle(context: *const Self, event: Event) {
		let context = unsafe { context.as_ref() }.expect_throw("lignin-remote: Dispatch context disappeared.");
		context.dispatch(event);
	}

	#[cfg(target_arch = "wasm32")]
	fn dispatch(&self, event: Event) {
		use lignin::web::Materialize;
		use wasm_bindgen::JsCast;

		let event = event.materialize();
		let event: &JsValue = event.as_ref();
		let event = match event.dyn_ref::<web_sys::Event>() {
			Some(event) => event,
			None => return error!("Dispatched with something that is not an `Event`: {:?}", event),
		};
		let target = match event.target() {
			Some(target) => target,
			None => return error!("Dispatched event has no target; dropping the action."),
		};
		let message = outbound_json(&self.action, &TargetFields::new(target.as_ref()));
		self.sink.send(&message);
	}

	#[cfg(not(target_arch = "wasm32"))]
	fn dispatch(&self, _event: Event) {
		// Events only ever originate from a real DOM.
		error!("Action dispatch requires a browser environment.");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	struct FakeFields(BTreeMap<String, Value>);

	impl FieldResolver for FakeFields {
		fn field(&self, name: &str) -> Value {
			self.0.get(name).cloned().unwrap_or(Value::Null)
		}
	}

	#[test]
	fn associated_fields_are_resolved_at_dispatch_time() {
		let action: ActionDescriptor = serde_json::from_value(json!({
			"tag": "submit",
			"data": { "id": 1 },
			"associated": { "value": "value" },
		}))
		.unwrap();
		let fields = FakeFields(vec![("value".to_owned(), json!("hello"))].into_iter().collect());
		assert_eq!(
			outbound_json(&action, &fields),
			r#"{"tag":"submit","data":{"id":1},"associated":{"value":"hello"}}"#
		);
	}

	#[test]
	fn missing_fields_resolve_to_null() {
		let action: ActionDescriptor = serde_json::from_value(json!({
			"tag": "submit",
			"associated": { "checked": "checked" },
		}))
		.unwrap();
		let fields = FakeFields(BTreeMap::new());
		assert_eq!(outbound_json(&action, &fields), r#"{"tag":"submit","data":null,"associated":{"checked":null}}"#);
	}

	#[test]
	fn actions_without_associations_send_an_empty_map() {
		let action: ActionDescriptor = serde_json::from_value(json!({ "tag": "Increment" })).unwrap();
		let fields = FakeFields(BTreeMap::new());
		assert_eq!(outbound_json(&action, &fields), r#"{"tag":"Increment","data":null,"associated":{}}"#);
	}
}
