//! Failure taxonomy for inbound message processing, and its rendering into
//! fail-visible replacement page content.
//!
//! Nothing here is recovered from: every failure is surfaced immediately by
//! overwriting the whole visible page, the session stays attached, and the
//! next message is processed independently. A failed message never mutates
//! the recorded tree.

use serde_json::{json, Value};
use thiserror::Error;

/// Everything that can go wrong with one inbound message.
#[derive(Debug, Error)]
pub enum ClientError {
	/// The payload was not valid JSON.
	#[error("failed to parse message as JSON: {source}")]
	Parse {
		#[source]
		source: serde_json::Error,
		/// The offending payload, verbatim.
		raw: String,
	},
	/// Valid JSON, but nothing to render: no `tree` member.
	#[error("message without property")]
	MessageWithoutTree { message: Value },
	/// The `tree` member could not be turned into a virtual tree.
	#[error("failed to translate tree description: {source}")]
	Translate {
		#[source]
		source: TranslateError,
		/// The offending payload, verbatim.
		raw: String,
	},
}

/// Why a tree description could not be translated.
#[derive(Debug, Error)]
pub enum TranslateError {
	#[error("tree description does not match the expected shape: {0}")]
	Shape(#[from] serde_json::Error),
	/// Actions bind DOM events, so their property must be named `on<event>`.
	#[error("property {property:?} carries an action but does not name a DOM event")]
	ActionOnNonEvent { property: String },
	#[error("unknown element namespace {namespace:?}")]
	UnknownNamespace { namespace: String },
	/// Keys identify reorderable siblings, so they must be unique within one
	/// run. This also covers two distinct keys hashing to the same reorder
	/// identity.
	#[error("sibling key {key:?} collides with an earlier key")]
	KeyCollision { key: String },
}

impl ClientError {
	/// JSON form of the failure, for the diagnostic surface.
	#[must_use]
	pub fn diagnostic_json(&self) -> Value {
		match self {
			ClientError::Parse { source, .. } => json!({ "kind": "parse", "error": source.to_string() }),
			ClientError::MessageWithoutTree { message } => json!({ "kind": "message without property", "msg": message }),
			ClientError::Translate { source, .. } => json!({ "kind": "translate", "error": source.to_string() }),
		}
	}

	/// Replacement content for the whole visible page. There is no notion of
	/// an error that is non-fatal to the view, so there is no partial-error
	/// rendition either.
	#[must_use]
	pub fn to_page_content(&self) -> String {
		match self {
			ClientError::Parse { raw, .. } | ClientError::Translate { raw, .. } => [
				"onmessage error: ".to_owned(),
				self.to_string(),
				self.diagnostic_json().to_string(),
				format!("msg: {}", raw),
			]
			.join("<br>"),
			ClientError::MessageWithoutTree { message } => ["message without property".to_owned(), format!("msg: {}", message)].join("<br>"),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse_error(raw: &str) -> ClientError {
		ClientError::Parse {
			source: serde_json::from_str::<Value>(raw).unwrap_err(),
			raw: raw.to_owned(),
		}
	}

	#[test]
	fn parse_failure_shows_error_and_raw_text() {
		let content = parse_error("not json").to_page_content();
		assert!(content.starts_with("onmessage error: <br>"));
		assert!(content.contains("failed to parse message as JSON"));
		assert!(content.contains(r#""kind":"parse""#));
		assert!(content.ends_with("msg: not json"));
	}

	#[test]
	fn message_without_tree_shows_the_full_message() {
		let error = ClientError::MessageWithoutTree { message: json!({ "foo": 1 }) };
		let content = error.to_page_content();
		assert_eq!(content, r#"message without property<br>msg: {"foo":1}"#);
	}

	#[test]
	fn translate_failure_keeps_the_raw_payload() {
		let raw = r#"{"tree":{"name":"div","namespace":"xhtml"}}"#;
		let error = ClientError::Translate {
			source: TranslateError::UnknownNamespace { namespace: "xhtml".to_owned() },
			raw: raw.to_owned(),
		};
		let content = error.to_page_content();
		assert!(content.contains(r#"unknown element namespace "xhtml""#));
		assert!(content.ends_with(&format!("msg: {}", raw)));
	}
}
