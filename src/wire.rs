//! The JSON wire format spoken with the UI server.
//!
//! Inbound, the server pushes full updates of the shape `{ "tree": … }`,
//! where the tree description is either a string (a text node) or a tag
//! object (see [`TagDescription`]). Outbound, the client emits one
//! [`ActionMessage`] per dispatched UI action. Neither side negotiates
//! anything beyond the WebSocket subprotocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Server-provided description of desired page content and interaction
/// bindings. Consumed once per message and never mutated after receipt.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TreeDescription {
	/// A text node.
	Text(String),
	/// An element with properties and children.
	Tag(TagDescription),
}

/// One element of a [`TreeDescription`].
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TagDescription {
	pub name: String,
	#[serde(default)]
	pub properties: BTreeMap<String, PropertyDescription>,
	#[serde(default)]
	pub children: Vec<TreeDescription>,
	/// Reorder identity. Consecutive keyed siblings may be moved instead of
	/// rebuilt when the server reorders them.
	#[serde(default)]
	pub key: Option<String>,
	/// `None` is HTML; `"svg"` and `"mathml"` select the other element
	/// namespaces the DOM can express.
	#[serde(default)]
	pub namespace: Option<String>,
}

/// A property of a [`TagDescription`]: a plain attribute value or an action
/// bound to a DOM event.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PropertyDescription {
	Text(String),
	Action(ActionDescriptor),
}

/// A logical user action: what to report to the server, an opaque payload to
/// echo, and which live element fields to capture at dispatch time.
///
/// `associated` maps arbitrary keys to names of fields on the event target;
/// dispatch substitutes the field's runtime value for its name. Constructed
/// transiently while translating a tree, serialized on dispatch, not
/// retained afterwards.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ActionDescriptor {
	pub tag: Value,
	#[serde(default)]
	pub data: Value,
	#[serde(default)]
	pub associated: BTreeMap<String, String>,
}

/// Outbound message, one per dispatched UI action. Fire-and-forget.
#[derive(Debug, Serialize)]
pub struct ActionMessage<'a> {
	pub tag: &'a Value,
	pub data: &'a Value,
	pub associated: BTreeMap<&'a str, Value>,
}

impl TreeDescription {
	/// Maximum nesting depth of the description, used to bound the differ's
	/// recursion.
	#[must_use]
	pub fn depth(&self) -> usize {
		match self {
			TreeDescription::Text(_) => 1,
			TreeDescription::Tag(tag) => 1 + tag.children.iter().map(Self::depth).max().unwrap_or(0),
		}
	}
}
