//! Translation from wire tree descriptions into `lignin` node graphs.
//!
//! Translation is transient: both the previous and the next description are
//! rebuilt into a caller-supplied [`Bump`] on every update and the arena is
//! discarded once the differ has run. What persists between updates lives in
//! the [`BindingRegistry`], which hands back identical callbacks for
//! unchanged actions, so two builds of the same description are
//! indistinguishable to the differ.

use crate::{
	bindings::BindingRegistry,
	error::TranslateError,
	wire::{PropertyDescription, TagDescription, TreeDescription},
};
use bumpalo::Bump;
use hashbrown::HashSet;
use lignin::{Attribute, Element, ElementCreationOptions, EventBinding, EventBindingOptions, Node, ReorderableFragment, ThreadBound};
use std::{
	collections::hash_map::DefaultHasher,
	hash::{Hash, Hasher},
};

/// Translates one tree description into a `lignin` node allocated in `bump`.
pub fn build_tree<'a>(description: &TreeDescription, bump: &'a Bump, bindings: &mut BindingRegistry) -> Result<Node<'a, ThreadBound>, TranslateError> {
	Ok(match description {
		TreeDescription::Text(text) => Node::Text {
			text: bump.alloc_str(text),
			dom_binding: None,
		},
		TreeDescription::Tag(tag) => build_tag(tag, bump, bindings)?,
	})
}

fn build_tag<'a>(tag: &TagDescription, bump: &'a Bump, bindings: &mut BindingRegistry) -> Result<Node<'a, ThreadBound>, TranslateError> {
	let mut attributes = Vec::new();
	let mut event_bindings = Vec::new();
	for (name, property) in &tag.properties {
		match property {
			PropertyDescription::Text(value) => attributes.push(Attribute {
				name: bump.alloc_str(name),
				value: bump.alloc_str(value),
			}),
			PropertyDescription::Action(action) => {
				// `onclick` binds `click`; properties carrying actions must
				// name the DOM event this way.
				let event = match name.strip_prefix("on").filter(|event| !event.is_empty()) {
					Some(event) => event,
					None => return Err(TranslateError::ActionOnNonEvent { property: name.clone() }),
				};
				event_bindings.push(EventBinding {
					name: bump.alloc_str(event),
					callback: bindings.acquire(event, action),
					options: EventBindingOptions::new(),
				});
			}
		}
	}

	let content = build_children(&tag.children, bump, bindings)?;
	// `tagName` reports HTML elements in ASCII uppercase; matching that here
	// keeps updates from recreating elements over a case mismatch.
	let name: &str = match tag.namespace.as_deref() {
		None => bump.alloc_str(&tag.name.to_ascii_uppercase()),
		Some(_) => bump.alloc_str(&tag.name),
	};
	let element = bump.alloc_with(|| Element {
		name,
		creation_options: ElementCreationOptions::new(),
		attributes: bump.alloc_slice_copy(&attributes),
		content,
		event_bindings: bump.alloc_slice_copy(&event_bindings),
	});
	Ok(match tag.namespace.as_deref() {
		None => Node::HtmlElement { element, dom_binding: None },
		Some("svg") => Node::SvgElement { element, dom_binding: None },
		Some("mathml") => Node::MathMlElement { element, dom_binding: None },
		Some(namespace) => return Err(TranslateError::UnknownNamespace { namespace: namespace.to_owned() }),
	})
}

fn build_children<'a>(children: &[TreeDescription], bump: &'a Bump, bindings: &mut BindingRegistry) -> Result<Node<'a, ThreadBound>, TranslateError> {
	let mut nodes = Vec::new();
	let mut index = 0;
	while index < children.len() {
		match &children[index] {
			TreeDescription::Tag(tag) if tag.key.is_some() => {
				// A run of consecutive keyed siblings becomes one
				// reorderable group. Reorder identities must be unique within
				// the run, so colliding keys are rejected here rather than
				// left to trap mid-update.
				let mut fragments = Vec::new();
				let mut seen = HashSet::new();
				while let Some(TreeDescription::Tag(tag)) = children.get(index) {
					let key = match &tag.key {
						Some(key) => key,
						None => break,
					};
					let dom_key = dom_key(key);
					if !seen.insert(dom_key) {
						return Err(TranslateError::KeyCollision { key: key.clone() });
					}
					fragments.push(ReorderableFragment {
						dom_key,
						content: build_tag(tag, bump, bindings)?,
					});
					index += 1;
				}
				nodes.push(Node::Keyed(bump.alloc_slice_copy(&fragments)));
			}
			child => {
				nodes.push(build_tree(child, bump, bindings)?);
				index += 1;
			}
		}
	}
	Ok(match nodes.as_slice() {
		[single] => *single,
		_ => Node::Multi(bump.alloc_slice_copy(&nodes)),
	})
}

/// Reorder identity for the patch engine; wire keys are free-form strings,
/// so they are hashed down to the fragment key space.
#[allow(clippy::cast_possible_truncation)]
fn dom_key(key: &str) -> u32 {
	let mut hasher = DefaultHasher::new();
	key.hash(&mut hasher);
	hasher.finish() as u32
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dispatch::ActionSink;
	use serde_json::json;
	use std::rc::Rc;

	struct NullSink;

	impl ActionSink for NullSink {
		fn send(&self, _message: &str) {}
	}

	fn registry() -> BindingRegistry {
		let mut registry = BindingRegistry::new(Rc::new(NullSink));
		registry.begin_update();
		registry
	}

	fn description(value: serde_json::Value) -> TreeDescription {
		serde_json::from_value(value).unwrap()
	}

	#[test]
	fn text_becomes_a_text_node() {
		let bump = Bump::new();
		let node = build_tree(&description(json!("hello")), &bump, &mut registry()).unwrap();
		assert!(matches!(node, Node::Text { text: "hello", .. }));
	}

	#[test]
	fn plain_properties_become_sorted_attributes() {
		let bump = Bump::new();
		let node = build_tree(
			&description(json!({
				"name": "input",
				"properties": { "type": "text", "id": "url" },
			})),
			&bump,
			&mut registry(),
		)
		.unwrap();
		let element = match node {
			Node::HtmlElement { element, .. } => element,
			other => panic!("expected an HTML element, got {:?}", other),
		};
		assert_eq!(element.name, "INPUT");
		assert_eq!(
			element.attributes,
			[Attribute { name: "id", value: "url" }, Attribute { name: "type", value: "text" }]
		);
		assert!(element.event_bindings.is_empty());
	}

	#[test]
	fn action_properties_become_event_bindings() {
		let bump = Bump::new();
		let node = build_tree(
			&description(json!({
				"name": "button",
				"properties": { "onclick": { "tag": "Increment" } },
				"children": ["increment"],
			})),
			&bump,
			&mut registry(),
		)
		.unwrap();
		let element = match node {
			Node::HtmlElement { element, .. } => element,
			other => panic!("expected an HTML element, got {:?}", other),
		};
		assert_eq!(element.event_bindings.len(), 1);
		assert_eq!(element.event_bindings[0].name, "click");
		assert!(matches!(element.content, Node::Text { text: "increment", .. }));
	}

	#[test]
	fn action_on_a_non_event_property_is_rejected() {
		let bump = Bump::new();
		let error = build_tree(
			&description(json!({
				"name": "button",
				"properties": { "class": { "tag": "Increment" } },
			})),
			&bump,
			&mut registry(),
		)
		.unwrap_err();
		assert!(matches!(error, TranslateError::ActionOnNonEvent { property } if property == "class"));
	}

	#[test]
	fn namespaces_select_the_element_kind() {
		let bump = Bump::new();
		let mut bindings = registry();
		let svg = build_tree(&description(json!({ "name": "svg", "namespace": "svg" })), &bump, &mut bindings).unwrap();
		assert!(matches!(svg, Node::SvgElement { .. }));
		let math = build_tree(&description(json!({ "name": "math", "namespace": "mathml" })), &bump, &mut bindings).unwrap();
		assert!(matches!(math, Node::MathMlElement { .. }));
		let error = build_tree(&description(json!({ "name": "div", "namespace": "xhtml" })), &bump, &mut bindings).unwrap_err();
		assert!(matches!(error, TranslateError::UnknownNamespace { namespace } if namespace == "xhtml"));
	}

	#[test]
	fn consecutive_keyed_children_form_a_reorderable_run() {
		let bump = Bump::new();
		let node = build_tree(
			&description(json!({
				"name": "ul",
				"children": [
					{ "name": "li", "key": "a" },
					{ "name": "li", "key": "b" },
					"trailing text",
				],
			})),
			&bump,
			&mut registry(),
		)
		.unwrap();
		let element = match node {
			Node::HtmlElement { element, .. } => element,
			other => panic!("expected an HTML element, got {:?}", other),
		};
		let children = match element.content {
			Node::Multi(children) => children,
			other => panic!("expected mixed children, got {:?}", other),
		};
		assert_eq!(children.len(), 2);
		match children[0] {
			Node::Keyed(fragments) => {
				assert_eq!(fragments.len(), 2);
				assert_ne!(fragments[0].dom_key, fragments[1].dom_key);
			}
			other => panic!("expected a keyed run, got {:?}", other),
		}
		assert!(matches!(children[1], Node::Text { .. }));
	}

	#[test]
	fn duplicate_sibling_keys_are_rejected() {
		let bump = Bump::new();
		let error = build_tree(
			&description(json!({
				"name": "ul",
				"children": [
					{ "name": "li", "key": "a" },
					{ "name": "li", "key": "a" },
				],
			})),
			&bump,
			&mut registry(),
		)
		.unwrap_err();
		assert!(matches!(error, TranslateError::KeyCollision { key } if key == "a"));
	}

	#[test]
	fn rebuilding_resolves_identical_callbacks() {
		let tree = description(json!({
			"name": "button",
			"properties": { "onclick": { "tag": "Increment" } },
		}));
		let mut bindings = registry();

		let bump_a = Bump::new();
		let first = build_tree(&tree, &bump_a, &mut bindings).unwrap();
		let bump_b = Bump::new();
		let second = build_tree(&tree, &bump_b, &mut bindings).unwrap();

		let callback = |node: &Node<'_, ThreadBound>| match *node {
			Node::HtmlElement { element, .. } => element.event_bindings[0].callback,
			_ => panic!("expected an HTML element"),
		};
		assert_eq!(callback(&first), callback(&second));
	}
}
