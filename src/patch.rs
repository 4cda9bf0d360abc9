//! The DOM patch engine: applies the difference between two `lignin` node
//! graphs to a live element's child nodes.
//!
//! Event listeners are attached through one shared handler closure that is
//! bound per [`CallbackRef`] and reference-counted, so a callback used by
//! several bindings owns exactly one JavaScript function and removal always
//! passes the function that was originally added.
//!
//! DOM access never panics over page interference: a live node that does not
//! match the recorded graph is logged and recreated.

use core::{convert::TryInto, slice};
use hashbrown::HashMap;
use js_sys::Function;
use lignin::{CallbackRef, EventBinding, ReorderableFragment, ThreadBound};
use tracing::{error, trace};
use wasm_bindgen::{closure::Closure, JsCast, JsValue, UnwrapThrowExt};

struct ListenerHandle {
	function: Function,
	uses: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ElementKind {
	Html,
	Svg,
	MathMl,
}

impl ElementKind {
	fn namespace(self) -> Option<&'static str> {
		match self {
			Self::Html => None,
			Self::Svg => Some("http://www.w3.org/2000/svg"),
			Self::MathMl => Some("http://www.w3.org/1998/Math/MathML"),
		}
	}
}

/// Attached to one [`web_sys::Element`], patches its child nodes in place.
#[allow(clippy::type_complexity)]
pub struct DomPatcher {
	mount: web_sys::Element,
	common_handler: Closure<dyn Fn(JsValue, web_sys::Event)>,
	listeners: HashMap<CallbackRef<ThreadBound, fn(lignin::web::Event)>, ListenerHandle>,
}

impl DomPatcher {
	#[must_use]
	pub fn new_for_element_child_nodes(mount: web_sys::Element) -> Self {
		Self {
			mount,
			common_handler: Closure::wrap(Box::new(|callback_ref: JsValue, event: web_sys::Event| {
				let callback_ref = unsafe { CallbackRef::<ThreadBound, fn(lignin::web::Event)>::from_js(&callback_ref) }
					.expect_throw("lignin-remote: Invalid `CallbackRef` handle in an event listener.");
				callback_ref.call(event.into());
			})),
			listeners: HashMap::new(),
		}
	}

	/// Splices the mount's child nodes from the state recorded as `previous`
	/// into `next`.
	///
	/// `previous` must describe what the last call left behind (or be empty
	/// for the first call); the live tree is only inspected to detect outside
	/// interference.
	pub fn update_child_nodes(&mut self, previous: &[lignin::Node<'_, ThreadBound>], next: &[lignin::Node<'_, ThreadBound>], depth_limit: usize) {
		let mount = self.mount.clone();
		let document = match mount.owner_document() {
			Some(document) => document,
			None => return error!("No owner document for the mount element."),
		};
		let mut index = 0;
		self.splice(&document, previous, next, &mount, &mount.child_nodes(), &mut index, depth_limit);
		debug_assert_eq!(index, TryInto::<u32>::try_into(lignin::Node::Multi(next).dom_len()).unwrap_throw());
		trace!("Live listener count: {}", self.listeners.len());
	}

	#[allow(clippy::too_many_arguments)]
	fn splice(
		&mut self,
		document: &web_sys::Document,
		mut previous: &[lignin::Node<'_, ThreadBound>],
		mut next: &[lignin::Node<'_, ThreadBound>],
		parent: &web_sys::Element,
		dom_slice: &web_sys::NodeList,
		index: &mut u32,
		depth_limit: usize,
	) {
		if depth_limit == 0 {
			return error!("Depth limit reached.");
		}

		while !previous.is_empty() && !next.is_empty() {
			*index += match (previous[0], next[0]) {
				(lignin::Node::Text { text: p_text, .. }, lignin::Node::Text { text: n_text, .. }) => {
					match dom_slice.get(*index).and_then(|node| node.dyn_into::<web_sys::Text>().ok()) {
						Some(live) => {
							if p_text != n_text {
								live.set_data(n_text);
							}
							1
						}
						None => {
							error!("Expected a live text node; recreating it.");
							self.replace(document, previous[0], next[0], parent, dom_slice, index, depth_limit);
							0
						}
					}
				}

				(lignin::Node::Multi(p_nodes), lignin::Node::Multi(n_nodes)) => {
					if !p_nodes.is_empty() || !n_nodes.is_empty() {
						self.splice(document, p_nodes, n_nodes, parent, dom_slice, index, depth_limit - 1);
					}
					0
				}

				(lignin::Node::Keyed(p_fragments), lignin::Node::Keyed(n_fragments)) => {
					self.reorder_keyed(document, p_fragments, n_fragments, parent, dom_slice, index, depth_limit - 1);
					0
				}

				(previous_node, next_node) => match (element_parts(previous_node), element_parts(next_node)) {
					(Some((p_kind, p_element)), Some((n_kind, n_element)))
						if p_kind == n_kind && p_element.name == n_element.name && p_element.creation_options == n_element.creation_options =>
					{
						match dom_slice.get(*index).and_then(|node| node.dyn_into::<web_sys::Element>().ok()) {
							Some(live) if live.tag_name() == p_element.name => {
								self.update_element(document, p_element, n_element, &live, depth_limit);
								1
							}
							_ => {
								error!("Expected a live <{}>; recreating the element.", p_element.name);
								self.replace(document, previous_node, next_node, parent, dom_slice, index, depth_limit);
								0
							}
						}
					}
					_ => {
						self.replace(document, previous_node, next_node, parent, dom_slice, index, depth_limit);
						0
					}
				},
			};
			previous = &previous[1..];
			next = &next[1..];
		}

		if !previous.is_empty() {
			self.remove_list(previous, parent, dom_slice, index, depth_limit);
		}
		if !next.is_empty() {
			let anchor = dom_slice.get(*index);
			self.create_list(document, next, parent, anchor.as_ref(), index, depth_limit);
		}
	}

	#[allow(clippy::too_many_arguments)]
	fn replace(
		&mut self,
		document: &web_sys::Document,
		replaced: lignin::Node<'_, ThreadBound>,
		replacement: lignin::Node<'_, ThreadBound>,
		parent: &web_sys::Element,
		dom_slice: &web_sys::NodeList,
		index: &mut u32,
		depth_limit: usize,
	) {
		self.remove_list(slice::from_ref(&replaced), parent, dom_slice, index, depth_limit);
		let anchor = dom_slice.get(*index);
		self.create_list(document, slice::from_ref(&replacement), parent, anchor.as_ref(), index, depth_limit);
	}

	/// Reconciles a run of keyed fragments, moving surviving fragments' live
	/// nodes into their new positions instead of rebuilding them.
	#[allow(clippy::too_many_arguments)]
	fn reorder_keyed(
		&mut self,
		document: &web_sys::Document,
		previous: &[ReorderableFragment<'_, ThreadBound>],
		next: &[ReorderableFragment<'_, ThreadBound>],
		parent: &web_sys::Element,
		dom_slice: &web_sys::NodeList,
		index: &mut u32,
		depth_limit: usize,
	) {
		if depth_limit == 0 {
			return error!("Depth limit reached.");
		}

		// Snapshot which live nodes each prior fragment owns before anything
		// moves.
		let mut detached: HashMap<u32, (usize, Vec<web_sys::Node>)> = HashMap::with_capacity(previous.len());
		let mut cursor = *index;
		for (position, fragment) in previous.iter().enumerate() {
			let length: u32 = fragment.content.dom_len().try_into().unwrap_throw();
			let mut nodes = Vec::with_capacity(length as usize);
			for offset in 0..length {
				match dom_slice.get(cursor + offset) {
					Some(node) => nodes.push(node),
					None => error!("Keyed fragment {} reaches beyond the end of the live child list.", fragment.dom_key),
				}
			}
			cursor += length;
			if detached.insert(fragment.dom_key, (position, nodes)).is_some() {
				error!("Duplicate key {} in a keyed run.", fragment.dom_key);
			}
		}

		for fragment in next {
			match detached.remove(&fragment.dom_key) {
				Some((position, nodes)) => {
					if nodes.first() != dom_slice.get(*index).as_ref() {
						let anchor = dom_slice.get(*index);
						for node in &nodes {
							if let Err(error) = parent.insert_before(node, anchor.as_ref()) {
								error!("Failed to move a keyed fragment: {:?}", error);
							}
						}
					}
					self.splice(
						document,
						slice::from_ref(&previous[position].content),
						slice::from_ref(&fragment.content),
						parent,
						dom_slice,
						index,
						depth_limit,
					);
				}
				None => {
					let anchor = dom_slice.get(*index);
					self.create_list(document, slice::from_ref(&fragment.content), parent, anchor.as_ref(), index, depth_limit);
				}
			}
		}

		for (_, (position, nodes)) in detached {
			self.release_listeners(&previous[position].content, depth_limit);
			for node in nodes {
				if let Err(error) = parent.remove_child(&node) {
					error!("Failed to remove a keyed fragment: {:?}", error);
				}
			}
		}
	}

	fn create_list(
		&mut self,
		document: &web_sys::Document,
		nodes: &[lignin::Node<'_, ThreadBound>],
		parent: &web_sys::Element,
		anchor: Option<&web_sys::Node>,
		index: &mut u32,
		depth_limit: usize,
	) {
		if depth_limit == 0 {
			return error!("Depth limit reached.");
		}
		for node in nodes {
			match *node {
				lignin::Node::Text { text, .. } => {
					let live = document.create_text_node(text);
					if let Err(error) = parent.insert_before(live.as_ref(), anchor) {
						error!("Failed to insert a text node: {:?}", error);
					} else {
						*index += 1;
					}
				}
				lignin::Node::Multi(nodes) => self.create_list(document, nodes, parent, anchor, index, depth_limit - 1),
				lignin::Node::Keyed(fragments) => {
					for fragment in fragments {
						self.create_list(document, slice::from_ref(&fragment.content), parent, anchor, index, depth_limit - 1);
					}
				}
				node => match element_parts(node) {
					Some((kind, element)) => self.create_element(document, kind, element, parent, anchor, index, depth_limit),
					None => error!("Unsupported node in this client: {:?}", node),
				},
			}
		}
	}

	#[allow(clippy::too_many_arguments)]
	fn create_element(
		&mut self,
		document: &web_sys::Document,
		kind: ElementKind,
		element: &lignin::Element<'_, ThreadBound>,
		parent: &web_sys::Element,
		anchor: Option<&web_sys::Node>,
		index: &mut u32,
		depth_limit: usize,
	) {
		let created = match (kind.namespace(), element.creation_options.is()) {
			(None, None) => document.create_element(element.name),
			(None, Some(is)) => document.create_element_with_str(element.name, is),
			(namespace @ Some(_), None) => document.create_element_ns(namespace, element.name),
			(namespace @ Some(_), Some(is)) => document.create_element_ns_with_str(namespace, element.name, is),
		};
		let created = match created {
			Ok(created) => created,
			Err(error) => return error!("Failed to create <{}>: {:?}", element.name, error),
		};

		for attribute in element.attributes {
			if let Err(error) = created.set_attribute(attribute.name, attribute.value) {
				error!("Failed to set attribute {:?}: {:?}", attribute.name, error);
			}
		}
		for binding in element.event_bindings {
			self.add_event_listener(&created, *binding);
		}
		self.create_list(document, slice::from_ref(&element.content), &created, None, &mut 0, depth_limit - 1);

		if let Err(error) = parent.insert_before(created.as_ref(), anchor) {
			return error!("Failed to insert <{}>: {:?}", element.name, error);
		}
		*index += 1;
	}

	/// Removes the live nodes for `previous` at `index`, releasing the
	/// subtrees' listener handles. `index` is left unchanged since removal
	/// shifts the remaining children down.
	fn remove_list(&mut self, previous: &[lignin::Node<'_, ThreadBound>], parent: &web_sys::Element, dom_slice: &web_sys::NodeList, index: &mut u32, depth_limit: usize) {
		if depth_limit == 0 {
			return error!("Depth limit reached.");
		}
		for node in previous {
			match *node {
				lignin::Node::Multi(nodes) => self.remove_list(nodes, parent, dom_slice, index, depth_limit - 1),
				lignin::Node::Keyed(fragments) => {
					for fragment in fragments {
						self.remove_list(slice::from_ref(&fragment.content), parent, dom_slice, index, depth_limit - 1);
					}
				}
				node => {
					self.release_listeners(&node, depth_limit);
					match dom_slice.get(*index) {
						Some(live) => {
							if let Err(error) = parent.remove_child(&live) {
								error!("Failed to remove a node: {:?}", error);
							}
						}
						None => error!("Expected a node to remove beyond the end of the live child list."),
					}
				}
			}
		}
	}

	fn update_element(&mut self, document: &web_sys::Document, previous: &lignin::Element<'_, ThreadBound>, next: &lignin::Element<'_, ThreadBound>, live: &web_sys::Element, depth_limit: usize) {
		debug_assert_eq!(previous.name, next.name);

		let (mut p_attributes, mut n_attributes) = (previous.attributes, next.attributes);
		while !p_attributes.is_empty() && p_attributes.first() == n_attributes.first() {
			p_attributes = &p_attributes[1..];
			n_attributes = &n_attributes[1..];
		}
		while !p_attributes.is_empty() && p_attributes.last() == n_attributes.last() {
			p_attributes = &p_attributes[..p_attributes.len() - 1];
			n_attributes = &n_attributes[..n_attributes.len() - 1];
		}
		for removed in p_attributes {
			if let Err(error) = live.remove_attribute(removed.name) {
				error!("Failed to remove attribute {:?}: {:?}", removed.name, error);
			}
		}
		for added in n_attributes {
			if let Err(error) = live.set_attribute(added.name, added.value) {
				error!("Failed to set attribute {:?}: {:?}", added.name, error);
			}
		}

		let (mut p_bindings, mut n_bindings) = (previous.event_bindings, next.event_bindings);
		while !p_bindings.is_empty() && p_bindings.first() == n_bindings.first() {
			p_bindings = &p_bindings[1..];
			n_bindings = &n_bindings[1..];
		}
		while !p_bindings.is_empty() && p_bindings.last() == n_bindings.last() {
			p_bindings = &p_bindings[..p_bindings.len() - 1];
			n_bindings = &n_bindings[..n_bindings.len() - 1];
		}
		for removed in p_bindings {
			self.remove_event_listener(live, removed);
		}
		for added in n_bindings {
			self.add_event_listener(live, *added);
		}

		self.splice(document, slice::from_ref(&previous.content), slice::from_ref(&next.content), live, &live.child_nodes(), &mut 0, depth_limit - 1);
	}

	fn add_event_listener(&mut self, element: &web_sys::Element, binding: EventBinding<'_, ThreadBound>) {
		let common_handler = &self.common_handler;
		let handle = self.listeners.entry(binding.callback).or_insert_with(|| ListenerHandle {
			function: common_handler.as_ref().unchecked_ref::<Function>().bind1(&JsValue::UNDEFINED, &binding.callback.into_js()),
			uses: 0,
		});
		handle.uses += 1;
		let mut options = web_sys::AddEventListenerOptions::new();
		options.capture(binding.options.capture()).once(binding.options.once()).passive(binding.options.passive());
		if let Err(error) = element.add_event_listener_with_callback_and_add_event_listener_options(binding.name, &handle.function, &options) {
			error!("Failed to add event listener {:?}: {:?}", binding.name, error);
		}
	}

	fn remove_event_listener(&mut self, element: &web_sys::Element, binding: &EventBinding<'_, ThreadBound>) {
		let handle = match self.listeners.get_mut(&binding.callback) {
			Some(handle) => handle,
			None => return error!("Removed an unknown event listener {:?}.", binding.name),
		};
		if let Err(error) = element.remove_event_listener_with_callback_and_bool(binding.name, &handle.function, binding.options.capture()) {
			error!("Failed to remove event listener {:?}: {:?}", binding.name, error);
		}
		handle.uses -= 1;
		if handle.uses == 0 {
			self.listeners.remove(&binding.callback);
		}
	}

	/// Releases the listener handles of a subtree whose live nodes are being
	/// discarded. The nodes leave the document with their listeners attached;
	/// only the shared function handles are reference-counted down.
	fn release_listeners(&mut self, node: &lignin::Node<'_, ThreadBound>, depth_limit: usize) {
		if depth_limit == 0 {
			return error!("Depth limit reached.");
		}
		match *node {
			lignin::Node::Multi(nodes) => {
				for node in nodes {
					self.release_listeners(node, depth_limit - 1);
				}
			}
			lignin::Node::Keyed(fragments) => {
				for fragment in fragments {
					self.release_listeners(&fragment.content, depth_limit - 1);
				}
			}
			node => {
				if let Some((_, element)) = element_parts(node) {
					for binding in element.event_bindings {
						self.release_listener(binding.callback);
					}
					self.release_listeners(&element.content, depth_limit - 1);
				}
			}
		}
	}

	fn release_listener(&mut self, callback: CallbackRef<ThreadBound, fn(lignin::web::Event)>) {
		match self.listeners.get_mut(&callback) {
			Some(handle) => {
				handle.uses -= 1;
				if handle.uses == 0 {
					self.listeners.remove(&callback);
				}
			}
			None => error!("Released an unknown event listener handle."),
		}
	}
}

fn element_parts<'a>(node: lignin::Node<'a, ThreadBound>) -> Option<(ElementKind, &'a lignin::Element<'a, ThreadBound>)> {
	match node {
		lignin::Node::HtmlElement { element, .. } => Some((ElementKind::Html, element)),
		lignin::Node::SvgElement { element, .. } => Some((ElementKind::Svg, element)),
		lignin::Node::MathMlElement { element, .. } => Some((ElementKind::MathMl, element)),
		_ => None,
	}
}
