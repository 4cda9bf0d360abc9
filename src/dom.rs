//! The production [`Reconciler`]: the [`DomPatcher`] driving the mount
//! element's child nodes.
//!
//! No reconciliation logic lives here. Both renditions of the page are
//! translated first, so a bad tree is rejected before the DOM is touched,
//! and the patcher then computes and applies the minimal update itself.

use crate::{
	bindings::BindingRegistry,
	bridge,
	dispatch::ActionSink,
	error::TranslateError,
	patch::DomPatcher,
	session::Reconciler,
	wire::TreeDescription,
};
use bumpalo::Bump;
use std::rc::Rc;
use tracing::{info, instrument};

pub struct DomReconciler {
	patcher: DomPatcher,
	bindings: BindingRegistry,
}

impl DomReconciler {
	/// Attaches to `mount`'s child nodes. Dispatched actions leave through
	/// `sink`.
	#[must_use]
	pub fn new(mount: web_sys::Element, sink: Rc<dyn ActionSink>) -> Self {
		Self {
			patcher: DomPatcher::new_for_element_child_nodes(mount),
			bindings: BindingRegistry::new(sink),
		}
	}
}

impl Reconciler for DomReconciler {
	#[instrument(skip(self, previous, next))]
	fn reconcile(&mut self, previous: Option<&TreeDescription>, next: &TreeDescription) -> Result<(), TranslateError> {
		let bump = Bump::new();

		self.bindings.begin_update();
		let next_root = bridge::build_tree(next, &bump, &mut self.bindings)?;
		let previous_root = match previous {
			Some(previous) => Some(bridge::build_tree(previous, &bump, &mut self.bindings)?),
			None => None,
		};

		// The patcher recurses roughly twice per nesting level (element and
		// child list), so the wire depth bounds its limit.
		let depth_limit = 2 * next.depth().max(previous.map_or(0, TreeDescription::depth)) + 2;
		match previous_root {
			Some(previous_root) => self.patcher.update_child_nodes(&[previous_root], &[next_root], depth_limit),
			None => self.patcher.update_child_nodes(&[], &[next_root], depth_limit),
		}

		self.bindings.sweep();
		info!("Action binding count: {}", self.bindings.len());
		Ok(())
	}
}
