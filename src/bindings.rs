//! Reference-kept action bindings.
//!
//! Every action a tree binds to a DOM event needs a live
//! [`CallbackRegistration`] for as long as some rendition of the tree can
//! still fire it. Bindings are keyed by (event name, canonical action JSON),
//! so rebuilding an unchanged tree resolves to the *same* callback and the
//! differ sees an unchanged event binding instead of a remove/add pair.
//!
//! Bindings are swept by generation: an update marks everything it resolves,
//! and [`BindingRegistry::sweep`] afterwards releases whatever no current
//! rendition uses any more. The corresponding DOM listeners are removed by
//! the differ itself; the sweep only ends the callbacks' registrations.

use crate::{
	dispatch::{ActionContext, ActionSink},
	wire::ActionDescriptor,
};
use hashbrown::HashMap;
use lignin::{web::Event, CallbackRef, CallbackRegistration, ThreadBound};
use std::{pin::Pin, rc::Rc};
use tracing::trace;
use wasm_bindgen::UnwrapThrowExt;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct BindingKey {
	event: String,
	action: String,
}

struct ActionBinding {
	// Field order matters: the registration is dropped before the pinned
	// context its receiver pointer refers to.
	registration: CallbackRegistration<ActionContext, fn(Event)>,
	#[allow(dead_code)]
	context: Pin<Box<ActionContext>>,
	last_used: u64,
}

/// All live action bindings of one connection.
pub struct BindingRegistry {
	sink: Rc<dyn ActionSink>,
	bindings: HashMap<BindingKey, ActionBinding>,
	generation: u64,
}

impl BindingRegistry {
	#[must_use]
	pub fn new(sink: Rc<dyn ActionSink>) -> Self {
		Self {
			sink,
			bindings: HashMap::new(),
			generation: 0,
		}
	}

	/// Starts a new update generation. Bindings resolved through
	/// [`Self::acquire`] from here on survive the next [`Self::sweep`].
	pub fn begin_update(&mut self) {
		self.generation += 1;
	}

	/// The callback for `action` bound to the DOM event `event`, creating
	/// and registering it on first use.
	pub fn acquire(&mut self, event: &str, action: &ActionDescriptor) -> CallbackRef<ThreadBound, fn(Event)> {
		let key = BindingKey {
			event: event.to_owned(),
			action: serde_json::to_string(action).expect_throw("lignin-remote: Failed to canonicalize an action descriptor."),
		};
		let generation = self.generation;
		let sink = Rc::clone(&self.sink);
		let binding = self.bindings.entry(key).or_insert_with(|| {
			trace!("Registering action binding for {:?}.", event);
			let context = Box::pin(ActionContext::new(action.clone(), sink));
			let registration = CallbackRegistration::<_, fn(Event)>::new(context.as_ref(), ActionContext::handle);
			ActionBinding {
				registration,
				context,
				last_used: generation,
			}
		});
		binding.last_used = generation;
		binding.registration.to_ref_thread_bound()
	}

	/// Releases every binding the current generation did not resolve.
	pub fn sweep(&mut self) {
		let generation = self.generation;
		let before = self.bindings.len();
		self.bindings.retain(|_, binding| binding.last_used == generation);
		trace!("Released {} action binding(s).", before - self.bindings.len());
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.bindings.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.bindings.is_empty()
	}
}
