//! The per-connection message handler.
//!
//! A [`Session`] owns the only two pieces of state the client has: the
//! current tree description and the reconciler that mirrors it into the
//! page. It is written against the [`Reconciler`] trait rather than a
//! concrete differ, so the diffing algorithm stays a pluggable collaborator.

use crate::{
	error::{ClientError, TranslateError},
	wire::TreeDescription,
};
use tracing::{debug, instrument};

/// The delegated diff/patch collaborator.
///
/// `previous` is `None` exactly once per session: the first tree-bearing
/// message constructs and appends, every later one computes the minimal
/// update between the two renditions. Implementations must not touch the
/// rendering surface when they return `Err`.
pub trait Reconciler {
	fn reconcile(&mut self, previous: Option<&TreeDescription>, next: &TreeDescription) -> Result<(), TranslateError>;
}

/// Two-state view lifecycle. The very first message transitions from "no
/// tree" to "tree present"; every subsequent one stays in "tree present" via
/// diff-and-patch rather than full reconstruction.
#[derive(Debug)]
pub enum ViewState {
	Uninitialized,
	Initialized { tree: TreeDescription },
}

/// One socket connection's worth of message handling.
pub struct Session<R> {
	reconciler: R,
	state: ViewState,
}

impl<R: Reconciler> Session<R> {
	pub fn new(reconciler: R) -> Self {
		Self {
			reconciler,
			state: ViewState::Uninitialized,
		}
	}

	#[must_use]
	pub fn view_state(&self) -> &ViewState {
		&self.state
	}

	/// Processes one inbound message.
	///
	/// On `Err`, the recorded tree and the page content owned by the
	/// reconciler are untouched; the caller renders the failure and the
	/// session keeps processing further messages independently.
	#[instrument(skip(self, raw))]
	pub fn handle_message(&mut self, raw: &str) -> Result<(), ClientError> {
		let message: serde_json::Value = serde_json::from_str(raw).map_err(|source| ClientError::Parse {
			source,
			raw: raw.to_owned(),
		})?;

		let tree = match message.get("tree") {
			Some(tree) => tree.clone(),
			None => return Err(ClientError::MessageWithoutTree { message }),
		};
		let next: TreeDescription = serde_json::from_value(tree).map_err(|source| ClientError::Translate {
			source: TranslateError::Shape(source),
			raw: raw.to_owned(),
		})?;

		let previous = match &self.state {
			ViewState::Initialized { tree } => Some(tree),
			ViewState::Uninitialized => None,
		};
		debug!(initialized = previous.is_some(), depth = next.depth(), "reconciling inbound tree");
		self.reconciler.reconcile(previous, &next).map_err(|source| ClientError::Translate {
			source,
			raw: raw.to_owned(),
		})?;

		self.state = ViewState::Initialized { tree: next };
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Default)]
	struct RecordingReconciler {
		calls: Vec<(Option<TreeDescription>, TreeDescription)>,
		fail_with: Option<fn() -> TranslateError>,
	}

	impl Reconciler for RecordingReconciler {
		fn reconcile(&mut self, previous: Option<&TreeDescription>, next: &TreeDescription) -> Result<(), TranslateError> {
			if let Some(fail) = self.fail_with {
				return Err(fail());
			}
			self.calls.push((previous.cloned(), next.clone()));
			Ok(())
		}
	}

	fn text_tree(text: &str) -> TreeDescription {
		TreeDescription::Text(text.to_owned())
	}

	#[test]
	fn first_message_constructs_from_nothing() {
		let mut session = Session::new(RecordingReconciler::default());
		session.handle_message(r#"{"tree":"hello"}"#).unwrap();
		assert_eq!(session.reconciler.calls, [(None, text_tree("hello"))]);
		assert!(matches!(session.view_state(), ViewState::Initialized { .. }));
	}

	#[test]
	fn second_message_diffs_against_the_first() {
		let mut session = Session::new(RecordingReconciler::default());
		session.handle_message(r#"{"tree":"hello"}"#).unwrap();
		session.handle_message(r#"{"tree":"world"}"#).unwrap();
		assert_eq!(
			session.reconciler.calls,
			[(None, text_tree("hello")), (Some(text_tree("hello")), text_tree("world"))]
		);
	}

	#[test]
	fn identical_message_still_reconciles() {
		let mut session = Session::new(RecordingReconciler::default());
		session.handle_message(r#"{"tree":"hello"}"#).unwrap();
		session.handle_message(r#"{"tree":"hello"}"#).unwrap();
		assert_eq!(session.reconciler.calls[1], (Some(text_tree("hello")), text_tree("hello")));
	}

	#[test]
	fn malformed_json_leaves_state_unchanged() {
		let mut session = Session::new(RecordingReconciler::default());
		session.handle_message(r#"{"tree":"hello"}"#).unwrap();

		let error = session.handle_message("not json").unwrap_err();
		assert!(matches!(&error, ClientError::Parse { raw, .. } if raw == "not json"));
		match session.view_state() {
			ViewState::Initialized { tree } => assert_eq!(tree, &text_tree("hello")),
			ViewState::Uninitialized => panic!("state was reset by a malformed message"),
		}
		assert_eq!(session.reconciler.calls.len(), 1);
	}

	#[test]
	fn message_without_tree_is_reported_with_its_json() {
		let mut session = Session::new(RecordingReconciler::default());
		let error = session.handle_message(r#"{"foo":1}"#).unwrap_err();
		match error {
			ClientError::MessageWithoutTree { message } => assert_eq!(message, serde_json::json!({ "foo": 1 })),
			other => panic!("expected a structural mismatch, got {:?}", other),
		}
		assert!(matches!(session.view_state(), ViewState::Uninitialized));
	}

	#[test]
	fn non_object_payload_is_a_structural_mismatch() {
		let mut session = Session::new(RecordingReconciler::default());
		let error = session.handle_message("5").unwrap_err();
		assert!(matches!(error, ClientError::MessageWithoutTree { .. }));
	}

	#[test]
	fn present_but_untranslatable_tree_is_a_shape_mismatch() {
		// `"tree": false` names the property, so it is reported as a shape
		// failure rather than as a missing property.
		let mut session = Session::new(RecordingReconciler::default());
		let error = session.handle_message(r#"{"tree":false}"#).unwrap_err();
		assert!(matches!(error, ClientError::Translate { .. }));
		assert!(matches!(session.view_state(), ViewState::Uninitialized));
	}

	#[test]
	fn unshaped_tree_leaves_state_unchanged() {
		let mut session = Session::new(RecordingReconciler::default());
		session.handle_message(r#"{"tree":"hello"}"#).unwrap();

		let error = session.handle_message(r#"{"tree":{"children":[]}}"#).unwrap_err();
		assert!(matches!(error, ClientError::Translate { .. }));
		match session.view_state() {
			ViewState::Initialized { tree } => assert_eq!(tree, &text_tree("hello")),
			ViewState::Uninitialized => panic!("state was reset by an untranslatable tree"),
		}
	}

	#[test]
	fn failed_reconciliation_leaves_state_unchanged() {
		let mut session = Session::new(RecordingReconciler {
			calls: Vec::new(),
			fail_with: Some(|| TranslateError::UnknownNamespace { namespace: "xhtml".to_owned() }),
		});
		let error = session.handle_message(r#"{"tree":"hello"}"#).unwrap_err();
		assert!(matches!(error, ClientError::Translate { .. }));
		assert!(matches!(session.view_state(), ViewState::Uninitialized));
	}
}
