//! The closed error taxonomy (spec §7).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of error kinds emitted in `status_error.kind`. Exhaustive by
/// design: callers match on this, they never see a free-form string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	BadRequest,
	TargetNotFound,
	AmbiguousMatch,
	TargetObscured,
	TargetNotReady,
	WindowNotFocused,
	BackendUnavailable,
	PageLoading,
	Timeout,
	PartialSuccess,
	InternalError,
}

/// `{kind, message, context, suggestions}` envelope (spec §7). `context`
/// always includes, where applicable: current window, current focused
/// element, top candidates (resolver errors), visible interactive elements
/// (obscured/not-found), and the last cached fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusError {
	pub kind: ErrorKind,
	pub message: String,
	#[serde(default, skip_serializing_if = "Value::is_null")]
	pub context: Value,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub suggestions: Vec<String>,
}

impl StatusError {
	#[must_use]
	pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
		Self {
			kind,
			message: message.into(),
			context: Value::Null,
			suggestions: Vec::new(),
		}
	}

	#[must_use]
	pub fn with_context(mut self, context: Value) -> Self {
		self.context = context;
		self
	}

	#[must_use]
	pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
		self.suggestions = suggestions;
		self
	}
}

impl std::fmt::Display for StatusError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:?}: {}", self.kind, self.message)
	}
}

impl std::error::Error for StatusError {}
