//! Daemon response envelope (spec §6.1).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StatusError;

/// `{ok, command, data, status_error?}` — always one line, embedded
/// newlines escaped by `serde_json` (spec §6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	pub ok: bool,
	pub command: String,
	#[serde(default)]
	pub data: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status_error: Option<StatusError>,
}

impl Response {
	#[must_use]
	pub fn ok(command: &str, data: Value) -> Self {
		Self {
			ok: true,
			command: command.to_string(),
			data,
			status_error: None,
		}
	}

	#[must_use]
	pub fn err(command: &str, error: StatusError) -> Self {
		Self {
			ok: false,
			command: command.to_string(),
			data: Value::Null,
			status_error: Some(error),
		}
	}

	/// Serializes to exactly one line of JSON (spec §6.1): no embedded
	/// newline survives, matching `serde_json`'s own escaping of `\n`
	/// inside string values, plus a defensive strip of any literal newline
	/// that could only arrive from a bug upstream.
	#[must_use]
	pub fn to_line(&self) -> String {
		let mut line = serde_json::to_string(self).unwrap_or_else(|e| {
			serde_json::to_string(&Response::err(
				&self.command,
				StatusError::new(
					crate::error::ErrorKind::InternalError,
					format!("failed to serialize response: {e}"),
				),
			))
			.expect("fallback error response is always serializable")
		});
		if line.contains('\n') {
			line = line.replace('\n', "\\n");
		}
		line
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::ErrorKind;

	#[test]
	fn to_line_never_embeds_newlines() {
		let resp = Response::ok("find", serde_json::json!({"note": "a\nb"}));
		assert!(!resp.to_line().contains('\n'));
	}

	#[test]
	fn err_response_carries_kind() {
		let resp = Response::err(
			"click_element",
			StatusError::new(ErrorKind::TargetNotFound, "no match"),
		);
		assert!(!resp.ok);
		assert_eq!(resp.status_error.unwrap().kind, ErrorKind::TargetNotFound);
	}
}
