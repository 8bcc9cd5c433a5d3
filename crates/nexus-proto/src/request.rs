//! Daemon request envelope and command surface (spec §6.1, §6.3).

use serde::{Deserialize, Serialize};

use crate::element::Role;

/// `format` field (spec §6.3): how element listings are serialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
	Json,
	#[default]
	Compact,
	Minimal,
}

/// `focus` field: the closed set of focus presets (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusPreset {
	Buttons,
	Inputs,
	Interactive,
	Errors,
	Dialogs,
	Navigation,
	Headings,
	Forms,
}

/// `match` field: glob or regex over `name`, case-insensitive (spec §4.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "pattern")]
pub enum MatchKind {
	Glob(String),
	Regex(String),
}

/// `region` field: a named band of the containing window, or an explicit
/// pixel rectangle (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
	Top,
	Bottom,
	Left,
	Right,
	Center,
	Explicit { x: i32, y: i32, w: i32, h: i32 },
}

/// The command surface (spec §6.3). Tagged on the wire by the `command`
/// field; command-specific fields are flattened alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
	Describe {
		#[serde(default)]
		focus: Option<FocusPreset>,
		#[serde(default, rename = "match")]
		match_: Option<MatchKind>,
		#[serde(default)]
		region: Option<Region>,
		#[serde(default)]
		diff: bool,
		#[serde(default)]
		summary: bool,
	},
	Find {
		query: String,
		#[serde(default)]
		focus: Option<FocusPreset>,
		#[serde(default)]
		role: Option<Role>,
		#[serde(default)]
		region: Option<Region>,
	},
	Focused,
	Windows,
	Screenshot {
		#[serde(default)]
		region: Option<Region>,
		#[serde(default)]
		mark: bool,
	},
	Click {
		x: i32,
		y: i32,
	},
	DoubleClick {
		x: i32,
		y: i32,
	},
	RightClick {
		x: i32,
		y: i32,
	},
	Move {
		x: i32,
		y: i32,
	},
	Drag {
		x: i32,
		y: i32,
		to_x: i32,
		to_y: i32,
	},
	Scroll {
		#[serde(default)]
		x: Option<i32>,
		#[serde(default)]
		y: Option<i32>,
		ticks: i32,
	},
	TypeText {
		text: String,
	},
	Key {
		combo: String,
	},
	ClickElement {
		name: String,
		#[serde(default)]
		role: Option<Role>,
		#[serde(default)]
		index: Option<u32>,
	},
	ClickMark {
		n: u32,
	},
	WebDescribe,
	WebAx,
	WebFind {
		query: String,
	},
	WebNavigate {
		url: String,
	},
	WebClick {
		selector: String,
	},
	WebInput {
		selector: String,
		text: String,
	},
	Batch {
		script: String,
		#[serde(default)]
		continue_on_error: bool,
		#[serde(default)]
		verbose: bool,
	},
	Ping,
	Quit,
}

impl Command {
	/// The string name the wire protocol uses for `command` / echoed back in
	/// responses (spec §6.1).
	#[must_use]
	pub fn name(&self) -> &'static str {
		match self {
			Command::Describe { .. } => "describe",
			Command::Find { .. } => "find",
			Command::Focused => "focused",
			Command::Windows => "windows",
			Command::Screenshot { .. } => "screenshot",
			Command::Click { .. } => "click",
			Command::DoubleClick { .. } => "double_click",
			Command::RightClick { .. } => "right_click",
			Command::Move { .. } => "move",
			Command::Drag { .. } => "drag",
			Command::Scroll { .. } => "scroll",
			Command::TypeText { .. } => "type_text",
			Command::Key { .. } => "key",
			Command::ClickElement { .. } => "click_element",
			Command::ClickMark { .. } => "click_mark",
			Command::WebDescribe => "web_describe",
			Command::WebAx => "web_ax",
			Command::WebFind { .. } => "web_find",
			Command::WebNavigate { .. } => "web_navigate",
			Command::WebClick { .. } => "web_click",
			Command::WebInput { .. } => "web_input",
			Command::Batch { .. } => "batch",
			Command::Ping => "ping",
			Command::Quit => "quit",
		}
	}
}

/// A daemon request: one JSON object per line (spec §6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	#[serde(flatten)]
	pub command: Command,
	#[serde(default)]
	pub format: Format,
	#[serde(default)]
	pub force: bool,
	#[serde(default)]
	pub timeout_ms: Option<u64>,
	#[serde(default)]
	pub verify: bool,
	#[serde(default)]
	pub heal: bool,
	#[serde(default)]
	pub app: Option<String>,
}

impl Request {
	#[must_use]
	pub fn new(command: Command) -> Self {
		Self {
			command,
			format: Format::default(),
			force: false,
			timeout_ms: None,
			verify: false,
			heal: false,
			app: None,
		}
	}

	/// Per-command watchdog timeout, defaulting to 15s (spec §4.11).
	#[must_use]
	pub fn effective_timeout_ms(&self) -> u64 {
		self.timeout_ms.unwrap_or(15_000)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn describe_round_trips_through_json() {
		let req = Request::new(Command::Describe {
			focus: Some(FocusPreset::Buttons),
			match_: None,
			region: None,
			diff: true,
			summary: false,
		});
		let text = serde_json::to_string(&req).unwrap();
		let back: Request = serde_json::from_str(&text).unwrap();
		assert_eq!(back.command.name(), "describe");
	}

	#[test]
	fn click_element_parses_from_minimal_json() {
		let text = r#"{"command":"click_element","name":"Save","verify":true}"#;
		let req: Request = serde_json::from_str(text).unwrap();
		match req.command {
			Command::ClickElement { name, role, index } => {
				assert_eq!(name, "Save");
				assert_eq!(role, None);
				assert_eq!(index, None);
			}
			other => panic!("unexpected command: {other:?}"),
		}
		assert!(req.verify);
	}

	#[test]
	fn unknown_command_is_bad_request_shaped_error() {
		let text = r#"{"command":"frobnicate"}"#;
		let result: Result<Request, _> = serde_json::from_str(text);
		assert!(result.is_err());
	}
}
