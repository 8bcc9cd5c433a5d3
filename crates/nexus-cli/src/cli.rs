//! Clap surface: one subcommand per §6.3 command, plus the global flag
//! set (`format`/`force`/`timeout_ms`/`verify`/`heal`/`app`) mirrored as
//! top-level `clap` args the same way a small binary derives its
//! socket/verbosity flags. CLI-only enums (`FocusArg`, `RoleArg`, ...)
//! exist because `nexus-proto`'s wire enums have no reason to depend on
//! `clap`; each has a trivial `From` into its wire counterpart.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use nexus_proto::{Command, FocusPreset, Format, MatchKind, Region, Request, Role};

#[derive(Parser, Debug)]
#[command(name = "nexus", about = "Local agent-facing eyes-and-hands daemon")]
pub struct Cli {
	#[command(subcommand)]
	pub command: TopCommand,
}

#[derive(Subcommand, Debug)]
pub enum TopCommand {
	/// Run the persistent daemon loop over stdin/stdout (spec §6.1).
	Daemon(DaemonArgs),
	/// Single-shot: send one request, print the response, exit with its
	/// `ok` status (spec §6.2).
	Run(RunArgs),
}

#[derive(clap::Args, Debug)]
pub struct DaemonArgs {
	/// Path to a TOML config file; defaults to `$XDG_CONFIG_HOME/nexus/config.toml`.
	#[arg(long, value_name = "PATH")]
	pub config: Option<PathBuf>,
	#[arg(short, long)]
	pub verbose: bool,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
	#[command(subcommand)]
	pub command: RunCommand,

	#[arg(long, value_enum, default_value = "compact")]
	pub format: FormatArg,
	#[arg(long)]
	pub force: bool,
	#[arg(long)]
	pub timeout_ms: Option<u64>,
	#[arg(long)]
	pub verify: bool,
	#[arg(long)]
	pub heal: bool,
	#[arg(long)]
	pub app: Option<String>,

	#[arg(long, value_name = "PATH")]
	pub config: Option<PathBuf>,
	#[arg(short, long)]
	pub verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum FormatArg {
	Json,
	Compact,
	Minimal,
}

impl From<FormatArg> for Format {
	fn from(f: FormatArg) -> Self {
		match f {
			FormatArg::Json => Format::Json,
			FormatArg::Compact => Format::Compact,
			FormatArg::Minimal => Format::Minimal,
		}
	}
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum FocusArg {
	Buttons,
	Inputs,
	Interactive,
	Errors,
	Dialogs,
	Navigation,
	Headings,
	Forms,
}

impl From<FocusArg> for FocusPreset {
	fn from(f: FocusArg) -> Self {
		match f {
			FocusArg::Buttons => FocusPreset::Buttons,
			FocusArg::Inputs => FocusPreset::Inputs,
			FocusArg::Interactive => FocusPreset::Interactive,
			FocusArg::Errors => FocusPreset::Errors,
			FocusArg::Dialogs => FocusPreset::Dialogs,
			FocusArg::Navigation => FocusPreset::Navigation,
			FocusArg::Headings => FocusPreset::Headings,
			FocusArg::Forms => FocusPreset::Forms,
		}
	}
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum RoleArg {
	Button,
	Edit,
	Link,
	MenuItem,
	CheckBox,
	RadioButton,
	ComboBox,
	Tab,
	List,
	ListItem,
	TreeItem,
	Dialog,
	Window,
	StaticText,
	Group,
	Heading,
	Other,
}

impl From<RoleArg> for Role {
	fn from(r: RoleArg) -> Self {
		match r {
			RoleArg::Button => Role::Button,
			RoleArg::Edit => Role::Edit,
			RoleArg::Link => Role::Link,
			RoleArg::MenuItem => Role::MenuItem,
			RoleArg::CheckBox => Role::CheckBox,
			RoleArg::RadioButton => Role::RadioButton,
			RoleArg::ComboBox => Role::ComboBox,
			RoleArg::Tab => Role::Tab,
			RoleArg::List => Role::List,
			RoleArg::ListItem => Role::ListItem,
			RoleArg::TreeItem => Role::TreeItem,
			RoleArg::Dialog => Role::Dialog,
			RoleArg::Window => Role::Window,
			RoleArg::StaticText => Role::StaticText,
			RoleArg::Group => Role::Group,
			RoleArg::Heading => Role::Heading,
			RoleArg::Other => Role::Other,
		}
	}
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum RegionBandArg {
	Top,
	Bottom,
	Left,
	Right,
	Center,
}

/// Parses `--region`: a named band keyword, or `x,y,w,h` for an explicit
/// rectangle (spec §4.3/§6.3: "named band or `x,y,w,h`").
fn parse_region(s: &str) -> Result<Region, String> {
	match s {
		"top" => Ok(Region::Top),
		"bottom" => Ok(Region::Bottom),
		"left" => Ok(Region::Left),
		"right" => Ok(Region::Right),
		"center" => Ok(Region::Center),
		explicit => {
			let parts: Vec<i32> = explicit
				.split(',')
				.map(|p| p.trim().parse::<i32>().map_err(|e| format!("invalid region component {p:?}: {e}")))
				.collect::<Result<_, _>>()?;
			let [x, y, w, h] = parts[..] else {
				return Err(format!("expected a band name or \"x,y,w,h\", got {explicit:?}"));
			};
			Ok(Region::Explicit { x, y, w, h })
		}
	}
}

/// Parses `--match`: `glob:<pattern>` or `regex:<pattern>`, defaulting to a
/// glob when no prefix is given.
fn parse_match(s: &str) -> Result<MatchKind, String> {
	if let Some(pattern) = s.strip_prefix("regex:") {
		Ok(MatchKind::Regex(pattern.to_string()))
	} else if let Some(pattern) = s.strip_prefix("glob:") {
		Ok(MatchKind::Glob(pattern.to_string()))
	} else {
		Ok(MatchKind::Glob(s.to_string()))
	}
}

#[derive(Subcommand, Debug)]
pub enum RunCommand {
	/// List the current window's elements, optionally diffed/summarized.
	Describe {
		#[arg(long, value_enum)]
		focus: Option<FocusArg>,
		#[arg(long = "match", value_parser = parse_match)]
		match_: Option<MatchKind>,
		#[arg(long, value_parser = parse_region)]
		region: Option<Region>,
		#[arg(long)]
		diff: bool,
		#[arg(long)]
		summary: bool,
	},
	/// Fuzzy-find elements by name.
	Find {
		query: String,
		#[arg(long, value_enum)]
		focus: Option<FocusArg>,
		#[arg(long, value_enum)]
		role: Option<RoleArg>,
		#[arg(long, value_parser = parse_region)]
		region: Option<Region>,
	},
	/// The currently focused element.
	Focused,
	/// Every known window, across backends.
	Windows,
	/// Screenshot the current window, optionally annotated with marks.
	Screenshot {
		#[arg(long, value_parser = parse_region)]
		region: Option<Region>,
		#[arg(long)]
		mark: bool,
	},
	Click { x: i32, y: i32 },
	DoubleClick { x: i32, y: i32 },
	RightClick { x: i32, y: i32 },
	Move { x: i32, y: i32 },
	Drag { x: i32, y: i32, to_x: i32, to_y: i32 },
	Scroll {
		#[arg(long)]
		x: Option<i32>,
		#[arg(long)]
		y: Option<i32>,
		ticks: i32,
	},
	TypeText { text: String },
	Key { combo: String },
	ClickElement {
		name: String,
		#[arg(long, value_enum)]
		role: Option<RoleArg>,
		#[arg(long)]
		index: Option<u32>,
	},
	ClickMark { n: u32 },
	WebDescribe,
	WebAx,
	WebFind { query: String },
	WebNavigate { url: String },
	WebClick { selector: String },
	WebInput { selector: String, text: String },
	/// Run a `;`/`|`-separated script through the Batch Controller.
	Batch {
		script: String,
		#[arg(long)]
		continue_on_error: bool,
		#[arg(long)]
		verbose: bool,
	},
	Ping,
	Quit,
}

impl RunArgs {
	/// Builds the wire [`Request`] this invocation describes (spec §6.2:
	/// "accepts the same fields as CLI flags").
	#[must_use]
	pub fn to_request(&self) -> Request {
		let command = match &self.command {
			RunCommand::Describe { focus, match_, region, diff, summary } => Command::Describe {
				focus: focus.map(Into::into),
				match_: match_.clone(),
				region: *region,
				diff: *diff,
				summary: *summary,
			},
			RunCommand::Find { query, focus, role, region } => {
				Command::Find { query: query.clone(), focus: focus.map(Into::into), role: role.map(Into::into), region: *region }
			}
			RunCommand::Focused => Command::Focused,
			RunCommand::Windows => Command::Windows,
			RunCommand::Screenshot { region, mark } => Command::Screenshot { region: *region, mark: *mark },
			RunCommand::Click { x, y } => Command::Click { x: *x, y: *y },
			RunCommand::DoubleClick { x, y } => Command::DoubleClick { x: *x, y: *y },
			RunCommand::RightClick { x, y } => Command::RightClick { x: *x, y: *y },
			RunCommand::Move { x, y } => Command::Move { x: *x, y: *y },
			RunCommand::Drag { x, y, to_x, to_y } => Command::Drag { x: *x, y: *y, to_x: *to_x, to_y: *to_y },
			RunCommand::Scroll { x, y, ticks } => Command::Scroll { x: *x, y: *y, ticks: *ticks },
			RunCommand::TypeText { text } => Command::TypeText { text: text.clone() },
			RunCommand::Key { combo } => Command::Key { combo: combo.clone() },
			RunCommand::ClickElement { name, role, index } => {
				Command::ClickElement { name: name.clone(), role: role.map(Into::into), index: *index }
			}
			RunCommand::ClickMark { n } => Command::ClickMark { n: *n },
			RunCommand::WebDescribe => Command::WebDescribe,
			RunCommand::WebAx => Command::WebAx,
			RunCommand::WebFind { query } => Command::WebFind { query: query.clone() },
			RunCommand::WebNavigate { url } => Command::WebNavigate { url: url.clone() },
			RunCommand::WebClick { selector } => Command::WebClick { selector: selector.clone() },
			RunCommand::WebInput { selector, text } => Command::WebInput { selector: selector.clone(), text: text.clone() },
			RunCommand::Batch { script, continue_on_error, verbose } => {
				Command::Batch { script: script.clone(), continue_on_error: *continue_on_error, verbose: *verbose }
			}
			RunCommand::Ping => Command::Ping,
			RunCommand::Quit => Command::Quit,
		};

		Request {
			command,
			format: self.format.into(),
			force: self.force,
			timeout_ms: self.timeout_ms,
			verify: self.verify,
			heal: self.heal,
			app: self.app.clone(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_region_accepts_named_band() {
		assert!(matches!(parse_region("top"), Ok(Region::Top)));
	}

	#[test]
	fn parse_region_accepts_explicit_rect() {
		let region = parse_region("10,20,300,40").unwrap();
		assert_eq!(region, Region::Explicit { x: 10, y: 20, w: 300, h: 40 });
	}

	#[test]
	fn parse_region_rejects_garbage() {
		assert!(parse_region("not-a-region").is_err());
	}

	#[test]
	fn parse_match_defaults_to_glob() {
		assert_eq!(parse_match("Save*").unwrap(), MatchKind::Glob("Save*".to_string()));
	}

	#[test]
	fn parse_match_honors_regex_prefix() {
		assert_eq!(parse_match("regex:^Save$").unwrap(), MatchKind::Regex("^Save$".to_string()));
	}

	#[test]
	fn run_args_to_request_carries_global_flags() {
		let args = RunArgs {
			command: RunCommand::Ping,
			format: FormatArg::Json,
			force: true,
			timeout_ms: Some(5000),
			verify: true,
			heal: false,
			app: Some("Notes".to_string()),
			config: None,
			verbose: false,
		};
		let request = args.to_request();
		assert!(matches!(request.command, Command::Ping));
		assert_eq!(request.format, Format::Json);
		assert!(request.force);
		assert_eq!(request.timeout_ms, Some(5000));
		assert_eq!(request.app.as_deref(), Some("Notes"));
	}
}
