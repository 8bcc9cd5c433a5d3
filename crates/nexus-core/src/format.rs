//! Rendering an element list as `json` / `compact` / `minimal` text (spec
//! §4.4). Pure: never touches a backend or the cache.

use nexus_proto::{Element, Format, Rect, Role};

const VALUE_TRUNCATE_LEN: usize = 40;

fn truncate_value(value: &str) -> String {
	if value.chars().count() <= VALUE_TRUNCATE_LEN {
		value.to_string()
	} else {
		let head: String = value.chars().take(VALUE_TRUNCATE_LEN).collect();
		format!("{head}…")
	}
}

fn format_compact_line(e: &Element) -> String {
	let mut line = format!(
		"[{}] {} | ({},{}) {}x{}",
		e.role.abbrev(),
		e.name,
		e.bounds.x,
		e.bounds.y,
		e.bounds.w,
		e.bounds.h
	);
	if e.is_focused() {
		line.push_str(" *focused*");
	}
	if e.flags.enabled == Some(false) {
		line.push_str(" *disabled*");
	}
	if let Some(value) = &e.value
		&& !value.is_empty()
	{
		line.push_str(&format!(" [val={}]", truncate_value(value)));
	}
	line
}

fn format_minimal_line(e: &Element) -> String {
	format!("{} {}", e.role.abbrev(), e.name)
}

/// Renders a normalized element list in the requested [`Format`].
///
/// # Errors
/// Returns an error only for [`Format::Json`], if serialization somehow
/// fails (it never does for well-formed [`Element`]s, but the fallible
/// `serde_json` signature is kept honest rather than `unwrap`ped away).
pub fn render(elements: &[Element], format: Format) -> Result<String, serde_json::Error> {
	Ok(match format {
		Format::Json => serde_json::to_string_pretty(elements)?,
		Format::Compact => elements.iter().map(format_compact_line).collect::<Vec<_>>().join("\n"),
		Format::Minimal => elements.iter().map(format_minimal_line).collect::<Vec<_>>().join("\n"),
	})
}

/// What a single `compact` line encodes, recovered by [`parse_compact_line`].
/// Deliberately narrower than [`nexus_proto::ElementFlags`]: `compact` only
/// ever marks `focused` and `disabled` (enabled=false), so that's all a
/// faithful parse can recover (spec §4.4: "bijectively parseable back to
/// (role, name, bounds, flags)" — the flags the format actually carries).
#[derive(Debug, Clone, PartialEq)]
pub struct CompactLine {
	pub role: Role,
	pub name: String,
	pub bounds: Rect,
	pub focused: bool,
	pub disabled: bool,
	pub value: Option<String>,
}

/// Inverse of [`format_compact_line`]. Returns `None` on malformed input
/// rather than an error type, since the only caller is test/debug tooling
/// that re-parses the daemon's own output.
#[must_use]
pub fn parse_compact_line(line: &str) -> Option<CompactLine> {
	let rest = line.strip_prefix('[')?;
	let (abbrev, rest) = rest.split_once("] ")?;
	let role = Role::from_abbrev(abbrev)?;

	let (name, rest) = rest.split_once(" | (")?;
	let (coords, rest) = rest.split_once(')')?;
	let (x_str, y_str) = coords.split_once(',')?;
	let x: i32 = x_str.parse().ok()?;
	let y: i32 = y_str.parse().ok()?;

	let rest = rest.strip_prefix(' ')?;
	let size_end = rest.find(|c: char| c != 'x' && !c.is_ascii_digit()).unwrap_or(rest.len());
	let (size, tail) = rest.split_at(size_end);
	let (w_str, h_str) = size.split_once('x')?;
	let w: i32 = w_str.parse().ok()?;
	let h: i32 = h_str.parse().ok()?;

	let focused = tail.contains("*focused*");
	let disabled = tail.contains("*disabled*");
	let value = tail.find("[val=").map(|start| {
		let after = &tail[start + "[val=".len()..];
		let end = after.rfind(']').unwrap_or(after.len());
		after[..end].to_string()
	});

	Some(CompactLine {
		role,
		name: name.to_string(),
		bounds: Rect { x, y, w, h },
		focused,
		disabled,
		value,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use nexus_proto::{Backend, ElementFlags};

	fn el() -> Element {
		Element {
			id: "ax_0".into(),
			role: Role::Edit,
			name: "Search box".into(),
			value: Some("hello world".into()),
			bounds: Rect { x: 12, y: 34, w: 200, h: 24 },
			flags: ElementFlags {
				enabled: Some(false),
				focused: Some(true),
				visible: Some(true),
				editable: Some(true),
			},
			parent_name: Some("Toolbar".into()),
			source: Backend::NativeAx,
		}
	}

	#[test]
	fn compact_line_round_trips() {
		let e = el();
		let line = format_compact_line(&e);
		let parsed = parse_compact_line(&line).expect("parses");
		assert_eq!(parsed.role, e.role);
		assert_eq!(parsed.name, e.name);
		assert_eq!(parsed.bounds, e.bounds);
		assert!(parsed.focused);
		assert!(parsed.disabled);
		assert_eq!(parsed.value.as_deref(), Some("hello world"));
	}

	#[test]
	fn compact_line_without_optional_flags_round_trips() {
		let mut e = el();
		e.flags = ElementFlags::default();
		e.value = None;
		let line = format_compact_line(&e);
		assert!(!line.contains('*'));
		let parsed = parse_compact_line(&line).unwrap();
		assert!(!parsed.focused);
		assert!(!parsed.disabled);
		assert_eq!(parsed.value, None);
	}

	#[test]
	fn long_value_is_truncated_with_ellipsis() {
		let mut e = el();
		e.value = Some("x".repeat(100));
		let line = format_compact_line(&e);
		assert!(line.contains('…'));
		assert!(!line.contains(&"x".repeat(100)));
	}

	#[test]
	fn minimal_uses_role_abbrev_and_name_only() {
		let e = el();
		assert_eq!(format_minimal_line(&e), "Edit Search box");
	}

	#[test]
	fn json_format_serializes_full_element_list() {
		let elements = vec![el()];
		let rendered = render(&elements, Format::Json).unwrap();
		let back: Vec<Element> = serde_json::from_str(&rendered).unwrap();
		assert_eq!(back, elements);
	}
}
