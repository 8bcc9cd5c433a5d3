//! Focus-preset, name-pattern and spatial filtering (spec §4.3).
//!
//! Filters combine by logical AND. Backends that can apply a condition
//! natively during traversal (Native-AX, Browser-AX) are free to do so —
//! the functions here are the post-traversal fallback and, by construction,
//! produce the exact same observable result either way, since a preset is
//! just data describing a predicate over `(role, name)`.

use globset::Glob;
use nexus_proto::{Element, FocusPreset, MatchKind, Region, Rect, Role};
use regex::Regex;
use thiserror::Error;

/// Malformed `match` pattern, surfaced by the daemon as `bad_request`
/// (spec §7).
#[derive(Debug, Error)]
pub enum FilterError {
	#[error("invalid glob pattern: {0}")]
	Glob(String),
	#[error("invalid regex pattern: {0}")]
	Regex(String),
}

/// A focus preset resolved into the role set and/or name regex it stands
/// for. Presets are data, not code, so they can be retargeted for
/// localization (spec §4.3).
pub struct PresetRule {
	pub roles: Option<&'static [Role]>,
	pub name_pattern: Option<Regex>,
}

/// Expands a [`FocusPreset`] into its rule. Built fresh per call since
/// `Regex` isn't `Copy`; callers filtering many elements should build once
/// and reuse via [`Filter`].
#[must_use]
pub fn preset_rule(preset: FocusPreset) -> PresetRule {
	const ERROR_WORDS: &str = r"(?i)error|warning|alert";

	match preset {
		FocusPreset::Buttons => PresetRule {
			roles: Some(&[Role::Button]),
			name_pattern: None,
		},
		FocusPreset::Inputs => PresetRule {
			roles: Some(&[Role::Edit, Role::ComboBox]),
			name_pattern: None,
		},
		FocusPreset::Interactive => PresetRule {
			roles: Some(&[
				Role::Button,
				Role::Edit,
				Role::Link,
				Role::MenuItem,
				Role::CheckBox,
				Role::RadioButton,
				Role::ComboBox,
				Role::Tab,
				Role::ListItem,
				Role::TreeItem,
			]),
			name_pattern: None,
		},
		FocusPreset::Errors => PresetRule {
			roles: None,
			name_pattern: Some(Regex::new(ERROR_WORDS).expect("static pattern compiles")),
		},
		FocusPreset::Dialogs => PresetRule {
			roles: Some(&[Role::Dialog]),
			name_pattern: None,
		},
		FocusPreset::Navigation => PresetRule {
			roles: Some(&[Role::Link, Role::Tab, Role::MenuItem]),
			name_pattern: None,
		},
		FocusPreset::Headings => PresetRule {
			roles: Some(&[Role::Heading]),
			name_pattern: None,
		},
		FocusPreset::Forms => PresetRule {
			roles: Some(&[
				Role::Edit,
				Role::ComboBox,
				Role::CheckBox,
				Role::RadioButton,
				Role::Button,
			]),
			name_pattern: None,
		},
	}
}

impl PresetRule {
	fn matches(&self, element: &Element) -> bool {
		let role_ok = self.roles.is_none_or(|roles| roles.contains(&element.role));
		let name_ok = self
			.name_pattern
			.as_ref()
			.is_none_or(|re| re.is_match(&element.name) || re.is_match(element.role.abbrev()));
		role_ok && name_ok
	}
}

enum CompiledMatch {
	Glob(globset::GlobMatcher),
	Regex(Regex),
}

impl CompiledMatch {
	fn compile(kind: &MatchKind) -> Result<Self, FilterError> {
		match kind {
			MatchKind::Glob(pattern) => Glob::new(&pattern.to_lowercase())
				.map(|g| CompiledMatch::Glob(g.compile_matcher()))
				.map_err(|e| FilterError::Glob(e.to_string())),
			MatchKind::Regex(pattern) => Regex::new(&format!("(?i){pattern}"))
				.map(CompiledMatch::Regex)
				.map_err(|e| FilterError::Regex(e.to_string())),
		}
	}

	fn matches(&self, name: &str) -> bool {
		match self {
			CompiledMatch::Glob(m) => m.is_match(name.to_lowercase()),
			CompiledMatch::Regex(re) => re.is_match(name),
		}
	}
}

fn region_rect(region: Region, window: Rect) -> Rect {
	let (fx, fy, fw, fh) = match region {
		Region::Top => (0.0, 0.0, 1.0, 1.0 / 3.0),
		Region::Bottom => (0.0, 2.0 / 3.0, 1.0, 1.0 / 3.0),
		Region::Left => (0.0, 0.0, 1.0 / 3.0, 1.0),
		Region::Right => (2.0 / 3.0, 0.0, 1.0 / 3.0, 1.0),
		Region::Center => (1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0),
		Region::Explicit { x, y, w, h } => return Rect { x, y, w, h },
	};
	Rect {
		x: window.x + (f64::from(window.w) * fx) as i32,
		y: window.y + (f64::from(window.h) * fy) as i32,
		w: (f64::from(window.w) * fw) as i32,
		h: (f64::from(window.h) * fh) as i32,
	}
}

fn rect_contains_point(rect: Rect, x: i32, y: i32) -> bool {
	x >= rect.x && x < rect.x + rect.w && y >= rect.y && y < rect.y + rect.h
}

/// A compiled, reusable combination of filters (spec §4.3: "filters combine
/// by logical AND").
#[derive(Default)]
pub struct Filter {
	preset: Option<PresetRule>,
	name: Option<CompiledMatch>,
	region: Option<Region>,
}

impl Filter {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with_preset(mut self, preset: FocusPreset) -> Self {
		self.preset = Some(preset_rule(preset));
		self
	}

	/// Returns `Err` with the invalid pattern's message on malformed
	/// glob/regex input (surfaced as `bad_request` by the daemon).
	pub fn with_name_match(mut self, kind: &MatchKind) -> Result<Self, FilterError> {
		self.name = Some(CompiledMatch::compile(kind)?);
		Ok(self)
	}

	#[must_use]
	pub fn with_region(mut self, region: Region) -> Self {
		self.region = Some(region);
		self
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.preset.is_none() && self.name.is_none() && self.region.is_none()
	}

	fn matches(&self, element: &Element, window: Rect) -> bool {
		if let Some(preset) = &self.preset
			&& !preset.matches(element)
		{
			return false;
		}
		if let Some(name) = &self.name
			&& !name.matches(&element.name)
		{
			return false;
		}
		if let Some(region) = self.region {
			let rect = region_rect(region, window);
			let (cx, cy) = element.bounds.center();
			if !rect_contains_point(rect, cx, cy) {
				return false;
			}
		}
		true
	}

	/// Applies the filter, preserving reading order.
	#[must_use]
	pub fn apply<'a>(&self, elements: &'a [Element], window: Rect) -> Vec<&'a Element> {
		elements.iter().filter(|e| self.matches(e, window)).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use nexus_proto::{Backend, ElementFlags};

	fn el(role: Role, name: &str, x: i32, y: i32) -> Element {
		Element {
			id: format!("ax_{name}"),
			role,
			name: name.to_string(),
			value: None,
			bounds: Rect { x, y, w: 40, h: 20 },
			flags: ElementFlags::default(),
			parent_name: None,
			source: Backend::NativeAx,
		}
	}

	fn window() -> Rect {
		Rect { x: 0, y: 0, w: 900, h: 600 }
	}

	#[test]
	fn preset_and_region_compose_as_intersection() {
		let elements = vec![
			el(Role::Button, "Save", 10, 10),
			el(Role::Button, "Cancel", 700, 500),
			el(Role::Link, "Help", 10, 10),
		];
		let preset_only = Filter::new().with_preset(FocusPreset::Buttons);
		let region_only = Filter::new().with_region(Region::Top);
		let both = Filter::new()
			.with_preset(FocusPreset::Buttons)
			.with_region(Region::Top);

		let a: Vec<&str> = preset_only.apply(&elements, window()).iter().map(|e| e.name.as_str()).collect();
		let b: Vec<&str> = region_only.apply(&elements, window()).iter().map(|e| e.name.as_str()).collect();
		let both_names: Vec<&str> = both.apply(&elements, window()).iter().map(|e| e.name.as_str()).collect();

		let intersection: Vec<&str> = a.iter().copied().filter(|n| b.contains(n)).collect();
		assert_eq!(both_names, intersection);
		assert_eq!(both_names, vec!["Save"]);
	}

	#[test]
	fn errors_preset_matches_name_substring_case_insensitively() {
		let elements = vec![
			el(Role::StaticText, "Connection WARNING", 0, 0),
			el(Role::StaticText, "All good", 0, 0),
		];
		let filtered = Filter::new()
			.with_preset(FocusPreset::Errors)
			.apply(&elements, window());
		assert_eq!(filtered.len(), 1);
		assert_eq!(filtered[0].name, "Connection WARNING");
	}

	#[test]
	fn name_match_glob_is_case_insensitive() {
		let elements = vec![el(Role::Button, "SAVE FILE", 0, 0), el(Role::Button, "Quit", 0, 0)];
		let filter = Filter::new()
			.with_name_match(&MatchKind::Glob("save*".into()))
			.unwrap();
		let filtered = filter.apply(&elements, window());
		assert_eq!(filtered.len(), 1);
		assert_eq!(filtered[0].name, "SAVE FILE");
	}

	#[test]
	fn invalid_regex_is_rejected() {
		let result = Filter::new().with_name_match(&MatchKind::Regex("(".into()));
		assert!(result.is_err());
	}
}
