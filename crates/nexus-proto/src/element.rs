//! The normalized [`Element`]/[`Snapshot`] data model (spec §3).

use serde::{Deserialize, Serialize};

use crate::window::{Backend, WindowKey};

/// Closed enum of control classes every backend's role vocabulary is mapped
/// onto. Unknown backend roles map to [`Role::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
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

impl Role {
	/// Fixed abbreviation table used by the compact formatter (spec §4.4).
	#[must_use]
	pub fn abbrev(self) -> &'static str {
		match self {
			Role::Button => "Btn",
			Role::Edit => "Edit",
			Role::Link => "Link",
			Role::MenuItem => "Menu",
			Role::CheckBox => "Chk",
			Role::RadioButton => "Rad",
			Role::ComboBox => "Cmb",
			Role::Tab => "Tab",
			Role::List => "List",
			Role::ListItem => "Item",
			Role::TreeItem => "Tree",
			Role::Dialog => "Dlg",
			Role::Window => "Win",
			Role::StaticText => "Txt",
			Role::Group => "Group",
			Role::Heading => "H",
			Role::Other => "Other",
		}
	}

	/// Inverse of [`Role::abbrev`], used to make compact output bijective.
	#[must_use]
	pub fn from_abbrev(s: &str) -> Option<Role> {
		Some(match s {
			"Btn" => Role::Button,
			"Edit" => Role::Edit,
			"Link" => Role::Link,
			"Menu" => Role::MenuItem,
			"Chk" => Role::CheckBox,
			"Rad" => Role::RadioButton,
			"Cmb" => Role::ComboBox,
			"Tab" => Role::Tab,
			"List" => Role::List,
			"Item" => Role::ListItem,
			"Tree" => Role::TreeItem,
			"Dlg" => Role::Dialog,
			"Win" => Role::Window,
			"Txt" => Role::StaticText,
			"Group" => Role::Group,
			"H" => Role::Heading,
			"Other" => Role::Other,
			_ => return None,
		})
	}
}

/// Integer rectangle in screen pixels. Zero-area elements are never emitted
/// (spec §3 invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
	pub x: i32,
	pub y: i32,
	pub w: i32,
	pub h: i32,
}

impl Rect {
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.w <= 0 || self.h <= 0
	}

	#[must_use]
	pub fn center(&self) -> (i32, i32) {
		(self.x + self.w / 2, self.y + self.h / 2)
	}

	/// Intersection-over-union against another rect, used by the OCR/vision
	/// fallback merge rule (spec §4.5).
	#[must_use]
	pub fn iou(&self, other: &Rect) -> f64 {
		let ax2 = self.x + self.w;
		let ay2 = self.y + self.h;
		let bx2 = other.x + other.w;
		let by2 = other.y + other.h;

		let ix1 = self.x.max(other.x);
		let iy1 = self.y.max(other.y);
		let ix2 = ax2.min(bx2);
		let iy2 = ay2.min(by2);

		if ix2 <= ix1 || iy2 <= iy1 {
			return 0.0;
		}
		let inter = f64::from(ix2 - ix1) * f64::from(iy2 - iy1);
		let area_a = f64::from(self.w) * f64::from(self.h);
		let area_b = f64::from(other.w) * f64::from(other.h);
		let union = area_a + area_b - inter;
		if union <= 0.0 { 0.0 } else { inter / union }
	}
}

/// Boolean flags on an [`Element`]. Absent ≡ unknown (spec §3), modeled here
/// as `Option<bool>` per flag rather than a single tri-state bitset so each
/// flag's "unknown" is independent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementFlags {
	pub enabled: Option<bool>,
	pub focused: Option<bool>,
	pub visible: Option<bool>,
	pub editable: Option<bool>,
}

/// A normalized UI node (spec §3).
///
/// `raw_ref` is deliberately absent from this struct: it is an
/// opaque, non-serializable backend handle (spec §3) and lives in
/// `nexus-backends`'s session-local side table, keyed by [`Element::id`],
/// never on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
	/// Stable within a [`Snapshot`]; opaque. Has no meaning across snapshots.
	pub id: String,
	pub role: Role,
	pub name: String,
	pub value: Option<String>,
	pub bounds: Rect,
	pub flags: ElementFlags,
	/// Name of the nearest named ancestor; used as a cross-snapshot matching
	/// key (spec §4.5).
	pub parent_name: Option<String>,
	pub source: Backend,
}

impl Element {
	#[must_use]
	pub fn is_focused(&self) -> bool {
		self.flags.focused.unwrap_or(false)
	}

	#[must_use]
	pub fn is_enabled(&self) -> bool {
		self.flags.enabled.unwrap_or(true)
	}
}

/// Ordered list of [`Element`]s for one window at one instant (spec §3).
///
/// The list is always in reading order: grouped into horizontal bands and
/// sorted by x within each band (spec §4.2 ordering invariant). This order
/// is load-bearing for the Formatter and for diff matching tie-breaks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
	pub window_key: WindowKey,
	/// Monotonic timestamp (milliseconds since an arbitrary daemon epoch),
	/// not wall-clock time — see `nexus-core::cache` for why.
	pub captured_at: u64,
	/// Short hash of window title + focused element id + element count +
	/// rounded content bounds (spec §3).
	pub fingerprint: u64,
	pub elements: Vec<Element>,
	/// Diagnostic field explaining an empty element list that is not an
	/// error (minimized window, no accessibility support, permissions) —
	/// spec §7 propagation policy.
	pub diagnostic: Option<String>,
}

impl Snapshot {
	#[must_use]
	pub fn element_by_id(&self, id: &str) -> Option<&Element> {
		self.elements.iter().find(|e| e.id == id)
	}

	#[must_use]
	pub fn focused_element(&self) -> Option<&Element> {
		self.elements.iter().find(|e| e.is_focused())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rect_iou_identical_is_one() {
		let r = Rect { x: 0, y: 0, w: 10, h: 10 };
		assert!((r.iou(&r) - 1.0).abs() < f64::EPSILON);
	}

	#[test]
	fn rect_iou_disjoint_is_zero() {
		let a = Rect { x: 0, y: 0, w: 10, h: 10 };
		let b = Rect { x: 100, y: 100, w: 10, h: 10 };
		assert_eq!(a.iou(&b), 0.0);
	}

	#[test]
	fn role_abbrev_round_trips() {
		for role in [
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
			Role::Heading,
			Role::StaticText,
			Role::Dialog,
			Role::Window,
		] {
			assert_eq!(Role::from_abbrev(role.abbrev()), Some(role));
		}
	}
}
