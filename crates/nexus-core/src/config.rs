//! Tunable constants, in one place, per spec §9's open question on the
//! diff churn threshold and bounds-jitter threshold.

use serde::{Deserialize, Serialize};

/// All of Nexus's magic numbers. Built-in defaults match spec.md's prose
/// exactly; a caller may load this from TOML (`nexus-cli`) and override any
/// subset, and individual requests can still override cache bypass
/// (`force`) or the per-command timeout on top of this.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NexusConfig {
	/// Snapshot cache freshness window (spec §4.6).
	pub cache_ttl_ms: u64,
	/// Diff-vs-full-listing churn threshold as a fraction of
	/// `max(prev, cur)` element count (spec §4.5).
	pub diff_churn_threshold: f64,
	/// Bounds diff is reported only when the center moves more than this
	/// many pixels or size changes by more than this many pixels (spec
	/// §4.5, jitter damping).
	pub bounds_jitter_px: i32,
	/// Max accessibility tree walk depth for Native-AX (spec §4.1).
	pub native_ax_max_depth: u32,
	/// Default per-command watchdog timeout (spec §4.11).
	pub default_timeout_ms: u64,
	/// Max Healing Supervisor retries per action (spec §4.10).
	pub heal_max_retries: u32,
	/// OCR/vision fallback triggers when a snapshot yields fewer than this
	/// many elements (spec §4.5).
	pub fallback_min_elements: usize,
	/// IoU threshold for deduping fallback elements against existing ones
	/// (spec §4.5).
	pub fallback_merge_iou: f64,
	/// Max settle-delay retries of the post-step verify loop before giving
	/// up (spec §4.9 step 3: "starts at 200ms, doubles per retry to 3s
	/// max" — the cap on *how many* doublings is left to the
	/// implementation).
	pub verify_max_attempts: u32,
	/// How long `target_not_ready` healing polls `enabled` before giving up
	/// (spec §4.10).
	pub heal_not_ready_timeout_ms: u64,
	/// How long `page_loading` healing waits for a web idle event before
	/// retrying (spec §4.10).
	pub heal_page_loading_timeout_ms: u64,
}

impl Default for NexusConfig {
	fn default() -> Self {
		Self {
			cache_ttl_ms: 500,
			diff_churn_threshold: 0.5,
			bounds_jitter_px: 8,
			native_ax_max_depth: 3,
			default_timeout_ms: 15_000,
			heal_max_retries: 2,
			fallback_min_elements: 5,
			fallback_merge_iou: 0.5,
			verify_max_attempts: 5,
			heal_not_ready_timeout_ms: 2_000,
			heal_page_loading_timeout_ms: 3_000,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_documented_values() {
		let cfg = NexusConfig::default();
		assert_eq!(cfg.cache_ttl_ms, 500);
		assert_eq!(cfg.native_ax_max_depth, 3);
		assert_eq!(cfg.heal_max_retries, 2);
	}

	#[test]
	fn round_trips_through_toml() {
		let cfg = NexusConfig::default();
		let text = toml::to_string(&cfg).unwrap();
		let back: NexusConfig = toml::from_str(&text).unwrap();
		assert_eq!(cfg, back);
	}
}
