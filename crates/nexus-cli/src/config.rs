//! Config file loading (spec §11): TOML via `toml` + `dirs`, CLI/request
//! fields always win over whatever's on disk.

use std::path::{Path, PathBuf};

use anyhow::Context;
use nexus_core::NexusConfig;

/// `$XDG_CONFIG_HOME/nexus/config.toml` (or the platform equivalent via
/// `dirs::config_dir`), used when `--config` isn't given.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
	dirs::config_dir().map(|dir| dir.join("nexus").join("config.toml"))
}

/// Loads `NexusConfig` from `path` (or the default location, if `path` is
/// `None`). A missing file at the default location is not an error — the
/// built-in defaults apply; an explicit `--config PATH` that doesn't exist
/// is.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<NexusConfig> {
	let (resolved, explicit) = match path {
		Some(p) => (Some(p.to_path_buf()), true),
		None => (default_config_path(), false),
	};

	let Some(resolved) = resolved else {
		return Ok(NexusConfig::default());
	};
	if !resolved.exists() {
		if explicit {
			anyhow::bail!("config file not found: {}", resolved.display());
		}
		return Ok(NexusConfig::default());
	}

	let text = std::fs::read_to_string(&resolved)
		.with_context(|| format!("reading config file {}", resolved.display()))?;
	toml::from_str(&text).with_context(|| format!("parsing config file {}", resolved.display()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_default_path_falls_back_to_builtin_defaults() {
		let cfg = load_config(None).unwrap();
		assert_eq!(cfg, NexusConfig::default());
	}

	#[test]
	fn missing_explicit_path_is_an_error() {
		let err = load_config(Some(Path::new("/nonexistent/nexus-config-test.toml"))).unwrap_err();
		assert!(err.to_string().contains("config file not found"));
	}

	#[test]
	fn loads_overrides_from_an_explicit_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.toml");
		std::fs::write(&path, "cache_ttl_ms = 1000\n").unwrap();
		let cfg = load_config(Some(&path)).unwrap();
		assert_eq!(cfg.cache_ttl_ms, 1000);
		assert_eq!(cfg.diff_churn_threshold, NexusConfig::default().diff_churn_threshold);
	}
}
