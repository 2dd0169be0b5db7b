//! Filesystem layout and guard-policy loading.
//!
//! Layout:
//! ```text
//! ~/.market-structure-memory/
//! ├── memory.db
//! └── policy.toml   (optional)
//! ```

use std::path::{Path, PathBuf};
use std::{env, fs};

use msm_core::GuardPolicy;

use crate::error::{Result, StoreError};
use crate::store::Store;

pub const DB_FILE: &str = "memory.db";
pub const POLICY_FILE: &str = "policy.toml";

/// Default base directory for all msm storage.
pub fn default_base_dir() -> PathBuf {
    dirs_home().join(".market-structure-memory")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// `MSM_DATA_DIR` if set and non-empty, else the default base directory.
pub fn resolve_base_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    match env::var("MSM_DATA_DIR") {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => default_base_dir(),
    }
}

/// Open (creating as needed) the database under `base`.
pub fn open_store(base: &Path) -> Result<Store> {
    fs::create_dir_all(base).map_err(|e| {
        StoreError::InvalidData(format!("failed to create {}: {e}", base.display()))
    })?;
    Store::open(&base.join(DB_FILE))
}

/// Parse a guard policy from TOML. Omitted tables fall back to the
/// built-in defaults.
pub fn parse_policy(content: &str) -> Result<GuardPolicy> {
    toml::from_str(content).map_err(|e| StoreError::Config(e.to_string()))
}

/// Load the guard policy.
///
/// An explicit path must exist. Otherwise `policy.toml` under `base` is used
/// when present, and the built-in defaults when not.
pub fn load_policy(explicit: Option<&Path>, base: &Path) -> Result<GuardPolicy> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let candidate = base.join(POLICY_FILE);
            if !candidate.exists() {
                return Ok(GuardPolicy::default());
            }
            candidate
        }
    };
    let content = fs::read_to_string(&path)?;
    let policy = parse_policy(&content)?;
    tracing::info!(path = %path.display(), "loaded guard policy");
    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_policy() {
        let policy = parse_policy(
            r#"
            forbidden_keys = ["edge", "alpha"]
            implicit_time_tokens = ["now", "today"]
            "#,
        )
        .unwrap();
        assert!(policy.forbidden_keys.contains("alpha"));
        assert!(!policy.forbidden_keys.contains("signal"));
        assert_eq!(policy.implicit_time_tokens, vec!["now", "today"]);
        assert_eq!(
            policy.forbidden_value_patterns,
            GuardPolicy::default().forbidden_value_patterns
        );
    }

    #[test]
    fn test_parse_neutral_defaults_table() {
        let policy = parse_policy(
            r#"
            [neutral_defaults]
            include_dormant = true
            "#,
        )
        .unwrap();
        assert_eq!(
            policy.neutral_defaults.get("include_dormant"),
            Some(&serde_json::Value::Bool(true))
        );
    }

    #[test]
    fn test_parse_rejects_wrong_types() {
        assert!(matches!(
            parse_policy("forbidden_keys = 3"),
            Err(StoreError::Config(_))
        ));
    }

    #[test]
    fn test_load_policy_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            load_policy(None, dir.path()).unwrap(),
            GuardPolicy::default()
        );
    }

    #[test]
    fn test_load_policy_from_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(POLICY_FILE), "forbidden_keys = [\"edge\"]\n").unwrap();
        let policy = load_policy(None, dir.path()).unwrap();
        assert!(policy.forbidden_keys.contains("edge"));
    }

    #[test]
    fn test_explicit_policy_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            load_policy(Some(&missing), dir.path()),
            Err(StoreError::Io(_))
        ));
    }

    #[test]
    fn test_explicit_base_dir_wins() {
        let dir = Path::new("/tmp/msm-explicit");
        assert_eq!(resolve_base_dir(Some(dir)), dir.to_path_buf());
    }

    #[test]
    fn test_open_store_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("nested").join("msm");
        let store = open_store(&base).unwrap();
        assert_eq!(store.node_count().unwrap(), 0);
        assert!(base.join(DB_FILE).exists());
    }
}
