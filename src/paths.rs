//! On-disk layout for a CTM root.
//!
//! `CTM_HOME` overrides the root directory; otherwise it defaults to
//! `$HOME/.claude/ctm`, matching `original_source/ctm/lib/config.py::get_ctm_dir`.

use std::path::{Path, PathBuf};

/// Resolve the CTM root directory, creating it (and its standard
/// subdirectories) if it doesn't exist yet.
pub fn ctm_root() -> crate::error::Result<PathBuf> {
    let root = match std::env::var_os("CTM_HOME") {
        Some(v) => PathBuf::from(v),
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".claude")
            .join("ctm"),
    };
    ensure_layout(&root)?;
    Ok(root)
}

/// Create the standard subdirectory layout under `root` if missing.
pub fn ensure_layout(root: &Path) -> crate::error::Result<()> {
    for dir in [
        agents_dir(root),
        episodic_dir(root),
        semantic_dir(root),
        checkpoints_dir(root),
        corrupt_dir(root),
    ] {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

pub fn agents_dir(root: &Path) -> PathBuf {
    root.join("agents")
}

pub fn agent_file(root: &Path, agent_id: &str) -> PathBuf {
    agents_dir(root).join(format!("{agent_id}.json"))
}

pub fn episodic_dir(root: &Path) -> PathBuf {
    root.join("episodic")
}

pub fn episodic_file(root: &Path, agent_id: &str) -> PathBuf {
    episodic_dir(root).join(format!("{agent_id}.json"))
}

pub fn semantic_dir(root: &Path) -> PathBuf {
    root.join("semantic")
}

pub fn semantic_file(root: &Path, agent_id: &str) -> PathBuf {
    semantic_dir(root).join(format!("{agent_id}.md"))
}

pub fn semantic_manifest_file(root: &Path, agent_id: &str) -> PathBuf {
    semantic_dir(root).join(format!("{agent_id}.md.manifest.json"))
}

pub fn checkpoints_dir(root: &Path) -> PathBuf {
    root.join("checkpoints")
}

pub fn corrupt_dir(root: &Path) -> PathBuf {
    root.join("corrupt")
}

pub fn config_file(root: &Path) -> PathBuf {
    root.join("config.json")
}

pub fn index_file(root: &Path) -> PathBuf {
    root.join("index.json")
}

pub fn scheduler_file(root: &Path) -> PathBuf {
    root.join("scheduler.json")
}

pub fn working_memory_file(root: &Path) -> PathBuf {
    root.join("working-memory.json")
}

pub fn tiered_memory_file(root: &Path) -> PathBuf {
    root.join("tiered-memory.json")
}

pub fn cognitive_load_file(root: &Path) -> PathBuf {
    root.join("cognitive-load.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn ensure_layout_creates_all_subdirs() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("ctm");
        ensure_layout(&root).unwrap();
        assert!(agents_dir(&root).is_dir());
        assert!(episodic_dir(&root).is_dir());
        assert!(semantic_dir(&root).is_dir());
        assert!(checkpoints_dir(&root).is_dir());
        assert!(corrupt_dir(&root).is_dir());
    }

    #[test]
    fn agent_file_path_uses_id() {
        let root = PathBuf::from("/tmp/ctm");
        assert_eq!(
            agent_file(&root, "abcd1234"),
            PathBuf::from("/tmp/ctm/agents/abcd1234.json")
        );
    }
}
