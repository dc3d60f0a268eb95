//! Checkpoint/restore and the `repair` recovery path.
//!
//! Grounded on `original_source/ctm/lib/ctm.py::cmd_checkpoint`/`cmd_restore`:
//! a timestamped snapshot directory under `checkpoints/` holding a copy of
//! every active agent file plus `index.json`/`scheduler.json`, pruned to the
//! most recent 10; restore copies everything back. `repair` is additive
//! (§7/§6 — see SPEC_FULL.md).

use std::path::{Path, PathBuf};

use crate::agent::Agent;
use crate::error::Result;
use crate::index::AgentIndex;
use crate::store;
use crate::time::now_string;

fn checkpoint_name() -> String {
    now_string().replace([':', '.'], "-")
}

/// Snapshot every agent listed by `agent_ids` (update_activity + save first,
/// matching the original) plus `index.json`/`scheduler.json`, into a new
/// timestamped directory. Prunes to `keep` most recent checkpoints.
pub fn create_checkpoint(root: &Path, agent_ids: &[String], keep: usize) -> Result<PathBuf> {
    let name = checkpoint_name();
    let dir = crate::paths::checkpoints_dir(root).join(&name);
    std::fs::create_dir_all(&dir)?;

    for id in agent_ids {
        let path = crate::paths::agent_file(root, id);
        if let Ok(mut agent) = store::load::<Agent>(&path) {
            agent.update_activity();
            store::save_atomic(&path, &agent, Some(&agent.id), |a: &Agent| a.id.clone())?;
            crate::agent::invalidate_cached(&path);
            std::fs::copy(&path, dir.join(format!("{id}.json")))?;
        }
    }

    let index_path = crate::paths::index_file(root);
    if index_path.is_file() {
        std::fs::copy(&index_path, dir.join("index.json"))?;
    }
    let scheduler_path = crate::paths::scheduler_file(root);
    if scheduler_path.is_file() {
        std::fs::copy(&scheduler_path, dir.join("scheduler.json"))?;
    }

    prune_checkpoints(root, keep)?;
    Ok(dir)
}

fn list_checkpoints(root: &Path) -> Result<Vec<PathBuf>> {
    let dir = crate::paths::checkpoints_dir(root);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut entries: Vec<PathBuf> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    entries.sort();
    entries.reverse();
    Ok(entries)
}

fn prune_checkpoints(root: &Path, keep: usize) -> Result<()> {
    let checkpoints = list_checkpoints(root)?;
    for old in checkpoints.into_iter().skip(keep) {
        std::fs::remove_dir_all(old)?;
    }
    Ok(())
}

/// Restore agent files from the named checkpoint (or the most recent one if
/// `name` is `None`), leaving `index.json`/`scheduler.json` untouched (they
/// get rebuilt/invalidated by the caller).
pub fn restore_checkpoint(root: &Path, name: Option<&str>) -> Result<PathBuf> {
    let checkpoints = list_checkpoints(root)?;
    let target = match name {
        Some(n) => crate::paths::checkpoints_dir(root).join(n),
        None => checkpoints
            .into_iter()
            .next()
            .ok_or_else(|| crate::error::CtmError::NotFound("no checkpoints exist".to_string()))?,
    };
    if !target.is_dir() {
        return Err(crate::error::CtmError::NotFound(format!(
            "checkpoint '{}' not found",
            target.display()
        )));
    }

    for entry in std::fs::read_dir(&target)? {
        let entry = entry?;
        let path = entry.path();
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if file_name == "index.json" || file_name == "scheduler.json" {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            let dest = crate::paths::agents_dir(root).join(file_name);
            std::fs::copy(&path, &dest)?;
            crate::agent::invalidate_cached(&dest);
        }
    }
    Ok(target)
}

pub fn list_checkpoint_names(root: &Path) -> Result<Vec<String>> {
    Ok(list_checkpoints(root)?
        .into_iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
        .collect())
}

/// Recover from a corrupt index/scheduler store: back up the current
/// `index.json`/`scheduler.json` (timestamped copy), rebuild the index by
/// scanning agent files on disk, and quarantine any agent file that fails
/// to parse under `corrupt/<timestamp>/`.
pub fn repair(root: &Path) -> Result<RepairReport> {
    let stamp = checkpoint_name();
    let backup_dir = crate::paths::corrupt_dir(root).join(format!("backup-{stamp}"));
    std::fs::create_dir_all(&backup_dir)?;

    for file in [crate::paths::index_file(root), crate::paths::scheduler_file(root)] {
        if file.is_file() {
            let dest = backup_dir.join(file.file_name().unwrap());
            std::fs::copy(&file, dest)?;
        }
    }

    let (index, failures) = AgentIndex::rebuild_from_disk(root)?;
    index.save(root)?;

    let quarantine_dir = crate::paths::corrupt_dir(root).join(&stamp);
    std::fs::create_dir_all(&quarantine_dir)?;
    let mut quarantined = Vec::new();
    for (path, reason) in &failures {
        let src = PathBuf::from(path);
        if let Some(file_name) = src.file_name() {
            let dest = quarantine_dir.join(file_name);
            if std::fs::rename(&src, &dest).is_ok() {
                tracing::warn!(path = %src.display(), reason, "quarantined corrupt agent file");
                quarantined.push(dest.display().to_string());
            }
        }
    }

    Ok(RepairReport {
        backup_dir,
        rebuilt_agent_count: index.agents.len(),
        quarantined,
    })
}

#[derive(Debug)]
pub struct RepairReport {
    pub backup_dir: PathBuf,
    pub rebuilt_agent_count: usize,
    pub quarantined: Vec<String>,
}
