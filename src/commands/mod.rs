use std::path::{Path, PathBuf};

pub mod delete;
pub mod responses;
pub mod score;
pub mod status;
pub mod summary;
pub mod sweep;

pub const DB_FILENAME: &str = "llm_lab.sqlite";
pub const SWEEP_MANIFEST_FILENAME: &str = "sweep_run.json";

pub fn resolve_db_path(cache_root: &Path, db_path: Option<&Path>) -> PathBuf {
    db_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cache_root.join(DB_FILENAME))
}

pub fn default_manifest_path(cache_root: &Path) -> PathBuf {
    cache_root.join("manifests").join(SWEEP_MANIFEST_FILENAME)
}
