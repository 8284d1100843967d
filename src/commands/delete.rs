use anyhow::{Context, Result, bail};
use tracing::info;

use crate::cli::DeleteArgs;
use crate::commands::resolve_db_path;
use crate::store;

pub fn run(args: DeleteArgs) -> Result<()> {
    let db_path = resolve_db_path(&args.cache_root, args.db_path.as_deref());
    if !db_path.exists() {
        bail!("database file missing: {}", db_path.display());
    }

    let pool = store::open_pool(&db_path)
        .with_context(|| format!("failed to open store {}", db_path.display()))?;
    let conn = pool.get().context("failed to acquire store connection")?;

    let deleted = store::delete_experiment(&conn, args.experiment_id)
        .with_context(|| format!("failed to delete experiment {}", args.experiment_id))?;
    if !deleted {
        bail!("experiment {} not found", args.experiment_id);
    }

    info!(experiment_id = args.experiment_id, "deleted experiment");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cache_root: &std::path::Path, experiment_id: i64) -> DeleteArgs {
        DeleteArgs {
            cache_root: cache_root.to_path_buf(),
            db_path: None,
            experiment_id,
        }
    }

    #[test]
    fn deletes_existing_experiment_and_rejects_unknown_ids() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let db_path = resolve_db_path(dir.path(), None);
        let experiment_id = {
            let pool = store::open_pool(&db_path).expect("pool should open");
            let conn = pool.get().expect("connection should be available");
            store::create_experiment(&conn, "doomed", "Explain").expect("insert experiment")
        };

        run(args(dir.path(), experiment_id)).expect("delete should succeed");

        let err = run(args(dir.path(), experiment_id)).expect_err("second delete should fail");
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn missing_database_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let err = run(args(dir.path(), 1)).expect_err("missing db should fail");
        assert!(err.to_string().contains("database file missing"));
    }
}
