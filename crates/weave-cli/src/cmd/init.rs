use crate::output::print_json;
use anyhow::Context;
use std::path::Path;
use weave_core::{config::WeaveConfig, io, paths};

const GITIGNORE: &str = "weave.db\nweave.db-wal\nweave.db-shm\n";

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let dir = paths::weave_dir(root);
    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let config_path = paths::config_path(root);
    let config_created = !config_path.exists();
    if config_created {
        WeaveConfig::new()
            .save(root)
            .context("failed to write config.yaml")?;
    }

    let ignore_created = io::write_if_missing(&dir.join(".gitignore"), GITIGNORE.as_bytes())
        .context("failed to write .weave/.gitignore")?;

    let weave = super::open(root)?;
    let field = weave.field_state();

    if json {
        print_json(&serde_json::json!({
            "root": root.display().to_string(),
            "config_created": config_created,
            "gitignore_created": ignore_created,
            "database": paths::db_path(root).display().to_string(),
            "coherence": field.coherence,
        }))?;
        return Ok(());
    }

    println!("Initializing weave in: {}", root.display());
    let mark = |created: bool| if created { "created:" } else { "exists: " };
    println!("  {} {}", mark(config_created), paths::CONFIG_FILE);
    println!("  {} {}/.gitignore", mark(ignore_created), paths::WEAVE_DIR);
    println!("  store:   {}", paths::DB_FILE);
    println!("Field coherence {:.2} ({})", field.coherence, field.quality.label());
    Ok(())
}
