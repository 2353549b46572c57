//! MenuTree init command
//!
//! Creates the database (schema migrations run on open) and optionally a
//! project config in `.menutree/`.

use crate::commands::Context;
use menutree_foundation::{JsonStore, MENUTREE_CONFIG_FILE};

/// Initialize the database and report where it lives
pub fn init_store(ctx: &Context, write_config: bool) -> anyhow::Result<()> {
    let version = ctx.store.get_schema_version()?;
    let location = ctx
        .store
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(in-memory)".to_string());

    println!("✓ Database ready: {}", location);
    println!("  Schema version: {}", version);
    println!("  Nodes: {}", ctx.store.count()?);

    if write_config {
        let project = JsonStore::current_project()?;
        if project.exists(MENUTREE_CONFIG_FILE) {
            println!("✓ Project config already exists, leaving it untouched.");
        } else {
            ctx.config.save_project()?;
            println!(
                "  Created {}",
                project.file_path(MENUTREE_CONFIG_FILE).display()
            );
        }
    }

    Ok(())
}
