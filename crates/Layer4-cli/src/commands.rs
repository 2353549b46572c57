//! Subcommand implementations

use menutree_core::{Batch, MenuResolver, MigrationOutcome, ReorgEngine, RoleScope};
use menutree_foundation::{JsonStore, MenuTreeConfig, Node, NodeStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 설정 + 저장소
pub struct Context {
    pub config: MenuTreeConfig,
    pub store: NodeStore,
}

impl Context {
    /// 설정을 읽고 DB를 연다 (`--db`가 있으면 설정보다 우선)
    pub fn open(db: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = MenuTreeConfig::load()?;
        if let Some(db) = db {
            config = config.database_path(db);
        }

        let path = config.resolved_database_path();
        let store =
            NodeStore::open_with_timeout(&path, Duration::from_millis(config.busy_timeout_ms))?;
        tracing::debug!("Using database {}", path.display());

        Ok(Self::new(config, store))
    }

    pub fn new(config: MenuTreeConfig, store: NodeStore) -> Self {
        Self { config, store }
    }

    fn engine(&self) -> ReorgEngine {
        ReorgEngine::new(self.store.clone(), &self.config)
    }

    fn resolver(&self) -> MenuResolver {
        MenuResolver::new(self.store.clone(), &self.config)
    }
}

/// `--code` / `--role` 인자
#[derive(clap::Args, Debug, Default)]
pub struct ScopeArgs {
    /// Allowed permission code (repeatable)
    #[arg(long = "code")]
    pub codes: Vec<String>,

    /// Role name (repeatable)
    #[arg(long = "role")]
    pub roles: Vec<String>,
}

impl ScopeArgs {
    pub fn into_scope(self) -> RoleScope {
        RoleScope {
            allowed_codes: self.codes.into_iter().collect(),
            roles: self.roles.into_iter().collect(),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

/// Apply (or dry-run) a batch file
pub fn apply(ctx: &Context, file: &Path, name: Option<String>, dry_run: bool) -> anyhow::Result<()> {
    let batch = load_batch(file)?;
    let name = name.or_else(|| batch.name.clone());
    let engine = ctx.engine();

    if dry_run {
        let outcome = engine.dry_run(&batch)?;
        eprintln!("✓ Dry run passed ({} mutations)", batch.len());
        return print_json(&outcome);
    }

    match name {
        Some(name) => {
            let outcome = engine.apply_migration(&name, &batch)?;
            match &outcome {
                MigrationOutcome::Applied(applied) => eprintln!(
                    "✓ Applied '{}' ({} mutations, {} nodes affected)",
                    name,
                    batch.len(),
                    applied.affected_ids.len()
                ),
                MigrationOutcome::AlreadyApplied { .. } => {
                    eprintln!("• '{}' was already applied, nothing to do", name)
                }
            }
            print_json(&outcome)
        }
        None => {
            let outcome = engine.apply(&batch)?;
            eprintln!(
                "✓ Applied batch ({} mutations, {} nodes affected)",
                batch.len(),
                outcome.affected_ids.len()
            );
            print_json(&outcome)
        }
    }
}

/// List ordered children
pub fn children(ctx: &Context, parent: Option<i64>) -> anyhow::Result<()> {
    let nodes = ctx.store.list_children(parent)?;

    if nodes.is_empty() {
        match parent {
            Some(id) => println!("Node {} has no children.", id),
            None => println!("No root nodes."),
        }
        return Ok(());
    }
    print_nodes(&nodes);
    Ok(())
}

/// List every node below a target, level by level
pub fn descendants(ctx: &Context, target: &str) -> anyhow::Result<()> {
    let node = lookup(&ctx.store, target)?;
    let nodes = ctx.store.list_descendants(node.id)?;

    if nodes.is_empty() {
        println!("Node {} has no descendants.", node.id);
        return Ok(());
    }
    print_nodes(&nodes);
    println!("\n{} descendants of node {}", nodes.len(), node.id);
    Ok(())
}

/// Print one node by id or code
pub fn show(ctx: &Context, target: &str) -> anyhow::Result<()> {
    print_json(&lookup(&ctx.store, target)?)
}

pub fn resolve(ctx: &Context, scope: ScopeArgs) -> anyhow::Result<()> {
    let menu = ctx.resolver().resolve_menu(&scope.into_scope())?;
    print_json(&menu)
}

/// Whether a scope may use a path or code; non-zero exit when denied
pub fn check_permission(
    ctx: &Context,
    scope: ScopeArgs,
    path: Option<&str>,
    permission: Option<&str>,
) -> anyhow::Result<()> {
    let allowed = ctx
        .resolver()
        .check_permission(&scope.into_scope(), path, permission)?;
    print_json(&serde_json::json!({ "hasPermission": allowed }))?;

    if !allowed {
        anyhow::bail!("permission denied");
    }
    Ok(())
}

pub fn codes(ctx: &Context, scope: ScopeArgs) -> anyhow::Result<()> {
    let codes = ctx.resolver().resolve_codes(&scope.into_scope())?;
    for code in codes {
        println!("{}", code);
    }
    Ok(())
}

/// Audit the tree; non-zero exit when unhealthy
pub fn check(ctx: &Context) -> anyhow::Result<()> {
    let report = ctx.engine().audit()?;
    print_json(&report)?;

    if !report.is_healthy() {
        anyhow::bail!("tree audit failed for {} nodes", report.node_count);
    }
    eprintln!("✓ {} nodes, tree is healthy", report.node_count);
    Ok(())
}

pub fn history(ctx: &Context, limit: u32) -> anyhow::Result<()> {
    let records = ctx.store.history(limit)?;

    if records.is_empty() {
        println!("No batches applied yet.");
        return Ok(());
    }

    println!(
        "{:<10} {:<34} {:<10} {:<26}",
        "Batch", "Name", "Mutations", "Applied"
    );
    println!("{}", "-".repeat(82));

    for record in records {
        let id_short = &record.batch_id[..8.min(record.batch_id.len())];
        let name = record.name.as_deref().unwrap_or("(unnamed)");
        println!(
            "{:<10} {:<34} {:<10} {:<26}",
            id_short,
            truncate(name, 34),
            record.mutation_count,
            record.applied_at
        );
    }
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn print_nodes(nodes: &[Node]) {
    println!(
        "{:<8} {:<10} {:<8} {:<6} {:<9} {:<24} {:<24}",
        "ID", "Type", "Parent", "Sort", "Status", "Name", "Code"
    );
    println!("{}", "-".repeat(93));

    for node in nodes {
        let name = if node.chinese_name.is_empty() {
            node.name.clone()
        } else {
            format!("{} ({})", node.name, node.chinese_name)
        };
        let parent = node
            .parent_id
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<8} {:<10} {:<8} {:<6} {:<9} {:<24} {:<24}",
            node.id,
            node.node_type,
            parent,
            node.sort,
            if node.is_enabled() { "enabled" } else { "disabled" },
            truncate(&name, 24),
            node.code.as_deref().unwrap_or("-")
        );
    }
}

/// Read a batch file
pub fn load_batch(file: &Path) -> anyhow::Result<Batch> {
    Ok(JsonStore::load_path::<Batch>(file)?)
}

/// Numeric targets are ids, everything else is a code
pub fn lookup(store: &NodeStore, target: &str) -> anyhow::Result<Node> {
    let node = match target.parse::<i64>() {
        Ok(id) => store.get_by_id(id)?,
        Err(_) => store.get_by_code(target)?,
    };
    Ok(node)
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use menutree_core::Mutation;

    fn ctx() -> Context {
        Context::new(MenuTreeConfig::default(), NodeStore::in_memory().unwrap())
    }

    #[test]
    fn test_apply_named_batch_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("batch.json");
        std::fs::write(
            &file,
            r#"{ "name": "20240101-init", "mutations": [
                { "op": "insert", "node": { "id": 1, "name": "system", "type": "category" } },
                { "op": "insert", "node": { "id": 2, "name": "users", "type": "menu", "path": "/users", "parentId": 1 } }
            ] }"#,
        )
        .unwrap();

        let ctx = ctx();
        apply(&ctx, &file, None, true).unwrap();
        assert_eq!(ctx.store.count().unwrap(), 0);

        apply(&ctx, &file, None, false).unwrap();
        apply(&ctx, &file, None, false).unwrap();
        assert_eq!(ctx.store.count().unwrap(), 2);
        assert_eq!(ctx.store.applied_migrations().unwrap().len(), 1);
    }

    #[test]
    fn test_apply_rejects_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.json");
        std::fs::write(&file, r#"{ "mutations": [ { "op": "explode" } ] }"#).unwrap();
        assert!(apply(&ctx(), &file, None, false).is_err());
    }

    #[test]
    fn test_lookup_by_id_or_code() {
        let ctx = ctx();
        ctx.engine()
            .apply(&Batch::from(vec![Mutation::insert(Node::button(7, "export", "report:export"))]))
            .unwrap();

        assert_eq!(lookup(&ctx.store, "7").unwrap().name, "export");
        assert_eq!(lookup(&ctx.store, "report:export").unwrap().id, 7);
        assert!(lookup(&ctx.store, "missing").is_err());
    }

    #[test]
    fn test_descendants_and_check_permission() {
        let ctx = ctx();
        ctx.engine()
            .apply(&Batch::from(vec![
                Mutation::insert(Node::category(1, "reports")),
                Mutation::insert(Node::menu(2, "daily", "/reports/daily").parent(1).code("report:daily")),
                Mutation::insert(Node::button(3, "export", "report:export").parent(2)),
            ]))
            .unwrap();

        descendants(&ctx, "1").unwrap();
        descendants(&ctx, "report:export").unwrap();
        assert!(descendants(&ctx, "99").is_err());

        let scope = ScopeArgs {
            codes: vec!["report:daily".to_string()],
            roles: vec![],
        };
        check_permission(&ctx, scope, Some("/reports/daily"), None).unwrap();

        let denied = check_permission(&ctx, ScopeArgs::default(), None, Some("report:export"));
        assert!(denied.is_err());
        assert!(check_permission(&ctx, ScopeArgs::default(), None, None).is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("营销管理营销管理", 6), "营销管...");
    }
}
