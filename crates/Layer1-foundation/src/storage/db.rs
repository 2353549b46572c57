//! SQLite Storage for the permission/menu tree
//!
//! 저장 데이터:
//! - Permissions: 권한/메뉴 노드 (자기 참조 트리)
//! - Role Grants: 역할 → code 부여
//! - Applied Migrations: 이름 있는 배치 (한 번만 적용)
//! - Reorg History: 커밋된 배치 기록
//!
//! 설정 데이터는 JSON (storage/json/)에서 관리
//!
//! ## Migration System
//!
//! Database schema is versioned. Migrations run automatically on startup.
//! - Version 1: Initial schema (permissions)
//! - Version 2: Add role_grants, applied_migrations, reorg_history
//!
//! ## Writes
//!
//! All writes go through [`NodeStore::with_write_tx`], which opens a
//! `BEGIN IMMEDIATE` transaction. SQLite allows one such writer per database
//! file, so batches from different processes never interleave.

use crate::core::{Node, NodeStatus, NodeType};
use crate::{Error, Result};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Current schema version
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// DB 파일명
pub const DB_FILE: &str = "menutree.db";

/// Default busy timeout while waiting for another writer
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

const NODE_COLUMNS: &str = "id, name, chinese_name, code, type, parent_id, path, component, \
                            icon, description, sort, status, created_at, updated_at";

// ============================================================================
// SQL 변환
// ============================================================================

impl ToSql for NodeType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for NodeType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse()
            .map_err(|e: Error| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for NodeStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_flag()))
    }
}

impl FromSql for NodeStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(NodeStatus::from_flag(value.as_i64()? as i32))
    }
}

fn row_to_node(row: &Row<'_>) -> rusqlite::Result<Node> {
    Ok(Node {
        id: row.get(0)?,
        name: row.get(1)?,
        chinese_name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        code: row.get(3)?,
        node_type: row.get(4)?,
        parent_id: row.get(5)?,
        path: row.get(6)?,
        component: row.get(7)?,
        icon: row.get(8)?,
        description: row.get(9)?,
        sort: row.get(10)?,
        status: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

// ============================================================================
// Records
// ============================================================================

/// 역할 → code 부여
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleGrant {
    pub role: String,
    pub code: String,
}

/// 적용된 마이그레이션 (이름 있는 배치)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedMigration {
    pub name: String,
    pub batch_id: String,
    pub applied_at: String,
}

/// 커밋된 배치 기록
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub batch_id: String,
    pub name: Option<String>,
    pub mutation_count: usize,
    pub affected_ids: Vec<i64>,
    pub applied_at: String,
}

// ============================================================================
// NodeStore
// ============================================================================

/// Storage service for the permission/menu tree
#[derive(Clone)]
pub struct NodeStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl NodeStore {
    /// Create a store under a data directory (`<data_dir>/menutree.db`)
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| Error::Storage(format!("Failed to create data directory: {}", e)))?;

        Self::open(&data_dir.join(DB_FILE))
    }

    /// Open a database file
    pub fn open(db_path: &Path) -> Result<Self> {
        Self::open_with_timeout(db_path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open a database file with a custom busy timeout
    pub fn open_with_timeout(db_path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Storage(format!("Failed to create data directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open(db_path)
            .map_err(|e| Error::Storage(format!("Failed to open database: {}", e)))?;

        // Enable WAL mode so readers see a consistent snapshot while a batch commits
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )
        .map_err(|e| Error::Storage(format!("Failed to set pragmas: {}", e)))?;
        conn.busy_timeout(busy_timeout)
            .map_err(|e| Error::Storage(format!("Failed to set busy timeout: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(db_path.to_path_buf()),
        };

        store.initialize_schema()?;
        store.run_migrations()?;

        debug!("Opened node store at {}", db_path.display());
        Ok(store)
    }

    /// Create an in-memory storage (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Storage(format!("Failed to create in-memory database: {}", e)))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Storage(format!("Failed to set pragmas: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        };

        store.initialize_schema()?;
        store.run_migrations()?;

        Ok(store)
    }

    /// DB 파일 경로 (in-memory면 None)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))
    }

    /// Get current schema version from database
    pub fn get_schema_version(&self) -> Result<i32> {
        let conn = self.lock()?;

        conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .map_err(|e| Error::Storage(format!("Failed to get schema version: {}", e)))
    }

    /// Initialize database schema (base tables)
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- Permission/menu nodes (self-referencing tree)
            CREATE TABLE IF NOT EXISTS permissions (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                chinese_name TEXT,
                code TEXT,
                type TEXT NOT NULL CHECK(type IN ('category', 'menu', 'button', 'api')),
                parent_id INTEGER REFERENCES permissions(id),
                path TEXT,
                component TEXT,
                icon TEXT,
                description TEXT,
                sort INTEGER NOT NULL DEFAULT 0,
                status INTEGER NOT NULL DEFAULT 1 CHECK(status IN (0, 1)),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_permissions_code
                ON permissions(code) WHERE code IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_permissions_parent
                ON permissions(parent_id, sort, id);

            -- Insert initial schema version if not exists
            INSERT OR IGNORE INTO schema_version (version) VALUES (1);
            "#,
        )
        .map_err(|e| Error::Storage(format!("Failed to initialize schema: {}", e)))?;

        Ok(())
    }

    /// Run all pending migrations
    fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version()?;

        if current_version >= CURRENT_SCHEMA_VERSION {
            debug!(
                "Database schema is up to date (version {})",
                current_version
            );
            return Ok(());
        }

        info!(
            "Running database migrations from version {} to {}",
            current_version, CURRENT_SCHEMA_VERSION
        );

        let conn = self.lock()?;

        // Run migrations sequentially
        for version in (current_version + 1)..=CURRENT_SCHEMA_VERSION {
            match version {
                2 => Self::migrate_v2(&conn)?,
                _ => {
                    warn!("Unknown migration version: {}", version);
                }
            }

            // Record migration
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                params![version],
            )
            .map_err(|e| Error::Storage(format!("Failed to record migration: {}", e)))?;

            info!("Applied migration to version {}", version);
        }

        Ok(())
    }

    /// Migration to version 2: role grants and batch bookkeeping
    fn migrate_v2(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS role_grants (
                role TEXT NOT NULL,
                code TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (role, code)
            );

            CREATE INDEX IF NOT EXISTS idx_role_grants_code
                ON role_grants(code);

            CREATE TABLE IF NOT EXISTS applied_migrations (
                name TEXT PRIMARY KEY,
                batch_id TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reorg_history (
                batch_id TEXT PRIMARY KEY,
                name TEXT,
                mutation_count INTEGER NOT NULL,
                affected_ids TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_reorg_history_applied
                ON reorg_history(applied_at);
            "#,
        )
        .map_err(|e| Error::Storage(format!("Failed to migrate to v2: {}", e)))?;

        Ok(())
    }

    // ========================================================================
    // Node Reads
    // ========================================================================

    /// Get a node by id
    pub fn get_by_id(&self, id: i64) -> Result<Node> {
        let conn = self.lock()?;
        get_node_with_conn(&conn, id)?.ok_or_else(|| Error::node_not_found(id))
    }

    /// Get a node by its unique code
    pub fn get_by_code(&self, code: &str) -> Result<Node> {
        let conn = self.lock()?;

        conn.query_row(
            &format!("SELECT {} FROM permissions WHERE code = ?1", NODE_COLUMNS),
            params![code],
            row_to_node,
        )
        .optional()
        .map_err(|e| Error::Storage(format!("Failed to get node by code: {}", e)))?
        .ok_or_else(|| Error::NotFound(format!("code '{}'", code)))
    }

    /// List children ordered by (sort, id); `None` lists roots
    pub fn list_children(&self, parent_id: Option<i64>) -> Result<Vec<Node>> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM permissions WHERE parent_id IS ?1 ORDER BY sort, id",
                NODE_COLUMNS
            ))
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

        let children = stmt
            .query_map(params![parent_id], row_to_node)
            .map_err(|e| Error::Storage(format!("Failed to query children: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Storage(format!("Failed to read children: {}", e)))?;

        debug!("list_children({:?}): {} nodes", parent_id, children.len());
        Ok(children)
    }

    /// All descendants of `id` (the node itself excluded), level by level,
    /// each level ordered by (sort, id)
    pub fn list_descendants(&self, id: i64) -> Result<Vec<Node>> {
        let conn = self.lock()?;
        if get_node_with_conn(&conn, id)?.is_none() {
            return Err(Error::node_not_found(id));
        }

        // 깊이 상한 = 전체 노드 수 (깨진 데이터에서 무한 재귀 방지)
        let bound = count_nodes_with_conn(&conn)? as i64;
        let columns: Vec<String> = NODE_COLUMNS
            .split(',')
            .map(|c| format!("p.{}", c.trim()))
            .collect();

        let mut stmt = conn
            .prepare(&format!(
                r#"
                WITH RECURSIVE descendants(id, depth) AS (
                    SELECT id, 1 FROM permissions WHERE parent_id = ?1
                    UNION ALL
                    SELECT p.id, d.depth + 1 FROM permissions p
                    INNER JOIN descendants d ON p.parent_id = d.id
                    WHERE d.depth < ?2
                )
                SELECT {} FROM permissions p
                INNER JOIN (SELECT id, MIN(depth) AS depth FROM descendants GROUP BY id) d
                    ON p.id = d.id
                ORDER BY d.depth, p.sort, p.id
                "#,
                columns.join(", ")
            ))
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

        let nodes = stmt
            .query_map(params![id, bound], row_to_node)
            .map_err(|e| Error::Storage(format!("Failed to query descendants: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Storage(format!("Failed to read descendants: {}", e)))?;

        debug!("list_descendants({}): {} nodes", id, nodes.len());
        Ok(nodes)
    }

    /// All nodes ordered by (sort, id)
    pub fn list_all(&self) -> Result<Vec<Node>> {
        let conn = self.lock()?;
        load_nodes_with_conn(&conn)
    }

    /// Node count
    pub fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        count_nodes_with_conn(&conn)
    }

    /// Insert or replace a node by id.
    ///
    /// Store-level primitive: it only enforces code uniqueness. Tree-shape
    /// checks belong to the reorganization engine, which is the write path
    /// everything else should use.
    pub fn upsert(&self, node: &Node) -> Result<()> {
        node.validate_fields()?;
        self.with_write_tx(|tx| tx.upsert_node(node))
    }

    // ========================================================================
    // Grants / Bookkeeping Reads
    // ========================================================================

    /// Codes granted to any of the given roles
    pub fn grants_for_roles(&self, roles: &BTreeSet<String>) -> Result<BTreeSet<String>> {
        let conn = self.lock()?;
        grants_for_roles_with_conn(&conn, roles)
    }

    /// Nodes plus the codes granted to `roles`, read in one transaction
    pub fn read_view(&self, roles: &BTreeSet<String>) -> Result<(Vec<Node>, BTreeSet<String>)> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::Storage(format!("Failed to begin read: {}", e)))?;

        let nodes = load_nodes_with_conn(&tx)?;
        let codes = grants_for_roles_with_conn(&tx, roles)?;
        tx.finish()
            .map_err(|e| Error::Storage(format!("Failed to end read: {}", e)))?;

        Ok((nodes, codes))
    }

    /// All grants ordered by (role, code)
    pub fn list_grants(&self) -> Result<Vec<RoleGrant>> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare("SELECT role, code FROM role_grants ORDER BY role, code")
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

        let grants = stmt
            .query_map([], |row| {
                Ok(RoleGrant {
                    role: row.get(0)?,
                    code: row.get(1)?,
                })
            })
            .map_err(|e| Error::Storage(format!("Failed to query grants: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Storage(format!("Failed to read grants: {}", e)))?;

        Ok(grants)
    }

    /// Applied migrations in application order
    pub fn applied_migrations(&self) -> Result<Vec<AppliedMigration>> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(
                "SELECT name, batch_id, applied_at FROM applied_migrations ORDER BY applied_at, name",
            )
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

        let migrations = stmt
            .query_map([], |row| {
                Ok(AppliedMigration {
                    name: row.get(0)?,
                    batch_id: row.get(1)?,
                    applied_at: row.get(2)?,
                })
            })
            .map_err(|e| Error::Storage(format!("Failed to query migrations: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Storage(format!("Failed to read migrations: {}", e)))?;

        Ok(migrations)
    }

    /// Most recent committed batches first
    pub fn history(&self, limit: u32) -> Result<Vec<BatchRecord>> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT batch_id, name, mutation_count, affected_ids, applied_at
                FROM reorg_history ORDER BY applied_at DESC, rowid DESC LIMIT ?1
                "#,
            )
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(|e| Error::Storage(format!("Failed to query history: {}", e)))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Storage(format!("Failed to read history: {}", e)))?;

        rows.into_iter()
            .map(|(batch_id, name, count, affected, applied_at)| -> Result<BatchRecord> {
                Ok(BatchRecord {
                    batch_id,
                    name,
                    mutation_count: count as usize,
                    affected_ids: serde_json::from_str(&affected)?,
                    applied_at,
                })
            })
            .collect()
    }

    // ========================================================================
    // Write Transaction
    // ========================================================================

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back on `Err`.
    pub fn with_write_tx<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&NodeTx<'_>) -> Result<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::Storage(format!("Failed to begin transaction: {}", e)))?;

        let node_tx = NodeTx { tx };
        match f(&node_tx) {
            Ok(value) => {
                node_tx
                    .tx
                    .commit()
                    .map_err(|e| Error::Storage(format!("Failed to commit: {}", e)))?;
                Ok(value)
            }
            Err(err) => {
                if let Err(e) = node_tx.tx.rollback() {
                    warn!("Rollback failed: {}", e);
                }
                Err(err)
            }
        }
    }
}

// ============================================================================
// NodeTx - 쓰기 트랜잭션 핸들
// ============================================================================

/// Handle to an open write transaction. Only available inside
/// [`NodeStore::with_write_tx`].
pub struct NodeTx<'a> {
    tx: Transaction<'a>,
}

impl NodeTx<'_> {
    /// All nodes as seen by this transaction
    pub fn load_nodes(&self) -> Result<Vec<Node>> {
        load_nodes_with_conn(&self.tx)
    }

    pub fn get_node(&self, id: i64) -> Result<Option<Node>> {
        get_node_with_conn(&self.tx, id)
    }

    pub fn count_nodes(&self) -> Result<usize> {
        count_nodes_with_conn(&self.tx)
    }

    /// Insert a new node
    pub fn insert_node(&self, node: &Node) -> Result<()> {
        let ts = now();
        self.tx
            .execute(
                r#"
                INSERT INTO permissions (id, name, chinese_name, code, type, parent_id, path,
                                         component, icon, description, sort, status,
                                         created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
                "#,
                params![
                    node.id,
                    node.name,
                    node.chinese_name,
                    node.code,
                    node.node_type,
                    node.parent_id,
                    node.path,
                    node.component,
                    node.icon,
                    node.description,
                    node.sort,
                    node.status,
                    ts,
                ],
            )
            .map_err(|e| Error::Storage(format!("Failed to insert node {}: {}", node.id, e)))?;

        debug!("Inserted node {}", node.id);
        Ok(())
    }

    /// Overwrite every mutable column of an existing node
    pub fn update_node(&self, node: &Node) -> Result<()> {
        let changed = self
            .tx
            .execute(
                r#"
                UPDATE permissions SET
                    name = ?2,
                    chinese_name = ?3,
                    code = ?4,
                    type = ?5,
                    parent_id = ?6,
                    path = ?7,
                    component = ?8,
                    icon = ?9,
                    description = ?10,
                    sort = ?11,
                    status = ?12,
                    updated_at = ?13
                WHERE id = ?1
                "#,
                params![
                    node.id,
                    node.name,
                    node.chinese_name,
                    node.code,
                    node.node_type,
                    node.parent_id,
                    node.path,
                    node.component,
                    node.icon,
                    node.description,
                    node.sort,
                    node.status,
                    now(),
                ],
            )
            .map_err(|e| Error::Storage(format!("Failed to update node {}: {}", node.id, e)))?;

        if changed == 0 {
            return Err(Error::node_not_found(node.id));
        }
        Ok(())
    }

    /// Insert or update by id; rejects a code held by a different node
    pub fn upsert_node(&self, node: &Node) -> Result<()> {
        if let Some(code) = &node.code {
            let holder: Option<i64> = self
                .tx
                .query_row(
                    "SELECT id FROM permissions WHERE code = ?1 AND id != ?2",
                    params![code, node.id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| Error::Storage(format!("Failed to check code: {}", e)))?;

            if let Some(existing_id) = holder {
                return Err(Error::Validation(format!(
                    "code '{}' is already used by node {}",
                    code, existing_id
                )));
            }
        }

        if self.get_node(node.id)?.is_some() {
            self.update_node(node)
        } else {
            self.insert_node(node)
        }
    }

    /// Delete a node row. Children must already be relinked.
    pub fn delete_node(&self, id: i64) -> Result<()> {
        let changed = self
            .tx
            .execute("DELETE FROM permissions WHERE id = ?1", params![id])
            .map_err(|e| Error::Storage(format!("Failed to delete node {}: {}", id, e)))?;

        if changed == 0 {
            return Err(Error::node_not_found(id));
        }
        debug!("Deleted node {}", id);
        Ok(())
    }

    // ========================================================================
    // Grants
    // ========================================================================

    pub fn insert_grant(&self, role: &str, code: &str) -> Result<()> {
        self.tx
            .execute(
                "INSERT OR IGNORE INTO role_grants (role, code, created_at) VALUES (?1, ?2, ?3)",
                params![role, code, now()],
            )
            .map_err(|e| Error::Storage(format!("Failed to insert grant: {}", e)))?;
        Ok(())
    }

    pub fn delete_grant(&self, role: &str, code: &str) -> Result<usize> {
        self.tx
            .execute(
                "DELETE FROM role_grants WHERE role = ?1 AND code = ?2",
                params![role, code],
            )
            .map_err(|e| Error::Storage(format!("Failed to delete grant: {}", e)))
    }

    pub fn delete_grants_for_code(&self, code: &str) -> Result<usize> {
        self.tx
            .execute("DELETE FROM role_grants WHERE code = ?1", params![code])
            .map_err(|e| Error::Storage(format!("Failed to delete grants: {}", e)))
    }

    // ========================================================================
    // Bookkeeping
    // ========================================================================

    pub fn is_migration_applied(&self, name: &str) -> Result<bool> {
        let found: Option<String> = self
            .tx
            .query_row(
                "SELECT name FROM applied_migrations WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Storage(format!("Failed to check migration: {}", e)))?;
        Ok(found.is_some())
    }

    pub fn record_migration(&self, name: &str, batch_id: &str) -> Result<()> {
        self.tx
            .execute(
                "INSERT INTO applied_migrations (name, batch_id, applied_at) VALUES (?1, ?2, ?3)",
                params![name, batch_id, now()],
            )
            .map_err(|e| Error::Storage(format!("Failed to record migration: {}", e)))?;
        Ok(())
    }

    pub fn record_batch(&self, record: &BatchRecord) -> Result<()> {
        let affected = serde_json::to_string(&record.affected_ids)?;
        self.tx
            .execute(
                r#"
                INSERT INTO reorg_history (batch_id, name, mutation_count, affected_ids, applied_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    record.batch_id,
                    record.name,
                    record.mutation_count as i64,
                    affected,
                    record.applied_at,
                ],
            )
            .map_err(|e| Error::Storage(format!("Failed to record batch: {}", e)))?;
        Ok(())
    }
}

// ============================================================================
// Connection helpers
// ============================================================================

fn get_node_with_conn(conn: &Connection, id: i64) -> Result<Option<Node>> {
    conn.query_row(
        &format!("SELECT {} FROM permissions WHERE id = ?1", NODE_COLUMNS),
        params![id],
        row_to_node,
    )
    .optional()
    .map_err(|e| Error::Storage(format!("Failed to get node: {}", e)))
}

fn load_nodes_with_conn(conn: &Connection) -> Result<Vec<Node>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM permissions ORDER BY sort, id",
            NODE_COLUMNS
        ))
        .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

    let nodes = stmt
        .query_map([], row_to_node)
        .map_err(|e| Error::Storage(format!("Failed to query nodes: {}", e)))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::Storage(format!("Failed to read nodes: {}", e)))?;

    Ok(nodes)
}

fn grants_for_roles_with_conn(
    conn: &Connection,
    roles: &BTreeSet<String>,
) -> Result<BTreeSet<String>> {
    if roles.is_empty() {
        return Ok(BTreeSet::new());
    }

    let placeholders: Vec<String> = (1..=roles.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT DISTINCT code FROM role_grants WHERE role IN ({})",
        placeholders.join(", ")
    );

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;
    let params: Vec<&dyn ToSql> = roles.iter().map(|r| r as &dyn ToSql).collect();

    let codes = stmt
        .query_map(params.as_slice(), |row| row.get::<_, String>(0))
        .map_err(|e| Error::Storage(format!("Failed to query grants: {}", e)))?
        .collect::<rusqlite::Result<BTreeSet<_>>>()
        .map_err(|e| Error::Storage(format!("Failed to read grants: {}", e)))?;

    Ok(codes)
}

fn count_nodes_with_conn(conn: &Connection) -> Result<usize> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM permissions", [], |row| row.get(0))
        .map_err(|e| Error::Storage(format!("Failed to count nodes: {}", e)))?;
    Ok(count as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(store: &NodeStore) {
        store.upsert(&Node::category(1, "system").sort(10)).unwrap();
        store
            .upsert(&Node::menu(2, "users", "/system/users").parent(1).sort(20))
            .unwrap();
        store
            .upsert(&Node::menu(3, "roles", "/system/roles").parent(1).sort(10))
            .unwrap();
        store
            .upsert(&Node::menu(4, "perms", "/system/perms").parent(1).sort(10))
            .unwrap();
    }

    #[test]
    fn test_in_memory_storage() {
        let store = NodeStore::in_memory().expect("Failed to create storage");
        assert_eq!(store.get_schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.list_children(None).unwrap().is_empty());
    }

    #[test]
    fn test_get_by_id_and_code() {
        let store = NodeStore::in_memory().unwrap();
        store
            .upsert(&Node::button(9, "export", "student:export").chinese_name("导出"))
            .unwrap();

        let by_id = store.get_by_id(9).unwrap();
        assert_eq!(by_id.chinese_name, "导出");
        assert!(!by_id.created_at.is_empty());

        let by_code = store.get_by_code("student:export").unwrap();
        assert_eq!(by_code.id, 9);

        assert!(matches!(store.get_by_id(99), Err(Error::NotFound(_))));
        assert!(matches!(store.get_by_code("nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_list_children_ordering() {
        let store = NodeStore::in_memory().unwrap();
        seed(&store);

        let ids: Vec<i64> = store
            .list_children(Some(1))
            .unwrap()
            .iter()
            .map(|n| n.id)
            .collect();
        // sort ascending, id breaks the tie between 3 and 4
        assert_eq!(ids, vec![3, 4, 2]);

        let roots = store.list_children(None).unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, 1);

        assert!(store.list_children(Some(2)).unwrap().is_empty());
    }

    #[test]
    fn test_list_descendants() {
        let store = NodeStore::in_memory().unwrap();
        seed(&store);
        store
            .upsert(&Node::button(5, "user-add", "user:add").parent(2))
            .unwrap();
        store
            .upsert(&Node::button(6, "role-add", "role:add").parent(3).sort(1))
            .unwrap();

        let ids: Vec<i64> = store
            .list_descendants(1)
            .unwrap()
            .iter()
            .map(|n| n.id)
            .collect();
        // 레벨 순, 레벨 안에서는 (sort, id)
        assert_eq!(ids, vec![3, 4, 2, 5, 6]);

        assert!(store.list_descendants(5).unwrap().is_empty());
        assert!(matches!(store.list_descendants(99), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_upsert_code_collision() {
        let store = NodeStore::in_memory().unwrap();
        store.upsert(&Node::button(1, "a", "dashboard")).unwrap();

        let err = store.upsert(&Node::button(2, "b", "dashboard")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(store.count().unwrap(), 1);

        // same id keeps its code
        store
            .upsert(&Node::button(1, "a-renamed", "dashboard"))
            .unwrap();
        assert_eq!(store.get_by_id(1).unwrap().name, "a-renamed");
    }

    #[test]
    fn test_status_roundtrip() {
        let store = NodeStore::in_memory().unwrap();
        store.upsert(&Node::category(1, "old").disabled()).unwrap();
        assert_eq!(store.get_by_id(1).unwrap().status, NodeStatus::Disabled);
    }

    #[test]
    fn test_write_tx_rolls_back_on_error() {
        let store = NodeStore::in_memory().unwrap();
        seed(&store);

        let result: Result<()> = store.with_write_tx(|tx| {
            tx.insert_node(&Node::category(50, "temp"))?;
            tx.insert_grant("teacher", "x")?;
            Err(Error::Validation("abort".to_string()))
        });
        assert!(result.is_err());
        assert!(store.get_by_id(50).is_err());
        assert!(store.list_grants().unwrap().is_empty());
    }

    #[test]
    fn test_grants_for_roles() {
        let store = NodeStore::in_memory().unwrap();
        store
            .with_write_tx(|tx| {
                tx.insert_grant("teacher", "class:view")?;
                tx.insert_grant("teacher", "class:view")?;
                tx.insert_grant("parent", "child:view")?;
                tx.insert_grant("principal", "report:view")
            })
            .unwrap();

        let roles: BTreeSet<String> = ["teacher", "parent"].iter().map(|s| s.to_string()).collect();
        let codes = store.grants_for_roles(&roles).unwrap();
        assert_eq!(
            codes.into_iter().collect::<Vec<_>>(),
            vec!["child:view".to_string(), "class:view".to_string()]
        );
        assert!(store.grants_for_roles(&BTreeSet::new()).unwrap().is_empty());
        assert_eq!(store.list_grants().unwrap().len(), 3);
    }

    #[test]
    fn test_read_view() {
        let store = NodeStore::in_memory().unwrap();
        seed(&store);
        store
            .with_write_tx(|tx| tx.insert_grant("teacher", "class:view"))
            .unwrap();

        let roles: BTreeSet<String> = ["teacher".to_string()].into_iter().collect();
        let (nodes, codes) = store.read_view(&roles).unwrap();
        assert_eq!(nodes.len(), 4);
        assert!(codes.contains("class:view"));

        let (_, none) = store.read_view(&BTreeSet::new()).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_history_and_migrations() {
        let store = NodeStore::in_memory().unwrap();
        store
            .with_write_tx(|tx| {
                assert!(!tx.is_migration_applied("20240101-marketing")?);
                tx.record_migration("20240101-marketing", "b-1")?;
                tx.record_batch(&BatchRecord {
                    batch_id: "b-1".to_string(),
                    name: Some("20240101-marketing".to_string()),
                    mutation_count: 3,
                    affected_ids: vec![1, 2, 100],
                    applied_at: now(),
                })
            })
            .unwrap();

        let history = store.history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].affected_ids, vec![1, 2, 100]);
        assert_eq!(store.applied_migrations().unwrap()[0].name, "20240101-marketing");
    }

    #[test]
    fn test_file_store_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = NodeStore::new(dir.path()).unwrap();
            store.upsert(&Node::category(1, "kept")).unwrap();
        }
        let reopened = NodeStore::new(dir.path()).unwrap();
        assert_eq!(reopened.get_by_id(1).unwrap().name, "kept");
        assert_eq!(reopened.path(), Some(dir.path().join(DB_FILE).as_path()));
        assert_eq!(reopened.get_schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
    }
}
