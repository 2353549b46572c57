//! Storage module for MenuTree
//!
//! - `db`: SQLite - 권한/메뉴 노드, 역할 부여, 배치 기록
//! - `json`: JSON - 설정/배치 파일 저장/로드

mod db;
mod json;

// SQLite Storage (노드 트리)
pub use db::{AppliedMigration, BatchRecord, NodeStore, NodeTx, RoleGrant, DB_FILE};

// JSON Storage (범용)
pub use json::JsonStore;
