//! # menutree-foundation
//!
//! Foundation layer for MenuTree:
//! - Core: 권한/메뉴 노드 타입 (Node, NodeType, NodeStatus)
//! - Storage: SQLite (노드 트리, 역할 부여, 배치 기록), JsonStore (설정/배치 파일)
//! - Config: 통합 설정 (MenuTreeConfig)
//! - Error: 에러 타입 (Error, Result)
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  menutree-core                                          │
//! │  ├── IntegrityChecker (검증)                            │
//! │  ├── ReorgEngine (유일한 쓰기 경로)                      │
//! │  └── MenuResolver (역할별 메뉴 트리)                     │
//! │                     │                                   │
//! │                     ▼                                   │
//! │          NodeStore (BEGIN IMMEDIATE 트랜잭션)            │
//! │                     │                                   │
//! │                     ▼                                   │
//! │   permissions / role_grants / reorg_history (SQLite)    │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Core (노드 타입)
// ============================================================================
pub use crate::core::{validate_code, Node, NodeDraft, NodePatch, NodeStatus, NodeType, MAX_CODE_LEN};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{MenuTreeConfig, MENUTREE_CONFIG_FILE};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::{
    AppliedMigration, BatchRecord, JsonStore, NodeStore, NodeTx, RoleGrant, DB_FILE,
};
