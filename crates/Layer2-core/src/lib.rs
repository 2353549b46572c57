//! menutree-core: 권한/메뉴 트리 엔진
//!
//! Layer2 - 트리 무결성, 재구성, 역할별 조회
//!
//! # 주요 모듈
//!
//! - `integrity`: TreeSnapshot + IntegrityChecker (변경 검증, 전체 감사)
//! - `reorg`: Mutation/Batch + ReorgEngine (원자적 배치 적용, 마이그레이션)
//! - `resolver`: RoleScope + MenuResolver (역할별 메뉴 트리, code 목록)
//!
//! # 사용 예시
//!
//! ```ignore
//! use menutree_core::{Batch, MenuResolver, Mutation, ReorgEngine, RoleScope};
//! use menutree_foundation::{MenuTreeConfig, Node, NodeStore};
//!
//! let config = MenuTreeConfig::load()?;
//! let store = NodeStore::open(&config.resolved_database_path())?;
//!
//! // 재구성: 새 category를 만들고 기존 메뉴를 그 아래로 이동
//! let engine = ReorgEngine::new(store.clone(), &config);
//! engine.apply(&Batch::from(vec![
//!     Mutation::insert(Node::category(100, "marketing").chinese_name("营销管理")),
//!     Mutation::set_parent(12, Some(100), Some(10)),
//! ]))?;
//!
//! // 조회: 역할별 메뉴 트리
//! let resolver = MenuResolver::new(store, &config);
//! let menu = resolver.resolve_menu(&RoleScope::new().role("teacher"))?;
//! ```

pub mod integrity;
pub mod reorg;
pub mod resolver;

// Re-exports: Integrity
pub use integrity::{AppliedChange, IntegrityChecker, TreeReport, TreeSnapshot};

// Re-exports: Reorganization
pub use reorg::{Batch, BatchOutcome, MigrationOutcome, Mutation, ReorgEngine};

// Re-exports: Resolver
pub use resolver::{MenuNode, MenuResolver, RoleScope};
