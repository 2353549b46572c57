//! # Reorganization
//!
//! 노드 트리의 유일한 쓰기 경로
//!
//! ## 흐름
//!
//! ```text
//! Batch ──▶ ReorgEngine::apply
//!             │  BEGIN IMMEDIATE
//!             ├─ TreeSnapshot 로드
//!             ├─ for (i, m) in mutations:
//!             │     IntegrityChecker::validate(m, &tree)  ── Err ─▶ ROLLBACK, BatchRejected{i}
//!             │     tree.apply(m) → 행 쓰기
//!             ├─ reorg_history 기록
//!             └─ COMMIT
//! ```
//!
//! ## 사용 예시
//!
//! ```ignore
//! use menutree_core::{Batch, Mutation, ReorgEngine};
//!
//! let engine = ReorgEngine::new(store, &config);
//! let outcome = engine.apply(
//!     &Batch::named("20240315-marketing")
//!         .push(Mutation::insert(Node::category(100, "marketing")))
//!         .push(Mutation::set_parent(1, Some(100), None)),
//! )?;
//! ```

mod engine;
mod mutation;

pub use engine::{BatchOutcome, MigrationOutcome, ReorgEngine};
pub use mutation::{Batch, Mutation};
