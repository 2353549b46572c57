//! # Integrity
//!
//! 노드 트리 무결성 검사
//!
//! ## 불변 조건
//!
//! 1. **Forest**: 모든 노드는 유한한 부모 사슬을 거쳐 루트에 닿는다 (순환 없음)
//! 2. **Parent exists**: `parent_id`가 있으면 해당 노드가 존재한다
//! 3. **Unique code**: 한 code는 최대 한 노드만 가진다
//! 4. **Depth**: 루트 = 1 기준으로 `max_depth`를 넘지 않는다
//!
//! - `snapshot.rs`: 메모리상의 트리 (검증과 적용의 기준 상태)
//! - `checker.rs`: 변경 검증 + 전체 감사 (TreeReport)

mod checker;
mod snapshot;

pub use checker::{IntegrityChecker, TreeReport};
pub use snapshot::{AppliedChange, TreeSnapshot};
