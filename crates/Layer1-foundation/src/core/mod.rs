//! Core Module - 권한/메뉴 노드 타입
//!
//! - `types.rs`: Node, NodeType, NodeStatus, NodeDraft, NodePatch

mod types;

pub use types::{validate_code, Node, NodeDraft, NodePatch, NodeStatus, NodeType, MAX_CODE_LEN};
