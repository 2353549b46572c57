//! Config - 통합 설정 관리
//!
//! - `menutree.rs` - MenuTreeConfig (글로벌 + 프로젝트 병합)

mod menutree;

pub use menutree::{MenuTreeConfig, MENUTREE_CONFIG_FILE};
