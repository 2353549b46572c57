//! # Resolver
//!
//! 역할 범위에 맞는 메뉴 트리 계산 (읽기 전용)
//!
//! 노드 포함 규칙:
//! - 비활성 노드는 서브트리째 제외
//! - category는 보이는 자손이 하나 이상일 때만 남는다
//! - 그 외 노드는 code가 없거나, 허용된 code일 때 포함
//! - 슈퍼유저 역할은 code 검사를 건너뛴다 (상태/가지치기는 그대로)
//!
//! 권한 검사(`check_permission`)도 같은 규칙으로 계산된 트리를 본다.

mod menu;

pub use menu::{MenuNode, MenuResolver, RoleScope};
