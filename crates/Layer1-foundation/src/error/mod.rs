//! Error types for MenuTree
//!
//! 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// MenuTree 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 트리 무결성 관련
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cycle detected: node {id} cannot be placed under {parent_id}")]
    CycleDetected { id: i64, parent_id: i64 },

    #[error("Duplicate code: '{code}' is already used by node {existing_id}")]
    DuplicateCode { code: String, existing_id: i64 },

    #[error("Depth exceeded: node {id} would reach depth {depth} (max {max})")]
    DepthExceeded { id: i64, depth: usize, max: usize },

    #[error("Duplicate sibling: '{name}' already exists under {}", parent_label(.parent_id))]
    DuplicateSibling { parent_id: Option<i64>, name: String },

    // ========================================================================
    // 입력 검증
    // ========================================================================
    #[error("Validation error: {0}")]
    Validation(String),

    // ========================================================================
    // 배치 관련
    // ========================================================================
    #[error("Batch rejected at mutation {index}: {cause}")]
    BatchRejected { index: usize, cause: Box<Error> },

    // ========================================================================
    // 설정/저장소 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 트리 무결성 위반인지 확인 (배치를 거부하는 에러들)
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::CycleDetected { .. }
                | Error::DuplicateCode { .. }
                | Error::DepthExceeded { .. }
                | Error::DuplicateSibling { .. }
                | Error::Validation(_)
        )
    }

    /// 사용자에게 보여줄 수 있는 에러인지 확인
    pub fn is_user_facing(&self) -> bool {
        match self {
            Error::BatchRejected { cause, .. } => cause.is_user_facing(),
            Error::Config(_) => true,
            other => other.is_integrity(),
        }
    }

    /// BatchRejected를 벗겨낸 원인 에러
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::BatchRejected { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// 배치 거부 에러 생성 헬퍼
    pub fn batch_rejected(index: usize, cause: Error) -> Self {
        Error::BatchRejected {
            index,
            cause: Box::new(cause),
        }
    }

    pub fn node_not_found(id: i64) -> Self {
        Error::NotFound(format!("node {}", id))
    }
}

fn parent_label(parent_id: &Option<i64>) -> String {
    match parent_id {
        Some(id) => format!("node {}", id),
        None => "root".to_string(),
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_batch() {
        let err = Error::batch_rejected(
            2,
            Error::CycleDetected {
                id: 1,
                parent_id: 3,
            },
        );
        assert!(matches!(err.root_cause(), Error::CycleDetected { .. }));
        assert!(err.is_user_facing());
        assert!(!err.is_integrity());
    }

    #[test]
    fn test_duplicate_sibling_display() {
        let err = Error::DuplicateSibling {
            parent_id: None,
            name: "营销管理".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Duplicate sibling: '营销管理' already exists under root"
        );
    }
}
