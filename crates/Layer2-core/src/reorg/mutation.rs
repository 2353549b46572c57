//! Mutation / Batch - 재구성 변경 단위

use menutree_foundation::{NodeDraft, NodePatch};
use serde::{Deserialize, Serialize};

/// 노드 트리 변경 하나
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Mutation {
    /// 부모 변경 (`parent_id = None`이면 루트로), sort가 있으면 함께 변경
    SetParent {
        id: i64,
        #[serde(default)]
        parent_id: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sort: Option<i32>,
    },

    /// 표시 이름 변경 (`chinese_name = None`이면 유지)
    Rename {
        id: i64,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chinese_name: Option<String>,
    },

    /// 활성/비활성 (하위 노드의 저장값은 건드리지 않음)
    SetStatus { id: i64, enabled: bool },

    /// 새 노드 삽입
    Insert { node: NodeDraft },

    /// 노드 삭제. 직계 자식은 `reparent_children_to`로 재연결된다.
    Remove {
        id: i64,
        #[serde(default)]
        reparent_children_to: Option<i64>,
    },

    /// code 설정/해제
    SetCode {
        id: i64,
        #[serde(default)]
        code: Option<String>,
    },

    /// path, component, icon, description, type 부분 수정
    Update { id: i64, patch: NodePatch },

    /// 역할에 code 부여
    Grant { role: String, code: String },

    /// 역할에서 code 회수
    Revoke { role: String, code: String },
}

impl Mutation {
    /// 대상 노드 id (Insert/Grant/Revoke는 없음)
    pub fn target_id(&self) -> Option<i64> {
        match self {
            Self::SetParent { id, .. }
            | Self::Rename { id, .. }
            | Self::SetStatus { id, .. }
            | Self::Remove { id, .. }
            | Self::SetCode { id, .. }
            | Self::Update { id, .. } => Some(*id),
            Self::Insert { node } => node.id,
            Self::Grant { .. } | Self::Revoke { .. } => None,
        }
    }

    /// 로그용 이름
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetParent { .. } => "set_parent",
            Self::Rename { .. } => "rename",
            Self::SetStatus { .. } => "set_status",
            Self::Insert { .. } => "insert",
            Self::Remove { .. } => "remove",
            Self::SetCode { .. } => "set_code",
            Self::Update { .. } => "update",
            Self::Grant { .. } => "grant",
            Self::Revoke { .. } => "revoke",
        }
    }

    // ========================================================================
    // 생성 헬퍼
    // ========================================================================

    pub fn set_parent(id: i64, parent_id: Option<i64>, sort: Option<i32>) -> Self {
        Self::SetParent {
            id,
            parent_id,
            sort,
        }
    }

    pub fn rename(id: i64, name: impl Into<String>, chinese_name: Option<String>) -> Self {
        Self::Rename {
            id,
            name: name.into(),
            chinese_name,
        }
    }

    pub fn set_status(id: i64, enabled: bool) -> Self {
        Self::SetStatus { id, enabled }
    }

    pub fn insert(node: impl Into<NodeDraft>) -> Self {
        Self::Insert { node: node.into() }
    }

    pub fn remove(id: i64, reparent_children_to: Option<i64>) -> Self {
        Self::Remove {
            id,
            reparent_children_to,
        }
    }

    pub fn set_code(id: i64, code: Option<String>) -> Self {
        Self::SetCode { id, code }
    }

    pub fn grant(role: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Grant {
            role: role.into(),
            code: code.into(),
        }
    }

    pub fn revoke(role: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Revoke {
            role: role.into(),
            code: code.into(),
        }
    }
}

/// 원자적으로 적용되는 변경 묶음
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    /// 마이그레이션 이름 (있으면 history에 함께 기록)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub mutations: Vec<Mutation>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            mutations: Vec::new(),
        }
    }

    pub fn push(mut self, mutation: Mutation) -> Self {
        self.mutations.push(mutation);
        self
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

impl From<Vec<Mutation>> for Batch {
    fn from(mutations: Vec<Mutation>) -> Self {
        Self {
            name: None,
            mutations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use menutree_foundation::NodeType;

    #[test]
    fn test_batch_json_format() {
        let json = serde_json::json!({
            "name": "20240315-marketing-category",
            "mutations": [
                { "op": "insert", "node": { "id": 100, "name": "marketing", "chineseName": "营销管理", "type": "category", "sort": 30 } },
                { "op": "set_parent", "id": 1, "parentId": 100, "sort": 10 },
                { "op": "set_status", "id": 7, "enabled": false },
                { "op": "remove", "id": 8, "reparentChildrenTo": null },
                { "op": "grant", "role": "teacher", "code": "activity:view" }
            ]
        });

        let batch: Batch = serde_json::from_value(json).unwrap();
        assert_eq!(batch.name.as_deref(), Some("20240315-marketing-category"));
        assert_eq!(batch.len(), 5);

        match &batch.mutations[0] {
            Mutation::Insert { node } => {
                assert_eq!(node.id, Some(100));
                assert_eq!(node.node_type, NodeType::Category);
                assert_eq!(node.chinese_name, "营销管理");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(batch.mutations[1], Mutation::set_parent(1, Some(100), Some(10)));
        assert_eq!(batch.mutations[3], Mutation::remove(8, None));
        assert_eq!(batch.mutations[4].kind(), "grant");
        assert_eq!(batch.mutations[4].target_id(), None);
    }
}
