//! Core Types - 권한/메뉴 노드 타입 정의
//!
//! 모든 레이어에서 공통으로 사용하는 타입들

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// code 최대 길이
pub const MAX_CODE_LEN: usize = 100;

// ============================================================================
// NodeType - 노드 종류
// ============================================================================

/// 노드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// 표시 전용 그룹 (하위 노드가 없으면 메뉴에서 제거됨)
    Category,
    /// 이동 가능한 메뉴 항목
    Menu,
    /// 화면 내 버튼 권한
    Button,
    /// API 권한 체크
    Api,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Menu => "menu",
            Self::Button => "button",
            Self::Api => "api",
        }
    }

    /// code가 필수인 타입 (기능 게이팅용)
    pub fn requires_code(&self) -> bool {
        matches!(self, Self::Button | Self::Api)
    }

    /// path가 필수인 타입
    pub fn requires_path(&self) -> bool {
        matches!(self, Self::Menu)
    }
}

impl std::str::FromStr for NodeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "category" => Ok(Self::Category),
            "menu" => Ok(Self::Menu),
            "button" => Ok(Self::Button),
            "api" => Ok(Self::Api),
            other => Err(Error::Validation(format!("unknown node type '{}'", other))),
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

// ============================================================================
// NodeStatus - 활성 상태
// ============================================================================

/// 활성 상태 (가시성 전용, 하위 노드에 물리적으로 전파하지 않음)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Enabled,
    Disabled,
}

impl NodeStatus {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            Self::Enabled
        } else {
            Self::Disabled
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }

    /// DB 저장값 (1 = enabled, 0 = disabled)
    pub fn as_flag(&self) -> i32 {
        match self {
            Self::Enabled => 1,
            Self::Disabled => 0,
        }
    }

    pub fn from_flag(flag: i32) -> Self {
        Self::from_enabled(flag != 0)
    }
}

// ============================================================================
// Node - 권한/메뉴 노드
// ============================================================================

/// 권한/메뉴 트리의 노드 하나 (`permissions` 테이블의 한 행)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub chinese_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub sort: i32,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub updated_at: String,
}

impl Node {
    pub fn new(id: i64, name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id,
            name: name.into(),
            chinese_name: String::new(),
            code: None,
            node_type,
            parent_id: None,
            path: None,
            component: None,
            icon: None,
            description: None,
            sort: 0,
            status: NodeStatus::Enabled,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    pub fn category(id: i64, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeType::Category)
    }

    pub fn menu(id: i64, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(id, name, NodeType::Menu).path(path)
    }

    pub fn button(id: i64, name: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(id, name, NodeType::Button).code(code)
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn chinese_name(mut self, name: impl Into<String>) -> Self {
        self.chinese_name = name.into();
        self
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn sort(mut self, sort: i32) -> Self {
        self.sort = sort;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.status = NodeStatus::Disabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.status.is_enabled()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// 형제 정렬 키 (sort 오름차순, id 오름차순)
    pub fn order_key(&self) -> (i32, i64) {
        (self.sort, self.id)
    }

    /// 타입별 필수 필드 검증 (무결성 검사 전에 실행)
    pub fn validate_fields(&self) -> Result<()> {
        if self.id <= 0 {
            return Err(Error::Validation(format!(
                "node id must be positive, got {}",
                self.id
            )));
        }
        if self.name.trim().is_empty() {
            return Err(Error::Validation(format!("node {} has an empty name", self.id)));
        }
        if self.node_type.requires_code() && self.code.is_none() {
            return Err(Error::Validation(format!(
                "{} node {} requires a code",
                self.node_type, self.id
            )));
        }
        if self.node_type.requires_path()
            && self.path.as_deref().map_or(true, |p| p.trim().is_empty())
        {
            return Err(Error::Validation(format!(
                "menu node {} requires a path",
                self.id
            )));
        }
        if let Some(code) = &self.code {
            validate_code(code)?;
        }
        Ok(())
    }
}

/// code 형식 검증
pub fn validate_code(code: &str) -> Result<()> {
    static CODE_PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = CODE_PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_:.\-]*$").expect("code pattern is valid")
    });

    if code.len() > MAX_CODE_LEN {
        return Err(Error::Validation(format!(
            "code '{}' is longer than {} characters",
            code, MAX_CODE_LEN
        )));
    }
    if !pattern.is_match(code) {
        return Err(Error::Validation(format!("code '{}' has an invalid format", code)));
    }
    Ok(())
}

// ============================================================================
// NodeDraft - 삽입용 노드 (id 생략 가능)
// ============================================================================

/// 삽입할 노드. `id`가 없으면 엔진이 `max(id) + 1`을 부여한다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDraft {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub chinese_name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sort: i32,
    #[serde(default)]
    pub status: NodeStatus,
}

impl NodeDraft {
    /// id가 확정된 Node로 변환
    pub fn into_node(self, id: i64) -> Node {
        Node {
            id,
            name: self.name,
            chinese_name: self.chinese_name,
            code: self.code,
            node_type: self.node_type,
            parent_id: self.parent_id,
            path: self.path,
            component: self.component,
            icon: self.icon,
            description: self.description,
            sort: self.sort,
            status: self.status,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }
}

impl From<Node> for NodeDraft {
    fn from(node: Node) -> Self {
        Self {
            id: Some(node.id),
            name: node.name,
            chinese_name: node.chinese_name,
            code: node.code,
            node_type: node.node_type,
            parent_id: node.parent_id,
            path: node.path,
            component: node.component,
            icon: node.icon,
            description: node.description,
            sort: node.sort,
            status: node.status,
        }
    }
}

// ============================================================================
// NodePatch - 표시용 필드 부분 수정
// ============================================================================

/// 표시/내비게이션 메타데이터 부분 수정 (None 필드는 유지)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePatch {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NodePatch {
    pub fn is_empty(&self) -> bool {
        self.node_type.is_none()
            && self.path.is_none()
            && self.component.is_none()
            && self.icon.is_none()
            && self.description.is_none()
    }

    pub fn apply_to(&self, node: &mut Node) {
        if let Some(node_type) = self.node_type {
            node.node_type = node_type;
        }
        if let Some(path) = &self.path {
            node.path = Some(path.clone());
        }
        if let Some(component) = &self.component {
            node.component = Some(component.clone());
        }
        if let Some(icon) = &self.icon {
            node.icon = Some(icon.clone());
        }
        if let Some(description) = &self.description {
            node.description = Some(description.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_requires_code() {
        let mut node = Node::new(5, "delete", NodeType::Button);
        assert!(matches!(node.validate_fields(), Err(Error::Validation(_))));

        node.code = Some("student:delete".to_string());
        assert!(node.validate_fields().is_ok());
    }

    #[test]
    fn test_menu_requires_path() {
        let node = Node::new(7, "Dashboard", NodeType::Menu);
        assert!(node.validate_fields().is_err());
        assert!(Node::menu(7, "Dashboard", "/dashboard").validate_fields().is_ok());
    }

    #[test]
    fn test_code_format() {
        assert!(validate_code("SYSTEM_USER").is_ok());
        assert!(validate_code("enrollment:plan.view").is_ok());
        assert!(validate_code("9lives").is_err());
        assert!(validate_code("has space").is_err());
        assert!(validate_code(&"a".repeat(MAX_CODE_LEN + 1)).is_err());
    }

    #[test]
    fn test_node_type_roundtrip_str() {
        for t in [NodeType::Category, NodeType::Menu, NodeType::Button, NodeType::Api] {
            assert_eq!(t.as_str().parse::<NodeType>().unwrap(), t);
        }
        assert!("page".parse::<NodeType>().is_err());
    }

    #[test]
    fn test_node_json_shape() {
        let node = Node::menu(3, "Students", "/students")
            .chinese_name("学生管理")
            .parent(1)
            .sort(20);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "menu");
        assert_eq!(json["chineseName"], "学生管理");
        assert_eq!(json["parentId"], 1);
        assert_eq!(json["status"], "enabled");
        assert!(json.get("createdAt").is_none());
    }

    #[test]
    fn test_patch_keeps_unset_fields() {
        let mut node = Node::menu(3, "Students", "/students").icon("user");
        let patch = NodePatch {
            component: Some("views/students/index.vue".to_string()),
            ..Default::default()
        };
        patch.apply_to(&mut node);
        assert_eq!(node.icon.as_deref(), Some("user"));
        assert_eq!(node.component.as_deref(), Some("views/students/index.vue"));
    }
}
