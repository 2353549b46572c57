//! MenuResolver - 역할별 메뉴 트리

use crate::integrity::TreeSnapshot;
use menutree_foundation::{Error, MenuTreeConfig, Node, NodeStore, NodeType, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

// ============================================================================
// RoleScope
// ============================================================================

/// 호출자의 권한 범위
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleScope {
    /// 직접 허용된 code
    #[serde(default)]
    pub allowed_codes: BTreeSet<String>,
    /// 역할 (role_grants로 code가 추가되고, 슈퍼유저 판정에 쓰인다)
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl RoleScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_codes: codes.into_iter().map(Into::into).collect(),
            roles: BTreeSet::new(),
        }
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.allowed_codes.insert(code.into());
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }
}

// ============================================================================
// MenuNode
// ============================================================================

/// 응답용 메뉴 노드 (타임스탬프 없음)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuNode {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub chinese_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub sort: i32,
    pub children: Vec<MenuNode>,
}

impl MenuNode {
    fn from_node(node: &Node, children: Vec<MenuNode>) -> Self {
        Self {
            id: node.id,
            name: node.name.clone(),
            chinese_name: node.chinese_name.clone(),
            code: node.code.clone(),
            node_type: node.node_type,
            path: node.path.clone(),
            component: node.component.clone(),
            icon: node.icon.clone(),
            sort: node.sort,
            children,
        }
    }

    /// 자기 자신을 포함한 전체 노드 수
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(MenuNode::node_count).sum::<usize>()
    }

    /// 자기 자신 또는 자손 중 조건에 맞는 노드가 있는지
    fn any(&self, pred: &impl Fn(&MenuNode) -> bool) -> bool {
        pred(self) || self.children.iter().any(|child| child.any(pred))
    }

    /// 전위 순회로 code 수집
    fn collect_codes<'a>(&'a self, out: &mut Vec<&'a str>) {
        if let Some(code) = &self.code {
            out.push(code);
        }
        for child in &self.children {
            child.collect_codes(out);
        }
    }
}

// ============================================================================
// MenuResolver
// ============================================================================

/// code 검사 방식
enum Gate {
    /// 슈퍼유저: 모든 code 허용
    All,
    Codes(BTreeSet<String>),
}

impl Gate {
    fn allows(&self, code: &str) -> bool {
        match self {
            Gate::All => true,
            Gate::Codes(codes) => codes.contains(code),
        }
    }

    fn admits(&self, node: &Node) -> bool {
        node.node_type == NodeType::Category
            || node.code.as_deref().map_or(true, |code| self.allows(code))
    }
}

/// 역할별 메뉴 트리 계산기
#[derive(Clone)]
pub struct MenuResolver {
    store: NodeStore,
    superuser_roles: BTreeSet<String>,
    max_depth: usize,
}

impl MenuResolver {
    pub fn new(store: NodeStore, config: &MenuTreeConfig) -> Self {
        Self {
            store,
            superuser_roles: config.superuser_roles.clone(),
            max_depth: config.max_depth,
        }
    }

    /// 범위에 보이는 메뉴 트리 (루트 목록)
    pub fn resolve_menu(&self, scope: &RoleScope) -> Result<Vec<MenuNode>> {
        let (tree, gate) = self.load(scope)?;
        let menu = self.build(&tree, &gate);

        debug!(
            "Resolved menu for roles {:?}: {} roots, {} nodes",
            scope.roles,
            menu.len(),
            menu.iter().map(MenuNode::node_count).sum::<usize>()
        );
        Ok(menu)
    }

    /// 범위에서 사용할 수 있는 code 목록 (활성 상태이고 도달 가능한 노드만)
    pub fn resolve_codes(&self, scope: &RoleScope) -> Result<BTreeSet<String>> {
        let (tree, gate) = self.load(scope)?;

        let menu = self.build(&tree, &gate);
        let mut codes = Vec::new();
        for root in &menu {
            root.collect_codes(&mut codes);
        }

        // category는 code 없이도 트리에 남으므로 다시 거른다
        Ok(codes
            .into_iter()
            .filter(|code| gate.allows(code))
            .map(String::from)
            .collect())
    }

    /// 범위가 `path` 또는 `code`에 해당하는 노드를 쓸 수 있는지.
    ///
    /// 둘 다 주어지면 어느 한쪽만 맞아도 된다. 노드가 `resolve_menu` 결과에
    /// 보일 때만 true이므로, 비활성 조상 아래의 노드는 거부된다.
    pub fn check_permission(
        &self,
        scope: &RoleScope,
        path: Option<&str>,
        code: Option<&str>,
    ) -> Result<bool> {
        if path.is_none() && code.is_none() {
            return Err(Error::Validation(
                "permission check needs a path or a code".to_string(),
            ));
        }

        let (tree, gate) = self.load(scope)?;
        let menu = self.build(&tree, &gate);
        let matches = |node: &MenuNode| {
            (path.is_some() && node.path.as_deref() == path)
                || (code.is_some() && node.code.as_deref() == code)
        };
        let allowed = menu.iter().any(|root| root.any(&matches));

        debug!(
            "Permission check for roles {:?} (path={:?}, code={:?}): {}",
            scope.roles, path, code, allowed
        );
        Ok(allowed)
    }

    fn load(&self, scope: &RoleScope) -> Result<(TreeSnapshot, Gate)> {
        let (nodes, granted) = self.store.read_view(&scope.roles)?;
        let tree = TreeSnapshot::from_nodes(nodes);

        let gate = if scope.roles.iter().any(|r| self.superuser_roles.contains(r)) {
            debug!("Superuser scope, skipping code checks");
            Gate::All
        } else {
            let mut codes = scope.allowed_codes.clone();
            codes.extend(granted);
            Gate::Codes(codes)
        };

        Ok((tree, gate))
    }

    fn build(&self, tree: &TreeSnapshot, gate: &Gate) -> Vec<MenuNode> {
        let mut visited = BTreeSet::new();
        tree.children_of(None)
            .into_iter()
            .filter_map(|root| self.visit(tree, root, gate, 1, &mut visited))
            .collect()
    }

    fn visit(
        &self,
        tree: &TreeSnapshot,
        node: &Node,
        gate: &Gate,
        depth: usize,
        visited: &mut BTreeSet<i64>,
    ) -> Option<MenuNode> {
        if !node.is_enabled() || !gate.admits(node) {
            return None;
        }
        if depth > self.max_depth {
            warn!(
                "Node {} is deeper than {}, skipping its subtree",
                node.id, self.max_depth
            );
            return None;
        }
        if !visited.insert(node.id) {
            warn!("Node {} reached twice, skipping", node.id);
            return None;
        }

        let children: Vec<MenuNode> = tree
            .children_of(Some(node.id))
            .into_iter()
            .filter_map(|child| self.visit(tree, child, gate, depth + 1, visited))
            .collect();

        if node.node_type == NodeType::Category && children.is_empty() {
            return None;
        }
        Some(MenuNode::from_node(node, children))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reorg::{Batch, Mutation, ReorgEngine};

    fn resolver() -> MenuResolver {
        let config = MenuTreeConfig::default();
        let store = NodeStore::in_memory().unwrap();
        ReorgEngine::new(store.clone(), &config)
            .apply(&Batch::from(vec![
                Mutation::insert(Node::category(1, "system").sort(1)),
                Mutation::insert(Node::menu(2, "users", "/users").parent(1).code("user:list")),
                Mutation::insert(Node::button(3, "user-add", "user:add").parent(2)),
                Mutation::insert(Node::menu(4, "about", "/about").sort(2)),
                Mutation::insert(Node::category(5, "empty").sort(3)),
                Mutation::grant("teacher", "user:list"),
            ]))
            .unwrap();
        MenuResolver::new(store, &config)
    }

    fn ids(menu: &[MenuNode]) -> Vec<i64> {
        menu.iter().map(|n| n.id).collect()
    }

    #[test]
    fn test_code_gating_and_pruning() {
        let resolver = resolver();

        let anonymous = resolver.resolve_menu(&RoleScope::new()).unwrap();
        // system has no visible child, empty has no child at all
        assert_eq!(ids(&anonymous), vec![4]);

        let teacher = resolver
            .resolve_menu(&RoleScope::new().role("teacher"))
            .unwrap();
        assert_eq!(ids(&teacher), vec![1, 4]);
        assert_eq!(ids(&teacher[0].children), vec![2]);
        assert!(teacher[0].children[0].children.is_empty());
    }

    #[test]
    fn test_superuser_bypasses_codes() {
        let resolver = resolver();
        let admin = resolver.resolve_menu(&RoleScope::new().role("admin")).unwrap();
        assert_eq!(ids(&admin), vec![1, 4]);
        assert_eq!(ids(&admin[0].children[0].children), vec![3]);

        let codes = resolver.resolve_codes(&RoleScope::new().role("admin")).unwrap();
        assert_eq!(
            codes.into_iter().collect::<Vec<_>>(),
            vec!["user:add".to_string(), "user:list".to_string()]
        );
    }

    #[test]
    fn test_resolve_codes_for_scope() {
        let resolver = resolver();
        let scope = RoleScope::with_codes(["user:list", "user:add", "ghost:code"]);
        let codes = resolver.resolve_codes(&scope).unwrap();
        assert_eq!(codes.len(), 2);
        assert!(!codes.contains("ghost:code"));
    }

    #[test]
    fn test_menu_json_has_no_timestamps() {
        let resolver = resolver();
        let menu = resolver.resolve_menu(&RoleScope::new()).unwrap();
        let json = serde_json::to_value(&menu).unwrap();
        assert_eq!(json[0]["type"], "menu");
        assert!(json[0].get("createdAt").is_none());
        assert_eq!(json[0]["children"], serde_json::json!([]));
    }

    #[test]
    fn test_check_permission_by_path_or_code() {
        let resolver = resolver();
        let teacher = RoleScope::new().role("teacher");

        assert!(resolver.check_permission(&teacher, Some("/users"), None).unwrap());
        assert!(resolver.check_permission(&teacher, None, Some("user:list")).unwrap());
        assert!(!resolver.check_permission(&teacher, None, Some("user:add")).unwrap());
        // 어느 한쪽만 맞으면 된다
        assert!(resolver
            .check_permission(&teacher, Some("/nowhere"), Some("user:list"))
            .unwrap());
        assert!(!resolver
            .check_permission(&RoleScope::new(), Some("/users"), None)
            .unwrap());

        let admin = RoleScope::new().role("admin");
        assert!(resolver.check_permission(&admin, None, Some("user:add")).unwrap());
        assert!(!resolver.check_permission(&admin, None, Some("ghost:code")).unwrap());
    }

    #[test]
    fn test_check_permission_needs_a_target() {
        let resolver = resolver();
        assert!(matches!(
            resolver.check_permission(&RoleScope::new().role("admin"), None, None),
            Err(Error::Validation(_))
        ));
    }
}
