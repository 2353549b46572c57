//! TreeSnapshot - 메모리상의 노드 트리
//!
//! 배치 검증은 "앞선 변경이 모두 적용된 상태"를 기준으로 하므로,
//! 엔진은 스냅샷에 변경을 순서대로 적용하면서 검증한다.

use crate::reorg::Mutation;
use menutree_foundation::{Error, Node, NodeStatus, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// 스냅샷에 변경을 적용한 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedChange {
    /// 새로 삽입된 노드
    pub inserted: Option<i64>,
    /// 행이 바뀐 노드 (Remove 시 재연결된 자식 포함)
    pub updated: Vec<i64>,
    /// 삭제된 노드
    pub removed: Option<i64>,
    /// 더 이상 어떤 노드도 갖지 않는 code (역할 부여 정리용)
    pub dropped_code: Option<String>,
}

impl AppliedChange {
    /// 영향을 받은 모든 id
    pub fn affected_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.inserted
            .iter()
            .chain(self.updated.iter())
            .chain(self.removed.iter())
            .copied()
    }
}

/// 노드 트리 스냅샷 (id 순으로 결정적)
#[derive(Debug, Clone, Default)]
pub struct TreeSnapshot {
    nodes: BTreeMap<i64, Node>,
    children: HashMap<Option<i64>, BTreeSet<i64>>,
    codes: HashMap<String, i64>,
}

impl TreeSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let mut tree = Self::new();
        for node in nodes {
            tree.index(node);
        }
        tree
    }

    fn index(&mut self, node: Node) {
        self.children.entry(node.parent_id).or_default().insert(node.id);
        if let Some(code) = &node.code {
            self.codes.insert(code.clone(), node.id);
        }
        self.nodes.insert(node.id, node);
    }

    fn unindex(&mut self, id: i64) -> Option<Node> {
        let node = self.nodes.remove(&id)?;
        if let Some(siblings) = self.children.get_mut(&node.parent_id) {
            siblings.remove(&id);
        }
        if let Some(code) = &node.code {
            if self.codes.get(code) == Some(&id) {
                self.codes.remove(code);
            }
        }
        Some(node)
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.nodes.contains_key(&id)
    }

    /// id 오름차순 전체 노드
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// code를 가진 노드 id
    pub fn code_holder(&self, code: &str) -> Option<i64> {
        self.codes.get(code).copied()
    }

    /// 자식 노드 (sort 오름차순, id 오름차순)
    pub fn children_of(&self, parent_id: Option<i64>) -> Vec<&Node> {
        let mut children: Vec<&Node> = self
            .children
            .get(&parent_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.nodes.get(id))
            .collect();
        children.sort_by_key(|n| n.order_key());
        children
    }

    /// 자손 노드 (자기 자신 제외). 레벨 순, 같은 레벨은 (sort, id) 순.
    pub fn descendants(&self, id: i64) -> Vec<&Node> {
        let mut out = Vec::new();
        let mut seen = BTreeSet::from([id]);
        let mut level = vec![id];

        while !level.is_empty() {
            let mut next: Vec<&Node> = level
                .iter()
                .flat_map(|cur| self.children_of(Some(*cur)))
                .filter(|child| seen.insert(child.id))
                .collect();
            next.sort_by_key(|n| n.order_key());
            level = next.iter().map(|n| n.id).collect();
            out.extend(next);
        }
        out
    }

    /// 새 노드에 부여할 id (`max(id) + 1`)
    pub fn next_id(&self) -> i64 {
        self.nodes.keys().next_back().map_or(1, |max| max + 1)
    }

    /// 루트까지의 깊이 (루트 = 1). 순환이나 끊긴 부모면 None.
    pub fn depth(&self, id: i64) -> Option<usize> {
        let mut depth = 0;
        let mut current = Some(id);
        while let Some(cur) = current {
            let node = self.nodes.get(&cur)?;
            depth += 1;
            if depth > self.nodes.len() {
                return None;
            }
            current = node.parent_id;
        }
        Some(depth)
    }

    /// `ancestor`가 `id`의 조상(또는 자기 자신)인지. 부모 사슬을 최대 len()번 따라간다.
    pub fn is_ancestor_or_self(&self, ancestor: i64, id: i64) -> bool {
        let mut current = Some(id);
        let mut steps = 0;
        while let Some(cur) = current {
            if cur == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.nodes.len() {
                return false;
            }
            current = self.nodes.get(&cur).and_then(|n| n.parent_id);
        }
        false
    }

    /// 서브트리 높이 (잎 = 1)
    pub fn subtree_height(&self, id: i64) -> usize {
        let mut height = 0;
        let mut level = vec![id];
        let mut seen = BTreeSet::new();
        while !level.is_empty() {
            height += 1;
            let mut next = Vec::new();
            for cur in level {
                if !seen.insert(cur) {
                    continue;
                }
                if let Some(kids) = self.children.get(&Some(cur)) {
                    next.extend(kids.iter().copied().filter(|k| !seen.contains(k)));
                }
            }
            level = next;
        }
        height
    }

    /// 같은 부모 아래에서 name/chineseName이 겹치는 형제
    pub fn sibling_named(
        &self,
        parent_id: Option<i64>,
        name: &str,
        chinese_name: &str,
        exclude: &[i64],
    ) -> Option<&Node> {
        self.children_of(parent_id).into_iter().find(|sibling| {
            !exclude.contains(&sibling.id)
                && (sibling.name == name
                    || (!chinese_name.is_empty() && sibling.chinese_name == chinese_name))
        })
    }

    // ========================================================================
    // 변경 적용 (검증은 IntegrityChecker 담당)
    // ========================================================================

    /// 검증된 변경을 스냅샷에 적용
    pub fn apply(&mut self, mutation: &Mutation) -> Result<AppliedChange> {
        let mut change = AppliedChange::default();

        match mutation {
            Mutation::SetParent {
                id,
                parent_id,
                sort,
            } => {
                let mut node = self.take(*id)?;
                node.parent_id = *parent_id;
                if let Some(sort) = sort {
                    node.sort = *sort;
                }
                self.index(node);
                change.updated.push(*id);
            }
            Mutation::Rename {
                id,
                name,
                chinese_name,
            } => {
                let node = self.node_mut(*id)?;
                node.name = name.clone();
                if let Some(chinese_name) = chinese_name {
                    node.chinese_name = chinese_name.clone();
                }
                change.updated.push(*id);
            }
            Mutation::SetStatus { id, enabled } => {
                self.node_mut(*id)?.status = NodeStatus::from_enabled(*enabled);
                change.updated.push(*id);
            }
            Mutation::SetCode { id, code } => {
                let mut node = self.take(*id)?;
                if node.code != *code {
                    change.dropped_code = node.code.take();
                }
                node.code = code.clone();
                self.index(node);
                change.updated.push(*id);
            }
            Mutation::Update { id, patch } => {
                patch.apply_to(self.node_mut(*id)?);
                change.updated.push(*id);
            }
            Mutation::Insert { node } => {
                let id = node.id.unwrap_or_else(|| self.next_id());
                if self.contains(id) {
                    return Err(Error::Validation(format!("node {} already exists", id)));
                }
                self.index(node.clone().into_node(id));
                change.inserted = Some(id);
            }
            Mutation::Remove {
                id,
                reparent_children_to,
            } => {
                let removed = self.take(*id)?;
                let kids: Vec<i64> = self
                    .children
                    .get(&Some(*id))
                    .map(|k| k.iter().copied().collect())
                    .unwrap_or_default();
                for kid in kids {
                    let mut child = self.take(kid)?;
                    child.parent_id = *reparent_children_to;
                    self.index(child);
                    change.updated.push(kid);
                }
                self.children.remove(&Some(*id));
                change.removed = Some(*id);
                change.dropped_code = removed.code;
            }
            Mutation::Grant { .. } | Mutation::Revoke { .. } => {}
        }

        Ok(change)
    }

    fn take(&mut self, id: i64) -> Result<Node> {
        self.unindex(id).ok_or_else(|| Error::node_not_found(id))
    }

    fn node_mut(&mut self, id: i64) -> Result<&mut Node> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| Error::node_not_found(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use menutree_foundation::NodeType;

    fn sample() -> TreeSnapshot {
        TreeSnapshot::from_nodes(vec![
            Node::category(1, "root").sort(1),
            Node::menu(2, "a", "/a").parent(1).sort(5),
            Node::menu(3, "b", "/b").parent(1).sort(5),
            Node::button(4, "a-add", "a:add").parent(2),
        ])
    }

    #[test]
    fn test_depth_and_height() {
        let tree = sample();
        assert_eq!(tree.depth(1), Some(1));
        assert_eq!(tree.depth(4), Some(3));
        assert_eq!(tree.subtree_height(1), 3);
        assert_eq!(tree.subtree_height(4), 1);
        assert_eq!(tree.next_id(), 5);
    }

    #[test]
    fn test_children_order() {
        let tree = sample();
        let ids: Vec<i64> = tree.children_of(Some(1)).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(tree.children_of(None).len(), 1);
    }

    #[test]
    fn test_descendants_level_order() {
        let mut tree = sample();
        tree.apply(&Mutation::insert(Node::button(5, "b-add", "b:add").parent(3)))
            .unwrap();

        let ids: Vec<i64> = tree.descendants(1).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![2, 3, 4, 5]);
        assert!(tree.descendants(4).is_empty());
        assert!(tree.descendants(42).is_empty());

        let looped = TreeSnapshot::from_nodes(vec![
            Node::category(1, "x").parent(2),
            Node::category(2, "y").parent(1),
        ]);
        let ids: Vec<i64> = looped.descendants(1).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_malformed_cycle_depth_is_none() {
        let tree = TreeSnapshot::from_nodes(vec![
            Node::category(1, "x").parent(2),
            Node::category(2, "y").parent(1),
        ]);
        assert_eq!(tree.depth(1), None);
        assert!(!tree.is_ancestor_or_self(3, 1));
    }

    #[test]
    fn test_remove_relinks_children() {
        let mut tree = sample();
        let change = tree
            .apply(&Mutation::Remove {
                id: 2,
                reparent_children_to: None,
            })
            .unwrap();
        assert_eq!(change.removed, Some(2));
        assert_eq!(change.updated, vec![4]);
        assert!(tree.get(4).unwrap().is_root());
        assert!(tree.get(2).is_none());
    }

    #[test]
    fn test_set_code_drops_old_code() {
        let mut tree = sample();
        let change = tree
            .apply(&Mutation::SetCode {
                id: 4,
                code: Some("a:create".to_string()),
            })
            .unwrap();
        assert_eq!(change.dropped_code.as_deref(), Some("a:add"));
        assert_eq!(tree.code_holder("a:create"), Some(4));
        assert_eq!(tree.code_holder("a:add"), None);
        assert_eq!(tree.get(4).unwrap().node_type, NodeType::Button);
    }
}
