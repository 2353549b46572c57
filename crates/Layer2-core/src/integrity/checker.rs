//! IntegrityChecker - 변경 검증 및 전체 트리 감사
//!
//! 검증 순서:
//! 0. 입력 형식 (Validation)
//! 1. 대상 노드 존재 (NotFound)
//! 2. 새 부모 존재 (NotFound)
//! 3. 순환 없음 (CycleDetected)
//! 4. code 중복 없음 (DuplicateCode)
//! 5. 깊이 제한 (DepthExceeded)
//! 6. 형제 이름 중복 (DuplicateSibling, 설정으로 켤 때만)

use super::snapshot::TreeSnapshot;
use crate::reorg::Mutation;
use menutree_foundation::{validate_code, Error, MenuTreeConfig, Node, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// 변경 검증기 (순수 함수, 상태 없음)
#[derive(Debug, Clone)]
pub struct IntegrityChecker {
    max_depth: usize,
    reject_duplicate_sibling_names: bool,
}

impl Default for IntegrityChecker {
    fn default() -> Self {
        Self::new(&MenuTreeConfig::default())
    }
}

impl IntegrityChecker {
    pub fn new(config: &MenuTreeConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            reject_duplicate_sibling_names: config.reject_duplicate_sibling_names,
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// 현재 트리 기준으로 변경 하나를 검증
    pub fn validate(&self, mutation: &Mutation, tree: &TreeSnapshot) -> Result<()> {
        Self::validate_shape(mutation)?;

        match mutation {
            Mutation::SetParent { id, parent_id, .. } => {
                let node = Self::require(tree, *id)?;
                if let Some(parent) = parent_id {
                    Self::require(tree, *parent)?;
                    if tree.is_ancestor_or_self(*id, *parent) {
                        return Err(Error::CycleDetected {
                            id: *id,
                            parent_id: *parent,
                        });
                    }
                }
                self.check_depth(tree, *id, *parent_id, tree.subtree_height(*id))?;
                self.check_sibling(tree, *parent_id, &node.name, &node.chinese_name, &[*id])
            }

            Mutation::Rename {
                id,
                name,
                chinese_name,
            } => {
                let node = Self::require(tree, *id)?;
                let chinese_name = chinese_name.as_deref().unwrap_or(&node.chinese_name);
                self.check_sibling(tree, node.parent_id, name, chinese_name, &[*id])
            }

            Mutation::SetStatus { id, .. } => Self::require(tree, *id).map(|_| ()),

            Mutation::Insert { node: draft } => {
                let id = draft.id.unwrap_or_else(|| tree.next_id());
                let node = draft.clone().into_node(id);
                node.validate_fields()?;
                if tree.contains(id) {
                    return Err(Error::Validation(format!("node {} already exists", id)));
                }
                if let Some(parent) = node.parent_id {
                    Self::require(tree, parent)?;
                }
                Self::check_code(tree, id, node.code.as_deref())?;
                self.check_depth(tree, id, node.parent_id, 1)?;
                self.check_sibling(tree, node.parent_id, &node.name, &node.chinese_name, &[])
            }

            Mutation::Remove {
                id,
                reparent_children_to,
            } => {
                Self::require(tree, *id)?;
                let kids: Vec<&Node> = tree.children_of(Some(*id));
                if let Some(target) = reparent_children_to {
                    Self::require(tree, *target)?;
                    if tree.is_ancestor_or_self(*id, *target) {
                        return Err(Error::CycleDetected {
                            id: *id,
                            parent_id: *target,
                        });
                    }
                }
                for kid in &kids {
                    self.check_depth(
                        tree,
                        kid.id,
                        *reparent_children_to,
                        tree.subtree_height(kid.id),
                    )?;
                    self.check_sibling(
                        tree,
                        *reparent_children_to,
                        &kid.name,
                        &kid.chinese_name,
                        &[*id, kid.id],
                    )?;
                }
                Ok(())
            }

            Mutation::SetCode { id, code } => {
                let node = Self::require(tree, *id)?;
                if code.is_none() && node.node_type.requires_code() {
                    return Err(Error::Validation(format!(
                        "{} node {} requires a code",
                        node.node_type, id
                    )));
                }
                Self::check_code(tree, *id, code.as_deref())
            }

            Mutation::Update { id, patch } => {
                let mut node = Self::require(tree, *id)?.clone();
                patch.apply_to(&mut node);
                node.validate_fields()
            }

            Mutation::Grant { code, .. } => {
                if tree.code_holder(code).is_none() {
                    return Err(Error::NotFound(format!("code '{}'", code)));
                }
                Ok(())
            }

            Mutation::Revoke { .. } => Ok(()),
        }
    }

    /// 트리를 보지 않고 할 수 있는 입력 검사
    fn validate_shape(mutation: &Mutation) -> Result<()> {
        match mutation {
            Mutation::Rename { id, name, .. } if name.trim().is_empty() => Err(Error::Validation(
                format!("node {} cannot be renamed to an empty name", id),
            )),
            Mutation::SetCode {
                code: Some(code), ..
            } => validate_code(code),
            Mutation::Grant { role, code } | Mutation::Revoke { role, code } => {
                if role.trim().is_empty() {
                    return Err(Error::Validation("role must not be empty".to_string()));
                }
                validate_code(code)
            }
            _ => Ok(()),
        }
    }

    fn require(tree: &TreeSnapshot, id: i64) -> Result<&Node> {
        tree.get(id).ok_or_else(|| Error::node_not_found(id))
    }

    fn check_code(tree: &TreeSnapshot, id: i64, code: Option<&str>) -> Result<()> {
        if let Some(code) = code {
            if let Some(existing_id) = tree.code_holder(code) {
                if existing_id != id {
                    return Err(Error::DuplicateCode {
                        code: code.to_string(),
                        existing_id,
                    });
                }
            }
        }
        Ok(())
    }

    /// 새 부모 아래에 높이 `height`인 서브트리를 붙였을 때 깊이 검사
    fn check_depth(
        &self,
        tree: &TreeSnapshot,
        id: i64,
        parent_id: Option<i64>,
        height: usize,
    ) -> Result<()> {
        let parent_depth = match parent_id {
            Some(parent) => tree.depth(parent).ok_or_else(|| {
                Error::Validation(format!("parent {} is not connected to a root", parent))
            })?,
            None => 0,
        };
        let depth = parent_depth + height;
        if depth > self.max_depth {
            return Err(Error::DepthExceeded {
                id,
                depth,
                max: self.max_depth,
            });
        }
        Ok(())
    }

    fn check_sibling(
        &self,
        tree: &TreeSnapshot,
        parent_id: Option<i64>,
        name: &str,
        chinese_name: &str,
        exclude: &[i64],
    ) -> Result<()> {
        if !self.reject_duplicate_sibling_names {
            return Ok(());
        }
        if let Some(sibling) = tree.sibling_named(parent_id, name, chinese_name, exclude) {
            let clash = if sibling.name == name {
                name
            } else {
                chinese_name
            };
            return Err(Error::DuplicateSibling {
                parent_id,
                name: clash.to_string(),
            });
        }
        Ok(())
    }

    // ========================================================================
    // 전체 감사
    // ========================================================================

    /// 스냅샷 전체의 무결성 감사
    pub fn audit(&self, tree: &TreeSnapshot) -> TreeReport {
        let mut report = TreeReport {
            node_count: tree.len(),
            ..Default::default()
        };

        let mut codes: BTreeMap<&str, Vec<i64>> = BTreeMap::new();
        let mut cyclic: BTreeSet<i64> = BTreeSet::new();

        for node in tree.nodes() {
            if let Some(code) = &node.code {
                codes.entry(code.as_str()).or_default().push(node.id);
            }

            if let Some(parent) = node.parent_id {
                if !tree.contains(parent) {
                    report.dangling_parents.push((node.id, parent));
                    continue;
                }
            }

            match tree.depth(node.id) {
                Some(depth) if depth > self.max_depth => report.too_deep.push((node.id, depth)),
                Some(_) => {}
                None => {
                    // 끊긴 부모 아래의 노드도 None이 되므로 실제 순환만 구분한다
                    if Self::on_cycle(tree, node.id) {
                        cyclic.insert(node.id);
                    } else {
                        report.detached.push(node.id);
                    }
                }
            }
        }

        report.cycles = cyclic.into_iter().collect();
        report.duplicate_codes = codes
            .into_iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(code, ids)| (code.to_string(), ids))
            .collect();
        report
    }

    fn on_cycle(tree: &TreeSnapshot, id: i64) -> bool {
        let mut seen = BTreeSet::new();
        let mut current = Some(id);
        while let Some(cur) = current {
            if !seen.insert(cur) {
                return true;
            }
            current = tree.get(cur).and_then(|n| n.parent_id);
        }
        false
    }
}

/// 전체 감사 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeReport {
    pub node_count: usize,
    /// 순환에 걸린 노드 (순환 위에 있거나 순환으로 이어지는 노드)
    pub cycles: Vec<i64>,
    /// (노드, 없는 부모)
    pub dangling_parents: Vec<(i64, i64)>,
    /// 끊긴 부모 아래에 매달린 노드
    pub detached: Vec<i64>,
    /// (code, 노드들)
    pub duplicate_codes: Vec<(String, Vec<i64>)>,
    /// (노드, 깊이)
    pub too_deep: Vec<(i64, usize)>,
}

impl TreeReport {
    pub fn is_healthy(&self) -> bool {
        self.cycles.is_empty()
            && self.dangling_parents.is_empty()
            && self.detached.is_empty()
            && self.duplicate_codes.is_empty()
            && self.too_deep.is_empty()
    }
}
