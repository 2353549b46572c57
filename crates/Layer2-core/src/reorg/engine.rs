//! ReorgEngine - 배치 단위 트리 재구성
//!
//! 배치 하나 = `BEGIN IMMEDIATE` 트랜잭션 하나.
//! 변경은 앞선 변경이 모두 적용된 스냅샷 기준으로 검증되고,
//! 하나라도 실패하면 전체가 롤백된다.

use super::mutation::{Batch, Mutation};
use crate::integrity::{AppliedChange, IntegrityChecker, TreeReport, TreeSnapshot};
use menutree_foundation::{
    BatchRecord, Error, MenuTreeConfig, Node, NodeStore, NodeTx, Result,
};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// 배치 적용 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    /// 커밋된 배치 id (빈 배치나 dry run이면 None)
    pub batch_id: Option<String>,
    /// 적용 후 노드 수
    pub node_count: usize,
    /// 영향 받은 노드 id (오름차순, 중복 없음)
    pub affected_ids: Vec<i64>,
}

/// 이름 있는 마이그레이션 적용 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MigrationOutcome {
    Applied(BatchOutcome),
    AlreadyApplied { name: String },
}

impl MigrationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// 트리 재구성 엔진 (유일한 공개 쓰기 경로)
#[derive(Clone)]
pub struct ReorgEngine {
    store: NodeStore,
    checker: IntegrityChecker,
}

impl ReorgEngine {
    pub fn new(store: NodeStore, config: &MenuTreeConfig) -> Self {
        Self {
            store,
            checker: IntegrityChecker::new(config),
        }
    }

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    pub fn checker(&self) -> &IntegrityChecker {
        &self.checker
    }

    /// 현재 저장소 상태의 스냅샷
    pub fn snapshot(&self) -> Result<TreeSnapshot> {
        Ok(TreeSnapshot::from_nodes(self.store.list_all()?))
    }

    /// 저장소 전체 감사
    pub fn audit(&self) -> Result<TreeReport> {
        let report = self.checker.audit(&self.snapshot()?);
        if !report.is_healthy() {
            warn!("Tree audit found problems: {:?}", report);
        }
        Ok(report)
    }

    // ========================================================================
    // Apply
    // ========================================================================

    /// 배치를 원자적으로 적용
    pub fn apply(&self, batch: &Batch) -> Result<BatchOutcome> {
        if batch.is_empty() {
            debug!("Empty batch, nothing to commit");
            return Ok(BatchOutcome {
                batch_id: None,
                node_count: self.store.count()?,
                affected_ids: Vec::new(),
            });
        }

        self.store
            .with_write_tx(|tx| self.commit(tx, batch, batch.name.as_deref()))
    }

    /// 이름 있는 배치를 한 번만 적용
    pub fn apply_migration(&self, name: &str, batch: &Batch) -> Result<MigrationOutcome> {
        if name.trim().is_empty() {
            return Err(Error::Validation("migration name must not be empty".to_string()));
        }

        self.store.with_write_tx(|tx| {
            if tx.is_migration_applied(name)? {
                info!("Migration '{}' already applied, skipping", name);
                return Ok(MigrationOutcome::AlreadyApplied {
                    name: name.to_string(),
                });
            }

            let outcome = self.commit(tx, batch, Some(name))?;
            if let Some(batch_id) = &outcome.batch_id {
                tx.record_migration(name, batch_id)?;
            }
            Ok(MigrationOutcome::Applied(outcome))
        })
    }

    /// 쓰기 없이 검증만 (그 시점에 apply가 낼 판정과 같다)
    pub fn dry_run(&self, batch: &Batch) -> Result<BatchOutcome> {
        let mut tree = self.snapshot()?;
        let affected = self.run(&mut tree, batch, None)?;

        debug!(
            "Dry run passed: {} mutations, {} nodes affected",
            batch.len(),
            affected.len()
        );
        Ok(BatchOutcome {
            batch_id: None,
            node_count: tree.len(),
            affected_ids: affected.into_iter().collect(),
        })
    }

    /// 열린 트랜잭션 안에서 배치 적용 + 기록
    fn commit(&self, tx: &NodeTx<'_>, batch: &Batch, name: Option<&str>) -> Result<BatchOutcome> {
        let mut tree = TreeSnapshot::from_nodes(tx.load_nodes()?);
        let affected = self.run(&mut tree, batch, Some(tx))?;

        let batch_id = uuid::Uuid::new_v4().to_string();
        let affected_ids: Vec<i64> = affected.into_iter().collect();

        tx.record_batch(&BatchRecord {
            batch_id: batch_id.clone(),
            name: name.map(String::from),
            mutation_count: batch.len(),
            affected_ids: affected_ids.clone(),
            applied_at: chrono::Utc::now().to_rfc3339(),
        })?;

        info!(
            "Applied batch {}{} ({} mutations, {} nodes affected)",
            batch_id,
            name.map(|n| format!(" '{}'", n)).unwrap_or_default(),
            batch.len(),
            affected_ids.len()
        );

        Ok(BatchOutcome {
            batch_id: Some(batch_id),
            node_count: tree.len(),
            affected_ids,
        })
    }

    /// 변경을 순서대로 검증 + 적용. 실패하면 해당 index로 BatchRejected.
    fn run(
        &self,
        tree: &mut TreeSnapshot,
        batch: &Batch,
        tx: Option<&NodeTx<'_>>,
    ) -> Result<BTreeSet<i64>> {
        let mut affected = BTreeSet::new();

        for (index, mutation) in batch.mutations.iter().enumerate() {
            let change = self.step(tree, mutation, tx).map_err(|e| {
                warn!(
                    "Batch rejected at mutation {} ({}): {}",
                    index,
                    mutation.kind(),
                    e
                );
                Error::batch_rejected(index, e)
            })?;

            debug!(
                "[{}] {} target={:?}",
                index,
                mutation.kind(),
                mutation.target_id()
            );
            affected.extend(change.affected_ids());
        }

        Ok(affected)
    }

    fn step(
        &self,
        tree: &mut TreeSnapshot,
        mutation: &Mutation,
        tx: Option<&NodeTx<'_>>,
    ) -> Result<AppliedChange> {
        self.checker.validate(mutation, tree)?;
        let change = tree.apply(mutation)?;
        if let Some(tx) = tx {
            Self::write(tx, tree, mutation, &change)?;
        }
        Ok(change)
    }

    /// 스냅샷에 반영된 변경을 트랜잭션에 기록
    fn write(
        tx: &NodeTx<'_>,
        tree: &TreeSnapshot,
        mutation: &Mutation,
        change: &AppliedChange,
    ) -> Result<()> {
        if let Some(id) = change.inserted {
            tx.insert_node(Self::node(tree, id)?)?;
        }
        // 재연결된 자식을 먼저 갱신해야 부모 행을 지울 수 있다
        for id in &change.updated {
            tx.update_node(Self::node(tree, *id)?)?;
        }
        if let Some(id) = change.removed {
            tx.delete_node(id)?;
        }
        if let Some(code) = &change.dropped_code {
            if tree.code_holder(code).is_none() {
                let dropped = tx.delete_grants_for_code(code)?;
                if dropped > 0 {
                    debug!("Dropped {} grants for code '{}'", dropped, code);
                }
            }
        }

        match mutation {
            Mutation::Grant { role, code } => tx.insert_grant(role, code)?,
            Mutation::Revoke { role, code } => {
                tx.delete_grant(role, code)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn node(tree: &TreeSnapshot, id: i64) -> Result<&Node> {
        tree.get(id)
            .ok_or_else(|| Error::Internal(format!("node {} missing from working tree", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> ReorgEngine {
        let store = NodeStore::in_memory().unwrap();
        let engine = ReorgEngine::new(store, &MenuTreeConfig::default());
        engine
            .apply(&Batch::from(vec![
                Mutation::insert(Node::category(1, "system").sort(10)),
                Mutation::insert(Node::menu(2, "users", "/system/users").parent(1)),
                Mutation::insert(Node::button(3, "user-add", "user:add").parent(2)),
            ]))
            .unwrap();
        engine
    }

    #[test]
    fn test_apply_commits_and_records_history() {
        let engine = engine();
        assert_eq!(engine.store().count().unwrap(), 3);

        let history = engine.store().history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].affected_ids, vec![1, 2, 3]);
        assert_eq!(history[0].mutation_count, 3);
    }

    #[test]
    fn test_insert_without_id_gets_next_id() {
        let engine = engine();
        let draft = menutree_foundation::NodeDraft {
            id: None,
            ..menutree_foundation::NodeDraft::from(Node::category(0, "marketing"))
        };
        let outcome = engine.apply(&Batch::from(vec![Mutation::insert(draft)])).unwrap();
        assert_eq!(outcome.affected_ids, vec![4]);
        assert_eq!(engine.store().get_by_id(4).unwrap().name, "marketing");
    }

    #[test]
    fn test_rejected_batch_leaves_store_untouched() {
        let engine = engine();
        let before = engine.store().list_all().unwrap();

        let err = engine
            .apply(&Batch::from(vec![
                Mutation::rename(2, "members", None),
                Mutation::set_parent(1, Some(3), None),
            ]))
            .unwrap_err();

        match err {
            Error::BatchRejected { index, cause } => {
                assert_eq!(index, 1);
                assert!(matches!(*cause, Error::CycleDetected { id: 1, parent_id: 3 }));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(engine.store().list_all().unwrap(), before);
        assert_eq!(engine.store().history(10).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_batch_commits_nothing() {
        let engine = engine();
        let outcome = engine.apply(&Batch::new()).unwrap();
        assert_eq!(outcome.batch_id, None);
        assert!(outcome.affected_ids.is_empty());
        assert_eq!(outcome.node_count, 3);
        assert_eq!(engine.store().history(10).unwrap().len(), 1);
    }

    #[test]
    fn test_remove_drops_grants_for_code() {
        let engine = engine();
        engine
            .apply(&Batch::from(vec![Mutation::grant("teacher", "user:add")]))
            .unwrap();
        assert_eq!(engine.store().list_grants().unwrap().len(), 1);

        engine
            .apply(&Batch::from(vec![Mutation::remove(3, None)]))
            .unwrap();
        assert!(engine.store().list_grants().unwrap().is_empty());
    }

    #[test]
    fn test_migration_applies_once() {
        let engine = engine();
        let batch = Batch::from(vec![Mutation::rename(1, "settings", None)]);

        let first = engine.apply_migration("20240315-rename-system", &batch).unwrap();
        assert!(first.is_applied());

        let second = engine.apply_migration("20240315-rename-system", &batch).unwrap();
        assert_eq!(
            second,
            MigrationOutcome::AlreadyApplied {
                name: "20240315-rename-system".to_string()
            }
        );
        assert_eq!(engine.store().history(10).unwrap().len(), 2);
        assert_eq!(engine.store().applied_migrations().unwrap().len(), 1);
    }

    #[test]
    fn test_dry_run_matches_apply_without_writing() {
        let engine = engine();
        let bad = Batch::from(vec![Mutation::set_code(2, Some("user:add".to_string()))]);

        let dry = engine.dry_run(&bad).unwrap_err();
        let real = engine.apply(&bad).unwrap_err();
        assert_eq!(dry.to_string(), real.to_string());

        let good = Batch::from(vec![Mutation::set_parent(3, None, None)]);
        let outcome = engine.dry_run(&good).unwrap();
        assert_eq!(outcome.affected_ids, vec![3]);
        assert_eq!(engine.store().get_by_id(3).unwrap().parent_id, Some(2));
    }
}
