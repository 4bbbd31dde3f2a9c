use serde_json::Value;

use crate::project::Project;
use crate::transaction::{Transaction, TransactionOp};
use crate::tree;

/// Result of replaying a timeline into a tree.
#[derive(Clone, Debug, PartialEq)]
pub struct ReplayResult {
    pub applied: u64,
    pub sets: u64,
    pub deletes: u64,
    pub state: Value,
}

/// Deterministic replay helpers for project timelines.
pub struct ReplayEngine;

impl ReplayEngine {
    /// Replay `transactions` onto an empty tree.
    pub fn replay(transactions: &[Transaction]) -> ReplayResult {
        Self::replay_onto(tree::empty(), transactions)
    }

    /// Replay `transactions` onto `base`.
    pub fn replay_onto(base: Value, transactions: &[Transaction]) -> ReplayResult {
        let mut state = base;
        let mut sets = 0u64;
        let mut deletes = 0u64;

        for transaction in transactions {
            tree::apply(&mut state, transaction);
            match transaction.op {
                TransactionOp::Set { .. } => sets += 1,
                TransactionOp::Delete => deletes += 1,
            }
        }

        ReplayResult {
            applied: sets + deletes,
            sets,
            deletes,
            state,
        }
    }

    /// Returns `true` if replaying the project's timeline onto its baseline
    /// reproduces its current tree exactly.
    pub fn verify(project: &Project) -> bool {
        let replayed = Self::replay_onto(project.baseline(), &project.timeline());
        replayed.state == project.data()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;
    use serde_json::{json, Map};
    use tessera_types::{KeyGenerator, Path, ProjectId};

    use super::*;

    fn path(keys: &[&str]) -> Path {
        Path::new(keys.iter().copied()).unwrap()
    }

    #[test]
    fn replay_empty_timeline() {
        let result = ReplayEngine::replay(&[]);
        assert_eq!(result.applied, 0);
        assert_eq!(result.state, json!({}));
    }

    #[test]
    fn replay_reproduces_project() {
        let project = Project::new(Arc::new(KeyGenerator::new()));
        project.set(&path(&["scenes", "s1", "name"]), json!("Intro"));
        project.set(&path(&["scenes", "s2", "name"]), json!("Outro"));
        project.delete(&path(&["scenes", "s1"]));
        project.soft_set(&path(&["scenes", "s2", "name"]), json!("ignored"));

        let result = ReplayEngine::replay(&project.timeline());
        assert_eq!(result.sets, 2);
        assert_eq!(result.deletes, 1);
        assert_eq!(result.state, project.data());
        assert!(ReplayEngine::verify(&project));
    }

    #[test]
    fn verify_uses_snapshot_baseline() {
        let project = Project::from_snapshot(
            ProjectId::new(),
            json!({"a": {"b": 1}}),
            Map::new(),
            Arc::new(KeyGenerator::new()),
        )
        .unwrap();
        project.set(&path(&["a", "c"]), json!(2));
        assert!(ReplayEngine::verify(&project));
        assert_ne!(ReplayEngine::replay(&project.timeline()).state, project.data());
    }

    #[derive(Clone, Debug)]
    enum Op {
        Set(Vec<String>, i64),
        Delete(Vec<String>),
    }

    fn op() -> impl Strategy<Value = Op> {
        let keys = prop::collection::vec("[a-c]", 1..4);
        prop_oneof![
            (keys.clone(), any::<i64>()).prop_map(|(k, v)| Op::Set(k, v)),
            keys.prop_map(Op::Delete),
        ]
    }

    proptest! {
        #[test]
        fn replay_matches_live_tree(ops in prop::collection::vec(op(), 0..40)) {
            let project = Project::new(Arc::new(KeyGenerator::new()));
            for op in ops {
                match op {
                    Op::Set(keys, v) => project.set(&Path::new(keys).unwrap(), json!(v)),
                    Op::Delete(keys) => project.delete(&Path::new(keys).unwrap()),
                }
            }
            prop_assert_eq!(ReplayEngine::replay(&project.timeline()).state, project.data());
        }
    }
}
