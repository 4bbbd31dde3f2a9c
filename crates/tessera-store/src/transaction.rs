use serde::{Deserialize, Serialize};
use serde_json::Value;
use tessera_types::{Path, Timestamp};

/// The mutation a [`Transaction`] performs.
///
/// Serialized inline with the transaction under a `kind` tag:
/// `{"kind": "set", "value": ...}` or `{"kind": "delete"}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransactionOp {
    /// Place `value` at the path, creating intermediate mappings.
    Set { value: Value },
    /// Remove the final key of the path from its parent.
    Delete,
}

/// Immutable record of one mutation to the tree.
///
/// `created_externally` is transient: it is `true` only while a transaction
/// received from another replica is being applied, and it is never
/// serialized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub path: Path,
    pub performed_at: Timestamp,
    #[serde(flatten)]
    pub op: TransactionOp,
    #[serde(skip)]
    pub created_externally: bool,
}

impl Transaction {
    /// A `Set` transaction stamped with the current time.
    pub fn set(path: Path, value: Value) -> Self {
        Self {
            path,
            performed_at: Timestamp::now(),
            op: TransactionOp::Set { value },
            created_externally: false,
        }
    }

    /// A `Delete` transaction stamped with the current time.
    pub fn delete(path: Path) -> Self {
        Self {
            path,
            performed_at: Timestamp::now(),
            op: TransactionOp::Delete,
            created_externally: false,
        }
    }

    /// The same transaction, flagged as received from a remote replica.
    pub fn into_external(mut self) -> Self {
        self.created_externally = true;
        self
    }

    pub fn is_set(&self) -> bool {
        matches!(self.op, TransactionOp::Set { .. })
    }

    pub fn is_delete(&self) -> bool {
        matches!(self.op, TransactionOp::Delete)
    }

    /// The value written by a `Set`, `None` for a `Delete`.
    pub fn value(&self) -> Option<&Value> {
        match &self.op {
            TransactionOp::Set { value } => Some(value),
            TransactionOp::Delete => None,
        }
    }

    /// `"set"` or `"delete"`.
    pub fn kind_name(&self) -> &'static str {
        match self.op {
            TransactionOp::Set { .. } => "set",
            TransactionOp::Delete => "delete",
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn set_wire_shape() {
        let mut txn = Transaction::set(Path::root("a").child("b"), json!(1));
        txn.performed_at = Timestamp::from_millis(42);
        let wire = serde_json::to_value(&txn).unwrap();
        assert_eq!(
            wire,
            json!({"path": ["a", "b"], "performedAt": 42, "kind": "set", "value": 1})
        );
    }

    #[test]
    fn delete_wire_shape_has_no_value() {
        let mut txn = Transaction::delete(Path::root("a"));
        txn.performed_at = Timestamp::from_millis(7);
        let wire = serde_json::to_value(&txn).unwrap();
        assert_eq!(wire, json!({"path": ["a"], "performedAt": 7, "kind": "delete"}));
    }

    #[test]
    fn external_flag_is_never_serialized() {
        let txn = Transaction::set(Path::root("a"), json!(true)).into_external();
        assert!(txn.created_externally);
        let text = serde_json::to_string(&txn).unwrap();
        assert!(!text.contains("xternal"));
        let parsed: Transaction = serde_json::from_str(&text).unwrap();
        assert!(!parsed.created_externally);
        assert_eq!(parsed.value(), Some(&json!(true)));
    }

    #[test]
    fn empty_path_fails_to_decode() {
        let err = serde_json::from_value::<Transaction>(
            json!({"path": [], "performedAt": 1, "kind": "delete"}),
        );
        assert!(err.is_err());
    }

    #[test]
    fn kind_helpers() {
        let set = Transaction::set(Path::root("x"), json!("v"));
        let del = Transaction::delete(Path::root("x"));
        assert!(set.is_set() && !set.is_delete());
        assert!(del.is_delete() && del.value().is_none());
        assert_eq!(set.kind_name(), "set");
        assert_eq!(del.kind_name(), "delete");
    }
}
