use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use tessera_store::Transaction;
use tessera_types::{Path, ProjectId};

pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Every message that crosses a replica channel.
///
/// Serialized with a `type` discriminator and camelCase fields, e.g.
/// `{"type":"incomingTransaction","projectId":"…","transaction":{…}}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ReplicaMessage {
    /// Sent once by a freshly started replica.
    Ready,

    /// Full snapshot answering `ready`. Installed directly, never replayed.
    LoadProject {
        project_id: ProjectId,
        project_data: Value,
        project_local_state: Map<String, Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        panel: Option<PanelDescriptor>,
    },

    /// A transaction originated on another replica.
    IncomingTransaction {
        project_id: ProjectId,
        transaction: Transaction,
    },

    /// A local-state entry changed on another replica.
    LocalStateChanged {
        project_id: ProjectId,
        property: String,
        value: Value,
    },
}

/// Serialized description of one UI artifact the new replica should reopen
/// after loading the snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelDescriptor {
    /// Kind of panel, e.g. `"sceneEditor"`.
    pub kind: String,
    /// Model the panel is opened on, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<Path>,
}

impl ReplicaMessage {
    pub fn type_tag(&self) -> u8 {
        match self {
            Self::Ready => 1,
            Self::LoadProject { .. } => 2,
            Self::IncomingTransaction { .. } => 3,
            Self::LocalStateChanged { .. } => 4,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::LoadProject { .. } => "loadProject",
            Self::IncomingTransaction { .. } => "incomingTransaction",
            Self::LocalStateChanged { .. } => "localStateChanged",
        }
    }

    /// The project a message addresses. `ready` addresses none.
    pub fn project_id(&self) -> Option<&ProjectId> {
        match self {
            Self::Ready => None,
            Self::LoadProject { project_id, .. }
            | Self::IncomingTransaction { project_id, .. }
            | Self::LocalStateChanged { project_id, .. } => Some(project_id),
        }
    }

    /// Whether the message carries a change that hubs rebroadcast.
    pub fn is_forwardable(&self) -> bool {
        matches!(
            self,
            Self::IncomingTransaction { .. } | Self::LocalStateChanged { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn project() -> ProjectId {
        ProjectId::from("p1")
    }

    #[test]
    fn ready_wire_shape() {
        let value = serde_json::to_value(ReplicaMessage::Ready).unwrap();
        assert_eq!(value, json!({"type": "ready"}));
    }

    #[test]
    fn incoming_transaction_wire_shape() {
        let tx = Transaction::set(Path::root("a"), json!(1));
        let performed_at = tx.performed_at;
        let msg = ReplicaMessage::IncomingTransaction {
            project_id: project(),
            transaction: tx,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "incomingTransaction",
                "projectId": "p1",
                "transaction": {
                    "path": ["a"],
                    "performedAt": performed_at,
                    "kind": "set",
                    "value": 1,
                },
            })
        );
    }

    #[test]
    fn load_project_omits_absent_panel() {
        let msg = ReplicaMessage::LoadProject {
            project_id: project(),
            project_data: json!({"a": 1}),
            project_local_state: Map::new(),
            panel: None,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "loadProject",
                "projectId": "p1",
                "projectData": {"a": 1},
                "projectLocalState": {},
            })
        );
    }

    #[test]
    fn parses_local_state_change() {
        let msg: ReplicaMessage = serde_json::from_value(json!({
            "type": "localStateChanged",
            "projectId": "p1",
            "property": "selection",
            "value": ["objects", "k"],
        }))
        .unwrap();
        assert_eq!(
            msg,
            ReplicaMessage::LocalStateChanged {
                project_id: project(),
                property: "selection".into(),
                value: json!(["objects", "k"]),
            }
        );
        assert!(msg.is_forwardable());
        assert_eq!(msg.project_id(), Some(&project()));
    }

    #[test]
    fn panel_round_trip() {
        let panel = PanelDescriptor {
            kind: "sceneEditor".into(),
            model_path: Some(Path::root("scenes").child("s1")),
        };
        let value = serde_json::to_value(&panel).unwrap();
        assert_eq!(value, json!({"kind": "sceneEditor", "modelPath": ["scenes", "s1"]}));
        assert_eq!(serde_json::from_value::<PanelDescriptor>(value).unwrap(), panel);
    }

    #[test]
    fn type_tags_unique() {
        let msgs = [
            ReplicaMessage::Ready,
            ReplicaMessage::LoadProject {
                project_id: project(),
                project_data: json!({}),
                project_local_state: Map::new(),
                panel: None,
            },
            ReplicaMessage::IncomingTransaction {
                project_id: project(),
                transaction: Transaction::delete(Path::root("a")),
            },
            ReplicaMessage::LocalStateChanged {
                project_id: project(),
                property: "p".into(),
                value: Value::Null,
            },
        ];
        let mut tags: Vec<u8> = msgs.iter().map(ReplicaMessage::type_tag).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), msgs.len());
    }
}
