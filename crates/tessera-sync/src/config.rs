use serde::{Deserialize, Serialize};

/// Per-replica replication switches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaConfig {
    /// Forward locally originated local-state changes to peers.
    pub forward_local_state: bool,
    /// Relay changes received from one peer to every other peer.
    pub rebroadcast: bool,
    /// Include the currently open panel when answering `ready`.
    pub reopen_panel: bool,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            forward_local_state: true,
            rebroadcast: true,
            reopen_panel: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ReplicaConfig::default();
        assert!(config.forward_local_state);
        assert!(config.rebroadcast);
        assert!(config.reopen_panel);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: ReplicaConfig = serde_json::from_str(r#"{"rebroadcast": false}"#).unwrap();
        assert!(!config.rebroadcast);
        assert!(config.forward_local_state);
    }
}
