//! Node configuration.

use serde::{Deserialize, Serialize};

use drove_core::DEFAULT_PORT;

/// Configuration for one node process (storage node or router).
///
/// `repl_set` carries the raw `<setname>/<seed1>,<seed2>,...` string; it is
/// parsed and validated by the replica-set coordinator at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub repl_set: Option<String>,
    /// Interval between heartbeat polls to each peer (ms).
    pub heartbeat_interval_ms: u64,
    /// Socket timeout for one heartbeat call (ms); exceeding it counts as
    /// "down".
    pub heartbeat_timeout_ms: u64,
    /// Manager gets a check message at least this often even without
    /// state changes (ms).
    pub manager_notify_ms: u64,
    /// Wait between configuration-load retries while no usable
    /// configuration can be found (ms).
    pub config_retry_ms: u64,
    /// Interval between balancer rounds (ms).
    pub balance_interval_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            repl_set: None,
            heartbeat_interval_ms: 2000,
            heartbeat_timeout_ms: 1500,
            manager_notify_ms: 4000,
            config_retry_ms: 20_000,
            balance_interval_ms: 10_000,
        }
    }
}
