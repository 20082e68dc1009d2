//! Configuration for workers and the controller.

use std::path::PathBuf;

/// Environment variable naming the local node.
pub const NODE_NAME_VAR: &str = "NODESTORE_NODE_NAME";

/// Environment variable naming the log directory.
pub const LOG_DIR_VAR: &str = "NODESTORE_LOG_DIR";

/// Node name used when none is configured.
pub const DEFAULT_NODE_NAME: &str = "localhost";

/// Identity and environment of one I/O worker.
///
/// Built once at process entry and passed down; nothing below re-reads the
/// environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Volume the worker serves.
    pub volume_name: String,
    /// Index of the worker within its pool.
    pub worker_index: u32,
    /// Name of the local node.
    pub node_name: String,
    /// Directory for the worker log file.
    pub log_dir: Option<PathBuf>,
}

impl WorkerConfig {
    /// Creates a configuration with the default node name and no log directory.
    pub fn new(volume_name: impl Into<String>, worker_index: u32) -> Self {
        Self {
            volume_name: volume_name.into(),
            worker_index,
            node_name: DEFAULT_NODE_NAME.to_string(),
            log_dir: None,
        }
    }

    /// Reads [`NODE_NAME_VAR`] and [`LOG_DIR_VAR`] from the process environment.
    pub fn from_env(volume_name: impl Into<String>, worker_index: u32) -> Self {
        Self::from_lookup(volume_name, worker_index, |name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env), with a custom variable lookup.
    pub fn from_lookup(
        volume_name: impl Into<String>,
        worker_index: u32,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut config = Self::new(volume_name, worker_index);
        if let Some(node_name) = lookup(NODE_NAME_VAR).filter(|v| !v.is_empty()) {
            config.node_name = node_name;
        }
        config.log_dir = lookup(LOG_DIR_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        config
    }

    /// Sets the node name.
    pub fn with_node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = node_name.into();
        self
    }

    /// Sets the log directory.
    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(log_dir.into());
        self
    }

    /// Path of this worker's log file, if a log directory is set.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_dir.as_ref().map(|dir| {
            dir.join(format!(
                "nodestore_io_worker_{}_{}_{}.log",
                self.volume_name, self.worker_index, self.node_name
            ))
        })
    }

    /// Source name attached to this worker's events.
    pub fn event_source_name(&self) -> String {
        format!("io_worker_{}_{}", self.volume_name, self.worker_index)
    }
}

/// Configuration for an I/O controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Volume whose workers this controller accepts.
    pub volume_name: String,
    /// Maximum submissions waiting for a worker before `submit` fails.
    pub max_pending: usize,
}

impl ControllerConfig {
    /// Creates a configuration for `volume_name`.
    pub fn new(volume_name: impl Into<String>) -> Self {
        Self {
            volume_name: volume_name.into(),
            max_pending: 1024,
        }
    }

    /// Sets the pending queue capacity.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::new("default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn lookup_reads_both_variables() {
        let vars: HashMap<&str, &str> = [(NODE_NAME_VAR, "node-07"), (LOG_DIR_VAR, "/var/log/ns")]
            .into_iter()
            .collect();
        let config =
            WorkerConfig::from_lookup("vol-a", 3, |name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.node_name, "node-07");
        assert_eq!(
            config.log_path(),
            Some(PathBuf::from(
                "/var/log/ns/nodestore_io_worker_vol-a_3_node-07.log"
            ))
        );
        assert_eq!(config.event_source_name(), "io_worker_vol-a_3");
    }

    #[test]
    fn missing_variables_use_defaults() {
        let config = WorkerConfig::from_lookup("vol", 0, |_| None);
        assert_eq!(config.node_name, DEFAULT_NODE_NAME);
        assert_eq!(config.log_path(), None);
    }

    #[test]
    fn builders() {
        let config = WorkerConfig::new("v", 1)
            .with_node_name("n")
            .with_log_dir("/tmp");
        assert_eq!(
            config.log_path(),
            Some(PathBuf::from("/tmp/nodestore_io_worker_v_1_n.log"))
        );

        let controller = ControllerConfig::new("v").with_max_pending(2);
        assert_eq!(controller.max_pending, 2);
        assert_eq!(ControllerConfig::default().max_pending, 1024);
    }
}
