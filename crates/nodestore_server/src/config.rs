//! Server configuration.

/// Default number of finished request-ids remembered for duplicate detection.
pub const DEFAULT_COMPLETED_REQUEST_CAPACITY: usize = 4096;

/// Default number of transfers followed at once.
pub const DEFAULT_MAX_ACTIVE_TRANSFERS: usize = 16_384;

/// Default largest segment payload accepted by an archive call.
pub const DEFAULT_MAX_SEGMENT_SIZE: usize = 64 * 1024 * 1024;

/// Configuration for a storage node server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Volume the node serves.
    pub volume_name: String,
    /// Finished request-ids remembered for duplicate detection.
    pub completed_request_capacity: usize,
    /// Transfers followed at once; past this the idlest one is dropped.
    pub max_active_transfers: usize,
    /// Largest segment payload accepted by an archive call.
    pub max_segment_size: usize,
    /// Whether each index insert syncs the record log.
    pub sync_on_insert: bool,
}

impl ServerConfig {
    /// Creates a configuration for `volume_name` with default limits.
    pub fn new(volume_name: impl Into<String>) -> Self {
        Self {
            volume_name: volume_name.into(),
            completed_request_capacity: DEFAULT_COMPLETED_REQUEST_CAPACITY,
            max_active_transfers: DEFAULT_MAX_ACTIVE_TRANSFERS,
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            sync_on_insert: false,
        }
    }

    /// Sets how many finished request-ids are remembered.
    pub fn with_completed_request_capacity(mut self, capacity: usize) -> Self {
        self.completed_request_capacity = capacity;
        self
    }

    /// Sets how many transfers are followed at once.
    pub fn with_max_active_transfers(mut self, max: usize) -> Self {
        self.max_active_transfers = max;
        self
    }

    /// Sets the largest accepted segment payload.
    pub fn with_max_segment_size(mut self, size: usize) -> Self {
        self.max_segment_size = size;
        self
    }

    /// Sets whether each index insert syncs the record log.
    pub fn with_sync_on_insert(mut self, sync: bool) -> Self {
        self.sync_on_insert = sync;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.volume_name, "default");
        assert_eq!(config.completed_request_capacity, 4096);
        assert_eq!(config.max_active_transfers, DEFAULT_MAX_ACTIVE_TRANSFERS);
        assert!(!config.sync_on_insert);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("vol-7")
            .with_completed_request_capacity(8)
            .with_max_active_transfers(2)
            .with_max_segment_size(1024)
            .with_sync_on_insert(true);

        assert_eq!(config.volume_name, "vol-7");
        assert_eq!(config.completed_request_capacity, 8);
        assert_eq!(config.max_active_transfers, 2);
        assert_eq!(config.max_segment_size, 1024);
        assert!(config.sync_on_insert);
    }
}
