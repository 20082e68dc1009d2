//! CLI command implementations.

pub mod destroy;
pub mod dump;
pub mod inspect;
pub mod serve;

use std::path::{Path, PathBuf};

/// Files holding one volume under a data directory.
#[derive(Debug, Clone)]
pub struct VolumePaths {
    /// Segment bytes.
    pub volume: PathBuf,
    /// Record log.
    pub record_log: PathBuf,
}

impl VolumePaths {
    /// Paths of `volume_name` under `data_dir`.
    pub fn new(data_dir: &Path, volume_name: &str) -> Self {
        let dir = data_dir.join(volume_name);
        Self {
            volume: dir.join("volume.dat"),
            record_log: dir.join("records.log"),
        }
    }

    /// Returns an error naming the record log if it does not exist.
    pub fn require_record_log(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.record_log.exists() {
            Ok(())
        } else {
            Err(format!("no record log at {}", self.record_log.display()).into())
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
