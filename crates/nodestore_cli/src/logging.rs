//! Log output for the binary.
//!
//! Each I/O worker runs on a thread named after its event source. Events
//! emitted on that thread go to the worker's log file; everything else goes
//! to stderr.

use nodestore_coordinator::WorkerConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Log files of the workers in this process, keyed by thread name.
#[derive(Debug, Default)]
pub struct WorkerLogFiles {
    files: HashMap<String, Arc<Mutex<File>>>,
}

impl WorkerLogFiles {
    /// Opens, in append mode, the log file of every worker that has a log
    /// directory configured.
    pub fn open(configs: &[WorkerConfig]) -> io::Result<Self> {
        let mut files = HashMap::new();
        for config in configs {
            let Some(path) = config.log_path() else {
                continue;
            };
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            files.insert(config.event_source_name(), Arc::new(Mutex::new(file)));
        }
        Ok(Self { files })
    }

    /// Returns true if no worker logs to a file.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Where one log event is written.
pub enum LogTarget {
    /// A worker's log file.
    File(Arc<Mutex<File>>),
    /// Standard error.
    Stderr,
}

impl Write for LogTarget {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogTarget::File(file) => file.lock().write(buf),
            LogTarget::Stderr => io::stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogTarget::File(file) => file.lock().flush(),
            LogTarget::Stderr => io::stderr().flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for WorkerLogFiles {
    type Writer = LogTarget;

    fn make_writer(&'a self) -> Self::Writer {
        let current = std::thread::current();
        match current.name().and_then(|name| self.files.get(name)) {
            Some(file) => LogTarget::File(Arc::clone(file)),
            None => LogTarget::Stderr,
        }
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` with `verbose`.
pub fn init(verbose: bool, files: WorkerLogFiles) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    let ansi = files.is_empty();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_writer(files)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_threads_write_to_their_own_file() {
        let dir = tempfile::tempdir().unwrap();
        let configs = vec![
            WorkerConfig::new("vol", 0).with_log_dir(dir.path()),
            WorkerConfig::new("vol", 1).with_log_dir(dir.path()),
        ];
        let files = Arc::new(WorkerLogFiles::open(&configs).unwrap());

        let writer_files = Arc::clone(&files);
        std::thread::Builder::new()
            .name(configs[1].event_source_name())
            .spawn(move || {
                let files: &WorkerLogFiles = &writer_files;
                let mut target = files.make_writer();
                assert!(matches!(target, LogTarget::File(_)));
                target.write_all(b"hello from worker 1\n").unwrap();
            })
            .unwrap()
            .join()
            .unwrap();

        let first = fs::read_to_string(configs[0].log_path().unwrap()).unwrap();
        let second = fs::read_to_string(configs[1].log_path().unwrap()).unwrap();
        assert!(first.is_empty());
        assert_eq!(second, "hello from worker 1\n");
    }

    #[test]
    fn other_threads_write_to_stderr() {
        let files = WorkerLogFiles::open(&[WorkerConfig::new("vol", 0)]).unwrap();
        assert!(files.is_empty());
        assert!(matches!(files.make_writer(), LogTarget::Stderr));
    }
}
