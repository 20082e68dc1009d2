//! Stress tests for NodeStore.
//!
//! These drive the worker pool and the request handler under concurrent
//! load and check that every piece of work is done exactly once.

use crate::fixtures::{archive_requests, segment_payloads};
use bytes::Bytes;
use nodestore_coordinator::{
    ControllerConfig, CoordinatorResult, HaltSignal, IoController, IoOperation, IoOutcome,
    IoWorker, MemoryEventSink, SegmentDescriptor, SegmentIo, VolumeIo, WorkerConfig, WorkerExit,
};
use nodestore_protocol::{ArchiveResult, RequestId, RetrieveKeyNext};
use nodestore_server::NodeServer;
use nodestore_storage::InMemoryBackend;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Segments submitted per run.
    pub operations: usize,
    /// Number of submitting threads.
    pub threads: usize,
    /// Number of I/O workers in the pool.
    pub workers: u32,
    /// Size of each segment in bytes.
    pub segment_size: usize,
    /// Upper bound of the random delay added to each I/O, in microseconds.
    pub max_jitter_micros: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 2_000,
            threads: 4,
            workers: 4,
            segment_size: 256,
            max_jitter_micros: 50,
        }
    }
}

/// Segment I/O that counts how often each descriptor runs.
#[derive(Clone)]
pub struct CountingIo {
    inner: VolumeIo,
    executions: Arc<Mutex<HashMap<(String, u8), usize>>>,
    max_jitter_micros: u64,
}

impl CountingIo {
    /// Wraps a volume, adding up to `max_jitter_micros` of delay per call.
    pub fn new(inner: VolumeIo, max_jitter_micros: u64) -> Self {
        Self {
            inner,
            executions: Arc::new(Mutex::new(HashMap::new())),
            max_jitter_micros,
        }
    }

    /// Executions per (key, segment).
    pub fn executions(&self) -> HashMap<(String, u8), usize> {
        self.executions.lock().clone()
    }
}

impl SegmentIo for CountingIo {
    fn execute(&self, descriptor: &SegmentDescriptor) -> CoordinatorResult<IoOutcome> {
        if self.max_jitter_micros > 0 {
            let jitter = rand::random::<u64>() % self.max_jitter_micros;
            thread::sleep(Duration::from_micros(jitter));
        }
        *self
            .executions
            .lock()
            .entry((descriptor.key.clone(), descriptor.segment_number))
            .or_insert(0) += 1;
        self.inner.execute(descriptor)
    }
}

/// Outcome of a worker pool run.
#[derive(Debug, Clone)]
pub struct PoolStressResult {
    /// Submission counts and throughput.
    pub result: StressTestResult,
    /// Descriptors executed more than once.
    pub duplicated: usize,
    /// Submitted descriptors never executed.
    pub missing: usize,
    /// Assignments completed by each worker.
    pub per_worker: Vec<u64>,
    /// Worker exits.
    pub exits: Vec<WorkerExit>,
    /// Exceptions the workers published.
    pub exceptions: usize,
}

impl PoolStressResult {
    /// Returns true if every submission ran exactly once and every worker
    /// stopped normally.
    pub fn is_exactly_once(&self) -> bool {
        self.duplicated == 0
            && self.missing == 0
            && self.result.failed_ops == 0
            && self.exits.iter().all(|e| *e == WorkerExit::Normal)
    }
}

/// Submits write descriptors from several threads to a pool of workers and
/// checks each was executed exactly once.
pub fn stress_worker_pool(config: &StressConfig) -> PoolStressResult {
    let controller =
        IoController::new(ControllerConfig::new("stress").with_max_pending(config.operations));
    let io = CountingIo::new(
        VolumeIo::new(Arc::new(InMemoryBackend::new())),
        config.max_jitter_micros,
    );
    let halt = HaltSignal::new();
    let events = MemoryEventSink::new();

    let workers: Vec<_> = (0..config.workers)
        .map(|index| {
            let mut worker = IoWorker::new(
                WorkerConfig::new("stress", index),
                controller.connect(),
                io.clone(),
                events.clone(),
                halt.clone(),
            );
            thread::spawn(move || {
                let exit = worker.run();
                (exit, worker.completed())
            })
        })
        .collect();

    let threads = config.threads.max(1);
    let per_thread = config.operations / threads;
    let start = Instant::now();
    let submitters: Vec<_> = (0..threads)
        .map(|t| {
            let controller = controller.clone();
            let data = Bytes::from(vec![t as u8; config.segment_size]);
            thread::spawn(move || {
                let mut successful = 0usize;
                let mut failed = 0usize;
                for i in 0..per_thread {
                    let descriptor = SegmentDescriptor {
                        key: format!("t{t}-{i}"),
                        version_number: 1,
                        segment_number: 0,
                        operation: IoOperation::Write { data: data.clone() },
                    };
                    match controller.submit(descriptor).and_then(|pending| pending.wait()) {
                        Ok(IoOutcome::Written { .. }) => successful += 1,
                        _ => failed += 1,
                    }
                }
                (successful, failed)
            })
        })
        .collect();

    let mut successful = 0;
    let mut failed = 0;
    for handle in submitters {
        let (s, f) = handle.join().unwrap_or((0, per_thread));
        successful += s;
        failed += f;
    }
    let duration = start.elapsed();

    halt.trigger();
    let (exits, per_worker) = workers
        .into_iter()
        .map(|handle| handle.join().unwrap_or((WorkerExit::Failed, 0)))
        .unzip();

    let executions = io.executions();
    PoolStressResult {
        result: StressTestResult::new(successful, failed, duration),
        duplicated: executions.values().filter(|n| **n > 1).count(),
        missing: (per_thread * threads).saturating_sub(executions.len()),
        per_worker,
        exits,
        exceptions: events.events().len(),
    }
}

/// Archives and then retrieves one object per operation from several
/// threads against one node.
///
/// An operation succeeds when every segment archives and reads back intact.
pub fn stress_concurrent_transfers(
    node: &NodeServer,
    config: &StressConfig,
    segments_per_object: usize,
) -> StressTestResult {
    let threads = config.threads.max(1);
    let per_thread = config.operations / threads;
    let start = Instant::now();

    let (successful, failed) = thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                scope.spawn(move || {
                    let mut successful = 0usize;
                    let mut failed = 0usize;
                    for i in 0..per_thread {
                        if transfer_round_trip(node, &format!("t{t}/obj{i}"), segments_per_object)
                        {
                            successful += 1;
                        } else {
                            failed += 1;
                        }
                    }
                    (successful, failed)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or((0, per_thread)))
            .fold((0, 0), |(s, f), (s2, f2)| (s + s2, f + f2))
    });

    StressTestResult::new(successful, failed, start.elapsed())
}

fn transfer_round_trip(node: &NodeServer, key: &str, segment_count: usize) -> bool {
    let segments = segment_payloads(key, segment_count);
    for request in archive_requests(RequestId::generate(), key, 1, &segments) {
        if node.archive_key_next(request).result() != ArchiveResult::Successful {
            return false;
        }
    }
    let request_id = RequestId::generate();
    segments.iter().enumerate().all(|(i, expected)| {
        let reply = node.retrieve_key_next(RetrieveKeyNext {
            request_id,
            key: key.to_string(),
            version_number: 1,
            segment_number: i as u8,
        });
        !reply.is_error() && reply.payload() == expected
    })
}
