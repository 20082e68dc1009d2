//! Serve command implementation.
//!
//! Runs one volume: an I/O controller, a pool of worker threads, and a TCP
//! front end. Each frame on the wire is a big-endian `u32` length followed
//! by an encoded request; replies are framed the same way.

use super::VolumePaths;
use nodestore_coordinator::{
    ControllerConfig, HaltSignal, IoController, IoWorker, TracingEventSink, VolumeIo,
    WorkerConfig, WorkerExit,
};
use nodestore_server::{NodeServer, ServerConfig};
use nodestore_storage::{FileBackend, SharedBackend};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Room for the request envelope around a segment payload.
const FRAME_OVERHEAD: usize = 64 * 1024;

/// How long shutdown waits for in-flight connections.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Options of the serve command.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Volume name.
    pub volume: String,
    /// Directory holding one subdirectory per volume.
    pub data_dir: std::path::PathBuf,
    /// Address of the TCP front end.
    pub listen: SocketAddr,
    /// Largest number of queued I/O requests.
    pub max_pending: usize,
    /// Finished request-ids remembered for duplicate detection.
    pub completed_capacity: usize,
    /// Transfers followed at once.
    pub max_active: usize,
    /// Largest accepted segment payload.
    pub max_segment_size: usize,
}

/// Builds one worker configuration per pool slot from the environment.
pub fn worker_configs(volume: &str, workers: u32) -> Vec<WorkerConfig> {
    (0..workers)
        .map(|index| WorkerConfig::from_env(volume, index))
        .collect()
}

/// Runs the volume until Ctrl-C or a worker fault.
///
/// Returns the process exit code: 0 if every worker stopped normally,
/// otherwise 1.
pub fn run(
    options: ServeOptions,
    configs: Vec<WorkerConfig>,
) -> Result<i32, Box<dyn std::error::Error>> {
    let paths = VolumePaths::new(&options.data_dir, &options.volume);
    let volume: SharedBackend = Arc::new(FileBackend::open_with_create_dirs(&paths.volume)?);
    let record_log: SharedBackend =
        Arc::new(FileBackend::open_with_create_dirs(&paths.record_log)?);

    let controller = IoController::new(
        ControllerConfig::new(options.volume.as_str()).with_max_pending(options.max_pending),
    );
    let halt = HaltSignal::new();
    let (fault_tx, fault_rx) = mpsc::unbounded_channel();
    let workers = spawn_workers(configs, &controller, &volume, &halt, &fault_tx)?;
    drop(fault_tx);

    let server_config = ServerConfig::new(options.volume.as_str())
        .with_completed_request_capacity(options.completed_capacity)
        .with_max_active_transfers(options.max_active)
        .with_max_segment_size(options.max_segment_size)
        .with_sync_on_insert(true);
    let server = Arc::new(NodeServer::open(
        server_config,
        record_log,
        Arc::new(controller.clone()),
    )?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let max_frame = options.max_segment_size + FRAME_OVERHEAD;
    let served = runtime.block_on(async {
        let listener = TcpListener::bind(options.listen).await?;
        tracing::info!(
            volume = %options.volume,
            addr = %listener.local_addr()?,
            workers = workers.len(),
            "serving volume"
        );
        accept_loop(listener, server, max_frame, fault_rx).await
    });

    halt.trigger();
    controller.shutdown();
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    let exit_code = join_workers(workers);
    served?;
    tracing::info!(exit_code, "volume stopped");
    Ok(exit_code)
}

fn spawn_workers(
    configs: Vec<WorkerConfig>,
    controller: &IoController,
    volume: &SharedBackend,
    halt: &HaltSignal,
    faults: &mpsc::UnboundedSender<u32>,
) -> io::Result<Vec<JoinHandle<WorkerExit>>> {
    configs
        .into_iter()
        .map(|config| {
            let index = config.worker_index;
            let name = config.event_source_name();
            let mut worker = IoWorker::new(
                config,
                controller.connect(),
                VolumeIo::new(Arc::clone(volume)),
                TracingEventSink::new(name.clone()),
                halt.clone(),
            );
            let faults = faults.clone();
            thread::Builder::new().name(name).spawn(move || {
                let exit = worker.run();
                if exit == WorkerExit::Failed {
                    let _ = faults.send(index);
                }
                exit
            })
        })
        .collect()
}

fn join_workers(workers: Vec<JoinHandle<WorkerExit>>) -> i32 {
    let mut exit_code = 0;
    for handle in workers {
        let exit = handle.join().unwrap_or(WorkerExit::Failed);
        exit_code = exit_code.max(exit.code());
    }
    exit_code
}

async fn accept_loop(
    listener: TcpListener,
    server: Arc<NodeServer>,
    max_frame: usize,
    mut faults: mpsc::UnboundedReceiver<u32>,
) -> io::Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "connection accepted");
                    let server = Arc::clone(&server);
                    tokio::spawn(async move {
                        if let Err(err) = serve_connection(stream, server, max_frame).await {
                            tracing::warn!(%peer, error = %err, "connection closed");
                        }
                    });
                }
                Err(err) => tracing::warn!(error = %err, "accept failed"),
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                return Ok(());
            }
            Some(index) = faults.recv() => {
                tracing::error!(worker = index, "io worker failed, stopping volume");
                return Ok(());
            }
        }
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    server: Arc<NodeServer>,
    max_frame: usize,
) -> io::Result<()> {
    loop {
        let len = match stream.read_u32().await {
            Ok(len) => len as usize,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err),
        };
        if len > max_frame {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {len} bytes exceeds {max_frame}"),
            ));
        }
        let mut frame = vec![0u8; len];
        stream.read_exact(&mut frame).await?;

        let server = Arc::clone(&server);
        let reply = tokio::task::spawn_blocking(move || server.handle_message(&frame))
            .await
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let reply = reply.map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        stream.write_u32(reply.len() as u32).await?;
        stream.write_all(&reply).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use nodestore_coordinator::InlineDispatch;
    use nodestore_protocol::{
        ArchiveKeyNext, ArchiveKeyNextReply, ArchiveResult, Request, RequestId,
    };
    use nodestore_storage::InMemoryBackend;

    fn inline_server() -> Arc<NodeServer> {
        let dispatch = Arc::new(InlineDispatch::new(VolumeIo::new(Arc::new(
            InMemoryBackend::new(),
        ))));
        Arc::new(
            NodeServer::open(
                ServerConfig::new("vol"),
                Arc::new(InMemoryBackend::new()),
                dispatch,
            )
            .unwrap(),
        )
    }

    async fn connect(server: Arc<NodeServer>, max_frame: usize) -> TcpStream {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let _ = serve_connection(stream, server, max_frame).await;
        });
        TcpStream::connect(addr).await.unwrap()
    }

    #[tokio::test]
    async fn framed_request_gets_framed_reply() {
        let mut client = connect(inline_server(), 1024).await;
        let request_id = RequestId::generate();
        let request = Request::ArchiveKeyNext(ArchiveKeyNext {
            request_id,
            key: "k".into(),
            timestamp: 1,
            version_number: 1,
            segment_number: 0,
            segment_count: 1,
            total_size: 5,
            adler32: 0,
            md5: [0u8; 16],
            file_name: "k.txt".into(),
            data: Bytes::from_static(b"hello"),
        })
        .marshall()
        .unwrap();

        client.write_u32(request.len() as u32).await.unwrap();
        client.write_all(&request).await.unwrap();
        let len = client.read_u32().await.unwrap() as usize;
        let mut reply = vec![0u8; len];
        client.read_exact(&mut reply).await.unwrap();

        let reply = ArchiveKeyNextReply::unmarshall(&reply).unwrap();
        assert_eq!(reply.result(), ArchiveResult::Successful);
        assert_eq!(reply.request_id(), &request_id);
    }

    #[tokio::test]
    async fn oversized_frame_closes_connection() {
        let mut client = connect(inline_server(), 16).await;
        client.write_u32(17).await.unwrap();
        client.write_all(&[0u8; 17]).await.unwrap();

        let mut buf = [0u8; 4];
        let read = client.read(&mut buf).await.unwrap_or(0);
        assert_eq!(read, 0);
    }

    #[test]
    fn worker_configs_cover_every_slot() {
        let configs = worker_configs("vol", 3);
        let indexes: Vec<_> = configs.iter().map(|c| c.worker_index).collect();
        assert_eq!(indexes, [0, 1, 2]);
        assert!(configs.iter().all(|c| c.volume_name == "vol"));
    }
}
