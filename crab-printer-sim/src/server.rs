//! TCP listener that behaves like a networked receipt printer
//!
//! Every accepted connection gets its own task and its own [`JobFramer`].
//! Framed jobs from all connections are funnelled into one bounded queue;
//! when the consumer falls behind, connection tasks wait on the queue instead
//! of buffering without limit.
//!
//! ```ignore
//! let server = PrinterServer::new(ServerConfig::from_env(), LocalAddressProvider);
//! let mut jobs = server.take_jobs().expect("first call");
//! match server.start().await {
//!     StartResult::Started | StartResult::AlreadyRunning => {}
//!     other => return Err(other.into()),
//! }
//! while let Some(job) = jobs.recv().await {
//!     println!("{} bytes from {}", job.data.len(), job.peer);
//! }
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::address::AddressProvider;
use crate::config::ServerConfig;
use crate::error::PrinterError;
use crate::framer::JobFramer;

/// One framed job and the connection it arrived on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintJob {
    pub peer: SocketAddr,
    pub data: Vec<u8>,
}

/// Outcome of [`PrinterServer::start`]
#[derive(Debug)]
pub enum StartResult {
    /// Listener bound, accept loop running
    Started,
    /// A previous start is still in effect
    AlreadyRunning,
    /// The host has no routable IPv4 address
    NoAddressAvailable,
    /// Bind or listen failed
    Error(PrinterError),
    /// [`PrinterServer::stop`] was called before the listener came up
    Cancelled,
}

impl StartResult {
    /// Whether the server is accepting connections afterwards
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Started | Self::AlreadyRunning)
    }
}

impl From<StartResult> for Result<(), PrinterError> {
    fn from(result: StartResult) -> Self {
        match result {
            StartResult::Started | StartResult::AlreadyRunning | StartResult::Cancelled => Ok(()),
            StartResult::NoAddressAvailable => Err(PrinterError::NoAddressAvailable),
            StartResult::Error(e) => Err(e),
        }
    }
}

/// Lifecycle of the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
}

#[derive(Debug, Clone, Copy)]
struct ConnectionSettings {
    read_buffer_size: usize,
    initial_capacity: usize,
}

struct Running {
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    local_addr: SocketAddr,
}

struct Lifecycle {
    state: ServerState,
    generation: u64,
    running: Option<Running>,
    /// Set by `stop` while a start is in flight
    stop_requested: bool,
}

impl Lifecycle {
    fn abort_start(&mut self) {
        self.state = ServerState::Stopped;
        self.stop_requested = false;
    }
}

/// Printer-emulating TCP server
pub struct PrinterServer {
    config: ServerConfig,
    addresses: Arc<dyn AddressProvider>,
    jobs_tx: mpsc::Sender<PrintJob>,
    jobs_rx: Mutex<Option<mpsc::Receiver<PrintJob>>>,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl PrinterServer {
    pub fn new(config: ServerConfig, addresses: impl AddressProvider + 'static) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            config,
            addresses: Arc::new(addresses),
            jobs_tx,
            jobs_rx: Mutex::new(Some(jobs_rx)),
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                state: ServerState::Stopped,
                generation: 0,
                running: None,
                stop_requested: false,
            })),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Receiving end of the job queue
    ///
    /// The queue outlives restarts. Only the first call returns it.
    pub fn take_jobs(&self) -> Option<mpsc::Receiver<PrintJob>> {
        self.jobs_rx.lock().take()
    }

    pub fn state(&self) -> ServerState {
        self.lifecycle.lock().state
    }

    /// Address the listener is bound to while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle.lock().running.as_ref().map(|r| r.local_addr)
    }

    /// Bind the listener and start accepting connections
    #[instrument(skip(self), fields(addr = %self.config.listen_addr()))]
    pub async fn start(&self) -> StartResult {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state != ServerState::Stopped {
                return StartResult::AlreadyRunning;
            }
            lifecycle.state = ServerState::Starting;
        }

        let Some(ip) = self.addresses.local_address() else {
            warn!("no usable network address, not starting");
            self.lifecycle.lock().abort_start();
            return StartResult::NoAddressAvailable;
        };

        let addr = self.config.listen_addr();
        let bound = match TcpListener::bind(&addr).await {
            Ok(listener) => listener.local_addr().map(|local| (listener, local)),
            Err(e) => Err(e),
        };
        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(source) => {
                error!(error = %source, "failed to bind");
                self.lifecycle.lock().abort_start();
                return StartResult::Error(PrinterError::Bind { addr, source });
            }
        };

        let settings = ConnectionSettings {
            read_buffer_size: self.config.read_buffer_size.max(1),
            initial_capacity: self.config.initial_capacity,
        };

        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.stop_requested {
            lifecycle.abort_start();
            info!(%local_addr, "stop requested during start, closing listener");
            return StartResult::Cancelled;
        }
        lifecycle.generation += 1;
        let generation = lifecycle.generation;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(accept_loop(
            listener,
            settings,
            self.jobs_tx.clone(),
            cancel.clone(),
            self.lifecycle.clone(),
            generation,
        ));
        lifecycle.running = Some(Running {
            generation,
            cancel,
            handle,
            local_addr,
        });
        lifecycle.state = ServerState::Running;

        info!(%ip, %local_addr, "printer simulator listening");
        StartResult::Started
    }

    /// Stop accepting, cancel every connection and close the listener
    ///
    /// Safe to call repeatedly or when never started. While another task is
    /// inside [`start`](Self::start), the stop is recorded and that start
    /// returns [`StartResult::Cancelled`] instead of coming up.
    pub async fn stop(&self) {
        let running = {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.state == ServerState::Starting {
                lifecycle.stop_requested = true;
                return;
            }
            let running = lifecycle.running.take();
            if running.is_some() {
                lifecycle.state = ServerState::Stopped;
            }
            running
        };

        let Some(running) = running else {
            return;
        };

        running.cancel.cancel();
        if let Err(e) = running.handle.await
            && !e.is_cancelled()
        {
            error!(error = %e, "accept task failed");
        }
        info!(local_addr = %running.local_addr, "printer simulator stopped");
    }
}

impl Drop for PrinterServer {
    fn drop(&mut self) {
        if let Some(running) = self.lifecycle.lock().running.take() {
            running.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for PrinterServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrinterServer")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// First pause after a resource error on accept
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(100);
/// Longest pause between accept retries
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptFailure {
    /// Only the pending connection is lost, accept again right away
    Connection,
    /// Host is short on descriptors or memory, retry after a pause
    Resource,
    /// The listener itself is unusable
    Fatal,
}

fn classify_accept_error(e: &io::Error) -> AcceptFailure {
    match e.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock => AcceptFailure::Connection,
        io::ErrorKind::InvalidInput | io::ErrorKind::NotConnected | io::ErrorKind::Unsupported => {
            AcceptFailure::Fatal
        }
        // EMFILE, ENFILE, ENOBUFS, ENOMEM and anything else unclassified
        _ => AcceptFailure::Resource,
    }
}

/// Source of inbound connections for the accept loop
trait Acceptor: Send + Sync + 'static {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;
}

impl Acceptor for TcpListener {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }
}

async fn accept_loop<A: Acceptor>(
    listener: A,
    settings: ConnectionSettings,
    jobs: mpsc::Sender<PrintJob>,
    cancel: CancellationToken,
    lifecycle: Arc<Mutex<Lifecycle>>,
    generation: u64,
) {
    let mut connections = JoinSet::new();
    let mut fatal = false;
    let mut backoff = ACCEPT_BACKOFF_MIN;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("accept loop cancelled");
                break;
            }

            Some(done) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = done
                    && e.is_panic()
                {
                    error!(error = %e, "connection task panicked");
                }
            }

            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        debug!(%peer, "connection accepted");
                        backoff = ACCEPT_BACKOFF_MIN;
                        connections.spawn(handle_connection(
                            stream,
                            peer,
                            settings,
                            jobs.clone(),
                            cancel.child_token(),
                        ));
                    }
                    Err(e) => match classify_accept_error(&e) {
                        AcceptFailure::Connection => {
                            debug!(error = %e, "accept failed, continuing");
                        }
                        AcceptFailure::Resource => {
                            warn!(error = %e, retry_in = ?backoff, "accept failed, backing off");
                            let cancelled = tokio::select! {
                                biased;
                                _ = cancel.cancelled() => true,
                                _ = tokio::time::sleep(backoff) => false,
                            };
                            if cancelled {
                                break;
                            }
                            backoff = (backoff * 2).min(ACCEPT_BACKOFF_MAX);
                        }
                        AcceptFailure::Fatal => {
                            error!(error = %e, "accept failed, shutting listener down");
                            fatal = true;
                            break;
                        }
                    },
                }
            }
        }
    }

    drop(listener);
    cancel.cancel();
    connections.shutdown().await;

    if fatal {
        let mut lifecycle = lifecycle.lock();
        if lifecycle
            .running
            .as_ref()
            .is_some_and(|r| r.generation == generation)
        {
            lifecycle.running = None;
            lifecycle.state = ServerState::Stopped;
        }
    }
}

#[instrument(skip_all, fields(peer = %peer))]
async fn handle_connection<S: AsyncRead + Unpin>(
    mut stream: S,
    peer: SocketAddr,
    settings: ConnectionSettings,
    jobs: mpsc::Sender<PrintJob>,
    cancel: CancellationToken,
) {
    let mut framer = JobFramer::with_capacity(settings.initial_capacity);
    let mut buf = vec![0u8; settings.read_buffer_size];

    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(pending = framer.pending(), "connection cancelled");
                return;
            }
            read = stream.read(&mut buf) => read,
        };

        match read {
            Ok(0) => break,
            Ok(n) => {
                for data in framer.push(&buf[..n]) {
                    if !send_job(&jobs, &cancel, peer, data).await {
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "read failed, flushing buffered bytes");
                break;
            }
        }
    }

    if let Some(data) = framer.finish() {
        send_job(&jobs, &cancel, peer, data).await;
    }
    debug!("connection closed");
}

/// Queue a job, waiting for room. `false` when the connection should end.
async fn send_job(
    jobs: &mpsc::Sender<PrintJob>,
    cancel: &CancellationToken,
    peer: SocketAddr,
    data: Vec<u8>,
) -> bool {
    let len = data.len();
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = jobs.send(PrintJob { peer, data }) => match sent {
            Ok(()) => {
                info!(bytes = len, "job received");
                true
            }
            Err(_) => {
                warn!("job queue closed, dropping connection");
                false
            }
        },
    }
}
