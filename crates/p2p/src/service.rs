//! Network service: listener, dial loops, and per-connection workers.
//!
//! One reader task per connection decodes frames and forwards them as
//! [`NetworkEvent`]s; one writer task per connection drains its
//! [`OutboundQueue`](crate::queue::OutboundQueue). HELLO and HEARTBEAT
//! payloads update the registry at the reader before being forwarded, so
//! identity resolution is already correct for the frames that follow
//! them on the same connection.

use std::sync::Arc;
use std::time::Duration;

use minichain_types::identity;
use minichain_wire::{frame, Message};
use rand::Rng;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::registry::{Direction, PeerConn, PeerRegistry};
use crate::{NetworkError, Result};

/// Address of a configured peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddr {
    /// Hostname or IP
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl PeerAddr {
    /// Validator identity derived from the host.
    pub fn identity(&self) -> String {
        identity::canonical(&self.host)
    }

    /// `host:port` form used for dialing and registry keys.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.endpoint())
    }
}

/// Network configuration supplied by the node.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Local canonical identity announced in HELLO
    pub node_id: String,
    /// Address the listener binds to
    pub listen_addr: String,
    /// Port advertised to peers in HELLO
    pub listening_port: u16,
    /// Software version string announced in HELLO
    pub version: String,
    /// Normalized peer list from the launcher
    pub peers: Vec<PeerAddr>,
    /// Connect timeout for outbound dials
    pub dial_timeout: Duration,
    /// First reconnect delay
    pub reconnect_base: Duration,
    /// Reconnect delay cap
    pub reconnect_max: Duration,
    /// Liveness window for heartbeat tracking
    pub heartbeat_timeout: Duration,
    /// Per-peer outbound queue capacity
    pub outbound_queue_capacity: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            listen_addr: "0.0.0.0:9000".to_string(),
            listening_port: 9000,
            version: env!("CARGO_PKG_VERSION").to_string(),
            peers: Vec::new(),
            dial_timeout: Duration::from_secs(5),
            reconnect_base: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(10),
            outbound_queue_capacity: 256,
        }
    }
}

/// Events emitted to the node's dispatch loop.
#[derive(Debug)]
pub enum NetworkEvent {
    /// A connection became live (either direction)
    PeerConnected {
        /// Socket address of the peer
        addr: String,
    },
    /// A connection went down
    PeerDisconnected {
        /// Socket address of the peer
        addr: String,
    },
    /// A decoded frame arrived
    Frame {
        /// Socket address of the delivering connection
        peer_addr: String,
        /// HELLO-announced identity of the peer, if known
        peer_id: Option<String>,
        /// The decoded message
        message: Message,
    },
}

struct ServiceContext {
    config: NetworkConfig,
    registry: Arc<PeerRegistry>,
    event_tx: mpsc::Sender<NetworkEvent>,
    stop_rx: watch::Receiver<bool>,
}

impl ServiceContext {
    fn hello(&self) -> Message {
        Message::Hello {
            node_id: self.config.node_id.clone(),
            listening_port: self.config.listening_port,
            version: self.config.version.clone(),
        }
    }
}

/// Owner of the listener and dial loops.
pub struct NetworkService;

impl NetworkService {
    /// Binds the listener, starts the accept loop and one dial loop per
    /// configured peer, and returns the handle plus the event stream.
    pub async fn spawn(config: NetworkConfig) -> Result<(NetworkHandle, mpsc::Receiver<NetworkEvent>)> {
        let listener = TcpListener::bind(&config.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "listener started");

        let (event_tx, event_rx) = mpsc::channel(1024);
        let (stop_tx, stop_rx) = watch::channel(false);
        let registry = Arc::new(PeerRegistry::new());

        let ctx = Arc::new(ServiceContext {
            config: config.clone(),
            registry: Arc::clone(&registry),
            event_tx,
            stop_rx,
        });

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(accept_loop(listener, Arc::clone(&ctx))));

        for peer in &config.peers {
            if identity::matches(&peer.identity(), &config.node_id) {
                debug!(peer = %peer, "skipping dial loop for self");
                continue;
            }
            tasks.push(tokio::spawn(dial_loop(peer.clone(), Arc::clone(&ctx))));
        }

        let handle = NetworkHandle {
            ctx,
            local_addr,
            stop_tx: Arc::new(stop_tx),
            tasks: Arc::new(parking_lot::Mutex::new(tasks)),
        };
        Ok((handle, event_rx))
    }
}

/// Cloneable handle used by the node to send and introspect.
#[derive(Clone)]
pub struct NetworkHandle {
    ctx: Arc<ServiceContext>,
    local_addr: std::net::SocketAddr,
    stop_tx: Arc<watch::Sender<bool>>,
    tasks: Arc<parking_lot::Mutex<Vec<JoinHandle<()>>>>,
}

impl NetworkHandle {
    /// The address the listener actually bound to.
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Fans a message out to every live connection. Per-peer failures
    /// are logged, never propagated - a congested or dead peer must not
    /// stall the orchestrator.
    pub fn broadcast(&self, message: &Message) {
        let conns = self.ctx.registry.all();
        trace!(kind = message.kind(), peers = conns.len(), "broadcast");
        for conn in conns {
            if let Err(err) = conn.queue.push(message.clone()) {
                warn!(peer = %conn.addr, kind = message.kind(), reason = %err, "broadcast send failed");
            }
        }
    }

    /// Sends a message to a validator identity: a cached connection
    /// matching the full identifier or its first label, or a fresh dial
    /// to the peer's advertised address.
    pub async fn send_to(&self, identity_str: &str, message: Message) -> Result<()> {
        if let Some(conn) = self.ctx.registry.find_by_identity(identity_str) {
            return conn.queue.push(message);
        }

        let peer = self
            .ctx
            .config
            .peers
            .iter()
            .find(|p| identity::matches(&p.identity(), identity_str))
            .cloned()
            .ok_or_else(|| NetworkError::NoRoute(identity_str.to_string()))?;

        debug!(identity = identity_str, addr = %peer, "no cached connection, dialing fresh");
        let conn = dial_peer(&peer, &self.ctx).await?;
        conn.queue.push(message)
    }

    /// Sends a message to the connection at a specific socket address
    /// (reply path for sync requests). Failures are logged, not
    /// propagated.
    pub fn send_to_addr(&self, addr: &str, message: Message) {
        match self.ctx.registry.all().into_iter().find(|c| c.addr == addr) {
            Some(conn) => {
                if let Err(err) = conn.queue.push(message) {
                    warn!(peer = addr, reason = %err, "reply send failed");
                }
            }
            None => warn!(peer = addr, "no live connection at address"),
        }
    }

    /// Records a HELLO against its delivering connection.
    pub fn record_hello(&self, peer_addr: &str, node_id: &str, listening_port: u16) {
        for conn in self.ctx.registry.all() {
            if conn.addr == peer_addr {
                conn.record_hello(node_id, listening_port);
            }
        }
    }

    /// Per-peer liveness and chain-position snapshots.
    pub fn peers_status(&self) -> Vec<crate::registry::PeerStatus> {
        self.ctx
            .registry
            .statuses(self.ctx.config.heartbeat_timeout)
    }

    /// The shared connection registry.
    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.ctx.registry
    }

    /// Cooperative shutdown: signal every worker, close every queue,
    /// and wait up to `drain` before abandoning connections.
    pub async fn shutdown(&self, drain: Duration) {
        let _ = self.stop_tx.send(true);
        self.ctx.registry.close_all();

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        let deadline = tokio::time::Instant::now() + drain;
        for task in tasks {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if timeout(remaining, task).await.is_err() {
                warn!("worker did not stop within drain window, abandoning");
                break;
            }
        }
        info!("network stopped");
    }
}

async fn accept_loop(listener: TcpListener, ctx: Arc<ServiceContext>) {
    let mut stop_rx = ctx.stop_rx.clone();
    loop {
        tokio::select! {
            _ = stop_rx.changed() => {
                debug!("accept loop stopping");
                return;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, remote)) => {
                        let addr = remote.to_string();
                        info!(peer = %addr, "inbound connection accepted");
                        let conn = Arc::new(PeerConn::new(
                            addr,
                            Direction::Inbound,
                            ctx.config.outbound_queue_capacity,
                        ));
                        start_connection(stream, conn, Arc::clone(&ctx));
                    }
                    Err(err) => {
                        warn!(reason = %err, "accept failed");
                    }
                }
            }
        }
    }
}

/// Reconnecting dial loop for one configured peer. Backoff starts at
/// `reconnect_base`, doubles to `reconnect_max`, with ±20 % jitter.
async fn dial_loop(peer: PeerAddr, ctx: Arc<ServiceContext>) {
    let mut stop_rx = ctx.stop_rx.clone();
    let mut backoff = ctx.config.reconnect_base;

    loop {
        if *stop_rx.borrow() {
            return;
        }

        match dial_peer(&peer, &ctx).await {
            Ok(conn) => {
                backoff = ctx.config.reconnect_base;
                // Wait until this connection dies before redialing.
                conn.queue.closed_wait().await;
            }
            Err(err) => {
                debug!(peer = %peer, reason = %err, retry_in_ms = backoff.as_millis() as u64, "dial failed");
            }
        }

        let delay = with_jitter(backoff);
        tokio::select! {
            _ = stop_rx.changed() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        backoff = (backoff * 2).min(ctx.config.reconnect_max);
    }
}

/// ±20 % jitter so reconnecting peers do not synchronize.
fn with_jitter(base: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.8..=1.2);
    base.mul_f64(factor)
}

/// Dials, registers, and starts workers for one peer. The HELLO
/// handshake is the first message on the wire.
async fn dial_peer(peer: &PeerAddr, ctx: &Arc<ServiceContext>) -> Result<Arc<PeerConn>> {
    let endpoint = peer.endpoint();
    let stream = match timeout(ctx.config.dial_timeout, TcpStream::connect(&endpoint)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => {
            return Err(NetworkError::Dial {
                addr: endpoint,
                source,
            })
        }
        Err(_) => return Err(NetworkError::DialTimeout { addr: endpoint }),
    };

    info!(peer = %endpoint, "outbound connection established");
    let conn = Arc::new(PeerConn::new(
        endpoint,
        Direction::Outbound,
        ctx.config.outbound_queue_capacity,
    ));
    start_connection(stream, Arc::clone(&conn), Arc::clone(ctx));
    Ok(conn)
}

/// Registers a connection and spawns its reader and writer workers.
fn start_connection(stream: TcpStream, conn: Arc<PeerConn>, ctx: Arc<ServiceContext>) {
    ctx.registry.insert(Arc::clone(&conn));
    let _ = conn.queue.push(ctx.hello());
    let _ = ctx
        .event_tx
        .try_send(NetworkEvent::PeerConnected {
            addr: conn.addr.clone(),
        });

    let (read_half, write_half) = stream.into_split();
    tokio::spawn(writer_worker(write_half, Arc::clone(&conn)));
    tokio::spawn(reader_worker(read_half, conn, ctx));
}

/// Drains the outbound queue onto the socket. Strict writer/reader
/// separation: only this task touches the write side.
async fn writer_worker(mut write_half: OwnedWriteHalf, conn: Arc<PeerConn>) {
    while let Some(message) = conn.queue.pop().await {
        if let Err(err) = frame::write_message(&mut write_half, &message).await {
            debug!(peer = %conn.addr, reason = %err, "write failed, closing");
            break;
        }
    }
    conn.queue.close();
}

/// Reads frames until error, EOF, or stop; forwards decoded messages to
/// the dispatch loop. HELLO/HEARTBEAT update the registry here so later
/// frames on this connection resolve the peer's identity.
async fn reader_worker(mut read_half: OwnedReadHalf, conn: Arc<PeerConn>, ctx: Arc<ServiceContext>) {
    let mut stop_rx = ctx.stop_rx.clone();
    loop {
        let message = tokio::select! {
            _ = stop_rx.changed() => break,
            result = frame::read_message(&mut read_half) => match result {
                Ok(message) => message,
                Err(err) => {
                    debug!(peer = %conn.addr, reason = %err, "read failed, peer down");
                    break;
                }
            }
        };

        match &message {
            Message::Hello {
                node_id,
                listening_port,
                ..
            } => conn.record_hello(node_id, *listening_port),
            Message::Heartbeat {
                node_id,
                height,
                last_block_hash,
            } => conn.record_heartbeat(node_id, *height, *last_block_hash),
            _ => {}
        }

        let event = NetworkEvent::Frame {
            peer_addr: conn.addr.clone(),
            peer_id: conn.node_id(),
            message,
        };
        if ctx.event_tx.send(event).await.is_err() {
            break;
        }
    }

    conn.queue.close();
    ctx.registry.remove(&conn);
    let _ = ctx
        .event_tx
        .try_send(NetworkEvent::PeerDisconnected {
            addr: conn.addr.clone(),
        });
}
