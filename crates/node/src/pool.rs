use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use santitham_network::inventory::{InvVec, ObjectType};
use santitham_network::{InvWithSource, NetAddr, Services, Session};
use santitham_primitives::block::{Block, BlockHash};
use santitham_primitives::hash_to_hex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

use crate::addr_book::AddrBook;
use crate::chain::ChainStore;
use crate::logging::{log_debug, log_info, log_warn};
use crate::state;

const TICK_INTERVAL: Duration = Duration::from_secs(5);
const ADDR_CHANNEL_CAPACITY: usize = 1;
const BLOCK_CHANNEL_CAPACITY: usize = 100;

/// Active sessions keyed by an internal id. Shared between the control
/// loop and the per-session termination hooks, which only ever remove
/// their own entry.
#[derive(Default)]
struct SessionSet {
    entries: Mutex<HashMap<u64, Arc<Session>>>,
    next_id: AtomicU64,
}

impl SessionSet {
    fn insert(&self, session: Arc<Session>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(id, session);
        }
        id
    }

    fn remove(&self, id: u64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&id);
        }
    }

    fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    fn any(&self) -> Option<Arc<Session>> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.values().next().cloned())
    }

    // Cloned out so callers never iterate while holding the lock; the
    // disconnect hooks remove entries from under an iteration otherwise.
    fn snapshot(&self) -> Vec<Arc<Session>> {
        self.entries
            .lock()
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default()
    }
}

fn install_session(sessions: &Arc<SessionSet>, session: &Arc<Session>) {
    let id = sessions.insert(Arc::clone(session));

    let on_disconnect = Arc::clone(sessions);
    session.set_on_disconnect(move || {
        on_disconnect.remove(id);
    });

    let on_error = Arc::clone(sessions);
    let peer = session.peer();
    session.set_on_error(move |err| {
        log_warn!("closing connection to {peer}: {err}");
        on_error.remove(id);
    });
}

fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Supervises a self-refilling set of peer sessions: mines addresses from
/// `addr` gossip, dials replacements in batches, follows block inventory
/// announcements and persists the collected chain fragment on shutdown.
pub struct Pool {
    sessions: Arc<SessionSet>,
    shutdown_tx: watch::Sender<bool>,
    error_tx: watch::Sender<Option<String>>,
    control: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Pool {
    /// Loads persisted state, dials the bootstrap peer and starts the
    /// control loop. A missing state or peers file starts empty.
    pub async fn new(
        addr: IpAddr,
        port: u16,
        min_connections: usize,
        state_path: PathBuf,
        peers_path: PathBuf,
    ) -> Result<Pool, String> {
        let blocks = state::load_blocks(&state_path)?;
        if !blocks.is_empty() {
            log_info!("loaded {} block(s) from {}", blocks.len(), state_path.display());
        }
        let chain = ChainStore::new(blocks);

        let mut addr_book = AddrBook::default();
        match state::load_peers(&peers_path) {
            Ok(peers) => {
                let loaded = addr_book.insert_many(peers);
                if loaded > 0 {
                    log_info!("loaded {loaded} peer address(es) from {}", peers_path.display());
                }
            }
            Err(err) => log_warn!("failed to load peers file: {err}"),
        }

        let session = Session::connect(addr, port, Services::NODE_NETWORK)
            .await
            .map_err(|err| format!("failed to connect to bootstrap peer {addr}:{port}: {err}"))?;

        let sessions = Arc::new(SessionSet::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (error_tx, _) = watch::channel(None);
        let (addrs_tx, addrs_rx) = mpsc::channel(ADDR_CHANNEL_CAPACITY);
        let (inv_tx, inv_rx) = mpsc::channel(min_connections.max(1));
        let (block_tx, block_rx) = mpsc::channel(BLOCK_CHANNEL_CAPACITY);

        install_session(&sessions, &session);
        tokio::spawn(Arc::clone(&session).run());
        session
            .find_peers(addrs_tx.clone())
            .await
            .map_err(|err| format!("failed requesting peer addresses: {err}"))?;
        session.get_inventory(inv_tx.clone());

        let control = ControlLoop {
            min_connections,
            state_path,
            peers_path,
            sessions: Arc::clone(&sessions),
            addr_book,
            chain,
            get_addr_pending: true,
            addrs_tx,
            addrs_rx,
            inv_tx,
            inv_rx,
            block_tx,
            block_rx,
            shutdown_rx,
            error_tx: error_tx.clone(),
        };
        let handle = tokio::spawn(control.run());

        Ok(Pool {
            sessions,
            shutdown_tx,
            error_tx,
            control: Mutex::new(Some(handle)),
        })
    }

    pub fn size(&self) -> usize {
        self.sessions.len()
    }

    /// Observes the pool's terminal error. The value flips from `None` at
    /// most once.
    pub fn error(&self) -> watch::Receiver<Option<String>> {
        self.error_tx.subscribe()
    }

    /// Stops the control loop, disconnects every session and flushes state
    /// to disk. Idempotent; concurrent calls wait on the same teardown.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = match self.control.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

struct ControlLoop {
    min_connections: usize,
    state_path: PathBuf,
    peers_path: PathBuf,
    sessions: Arc<SessionSet>,
    addr_book: AddrBook,
    chain: ChainStore,
    get_addr_pending: bool,
    addrs_tx: mpsc::Sender<Vec<NetAddr>>,
    addrs_rx: mpsc::Receiver<Vec<NetAddr>>,
    inv_tx: mpsc::Sender<InvWithSource>,
    inv_rx: mpsc::Receiver<InvWithSource>,
    block_tx: mpsc::Sender<Block>,
    block_rx: mpsc::Receiver<Block>,
    shutdown_rx: watch::Receiver<bool>,
    error_tx: watch::Sender<Option<String>>,
}

impl ControlLoop {
    async fn run(mut self) {
        let mut tick = interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if !self.handle_tick().await {
                        break;
                    }
                }
                Some(addrs) = self.addrs_rx.recv() => {
                    log_info!("received {} peer addresses", addrs.len());
                    self.addr_book.insert_many(addrs);
                    self.get_addr_pending = false;
                }
                Some(inv) = self.inv_rx.recv() => self.handle_inventory(inv).await,
                Some(block) = self.block_rx.recv() => self.handle_block(block).await,
                _ = self.shutdown_rx.changed() => break,
            }
        }

        self.finish();
    }

    /// Reconciliation; returns `false` when the pool is exhausted and must
    /// shut itself down.
    async fn handle_tick(&mut self) -> bool {
        if self.sessions.len() == 0 {
            log_warn!("node pool needs at least one connection to add more; shutting down");
            let _ = self
                .error_tx
                .send(Some("node pool needs at least one connection to add more".to_string()));
            return false;
        }

        let low_on_addrs = self.addr_book.len() <= self.min_connections;
        let low_on_connections = self.sessions.len() < self.min_connections;

        if low_on_connections && !low_on_addrs {
            log_info!(
                "trying to connect to more nodes. current: {} target: {} peer addresses left to try: {}",
                self.sessions.len(),
                self.min_connections,
                self.addr_book.len()
            );
            let added = self.add_connections().await;
            if added > 0 {
                log_info!("connected to {added} more node(s)");
            } else if added < 0 {
                log_info!("lost {} connection(s)", -added);
            } else {
                log_info!("failed to connect to more nodes");
            }
        } else if low_on_addrs && !self.get_addr_pending {
            log_info!("running low on peer addresses. requesting more...");
            self.get_addr_pending = self.request_peer_addrs().await;
        }
        true
    }

    /// Dials a batch of candidates in parallel and waits for all attempts.
    /// A dial started after shutdown was signaled bails out early.
    async fn add_connections(&mut self) -> i64 {
        let before = self.sessions.len() as i64;
        let batch = self
            .addr_book
            .pop_batch(self.min_connections * 4, unix_now_secs());

        let mut join_set = JoinSet::new();
        for peer in batch {
            let sessions = Arc::clone(&self.sessions);
            let inv_tx = self.inv_tx.clone();
            let shutdown_rx = self.shutdown_rx.clone();
            join_set.spawn(async move {
                if *shutdown_rx.borrow() {
                    return;
                }
                let session =
                    match Session::connect(peer.ip_addr(), peer.port, Services::NODE_NETWORK).await
                    {
                        Ok(session) => session,
                        Err(err) => {
                            log_debug!("failed to connect to {}: {err}", peer.socket_addr());
                            return;
                        }
                    };
                install_session(&sessions, &session);
                session.get_inventory(inv_tx);
                tokio::spawn(Arc::clone(&session).run());
            });
        }
        while join_set.join_next().await.is_some() {}

        self.sessions.len() as i64 - before
    }

    async fn request_peer_addrs(&self) -> bool {
        let Some(session) = self.sessions.any() else {
            return false;
        };
        match session.find_peers(self.addrs_tx.clone()).await {
            Ok(()) => true,
            Err(err) => {
                log_warn!("failed requesting peer addresses from {}: {err}", session.peer());
                false
            }
        }
    }

    /// Requests every announced block we have not seen, from the session
    /// that announced it.
    async fn handle_inventory(&mut self, inv: InvWithSource) {
        let mut request = Vec::new();
        for item in &inv.inventory {
            let is_block = matches!(item.inv_type, ObjectType::Block | ObjectType::WitnessBlock);
            if is_block && !self.chain.contains(&item.hash) {
                log_info!(
                    "requesting block {} from {}",
                    hash_to_hex(&item.hash),
                    inv.session.peer()
                );
                request.push(*item);
            }
        }

        if request.is_empty() {
            return;
        }
        if inv
            .session
            .get_blocks(&request, self.block_tx.clone())
            .await
            .is_err()
        {
            log_warn!("failed requesting blocks from {}", inv.session.peer());
        }
    }

    async fn handle_block(&mut self, block: Block) {
        let hash = block.hash();
        let Some(mut missing) = self.chain.ingest(hash, block) else {
            return;
        };
        log_info!("received block {}", hash_to_hex(&hash));

        // requesting every gap at once amplifies fan-out; refetch at most
        // one parent per ingested block
        missing.truncate(1);
        if !missing.is_empty() {
            log_info!("requesting {} missing block(s)", missing.len());
            self.request_blocks(&missing).await;
        }
        log_info!("got {} blocks in total so far", self.chain.len());
    }

    async fn request_blocks(&self, hashes: &[BlockHash]) {
        let inventory: Vec<InvVec> = hashes
            .iter()
            .map(|hash| InvVec {
                inv_type: ObjectType::Block,
                hash: *hash,
            })
            .collect();

        for session in self.sessions.snapshot() {
            if session
                .get_blocks(&inventory, self.block_tx.clone())
                .await
                .is_err()
            {
                log_warn!(
                    "requesting {} block(s) from {} failed",
                    inventory.len(),
                    session.peer()
                );
            }
        }
    }

    fn finish(&mut self) {
        for session in self.sessions.snapshot() {
            session.disconnect();
        }

        if let Err(err) = state::save_blocks(&self.state_path, self.chain.blocks()) {
            log_warn!("failed writing state to {}: {err}", self.state_path.display());
        }
        let peers = self.addr_book.snapshot();
        if let Err(err) = state::save_peers(&self.peers_path, &peers) {
            log_warn!("failed writing peers to {}: {err}", self.peers_path.display());
        }
    }
}
