use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use santitham_primitives::block::Block;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Duration};

use crate::command::Command;
use crate::error::NetworkError;
use crate::handshake::handshake;
use crate::inventory::{decode_inv_payload, encode_inv_payload, InvVec};
use crate::message::Message;
use crate::net_addr::{decode_addr_payload, NetAddr};
use crate::services::Services;
use crate::version::parse_version;

pub const DIAL_TIMEOUT: Duration = Duration::from_secs(15);

/// Outbound messages queue through a small bounded channel so producers
/// feel backpressure from a slow socket.
const WRITE_QUEUE_CAPACITY: usize = 5;

/// An inventory announcement tagged with the session that sent it, so the
/// owner can request the objects from the same peer.
pub struct InvWithSource {
    pub inventory: Vec<InvVec>,
    pub session: Arc<Session>,
}

type DisconnectHook = Box<dyn FnOnce() + Send>;
type ErrorHook = Box<dyn FnOnce(NetworkError) + Send>;

/// One outbound peer connection after a completed handshake.
///
/// The socket is owned by two cooperating tasks: the reader loop driven by
/// [`Session::run`] and a writer task that is the sole consumer of the
/// outbound queue. Termination runs through a single atomic latch so that
/// exactly one of the disconnect/error hooks fires, no matter how the
/// connection ends.
pub struct Session {
    addr: IpAddr,
    port: u16,
    protocol_version: i32,
    services: Services,
    on_disconnect: Mutex<Option<DisconnectHook>>,
    on_error: Mutex<Option<ErrorHook>>,
    peers_tx: Mutex<Option<mpsc::Sender<Vec<NetAddr>>>>,
    inv_tx: Mutex<Option<mpsc::Sender<InvWithSource>>>,
    block_tx: Mutex<Option<mpsc::Sender<Block>>>,
    write_tx: mpsc::Sender<Message>,
    write_rx: Mutex<Option<mpsc::Receiver<Message>>>,
    reader: Mutex<Option<OwnedReadHalf>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    stop_tx: watch::Sender<bool>,
    shutting_down: AtomicBool,
}

impl Session {
    /// Dials `addr:port`, runs the handshake and enforces service gating.
    /// The peer must advertise every bit in `requested_services`; otherwise
    /// the socket is closed and no session is returned.
    pub async fn connect(
        addr: IpAddr,
        port: u16,
        requested_services: Services,
    ) -> Result<Arc<Self>, NetworkError> {
        let socket = SocketAddr::new(addr, port);
        let mut stream = match timeout(DIAL_TIMEOUT, TcpStream::connect(socket)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => return Err(NetworkError::Io(err)),
            Err(_) => {
                return Err(NetworkError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connection to {socket} timed out"),
                )))
            }
        };

        let peer_version = handshake(&mut stream, addr, port, requested_services).await?;
        let info = parse_version(&peer_version.payload)?;
        if !info.services.contains(requested_services) {
            return Err(NetworkError::ServicesUnavailable);
        }

        let (read_half, write_half) = stream.into_split();
        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
        let (stop_tx, _) = watch::channel(false);

        Ok(Arc::new(Self {
            addr,
            port,
            protocol_version: info.version,
            services: info.services,
            on_disconnect: Mutex::new(None),
            on_error: Mutex::new(None),
            peers_tx: Mutex::new(None),
            inv_tx: Mutex::new(None),
            block_tx: Mutex::new(None),
            write_tx,
            write_rx: Mutex::new(Some(write_rx)),
            reader: Mutex::new(Some(read_half)),
            writer: Mutex::new(Some(write_half)),
            stop_tx,
            shutting_down: AtomicBool::new(false),
        }))
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn peer(&self) -> String {
        SocketAddr::new(self.addr, self.port).to_string()
    }

    pub fn protocol_version(&self) -> i32 {
        self.protocol_version
    }

    pub fn services(&self) -> Services {
        self.services
    }

    /// Runs after the connection has been closed by [`Session::disconnect`].
    pub fn set_on_disconnect<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Ok(mut guard) = self.on_disconnect.lock() {
            *guard = Some(Box::new(hook));
        }
    }

    /// Runs after the connection has been closed by an I/O or protocol
    /// error.
    pub fn set_on_error<F>(&self, hook: F)
    where
        F: FnOnce(NetworkError) + Send + 'static,
    {
        if let Ok(mut guard) = self.on_error.lock() {
            *guard = Some(Box::new(hook));
        }
    }

    /// Installs a one-shot channel for the next inbound `addr` payload and
    /// queues a `getaddr` request.
    pub async fn find_peers(
        &self,
        peers_tx: mpsc::Sender<Vec<NetAddr>>,
    ) -> Result<(), NetworkError> {
        if let Ok(mut guard) = self.peers_tx.lock() {
            *guard = Some(peers_tx);
        }
        self.write(Message::getaddr()).await
    }

    /// Installs the channel on which all inbound `inv` announcements are
    /// delivered, each tagged with this session.
    pub fn get_inventory(&self, inv_tx: mpsc::Sender<InvWithSource>) {
        if let Ok(mut guard) = self.inv_tx.lock() {
            *guard = Some(inv_tx);
        }
    }

    /// Requests the given inventory from the peer. Every block the peer
    /// subsequently delivers, requested here or not, arrives on `block_tx`.
    pub async fn get_blocks(
        &self,
        inventory: &[InvVec],
        block_tx: mpsc::Sender<Block>,
    ) -> Result<(), NetworkError> {
        if let Ok(mut guard) = self.block_tx.lock() {
            *guard = Some(block_tx);
        }
        let payload = encode_inv_payload(inventory);
        self.write(Message::new(Command::GETDATA, payload)).await
    }

    /// Closes the connection and runs the disconnect hook. Idempotent, and
    /// a no-op if the error path won the race.
    pub fn disconnect(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.stop_tx.send(true);
        self.release_socket();
        let hook = match self.on_disconnect.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Drives the session: spawns the writer task and dispatches inbound
    /// messages until the connection terminates.
    pub async fn run(self: Arc<Self>) {
        let reader = match self.reader.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let writer = match self.writer.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let write_rx = match self.write_rx.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let (Some(mut reader), Some(writer), Some(write_rx)) = (reader, writer, write_rx) else {
            return;
        };

        let writer_session = Arc::clone(&self);
        tokio::spawn(async move { writer_session.process_writes(writer, write_rx).await });

        let mut stop_rx = self.stop_tx.subscribe();
        if *stop_rx.borrow() {
            return;
        }

        loop {
            let message = tokio::select! {
                _ = stop_rx.changed() => return,
                result = Message::read_from(&mut reader) => match result {
                    Ok(message) => message,
                    Err(err) => {
                        self.fail(err);
                        return;
                    }
                },
            };

            match message.command() {
                Command::PING => {
                    let pong = Message::new(Command::PONG, message.payload);
                    if self.write(pong).await.is_err() {
                        return;
                    }
                }
                Command::ADDR => self.handle_addr(&message.payload).await,
                Command::INV => Arc::clone(&self).handle_inv(message.payload).await,
                Command::BLOCK => self.handle_block(&message.payload).await,
                _ => {}
            }
        }
    }

    async fn process_writes(
        self: Arc<Self>,
        mut writer: OwnedWriteHalf,
        mut write_rx: mpsc::Receiver<Message>,
    ) {
        let mut stop_rx = self.stop_tx.subscribe();
        if *stop_rx.borrow() {
            return;
        }
        loop {
            tokio::select! {
                _ = stop_rx.changed() => return,
                message = write_rx.recv() => {
                    let Some(message) = message else { return };
                    if let Err(err) = message.write_to(&mut writer).await {
                        self.fail(err);
                        return;
                    }
                }
            }
        }
    }

    async fn write(&self, message: Message) -> Result<(), NetworkError> {
        self.write_tx
            .send(message)
            .await
            .map_err(|_| NetworkError::ConnectionClosed)
    }

    async fn handle_addr(&self, payload: &[u8]) {
        let installed = match self.peers_tx.lock() {
            Ok(guard) => guard.is_some(),
            Err(_) => false,
        };
        if !installed {
            return;
        }

        let addrs = match decode_addr_payload(payload) {
            Ok(addrs) => addrs,
            Err(err) => {
                eprintln!("ignoring addr payload from {}: {err}", self.peer());
                return;
            }
        };

        let peers_tx = match self.peers_tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(peers_tx) = peers_tx {
            let _ = peers_tx.send(addrs).await;
        }
    }

    async fn handle_inv(self: Arc<Self>, payload: Vec<u8>) {
        let inventory = match decode_inv_payload(&payload) {
            Ok(inventory) => inventory,
            Err(err) => {
                eprintln!("ignoring inv payload from {}: {err}", self.peer());
                return;
            }
        };

        let inv_tx = match self.inv_tx.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        if let Some(inv_tx) = inv_tx {
            let _ = inv_tx
                .send(InvWithSource {
                    inventory,
                    session: self,
                })
                .await;
        }
    }

    async fn handle_block(&self, payload: &[u8]) {
        let block_tx = match self.block_tx.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        let Some(block_tx) = block_tx else { return };

        match Block::consensus_decode(payload) {
            Ok(block) => {
                let _ = block_tx.send(block).await;
            }
            Err(err) => {
                eprintln!("received invalid block from {}: {err}", self.peer());
            }
        }
    }

    fn fail(&self, err: NetworkError) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.stop_tx.send(true);
        self.release_socket();
        let hook = match self.on_error.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(hook) = hook {
            hook(err);
        }
    }

    // Drops any halves still parked on the struct; halves owned by the
    // reader/writer tasks close when those tasks observe the stop signal.
    fn release_socket(&self) {
        if let Ok(mut guard) = self.reader.lock() {
            guard.take();
        }
        if let Ok(mut guard) = self.writer.lock() {
            guard.take();
        }
        if let Ok(mut guard) = self.peers_tx.lock() {
            guard.take();
        }
    }
}
