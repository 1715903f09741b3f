use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use hashwork_core::enums::ProtocolMessage;
use hashwork_core::ids::PeerId;
use hashwork_core::wire::{Frame, MAX_FRAME_SIZE, PROTOCOL_NAME, PROTOCOL_VERSION};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;

use crate::{codec, TransportError};

/// Events queued for the consumer before connection readers stop reading.
const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub listen_addr: SocketAddr,
    pub peer_id: PeerId,
    pub max_frame_size: usize,
    pub handshake_timeout: Duration,
}

impl TransportConfig {
    pub fn new(listen_addr: SocketAddr, peer_id: PeerId) -> Self {
        Self {
            listen_addr,
            peer_id,
            max_frame_size: MAX_FRAME_SIZE,
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

/// Connection lifecycle and inbound traffic, in arrival order per peer.
///
/// Delivered to exactly one consumer; nothing is dropped when it falls
/// behind, the connection readers wait instead.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    Connected(PeerHandle),
    Disconnected(PeerId),
    Message {
        from: PeerHandle,
        message: ProtocolMessage,
    },
}

/// Addressable end of one peer connection.
///
/// Sends are queued to the connection's writer task and never block.
/// A message that would not fit in one frame is refused by `send`.
#[derive(Clone)]
pub struct PeerHandle {
    id: PeerId,
    outbound: mpsc::UnboundedSender<ProtocolMessage>,
    closed: CancellationToken,
    max_frame_size: usize,
}

impl PeerHandle {
    /// A handle detached from any socket; whatever is sent on it shows up
    /// on the returned receiver.
    pub fn channel(id: PeerId) -> (Self, mpsc::UnboundedReceiver<ProtocolMessage>) {
        Self::with_frame_limit(id, MAX_FRAME_SIZE)
    }

    fn with_frame_limit(
        id: PeerId,
        max_frame_size: usize,
    ) -> (Self, mpsc::UnboundedReceiver<ProtocolMessage>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        (
            Self {
                id,
                outbound,
                closed: CancellationToken::new(),
                max_frame_size,
            },
            rx,
        )
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn send(&self, message: impl Into<ProtocolMessage>) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed(self.id.short()));
        }
        let message = message.into();
        let size = codec::encode(&Frame::Message(message.clone()))?.len();
        if size > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        self.outbound
            .send(message)
            .map_err(|_| TransportError::Closed(self.id.short()))
    }

    /// Ask the connection task to hang up.
    pub fn disconnect(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.outbound.is_closed()
    }
}

impl fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerHandle")
            .field("id", &self.id.short())
            .field("closed", &self.is_closed())
            .finish()
    }
}

struct Inner {
    listener: TcpListener,
    config: TransportConfig,
    peers: DashMap<PeerId, PeerHandle>,
    /// Inbound: connection events for the single consumer.
    events_tx: mpsc::Sender<PeerEvent>,
    shutdown: CancellationToken,
}

#[derive(Clone)]
pub struct PeerNode {
    inner: Arc<Inner>,
}

impl PeerNode {
    /// Bind the listener. The returned receiver yields every peer event.
    pub async fn new(
        config: TransportConfig,
    ) -> Result<(Self, mpsc::Receiver<PeerEvent>), TransportError> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        let (events_tx, events_rx) = mpsc::channel::<PeerEvent>(EVENT_CAPACITY);
        let node = Self {
            inner: Arc::new(Inner {
                listener,
                config,
                peers: DashMap::new(),
                events_tx,
                shutdown: CancellationToken::new(),
            }),
        };
        Ok((node, events_rx))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.inner.listener.local_addr()?)
    }

    pub fn local_id(&self) -> PeerId {
        self.inner.config.peer_id
    }

    /// Currently connected peers.
    pub fn peers(&self) -> Vec<PeerHandle> {
        self.inner.peers.iter().map(|r| r.value().clone()).collect()
    }

    pub fn peer(&self, id: &PeerId) -> Option<PeerHandle> {
        self.inner.peers.get(id).map(|r| r.value().clone())
    }

    pub async fn run(&self) -> Result<(), TransportError> {
        loop {
            tokio::select! {
                accepted = self.inner.listener.accept() => {
                    let (stream, addr) = accepted?;
                    tracing::trace!(%addr, "accepted connection");
                    self.spawn_connection(stream, addr);
                }
                _ = self.inner.shutdown.cancelled() => return Ok(()),
            }
        }
    }

    pub async fn connect(&self, addr: SocketAddr) -> Result<(), TransportError> {
        let stream = TcpStream::connect(addr).await?;
        self.spawn_connection(stream, addr);
        Ok(())
    }

    /// Stop accepting and close every connection.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(e) = run_connection(inner, stream).await {
                tracing::debug!(%addr, error = %e, "connection closed with error");
            }
        });
    }
}

async fn run_connection(inner: Arc<Inner>, stream: TcpStream) -> Result<(), TransportError> {
    let max_frame_size = inner.config.max_frame_size;
    let mut framed = codec::framed(stream, max_frame_size);
    let remote_id = handshake(
        &mut framed,
        inner.config.peer_id,
        inner.config.handshake_timeout,
    )
    .await?;

    let (handle, outbound_rx) = PeerHandle::with_frame_limit(remote_id, max_frame_size);
    match inner.peers.entry(remote_id) {
        Entry::Occupied(_) => {
            return Err(TransportError::Handshake(format!(
                "already connected to {}",
                remote_id.short()
            )));
        }
        Entry::Vacant(slot) => {
            slot.insert(handle.clone());
        }
    }

    tracing::info!(peer = %remote_id.short(), "peer connected");
    let result = match inner.events_tx.send(PeerEvent::Connected(handle.clone())).await {
        Ok(()) => pump(&inner, &handle, framed, outbound_rx).await,
        Err(_) => Err(TransportError::Closed("event consumer".to_string())),
    };

    inner.peers.remove(&remote_id);
    handle.disconnect();
    tracing::info!(peer = %remote_id.short(), "peer disconnected");
    let _ = inner.events_tx.send(PeerEvent::Disconnected(remote_id)).await;

    result
}

/// Move frames between the socket and the node until either side hangs up.
async fn pump(
    inner: &Inner,
    handle: &PeerHandle,
    mut framed: Framed<TcpStream, LengthDelimitedCodec>,
    mut outbound_rx: mpsc::UnboundedReceiver<ProtocolMessage>,
) -> Result<(), TransportError> {
    let remote_id = handle.id();
    loop {
        tokio::select! {
            incoming = framed.next() => match incoming {
                Some(Ok(bytes)) => match codec::decode(&bytes)? {
                    Frame::Message(message) => {
                        let event = PeerEvent::Message {
                            from: handle.clone(),
                            message,
                        };
                        // Waits while the consumer is behind, so this socket
                        // is not read meanwhile.
                        if inner.events_tx.send(event).await.is_err() {
                            return Err(TransportError::Closed("event consumer".to_string()));
                        }
                    }
                    Frame::Hello { .. } => {
                        return Err(TransportError::Handshake("unexpected hello".to_string()));
                    }
                },
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            },
            Some(message) = outbound_rx.recv() => {
                let kind = message.kind();
                let bytes = match codec::encode(&Frame::Message(message)) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(peer = %remote_id.short(), kind, error = %e, "failed to encode message");
                        continue;
                    }
                };
                framed.send(tokio_util::bytes::Bytes::from(bytes)).await?;
            }
            _ = handle.closed.cancelled() => return Ok(()),
            _ = inner.shutdown.cancelled() => return Ok(()),
        }
    }
}

async fn handshake<T>(
    framed: &mut Framed<T, LengthDelimitedCodec>,
    local_id: PeerId,
    timeout: Duration,
) -> Result<PeerId, TransportError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    framed.send(tokio_util::bytes::Bytes::from(codec::encode(&Frame::hello(local_id))?)).await?;

    let bytes = match tokio::time::timeout(timeout, framed.next()).await {
        Err(_) => return Err(TransportError::Handshake("timed out waiting for hello".to_string())),
        Ok(None) => return Err(TransportError::Handshake("closed before hello".to_string())),
        Ok(Some(read)) => read?,
    };

    match codec::decode(&bytes)? {
        Frame::Hello {
            peer_id,
            protocol,
            version,
        } => {
            if protocol != PROTOCOL_NAME || version != PROTOCOL_VERSION {
                return Err(TransportError::Handshake(format!(
                    "unsupported protocol {protocol}/{version}"
                )));
            }
            if peer_id == local_id {
                return Err(TransportError::Handshake("connected to self".to_string()));
            }
            Ok(peer_id)
        }
        Frame::Message(_) => Err(TransportError::Handshake("expected hello".to_string())),
    }
}
