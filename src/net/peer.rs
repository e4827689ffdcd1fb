//! Peer transport: the ordered-unreliable channel over UDP
//!
//! The simulation only sees the `PeerTransport` trait. The UDP
//! implementation stamps outbound datagrams with a monotonic sequence
//! number and filters inbound ones through a `SequenceFilter`, which yields
//! the contract the sync protocol is written against: frames that arrive,
//! arrive in send order; everything else is silent loss.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::game::object::{ObjectId, ObjectKind};
use crate::game::player::{GamePlayer, PlayerId, PlayerRegistry};
use crate::net::protocol::{Frame, SequenceFilter};
use crate::util::rate_limit::PeerRateLimiter;
use crate::util::time::unix_millis;

/// How often identity announcements and latency probes go out
const PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Inbound sync queue depth. Overflow drops frames, which is exactly the
/// channel's loss semantics: the next snapshot supersedes anything dropped.
const INBOUND_QUEUE_DEPTH: usize = 256;

/// Largest datagram the receive loop accepts
const MAX_DATAGRAM_LEN: usize = 512;

/// Abstraction over the connection to one remote peer
pub trait PeerTransport: Send + Sync {
    /// Fire-and-forget send on the unreliable ordered channel; the frame
    /// may be silently dropped anywhere along the way
    fn send_unreliable_ordered(&self, frame: Frame);

    /// The remote player, once the handshake has identified it
    fn player(&self) -> Option<GamePlayer>;

    /// Last measured round-trip latency in milliseconds. Advisory display
    /// data only, never used for protocol correctness.
    fn rtt_ms(&self) -> Option<u32>;
}

/// An object snapshot received from the remote peer, queued until the
/// simulation drains it at the top of a tick
#[derive(Debug, Clone)]
pub struct InboundSync {
    pub sender: PlayerId,
    pub kind: ObjectKind,
    pub object_id: ObjectId,
    pub owner_id: PlayerId,
    pub payload: Bytes,
}

/// State shared between the peer handle and its background tasks
struct PeerShared {
    socket: UdpSocket,
    seq: AtomicU32,
    /// Round-trip time in milliseconds, offset by one; zero means
    /// unmeasured
    rtt: AtomicU32,
    /// Remote player id, set once by the first Hello
    remote: OnceLock<PlayerId>,
}

/// UDP-backed peer connection. Dropping the handle aborts the background
/// tasks, which stops all further sends and receives.
pub struct UdpPeer {
    shared: Arc<PeerShared>,
    players: Arc<PlayerRegistry>,
    recv_task: JoinHandle<()>,
    probe_task: JoinHandle<()>,
}

impl UdpPeer {
    /// Bind a socket, connect it to the remote peer, and spawn the receive
    /// and probe tasks. Returns the peer handle and the queue of inbound
    /// sync frames.
    pub async fn connect(
        bind_addr: SocketAddr,
        peer_addr: SocketAddr,
        local: GamePlayer,
        players: Arc<PlayerRegistry>,
    ) -> std::io::Result<(Self, mpsc::Receiver<InboundSync>)> {
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(peer_addr).await?;
        info!(local = %socket.local_addr()?, peer = %peer_addr, "Peer socket connected");

        Ok(Self::from_socket(socket, local, players))
    }

    /// Wrap an already-connected socket; used by `connect` and by tests
    /// that pair sockets on ephemeral ports
    pub fn from_socket(
        socket: UdpSocket,
        local: GamePlayer,
        players: Arc<PlayerRegistry>,
    ) -> (Self, mpsc::Receiver<InboundSync>) {
        let shared = Arc::new(PeerShared {
            socket,
            seq: AtomicU32::new(0),
            rtt: AtomicU32::new(0),
            remote: OnceLock::new(),
        });

        let (sync_tx, sync_rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);

        let recv_task = tokio::spawn(recv_loop(shared.clone(), players.clone(), sync_tx));
        let probe_task = tokio::spawn(probe_loop(shared.clone(), local));

        let peer = Self {
            shared,
            players,
            recv_task,
            probe_task,
        };

        (peer, sync_rx)
    }
}

impl PeerTransport for UdpPeer {
    fn send_unreliable_ordered(&self, frame: Frame) {
        send_frame(&self.shared, &frame);
    }

    fn player(&self) -> Option<GamePlayer> {
        self.shared
            .remote
            .get()
            .and_then(|id| self.players.get(id))
    }

    fn rtt_ms(&self) -> Option<u32> {
        match self.shared.rtt.load(Ordering::Relaxed) {
            0 => None,
            offset => Some(offset - 1),
        }
    }
}

impl Drop for UdpPeer {
    fn drop(&mut self) {
        self.recv_task.abort();
        self.probe_task.abort();
    }
}

/// Stamp the next sequence number and push the datagram out. A full socket
/// buffer is just frame loss on an unreliable channel.
fn send_frame(shared: &PeerShared, frame: &Frame) {
    let seq = shared.seq.fetch_add(1, Ordering::Relaxed) + 1;
    let datagram = frame.encode(seq);

    if let Err(e) = shared.socket.try_send(&datagram) {
        debug!(error = %e, "Dropped outbound datagram");
    }
}

/// Receive loop: decode, order-filter, and dispatch inbound datagrams
async fn recv_loop(
    shared: Arc<PeerShared>,
    players: Arc<PlayerRegistry>,
    sync_tx: mpsc::Sender<InboundSync>,
) {
    let mut buf = [0u8; MAX_DATAGRAM_LEN];
    let mut filter = SequenceFilter::default();
    let rate_limiter = PeerRateLimiter::new();

    loop {
        let len = match shared.socket.recv(&mut buf).await {
            Ok(len) => len,
            Err(e) => {
                // Connected UDP surfaces ICMP errors here; back off so an
                // unreachable peer does not spin the loop
                debug!(error = %e, "UDP receive failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };

        let (seq, frame) = match Frame::decode(&buf[..len]) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(error = %e, "Dropping malformed datagram");
                continue;
            }
        };

        if !filter.accept(seq) {
            // Behind the newest frame seen: the channel is ordered
            continue;
        }

        match frame {
            Frame::Hello {
                player_id,
                host,
                name,
            } => {
                if shared.remote.set(player_id).is_ok() {
                    info!(player_id = %player_id, host, name = %name, "Remote peer identified");
                    players.insert(GamePlayer::new(player_id, name, host));
                }
            }
            Frame::Ping { t } => {
                send_frame(&shared, &Frame::Pong { t });
            }
            Frame::Pong { t } => {
                let rtt = unix_millis().saturating_sub(t) as u32;
                shared.rtt.store(rtt + 1, Ordering::Relaxed);
                if let Some(id) = shared.remote.get() {
                    players.set_ping(id, rtt);
                }
            }
            Frame::ObjectSync {
                kind,
                object_id,
                owner_id,
                payload,
            } => {
                if !rate_limiter.check_sync() {
                    warn!(object_id = %object_id, "Rate limited inbound sync frame");
                    continue;
                }

                let Some(&sender) = shared.remote.get() else {
                    debug!("Sync frame before handshake, dropping");
                    continue;
                };

                // A full queue means the simulation is behind; dropping is
                // the channel's loss semantics
                let _ = sync_tx.try_send(InboundSync {
                    sender,
                    kind,
                    object_id,
                    owner_id,
                    payload,
                });
            }
        }
    }
}

/// Probe loop: keep announcing our identity and measuring latency
async fn probe_loop(shared: Arc<PeerShared>, local: GamePlayer) {
    let mut probe = tokio::time::interval(PROBE_INTERVAL);

    loop {
        probe.tick().await;

        send_frame(
            &shared,
            &Frame::Hello {
                player_id: local.id(),
                host: local.is_host(),
                name: local.name().to_string(),
            },
        );

        if shared.remote.get().is_some() {
            send_frame(&shared, &Frame::Ping { t: unix_millis() });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;
    use uuid::Uuid;

    async fn socket_pair() -> (UdpSocket, UdpSocket) {
        let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        a.connect(b.local_addr().unwrap()).await.unwrap();
        b.connect(a.local_addr().unwrap()).await.unwrap();
        (a, b)
    }

    async fn wait_for_player(peer: &UdpPeer) -> GamePlayer {
        timeout(Duration::from_secs(5), async {
            loop {
                if let Some(player) = peer.player() {
                    return player;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("handshake timed out")
    }

    #[tokio::test]
    async fn peers_identify_each_other_and_relay_sync_frames() {
        let (socket_a, socket_b) = socket_pair().await;

        let player_a = GamePlayer::new(Uuid::new_v4(), "a", true);
        let player_b = GamePlayer::new(Uuid::new_v4(), "b", false);

        let registry_a = Arc::new(PlayerRegistry::new());
        let registry_b = Arc::new(PlayerRegistry::new());

        let (peer_a, mut inbound_a) =
            UdpPeer::from_socket(socket_a, player_a.clone(), registry_a.clone());
        let (peer_b, _inbound_b) =
            UdpPeer::from_socket(socket_b, player_b.clone(), registry_b.clone());

        // Hello exchange carries identity and host flag
        let seen_by_a = wait_for_player(&peer_a).await;
        assert_eq!(seen_by_a.id(), player_b.id());
        assert!(!seen_by_a.is_host());

        let seen_by_b = wait_for_player(&peer_b).await;
        assert_eq!(seen_by_b.id(), player_a.id());
        assert!(seen_by_b.is_host());

        // Object snapshots land in the receiver's inbound queue
        let object_id = Uuid::new_v4();
        peer_b.send_unreliable_ordered(Frame::ObjectSync {
            kind: ObjectKind::Car,
            object_id,
            owner_id: player_b.id(),
            payload: Bytes::from_static(&[0, 10, 0, 20, 0, 0, 0, 100]),
        });

        let sync = timeout(Duration::from_secs(5), inbound_a.recv())
            .await
            .expect("sync frame timed out")
            .expect("queue closed");

        assert_eq!(sync.sender, player_b.id());
        assert_eq!(sync.object_id, object_id);
        assert_eq!(sync.owner_id, player_b.id());
        assert_eq!(sync.kind, ObjectKind::Car);
    }
}
