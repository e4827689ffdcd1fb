//! World simulation: the per-tick loop, inbound reconciliation, and the
//! outbound sync pass
//!
//! One logical simulation thread per peer: inbound frames are queued by the
//! transport and drained at the top of the tick, so every object sees a
//! consistent, frozen view of remote state for the whole tick. Nothing in
//! here blocks on the network.

use std::collections::HashSet;
use std::f64::consts::TAU;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::authority::{
    assign_host_owner_to_shared, handle_inactive_object, is_invalid_owner,
};
use crate::game::car::{CarObject, CAR_SIZE};
use crate::game::collision::{CollisionEngine, Hitbox};
use crate::game::object::{GameObject, ObjectBody, ObjectId, ObjectKind, Syncable};
use crate::game::player::{PlayerId, PlayerRegistry};
use crate::game::WorldBounds;
use crate::net::peer::{InboundSync, PeerTransport};
use crate::net::protocol::SyncError;
use crate::util::time::{SIMULATION_TPS, TICK_DURATION};

/// Thickness of the walls lining the playfield perimeter
const WALL_THICKNESS: f64 = 16.0;

/// Ticks between simulation status log lines
const STATUS_LOG_INTERVAL: u64 = 300;

/// Static collision walls around the playfield. Not synchronized: both
/// peers build identical walls from the shared world size.
pub struct BoundaryObject {
    body: ObjectBody,
    bounds: WorldBounds,
}

impl BoundaryObject {
    pub fn new(bounds: WorldBounds) -> Self {
        Self {
            body: ObjectBody::new(0.0, 0.0, 0.0, f64::INFINITY),
            bounds,
        }
    }
}

impl GameObject for BoundaryObject {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Boundary
    }

    fn body(&self) -> &ObjectBody {
        &self.body
    }

    fn body_mut(&mut self) -> &mut ObjectBody {
        &mut self.body
    }

    fn load(&mut self) {
        let (w, h) = (self.bounds.width, self.bounds.height);
        self.body.hitboxes = vec![
            Hitbox::new(0.0, 0.0, w, WALL_THICKNESS),
            Hitbox::new(0.0, h - WALL_THICKNESS, w, WALL_THICKNESS),
            Hitbox::new(0.0, 0.0, WALL_THICKNESS, h),
            Hitbox::new(w - WALL_THICKNESS, 0.0, WALL_THICKNESS, h),
        ];
    }

    fn update(&mut self, _contacts: &[ObjectKind]) {}

    // The walls own their positions; the body anchor never moves them
    fn sync_hitboxes(&mut self) {}
}

/// The locally simulated world, one per peer
pub struct GameWorld {
    objects: Vec<Box<dyn GameObject>>,
    players: Arc<PlayerRegistry>,
    local_player: PlayerId,
    bounds: WorldBounds,
    rng: ChaCha8Rng,
    /// Ids of removed synchronized objects. Frames still in flight for
    /// these are dropped instead of resurrecting them.
    tombstones: HashSet<ObjectId>,
    tick_count: u64,
    debug_overlay: bool,
    torn_down: bool,
}

impl GameWorld {
    pub fn new(
        bounds: WorldBounds,
        players: Arc<PlayerRegistry>,
        local_player: PlayerId,
        seed: u64,
    ) -> Self {
        let mut world = Self {
            objects: Vec::new(),
            players,
            local_player,
            bounds,
            rng: ChaCha8Rng::seed_from_u64(seed),
            tombstones: HashSet::new(),
            tick_count: 0,
            debug_overlay: false,
            torn_down: false,
        };

        world.insert(Box::new(BoundaryObject::new(bounds)));
        world
    }

    pub fn bounds(&self) -> WorldBounds {
        self.bounds
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Add an object, running its one-time load
    pub fn insert(&mut self, mut object: Box<dyn GameObject>) {
        object.load();
        object.body_mut().debug = self.debug_overlay;
        self.objects.push(object);
    }

    /// Generate a spawn pose inside the walls
    pub fn random_spawn_pose(&mut self) -> (f64, f64, f64) {
        let x = self.rng.gen_range(80.0..self.bounds.width - 80.0 - CAR_SIZE);
        let y = self.rng.gen_range(80.0..self.bounds.height - 80.0 - CAR_SIZE);
        let angle = self.rng.gen_range(0.0..TAU);
        (x, y, angle)
    }

    /// Toggle debug overlays on every object, present and future
    pub fn set_debug_overlay(&mut self, enabled: bool) {
        self.debug_overlay = enabled;
        for object in &mut self.objects {
            object.body_mut().debug = enabled;
        }
    }

    /// Advance one simulation tick
    pub fn tick(&mut self, inbound: Vec<InboundSync>, peer: &dyn PeerTransport) {
        if self.torn_down {
            return;
        }
        self.tick_count += 1;

        for sync in inbound {
            self.apply_sync(sync);
        }

        self.reconcile_authority();
        self.run_collisions_and_update();
        self.reap_removed();
        self.send_outbound(peer);
    }

    /// Stop the simulation: no further sends; anything still queued for
    /// this world is discarded unprocessed
    pub fn teardown(&mut self) {
        self.torn_down = true;
        info!(tick = self.tick_count, "World torn down");
    }

    /// Drive the world at the fixed simulation rate until torn down
    pub async fn run(
        &mut self,
        inbound: &mut mpsc::Receiver<InboundSync>,
        peer: &dyn PeerTransport,
    ) {
        let mut ticker = interval(TICK_DURATION);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(tps = SIMULATION_TPS, "Simulation loop running");

        while !self.torn_down {
            ticker.tick().await;

            let mut frames = Vec::new();
            while let Ok(frame) = inbound.try_recv() {
                frames.push(frame);
            }

            self.tick(frames, peer);

            if self.tick_count % STATUS_LOG_INTERVAL == 0 {
                debug!(
                    tick = self.tick_count,
                    objects = self.objects.len(),
                    players = self.players.len(),
                    remote_ping_ms = ?peer.rtt_ms(),
                    "Simulation status"
                );
            }
        }
    }

    /// Apply one queued inbound snapshot, absorbing bad frames: a rejected
    /// frame leaves its object at the last-known-good state
    fn apply_sync(&mut self, sync: InboundSync) {
        if self.tombstones.contains(&sync.object_id) {
            // Removed object: a stale frame is a no-op, not an error
            return;
        }

        let Some(sender) = self.players.get(&sync.sender) else {
            debug!(sender = %sync.sender, "Sync frame from unknown player");
            return;
        };

        if is_invalid_owner(&sender, sync.owner_id) {
            let error = SyncError::InvalidOwnership {
                sender: sender.id(),
                claimed_owner: sync.owner_id,
            };
            debug!(object_id = %sync.object_id, error = %error, "Discarding sync frame");
            return;
        }

        let sender_is_host = sender.is_host();

        if let Some(object) = self.find_syncable(sync.object_id) {
            if object.body().removed {
                return;
            }

            if object.kind() != sync.kind {
                warn!(object_id = %sync.object_id, "Sync frame kind mismatch");
                return;
            }

            // An owned object only accepts updates originating from its
            // owner, unless the host overrides
            if let Some(current) = object.owner() {
                if current != sync.owner_id && !sender_is_host {
                    debug!(object_id = %sync.object_id, "Discarding sync frame for foreign-owned object");
                    return;
                }
            }

            if let Err(error) = object.deserialize(&sync.payload) {
                warn!(object_id = %sync.object_id, error = %error, "Discarding malformed sync frame");
                return;
            }

            if object.owner() != Some(sync.owner_id) {
                // Host frames may carry an ownership reassignment
                object.set_owner(Some(sync.owner_id));
            }
            return;
        }

        self.spawn_replica(sync);
    }

    /// First frame for an unknown id: snapshots are self-sufficient, so
    /// the replica is created directly from it
    fn spawn_replica(&mut self, sync: InboundSync) {
        if sync.kind != ObjectKind::Car {
            debug!(kind = ?sync.kind, "Ignoring sync frame for non-replicable kind");
            return;
        }

        let mut car = CarObject::replica(sync.object_id, sync.owner_id);
        if let Err(error) = car.deserialize(&sync.payload) {
            warn!(object_id = %sync.object_id, error = %error, "Discarding replica spawn frame");
            return;
        }

        info!(object_id = %sync.object_id, owner_id = %sync.owner_id, "Spawned replica object");
        self.insert(Box::new(car));
    }

    fn reconcile_authority(&mut self) {
        for object in &mut self.objects {
            if let Some(syncable) = object.as_syncable() {
                assign_host_owner_to_shared(&self.players, syncable);
                handle_inactive_object(syncable);
            }
        }
    }

    fn run_collisions_and_update(&mut self) {
        // Hitboxes are resynchronized immediately before the pass, so they
        // are never stale at test time
        for object in &mut self.objects {
            object.sync_hitboxes();
        }

        let collisions = CollisionEngine::compute(&self.objects);

        // Contact kinds are snapshotted first: updates see the frozen
        // pre-update collision state
        let contacts: Vec<Vec<ObjectKind>> = (0..self.objects.len())
            .map(|i| {
                collisions
                    .colliding_with(i)
                    .iter()
                    .map(|&j| self.objects[j].kind())
                    .collect()
            })
            .collect();

        for (object, contacts) in self.objects.iter_mut().zip(&contacts) {
            object.update(contacts);
        }
    }

    fn reap_removed(&mut self) {
        let objects = std::mem::take(&mut self.objects);

        for mut object in objects {
            if object.body().removed {
                if let Some(syncable) = object.as_syncable() {
                    info!(object_id = %syncable.id(), "Object removed");
                    self.tombstones.insert(syncable.id());
                }
            } else {
                self.objects.push(object);
            }
        }
    }

    /// Serialize and send every local-owned object that changed enough to
    /// warrant it. A `must_sync` of false produces zero traffic for that
    /// object this tick.
    fn send_outbound(&mut self, peer: &dyn PeerTransport) {
        let local_player = self.local_player;

        for object in &mut self.objects {
            let Some(syncable) = object.as_syncable() else {
                continue;
            };

            // Only the owner authors updates
            if syncable.owner() != Some(local_player) {
                continue;
            }

            if !syncable.must_sync() {
                continue;
            }

            let payload = syncable.serialize();
            syncable.send_syncable_data(peer, payload);
        }
    }

    fn find_syncable(&mut self, id: ObjectId) -> Option<&mut dyn Syncable> {
        self.objects
            .iter_mut()
            .find_map(|object| object.as_syncable().filter(|s| s.id() == id))
    }
}
