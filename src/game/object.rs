//! Object model: bodies, type tags, lifecycle state, and the sync capability
//!
//! Concrete objects compose an `ObjectBody` and layer capabilities on top of
//! it. There is no implicit base-update chain: each object's `update` runs
//! the shared behavior itself, in an explicit order.

use bytes::Bytes;
use std::collections::HashSet;
use uuid::Uuid;

use crate::game::collision::Hitbox;
use crate::game::player::PlayerId;
use crate::net::peer::PeerTransport;
use crate::net::protocol::{Frame, SyncError};

/// Stable object identifier, unique for the lifetime of a match and never
/// reused
pub type ObjectId = Uuid;

/// Object type tag, used for wire dispatch and collision-exclusion matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Player vehicle
    Car,
    /// Static walls lining the playfield
    Boundary,
}

impl ObjectKind {
    pub fn wire_tag(self) -> u8 {
        match self {
            ObjectKind::Car => 0,
            ObjectKind::Boundary => 1,
        }
    }

    pub fn from_wire_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Car),
            1 => Some(Self::Boundary),
            _ => None,
        }
    }

    /// Fixed state payload length for this kind. Receivers size their
    /// buffer from the tag, never from the datagram.
    pub fn payload_len(self) -> usize {
        match self {
            ObjectKind::Car => crate::game::car::CAR_FRAME_LEN,
            ObjectKind::Boundary => 0,
        }
    }
}

/// Sync lifecycle state. `Inactive` is set by game rules and is terminal:
/// the authority pass flags the object for removal and nothing revives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    Active,
    Inactive,
}

/// Physical state shared by every simulated object
#[derive(Debug, Clone)]
pub struct ObjectBody {
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    /// Heading in radians; angle 0 points toward negative x
    pub angle: f64,
    pub mass: f64,
    pub hitboxes: Vec<Hitbox>,
    /// Once set, the container deletes the object; never cleared
    pub removed: bool,
    /// Cosmetic debug-overlay flag, orthogonal to simulation
    pub debug: bool,
    /// Kinds this object never collides with
    pub collision_exclusions: HashSet<ObjectKind>,
}

impl ObjectBody {
    pub fn new(x: f64, y: f64, angle: f64, mass: f64) -> Self {
        Self {
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            angle,
            mass,
            hitboxes: Vec::new(),
            removed: false,
            debug: false,
            collision_exclusions: HashSet::new(),
        }
    }

    /// Move every hitbox to the given position
    pub fn reposition_hitboxes(&mut self, x: f64, y: f64) {
        for hitbox in &mut self.hitboxes {
            hitbox.x = x;
            hitbox.y = y;
        }
    }

    pub fn exclude_collisions_with(&mut self, kind: ObjectKind) {
        self.collision_exclusions.insert(kind);
    }
}

/// Core behavior every simulated object implements
pub trait GameObject: Send {
    fn kind(&self) -> ObjectKind;

    fn body(&self) -> &ObjectBody;

    fn body_mut(&mut self) -> &mut ObjectBody;

    /// One-time setup after construction (hitbox creation)
    fn load(&mut self) {}

    /// Restore the object to its spawn state
    fn reset(&mut self) {}

    /// Advance one simulation tick. `contacts` holds the kinds of the
    /// objects colliding with this one this tick, already filtered by the
    /// exclusion rules.
    fn update(&mut self, contacts: &[ObjectKind]);

    /// Reposition hitboxes to the body position. The world calls this
    /// before every collision pass so hitboxes are never stale at test
    /// time; objects whose hitboxes are fixed in the world override it
    /// with a no-op.
    fn sync_hitboxes(&mut self) {
        let (x, y) = (self.body().x, self.body().y);
        self.body_mut().reposition_hitboxes(x, y);
    }

    /// Sync capability discovery; `None` for purely local objects
    fn as_syncable(&mut self) -> Option<&mut dyn Syncable> {
        None
    }

    /// Read-only view of the sync capability
    fn as_syncable_ref(&self) -> Option<&dyn Syncable> {
        None
    }
}

/// Capability for objects that participate in the multiplayer sync protocol
pub trait Syncable: GameObject {
    fn id(&self) -> ObjectId;

    /// The player authorized to author updates for this object; `None`
    /// means shared/unowned. A borrowed relation: only the id is stored,
    /// resolved through the player registry.
    fn owner(&self) -> Option<PlayerId>;

    fn set_owner(&mut self, owner: Option<PlayerId>);

    fn state(&self) -> ObjectState;

    fn set_state(&mut self, state: ObjectState);

    /// Deterministic, fixed-length snapshot of the current state
    fn serialize(&self) -> Bytes;

    /// Apply a received snapshot. Length and value ranges are validated
    /// before any field is mutated; a rejected payload leaves the object
    /// untouched.
    fn deserialize(&mut self, payload: &[u8]) -> Result<(), SyncError>;

    /// Whether the state changed enough this tick to warrant transmission.
    /// `false` must produce zero network traffic for this object.
    fn must_sync(&self) -> bool;

    /// Route a serialized snapshot onto the unreliable ordered channel.
    /// Unowned objects stay silent: there is no owner id to stamp the
    /// frame with.
    fn send_syncable_data(&self, peer: &dyn PeerTransport, payload: Bytes) {
        let Some(owner_id) = self.owner() else {
            return;
        };

        peer.send_unreliable_ordered(Frame::ObjectSync {
            kind: self.kind(),
            object_id: self.id(),
            owner_id,
            payload,
        });
    }
}
