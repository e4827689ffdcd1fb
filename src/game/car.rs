//! The synchronized vehicle: physics, local controls, and its wire frame

use std::f64::consts::{FRAC_PI_2, TAU};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::game::collision::Hitbox;
use crate::game::object::{GameObject, ObjectBody, ObjectId, ObjectKind, ObjectState, Syncable};
use crate::game::player::PlayerId;
use crate::game::WorldBounds;
use crate::net::protocol::SyncError;

/// Top speed in world units per tick
pub const TOP_SPEED: f64 = 4.0;
/// Speed gained per tick of throttle
pub const ACCELERATION: f64 = 0.4;
/// Steering rate in radians per tick at full speed
pub const HANDLING: f64 = 0.0698132;
/// Speed lost per tick when rolling freely
pub const FRICTION: f64 = 0.2;
/// Car hitbox edge length (square)
pub const CAR_SIZE: f64 = 50.0;

const CAR_MASS: f64 = 500.0;
/// Forward offset from the world center applied to the centered spawn pose
const CENTER_SPAWN_OFFSET: f64 = 220.0;

/// Fixed-point scale for the angle field of the wire frame. Shared by all
/// peers: decode is `scaled / ANGLE_SCALE`, accurate to one scale step.
pub const ANGLE_SCALE: f64 = 1000.0;
/// Fixed-point scale for the speed field of the wire frame
pub const SPEED_SCALE: f64 = 100.0;

/// Serialized car state: u16 x, u16 y, i16 scaled angle, i16 scaled speed,
/// big-endian
pub const CAR_FRAME_LEN: usize = 8;

/// Driving direction selected by the gear stick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gear {
    #[default]
    Forward,
    Reverse,
}

impl Gear {
    pub fn flipped(self) -> Self {
        match self {
            Gear::Forward => Gear::Reverse,
            Gear::Reverse => Gear::Forward,
        }
    }
}

/// Control input for one tick of a locally driven car
#[derive(Debug, Clone, Copy, Default)]
pub struct CarControls {
    /// Accelerate in the direction of the current gear
    pub throttle: bool,
    /// Lateral steering input in -1.0..=1.0
    pub steer: f64,
}

/// Capability for objects driven by local input. Network replicas never
/// receive control input; their state arrives through `deserialize`.
pub trait Controllable {
    fn set_controls(&mut self, controls: CarControls);

    fn gear(&self) -> Gear;

    fn switch_gear(&mut self);
}

/// Local-control state, present only on the car this peer drives
#[derive(Debug, Clone)]
struct LocalDrive {
    gear: Gear,
    controls: CarControls,
    bounds: WorldBounds,
}

/// A vehicle participating in the sync protocol
pub struct CarObject {
    body: ObjectBody,
    id: ObjectId,
    owner: Option<PlayerId>,
    state: ObjectState,
    /// Signed scalar speed along the heading, bounded by `TOP_SPEED`
    speed: f64,
    drive: Option<LocalDrive>,
    /// Pose restored by `reset`
    spawn: (f64, f64, f64),
}

impl CarObject {
    /// Car driven by local input on this peer
    pub fn driven(x: f64, y: f64, angle: f64, owner: PlayerId, bounds: WorldBounds) -> Self {
        Self::build(
            Uuid::new_v4(),
            Some(owner),
            x,
            y,
            angle,
            Some(LocalDrive {
                gear: Gear::Forward,
                controls: CarControls::default(),
                bounds,
            }),
        )
    }

    /// Network replica of a remote player's car
    pub fn replica(id: ObjectId, owner: PlayerId) -> Self {
        Self::build(id, Some(owner), 0.0, 0.0, 0.0, None)
    }

    fn build(
        id: ObjectId,
        owner: Option<PlayerId>,
        x: f64,
        y: f64,
        angle: f64,
        drive: Option<LocalDrive>,
    ) -> Self {
        let mut body = ObjectBody::new(x, y, angle, CAR_MASS);
        // Car-on-car contacts would double-count the bounce on both peers
        body.exclude_collisions_with(ObjectKind::Car);

        Self {
            body,
            id,
            owner,
            state: ObjectState::Active,
            speed: 0.0,
            drive,
            spawn: (x, y, angle),
        }
    }

    /// Spawn pose at the world center, shifted forward by the fixed offset
    pub fn centered_spawn(bounds: &WorldBounds) -> (f64, f64, f64) {
        let (cx, cy) = bounds.center();
        (
            cx - CAR_SIZE / 2.0,
            cy - CAR_SIZE / 2.0 + CENTER_SPAWN_OFFSET,
            FRAC_PI_2,
        )
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Skipped entirely while colliding, otherwise decay toward zero and
    /// clamp to exactly zero rather than overshooting the sign
    fn apply_friction(&mut self, colliding: bool) {
        if colliding {
            // A car wedged against an obstacle must not bleed speed away
            return;
        }

        if self.speed == 0.0 {
            return;
        }

        if self.speed.abs() <= FRICTION {
            self.speed = 0.0;
        } else {
            self.speed -= self.speed.signum() * FRICTION;
        }
    }

    fn integrate(&mut self, colliding: bool) {
        if colliding {
            self.speed = -self.speed;
        }

        self.body.vx = self.body.angle.cos() * self.speed;
        self.body.vy = self.body.angle.sin() * self.speed;

        // Angle 0 points toward negative x, matching the rotation
        // convention of the rendering layer
        self.body.x -= self.body.vx;
        self.body.y -= self.body.vy;
    }

    fn handle_controls(&mut self) {
        let Some(drive) = &self.drive else {
            return;
        };

        if drive.controls.throttle {
            match drive.gear {
                // Clamp at top speed so the encoded value stays in range
                Gear::Forward => self.speed = (self.speed + ACCELERATION).min(TOP_SPEED),
                Gear::Reverse => self.speed = (self.speed - ACCELERATION).max(-TOP_SPEED),
            }
        }

        // Steering authority scales with the speed fraction: a stationary
        // car cannot pivot
        self.body.angle += HANDLING * (self.speed / TOP_SPEED) * drive.controls.steer;
        self.body.angle = self.body.angle.rem_euclid(TAU);
    }

    fn clamp_to_bounds(&mut self) {
        let Some(drive) = &self.drive else {
            return;
        };
        let bounds = drive.bounds;

        // Snap escapes back inside, clear of the wall hitboxes
        if self.body.x > bounds.width - 60.0 {
            self.body.x = bounds.width - 80.0;
        } else if self.body.x < 10.0 {
            self.body.x = 80.0;
        }

        if self.body.y > bounds.height - 60.0 {
            self.body.y = bounds.height - 80.0;
        } else if self.body.y < 10.0 {
            self.body.y = 80.0;
        }
    }
}

impl GameObject for CarObject {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Car
    }

    fn body(&self) -> &ObjectBody {
        &self.body
    }

    fn body_mut(&mut self) -> &mut ObjectBody {
        &mut self.body
    }

    fn load(&mut self) {
        self.body.hitboxes = vec![Hitbox::new(self.body.x, self.body.y, CAR_SIZE, CAR_SIZE)];
    }

    fn reset(&mut self) {
        let (x, y, angle) = self.spawn;
        self.body.x = x;
        self.body.y = y;
        self.body.angle = angle;
        self.body.vx = 0.0;
        self.body.vy = 0.0;
        self.speed = 0.0;

        if let Some(drive) = &mut self.drive {
            drive.gear = Gear::Forward;
            drive.controls = CarControls::default();
        }

        self.sync_hitboxes();
    }

    fn update(&mut self, contacts: &[ObjectKind]) {
        let colliding = !contacts.is_empty();

        if self.drive.is_some() {
            if contacts.contains(&ObjectKind::Boundary) {
                self.switch_gear();
            }

            self.handle_controls();
            self.clamp_to_bounds();
        }

        self.apply_friction(colliding);
        self.integrate(colliding);
        self.sync_hitboxes();
    }

    fn as_syncable(&mut self) -> Option<&mut dyn Syncable> {
        Some(self)
    }

    fn as_syncable_ref(&self) -> Option<&dyn Syncable> {
        Some(self)
    }
}

impl Syncable for CarObject {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn owner(&self) -> Option<PlayerId> {
        self.owner
    }

    fn set_owner(&mut self, owner: Option<PlayerId>) {
        self.owner = owner;
    }

    fn state(&self) -> ObjectState {
        self.state
    }

    fn set_state(&mut self, state: ObjectState) {
        self.state = state;
    }

    fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(CAR_FRAME_LEN);
        buf.put_u16(self.body.x.round().clamp(0.0, u16::MAX as f64) as u16);
        buf.put_u16(self.body.y.round().clamp(0.0, u16::MAX as f64) as u16);
        buf.put_i16((self.body.angle * ANGLE_SCALE).round() as i16);
        buf.put_i16((self.speed * SPEED_SCALE).round() as i16);
        buf.freeze()
    }

    fn deserialize(&mut self, payload: &[u8]) -> Result<(), SyncError> {
        if payload.len() != CAR_FRAME_LEN {
            return Err(SyncError::MalformedPayload(format!(
                "car frame is {} bytes, expected {}",
                payload.len(),
                CAR_FRAME_LEN
            )));
        }

        let mut buf = payload;
        let x = buf.get_u16() as f64;
        let y = buf.get_u16() as f64;
        let angle_scaled = buf.get_i16();
        let speed_scaled = buf.get_i16();

        let max_angle = (TAU * ANGLE_SCALE) as i16;
        if !(0..=max_angle).contains(&angle_scaled) {
            return Err(SyncError::MalformedPayload(format!(
                "angle {angle_scaled} out of range"
            )));
        }

        let max_speed = (TOP_SPEED * SPEED_SCALE) as i16;
        if !(-max_speed..=max_speed).contains(&speed_scaled) {
            return Err(SyncError::MalformedPayload(format!(
                "speed {speed_scaled} out of range"
            )));
        }

        self.body.x = x;
        self.body.y = y;
        self.body.angle = angle_scaled as f64 / ANGLE_SCALE;
        self.speed = speed_scaled as f64 / SPEED_SCALE;
        self.sync_hitboxes();
        Ok(())
    }

    fn must_sync(&self) -> bool {
        self.speed != 0.0
    }
}

impl Controllable for CarObject {
    fn set_controls(&mut self, controls: CarControls) {
        if let Some(drive) = &mut self.drive {
            drive.controls = controls;
        }
    }

    fn gear(&self) -> Gear {
        self.drive.as_ref().map(|d| d.gear).unwrap_or_default()
    }

    fn switch_gear(&mut self) {
        if let Some(drive) = &mut self.drive {
            drive.gear = drive.gear.flipped();
        }
    }
}
