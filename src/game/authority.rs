//! Cross-cutting ownership and lifecycle-state rules
//!
//! There is no distributed lock or negotiation between peers: conflicts over
//! shared objects are resolved entirely by these rules. The host has
//! unconditional override authority; everyone else may only author updates
//! for objects they own.

use tracing::debug;

use crate::game::object::{GameObject, ObjectState, Syncable};
use crate::game::player::{GamePlayer, PlayerId, PlayerRegistry};

/// Whether an inbound update claiming authorship for `claimed_owner` must
/// be rejected, given the player behind the sending peer. The host is
/// always legitimate; a non-host is legitimate only for itself.
pub fn is_invalid_owner(sender: &GamePlayer, claimed_owner: PlayerId) -> bool {
    if sender.is_host() {
        return false;
    }

    sender.id() != claimed_owner
}

/// Hand an unowned shared object to the current host, so there is always a
/// tie-breaking authority for contested objects. Idempotent: an object that
/// already has an owner is left alone.
pub fn assign_host_owner_to_shared(players: &PlayerRegistry, object: &mut dyn Syncable) {
    if object.owner().is_some() {
        return;
    }

    if let Some(host) = players.host() {
        debug!(object_id = %object.id(), host_id = %host.id(), "Assigning unowned object to host");
        object.set_owner(Some(host.id()));
    }
}

/// Terminal step of the lifecycle state machine: an `Inactive` object is
/// flagged for removal. `Active -> Inactive -> Removed`, with no path back.
pub fn handle_inactive_object(object: &mut dyn Syncable) {
    if object.state() == ObjectState::Inactive {
        object.body_mut().removed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::car::CarObject;
    use uuid::Uuid;

    fn unowned_car() -> CarObject {
        let mut car = CarObject::replica(Uuid::new_v4(), Uuid::new_v4());
        car.set_owner(None);
        car
    }

    #[test]
    fn host_is_never_an_invalid_owner() {
        let host = GamePlayer::new(Uuid::new_v4(), "host", true);
        assert!(!is_invalid_owner(&host, Uuid::new_v4()));
        assert!(!is_invalid_owner(&host, host.id()));
    }

    #[test]
    fn non_host_may_only_claim_itself() {
        let player = GamePlayer::new(Uuid::new_v4(), "guest", false);
        assert!(!is_invalid_owner(&player, player.id()));
        assert!(is_invalid_owner(&player, Uuid::new_v4()));
    }

    #[test]
    fn unowned_object_goes_to_the_host() {
        let registry = PlayerRegistry::new();
        let host = GamePlayer::new(Uuid::new_v4(), "host", true);
        registry.insert(host.clone());

        let mut car = unowned_car();
        assign_host_owner_to_shared(&registry, &mut car);
        assert_eq!(car.owner(), Some(host.id()));
    }

    #[test]
    fn host_assignment_is_idempotent() {
        let registry = PlayerRegistry::new();
        let host = GamePlayer::new(Uuid::new_v4(), "host", true);
        registry.insert(host);

        let owner = Uuid::new_v4();
        let mut car = CarObject::replica(Uuid::new_v4(), owner);

        // Already owned by a non-host player; calling twice must not steal it
        assign_host_owner_to_shared(&registry, &mut car);
        assign_host_owner_to_shared(&registry, &mut car);
        assert_eq!(car.owner(), Some(owner));
    }

    #[test]
    fn no_host_means_the_object_stays_unowned() {
        let registry = PlayerRegistry::new();
        let mut car = unowned_car();
        assign_host_owner_to_shared(&registry, &mut car);
        assert_eq!(car.owner(), None);
    }

    #[test]
    fn inactive_object_is_flagged_for_removal() {
        let mut car = CarObject::replica(Uuid::new_v4(), Uuid::new_v4());
        car.set_state(ObjectState::Inactive);

        handle_inactive_object(&mut car);
        assert!(car.body().removed);
    }

    #[test]
    fn active_object_is_untouched() {
        let mut car = CarObject::replica(Uuid::new_v4(), Uuid::new_v4());
        handle_inactive_object(&mut car);
        assert!(!car.body().removed);
    }
}
