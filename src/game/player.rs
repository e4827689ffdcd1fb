//! Players and the shared player registry

use dashmap::DashMap;
use uuid::Uuid;

pub type PlayerId = Uuid;

/// A participant in the match. Objects reference players by id only and
/// resolve them through the registry; nothing owns a player besides it.
#[derive(Debug, Clone)]
pub struct GamePlayer {
    id: PlayerId,
    name: String,
    host: bool,
    ping_ms: Option<u32>,
}

impl GamePlayer {
    pub fn new(id: PlayerId, name: impl Into<String>, host: bool) -> Self {
        Self {
            id,
            name: name.into(),
            host,
            ping_ms: None,
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this player has override authority over every object and
    /// tie-breaking authority over shared ones
    pub fn is_host(&self) -> bool {
        self.host
    }

    /// Last measured round-trip latency in milliseconds; advisory only,
    /// never used for protocol correctness
    pub fn ping_ms(&self) -> Option<u32> {
        self.ping_ms
    }
}

/// Registry of every player known to this peer. Shared between the
/// transport receive task and the simulation.
#[derive(Default)]
pub struct PlayerRegistry {
    players: DashMap<PlayerId, GamePlayer>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self {
            players: DashMap::new(),
        }
    }

    pub fn insert(&self, player: GamePlayer) {
        self.players.insert(player.id(), player);
    }

    pub fn get(&self, id: &PlayerId) -> Option<GamePlayer> {
        self.players.get(id).map(|p| p.value().clone())
    }

    /// The match host, if one is known yet
    pub fn host(&self) -> Option<GamePlayer> {
        self.players
            .iter()
            .find(|p| p.value().is_host())
            .map(|p| p.value().clone())
    }

    pub fn set_ping(&self, id: &PlayerId, ping_ms: u32) {
        if let Some(mut player) = self.players.get_mut(id) {
            player.value_mut().ping_ms = Some(ping_ms);
        }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_lookup_finds_the_hosting_player() {
        let registry = PlayerRegistry::new();
        let guest = GamePlayer::new(Uuid::new_v4(), "guest", false);
        let host = GamePlayer::new(Uuid::new_v4(), "host", true);
        registry.insert(guest);
        registry.insert(host.clone());

        assert_eq!(registry.host().map(|p| p.id()), Some(host.id()));
    }

    #[test]
    fn ping_updates_are_visible_through_lookup() {
        let registry = PlayerRegistry::new();
        let player = GamePlayer::new(Uuid::new_v4(), "p", false);
        let id = player.id();
        registry.insert(player);

        assert_eq!(registry.get(&id).and_then(|p| p.ping_ms()), None);
        registry.set_ping(&id, 42);
        assert_eq!(registry.get(&id).and_then(|p| p.ping_ms()), Some(42));
    }
}
