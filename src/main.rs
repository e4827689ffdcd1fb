//! Car Game Peer - peer-to-peer multiplayer game client core
//!
//! This is the headless entry point for one peer of a match. It wires:
//! - Configuration and logging
//! - The UDP peer transport (ordered-unreliable channel, handshake, ping)
//! - The fixed-rate world simulation and object synchronization
//!
//! Rendering, audio, and input capture live in the embedding client. This
//! binary drives the synchronization core with a scripted throttle so two
//! peers can be soak-tested end to end.

mod config;
mod game;
mod net;
mod util;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::config::Config;
use crate::game::car::{CarControls, CarObject, Controllable};
use crate::game::player::{GamePlayer, PlayerRegistry};
use crate::game::world::GameWorld;
use crate::game::WorldBounds;
use crate::net::peer::UdpPeer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    info!("Starting car game peer");
    info!(
        bind = %config.bind_addr,
        peer = %config.peer_addr,
        host = config.host,
        "Peer configuration"
    );

    // Local player identity
    let players = Arc::new(PlayerRegistry::new());
    let local = GamePlayer::new(Uuid::new_v4(), config.player_name.clone(), config.host);
    players.insert(local.clone());
    info!(player_id = %local.id(), name = %local.name(), "Local player created");

    // Connect the transport; the handshake and latency probes run in the
    // background from here on
    let (peer, mut inbound) = UdpPeer::connect(
        config.bind_addr,
        config.peer_addr,
        local.clone(),
        players.clone(),
    )
    .await?;

    // Build the world and the locally driven car
    let bounds = WorldBounds::new(config.world_width, config.world_height);
    let mut world = GameWorld::new(bounds, players, local.id(), config.match_seed);
    world.set_debug_overlay(config.debug_overlay);

    let (x, y, angle) = if config.host {
        CarObject::centered_spawn(&bounds)
    } else {
        world.random_spawn_pose()
    };
    let mut car = CarObject::driven(x, y, angle, local.id(), bounds);
    car.set_controls(CarControls {
        throttle: true,
        steer: 0.0,
    });
    world.insert(Box::new(car));

    tokio::select! {
        _ = world.run(&mut inbound, &peer) => {}
        _ = shutdown_signal() => {
            info!("Shutting down");
        }
    }

    // Stop sync sends and discard whatever is still queued
    world.teardown();
    drop(peer);

    info!("Peer shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
