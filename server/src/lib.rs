//! Followsweeper game server.
//!
//! Hosts live games over WebSockets, hides the player's followers under the
//! mines and renders finished boards for sharing.

use std::sync::Arc;

use dashmap::DashMap;
use rocket::{Build, Rocket, routes};
use tracing::info;

pub mod cache;
pub mod cleanup;
pub mod config;
pub mod cors;
pub mod followers;
pub mod rate_limit;
pub mod render;
pub mod routes;
pub mod session;
pub mod share;

use crate::{
    cache::TtlCache,
    cleanup::CleanupFairing,
    config::AppConfig,
    cors::create_cors,
    followers::{AvatarService, FollowerSource},
    rate_limit::RateLimiter,
    render::{ImageStore, Renderer, SvgBoardRenderer},
    session::Sessions,
};

/// Assembles the server around `source`, the place follower avatars come
/// from.
pub fn build_rocket(
    config: AppConfig,
    source: Arc<dyn FollowerSource>,
) -> Result<Rocket<Build>, rocket_cors::Error> {
    let sessions: Sessions = Arc::new(DashMap::new());
    let rate_limiter = RateLimiter::new(config.games_per_minute);
    let avatars = Arc::new(AvatarService::new(
        source,
        Arc::new(TtlCache::new(config.follower_cache_ttl)),
        config.follower_limit,
    ));
    let images: ImageStore = Arc::new(TtlCache::new(config.image_cache_ttl));
    let renderer: Renderer = Box::new(SvgBoardRenderer::default());

    info!("📊 Initialized game storage, caches and rate limiter");

    let rocket = rocket::build()
        .attach(create_cors(&config.cors_allowed_origins)?)
        .attach(CleanupFairing)
        .manage(sessions)
        .manage(rate_limiter)
        .manage(avatars)
        .manage(images)
        .manage(renderer)
        .manage(config)
        .mount(
            "/",
            routes![
                routes::create_game,
                routes::websocket_handler,
                routes::followers,
                routes::game_view,
                routes::create_board_image,
                routes::board_image,
                routes::share,
                routes::cache_status,
            ],
        );

    info!("🌐 Server configured with CORS, cleanup task, and routes");
    Ok(rocket)
}
