use std::{error::Error, sync::Arc};

use followsweeper_server::{build_rocket, config::AppConfig, followers::NeynarFollowerSource};
use tracing::{info, warn};

#[rocket::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();
    info!("🚀 Starting Followsweeper server");

    let config = AppConfig::from_env();
    if config.neynar_api_key.is_none() {
        warn!("NEYNAR_API_KEY is not set, every game will use the default avatars");
    }

    let source = Arc::new(NeynarFollowerSource::new(&config)?);
    let rocket = build_rocket(config, source)?;

    info!(
        "📡 Endpoints: POST /create, GET /ws, GET /followers, GET /games/<id>, \
         POST /games/<id>/board-image, GET /board-image/<key>, GET /games/<id>/share, \
         GET /cache-status"
    );
    let _ = rocket.launch().await?;
    Ok(())
}
