use std::sync::Arc;

use dashmap::Entry;
use nanoid::nanoid;
use rocket::{
    State,
    futures::StreamExt,
    get,
    http::{ContentType, Status},
    post,
    serde::json::Json,
    uri,
};
use rocket_ws::{Channel, Message, WebSocket};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use followsweeper_common::{
    models::{
        BoardImageResponse, CacheStatusResponse, CreateRequest, CreateResponse, FollowersResponse,
        GameView, ShareMessage,
    },
    protocol::ClientMessage,
};

use crate::{
    followers::AvatarService,
    rate_limit::{ClientIp, RateLimiter},
    render::{ImageStore, Renderer, StoredImage},
    session::{Session, Sessions},
    share::share_message,
};

/// Inserts under a fresh short id, growing the id after repeated collisions.
#[instrument(level = "trace", skip(sessions, session))]
fn add_session(sessions: &Sessions, session: Session) -> String {
    let mut id_length = 5;
    let max_attempts_per_length = 10;

    loop {
        for _ in 0..max_attempts_per_length {
            let id = nanoid!(id_length);
            match sessions.entry(id.clone()) {
                Entry::Occupied(_) => {
                    debug!("Game ID collision, trying another: {}", id);
                }
                Entry::Vacant(entry) => {
                    entry.insert(Arc::new(Mutex::new(session)));
                    info!("Created new game with ID: {}", id);
                    return id;
                }
            }
        }

        warn!(
            "Exhausted ID attempts at length {}, increasing to {}",
            id_length,
            id_length + 1
        );
        id_length += 1;
    }
}

fn find_session(sessions: &Sessions, id: &str) -> Result<Arc<Mutex<Session>>, Status> {
    match sessions.get(id) {
        Some(entry) => Ok(entry.value().clone()),
        None => {
            warn!("Request for non-existent game: {}", id);
            Err(Status::NotFound)
        }
    }
}

#[post("/create", data = "<request>")]
#[instrument(
    level = "trace",
    skip_all,
    fields(client_ip = %client_ip.0, fid = ?request.fid, width = request.params.width, height = request.params.height, mines = request.params.mines)
)]
pub async fn create_game(
    request: Json<CreateRequest>,
    sessions: &State<Sessions>,
    avatars: &State<Arc<AvatarService>>,
    rate_limiter: &State<RateLimiter>,
    client_ip: ClientIp,
) -> Result<Json<CreateResponse>, Status> {
    let CreateRequest { fid, params } = request.into_inner();
    info!(
        "Game creation request from {}: {}x{} with {} mines",
        client_ip.0, params.width, params.height, params.mines
    );

    rate_limiter.check(client_ip.0)?;

    let pool = match fid {
        Some(fid) => avatars.avatars_for(fid).await,
        None => Vec::new(),
    };

    let session = Session::new(params, pool).map_err(|e| {
        warn!("Rejected game parameters from {}: {}", client_ip.0, e);
        Status::BadRequest
    })?;
    let id = add_session(sessions, session);

    info!("Successfully created game {} for client {}", id, client_ip.0);
    Ok(Json(CreateResponse { id }))
}

#[get("/followers?<fid>")]
#[instrument(level = "trace", skip(avatars))]
pub async fn followers(fid: u64, avatars: &State<Arc<AvatarService>>) -> Json<FollowersResponse> {
    let followers = avatars.avatars_for(fid).await;
    Json(FollowersResponse {
        total: followers.len(),
        followers,
    })
}

#[get("/games/<id>")]
#[instrument(level = "trace", skip(sessions))]
pub async fn game_view(id: &str, sessions: &State<Sessions>) -> Result<Json<GameView>, Status> {
    let session = find_session(sessions, id)?;
    let snapshot = session.lock().await.snapshot();
    Ok(Json(snapshot.view()))
}

#[post("/games/<id>/board-image")]
#[instrument(level = "trace", skip(sessions, renderer, images))]
pub async fn create_board_image(
    id: &str,
    sessions: &State<Sessions>,
    renderer: &State<Renderer>,
    images: &State<ImageStore>,
) -> Result<Json<BoardImageResponse>, Status> {
    let session = find_session(sessions, id)?;
    let mut session = session.lock().await;

    if let Some(key) = session.board_image()
        && images.get(&key.to_string()).is_some_and(|image| image.game_id == id)
    {
        debug!("Reusing board image {} for game {}", key, id);
        let key = key.to_string();
        let url = uri!(board_image(key.as_str())).to_string();
        return Ok(Json(BoardImageResponse { key, url }));
    }

    let image = renderer.render(&session.snapshot()).map_err(|e| {
        debug!("Not rendering game {}: {}", id, e);
        Status::Conflict
    })?;

    let key = nanoid!();
    images.insert(
        key.clone(),
        StoredImage {
            content_type: image.content_type.to_string(),
            data: image.data,
            game_id: id.to_string(),
        },
    );
    session.set_board_image(key.clone());
    info!("Stored board image {} for game {}", key, id);

    let url = uri!(board_image(key.as_str())).to_string();
    Ok(Json(BoardImageResponse { key, url }))
}

#[get("/board-image/<key>")]
#[instrument(level = "trace", skip(images))]
pub fn board_image(key: &str, images: &State<ImageStore>) -> Result<(ContentType, Vec<u8>), Status> {
    let image = images.get(&key.to_string()).ok_or(Status::NotFound)?;
    let content_type = ContentType::parse_flexible(&image.content_type).unwrap_or(ContentType::Binary);
    Ok((content_type, image.data))
}

#[get("/games/<id>/share")]
#[instrument(level = "trace", skip(sessions))]
pub async fn share(id: &str, sessions: &State<Sessions>) -> Result<Json<ShareMessage>, Status> {
    let session = find_session(sessions, id)?;
    let snapshot = session.lock().await.snapshot();
    share_message(&snapshot).map(Json).ok_or(Status::Conflict)
}

#[get("/cache-status")]
pub fn cache_status(
    avatars: &State<Arc<AvatarService>>,
    images: &State<ImageStore>,
) -> Json<CacheStatusResponse> {
    Json(CacheStatusResponse {
        followers: avatars.cache().stats(),
        images: images.stats(),
    })
}

#[get("/ws?<id>")]
#[instrument(level = "trace", skip(ws, sessions), fields(game_id = %id))]
pub fn websocket_handler(
    ws: WebSocket,
    sessions: &State<Sessions>,
    id: String,
) -> Result<Channel<'static>, Status> {
    let session = find_session(sessions, &id)?;
    info!("WebSocket connection established for game: {}", id);

    Ok(ws.channel(move |stream| {
        Box::pin(async move {
            let (write, mut read) = stream.split();

            let stream_id = session.lock().await.add_stream(write).await;
            info!("Client connected to game {} (stream: {})", id, stream_id);

            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(message) => {
                            debug!("Received message from game {}: {:?}", id, message);
                            let mut session = session.lock().await;
                            // Rejections are already reported to the sender.
                            let _ = match message {
                                ClientMessage::Reveal { pos } => {
                                    session.reveal(&stream_id, pos).await.map(drop)
                                }
                                ClientMessage::Flag { pos } => {
                                    session.flag(&stream_id, pos).await.map(drop)
                                }
                                ClientMessage::Restart { params } => {
                                    session.restart(&stream_id, params).await
                                }
                            };
                        }
                        Err(e) => {
                            warn!(
                                "Invalid message format in game {}: {} - Error: {}",
                                id, text, e
                            );
                        }
                    },
                    Ok(Message::Close(_)) => {
                        info!(
                            "WebSocket connection closed for game {} (stream: {})",
                            id, stream_id
                        );
                        break;
                    }
                    Ok(Message::Ping(_) | Message::Pong(_)) => {}
                    Err(e) => {
                        error!(
                            "WebSocket error in game {} (stream: {}): {}",
                            id, stream_id, e
                        );
                        break;
                    }
                    Ok(_) => {
                        debug!("Received non-text message in game {}, ignoring", id);
                    }
                }
            }

            session.lock().await.remove_stream(&stream_id).await;
            info!("Client disconnected from game {} (stream: {})", id, stream_id);
            Ok(())
        })
    }))
}
