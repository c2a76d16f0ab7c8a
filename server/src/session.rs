use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use followsweeper_common::{
    models::{AvatarRecord, GameParams, Pos},
    protocol::{CellUpdate, ServerMessage},
};
use followsweeper_engine::{EngineError, GameEngine, Outcome, Report, Snapshot};
use rocket::futures::{SinkExt, future::join_all, stream::SplitSink};
use rocket_ws::{Message, stream::DuplexStream};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Live games by id. Each game sits behind its own lock so commands against
/// one game are applied one at a time.
pub type Sessions = Arc<DashMap<String, Arc<Mutex<Session>>>>;

type Sink = SplitSink<DuplexStream, Message>;

pub struct Session {
    engine: GameEngine,
    streams: HashMap<Uuid, Sink>,
    created_at: Instant,
    last_activity: Instant,
    /// Key of the image rendered for the current finished game, if any.
    board_image: Option<String>,
}

async fn send(stream: &mut Sink, message: &ServerMessage) {
    if let Ok(text) = serde_json::to_string(message) {
        let _ = stream.send(Message::Text(text)).await;
    }
}

async fn broadcast(streams: &mut HashMap<Uuid, Sink>, message: &ServerMessage) {
    let futures: Vec<_> = streams
        .iter_mut()
        .map(|(_, stream)| send(stream, message))
        .collect();

    join_all(futures).await;
}

impl Session {
    #[instrument(level = "trace", skip(avatars), fields(pool = avatars.len()))]
    pub fn new(params: GameParams, avatars: Vec<AvatarRecord>) -> Result<Self, EngineError> {
        info!(
            "Creating new game: {}x{} with {} mines",
            params.width, params.height, params.mines
        );
        Ok(Self::from_engine(GameEngine::new(params, avatars)?))
    }

    pub fn from_engine(engine: GameEngine) -> Self {
        let now = Instant::now();
        Self {
            engine,
            streams: HashMap::new(),
            created_at: now,
            last_activity: now,
            board_image: None,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.engine.snapshot()
    }

    pub fn board_image(&self) -> Option<&str> {
        self.board_image.as_deref()
    }

    pub fn set_board_image(&mut self, key: String) {
        self.board_image = Some(key);
    }

    fn init_message(&self) -> ServerMessage {
        let view = self.engine.snapshot().view();
        ServerMessage::Init {
            width: view.width,
            height: view.height,
            mines: view.mines,
            phase: view.phase,
            mines_remaining: view.mines_remaining,
            field: view.field,
        }
    }

    fn update_message(&self, report: &Report) -> ServerMessage {
        let updates = report
            .changed
            .iter()
            .filter_map(|&pos| {
                let value = self.engine.cell_view(pos).ok()?;
                Some(CellUpdate { pos, value })
            })
            .collect();

        ServerMessage::Update {
            updates,
            phase: self.engine.phase(),
            mines_remaining: self.engine.mines_remaining(),
            killed_by: self.engine.detonated_avatar().cloned(),
            avoided: self.engine.avoided_avatars(),
        }
    }

    async fn send_to(&mut self, id: &Uuid, message: &ServerMessage) {
        if let Some(stream) = self.streams.get_mut(id) {
            send(stream, message).await;
        }
    }

    async fn reject(&mut self, from: &Uuid, error: EngineError) {
        warn!("Rejected command from stream {}: {}", from, error);
        self.send_to(
            from,
            &ServerMessage::Error {
                message: error.to_string(),
            },
        )
        .await;
    }

    async fn publish(&mut self, report: &Report) {
        if report.outcome.has_update() {
            let message = self.update_message(report);
            broadcast(&mut self.streams, &message).await;
        }
    }

    #[instrument(level = "trace", skip(self))]
    pub async fn restart(&mut self, from: &Uuid, params: GameParams) -> Result<(), EngineError> {
        info!(
            "Restarting game with new parameters: {}x{} with {} mines",
            params.width, params.height, params.mines
        );
        self.last_activity = Instant::now();

        match GameEngine::new(params, self.engine.avatars().to_vec()) {
            Ok(engine) => {
                self.engine = engine;
                self.board_image = None;
                let message = self.init_message();
                broadcast(&mut self.streams, &message).await;
                info!(
                    "Game restarted and broadcasted to {} connections",
                    self.streams.len()
                );
                Ok(())
            }
            Err(e) => {
                self.reject(from, e).await;
                Err(e)
            }
        }
    }

    #[instrument(level = "trace", skip(self, stream))]
    pub async fn add_stream(&mut self, mut stream: Sink) -> Uuid {
        let id = Uuid::new_v4();
        debug!("Adding stream {} to game", id);
        send(&mut stream, &self.init_message()).await;
        self.streams.insert(id, stream);
        self.last_activity = Instant::now();
        info!(
            "Stream {} added, total connections: {}",
            id,
            self.streams.len()
        );
        id
    }

    #[instrument(level = "trace", skip(self))]
    pub async fn remove_stream(&mut self, id: &Uuid) {
        if self.streams.remove(id).is_some() {
            info!(
                "Stream {} removed, remaining connections: {}",
                id,
                self.streams.len()
            );
        } else {
            warn!("Attempted to remove non-existent stream: {}", id);
        }
        self.last_activity = Instant::now()
    }

    pub fn has_active_connections(&self) -> bool {
        !self.streams.is_empty()
    }

    /// Idle games go after `inactive_timeout`; any game, connected or not,
    /// goes once it is older than `active_timeout`.
    pub fn should_cleanup(&self, inactive_timeout: Duration, active_timeout: Duration) -> bool {
        if self.created_at.elapsed() > active_timeout {
            return true;
        }

        !self.has_active_connections() && self.last_activity.elapsed() > inactive_timeout
    }

    #[instrument(level = "trace", skip(self), fields(row = pos.row, col = pos.col))]
    pub async fn flag(&mut self, from: &Uuid, pos: Pos) -> Result<Report, EngineError> {
        self.last_activity = Instant::now();

        let report = match self.engine.toggle_flag(pos) {
            Ok(report) => report,
            Err(e) => {
                self.reject(from, e).await;
                return Err(e);
            }
        };

        match report.outcome {
            Outcome::Flagged => debug!("Cell {} flagged", pos),
            Outcome::Unflagged => debug!("Cell {} unflagged", pos),
            Outcome::AlreadyOver => debug!("Ignoring flag on finished game at {}", pos),
            _ => debug!("Ignoring flag on revealed cell {}", pos),
        }

        self.publish(&report).await;
        Ok(report)
    }

    #[instrument(level = "trace", skip(self), fields(row = pos.row, col = pos.col))]
    pub async fn reveal(&mut self, from: &Uuid, pos: Pos) -> Result<Report, EngineError> {
        self.last_activity = Instant::now();

        let report = match self.engine.reveal(pos) {
            Ok(report) => report,
            Err(e) => {
                self.reject(from, e).await;
                return Err(e);
            }
        };

        match report.outcome {
            Outcome::Detonated => warn!(
                "Player hit mine at {} - game over! Killed by {:?}",
                pos,
                self.engine.detonated_avatar().map(|avatar| &avatar.username)
            ),
            Outcome::Won => info!("Game won! All safe cells revealed."),
            Outcome::Revealed => debug!("Revealed {} cells, game continues", report.changed.len()),
            Outcome::Started => debug!("Game started from flagged cell {}, nothing revealed", pos),
            Outcome::AlreadyOver => debug!("Ignoring reveal on finished game at {}", pos),
            _ => debug!("Ignoring reveal on revealed or flagged cell {}", pos),
        }

        self.publish(&report).await;
        Ok(report)
    }
}
