use std::{collections::HashMap, sync::Arc};

use followsweeper_common::{
    models::{AvatarRecord, Cell, CreateRequest, GameParams, Phase, Pos},
    protocol::{ClientMessage, ServerMessage},
};
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{FollowsweeperClient, FollowsweeperWebSocket, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// A fresh board arrived, on connect or after a restart.
    GameInitialized {
        width: usize,
        height: usize,
        mines: usize,
    },
    BoardUpdated {
        changed_positions: Vec<Pos>,
    },
    PhaseChanged {
        phase: Phase,
    },
    /// The game was lost; carries the avatar under the mine, if any.
    Killed {
        by: Option<AvatarRecord>,
    },
    /// The game was won; carries every avatar that was under a mine.
    Won {
        avoided: Vec<AvatarRecord>,
    },
    /// The server rejected one of our commands.
    Rejected {
        message: String,
    },
    ConnectionLost,
}

/// Local mirror of a game, kept in sync from server messages.
#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    pub width: usize,
    pub height: usize,
    pub mines: usize,
    pub phase: Phase,
    pub mines_remaining: i64,
    pub board: Vec<Vec<Cell>>,
    pub killed_by: Option<AvatarRecord>,
    pub avoided: Option<Vec<AvatarRecord>>,
}

impl GameState {
    pub fn new(
        width: usize,
        height: usize,
        mines: usize,
        phase: Phase,
        mines_remaining: i64,
        board: Vec<Vec<Cell>>,
    ) -> Self {
        Self {
            width,
            height,
            mines,
            phase,
            mines_remaining,
            board,
            killed_by: None,
            avoided: None,
        }
    }

    pub fn get_cell(&self, pos: Pos) -> Option<&Cell> {
        let row = usize::try_from(pos.row).ok()?;
        let col = usize::try_from(pos.col).ok()?;
        self.board.get(row)?.get(col)
    }

    pub fn set_cell(&mut self, pos: Pos, cell: Cell) {
        if let (Ok(row), Ok(col)) = (usize::try_from(pos.row), usize::try_from(pos.col))
            && let Some(slot) = self.board.get_mut(row).and_then(|cells| cells.get_mut(col))
        {
            *slot = cell;
        }
    }

    pub fn count_cells(&self) -> HashMap<&'static str, usize> {
        let mut counts = HashMap::new();
        for cell in self.board.iter().flatten() {
            let state = match cell {
                Cell::Hidden => "hidden",
                Cell::Flagged => "flagged",
                Cell::Revealed { .. } => "revealed",
                Cell::Mine { .. } => "mine",
            };
            *counts.entry(state).or_insert(0) += 1;
        }
        counts
    }

    pub fn is_game_over(&self) -> bool {
        self.phase.is_finished()
    }

    pub fn is_won(&self) -> bool {
        self.phase == Phase::Won
    }
}

/// Applies one server message to the mirror and returns the events it
/// produced, in order.
pub async fn apply_message(
    state: &RwLock<Option<GameState>>,
    message: ServerMessage,
) -> Vec<GameEvent> {
    match message {
        ServerMessage::Init {
            width,
            height,
            mines,
            phase,
            mines_remaining,
            field,
        } => {
            info!(
                "Received game initialization: {}x{} with {} mines",
                width, height, mines
            );
            *state.write().await = Some(GameState::new(
                width,
                height,
                mines,
                phase,
                mines_remaining,
                field,
            ));
            vec![GameEvent::GameInitialized {
                width,
                height,
                mines,
            }]
        }
        ServerMessage::Update {
            updates,
            phase,
            mines_remaining,
            killed_by,
            avoided,
        } => {
            debug!(
                "Received update: {} cells updated, phase: {:?}",
                updates.len(),
                phase
            );

            let mut guard = state.write().await;
            let Some(game) = guard.as_mut() else {
                warn!("Update received before the game was initialized");
                return Vec::new();
            };

            let changed_positions: Vec<Pos> = updates.iter().map(|u| u.pos).collect();
            for update in updates {
                game.set_cell(update.pos, update.value);
            }
            let old_phase = game.phase;
            game.phase = phase;
            game.mines_remaining = mines_remaining;
            game.killed_by = killed_by.clone();
            game.avoided = avoided.clone();

            let mut events = Vec::new();
            if !changed_positions.is_empty() {
                events.push(GameEvent::BoardUpdated { changed_positions });
            }
            if phase != old_phase {
                events.push(GameEvent::PhaseChanged { phase });
                match phase {
                    Phase::Lost => events.push(GameEvent::Killed { by: killed_by }),
                    Phase::Won => events.push(GameEvent::Won {
                        avoided: avoided.unwrap_or_default(),
                    }),
                    Phase::AwaitingFirstMove | Phase::InProgress => {}
                }
            }
            events
        }
        ServerMessage::Error { message } => {
            warn!("Server rejected command: {}", message);
            vec![GameEvent::Rejected { message }]
        }
    }
}

struct ConnectionState {
    websocket_sender: mpsc::UnboundedSender<ClientMessage>,
    game_id: String,
    background_task: JoinHandle<()>,
}

impl ConnectionState {
    fn send_message(&self, message: ClientMessage) -> Result<()> {
        self.websocket_sender
            .send(message)
            .map_err(|_| "WebSocket sender closed")?;
        Ok(())
    }

    async fn abort_and_wait_background_task(self) {
        self.background_task.abort();
        let _ = self.background_task.await;
    }
}

type EventSender = Arc<RwLock<Option<mpsc::UnboundedSender<GameEvent>>>>;

/// High-level game handle: creates or joins a game, keeps a local mirror and
/// reports what happens as [`GameEvent`]s.
pub struct FollowsweeperGame {
    client: FollowsweeperClient,
    connection_state: Arc<RwLock<Option<ConnectionState>>>,
    event_sender: EventSender,
    state: Arc<RwLock<Option<GameState>>>,
}

impl FollowsweeperGame {
    pub fn new(server_url: &str) -> Result<Self> {
        let client = FollowsweeperClient::new(server_url)?;
        Ok(Self {
            client,
            connection_state: Arc::new(RwLock::new(None)),
            event_sender: Arc::new(RwLock::new(None)),
            state: Arc::new(RwLock::new(None)),
        })
    }

    pub fn client(&self) -> &FollowsweeperClient {
        &self.client
    }

    /// Replaces any earlier subscriber.
    pub async fn subscribe_to_events(&self) -> mpsc::UnboundedReceiver<GameEvent> {
        let (sender, receiver) = mpsc::unbounded_channel();
        *self.event_sender.write().await = Some(sender);
        receiver
    }

    /// Creates a game whose mines hide the followers of `fid` and joins it.
    pub async fn start_game(&self, fid: Option<u64>, params: GameParams) -> Result<()> {
        info!(
            "Starting new game: {}x{} with {} mines",
            params.width, params.height, params.mines
        );

        let game_id = self.client.create_game(&CreateRequest { fid, params }).await?;
        info!("Created game with ID: {}", game_id);

        self.join_game(game_id).await
    }

    pub async fn join_game(&self, game_id: String) -> Result<()> {
        info!("Joining game with ID: {}", game_id);

        let mut conn_state = self.connection_state.write().await;
        if let Some(existing) = conn_state.take() {
            existing.abort_and_wait_background_task().await;
        }
        self.state.write().await.take();

        let ws_url = self.client.websocket_url(&game_id)?;
        let websocket = FollowsweeperWebSocket::connect(&ws_url).await?;
        let websocket_sender = websocket.sender();

        let background_task = self.start_background_listener(websocket);
        *conn_state = Some(ConnectionState {
            websocket_sender,
            game_id,
            background_task,
        });

        Ok(())
    }

    async fn send_client_message(&self, message: ClientMessage) -> Result<()> {
        match self.connection_state.read().await.as_ref() {
            Some(conn) => conn.send_message(message),
            None => Err("Not connected to a game. Call start_game() first.".into()),
        }
    }

    pub async fn reveal(&self, pos: Pos) -> Result<()> {
        debug!("Revealing cell at {}", pos);
        self.send_client_message(ClientMessage::Reveal { pos }).await
    }

    pub async fn flag(&self, pos: Pos) -> Result<()> {
        debug!("Toggling flag at {}", pos);
        self.send_client_message(ClientMessage::Flag { pos }).await
    }

    pub async fn restart(&self, params: GameParams) -> Result<()> {
        info!(
            "Restarting game with new parameters: {}x{} with {} mines",
            params.width, params.height, params.mines
        );
        self.send_client_message(ClientMessage::Restart { params })
            .await
    }

    pub async fn get_state(&self) -> Option<GameState> {
        self.state.read().await.clone()
    }

    pub async fn get_game_id(&self) -> Option<String> {
        let conn_state = self.connection_state.read().await;
        conn_state.as_ref().map(|conn| conn.game_id.clone())
    }

    pub async fn is_connected(&self) -> bool {
        self.connection_state.read().await.is_some()
    }

    pub async fn disconnect(&self) -> Result<()> {
        if let Some(conn) = self.connection_state.write().await.take() {
            conn.abort_and_wait_background_task().await;
        }
        *self.event_sender.write().await = None;
        *self.state.write().await = None;

        info!("Disconnected from game");
        Ok(())
    }

    fn start_background_listener(&self, mut websocket: FollowsweeperWebSocket) -> JoinHandle<()> {
        let state = self.state.clone();
        let event_sender = self.event_sender.clone();

        tokio::spawn(async move {
            loop {
                let message = match websocket.next_message().await {
                    Ok(Some(message)) => message,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Error receiving WebSocket message: {}", e);
                        break;
                    }
                };

                let events = apply_message(&state, message).await;
                if let Some(sender) = event_sender.read().await.as_ref() {
                    for event in events {
                        let _ = sender.send(event);
                    }
                }
            }

            if let Some(sender) = event_sender.read().await.as_ref() {
                let _ = sender.send(GameEvent::ConnectionLost);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use followsweeper_common::protocol::CellUpdate;

    use super::*;

    fn init() -> ServerMessage {
        ServerMessage::Init {
            width: 2,
            height: 2,
            mines: 1,
            phase: Phase::AwaitingFirstMove,
            mines_remaining: 1,
            field: vec![vec![Cell::Hidden; 2]; 2],
        }
    }

    fn update(updates: Vec<CellUpdate>, phase: Phase) -> ServerMessage {
        ServerMessage::Update {
            updates,
            phase,
            mines_remaining: 1,
            killed_by: None,
            avoided: None,
        }
    }

    #[test]
    fn init_replaces_the_mirror() {
        let state = RwLock::new(None);

        let events = tokio_test::block_on(apply_message(&state, init()));

        assert_eq!(
            events,
            vec![GameEvent::GameInitialized {
                width: 2,
                height: 2,
                mines: 1
            }]
        );
        let state = tokio_test::block_on(state.read()).clone().unwrap();
        assert_eq!(state.count_cells().get("hidden"), Some(&4));
        assert!(!state.is_game_over());
    }

    #[test]
    fn update_patches_cells_and_reports_the_loss() {
        let state = RwLock::new(None);
        tokio_test::block_on(apply_message(&state, init()));
        let mine = Pos::new(1, 1);
        let killer = AvatarRecord::placeholder(3);

        let events = tokio_test::block_on(apply_message(
            &state,
            ServerMessage::Update {
                updates: vec![CellUpdate {
                    pos: mine,
                    value: Cell::Mine {
                        avatar: Some(killer.clone()),
                    },
                }],
                phase: Phase::Lost,
                mines_remaining: 1,
                killed_by: Some(killer.clone()),
                avoided: None,
            },
        ));

        assert_eq!(
            events,
            vec![
                GameEvent::BoardUpdated {
                    changed_positions: vec![mine]
                },
                GameEvent::PhaseChanged { phase: Phase::Lost },
                GameEvent::Killed {
                    by: Some(killer.clone())
                },
            ]
        );
        let state = tokio_test::block_on(state.read()).clone().unwrap();
        assert!(state.is_game_over());
        assert!(!state.is_won());
        assert_eq!(state.killed_by, Some(killer));
        assert!(matches!(state.get_cell(mine), Some(Cell::Mine { .. })));
    }

    #[test]
    fn updates_before_init_and_bad_positions_are_ignored() {
        let state = RwLock::new(None);
        let cell = CellUpdate {
            pos: Pos::new(-1, 5),
            value: Cell::Flagged,
        };

        let events = tokio_test::block_on(apply_message(&state, update(vec![], Phase::InProgress)));
        assert!(events.is_empty());

        tokio_test::block_on(apply_message(&state, init()));
        tokio_test::block_on(apply_message(&state, update(vec![cell], Phase::InProgress)));
        let state = tokio_test::block_on(state.read()).clone().unwrap();
        assert_eq!(state.count_cells().get("flagged"), None);
        assert_eq!(state.phase, Phase::InProgress);
    }

    #[test]
    fn server_errors_surface_as_rejections() {
        let state = RwLock::new(None);

        let events = tokio_test::block_on(apply_message(
            &state,
            ServerMessage::Error {
                message: "cell (9, 9) is outside the board".to_string(),
            },
        ));

        assert!(matches!(&events[..], [GameEvent::Rejected { .. }]));
    }
}
