use followsweeper_common::{
    models::{GameParams, Pos},
    protocol::{ClientMessage, ServerMessage},
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, trace, warn};

use crate::Result;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What one incoming frame means for the game.
#[derive(Debug)]
enum Frame {
    Message(ServerMessage),
    Closed,
    Ignored,
}

fn decode(frame: Message) -> Result<Frame> {
    match frame {
        Message::Text(text) => {
            debug!("Received message: {}", text);
            Ok(Frame::Message(serde_json::from_str(&text)?))
        }
        Message::Close(reason) => {
            info!("Server closed the game connection: {:?}", reason);
            Ok(Frame::Closed)
        }
        other => {
            trace!("Skipping non-text frame: {:?}", other);
            Ok(Frame::Ignored)
        }
    }
}

/// Serializes queued commands onto the socket until every sender is gone or
/// the socket fails, then closes it.
async fn write_commands(
    mut sink: SplitSink<Socket, Message>,
    mut commands: mpsc::UnboundedReceiver<ClientMessage>,
) {
    while let Some(command) = commands.recv().await {
        let json = match serde_json::to_string(&command) {
            Ok(json) => json,
            Err(e) => {
                warn!("Dropping unserializable command {:?}: {}", command, e);
                continue;
            }
        };

        debug!("Sending command: {}", json);
        if let Err(e) = sink.send(Message::Text(json.into())).await {
            warn!("Game connection refused a command: {}", e);
            break;
        }
    }

    let _ = sink.close().await;
}

/// Connection to one game's `/ws` endpoint.
///
/// Commands are queued on a channel and written by a background task, so a
/// [`sender`](Self::sender) can be handed to other tasks while this value
/// keeps reading.
pub struct FollowsweeperWebSocket {
    commands: mpsc::UnboundedSender<ClientMessage>,
    frames: SplitStream<Socket>,
    writer: JoinHandle<()>,
}

impl FollowsweeperWebSocket {
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Joining game over {}", url);
        let (socket, _) = connect_async(url).await?;
        let (sink, frames) = socket.split();

        let (commands, queue) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_commands(sink, queue));

        Ok(Self {
            commands,
            frames,
            writer,
        })
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<ClientMessage> {
        self.commands.clone()
    }

    pub fn send(&self, command: ClientMessage) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| "game connection is closed")?;
        Ok(())
    }

    pub fn reveal(&self, pos: Pos) -> Result<()> {
        self.send(ClientMessage::Reveal { pos })
    }

    pub fn flag(&self, pos: Pos) -> Result<()> {
        self.send(ClientMessage::Flag { pos })
    }

    pub fn restart(&self, params: GameParams) -> Result<()> {
        self.send(ClientMessage::Restart { params })
    }

    /// `None` once the server has closed the game connection.
    pub async fn next_message(&mut self) -> Result<Option<ServerMessage>> {
        while let Some(frame) = self.frames.next().await {
            match decode(frame?)? {
                Frame::Message(message) => return Ok(Some(message)),
                Frame::Closed => return Ok(None),
                Frame::Ignored => {}
            }
        }
        Ok(None)
    }

    /// Waits for queued commands to be written, then closes the socket.
    pub async fn close(self) -> Result<()> {
        let Self {
            commands, writer, ..
        } = self;
        drop(commands);
        writer.await?;
        Ok(())
    }
}
