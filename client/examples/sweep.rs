use std::env;

use followsweeper_client::{
    Cell, CreateRequest, FollowsweeperClient, FollowsweeperWebSocket, GameParams,
    Phase, Pos, ServerMessage,
};

/// Plays a game by revealing cells in reading order until it ends, then
/// prints the share text. Pass a fid to hide that account's followers.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();

    let fid = env::args().nth(1).map(|fid| fid.parse()).transpose()?;
    let client = FollowsweeperClient::new("http://localhost:8000")?;

    let request = CreateRequest {
        fid,
        params: GameParams::default(),
    };
    let game_id = client.create_game(&request).await?;
    println!("Created game with ID: {}", game_id);

    let mut ws = FollowsweeperWebSocket::connect(&client.websocket_url(&game_id)?).await?;

    let Some(ServerMessage::Init { mut field, .. }) = ws.next_message().await? else {
        return Err("expected an init message".into());
    };
    print_field(&field);

    let mut phase = Phase::AwaitingFirstMove;
    let mut next = 0;
    while !phase.is_finished() {
        let width = field[0].len();
        let Some(target) = field
            .iter()
            .flatten()
            .skip(next)
            .position(|cell| *cell == Cell::Hidden)
            .map(|offset| next + offset)
        else {
            break;
        };
        next = target + 1;

        let pos = Pos::new((target / width) as i32, (target % width) as i32);
        println!("Revealing {}", pos);
        ws.reveal(pos)?;

        match ws.next_message().await? {
            Some(ServerMessage::Update {
                updates,
                phase: new_phase,
                ..
            }) => {
                for update in updates {
                    field[update.pos.row as usize][update.pos.col as usize] = update.value;
                }
                phase = new_phase;
            }
            Some(message) => println!("Unexpected message: {:?}", message),
            None => break,
        }
    }

    print_field(&field);
    ws.close().await?;

    let share = client.share(&game_id).await?;
    println!("\n{}\n\n{}", share.text, share.board);

    Ok(())
}

fn print_field(field: &[Vec<Cell>]) {
    for row in field {
        let line: Vec<String> = row
            .iter()
            .map(|cell| match cell {
                Cell::Hidden => "·".to_string(),
                Cell::Flagged => "F".to_string(),
                Cell::Revealed { adjacent: 0 } => " ".to_string(),
                Cell::Revealed { adjacent } => adjacent.to_string(),
                Cell::Mine { .. } => "*".to_string(),
            })
            .collect();
        println!("  {}", line.join(" "));
    }
}
