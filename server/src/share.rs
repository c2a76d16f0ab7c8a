use followsweeper_common::models::{Phase, ShareMessage};
use followsweeper_engine::Snapshot;

/// Cast text and a plain-text board for a finished game. `None` while the
/// game is still running.
pub fn share_message(snapshot: &Snapshot) -> Option<ShareMessage> {
    let text = match snapshot.phase {
        Phase::Won => {
            let mentions: Vec<String> = snapshot
                .avoided_avatars
                .iter()
                .flatten()
                .map(|avatar| avatar.mention())
                .collect();
            if mentions.is_empty() {
                "Cleared the board to win 100 points! 🎉".to_string()
            } else {
                format!("Avoided {} to win 100 points! 🎉", mentions.join(" "))
            }
        }
        Phase::Lost => match &snapshot.detonated_avatar {
            Some(avatar) => format!("Got killed by {}, lost 100 points. 💥", avatar.mention()),
            None => "Game over! Lost 100 points. 💥".to_string(),
        },
        Phase::AwaitingFirstMove | Phase::InProgress => return None,
    };

    Some(ShareMessage {
        text,
        board: board_text(snapshot),
        won: snapshot.phase == Phase::Won,
    })
}

pub fn board_text(snapshot: &Snapshot) -> String {
    snapshot
        .cells
        .iter()
        .map(|row| {
            row.iter()
                .map(|cell| match (&cell.avatar, cell.is_mine, cell.is_revealed) {
                    (Some(avatar), _, _) => avatar.mention(),
                    (None, true, _) => "💣".to_string(),
                    (None, false, true) => "✅".to_string(),
                    (None, false, false) => "⬜".to_string(),
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use followsweeper_common::models::{AvatarRecord, Pos};
    use followsweeper_engine::GameEngine;

    use super::*;

    fn avatar(fid: u64, username: &str) -> AvatarRecord {
        AvatarRecord {
            username: username.to_string(),
            ..AvatarRecord::placeholder(fid)
        }
    }

    #[test]
    fn win_mentions_every_avoided_follower() {
        let mines = [Pos::new(0, 0), Pos::new(1, 1)];
        let avatars = vec![avatar(1, "alice"), avatar(2, "bob")];
        let mut engine = GameEngine::with_mines(2, 2, &mines, avatars).unwrap();
        engine.reveal(Pos::new(0, 1)).unwrap();
        engine.reveal(Pos::new(1, 0)).unwrap();

        let message = share_message(&engine.snapshot()).unwrap();

        assert!(message.won);
        assert_eq!(message.text, "Avoided @alice @bob to win 100 points! 🎉");
        assert_eq!(message.board, "@alice ✅\n✅ @bob");
    }

    #[test]
    fn loss_names_the_killer() {
        let mines = [Pos::new(0, 0), Pos::new(1, 1)];
        let mut engine =
            GameEngine::with_mines(2, 2, &mines, vec![avatar(1, "alice")]).unwrap();
        engine.reveal(Pos::new(1, 1)).unwrap();

        let message = share_message(&engine.snapshot()).unwrap();

        assert!(!message.won);
        assert_eq!(message.text, "Game over! Lost 100 points. 💥");
        assert_eq!(message.board, "@alice ⬜\n⬜ 💣");

        let mut engine =
            GameEngine::with_mines(2, 2, &mines, vec![avatar(1, "alice")]).unwrap();
        engine.reveal(Pos::new(0, 0)).unwrap();
        assert_eq!(
            share_message(&engine.snapshot()).unwrap().text,
            "Got killed by @alice, lost 100 points. 💥"
        );
    }

    #[test]
    fn running_games_have_nothing_to_share() {
        let engine = GameEngine::with_mines(2, 2, &[Pos::new(0, 0)], vec![]).unwrap();

        assert_eq!(share_message(&engine.snapshot()), None);
    }
}
