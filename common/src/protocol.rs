use serde::{Deserialize, Serialize};

use crate::models::{AvatarRecord, Cell, GameParams, Phase, Pos};

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "action")]
pub enum ClientMessage {
    #[serde(rename = "reveal")]
    Reveal { pos: Pos },
    #[serde(rename = "flag")]
    Flag { pos: Pos },
    #[serde(rename = "restart")]
    Restart { params: GameParams },
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CellUpdate {
    pub pos: Pos,
    pub value: Cell,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "init")]
    Init {
        width: usize,
        height: usize,
        mines: usize,
        phase: Phase,
        mines_remaining: i64,
        field: Vec<Vec<Cell>>,
    },
    #[serde(rename = "update")]
    Update {
        updates: Vec<CellUpdate>,
        phase: Phase,
        mines_remaining: i64,
        /// Avatar under the detonated mine, set once the game is lost.
        killed_by: Option<AvatarRecord>,
        /// Every avatar that was hidden under a mine, set once the game is won.
        avoided: Option<Vec<AvatarRecord>>,
    },
    #[serde(rename = "error")]
    Error { message: String },
}
