use std::fmt;

use serde::{Deserialize, Serialize};

/// A follower (or stand-in profile) hidden under a mine.
///
/// Only `fid` carries meaning for the game; the rest is display data that
/// travels with the record unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvatarRecord {
    pub fid: u64,
    pub username: String,
    pub display_name: String,
    #[serde(default)]
    pub pfp_url: String,
    #[serde(default)]
    pub follower_count: u64,
    #[serde(default)]
    pub following_count: u64,
    #[serde(default)]
    pub verified_addresses: Vec<String>,
}

impl AvatarRecord {
    /// Stand-in record used when a profile cannot be looked up.
    pub fn placeholder(fid: u64) -> Self {
        Self {
            fid,
            username: format!("user{fid}"),
            display_name: format!("User {fid}"),
            pfp_url: String::new(),
            follower_count: 0,
            following_count: 0,
            verified_addresses: Vec::new(),
        }
    }

    pub fn mention(&self) -> String {
        format!("@{}", self.username)
    }
}

/// Player-visible state of a single cell.
///
/// Hidden mines are indistinguishable from hidden safe cells.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "state")]
pub enum Cell {
    #[serde(rename = "hidden")]
    Hidden,
    #[serde(rename = "flagged")]
    Flagged,
    #[serde(rename = "revealed")]
    Revealed { adjacent: u8 },
    #[serde(rename = "mine")]
    Mine { avatar: Option<AvatarRecord> },
}

/// Board coordinates. Signed so that out-of-range requests from the wire
/// reach the engine and get rejected there instead of failing to parse.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Pos {
    pub row: i32,
    pub col: i32,
}

impl Pos {
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GameParams {
    pub width: usize,
    pub height: usize,
    pub mines: usize,
}

impl Default for GameParams {
    fn default() -> Self {
        Self {
            width: 8,
            height: 8,
            mines: 8,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    AwaitingFirstMove,
    InProgress,
    Won,
    Lost,
}

impl Phase {
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreateRequest {
    /// Farcaster id whose followers become the mines. Without one the
    /// mines carry no avatars.
    #[serde(default)]
    pub fid: Option<u64>,
    #[serde(flatten)]
    pub params: GameParams,
}

#[derive(Serialize, Deserialize)]
pub struct CreateResponse {
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FollowersResponse {
    pub followers: Vec<AvatarRecord>,
    pub total: usize,
}

/// Player-facing projection of a game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameView {
    pub width: usize,
    pub height: usize,
    pub mines: usize,
    pub phase: Phase,
    pub mines_remaining: i64,
    pub field: Vec<Vec<Cell>>,
    pub killed_by: Option<AvatarRecord>,
    pub avoided: Option<Vec<AvatarRecord>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BoardImageResponse {
    pub key: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShareMessage {
    pub text: String,
    pub board: String,
    pub won: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub entries: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheStatusResponse {
    pub followers: CacheStats,
    pub images: CacheStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avatar_uses_camel_case_fields() {
        let json = r#"{"fid":3,"username":"dwr","displayName":"Dan","pfpUrl":"https://x/y.png"}"#;
        let avatar: AvatarRecord = serde_json::from_str(json).unwrap();

        assert_eq!(avatar.fid, 3);
        assert_eq!(avatar.display_name, "Dan");
        assert_eq!(avatar.follower_count, 0);
        assert!(avatar.verified_addresses.is_empty());
    }

    #[test]
    fn create_request_flattens_params_and_defaults() {
        let request: CreateRequest = serde_json::from_str(r#"{"fid":12,"width":5}"#).unwrap();

        assert_eq!(request.fid, Some(12));
        assert_eq!(
            request.params,
            GameParams {
                width: 5,
                height: 8,
                mines: 8
            }
        );
    }

    #[test]
    fn hidden_cells_do_not_leak_mines() {
        let json = serde_json::to_string(&Cell::Hidden).unwrap();
        assert_eq!(json, r#"{"state":"hidden"}"#);
    }
}
