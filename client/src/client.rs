use followsweeper_common::models::{
    BoardImageResponse, CacheStatusResponse, CreateRequest, CreateResponse, FollowersResponse,
    GameView, ShareMessage,
};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::Result;

/// HTTP client for the followsweeper server API
pub struct FollowsweeperClient {
    client: Client,
    base_url: Url,
}

async fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(format!("Failed to {}: {}", what, status).into());
    }
    Ok(response.json().await?)
}

impl FollowsweeperClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let client = Client::new();

        Ok(Self { client, base_url })
    }

    /// Creates a game and returns its id, which is what the WebSocket
    /// endpoint expects.
    pub async fn create_game(&self, request: &CreateRequest) -> Result<String> {
        let url = self.base_url.join("/create")?;
        debug!("Creating game at {}", url);

        let response = self.client.post(url).json(request).send().await?;
        let created: CreateResponse = read_json(response, "create game").await?;
        Ok(created.id)
    }

    pub async fn game(&self, game_id: &str) -> Result<GameView> {
        let url = self.base_url.join(&format!("/games/{}", game_id))?;
        read_json(self.client.get(url).send().await?, "load game").await
    }

    pub async fn followers(&self, fid: u64) -> Result<FollowersResponse> {
        let mut url = self.base_url.join("/followers")?;
        url.set_query(Some(&format!("fid={}", fid)));
        read_json(self.client.get(url).send().await?, "load followers").await
    }

    /// Share text for a finished game. Fails while the game is still running.
    pub async fn share(&self, game_id: &str) -> Result<ShareMessage> {
        let url = self.base_url.join(&format!("/games/{}/share", game_id))?;
        read_json(self.client.get(url).send().await?, "load share message").await
    }

    /// Renders a finished game and returns where the image can be fetched.
    pub async fn board_image(&self, game_id: &str) -> Result<BoardImageResponse> {
        let url = self.base_url.join(&format!("/games/{}/board-image", game_id))?;
        read_json(self.client.post(url).send().await?, "render board").await
    }

    pub async fn cache_status(&self) -> Result<CacheStatusResponse> {
        let url = self.base_url.join("/cache-status")?;
        read_json(self.client.get(url).send().await?, "load cache status").await
    }

    pub fn websocket_url(&self, game_id: &str) -> Result<String> {
        let mut ws_url = self.base_url.clone();
        ws_url
            .set_scheme(match self.base_url.scheme() {
                "https" => "wss",
                _ => "ws",
            })
            .map_err(|_| "Failed to set WebSocket scheme")?;
        ws_url.set_path("/ws");
        ws_url.query_pairs_mut().clear().append_pair("id", game_id);

        Ok(ws_url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_url_follows_http_scheme() {
        let plain = FollowsweeperClient::new("http://localhost:8000").unwrap();
        let secure = FollowsweeperClient::new("https://sweep.example.com/app/").unwrap();

        assert_eq!(
            plain.websocket_url("abcde").unwrap(),
            "ws://localhost:8000/ws?id=abcde"
        );
        assert_eq!(
            secure.websocket_url("x_y-z").unwrap(),
            "wss://sweep.example.com/ws?id=x_y-z"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(FollowsweeperClient::new("not a url").is_err());
    }
}
