use std::sync::Arc;

use followsweeper_common::models::{
    AvatarRecord, BoardImageResponse, CacheStatusResponse, Cell, CreateRequest, CreateResponse,
    FollowersResponse, GameParams, GameView, Phase, Pos, ShareMessage,
};
use followsweeper_engine::GameEngine;
use followsweeper_server::{
    build_rocket,
    config::AppConfig,
    followers::{FollowerError, FollowerSource},
    session::{Session, Sessions},
};
use rocket::{
    http::{ContentType, Status},
    local::asynchronous::Client,
};
use tokio::sync::Mutex;

struct FixedSource;

#[rocket::async_trait]
impl FollowerSource for FixedSource {
    async fn fetch_top_avatars(
        &self,
        _fid: u64,
        limit: usize,
    ) -> Result<Vec<AvatarRecord>, FollowerError> {
        Ok([1350, 2233]
            .into_iter()
            .take(limit)
            .map(AvatarRecord::placeholder)
            .collect())
    }
}

async fn client_with(config: AppConfig) -> Client {
    let rocket = build_rocket(config, Arc::new(FixedSource)).unwrap();
    Client::tracked(rocket).await.unwrap()
}

async fn client() -> Client {
    client_with(AppConfig::default()).await
}

async fn create(client: &Client, request: &CreateRequest) -> (Status, Option<CreateResponse>) {
    let response = client.post("/create").json(request).dispatch().await;
    let status = response.status();
    (status, response.into_json().await)
}

/// Inserts a 2x2 game that was lost on the mine at (0, 0).
fn insert_lost_game(client: &Client, id: &str) {
    let mut engine = GameEngine::with_mines(
        2,
        2,
        &[Pos::new(0, 0)],
        vec![AvatarRecord::placeholder(1350)],
    )
    .unwrap();
    engine.reveal(Pos::new(0, 0)).unwrap();

    let sessions = client.rocket().state::<Sessions>().unwrap();
    sessions.insert(
        id.to_string(),
        Arc::new(Mutex::new(Session::from_engine(engine))),
    );
}

#[rocket::async_test]
async fn created_game_starts_hidden() {
    let client = client().await;
    let request = CreateRequest {
        fid: Some(3),
        params: GameParams {
            width: 5,
            height: 4,
            mines: 3,
        },
    };

    let (status, created) = create(&client, &request).await;
    assert_eq!(status, Status::Ok);
    let id = created.unwrap().id;
    assert_eq!(id.len(), 5);

    let response = client.get(format!("/games/{}", id)).dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let view: GameView = response.into_json().await.unwrap();

    assert_eq!((view.width, view.height, view.mines), (5, 4, 3));
    assert_eq!(view.phase, Phase::AwaitingFirstMove);
    assert_eq!(view.mines_remaining, 3);
    assert_eq!(view.field.len(), 4);
    assert!(view.field.iter().flatten().all(|cell| *cell == Cell::Hidden));
}

#[rocket::async_test]
async fn impossible_boards_are_rejected() {
    let client = client().await;
    let request = CreateRequest {
        fid: None,
        params: GameParams {
            width: 8,
            height: 8,
            mines: 64,
        },
    };

    let (status, _) = create(&client, &request).await;
    assert_eq!(status, Status::BadRequest);

    let huge = CreateRequest {
        fid: None,
        params: GameParams {
            width: 1 << 20,
            height: 1 << 20,
            mines: 8,
        },
    };
    let (status, _) = create(&client, &huge).await;
    assert_eq!(status, Status::BadRequest);
}

#[rocket::async_test]
async fn game_creation_is_rate_limited() {
    let client = client_with(AppConfig {
        games_per_minute: 1,
        ..AppConfig::default()
    })
    .await;

    let (first, _) = create(&client, &CreateRequest::default()).await;
    let (second, _) = create(&client, &CreateRequest::default()).await;

    assert_eq!(first, Status::Ok);
    assert_eq!(second, Status::TooManyRequests);
}

#[rocket::async_test]
async fn unknown_games_are_not_found() {
    let client = client().await;

    for uri in ["/games/nope", "/games/nope/share"] {
        let response = client.get(uri).dispatch().await;
        assert_eq!(response.status(), Status::NotFound, "{}", uri);
    }
    let response = client.post("/games/nope/board-image").dispatch().await;
    assert_eq!(response.status(), Status::NotFound);
    let response = client.get("/board-image/nope").dispatch().await;
    assert_eq!(response.status(), Status::NotFound);
}

#[rocket::async_test]
async fn running_games_cannot_be_shared() {
    let client = client().await;
    let (_, created) = create(&client, &CreateRequest::default()).await;
    let id = created.unwrap().id;

    let share = client.get(format!("/games/{}/share", id)).dispatch().await;
    let image = client
        .post(format!("/games/{}/board-image", id))
        .dispatch()
        .await;

    assert_eq!(share.status(), Status::Conflict);
    assert_eq!(image.status(), Status::Conflict);
}

#[rocket::async_test]
async fn followers_are_cached() {
    let client = client().await;

    let response = client.get("/followers?fid=3").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let followers: FollowersResponse = response.into_json().await.unwrap();
    assert_eq!(followers.total, 2);
    assert_eq!(followers.followers[0].username, "user1350");

    let status: CacheStatusResponse = client
        .get("/cache-status")
        .dispatch()
        .await
        .into_json()
        .await
        .unwrap();
    assert_eq!(status.followers.entries, vec!["3"]);
    assert_eq!(status.images.size, 0);
}

#[rocket::async_test]
async fn lost_game_is_shared_with_its_killer() {
    let client = client().await;
    insert_lost_game(&client, "lost1");

    let share: ShareMessage = client
        .get("/games/lost1/share")
        .dispatch()
        .await
        .into_json()
        .await
        .unwrap();

    assert!(!share.won);
    assert_eq!(share.text, "Got killed by @user1350, lost 100 points. 💥");
    assert_eq!(share.board, "@user1350 ⬜\n⬜ ⬜");
}

#[rocket::async_test]
async fn board_image_is_stored_and_served() {
    let client = client().await;
    insert_lost_game(&client, "lost2");

    let response = client.post("/games/lost2/board-image").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let image: BoardImageResponse = response.into_json().await.unwrap();
    assert_eq!(image.url, format!("/board-image/{}", image.key));

    let response = client.get(image.url.as_str()).dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(response.content_type(), Some(ContentType::SVG));
    let svg = response.into_string().await.unwrap();
    assert!(svg.contains("Game Over!"));
    assert!(svg.contains("@user1350"));

    let status: CacheStatusResponse = client
        .get("/cache-status")
        .dispatch()
        .await
        .into_json()
        .await
        .unwrap();
    assert_eq!(status.images.entries, vec![image.key]);
}

#[rocket::async_test]
async fn board_image_is_rendered_once_per_game() {
    let client = client().await;
    insert_lost_game(&client, "lost3");

    let mut keys = Vec::new();
    for _ in 0..3 {
        let response = client.post("/games/lost3/board-image").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let image: BoardImageResponse = response.into_json().await.unwrap();
        keys.push(image.key);
    }

    assert_eq!(keys[0], keys[1]);
    assert_eq!(keys[1], keys[2]);

    let status: CacheStatusResponse = client
        .get("/cache-status")
        .dispatch()
        .await
        .into_json()
        .await
        .unwrap();
    assert_eq!(status.images.size, 1);
}
