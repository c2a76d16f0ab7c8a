use std::{sync::Arc, time::Duration};

use rocket::{
    Build, Rocket,
    fairing::{self, Fairing, Info, Kind},
};
use tokio::time;
use tracing::{debug, info, warn};

use crate::{
    config::AppConfig, followers::AvatarService, render::ImageStore, session::Sessions,
};

/// Spawns the periodic cleanup task once the managed state is in place.
pub struct CleanupFairing;

#[rocket::async_trait]
impl Fairing for CleanupFairing {
    fn info(&self) -> Info {
        Info {
            name: "Cleanup Task",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> fairing::Result {
        let state = (
            rocket.state::<Sessions>(),
            rocket.state::<Arc<AvatarService>>(),
            rocket.state::<ImageStore>(),
            rocket.state::<AppConfig>(),
        );

        match state {
            (Some(sessions), Some(avatars), Some(images), Some(config)) => {
                info!("Starting cleanup task for games and caches");
                let task = Cleanup {
                    sessions: sessions.clone(),
                    avatars: avatars.clone(),
                    images: images.clone(),
                    inactive_timeout: config.inactive_game_timeout,
                    active_timeout: config.active_game_timeout,
                };
                let every = config.cleanup_interval;
                tokio::spawn(task.run(every));
            }
            _ => warn!("Missing managed state, cleanup task not started"),
        }

        Ok(rocket)
    }
}

pub struct Cleanup {
    pub sessions: Sessions,
    pub avatars: Arc<AvatarService>,
    pub images: ImageStore,
    pub inactive_timeout: Duration,
    pub active_timeout: Duration,
}

impl Cleanup {
    async fn run(self, every: Duration) {
        let mut interval = time::interval(every.max(Duration::from_secs(1)));

        info!(
            "Started cleanup task: checking every {}s, inactive timeout: {}s, active timeout: {}s",
            every.as_secs(),
            self.inactive_timeout.as_secs(),
            self.active_timeout.as_secs()
        );

        loop {
            interval.tick().await;
            self.sweep();
        }
    }

    /// One cleanup round. Returns how many games were dropped.
    pub fn sweep(&self) -> usize {
        let mut to_remove = Vec::new();

        // Sessions that are busy right now are clearly not idle.
        for entry in self.sessions.iter() {
            if let Ok(session) = entry.value().try_lock()
                && session.should_cleanup(self.inactive_timeout, self.active_timeout)
            {
                to_remove.push(entry.key().clone());
            }
        }

        let removed = to_remove.len();
        for id in to_remove {
            self.sessions.remove(&id);
            debug!("Cleaned up game: {}", id);
        }
        if removed > 0 {
            info!("Cleaned up {} inactive games", removed);
        }

        let followers = self.avatars.cache().sweep();
        let images = self.images.sweep();
        if followers + images > 0 {
            debug!(
                "Evicted {} follower lists and {} board images",
                followers, images
            );
        }

        removed
    }
}

#[cfg(test)]
mod tests {
    use dashmap::DashMap;
    use followsweeper_common::models::{AvatarRecord, GameParams};
    use tokio::sync::Mutex;

    use super::*;
    use crate::{
        cache::TtlCache,
        followers::{FollowerError, FollowerSource},
        render::StoredImage,
        session::Session,
    };

    struct NoSource;

    #[rocket::async_trait]
    impl FollowerSource for NoSource {
        async fn fetch_top_avatars(
            &self,
            _fid: u64,
            _limit: usize,
        ) -> Result<Vec<AvatarRecord>, FollowerError> {
            Err(FollowerError::MissingApiKey)
        }
    }

    fn cleanup_after(inactive_timeout: Duration) -> Cleanup {
        let ttl = Duration::from_millis(10);
        Cleanup {
            sessions: Arc::new(DashMap::new()),
            avatars: Arc::new(AvatarService::new(
                Arc::new(NoSource),
                Arc::new(TtlCache::new(ttl)),
                8,
            )),
            images: Arc::new(TtlCache::new(ttl)),
            inactive_timeout,
            active_timeout: Duration::from_secs(3600),
        }
    }

    fn add_session(cleanup: &Cleanup, id: &str) {
        let session = Session::new(GameParams::default(), vec![]).unwrap();
        cleanup
            .sessions
            .insert(id.to_string(), Arc::new(Mutex::new(session)));
    }

    #[tokio::test]
    async fn idle_games_and_stale_cache_entries_are_dropped() {
        let cleanup = cleanup_after(Duration::ZERO);
        add_session(&cleanup, "abcde");
        cleanup.images.insert(
            "img".to_string(),
            StoredImage {
                content_type: "image/svg+xml".to_string(),
                data: vec![],
                game_id: "abcde".to_string(),
            },
        );
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cleanup.sweep(), 1);
        assert!(cleanup.sessions.is_empty());
        assert!(cleanup.images.is_empty());
    }

    #[tokio::test]
    async fn locked_and_recent_games_survive() {
        let cleanup = cleanup_after(Duration::from_secs(600));
        add_session(&cleanup, "fresh");

        assert_eq!(cleanup.sweep(), 0);
        assert_eq!(cleanup.sessions.len(), 1);

        let busy = cleanup_after(Duration::ZERO);
        add_session(&busy, "busy");
        let session = busy.sessions.get("busy").map(|e| e.value().clone()).unwrap();
        let _guard = session.lock().await;

        assert_eq!(busy.sweep(), 0);
    }
}
