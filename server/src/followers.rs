use std::{collections::HashSet, sync::Arc};

use followsweeper_common::models::AvatarRecord;
use rand::{Rng, seq::SliceRandom};
use reqwest::{Client, StatusCode};
use rocket::futures::future::join_all;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{cache::TtlCache, config::AppConfig};

/// Well-known accounts used to fill the mines when a player has too few
/// followers, and as the whole pool when the follower API is unreachable.
pub const DEFAULT_FIDS: [u64; 8] = [4753, 3, 12, 99, 1075899, 1350, 2233, 1188544];

/// How many followers are requested before picking the pool at random.
const FOLLOWER_PAGE_SIZE: usize = 20;

pub type FollowerCache = Arc<TtlCache<u64, Vec<AvatarRecord>>>;

#[derive(Debug, Error)]
pub enum FollowerError {
    #[error("NEYNAR_API_KEY is not configured")]
    MissingApiKey,
    #[error("follower request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("follower API answered {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("malformed follower API response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

/// Source of the avatars hidden under the mines.
#[rocket::async_trait]
pub trait FollowerSource: Send + Sync {
    /// Returns up to `limit` avatars for `fid`, in the order they should be
    /// assigned to mines.
    async fn fetch_top_avatars(
        &self,
        fid: u64,
        limit: usize,
    ) -> Result<Vec<AvatarRecord>, FollowerError>;
}

#[derive(Deserialize)]
struct FollowersPage {
    users: Vec<FollowerEntry>,
}

#[derive(Deserialize)]
struct FollowerEntry {
    user: NeynarUser,
}

#[derive(Deserialize)]
struct UserResponse {
    user: NeynarUser,
}

#[derive(Deserialize)]
struct NeynarUser {
    fid: u64,
    username: String,
    display_name: Option<String>,
    pfp_url: Option<String>,
    #[serde(default)]
    follower_count: u64,
    #[serde(default)]
    following_count: u64,
    verified_addresses: Option<VerifiedAddresses>,
}

#[derive(Deserialize)]
struct VerifiedAddresses {
    #[serde(default)]
    eth_addresses: Vec<String>,
}

impl From<NeynarUser> for AvatarRecord {
    fn from(user: NeynarUser) -> Self {
        Self {
            fid: user.fid,
            display_name: user
                .display_name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| user.username.clone()),
            username: user.username,
            pfp_url: user.pfp_url.unwrap_or_default(),
            follower_count: user.follower_count,
            following_count: user.following_count,
            verified_addresses: user
                .verified_addresses
                .map(|addresses| addresses.eth_addresses)
                .unwrap_or_default(),
        }
    }
}

/// Farcaster followers through the Neynar API.
pub struct NeynarFollowerSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl NeynarFollowerSource {
    pub fn new(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.follower_request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.neynar_api_url.trim_end_matches('/').to_string(),
            api_key: config.neynar_api_key.clone(),
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        api_key: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FollowerError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header("x-api-key", api_key)
            .header("accept", "application/json")
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(FollowerError::Status { status, body });
        }

        Ok(serde_json::from_str(&body)?)
    }

    async fn fetch_followers(&self, api_key: &str, fid: u64) -> Result<Vec<AvatarRecord>, FollowerError> {
        let page: FollowersPage = self
            .get_json(
                api_key,
                "/v2/farcaster/followers/",
                &[
                    ("fid", fid.to_string()),
                    ("limit", FOLLOWER_PAGE_SIZE.to_string()),
                    ("viewer_fid", fid.to_string()),
                    ("sort_type", "desc_chron".to_string()),
                ],
            )
            .await?;

        Ok(page.users.into_iter().map(|entry| entry.user.into()).collect())
    }

    async fn fetch_user(&self, api_key: &str, fid: u64, viewer: u64) -> AvatarRecord {
        let response: Result<UserResponse, _> = self
            .get_json(
                api_key,
                "/v2/farcaster/user/",
                &[("fid", fid.to_string()), ("viewer_fid", viewer.to_string())],
            )
            .await;

        match response {
            Ok(response) => response.user.into(),
            Err(e) => {
                warn!("Could not look up default fid {}: {}", fid, e);
                AvatarRecord::placeholder(fid)
            }
        }
    }
}

#[rocket::async_trait]
impl FollowerSource for NeynarFollowerSource {
    #[instrument(level = "trace", skip(self))]
    async fn fetch_top_avatars(
        &self,
        fid: u64,
        limit: usize,
    ) -> Result<Vec<AvatarRecord>, FollowerError> {
        let api_key = self.api_key.as_deref().ok_or(FollowerError::MissingApiKey)?;

        let followers = self.fetch_followers(api_key, fid).await?;
        let found = followers.len();
        let (mut pool, fill) = select_pool(followers, limit, &mut rand::rng());

        if !fill.is_empty() {
            info!(
                "fid {} has {} followers, filling {} slots with default accounts",
                fid,
                found,
                fill.len()
            );
            let defaults = join_all(fill.iter().map(|&d| self.fetch_user(api_key, d, fid))).await;
            pool.extend(defaults);
        }

        pool.shuffle(&mut rand::rng());
        debug!(
            "Avatar pool for fid {}: {:?}",
            fid,
            pool.iter().map(|avatar| avatar.fid).collect::<Vec<_>>()
        );
        Ok(pool)
    }
}

/// Picks up to `limit` followers at random and the default fids needed to
/// fill the remaining slots.
pub fn select_pool<R: Rng + ?Sized>(
    mut followers: Vec<AvatarRecord>,
    limit: usize,
    rng: &mut R,
) -> (Vec<AvatarRecord>, Vec<u64>) {
    followers.shuffle(rng);
    followers.truncate(limit);

    let taken: HashSet<u64> = followers.iter().map(|avatar| avatar.fid).collect();
    let mut defaults: Vec<u64> = DEFAULT_FIDS
        .into_iter()
        .filter(|fid| !taken.contains(fid))
        .collect();
    defaults.shuffle(rng);
    defaults.truncate(limit.saturating_sub(followers.len()));

    (followers, defaults)
}

/// Pool used when the follower API cannot be reached.
pub fn fallback_pool(limit: usize) -> Vec<AvatarRecord> {
    DEFAULT_FIDS
        .into_iter()
        .take(limit)
        .map(AvatarRecord::placeholder)
        .collect()
}

/// Follower source fronted by the follower cache.
pub struct AvatarService {
    source: Arc<dyn FollowerSource>,
    cache: FollowerCache,
    limit: usize,
}

impl AvatarService {
    pub fn new(source: Arc<dyn FollowerSource>, cache: FollowerCache, limit: usize) -> Self {
        Self {
            source,
            cache,
            limit,
        }
    }

    pub fn cache(&self) -> &FollowerCache {
        &self.cache
    }

    /// Never fails: a broken source degrades to [`fallback_pool`], which is
    /// not cached so the next game retries the source.
    #[instrument(level = "trace", skip(self))]
    pub async fn avatars_for(&self, fid: u64) -> Vec<AvatarRecord> {
        if let Some(cached) = self.cache.get(&fid) {
            debug!("Follower cache hit for fid {}", fid);
            return cached;
        }

        match self.source.fetch_top_avatars(fid, self.limit).await {
            Ok(avatars) => {
                info!("Fetched {} avatars for fid {}", avatars.len(), fid);
                self.cache.insert(fid, avatars.clone());
                avatars
            }
            Err(e) => {
                warn!("Falling back to default avatars for fid {}: {}", fid, e);
                fallback_pool(self.limit)
            }
        }
    }
}
