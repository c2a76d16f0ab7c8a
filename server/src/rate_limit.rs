use std::{
    net::{IpAddr, Ipv4Addr},
    time::{Duration, Instant},
};

use dashmap::DashMap;
use rocket::{
    Request,
    http::Status,
    request::{self, FromRequest},
};
use tracing::{debug, instrument, warn};

#[derive(Debug)]
struct TokenBucket {
    last_refill: Instant,
    tokens: u32,
    capacity: u32,
    refill_interval: Duration,
}

impl TokenBucket {
    fn new(capacity: u32, refill_interval: Duration) -> Self {
        debug!(
            "Creating new token bucket: capacity={}, interval={}s",
            capacity,
            refill_interval.as_secs()
        );
        Self {
            last_refill: Instant::now(),
            tokens: capacity,
            capacity,
            refill_interval,
        }
    }

    fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens > 0 {
            self.tokens -= 1;
            debug!("Token consumed, remaining: {}", self.tokens);
            true
        } else {
            debug!("No tokens available for consumption");
            false
        }
    }

    /// Tops the bucket back up to capacity once per elapsed interval.
    fn refill(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.last_refill) >= self.refill_interval {
            if self.tokens != self.capacity {
                debug!(
                    "Token bucket refilled: {} -> {} tokens",
                    self.tokens, self.capacity
                );
            }
            self.tokens = self.capacity;
            self.last_refill = now;
        }
    }
}

/// Per-client budget for game creation.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<IpAddr, TokenBucket>,
    capacity: u32,
    refill_interval: Duration,
}

impl RateLimiter {
    pub fn new(games_per_minute: u32) -> Self {
        Self::with_interval(games_per_minute, Duration::from_secs(60))
    }

    pub fn with_interval(capacity: u32, refill_interval: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            capacity,
            refill_interval,
        }
    }

    #[instrument(level = "trace", skip(self))]
    pub fn check(&self, ip: IpAddr) -> Result<(), Status> {
        let mut bucket = self
            .buckets
            .entry(ip)
            .or_insert_with(|| TokenBucket::new(self.capacity, self.refill_interval));

        if bucket.try_consume() {
            debug!("Rate limit check passed for {}", ip);
            Ok(())
        } else {
            warn!("Rate limit exceeded for {} - rejecting request", ip);
            Err(Status::TooManyRequests)
        }
    }
}

/// Best guess at the caller's address, proxy headers first.
#[derive(Clone, Copy, Debug)]
pub struct ClientIp(pub IpAddr);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientIp {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let ip = req
            .headers()
            .get_one("X-Forwarded-For")
            .and_then(|header| header.split(',').next())
            .and_then(|ip| ip.trim().parse().ok())
            .or_else(|| {
                req.headers()
                    .get_one("X-Real-IP")
                    .and_then(|ip| ip.trim().parse().ok())
            })
            .or_else(|| req.client_ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

        request::Outcome::Success(ClientIp(ip))
    }
}

#[cfg(test)]
mod tests {
    use std::thread::sleep;

    use super::*;

    const HOME: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
    const AWAY: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));

    #[test]
    fn budget_is_per_client() {
        let limiter = RateLimiter::new(2);

        assert!(limiter.check(HOME).is_ok());
        assert!(limiter.check(HOME).is_ok());
        assert_eq!(limiter.check(HOME), Err(Status::TooManyRequests));
        assert!(limiter.check(AWAY).is_ok());
    }

    #[test]
    fn bucket_refills_after_interval() {
        let limiter = RateLimiter::with_interval(1, Duration::from_millis(20));

        assert!(limiter.check(HOME).is_ok());
        assert!(limiter.check(HOME).is_err());
        sleep(Duration::from_millis(40));
        assert!(limiter.check(HOME).is_ok());
    }
}
