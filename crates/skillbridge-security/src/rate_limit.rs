use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use skillbridge_core::{SkillBridgeError, SkillBridgeResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

// Absorbs float error after a sleep computed from the same refill rate.
const TOKEN_EPSILON: f64 = 1e-9;

/// Traffic budget declared by a skill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimits {
    /// Sustained refill rate. Takes precedence over `requests_per_minute`.
    #[serde(default, alias = "requestsPerSecond")]
    pub requests_per_second: Option<f64>,
    /// Bucket capacity: calls admitted back-to-back from a full bucket.
    #[serde(alias = "burstLimit")]
    pub burst_limit: u32,
    /// Used as `requests_per_minute / 60` when no per-second rate is given.
    #[serde(default, alias = "requestsPerMinute")]
    pub requests_per_minute: Option<f64>,
}

impl RateLimits {
    /// `rps` tokens per second, `burst` capacity.
    pub fn per_second(rps: f64, burst: u32) -> Self {
        Self {
            requests_per_second: Some(rps),
            burst_limit: burst,
            requests_per_minute: None,
        }
    }

    /// `rpm` tokens per minute, `burst` capacity.
    pub fn per_minute(rpm: f64, burst: u32) -> Self {
        Self {
            requests_per_second: None,
            burst_limit: burst,
            requests_per_minute: Some(rpm),
        }
    }

    /// Effective refill rate in tokens per second.
    pub fn refill_per_second(&self) -> f64 {
        match self.requests_per_second {
            Some(rps) if rps > 0.0 => rps,
            _ => self.requests_per_minute.unwrap_or(0.0) / 60.0,
        }
    }

    /// Reject budgets that could never admit a call.
    pub fn validate(&self) -> SkillBridgeResult<()> {
        if self.burst_limit == 0 {
            return Err(SkillBridgeError::Config(
                "rate limit burst_limit must be at least 1".into(),
            ));
        }
        let rate = self.refill_per_second();
        if !rate.is_finite() || rate <= 0.0 {
            return Err(SkillBridgeError::Config(
                "rate limit needs a positive requests_per_second or requests_per_minute".into(),
            ));
        }
        if Duration::try_from_secs_f64(1.0 / rate).is_err() {
            return Err(SkillBridgeError::Config(format!(
                "rate limit of {rate} requests per second is too small to schedule"
            )));
        }
        Ok(())
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_grant: Instant,
}

/// Token-bucket limiter for one skill identity.
///
/// `acquire` never fails, it only delays. Waiters are admitted strictly in
/// arrival order: a fair async lock queues them and only the head waiter
/// sleeps on the bucket. Dropping a pending `acquire` leaves the bucket
/// untouched, since a token is only deducted once it is granted.
pub struct RateLimiter {
    name: String,
    capacity: f64,
    refill_rate: f64, // tokens per second
    bucket: Mutex<Bucket>,
    queue: tokio::sync::Mutex<()>,
}

impl RateLimiter {
    /// Create a limiter starting with a full bucket.
    pub fn new(name: impl Into<String>, limits: &RateLimits) -> SkillBridgeResult<Self> {
        limits.validate()?;
        let now = Instant::now();
        let capacity = f64::from(limits.burst_limit);
        Ok(Self {
            name: name.into(),
            capacity,
            refill_rate: limits.refill_per_second(),
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: now,
                last_grant: now,
            }),
            queue: tokio::sync::Mutex::new(()),
        })
    }

    /// Wait for a token, in FIFO order with other callers of this limiter.
    pub async fn acquire(&self) {
        let _turn = self.queue.lock().await;
        loop {
            match self.take_or_wait() {
                None => return,
                Some(wait) => {
                    debug!(
                        limiter = %self.name,
                        wait_ms = wait.as_millis() as u64,
                        "Rate limit reached, waiting for refill"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Take a token only if one is available now and nobody is queued.
    pub fn try_acquire(&self) -> bool {
        let Ok(_turn) = self.queue.try_lock() else {
            return false;
        };
        self.take_or_wait().is_none()
    }

    /// Tokens currently in the bucket, after refill.
    pub fn available_tokens(&self) -> f64 {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, Instant::now());
        bucket.tokens
    }

    /// Bucket capacity.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Refill rate in tokens per second.
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Identity this limiter was created for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Grant a token, or report how long until one is available.
    fn take_or_wait(&self) -> Option<Duration> {
        let mut bucket = self.bucket.lock();
        let now = Instant::now();
        self.refill(&mut bucket, now);

        if bucket.tokens + TOKEN_EPSILON >= 1.0 {
            bucket.tokens = (bucket.tokens - 1.0).max(0.0);
            bucket.last_grant = now;
            None
        } else {
            let missing = 1.0 - bucket.tokens;
            Some(Duration::try_from_secs_f64(missing / self.refill_rate).unwrap_or(Duration::MAX))
        }
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity);
        if now > bucket.last_refill {
            bucket.last_refill = now;
        }
    }

    /// Idle and back at full capacity, so dropping it loses no state.
    fn is_idle_full(&self, now: Instant, max_idle: Duration) -> bool {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket, now);
        now.saturating_duration_since(bucket.last_grant) >= max_idle
            && bucket.tokens >= self.capacity
    }
}

/// Whether callers of one skill share a bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketScope {
    /// One bucket per skill, shared by every user.
    #[default]
    PerSkill,
    /// One bucket per skill and credential owner.
    PerCredential,
}

/// Identity a bucket is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BudgetKey {
    /// Skill the budget belongs to.
    pub skill_id: String,
    /// Credential owner, only under [`BucketScope::PerCredential`].
    pub owner: Option<String>,
}

impl std::fmt::Display for BudgetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.owner {
            Some(owner) => write!(f, "{}/{}", self.skill_id, owner),
            None => write!(f, "{}", self.skill_id),
        }
    }
}

/// Owns every per-skill bucket for the lifetime of the process.
///
/// The map lock is only held to look up or insert a limiter, never while a
/// caller waits, so one skill's exhausted budget cannot delay another's.
pub struct RateLimiterRegistry {
    scope: BucketScope,
    limiters: Mutex<HashMap<BudgetKey, Arc<RateLimiter>>>,
}

impl RateLimiterRegistry {
    /// Create an empty registry with the given scope.
    pub fn new(scope: BucketScope) -> Self {
        Self {
            scope,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Configured scope.
    pub fn scope(&self) -> BucketScope {
        self.scope
    }

    /// Key for a call to `skill_id` made with credentials owned by `owner`.
    pub fn key_for(&self, skill_id: &str, owner: Option<&str>) -> BudgetKey {
        BudgetKey {
            skill_id: skill_id.to_string(),
            owner: match self.scope {
                BucketScope::PerSkill => None,
                BucketScope::PerCredential => owner.map(str::to_string),
            },
        }
    }

    /// The limiter for this identity, created on first use.
    pub fn limiter(
        &self,
        skill_id: &str,
        owner: Option<&str>,
        limits: &RateLimits,
    ) -> SkillBridgeResult<Arc<RateLimiter>> {
        let key = self.key_for(skill_id, owner);
        let mut limiters = self.limiters.lock();
        if let Some(existing) = limiters.get(&key) {
            return Ok(existing.clone());
        }
        let limiter = Arc::new(RateLimiter::new(key.to_string(), limits)?);
        info!(
            budget = %key,
            burst = limits.burst_limit,
            refill_per_second = limits.refill_per_second(),
            "Created rate limit bucket"
        );
        limiters.insert(key, limiter.clone());
        Ok(limiter)
    }

    /// Look up an existing limiter.
    pub fn get(&self, key: &BudgetKey) -> Option<Arc<RateLimiter>> {
        self.limiters.lock().get(key).cloned()
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.limiters.lock().len()
    }

    /// `true` when no bucket exists yet.
    pub fn is_empty(&self) -> bool {
        self.limiters.lock().is_empty()
    }

    /// Remove buckets idle for `max_idle` that are full and not in use.
    /// Returns how many were dropped.
    pub fn cleanup(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut limiters = self.limiters.lock();
        let before = limiters.len();
        limiters.retain(|_, l| Arc::strong_count(l) > 1 || !l.is_idle_full(now, max_idle));
        before - limiters.len()
    }
}
