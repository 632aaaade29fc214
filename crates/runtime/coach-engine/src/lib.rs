//! # Coach Engine
//!
//! The services behind every coach operation:
//!
//! - [`ProgressionService`]: XP, levels, streaks, achievements
//! - [`CreditService`]: accounts, balance, subscription status
//! - [`MeteringService`]: AI actions paid for with credits or the free allowance
//!
//! [`Engine::from_config`] wires them to the configured store backend, AI
//! gateway and rate limiter.

pub mod credits;
pub mod locks;
pub mod metering;
pub mod progression;

pub use credits::{BillingEvent, CreditService, MAX_GRANT};
pub use locks::KeyedLocks;
pub use metering::{MeteredAction, MeteredOutcome, MeteringService};
pub use progression::{ActivityKind, ProgressionService, StreakSummary, XpAward};

use coach_ai::{AiGateway, ChatCompletionsClient, UnconfiguredGateway};
use coach_config::{CoachConfig, StoreBackend};
use coach_core::{CreditAccount, Error, ProgressionState, Result};
use coach_ratelimit::RateLimiter;
use coach_store::{AuditSink, MemoryAuditLog, MemoryStore, MongoAuditLog, MongoStore, StateStore};
use std::sync::Arc;
use std::time::Duration;

/// Stores and collaborators the services run against
pub struct EngineParts {
    pub progression: Arc<dyn StateStore<ProgressionState>>,
    pub accounts: Arc<dyn StateStore<CreditAccount>>,
    pub audit: Arc<dyn AuditSink>,
    pub gateway: Arc<dyn AiGateway>,
    pub rate_limiter: Option<Arc<RateLimiter>>,
}

impl EngineParts {
    /// In-memory stores and audit log
    pub fn in_memory(gateway: Arc<dyn AiGateway>) -> Self {
        Self {
            progression: Arc::new(MemoryStore::new()),
            accounts: Arc::new(MemoryStore::new()),
            audit: Arc::new(MemoryAuditLog::new()),
            gateway,
            rate_limiter: None,
        }
    }
}

pub struct Engine {
    pub progression: ProgressionService,
    pub credits: CreditService,
    pub metering: MeteringService,
}

impl Engine {
    pub fn new(config: &CoachConfig, parts: EngineParts) -> Result<Self> {
        let mut metering = MeteringService::new(
            parts.accounts.clone(),
            parts.gateway,
            parts.audit,
            config.credits.cost_policy,
        );
        if let Some(limiter) = parts.rate_limiter {
            metering = metering.with_rate_limiter(limiter);
        }

        Ok(Self {
            progression: ProgressionService::new(parts.progression, config.xp.clone()),
            credits: CreditService::new(parts.accounts, config.default_credits()?),
            metering,
        })
    }

    /// Build from config: store backend, AI gateway, rate limiter
    pub async fn from_config(config: &CoachConfig) -> Result<Self> {
        let gateway: Arc<dyn AiGateway> = match ChatCompletionsClient::from_config(&config.ai) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                tracing::warn!(error = %e, "AI gateway unavailable; metered actions will fail");
                Arc::new(UnconfiguredGateway)
            }
        };

        let mut parts = match config.store.backend {
            StoreBackend::Memory => {
                tracing::debug!("using in-memory store");
                EngineParts::in_memory(gateway)
            }
            StoreBackend::Mongodb => {
                let uri = config
                    .store
                    .mongodb_uri
                    .as_deref()
                    .ok_or_else(|| Error::Config("mongodb backend requires store.mongodb_uri".to_string()))?;
                let database = coach_store::connect(uri, &config.store.database).await?;
                EngineParts {
                    progression: Arc::new(MongoStore::<ProgressionState>::new(&database)),
                    accounts: Arc::new(MongoStore::<CreditAccount>::new(&database)),
                    audit: Arc::new(MongoAuditLog::new(&database)),
                    gateway,
                    rate_limiter: None,
                }
            }
        };

        if config.rate_limit.enabled {
            parts.rate_limiter = Some(Arc::new(RateLimiter::new(
                Duration::from_secs(config.rate_limit.window_secs),
                config.rate_limit.max_requests,
                config.rate_limit.max_tracked_keys,
            )));
        }

        tracing::info!(
            backend = ?config.store.backend,
            cost_policy = %config.credits.cost_policy,
            gateway = parts.gateway.name(),
            "engine ready"
        );
        Self::new(config, parts)
    }
}
