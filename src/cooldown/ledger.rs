use crate::config::CooldownConfig;
use crate::cooldown::store::{RequestAttempt, UserCooldownRecord, UserStore};
use crate::cooldown::Identity;
use crate::error::StorageError;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::debug;

/// Cooldown periods per user tier
#[derive(Debug, Clone, Copy)]
pub struct CooldownPeriods {
    pub regular: Duration,
    pub supporter: Duration,
}

impl CooldownPeriods {
    pub fn from_config(config: &CooldownConfig) -> Self {
        Self {
            regular: Duration::milliseconds(config.regular_ms as i64),
            supporter: Duration::milliseconds(config.supporter_ms as i64),
        }
    }

    /// Effective period for a record, by supporter tier
    pub fn for_record(&self, record: &UserCooldownRecord) -> Duration {
        if record.is_supporter {
            self.supporter
        } else {
            self.regular
        }
    }
}

/// Outcome of an atomic eligibility check
#[derive(Debug, Clone)]
pub enum CooldownDecision {
    /// Timer stamped; the command may proceed
    Eligible(UserCooldownRecord),
    /// Still cooling down; the timer was not touched
    OnCooldown {
        record: UserCooldownRecord,
        retry_after: Duration,
    },
}

/// Per-user last-command ledger with supporter/regular tiering.
///
/// All decisions go through the backing store's per-identity critical
/// section; storage failures propagate to the caller as request failures.
pub struct CooldownLedger {
    store: Arc<dyn UserStore>,
    periods: CooldownPeriods,
}

impl CooldownLedger {
    pub fn new(store: Arc<dyn UserStore>, config: &CooldownConfig) -> Self {
        Self {
            store,
            periods: CooldownPeriods::from_config(config),
        }
    }

    pub fn periods(&self) -> CooldownPeriods {
        self.periods
    }

    /// Fetch or lazily create the record for an identity
    pub async fn get_or_create(
        &self,
        identity: &Identity,
    ) -> Result<UserCooldownRecord, StorageError> {
        self.store.get_or_create(identity).await
    }

    /// Read-only check: is the identity inside its cooldown window at `now`?
    pub async fn is_on_cooldown(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let record = self.store.get_or_create(identity).await?;
        Ok(record.cooldown_remaining(now, self.periods).is_some())
    }

    /// Atomic check-and-stamp: exactly one of two concurrent attempts for
    /// the same identity inside a fresh window can come back `Eligible`.
    pub async fn begin_request(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<CooldownDecision, StorageError> {
        match self
            .store
            .try_record_request(identity, now, self.periods)
            .await?
        {
            RequestAttempt::Recorded(record) => {
                debug!(
                    identity = identity.key(),
                    user_id = record.user_id,
                    "Cooldown timer stamped"
                );
                Ok(CooldownDecision::Eligible(record))
            }
            RequestAttempt::OnCooldown {
                record,
                retry_after,
            } => {
                debug!(
                    identity = identity.key(),
                    user_id = record.user_id,
                    retry_after_ms = retry_after.num_milliseconds(),
                    "Attempt rejected: still on cooldown"
                );
                Ok(CooldownDecision::OnCooldown {
                    record,
                    retry_after,
                })
            }
        }
    }

    /// Unconditionally stamp the request timer
    pub async fn record_request(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<UserCooldownRecord, StorageError> {
        self.store.record_request(identity, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CooldownConfig;
    use crate::cooldown::store::MemoryUserStore;
    use chrono::TimeZone;

    fn ledger() -> CooldownLedger {
        CooldownLedger::new(
            Arc::new(MemoryUserStore::new()),
            &CooldownConfig {
                regular_ms: 120_000,
                supporter_ms: 60_000,
            },
        )
    }

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + millis).unwrap()
    }

    fn identity(name: &str) -> Identity {
        Identity::parse(name).unwrap()
    }

    #[tokio::test]
    async fn test_never_requested_is_not_on_cooldown() {
        let ledger = ledger();
        assert!(!ledger
            .is_on_cooldown(&identity("fresh"), at(0))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_regular_window_boundaries() {
        let ledger = ledger();
        let user = identity("regular");

        ledger.record_request(&user, at(0)).await.unwrap();

        assert!(ledger.is_on_cooldown(&user, at(119_999)).await.unwrap());
        assert!(!ledger.is_on_cooldown(&user, at(120_000)).await.unwrap());
        assert!(!ledger.is_on_cooldown(&user, at(120_001)).await.unwrap());
    }

    #[tokio::test]
    async fn test_supporter_window_boundaries() {
        let ledger = ledger();
        let user = identity("patron");

        ledger.store.set_supporter(&user, true).await.unwrap();
        ledger.record_request(&user, at(0)).await.unwrap();

        assert!(ledger.is_on_cooldown(&user, at(59_999)).await.unwrap());
        assert!(!ledger.is_on_cooldown(&user, at(60_000)).await.unwrap());
    }

    #[tokio::test]
    async fn test_begin_request_rejection_keeps_timer() {
        let ledger = ledger();
        let user = identity("steady");

        let decision = ledger.begin_request(&user, at(0)).await.unwrap();
        assert!(matches!(decision, CooldownDecision::Eligible(_)));

        let decision = ledger.begin_request(&user, at(5_000)).await.unwrap();
        match decision {
            CooldownDecision::OnCooldown {
                record,
                retry_after,
            } => {
                assert_eq!(record.last_request_at, Some(at(0)));
                assert_eq!(retry_after, Duration::milliseconds(115_000));
            }
            other => panic!("expected OnCooldown, got {:?}", other),
        }

        // The rejected attempt did not restart the window
        assert!(!ledger.is_on_cooldown(&user, at(120_000)).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_begin_request_single_winner() {
        let ledger = Arc::new(ledger());
        let now = at(0);

        let a = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                ledger.begin_request(&identity("contended"), now).await
            })
        };
        let b = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                ledger.begin_request(&identity("contended"), now).await
            })
        };

        let outcomes = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];
        let eligible = outcomes
            .iter()
            .filter(|d| matches!(d, CooldownDecision::Eligible(_)))
            .count();
        assert_eq!(eligible, 1);
    }
}
