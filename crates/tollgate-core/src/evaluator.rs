//! Fixed-window rate limit evaluation.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::RuntimeContext;
use crate::error::RateLimitError;
use crate::keys::RequestKeys;
use crate::policy::Policy;
use crate::ports::{CounterKey, CounterStore, CounterWindow, StoreError};
use crate::settings::LimiterSettings;

/// Outcome of one rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The policy did not apply to this request; nothing was counted.
    Exempt,
    Allowed {
        remaining: i64,
        reset_at: i64,
    },
    Denied {
        /// Unix timestamp at which the window resets.
        reset_at: i64,
    },
}

impl Decision {
    pub fn is_denied(&self) -> bool {
        matches!(self, Decision::Denied { .. })
    }
}

/// Checks policies against the configured counter store.
///
/// Constructed once at startup with resolved settings and the runtime
/// context; shared across requests behind an `Arc`.
pub struct RateLimitEvaluator {
    store: Arc<dyn CounterStore>,
    settings: LimiterSettings,
    context: RuntimeContext,
}

impl RateLimitEvaluator {
    pub fn new(
        store: Arc<dyn CounterStore>,
        settings: LimiterSettings,
        context: RuntimeContext,
    ) -> Self {
        Self {
            store,
            settings,
            context,
        }
    }

    pub fn settings(&self) -> &LimiterSettings {
        &self.settings
    }

    pub fn default_policy(&self) -> Option<&Policy> {
        self.settings.default_policy.as_ref()
    }

    /// Check `policy` for the current request and count it on allow.
    pub async fn check(
        &self,
        policy: &Policy,
        keys: &RequestKeys,
        route_path: &str,
    ) -> Result<Decision, RateLimitError> {
        self.check_at(policy, keys, route_path, chrono::Utc::now().timestamp())
            .await
    }

    /// [`check`](Self::check) with an explicit clock, so window expiry is
    /// testable without sleeping.
    pub async fn check_at(
        &self,
        policy: &Policy,
        keys: &RequestKeys,
        route_path: &str,
        now: i64,
    ) -> Result<Decision, RateLimitError> {
        // Limits apply only to live served requests.
        if !self.context.limits_apply() {
            return Ok(Decision::Exempt);
        }

        if policy.is_noop() {
            return Ok(Decision::Exempt);
        }

        let exclude_tests = policy.exclude_tests.unwrap_or(self.settings.exclude_tests);
        if self.context.test_run && exclude_tests {
            return Ok(Decision::Exempt);
        }

        let key_types = policy.key_types();
        let Some((key_type, key_value)) = keys.select(&key_types) else {
            return Err(RateLimitError::NoClientKey);
        };
        let key = CounterKey::new(key_type, key_value, route_path);

        let window = match self.store.find_active(&key, now).await {
            Ok(found) => found,
            Err(StoreError::Unavailable(reason)) => {
                warn!(%reason, "counter store unavailable, request proceeds unlimited");
                return Ok(Decision::Exempt);
            }
            Err(e) => return Err(e.into()),
        };

        let mut window = window.unwrap_or_else(|| CounterWindow::opening(now + policy.within));
        window.current += 1;

        if window.current > policy.limit {
            // The over-limit count is not persisted: denied retries neither
            // advance the window nor accumulate past limit + 1.
            debug!(
                key_type = %key.key_type,
                path = %key.path,
                reset_at = window.expires,
                "rate limit exceeded"
            );
            return Ok(Decision::Denied {
                reset_at: window.expires,
            });
        }

        match self.store.save(&key, &window).await {
            Ok(()) => {}
            Err(StoreError::Unavailable(reason)) => {
                warn!(%reason, "counter store unavailable, request not counted");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Decision::Allowed {
            remaining: policy.limit - window.current,
            reset_at: window.expires,
        })
    }

    /// Sweep expired counters from the store. Run at startup and on the
    /// cleanup schedule.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        self.store
            .purge_expired(chrono::Utc::now().timestamp())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// Minimal in-memory store for exercising the evaluator.
    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<HashMap<(String, String, String), CounterWindow>>,
        unavailable: bool,
    }

    impl MemoryStore {
        fn unavailable() -> Self {
            Self {
                unavailable: true,
                ..Self::default()
            }
        }

        async fn stored(&self, key: &CounterKey) -> Option<CounterWindow> {
            self.records.lock().await.get(&triple(key)).copied()
        }
    }

    fn triple(key: &CounterKey) -> (String, String, String) {
        (
            key.key_type.clone(),
            key.key_value.clone(),
            key.path.clone(),
        )
    }

    #[async_trait]
    impl CounterStore for MemoryStore {
        async fn find_active(
            &self,
            key: &CounterKey,
            now: i64,
        ) -> Result<Option<CounterWindow>, StoreError> {
            if self.unavailable {
                return Err(StoreError::Unavailable("table missing".to_string()));
            }
            let records = self.records.lock().await;
            Ok(records
                .get(&triple(key))
                .copied()
                .filter(|window| window.is_active(now)))
        }

        async fn save(&self, key: &CounterKey, window: &CounterWindow) -> Result<(), StoreError> {
            if self.unavailable {
                return Err(StoreError::Unavailable("table missing".to_string()));
            }
            self.records.lock().await.insert(triple(key), *window);
            Ok(())
        }

        async fn purge_expired(&self, now: i64) -> Result<u64, StoreError> {
            let mut records = self.records.lock().await;
            let before = records.len();
            records.retain(|_, window| window.is_active(now));
            Ok((before - records.len()) as u64)
        }
    }

    fn evaluator(store: Arc<MemoryStore>) -> RateLimitEvaluator {
        RateLimitEvaluator::new(store, LimiterSettings::default(), RuntimeContext::http())
    }

    fn ip_keys() -> RequestKeys {
        RequestKeys::with_ip("1.2.3.4")
    }

    #[tokio::test]
    async fn allows_first_n_then_denies_with_reset() {
        let store = Arc::new(MemoryStore::default());
        let eval = evaluator(store.clone());
        let policy = Policy::new(2, 60);
        let keys = ip_keys();

        let first = eval.check_at(&policy, &keys, "_a", 1000).await.unwrap();
        assert_eq!(
            first,
            Decision::Allowed {
                remaining: 1,
                reset_at: 1060
            }
        );

        let second = eval.check_at(&policy, &keys, "_a", 1010).await.unwrap();
        assert_eq!(
            second,
            Decision::Allowed {
                remaining: 0,
                reset_at: 1060
            }
        );

        let third = eval.check_at(&policy, &keys, "_a", 1020).await.unwrap();
        assert_eq!(third, Decision::Denied { reset_at: 1060 });
    }

    #[tokio::test]
    async fn denial_does_not_persist_the_overflow_count() {
        let store = Arc::new(MemoryStore::default());
        let eval = evaluator(store.clone());
        let policy = Policy::new(1, 60);
        let keys = ip_keys();
        let key = CounterKey::new("ip", "1.2.3.4", "_a");

        eval.check_at(&policy, &keys, "_a", 1000).await.unwrap();
        let denied = eval.check_at(&policy, &keys, "_a", 1001).await.unwrap();
        assert!(denied.is_denied());

        assert_eq!(store.stored(&key).await.unwrap().current, 1);
    }

    #[tokio::test]
    async fn window_restarts_after_expiry() {
        let store = Arc::new(MemoryStore::default());
        let eval = evaluator(store.clone());
        let policy = Policy::new(2, 60);
        let keys = ip_keys();

        eval.check_at(&policy, &keys, "_a", 1000).await.unwrap();
        eval.check_at(&policy, &keys, "_a", 1001).await.unwrap();
        let denied = eval.check_at(&policy, &keys, "_a", 1002).await.unwrap();
        assert!(denied.is_denied());

        // One second past expiry: fresh window, count restarts at 1.
        let restarted = eval.check_at(&policy, &keys, "_a", 1061).await.unwrap();
        assert_eq!(
            restarted,
            Decision::Allowed {
                remaining: 1,
                reset_at: 1121
            }
        );
    }

    #[tokio::test]
    async fn zero_limit_or_window_never_touches_storage() {
        let store = Arc::new(MemoryStore::unavailable());
        let eval = evaluator(store);
        let keys = ip_keys();

        let decision = eval
            .check_at(&Policy::new(0, 60), &keys, "_a", 1000)
            .await
            .unwrap();
        assert_eq!(decision, Decision::Exempt);

        let decision = eval
            .check_at(&Policy::new(5, 0), &keys, "_a", 1000)
            .await
            .unwrap();
        assert_eq!(decision, Decision::Exempt);
    }

    #[tokio::test]
    async fn test_traffic_bypasses_excluding_policies() {
        let store = Arc::new(MemoryStore::default());
        let eval = RateLimitEvaluator::new(
            store.clone(),
            LimiterSettings::default(),
            RuntimeContext::http().with_test_run(true),
        );

        let mut policy = Policy::new(1, 60);
        policy.exclude_tests = Some(true);
        let keys = ip_keys();

        for now in 0..5 {
            let decision = eval.check_at(&policy, &keys, "_a", now).await.unwrap();
            assert_eq!(decision, Decision::Exempt);
        }
    }

    #[tokio::test]
    async fn policy_inherits_exclude_tests_from_settings() {
        let store = Arc::new(MemoryStore::default());
        let settings = LimiterSettings {
            exclude_tests: true,
            ..LimiterSettings::default()
        };
        let eval = RateLimitEvaluator::new(
            store,
            settings,
            RuntimeContext::http().with_test_run(true),
        );

        let decision = eval
            .check_at(&Policy::new(1, 60), &ip_keys(), "_a", 1000)
            .await
            .unwrap();
        assert_eq!(decision, Decision::Exempt);
    }

    #[tokio::test]
    async fn test_traffic_still_counted_without_exclusion() {
        let store = Arc::new(MemoryStore::default());
        let eval = RateLimitEvaluator::new(
            store,
            LimiterSettings::default(),
            RuntimeContext::http().with_test_run(true),
        );
        let policy = Policy::new(1, 60);
        let keys = ip_keys();

        eval.check_at(&policy, &keys, "_a", 1000).await.unwrap();
        let denied = eval.check_at(&policy, &keys, "_a", 1001).await.unwrap();
        assert!(denied.is_denied());
    }

    #[tokio::test]
    async fn by_order_selects_first_key_with_value() {
        let store = Arc::new(MemoryStore::default());
        let eval = evaluator(store.clone());

        let mut policy = Policy::new(5, 60);
        policy.by = ["user", "ip"].into_iter().collect();

        let mut keys = ip_keys();
        keys.insert("user", "u-42");

        eval.check_at(&policy, &keys, "_a", 1000).await.unwrap();
        let user_key = CounterKey::new("user", "u-42", "_a");
        assert!(store.stored(&user_key).await.is_some());

        // Without a user value the selection falls back to ip.
        eval.check_at(&policy, &ip_keys(), "_a", 1000).await.unwrap();
        let ip_key = CounterKey::new("ip", "1.2.3.4", "_a");
        assert!(store.stored(&ip_key).await.is_some());
    }

    #[tokio::test]
    async fn unresolvable_key_is_a_fatal_error() {
        let store = Arc::new(MemoryStore::default());
        let eval = evaluator(store);

        let result = eval
            .check_at(&Policy::new(5, 60), &RequestKeys::new(), "_a", 1000)
            .await;
        assert!(matches!(result, Err(RateLimitError::NoClientKey)));
    }

    #[tokio::test]
    async fn unavailable_store_fails_open() {
        let store = Arc::new(MemoryStore::unavailable());
        let eval = evaluator(store);

        let decision = eval
            .check_at(&Policy::new(1, 60), &ip_keys(), "_a", 1000)
            .await
            .unwrap();
        assert_eq!(decision, Decision::Exempt);
    }

    #[tokio::test]
    async fn cli_and_background_contexts_never_count() {
        let store = Arc::new(MemoryStore::default());
        let policy = Policy::new(1, 60);
        let keys = ip_keys();

        for context in [RuntimeContext::cli(), RuntimeContext::background()] {
            let eval =
                RateLimitEvaluator::new(store.clone(), LimiterSettings::default(), context);
            for now in 0..5 {
                let decision = eval.check_at(&policy, &keys, "_a", now).await.unwrap();
                assert_eq!(decision, Decision::Exempt);
            }
        }
    }

    #[tokio::test]
    async fn separate_paths_count_independently() {
        let store = Arc::new(MemoryStore::default());
        let eval = evaluator(store);
        let policy = Policy::new(1, 60);
        let keys = ip_keys();

        eval.check_at(&policy, &keys, "_a", 1000).await.unwrap();
        let other = eval.check_at(&policy, &keys, "_b", 1001).await.unwrap();
        assert!(!other.is_denied());
    }
}
