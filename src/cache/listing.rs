use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use super::clock::Clock;
use crate::tushare::{QueryEnvelope, QueryRequest, Row, TushareApi};

const DEFAULT_LISTING_TTL_HOURS: i64 = 6;

pub const LISTING_API: &str = "stock_basic";
pub const LISTING_FIELDS: &[&str] = &[
    "ts_code",
    "symbol",
    "name",
    "area",
    "industry",
    "market",
    "exchange",
    "list_date",
];

#[derive(Debug, Clone)]
struct ListingEntry {
    rows: Arc<Vec<Row>>,
    fetched_at: DateTime<Utc>,
}

/// Outcome of the most recent upstream refresh, kept behind the refresh lock.
#[derive(Debug, Default)]
struct RefreshState {
    last_failure: Option<QueryEnvelope>,
}

/// Single-slot cache for the full listed-stock table.
pub struct ListingCache {
    api: Arc<dyn TushareApi>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    slot: RwLock<Option<ListingEntry>>,
    // Held for the duration of an upstream refresh
    refresh: Mutex<RefreshState>,
    // Bumped under `refresh` each time an upstream refresh completes
    generation: AtomicU64,
}

impl ListingCache {
    pub fn new(api: Arc<dyn TushareApi>, clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(api, clock, chrono::Duration::hours(DEFAULT_LISTING_TTL_HOURS))
    }

    pub fn with_ttl(api: Arc<dyn TushareApi>, clock: Arc<dyn Clock>, ttl: chrono::Duration) -> Self {
        Self {
            api,
            clock,
            ttl,
            slot: RwLock::new(None),
            refresh: Mutex::new(RefreshState::default()),
            generation: AtomicU64::new(0),
        }
    }

    fn listing_request() -> QueryRequest {
        QueryRequest::new(LISTING_API)
            .param("exchange", "")
            .param("list_status", "L")
            .fields(LISTING_FIELDS)
    }

    async fn fresh_rows(&self) -> Option<Arc<Vec<Row>>> {
        let slot = self.slot.read().await;
        let entry = slot.as_ref()?;
        let age = self.clock.now() - entry.fetched_at;
        (age < self.ttl).then(|| entry.rows.clone())
    }

    /// When the cached listing was fetched, if there is one.
    pub async fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.slot.read().await.as_ref().map(|e| e.fetched_at)
    }

    /// Return the listing rows, refreshing from upstream when the slot is
    /// empty or older than the TTL. A failed refresh leaves the slot as it
    /// was and hands back the failure envelope.
    ///
    /// Callers that queue behind an in-flight refresh share its outcome:
    /// they get the new rows or the same failure envelope, without another
    /// upstream call.
    pub async fn get_full_listing(&self) -> Result<Arc<Vec<Row>>, QueryEnvelope> {
        if let Some(rows) = self.fresh_rows().await {
            debug!(rows = rows.len(), "Listing cache hit");
            return Ok(rows);
        }

        let seen = self.generation.load(Ordering::Acquire);
        let mut state = self.refresh.lock().await;

        // Another task may have refreshed while we waited
        if let Some(rows) = self.fresh_rows().await {
            debug!(rows = rows.len(), "Listing refreshed by concurrent caller");
            return Ok(rows);
        }
        if self.generation.load(Ordering::Acquire) != seen
            && let Some(failure) = &state.last_failure
        {
            debug!("Listing refresh failed for concurrent caller, sharing its error");
            return Err(failure.clone());
        }

        debug!("Listing cache miss, fetching from upstream");
        let envelope = self.api.query(Self::listing_request()).await;
        let outcome = if envelope.is_ok() {
            let rows = Arc::new(envelope.rows);
            let fetched_at = self.clock.now();
            *self.slot.write().await = Some(ListingEntry {
                rows: rows.clone(),
                fetched_at,
            });
            info!(rows = rows.len(), %fetched_at, "Listing cache refreshed");
            state.last_failure = None;
            Ok(rows)
        } else {
            state.last_failure = Some(envelope.clone());
            Err(envelope)
        };
        self.generation.fetch_add(1, Ordering::Release);

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use crate::tushare::MockTushareApi;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn listing_envelope() -> QueryEnvelope {
        QueryEnvelope::success(
            LISTING_API,
            vec!["ts_code".to_string(), "name".to_string()],
            vec![
                Row::new().with("ts_code", "000001.SZ").with("name", "平安银行"),
                Row::new().with("ts_code", "600519.SH").with("name", "贵州茅台"),
            ],
            None,
        )
    }

    fn start_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap(),
        ))
    }

    fn cache_with(api: MockTushareApi, clock: Arc<ManualClock>) -> ListingCache {
        ListingCache::new(Arc::new(api), clock)
    }

    #[tokio::test]
    async fn test_second_fetch_within_ttl_is_served_from_cache() {
        let mut api = MockTushareApi::new();
        api.expect_query()
            .times(1)
            .returning(|_| listing_envelope());
        let clock = start_clock();
        let cache = cache_with(api, clock.clone());

        let first = cache.get_full_listing().await.unwrap();
        clock.advance(chrono::Duration::hours(5) + chrono::Duration::minutes(59));
        let second = cache.get_full_listing().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_after_ttl_refreshes_once() {
        let mut api = MockTushareApi::new();
        api.expect_query()
            .times(2)
            .returning(|_| listing_envelope());
        let clock = start_clock();
        let cache = cache_with(api, clock.clone());

        let first = cache.get_full_listing().await.unwrap();
        clock.advance(chrono::Duration::hours(6));
        let second = cache.get_full_listing().await.unwrap();
        let third = cache.get_full_listing().await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&second, &third));
        assert_eq!(cache.fetched_at().await, Some(clock.now()));
    }

    #[tokio::test]
    async fn test_listing_request_shape() {
        let mut api = MockTushareApi::new();
        api.expect_query()
            .withf(|request| {
                request.api_name == "stock_basic"
                    && request.params.get("exchange") == Some(&serde_json::json!(""))
                    && request.params.get("list_status") == Some(&serde_json::json!("L"))
                    && request.fields.as_deref()
                        == Some("ts_code,symbol,name,area,industry,market,exchange,list_date")
                    && request.token.is_none()
            })
            .times(1)
            .returning(|_| listing_envelope());

        let cache = cache_with(api, start_clock());
        assert!(cache.get_full_listing().await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_entry() {
        let mut api = MockTushareApi::new();
        let mut seq = mockall::Sequence::new();
        api.expect_query()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| listing_envelope());
        api.expect_query()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| QueryEnvelope::failure(LISTING_API, "Tushare transport error: refused"));
        let clock = start_clock();
        let cache = cache_with(api, clock.clone());

        cache.get_full_listing().await.unwrap();
        let first_fetch = cache.fetched_at().await;
        clock.advance(chrono::Duration::hours(7));

        let failure = cache.get_full_listing().await.unwrap_err();
        assert_eq!(
            failure.error.as_deref(),
            Some("Tushare transport error: refused")
        );
        assert!(failure.rows.is_empty());
        assert_eq!(cache.fetched_at().await, first_fetch);
    }

    #[tokio::test]
    async fn test_failed_first_fetch_leaves_cache_empty() {
        let mut api = MockTushareApi::new();
        api.expect_query()
            .times(2)
            .returning(|_| QueryEnvelope::failure(LISTING_API, "no token"));
        let cache = cache_with(api, start_clock());

        assert!(cache.get_full_listing().await.is_err());
        assert!(cache.fetched_at().await.is_none());
        // Nothing cached, so the next call goes upstream again
        assert!(cache.get_full_listing().await.is_err());
    }

    struct SlowApi {
        calls: AtomicUsize,
        failing: bool,
    }

    impl SlowApi {
        fn new(failing: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failing,
            })
        }
    }

    #[async_trait]
    impl TushareApi for SlowApi {
        async fn query(&self, _request: QueryRequest) -> QueryEnvelope {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.failing {
                QueryEnvelope::failure(LISTING_API, "Tushare request timed out")
            } else {
                listing_envelope()
            }
        }
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_refresh() {
        let api = SlowApi::new(false);
        let cache = Arc::new(ListingCache::new(api.clone(), start_clock()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_full_listing().await })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_failed_refresh() {
        let api = SlowApi::new(true);
        let cache = Arc::new(ListingCache::new(api.clone(), start_clock()));

        let tasks: Vec<_> = (0..5)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_full_listing().await })
            })
            .collect();

        for task in tasks {
            let failure = task.await.unwrap().unwrap_err();
            assert_eq!(failure.error.as_deref(), Some("Tushare request timed out"));
            assert!(failure.rows.is_empty());
        }
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        assert!(cache.fetched_at().await.is_none());

        // A caller arriving after the failure settles tries upstream again
        assert!(cache.get_full_listing().await.is_err());
        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
    }
}
