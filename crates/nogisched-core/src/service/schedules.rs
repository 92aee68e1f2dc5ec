//! Schedule fetch orchestration.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::api::{ApiError, FeedClient};
use crate::cache::{schedule_key, CacheStore, CachedData, TtlClass};
use crate::models::{Schedule, YearMonth};

use super::{LoadSource, RateGuard};

/// Why a refresh was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// First display of a month
    Initial,
    /// The app came back to the foreground; still subject to the rate guard
    Foreground,
    /// Explicit user retry; bypasses the rate guard
    Forced,
}

/// Result of `ScheduleService::get_schedules`.
///
/// A failed fetch with cached data still produces a load: `schedules` holds
/// the stale entry and `error` says why it could not be refreshed.
#[derive(Debug)]
pub struct ScheduleLoad {
    pub year_month: YearMonth,
    pub schedules: Vec<Schedule>,
    pub source: LoadSource,
    /// When `schedules` was fetched
    pub last_updated: Option<DateTime<Utc>>,
    pub error: Option<ApiError>,
}

impl ScheduleLoad {
    fn from_entry(year_month: YearMonth, entry: CachedData<Vec<Schedule>>, source: LoadSource) -> Self {
        Self {
            year_month,
            schedules: entry.data,
            source,
            last_updated: Some(entry.cached_at),
            error: None,
        }
    }
}

pub struct ScheduleService {
    client: FeedClient,
    cache: Arc<CacheStore>,
    guard: RateGuard,
}

impl ScheduleService {
    pub fn new(client: FeedClient, cache: Arc<CacheStore>) -> Self {
        Self::with_guard(client, cache, RateGuard::default())
    }

    pub fn with_guard(client: FeedClient, cache: Arc<CacheStore>, guard: RateGuard) -> Self {
        Self { client, cache, guard }
    }

    /// Non-expired cached schedules for `ym`, for immediate display.
    ///
    /// Unlike `CacheStore::get` this never deletes an expired entry; it is
    /// kept for the stale fallback of the refresh that usually follows.
    pub fn peek_cached(&self, ym: YearMonth) -> Option<Vec<Schedule>> {
        self.cache
            .get_stale::<Vec<Schedule>>(&schedule_key(ym))
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.data)
    }

    /// Cached entry for `ym` whether or not it has expired. Used when the
    /// network must not be touched.
    pub fn cached_entry(&self, ym: YearMonth) -> Option<CachedData<Vec<Schedule>>> {
        self.cache.get_stale(&schedule_key(ym))
    }

    /// When the cached schedules for `ym` were fetched, expired or not.
    pub fn last_updated(&self, ym: YearMonth) -> Option<DateTime<Utc>> {
        self.cache.cached_at(&schedule_key(ym))
    }

    /// Load schedules for `ym`, refreshing from the network unless a
    /// successful fetch within the guard window makes it redundant.
    ///
    /// Returns `Err` only when the fetch failed and nothing is cached.
    pub async fn get_schedules(
        &self,
        ym: YearMonth,
        trigger: RefreshTrigger,
    ) -> Result<ScheduleLoad, ApiError> {
        let key = schedule_key(ym);
        let cached = self.cache.get_stale::<Vec<Schedule>>(&key);

        if trigger != RefreshTrigger::Forced && self.guard.is_fresh(&key) {
            if let Some(entry) = cached.as_ref().filter(|entry| !entry.is_expired()) {
                debug!(month = %ym, ?trigger, "Fetched recently, using cached schedules");
                return Ok(ScheduleLoad::from_entry(ym, entry.clone(), LoadSource::Cache));
            }
        }

        match self.client.fetch_schedules(ym).await {
            Ok(schedules) => {
                self.cache.set(&key, &schedules, TtlClass::Schedules);
                self.guard.record_success(&key);
                info!(month = %ym, count = schedules.len(), ?trigger, "Refreshed schedules");
                Ok(ScheduleLoad {
                    year_month: ym,
                    schedules,
                    source: LoadSource::Network,
                    last_updated: Some(Utc::now()),
                    error: None,
                })
            }
            Err(e) => match cached {
                Some(entry) => {
                    warn!(month = %ym, error = %e, age = %entry.age_display(), "Schedule fetch failed, serving cached data");
                    let mut load = ScheduleLoad::from_entry(ym, entry, LoadSource::Stale);
                    load.error = Some(e);
                    Ok(load)
                }
                None => {
                    warn!(month = %ym, error = %e, "Schedule fetch failed with nothing cached");
                    Err(e)
                }
            },
        }
    }
}
