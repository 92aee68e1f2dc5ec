//! Member fetch orchestration and name lookup.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::api::{ApiError, FeedClient};
use crate::cache::{member_key, CacheStore, CachedData, TtlClass};
use crate::models::{Generation, Member};

use super::LoadSource;

/// Shown for member codes missing from the directory.
pub const UNKNOWN_MEMBER_NAME: &str = "不明";

#[derive(Debug)]
pub struct MemberLoad {
    pub members: Vec<Member>,
    pub source: LoadSource,
    pub last_updated: Option<DateTime<Utc>>,
    pub error: Option<ApiError>,
}

pub struct MemberService {
    client: FeedClient,
    cache: Arc<CacheStore>,
}

impl MemberService {
    pub fn new(client: FeedClient, cache: Arc<CacheStore>) -> Self {
        Self { client, cache }
    }

    /// Valid cached member list, if any.
    pub fn peek_cached(&self) -> Option<Vec<Member>> {
        self.cache
            .get_stale::<Vec<Member>>(&member_key())
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.data)
    }

    /// Cached member list whether or not it has expired.
    pub fn cached_entry(&self) -> Option<CachedData<Vec<Member>>> {
        self.cache.get_stale(&member_key())
    }

    /// Cache first, then network. `force` skips the cache lookup.
    ///
    /// Returns `Err` only when the fetch failed and nothing is cached.
    pub async fn get_members(&self, force: bool) -> Result<MemberLoad, ApiError> {
        let key = member_key();
        let cached = self.cache.get_stale::<Vec<Member>>(&key);

        if !force {
            if let Some(entry) = cached.as_ref().filter(|entry| !entry.is_expired()) {
                debug!(count = entry.data.len(), "Using cached members");
                return Ok(MemberLoad {
                    members: entry.data.clone(),
                    source: LoadSource::Cache,
                    last_updated: Some(entry.cached_at),
                    error: None,
                });
            }
        }

        match self.client.fetch_members().await {
            Ok(members) => {
                self.cache.set(&key, &members, TtlClass::Members);
                info!(count = members.len(), "Refreshed members");
                Ok(MemberLoad {
                    members,
                    source: LoadSource::Network,
                    last_updated: Some(Utc::now()),
                    error: None,
                })
            }
            Err(e) => match cached {
                Some(entry) => {
                    warn!(error = %e, age = %entry.age_display(), "Member fetch failed, serving cached data");
                    Ok(MemberLoad {
                        members: entry.data,
                        source: LoadSource::Stale,
                        last_updated: Some(entry.cached_at),
                        error: Some(e),
                    })
                }
                None => {
                    warn!(error = %e, "Member fetch failed with nothing cached");
                    Err(e)
                }
            },
        }
    }
}

/// Member lookup by code, built from a loaded member list.
#[derive(Debug, Clone, Default)]
pub struct MemberDirectory {
    members: Vec<Member>,
    by_code: HashMap<String, usize>,
}

impl MemberDirectory {
    pub fn new(members: Vec<Member>) -> Self {
        let by_code = members
            .iter()
            .enumerate()
            .map(|(index, member)| (member.code.clone(), index))
            .collect();
        Self { members, by_code }
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&Member> {
        self.by_code.get(code).map(|&index| &self.members[index])
    }

    pub fn name_of(&self, code: &str) -> &str {
        match self.get(code) {
            Some(member) if !member.name.is_empty() => &member.name,
            _ => UNKNOWN_MEMBER_NAME,
        }
    }

    /// Members who have not graduated, in feed order.
    pub fn active(&self) -> impl Iterator<Item = &Member> {
        self.members.iter().filter(|m| !m.is_graduated)
    }

    /// Members grouped by cohort, oldest first. Empty cohorts are omitted.
    pub fn by_generation(&self, include_graduated: bool) -> Vec<(Generation, Vec<&Member>)> {
        Generation::ALL
            .iter()
            .filter_map(|&generation| {
                let members: Vec<&Member> = self
                    .members
                    .iter()
                    .filter(|m| m.generation == generation && (include_graduated || !m.is_graduated))
                    .collect();
                (!members.is_empty()).then_some((generation, members))
            })
            .collect()
    }
}
