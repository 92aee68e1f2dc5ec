//! Fetch orchestration: cache first, network refresh, stale fallback.
//!
//! Services own their state (rate guard, member directory) and are
//! constructed once at startup, then shared by reference.

pub mod guard;
pub mod members;
pub mod schedules;

pub use guard::{RateGuard, MIN_REFRESH_INTERVAL};
pub use members::{MemberDirectory, MemberLoad, MemberService, UNKNOWN_MEMBER_NAME};
pub use schedules::{RefreshTrigger, ScheduleLoad, ScheduleService};

/// Where a loaded list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// Fetched just now
    Network,
    /// A valid cache entry; no request was made
    Cache,
    /// An expired or superseded cache entry, served because the fetch failed
    Stale,
}
