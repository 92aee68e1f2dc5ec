//! nogisched core - data layer for the Nogizaka46 schedule feed.
//!
//! - `api`: JSONP transport and the feed client
//! - `cache`: file-backed cache with per-entry expiry
//! - `models`: domain types and feed mappers
//! - `service`: cache-first fetch orchestration with stale fallback
//! - `filter`: schedule filtering and the user's filter selection
//! - `settings`: theme and favorites, mirrored and durable
//! - `export`: iCalendar output
//! - `viewer`: state holder tying the above together for a front end

pub mod api;
pub mod cache;
pub mod config;
pub mod export;
pub mod filter;
pub mod models;
pub mod service;
pub mod settings;
pub mod utils;
pub mod viewer;

pub use api::{ApiError, FeedClient};
pub use cache::CacheStore;
pub use config::Config;
pub use filter::{filter_schedules, FilterOptions, FilterState};
pub use models::{Category, Generation, Member, Schedule, YearMonth};
pub use service::{MemberService, RefreshTrigger, ScheduleService};
pub use settings::{SettingsStore, Theme};
pub use viewer::{MonthState, Viewer};
