//! Data models for schedule feed entities.
//!
//! This module contains the domain types handed to the presentation layer:
//!
//! - `Schedule`, `Category`: schedule entries and their fixed categories
//! - `Member`, `Generation`: member reference data and cohorts
//! - `YearMonth`: the month key used by the feed and the cache
//!
//! Feed payload shapes and the mappers into these types live in `wire`.

pub mod calendar;
pub mod member;
pub mod schedule;
pub mod wire;

pub use calendar::YearMonth;
pub use member::{Generation, Member};
pub use schedule::{parse_clock, Category, ClockTime, Schedule};
