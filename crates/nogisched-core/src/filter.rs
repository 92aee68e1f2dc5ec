//! Schedule filtering.
//!
//! `filter_schedules` is pure and keeps input order. Dimensions combine with
//! AND, values within a dimension with OR:
//!
//! - members: passes when none are selected, when the schedule carries no
//!   member information, or when any selected member appears
//! - categories: passes when none are selected or the category is selected
//! - keyword: trimmed, case-insensitive substring of the title or of the
//!   description with markup removed
//!
//! `FilterState` is the user's current selection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Category, Schedule};
use crate::utils::{contains_ignore_case, strip_html};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct FilterOptions {
    pub member_codes: Vec<String>,
    pub categories: Vec<Category>,
    pub keyword: String,
}

impl FilterOptions {
    pub fn is_empty(&self) -> bool {
        self.member_codes.is_empty() && self.categories.is_empty() && self.keyword.trim().is_empty()
    }
}

fn matches_members(schedule: &Schedule, member_codes: &[String]) -> bool {
    member_codes.is_empty()
        || !schedule.has_member_info()
        || schedule.member_codes.iter().any(|code| member_codes.contains(code))
}

fn matches_category(schedule: &Schedule, categories: &[Category]) -> bool {
    categories.is_empty() || categories.contains(&schedule.category)
}

fn matches_keyword(schedule: &Schedule, keyword: &str) -> bool {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return true;
    }
    contains_ignore_case(&schedule.title, keyword)
        || schedule
            .description
            .as_deref()
            .map(|desc| contains_ignore_case(&strip_html(desc), keyword))
            .unwrap_or(false)
}

pub fn filter_schedules<'a>(schedules: &'a [Schedule], options: &FilterOptions) -> Vec<&'a Schedule> {
    schedules
        .iter()
        .filter(|s| matches_keyword(s, &options.keyword))
        .filter(|s| matches_members(s, &options.member_codes))
        .filter(|s| matches_category(s, &options.categories))
        .collect()
}

/// Group schedules by their `YYYY/MM/DD` date, dates ascending. Order within
/// a day is input order.
pub fn group_by_date<'a>(
    schedules: impl IntoIterator<Item = &'a Schedule>,
) -> Vec<(&'a str, Vec<&'a Schedule>)> {
    let mut days: BTreeMap<&'a str, Vec<&'a Schedule>> = BTreeMap::new();
    for schedule in schedules {
        days.entry(schedule.date.as_str()).or_default().push(schedule);
    }
    days.into_iter().collect()
}

/// The user's filter selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    selected_members: Vec<String>,
    selected_categories: Vec<Category>,
    keyword: String,
    show_graduated: bool,
}

impl FilterState {
    /// Start with `members` preselected (favorites, when auto-apply is on).
    pub fn with_members(members: Vec<String>) -> Self {
        Self {
            selected_members: members,
            ..Default::default()
        }
    }

    pub fn selected_members(&self) -> &[String] {
        &self.selected_members
    }

    pub fn selected_categories(&self) -> &[Category] {
        &self.selected_categories
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn show_graduated(&self) -> bool {
        self.show_graduated
    }

    pub fn toggle_member(&mut self, code: &str) {
        if let Some(pos) = self.selected_members.iter().position(|c| c == code) {
            self.selected_members.remove(pos);
        } else {
            self.selected_members.push(code.to_string());
        }
    }

    pub fn toggle_category(&mut self, category: Category) {
        if let Some(pos) = self.selected_categories.iter().position(|c| *c == category) {
            self.selected_categories.remove(pos);
        } else {
            self.selected_categories.push(category);
        }
    }

    pub fn toggle_show_graduated(&mut self) {
        self.show_graduated = !self.show_graduated;
    }

    pub fn set_keyword(&mut self, keyword: impl Into<String>) {
        self.keyword = keyword.into();
    }

    pub fn clear_members(&mut self) {
        self.selected_members.clear();
    }

    pub fn clear_categories(&mut self) {
        self.selected_categories.clear();
    }

    /// Clear members and categories. The keyword and graduated toggle stay.
    pub fn clear_all(&mut self) {
        self.clear_members();
        self.clear_categories();
    }

    pub fn has_active_filters(&self) -> bool {
        !self.selected_members.is_empty() || !self.selected_categories.is_empty()
    }

    pub fn options(&self) -> FilterOptions {
        FilterOptions {
            member_codes: self.selected_members.clone(),
            categories: self.selected_categories.clone(),
            keyword: self.keyword.clone(),
        }
    }

    pub fn apply<'a>(&self, schedules: &'a [Schedule]) -> Vec<&'a Schedule> {
        filter_schedules(schedules, &self.options())
    }
}
