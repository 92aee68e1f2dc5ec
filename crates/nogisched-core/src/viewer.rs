//! Viewer state for a front end.
//!
//! `Viewer` owns what a schedule screen needs: the selected month, loaded
//! schedules per month, the member directory and the filter selection.
//! Cached data is shown at once and refreshed in background tasks whose
//! results come back over an MPSC channel and are applied by
//! `check_background_tasks`. Results carry their month, so a slow response
//! for a month the user has already left lands in that month's state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::api::ApiError;
use crate::filter::{filter_schedules, FilterState};
use crate::models::{Generation, Member, Schedule, YearMonth};
use crate::service::{
    MemberDirectory, MemberLoad, MemberService, RefreshTrigger, ScheduleLoad, ScheduleService,
};
use crate::settings::SettingsStore;

/// Channel buffer size for background task results
const CHANNEL_BUFFER_SIZE: usize = 32;

/// Results sent back from background refresh tasks.
enum RefreshResult {
    Schedules(YearMonth, Result<ScheduleLoad, ApiError>),
    Members(Result<MemberLoad, ApiError>),
}

/// What the viewer knows about one month.
#[derive(Debug, Clone, Default)]
pub struct MonthState {
    pub schedules: Vec<Schedule>,
    pub is_loading: bool,
    /// Last refresh failure, shown next to whatever data is available
    pub error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    pending: usize,
}

impl MonthState {
    fn start_request(&mut self) {
        self.pending += 1;
        self.is_loading = true;
        self.error = None;
    }

    fn finish_request(&mut self) {
        self.pending = self.pending.saturating_sub(1);
        self.is_loading = self.pending > 0;
    }
}

pub struct Viewer {
    schedule_service: Arc<ScheduleService>,
    member_service: Arc<MemberService>,

    current_month: YearMonth,
    months: HashMap<YearMonth, MonthState>,

    directory: MemberDirectory,
    pub members_loading: bool,
    pub members_error: Option<String>,

    pub filter: FilterState,

    in_flight: usize,
    refresh_rx: mpsc::Receiver<RefreshResult>,
    refresh_tx: mpsc::Sender<RefreshResult>,
}

impl Viewer {
    /// The filter starts from the settings' initial member selection.
    pub fn new(
        schedule_service: Arc<ScheduleService>,
        member_service: Arc<MemberService>,
        settings: &SettingsStore,
        month: YearMonth,
    ) -> Self {
        let (refresh_tx, refresh_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        Self {
            schedule_service,
            member_service,
            current_month: month,
            months: HashMap::new(),
            directory: MemberDirectory::default(),
            members_loading: false,
            members_error: None,
            filter: FilterState::with_members(settings.initial_member_filter()),
            in_flight: 0,
            refresh_rx,
            refresh_tx,
        }
    }

    pub fn current_month(&self) -> YearMonth {
        self.current_month
    }

    pub fn month_state(&self, ym: YearMonth) -> Option<&MonthState> {
        self.months.get(&ym)
    }

    pub fn current_state(&self) -> Option<&MonthState> {
        self.month_state(self.current_month)
    }

    pub fn members(&self) -> &MemberDirectory {
        &self.directory
    }

    /// Whether any background task has not reported back yet.
    pub fn is_busy(&self) -> bool {
        self.in_flight > 0
    }

    /// Switch to `ym` and load it. The rate guard keeps revisits cheap.
    pub fn select_month(&mut self, ym: YearMonth) {
        self.current_month = ym;
        self.refresh(RefreshTrigger::Initial);
    }

    pub fn next_month(&mut self) {
        self.select_month(self.current_month.next());
    }

    pub fn prev_month(&mut self) {
        self.select_month(self.current_month.prev());
    }

    /// Show cached schedules for the current month right away, then
    /// refresh them in the background.
    pub fn refresh(&mut self, trigger: RefreshTrigger) {
        let ym = self.current_month;
        let service = Arc::clone(&self.schedule_service);

        let state = self.months.entry(ym).or_default();
        if state.schedules.is_empty() {
            if let Some(cached) = service.peek_cached(ym) {
                debug!(month = %ym, count = cached.len(), "Showing cached schedules");
                state.schedules = cached;
                state.last_updated = service.last_updated(ym);
            }
        }
        state.start_request();

        let tx = self.refresh_tx.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            let load = service.get_schedules(ym, trigger).await;
            Self::send_result(&tx, RefreshResult::Schedules(ym, load)).await;
        });
    }

    /// Fill the current month from the cache only, expired entries included.
    /// Returns false when nothing is cached.
    pub fn load_cached(&mut self) -> bool {
        let ym = self.current_month;
        let Some(entry) = self.schedule_service.cached_entry(ym) else {
            return false;
        };
        let state = self.months.entry(ym).or_default();
        state.schedules = entry.data;
        state.last_updated = Some(entry.cached_at);

        if let Some(entry) = self.member_service.cached_entry() {
            self.directory = MemberDirectory::new(entry.data);
        }
        true
    }

    /// Load the member directory: cached list first, then the background fetch.
    pub fn load_members(&mut self, force: bool) {
        if self.directory.is_empty() {
            if let Some(cached) = self.member_service.peek_cached() {
                self.directory = MemberDirectory::new(cached);
            }
        }
        self.members_loading = true;
        self.members_error = None;

        let service = Arc::clone(&self.member_service);
        let tx = self.refresh_tx.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            let load = service.get_members(force).await;
            Self::send_result(&tx, RefreshResult::Members(load)).await;
        });
    }

    /// Helper to send refresh results, logging any channel errors
    async fn send_result(tx: &mpsc::Sender<RefreshResult>, result: RefreshResult) {
        if tx.send(result).await.is_err() {
            error!("Failed to send refresh result - channel closed");
        }
    }

    /// Apply every finished background result. Returns how many were applied.
    pub fn check_background_tasks(&mut self) -> usize {
        let mut results = Vec::new();
        while let Ok(result) = self.refresh_rx.try_recv() {
            results.push(result);
        }

        let count = results.len();
        for result in results {
            self.process_refresh_result(result);
        }
        count
    }

    /// Wait until every background task has reported back.
    pub async fn wait_for_background_tasks(&mut self) {
        while self.in_flight > 0 {
            match self.refresh_rx.recv().await {
                Some(result) => self.process_refresh_result(result),
                None => break,
            }
        }
    }

    fn process_refresh_result(&mut self, result: RefreshResult) {
        self.in_flight = self.in_flight.saturating_sub(1);

        match result {
            RefreshResult::Schedules(ym, result) => {
                let state = self.months.entry(ym).or_default();
                state.finish_request();
                match result {
                    Ok(load) => {
                        info!(month = %ym, count = load.schedules.len(), source = ?load.source, "Schedules loaded");
                        state.schedules = load.schedules;
                        state.last_updated = load.last_updated;
                        state.error = load.error.map(|e| e.to_string());
                    }
                    Err(e) => {
                        // Keep whatever is displayed; report the failure
                        state.error = Some(e.to_string());
                    }
                }
            }
            RefreshResult::Members(result) => {
                self.members_loading = false;
                match result {
                    Ok(load) => {
                        self.directory = MemberDirectory::new(load.members);
                        self.members_error = load.error.map(|e| e.to_string());
                    }
                    Err(e) => self.members_error = Some(e.to_string()),
                }
            }
        }
    }

    /// Members grouped by generation. Graduates are listed only while the
    /// filter's graduated toggle is on.
    pub fn member_groups(&self) -> Vec<(Generation, Vec<&Member>)> {
        self.directory.by_generation(self.filter.show_graduated())
    }

    /// Current month's schedules after filtering, in feed order.
    pub fn visible_schedules(&self) -> Vec<&Schedule> {
        match self.current_state() {
            Some(state) => filter_schedules(&state.schedules, &self.filter.options()),
            None => Vec::new(),
        }
    }
}
