//! nogisched - terminal viewer for the Nogizaka46 schedule feed.
//!
//! Fetches schedules and members through the feed's JSONP API, caches them
//! for offline use, and prints filtered month listings or exports them as
//! iCalendar files.

mod args;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use chrono::{Local, Utc};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nogisched_core::cache::CACHE_KEY_PREFIX;
use nogisched_core::export::{default_filename, generate_ical};
use nogisched_core::filter::group_by_date;
use nogisched_core::service::MemberDirectory;
use nogisched_core::utils::{format_age, truncate};
use nogisched_core::{
    CacheStore, Config, FeedClient, MemberService, RefreshTrigger, Schedule, ScheduleService,
    SettingsStore, Viewer, YearMonth,
};

use args::{Command, FavoritesAction, ScheduleQuery, USAGE};

/// Environment variable naming an additional log file
const LOG_FILE_ENV: &str = "NOGISCHED_LOG_FILE";

/// Longest title printed in listings, in characters
const MAX_TITLE_CHARS: usize = 60;

/// How many member names to print per schedule before summarizing
const MAX_LISTED_MEMBERS: usize = 4;

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr, filtered by `RUST_LOG` (default "warn"). When
/// `NOGISCHED_LOG_FILE` is set they are also appended to that file; the
/// returned guard flushes it on drop.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let log_file = std::env::var(LOG_FILE_ENV).ok().filter(|p| !p.trim().is_empty());
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let path = PathBuf::from(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "nogisched.log".into());
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .init();

    guard
}

/// Services shared by the commands.
struct Context {
    config: Config,
    cache: Arc<CacheStore>,
    settings: SettingsStore,
}

impl Context {
    async fn open() -> Result<Self> {
        let config = Config::load();
        let cache_dir = config.cache_dir()?;
        let cache = CacheStore::new(cache_dir.clone())
            .with_context(|| format!("Failed to open cache at {}", cache_dir.display()))?;

        let settings = SettingsStore::open(&Config::settings_dir()?);
        settings.reconcile().await;

        Ok(Self {
            config,
            cache: Arc::new(cache),
            settings,
        })
    }

    fn services(&self) -> Result<(Arc<ScheduleService>, Arc<MemberService>)> {
        let client = FeedClient::new(&self.config).context("Failed to create feed client")?;
        let schedules = ScheduleService::new(client.clone(), Arc::clone(&self.cache));
        let members = MemberService::new(client, Arc::clone(&self.cache));
        Ok((Arc::new(schedules), Arc::new(members)))
    }

    /// Load a month into a viewer, applying the query's filters on top of
    /// the saved favorites.
    async fn load_month(&self, query: &ScheduleQuery) -> Result<Viewer> {
        let (schedules, members) = self.services()?;
        let month = query.month.unwrap_or_else(YearMonth::current);
        let mut viewer = Viewer::new(schedules, members, &self.settings, month);

        if !query.members.is_empty() {
            viewer.filter.clear_members();
            for code in &query.members {
                viewer.filter.toggle_member(code);
            }
        }
        for category in &query.categories {
            viewer.filter.toggle_category(*category);
        }
        if let Some(keyword) = &query.keyword {
            viewer.filter.set_keyword(keyword.clone());
        }

        if query.offline {
            if !viewer.load_cached() {
                anyhow::bail!("No cached schedules for {}", month.display_long());
            }
        } else {
            let trigger = if query.refresh {
                RefreshTrigger::Forced
            } else {
                RefreshTrigger::Initial
            };
            viewer.refresh(trigger);
            viewer.load_members(false);
            viewer.wait_for_background_tasks().await;
        }

        Ok(viewer)
    }
}

fn member_summary(schedule: &Schedule, directory: &MemberDirectory) -> String {
    let names: Vec<&str> = schedule
        .member_codes
        .iter()
        .take(MAX_LISTED_MEMBERS)
        .map(|code| directory.name_of(code))
        .collect();
    let extra = schedule.member_codes.len().saturating_sub(MAX_LISTED_MEMBERS);
    if extra > 0 {
        format!("{} +{}", names.join(", "), extra)
    } else {
        names.join(", ")
    }
}

fn print_month(viewer: &Viewer) {
    let month = viewer.current_month();
    let Some(state) = viewer.current_state() else {
        return;
    };

    match state.last_updated {
        Some(at) => println!("{}  (updated {})", month.display_long(), format_age((Utc::now() - at).num_minutes())),
        None => println!("{}", month.display_long()),
    }
    if let Some(error) = &state.error {
        eprintln!("warning: could not refresh, showing saved data: {}", error);
    }
    if let Some(error) = &viewer.members_error {
        eprintln!("warning: member list may be out of date: {}", error);
    }

    let visible = viewer.visible_schedules();
    if visible.is_empty() {
        println!("  No schedules.");
        return;
    }

    for (date, schedules) in group_by_date(visible) {
        println!();
        println!("{}", date);
        for schedule in schedules {
            let mut line = format!(
                "  {:<12} [{}] {}",
                schedule.time_range_display(),
                schedule.category.label(),
                truncate(&schedule.title, MAX_TITLE_CHARS)
            );
            if schedule.has_member_info() {
                line.push_str(&format!("  ({})", member_summary(schedule, viewer.members())));
            }
            println!("{}", line);
        }
    }

    if viewer.filter.has_active_filters() {
        println!();
        println!("Filtered: {} of {} schedules", viewer.visible_schedules().len(), state.schedules.len());
    }
}

async fn run_schedules(ctx: &Context, query: &ScheduleQuery) -> Result<()> {
    let viewer = ctx.load_month(query).await?;
    if viewer.current_state().map(|s| s.schedules.is_empty() && s.error.is_some()).unwrap_or(false) {
        let error = viewer.current_state().and_then(|s| s.error.clone()).unwrap_or_default();
        anyhow::bail!("Failed to load schedules: {}", error);
    }
    print_month(&viewer);
    Ok(())
}

async fn run_members(ctx: &Context, all: bool) -> Result<()> {
    let (schedules, members) = ctx.services()?;
    let mut viewer = Viewer::new(schedules, members, &ctx.settings, YearMonth::current());
    if all {
        viewer.filter.toggle_show_graduated();
    }
    viewer.load_members(false);
    viewer.wait_for_background_tasks().await;

    if let Some(error) = &viewer.members_error {
        if viewer.members().is_empty() {
            anyhow::bail!("Failed to load members: {}", error);
        }
        eprintln!("warning: could not refresh, showing saved data: {}", error);
    }

    let favorites = ctx.settings.favorites();
    for (generation, members) in viewer.member_groups() {
        println!("{}", generation);
        for member in members {
            let star = if favorites.contains(&member.code) { "*" } else { " " };
            let graduated = if member.is_graduated { "  (graduated)" } else { "" };
            println!("  {} {:<8} {}{}", star, member.code, member.display_name(), graduated);
        }
    }
    Ok(())
}

async fn run_export(ctx: &Context, query: &ScheduleQuery, out: Option<PathBuf>) -> Result<()> {
    let viewer = ctx.load_month(query).await?;
    if let Some(error) = viewer.current_state().and_then(|s| s.error.as_ref()) {
        eprintln!("warning: exporting saved data: {}", error);
    }

    let schedules: Vec<Schedule> = viewer.visible_schedules().into_iter().cloned().collect();
    let content = generate_ical(&schedules, Local::now().naive_local());
    let path = out.unwrap_or_else(|| PathBuf::from(default_filename(Local::now().date_naive())));
    std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;

    info!(path = %path.display(), count = schedules.len(), "Exported schedules");
    println!("Exported {} schedules to {}", schedules.len(), path.display());
    Ok(())
}

async fn run_favorites(ctx: &Context, action: FavoritesAction) -> Result<()> {
    let settings = &ctx.settings;
    match action {
        FavoritesAction::List => {
            // Names come from the cache only; listing favorites never hits the network
            let (_, members) = ctx.services()?;
            let directory = MemberDirectory::new(members.cached_entry().map(|e| e.data).unwrap_or_default());
            let favorites = settings.favorites();
            if favorites.is_empty() {
                println!("No favorite members.");
            }
            for code in &favorites {
                println!("  {:<8} {}", code, directory.name_of(code));
            }
            println!("Auto-apply to filter: {}", if settings.auto_apply() { "on" } else { "off" });
        }
        FavoritesAction::Add(code) => {
            if !settings.is_favorite(&code) {
                settings.toggle_favorite(&code);
            }
            println!("Added {} to favorites", code);
        }
        FavoritesAction::Remove(code) => {
            if settings.is_favorite(&code) {
                settings.toggle_favorite(&code);
            }
            println!("Removed {} from favorites", code);
        }
        FavoritesAction::Clear => {
            settings.clear_favorites();
            println!("Cleared favorites");
        }
        FavoritesAction::AutoApply(enabled) => {
            settings.set_auto_apply(enabled);
            println!("Auto-apply favorites: {}", if enabled { "on" } else { "off" });
        }
    }
    settings.flush().await;
    Ok(())
}

async fn run(command: Command) -> Result<()> {
    if command == Command::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    let ctx = Context::open().await?;
    match command {
        Command::Schedules(query) => run_schedules(&ctx, &query).await,
        Command::Members { all } => run_members(&ctx, all).await,
        Command::Export { query, out } => run_export(&ctx, &query, out).await,
        Command::Favorites(action) => run_favorites(&ctx, action).await,
        Command::Theme(None) => {
            println!("{}", ctx.settings.theme());
            Ok(())
        }
        Command::Theme(Some(theme)) => {
            ctx.settings.set_theme(theme);
            ctx.settings.flush().await;
            println!("Theme set to {}", theme);
            Ok(())
        }
        Command::ClearCache => {
            let removed = ctx.cache.clear(CACHE_KEY_PREFIX);
            println!("Removed {} cached entries", removed);
            Ok(())
        }
        Command::Help => Ok(()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();
    info!("nogisched starting");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match args::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("error: {:#}", e);
            eprintln!();
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };

    run(command).await
}
