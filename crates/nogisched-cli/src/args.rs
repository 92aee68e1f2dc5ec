//! Command-line parsing.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use nogisched_core::{Category, Theme, YearMonth};

pub const USAGE: &str = "\
Usage: nogisched [COMMAND]

Commands:
  schedules [YYYYMM] [FILTERS] [--refresh] [--offline]
                            List schedules for a month (default: this month)
  members [--all]           List members by generation (--all includes graduated)
  export [YYYYMM] [FILTERS] [--out FILE]
                            Write the filtered schedules as an .ics file
  favorites [list | add CODE | remove CODE | clear | auto on|off]
                            Manage favorite members
  theme [light|dark|system] Show or set the theme preference
  clear-cache               Remove all cached feed data

Filters:
  --member CODE             Only schedules with this member (repeatable)
  --category CAT            tv, radio, live, cd or other (repeatable)
  --keyword TEXT            Match title or description

Environment:
  RUST_LOG                  Log filter (default: warn)
  NOGISCHED_LOG_FILE        Also write logs to this file
  NOGISCHED_SCHEDULE_URL, NOGISCHED_MEMBER_URL, NOGISCHED_CACHE_DIR";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleQuery {
    pub month: Option<YearMonth>,
    pub members: Vec<String>,
    pub categories: Vec<Category>,
    pub keyword: Option<String>,
    pub refresh: bool,
    pub offline: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FavoritesAction {
    List,
    Add(String),
    Remove(String),
    Clear,
    AutoApply(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Schedules(ScheduleQuery),
    Members { all: bool },
    Export { query: ScheduleQuery, out: Option<PathBuf> },
    Favorites(FavoritesAction),
    Theme(Option<Theme>),
    ClearCache,
    Help,
}

fn value<'a>(flag: &str, rest: &mut impl Iterator<Item = &'a String>) -> Result<&'a String> {
    rest.next().ok_or_else(|| anyhow!("{} needs a value", flag))
}

/// Parse schedule query arguments. `--out` is accepted only when
/// `out` is given.
fn parse_query(args: &[String], mut out: Option<&mut Option<PathBuf>>) -> Result<ScheduleQuery> {
    let mut query = ScheduleQuery::default();
    let mut rest = args.iter();

    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--member" | "-m" => query.members.push(value(arg, &mut rest)?.clone()),
            "--category" | "-c" => {
                let category = value(arg, &mut rest)?;
                query.categories.push(category.parse().map_err(|e: String| anyhow!(e))?);
            }
            "--keyword" | "-k" => query.keyword = Some(value(arg, &mut rest)?.clone()),
            "--refresh" => query.refresh = true,
            "--offline" => query.offline = true,
            "--out" | "-o" => match out.as_deref_mut() {
                Some(slot) => *slot = Some(PathBuf::from(value(arg, &mut rest)?)),
                None => bail!("--out is only valid for export"),
            },
            month if !month.starts_with('-') && query.month.is_none() => {
                let parsed = month
                    .parse()
                    .map_err(|e: String| anyhow!(e))
                    .with_context(|| format!("Invalid month {:?}", month))?;
                query.month = Some(parsed);
            }
            other => bail!("Unexpected argument {:?}", other),
        }
    }

    if query.refresh && query.offline {
        bail!("--refresh and --offline cannot be combined");
    }
    Ok(query)
}

fn parse_favorites(args: &[String]) -> Result<FavoritesAction> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args.as_slice() {
        [] | ["list"] => Ok(FavoritesAction::List),
        ["add", code] => Ok(FavoritesAction::Add(code.to_string())),
        ["remove", code] => Ok(FavoritesAction::Remove(code.to_string())),
        ["clear"] => Ok(FavoritesAction::Clear),
        ["auto", "on"] => Ok(FavoritesAction::AutoApply(true)),
        ["auto", "off"] => Ok(FavoritesAction::AutoApply(false)),
        _ => bail!("Usage: nogisched favorites [list | add CODE | remove CODE | clear | auto on|off]"),
    }
}

/// Parse the arguments after the program name.
pub fn parse(args: &[String]) -> Result<Command> {
    let Some((command, rest)) = args.split_first() else {
        return Ok(Command::Schedules(ScheduleQuery::default()));
    };

    match command.as_str() {
        "schedules" | "s" => Ok(Command::Schedules(parse_query(rest, None)?)),
        "members" | "m" => match rest {
            [] => Ok(Command::Members { all: false }),
            [flag] if flag == "--all" => Ok(Command::Members { all: true }),
            _ => bail!("Usage: nogisched members [--all]"),
        },
        "export" => {
            let mut out = None;
            let query = parse_query(rest, Some(&mut out))?;
            Ok(Command::Export { query, out })
        }
        "favorites" | "fav" => Ok(Command::Favorites(parse_favorites(rest)?)),
        "theme" => match rest {
            [] => Ok(Command::Theme(None)),
            [theme] => Ok(Command::Theme(Some(theme.parse().map_err(|e: String| anyhow!(e))?))),
            _ => bail!("Usage: nogisched theme [light|dark|system]"),
        },
        "clear-cache" => Ok(Command::ClearCache),
        "help" | "--help" | "-h" => Ok(Command::Help),
        // Bare month or filters: treat as `schedules`
        _ => Ok(Command::Schedules(parse_query(args, None)?)),
    }
}
