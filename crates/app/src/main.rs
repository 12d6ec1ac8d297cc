use std::fmt;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use quiz_core::model::{AllowancePolicy, ContestSettings, DEFAULT_CONTEST_DAYS};
use services::{AllowanceStatus, AppServices, Clock};
use tracing::debug;

const DEFAULT_DB_URL: &str = "sqlite:quiz2play.sqlite3";

#[derive(Debug, PartialEq, Eq)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    MissingCount,
    InvalidCount { raw: String },
    InvalidDbUrl { raw: String },
    InvalidContestStart { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::MissingCount => write!(f, "play requires a question count"),
            ArgsError::InvalidCount { raw } => write!(f, "invalid question count: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidContestStart { raw } => {
                write!(f, "invalid --contest-start value (expected YYYY-MM-DD): {raw}")
            }
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
        }
    }
}

impl std::error::Error for ArgsError {}

#[derive(Debug)]
struct NotEnoughQuestions {
    requested: u32,
    available: u32,
}

impl fmt::Display for NotEnoughQuestions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot play {} questions, only {} left today",
            self.requested, self.available
        )
    }
}

impl std::error::Error for NotEnoughQuestions {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  quiz2play [status]      [--db <sqlite_url>] [--contest-start <date>] [--now <rfc3339>] [--json] [-v]");
    eprintln!("  quiz2play play <count>  [--db <sqlite_url>] [--contest-start <date>] [--now <rfc3339>] [--json] [-v]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db {DEFAULT_DB_URL}");
    eprintln!("  --contest-start {}", quiz_core::model::default_contest_start());
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL, QUIZ_CONTEST_START, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Status,
    Play,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "status" => Some(Self::Status),
            "play" => Some(Self::Play),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Args {
    db_url: String,
    contest_start: NaiveDate,
    now: Option<DateTime<FixedOffset>>,
    count: Option<u32>,
    json: bool,
    verbose: bool,
}

impl Args {
    fn with_db_url(db_url: String) -> Self {
        Self {
            db_url,
            contest_start: quiz_core::model::default_contest_start(),
            now: None,
            count: None,
            json: false,
            verbose: false,
        }
    }

    /// Defaults, overridden by `QUIZ_DB_URL` and `QUIZ_CONTEST_START`.
    fn from_env() -> Result<Self, ArgsError> {
        Self::from_vars(
            std::env::var("QUIZ_DB_URL").ok(),
            std::env::var("QUIZ_CONTEST_START").ok(),
        )
    }

    fn from_vars(db_url: Option<String>, contest_start: Option<String>) -> Result<Self, ArgsError> {
        let db_url = normalize_sqlite_url(db_url.unwrap_or_else(|| DEFAULT_DB_URL.into()));
        let mut args = Self::with_db_url(db_url);
        if let Some(raw) = contest_start {
            args.contest_start = parse_date(&raw)?;
        }
        Ok(args)
    }

    fn apply_flags(
        mut self,
        cmd: Command,
        args: &mut impl Iterator<Item = String>,
    ) -> Result<Self, ArgsError> {
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    self.db_url = normalize_sqlite_url(value);
                }
                "--contest-start" => {
                    let value = require_value(args, "--contest-start")?;
                    self.contest_start = parse_date(&value)?;
                }
                "--now" => {
                    let value = require_value(args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(value.trim())
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?;
                    self.now = Some(parsed);
                }
                "--json" => self.json = true,
                "--verbose" | "-v" => self.verbose = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ if cmd == Command::Play && self.count.is_none() && !arg.starts_with('-') => {
                    let parsed: u32 = arg
                        .parse()
                        .map_err(|_| ArgsError::InvalidCount { raw: arg.clone() })?;
                    self.count = Some(parsed);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        if cmd == Command::Play && self.count.is_none() {
            return Err(ArgsError::MissingCount);
        }
        Ok(self)
    }

    fn clock(&self) -> Clock {
        self.now.map_or_else(Clock::default_clock, Clock::fixed)
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, ArgsError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| ArgsError::InvalidContestStart {
        raw: raw.to_string(),
    })
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Database file behind a normalized URL; `None` for an in-memory database.
fn sqlite_file_path(db_url: &str) -> Result<Option<&std::path::Path>, ArgsError> {
    if db_url == "sqlite::memory:" {
        return Ok(None);
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        });
    }

    Ok(Some(std::path::Path::new(path)))
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = sqlite_file_path(db_url)? else {
        return Ok(());
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let level = if verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();
}

fn format_countdown(remaining: Duration) -> String {
    let secs = remaining.num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn print_status(status: &AllowanceStatus, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(status)?);
        return Ok(());
    }

    let contest = &status.contest;
    println!(
        "Day {} of {} ({} days left)",
        contest.day_number(),
        contest.max_contest_days(),
        contest.days_remaining()
    );
    println!(
        "Today: {} played, {} available ({} daily + {} rolled over)",
        status.today.questions_played(),
        status.available_questions,
        status.today.max_questions_per_day(),
        status.today.accumulated_questions()
    );
    println!(
        "Contest: {} / {} questions",
        contest.total_questions_played(),
        contest.max_questions_per_contest()
    );
    println!(
        "Next reset in {}",
        format_countdown(Duration::seconds(status.seconds_until_reset))
    );
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // Default behavior: show status when no subcommand is provided.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Status,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with('-') => Command::Status,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with('-') {
        argv.remove(0);
    }

    let parsed = Args::from_env()
        .and_then(|args| args.apply_flags(cmd, &mut argv.into_iter()))
        .map_err(|e| {
            eprintln!("{e}");
            print_usage();
            e
        })?;

    init_logging(parsed.verbose);
    debug!(db_url = %parsed.db_url, contest_start = %parsed.contest_start, "starting");

    let contest = ContestSettings::new(parsed.contest_start, DEFAULT_CONTEST_DAYS)?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let services = AppServices::new_sqlite(
        &parsed.db_url,
        parsed.clock(),
        AllowancePolicy::default(),
        contest,
    )
    .await?;
    let allowance = services.allowance();

    let status = match cmd {
        Command::Status => allowance.status().await?,
        Command::Play => {
            let requested = parsed.count.unwrap_or_default();
            let available = allowance.available_questions().await?;
            if requested > available {
                return Err(NotEnoughQuestions {
                    requested,
                    available,
                }
                .into());
            }
            allowance.record_questions_played(requested).await?
        }
    };

    print_status(&status, parsed.json)
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(cmd: Command, argv: &[&str]) -> Result<Args, ArgsError> {
        let mut iter = argv.iter().map(|s| (*s).to_string());
        Args::with_db_url("sqlite::memory:".into()).apply_flags(cmd, &mut iter)
    }

    #[test]
    fn play_takes_a_positional_count() {
        let args = parse(Command::Play, &["3", "--json"]).unwrap();
        assert_eq!(args.count, Some(3));
        assert!(args.json);
    }

    #[test]
    fn play_without_count_is_rejected() {
        assert_eq!(parse(Command::Play, &[]), Err(ArgsError::MissingCount));
    }

    #[test]
    fn negative_count_is_rejected() {
        assert_eq!(
            parse(Command::Play, &["-3"]),
            Err(ArgsError::UnknownArg("-3".into()))
        );
        assert_eq!(
            parse(Command::Play, &["three"]),
            Err(ArgsError::InvalidCount {
                raw: "three".into()
            })
        );
    }

    #[test]
    fn status_rejects_positional_args() {
        assert_eq!(
            parse(Command::Status, &["3"]),
            Err(ArgsError::UnknownArg("3".into()))
        );
    }

    #[test]
    fn parses_contest_start_and_now() {
        let args = parse(
            Command::Status,
            &["--contest-start", "2026-01-05", "--now", "2026-01-07T09:30:00+02:00"],
        )
        .unwrap();
        assert_eq!(
            args.contest_start,
            NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
        );
        let clock = args.clock();
        assert!(clock.is_fixed());
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 1, 7).unwrap());
    }

    #[test]
    fn invalid_dates_are_reported() {
        assert_eq!(
            parse(Command::Status, &["--contest-start", "tomorrow"]),
            Err(ArgsError::InvalidContestStart {
                raw: "tomorrow".into()
            })
        );
        assert_eq!(
            parse(Command::Status, &["--now", "2026-01-07"]),
            Err(ArgsError::InvalidNow {
                raw: "2026-01-07".into()
            })
        );
    }

    #[test]
    fn flag_without_value_is_reported() {
        assert_eq!(
            parse(Command::Status, &["--db"]),
            Err(ArgsError::MissingValue { flag: "--db" })
        );
    }

    #[test]
    fn sqlite_urls_are_made_absolute() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
        assert_eq!(
            normalize_sqlite_url("sqlite:///tmp/quiz.db".into()),
            "sqlite:///tmp/quiz.db"
        );
        assert_eq!(
            normalize_sqlite_url("sqlite:/tmp/quiz.db".into()),
            "sqlite:///tmp/quiz.db"
        );
    }

    #[test]
    fn default_db_url_points_at_a_file() {
        let args = Args::from_vars(None, None).unwrap();
        assert!(args.db_url.starts_with("sqlite://"));
        let path = sqlite_file_path(&args.db_url).unwrap().expect("file-backed default");
        assert!(path.is_absolute());
        assert!(path.ends_with("quiz2play.sqlite3"));
    }

    #[test]
    fn env_values_override_defaults() {
        let args = Args::from_vars(
            Some("sqlite:/var/lib/quiz/player.db".into()),
            Some("2026-01-05".into()),
        )
        .unwrap();
        assert_eq!(args.db_url, "sqlite:///var/lib/quiz/player.db");
        assert_eq!(
            sqlite_file_path(&args.db_url).unwrap(),
            Some(std::path::Path::new("/var/lib/quiz/player.db"))
        );
        assert_eq!(
            args.contest_start,
            NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
        );
    }

    #[test]
    fn invalid_env_contest_start_is_reported() {
        assert_eq!(
            Args::from_vars(None, Some("soon".into())),
            Err(ArgsError::InvalidContestStart { raw: "soon".into() })
        );
    }

    #[test]
    fn memory_database_needs_no_file() {
        assert_eq!(sqlite_file_path("sqlite::memory:"), Ok(None));
        prepare_sqlite_file("sqlite::memory:").unwrap();
    }

    #[test]
    fn unnormalized_url_is_rejected_by_file_prep() {
        assert_eq!(
            sqlite_file_path("sqlite:quiz2play.sqlite3"),
            Err(ArgsError::InvalidDbUrl {
                raw: "sqlite:quiz2play.sqlite3".into()
            })
        );
    }

    #[test]
    fn countdown_is_zero_padded() {
        assert_eq!(format_countdown(Duration::seconds(3_725)), "01:02:05");
        assert_eq!(format_countdown(Duration::seconds(-5)), "00:00:00");
    }
}
