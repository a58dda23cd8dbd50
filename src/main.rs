mod debug_report;

use chrono::Datelike;
use fincal::geocode::{GoogleGeocoder, Geocoder, NoGeocoder};
use fincal::model::{CalendarEntry, Season};
use fincal::store::MemoryStore;
use fincal::{Context, Options, extract_sessions, filter_program_lines, reconcile};
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_SEASON_ID: i64 = 1;

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "fincal=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    let outcome = match &config.mode {
        Mode::Program(program) => {
            let started = Instant::now();
            let lines = filter_program_lines(program);
            let drafts = extract_sessions(program);
            debug_report::print_program(program, &lines, &drafts, started.elapsed(), config.color);
            Ok(())
        }
        Mode::Reconcile(feed) => run_reconciliation(&config, feed),
    };
    if let Err(err) = outcome {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

enum Mode {
    Program(String),
    Reconcile(PathBuf),
}

struct CliConfig {
    mode: Mode,
    config_path: Option<PathBuf>,
    season_year: Option<i32>,
    season_id: i64,
    color: bool,
}

fn run_reconciliation(config: &CliConfig, feed_path: &PathBuf) -> Result<(), String> {
    let mut options = match &config.config_path {
        Some(path) => Options::load(path).map_err(|err| err.to_string())?,
        None => Options::default(),
    };
    if let Ok(key) = std::env::var("GOOGLE_MAPS_API_KEY") {
        if !key.trim().is_empty() {
            options.geocoding_api_key = Some(key);
        }
    }

    let context = Context::default();
    let begin_year = config.season_year.unwrap_or_else(|| {
        let today = context.reference_time.date();
        if today.month() >= 10 { today.year() } else { today.year() - 1 }
    });
    let season = Season::starting(config.season_id, begin_year, &options.federation_code)
        .ok_or_else(|| format!("invalid season year {begin_year}"))?;

    let text = std::fs::read_to_string(feed_path)
        .map_err(|err| format!("failed to read feed '{}': {err}", feed_path.display()))?;
    let feed: Vec<CalendarEntry> =
        serde_json::from_str(&text).map_err(|err| format!("invalid feed '{}': {err}", feed_path.display()))?;

    let google;
    let geocoder: &dyn Geocoder = match &options.geocoding_api_key {
        Some(_) => {
            google = GoogleGeocoder::new(options.geocoding_api_key.clone()).map_err(|err| err.to_string())?;
            &google
        }
        None => &NoGeocoder,
    };

    let mut store = MemoryStore::new();
    store.seed(season.clone()).map_err(|err| err.to_string())?;
    let report = reconcile(&mut store, geocoder, &season, &feed, &context, &options);

    debug_report::print_reconciliation(&report, config.color);
    print!("{}", report.diff.to_sql_script());
    Ok(())
}

fn parse_args() -> Result<CliConfig, String> {
    let mut input: Option<String> = None;
    let mut feed: Option<PathBuf> = None;
    let mut config_path = None;
    let mut season_year = None;
    let mut season_id = DEFAULT_SEASON_ID;
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1).peekable();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("fincal {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--config" | "-c" => {
                let value = args.next().ok_or_else(|| "error: --config expects a value".to_string())?;
                config_path = Some(PathBuf::from(value));
            }
            "--reconcile" | "-r" => {
                let value = args.next().ok_or_else(|| "error: --reconcile expects a value".to_string())?;
                feed = Some(PathBuf::from(value));
            }
            "--season" => {
                let value = args.next().ok_or_else(|| "error: --season expects a value".to_string())?;
                season_year = Some(parse_number(&value, "--season")?);
            }
            "--season-id" => {
                let value = args.next().ok_or_else(|| "error: --season-id expects a value".to_string())?;
                season_id = parse_number(&value, "--season-id")?;
            }
            "--input" | "-i" => {
                let value = args.next().ok_or_else(|| "error: --input expects a value".to_string())?;
                if input.is_some() {
                    return Err("error: input provided multiple times".to_string());
                }
                input = Some(value);
            }
            "--" => {
                let rest = args.collect::<Vec<_>>().join(" ");
                if !rest.trim().is_empty() {
                    if input.is_some() {
                        return Err("error: input provided multiple times".to_string());
                    }
                    input = Some(rest);
                }
                break;
            }
            _ if arg.starts_with("--input=") => {
                if input.is_some() {
                    return Err("error: input provided multiple times".to_string());
                }
                input = Some(arg.trim_start_matches("--input=").to_string());
            }
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => {
                let rest = std::iter::once(arg).chain(args).collect::<Vec<_>>().join(" ");
                if input.is_some() {
                    return Err("error: input provided multiple times".to_string());
                }
                input = Some(rest);
                break;
            }
        }
    }

    let mode = match (feed, input) {
        (Some(_), Some(_)) => return Err("error: --reconcile does not take program text".to_string()),
        (Some(path), None) => Mode::Reconcile(path),
        (None, Some(program)) => Mode::Program(program),
        (None, None) => Mode::Program(read_stdin_input()?),
    };
    if let Mode::Program(program) = &mode {
        if program.trim().is_empty() {
            return Err(format!("error: no input provided\n\n{}", help_text()));
        }
    }

    Ok(CliConfig { mode, config_path, season_year, season_id, color })
}

fn parse_number<T: std::str::FromStr>(value: &str, flag: &str) -> Result<T, String> {
    value.trim().parse().map_err(|_| format!("error: invalid {flag} '{value}' (expected a number)"))
}

fn read_stdin_input() -> Result<String, String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer).map_err(|err| format!("error: failed to read stdin: {err}"))?;
    Ok(buffer)
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "fincal {version}

Meeting program parser and calendar reconciliation CLI.

Usage:
  fincal [OPTIONS] [--] <program...>
  fincal [OPTIONS] --input <text>
  fincal [OPTIONS] --reconcile <feed.json>

Options:
  -i, --input <text>         Program text to parse. If omitted, reads remaining args
                             or stdin when no args are provided.
  -r, --reconcile <file>     Dry-run a reconciliation of a JSON calendar feed into an
                             in-memory store and print the SQL diff script.
  -c, --config <file>        Options file (TOML).
  --season <year>            First year of the season (October to September).
                             Default: the season containing today.
  --season-id <id>           Season id for reconciled rows. Default: {season_id}
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Environment:
  RUST_LOG                   Log filter (default: fincal=info).
  GOOGLE_MAPS_API_KEY        Geocoding key; overrides the config file.

Exit codes:
  0  Success.
  1  Reconciliation could not start (config, feed or geocoder error).
  2  Invalid arguments or missing input.
",
        version = env!("CARGO_PKG_VERSION"),
        season_id = DEFAULT_SEASON_ID
    )
}
