mod debug_report;

use hecate::{Generator, Options, Value};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_START: &str = "story";
const LOG_ENV: &str = "HECATE_LOG";

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    init_tracing(config.debug);

    if let Err(err) = run(&config) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("hecate=debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer().with_writer(io::stderr)).init();
}

fn run(config: &CliConfig) -> hecate::Result<()> {
    let mut generator = Generator::with_options(Options { seed: config.seed, ..Options::default() });
    generator.load_dir(&config.rules_dir)?;
    for (path, value) in &config.seeds {
        generator.seed(path, value.clone());
    }

    for _ in 0..config.count {
        let generation = generator.generate_verbose(&config.start)?;
        if config.verbose {
            debug_report::print_generation(&config.start, &generation, config.color);
        } else {
            println!("{}", generation.text);
        }
    }

    if config.dump_state {
        debug_report::print_state(&generator.render_state(), config.color);
    }
    Ok(())
}

struct CliConfig {
    rules_dir: PathBuf,
    start: String,
    seed: Option<u64>,
    count: usize,
    seeds: Vec<(String, Value)>,
    verbose: bool,
    dump_state: bool,
    color: bool,
    debug: bool,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut rules_dir: Option<PathBuf> = None;
    let mut start = DEFAULT_START.to_string();
    let mut seed = None;
    let mut count = 1;
    let mut seeds = Vec::new();
    let mut verbose = false;
    let mut dump_state = false;
    let mut color = io::stdout().is_terminal();
    let mut debug = false;
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(value.to_string())),
            _ => (arg.clone(), None),
        };
        let mut value = |name: &str| -> Result<String, String> {
            match inline.clone() {
                Some(value) => Ok(value),
                None => args.next().ok_or_else(|| format!("error: {name} expects a value")),
            }
        };

        match flag.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("hecate {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--verbose" | "-v" => verbose = true,
            "--dump-state" => dump_state = true,
            "--debug" => debug = true,
            "--start" | "-s" => start = value("--start")?,
            "--seed" => {
                let raw = value("--seed")?;
                seed = Some(raw.parse().map_err(|_| format!("error: invalid --seed '{raw}'"))?);
            }
            "--count" | "-n" => {
                let raw = value("--count")?;
                count = raw.parse().map_err(|_| format!("error: invalid --count '{raw}'"))?;
            }
            "--set" => seeds.push(parse_assignment(&value("--set")?)?),
            _ if flag.starts_with('-') => return Err(format!("error: unknown option '{arg}'")),
            _ => {
                if rules_dir.is_some() {
                    return Err("error: rules directory provided multiple times".to_string());
                }
                rules_dir = Some(PathBuf::from(arg));
            }
        }
    }

    let Some(rules_dir) = rules_dir else {
        return Err(format!("error: no rules directory provided\n\n{}", help_text()));
    };

    Ok(CliConfig { rules_dir, start, seed, count, seeds, verbose, dump_state, color, debug })
}

/// `path=value`; numeric text becomes a number.
fn parse_assignment(raw: &str) -> Result<(String, Value), String> {
    let (path, value) =
        raw.split_once('=').ok_or_else(|| format!("error: invalid --set '{raw}' (expected path=value)"))?;
    let path = path.trim();
    if path.is_empty() {
        return Err(format!("error: invalid --set '{raw}' (empty path)"));
    }

    let value = if let Ok(n) = value.parse::<i64>() {
        Value::Int(n)
    } else if let Ok(f) = value.parse::<f64>() {
        Value::Float(f)
    } else {
        Value::from(value)
    };
    Ok((path.to_string(), value))
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "hecate {version}

Generative-grammar engine CLI.

Usage:
  hecate [OPTIONS] <rules-dir>

Loads every *.hec file in <rules-dir> and expands the start symbol.

Options:
  -s, --start <symbol>       Rule to expand. Default: {default_start}
      --seed <n>             Seed the rule selection for reproducible output.
  -n, --count <n>            Number of generations to run. Default: 1
      --set <path>=<value>   Seed base state before generating (repeatable).
                             Numeric values are stored as numbers.
  -v, --verbose              Print a metrics report for each generation.
      --dump-state           Print the global state tree afterwards.
      --color                Force ANSI color output.
      --no-color             Disable ANSI color output.
      --debug                Log engine activity to stderr (hecate=debug).
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Environment:
  {log_env}                 Log filter (tracing EnvFilter syntax). Default: warn

Exit codes:
  0  Success.
  1  Load or generation error.
  2  Invalid arguments.
",
        version = env!("CARGO_PKG_VERSION"),
        default_start = DEFAULT_START,
        log_env = LOG_ENV,
    )
}
