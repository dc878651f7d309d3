//! gaudit administrative front end
//!
//! Inspects and maintains the findings database: list and show runs, compare
//! two runs, delete a run, and generate synthetic data. Results are printed as
//! JSON on stdout; logs go to stderr.

use anyhow::{bail, Context, Result};
use serde::Serialize;

use gaudit::config::AuditConfig;
use gaudit::utils::env::LOG_ENV;
use gaudit::{synthetic, FindingsStore, RunComparator};

const USAGE: &str = "usage: gaudit <command> [args]

commands:
  init                 create the config file and database
  runs                 list all runs, newest first
  show <run_id>        print a run with its sections, findings and stats
  latest               print the most recent run
  compare <a> <b>      diff run <b> against baseline run <a>
  delete <run_id>      delete a run and everything it recorded
  synthetic [domain]   write a synthetic completed run";

fn init_tracing(default_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_run_id(arg: Option<String>) -> Result<i64> {
    let raw = arg.with_context(|| format!("missing run id\n\n{}", USAGE))?;
    raw.parse::<i64>()
        .with_context(|| format!("run id must be an integer, got '{}'", raw))
}

fn open_store(config: &AuditConfig) -> Result<FindingsStore> {
    FindingsStore::open(&config.db_path)
        .with_context(|| format!("failed to open findings database at {}", config.db_path.display()))
}

fn run() -> Result<()> {
    gaudit::utils::load_env()?;
    let config = AuditConfig::load().context("failed to load configuration")?;
    init_tracing(&config.log_level)?;

    let mut args = std::env::args().skip(1);
    let Some(command) = args.next() else {
        bail!("{}", USAGE);
    };

    match command.as_str() {
        "init" => {
            let path = AuditConfig::config_path();
            let created = AuditConfig::ensure_config_exists(&path)?;
            open_store(&config)?;
            print_json(&serde_json::json!({
                "config_path": path,
                "config_created": created,
                "db_path": config.db_path,
            }))
        }
        "runs" => print_json(&open_store(&config)?.list_runs()?),
        "show" => {
            let run_id = parse_run_id(args.next())?;
            let report = open_store(&config)?
                .run_report(run_id)?
                .with_context(|| format!("run {} not found", run_id))?;
            print_json(&report)
        }
        "latest" => match open_store(&config)?.latest_run()? {
            Some(run) => print_json(&run),
            None => bail!("no runs recorded in {}", config.db_path.display()),
        },
        "compare" => {
            let baseline = parse_run_id(args.next())?;
            let current = parse_run_id(args.next())?;
            let comparator = RunComparator::open(&config.db_path)?;
            print_json(&comparator.compare(baseline, current)?)
        }
        "delete" => {
            let run_id = parse_run_id(args.next())?;
            if !open_store(&config)?.delete_run(run_id)? {
                bail!("run {} not found", run_id);
            }
            print_json(&serde_json::json!({ "deleted": run_id }))
        }
        "synthetic" => {
            let domain = args.next().unwrap_or_else(|| "example.com".to_string());
            let domain = gaudit::utils::validate_domain(&domain)?;
            let run_id = synthetic::create_fake_run(&open_store(&config)?, &domain)?;
            print_json(&serde_json::json!({ "run_id": run_id, "domain": domain }))
        }
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("unknown command '{}'\n\n{}", other, USAGE),
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("[gaudit] Error: {:#}", e);
        std::process::exit(1);
    }
}
