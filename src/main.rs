use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use locus::{
    config::{ScanConfig, ScanLevel, TargetSource, DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT_MS},
    discovery::{HostDiscoveryEngine, HostResult, NoProgress, ProgressObserver, ProgressSnapshot},
    output::RunSummary,
    utils::{file_input::resolve_targets, Logger},
    RunFailure,
};

/// Progress bar driven by the engine's observer callbacks
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} hosts {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
        bar.set_style(style);
        Self { bar }
    }
}

impl ProgressObserver for BarProgress {
    fn host_completed(&self, _result: &HostResult) {
        self.bar.inc(1);
    }

    fn progress(&self, snapshot: &ProgressSnapshot) {
        self.bar.set_message(format!("({} alive)", snapshot.alive));
    }

    fn finished(&self, _snapshot: &ProgressSnapshot) {
        self.bar.finish_and_clear();
    }
}

fn build_cli() -> Command {
    Command::new("locus")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Locus: multi-technique host discovery with ICMP, TCP SYN and stealth probes")
        .arg(
            Arg::new("targets")
                .value_name("IP")
                .help("IPv4 addresses to scan")
                .num_args(0..)
                .index(1),
        )
        .arg(
            Arg::new("input-file")
                .short('i')
                .long("input-file")
                .value_name("FILE")
                .help("Read targets from a file, one address per line")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("max-level")
                .short('l')
                .long("max-level")
                .value_name("LEVEL")
                .help("Deepest probe level: 1=ICMP, 2=+TCP SYN, 3=+stealth TCP")
                .value_parser(clap::value_parser!(u8).range(1..=3))
                .default_value("3"),
        )
        .arg(
            Arg::new("timeout")
                .short('t')
                .long("timeout")
                .value_name("MS")
                .help("Per-probe timeout in milliseconds")
                .value_parser(clap::value_parser!(u64))
                .default_value("2500"),
        )
        .arg(
            Arg::new("concurrency")
                .short('c')
                .long("concurrency")
                .value_name("WORKERS")
                .help("Number of hosts scanned concurrently")
                .value_parser(clap::value_parser!(usize))
                .default_value("100"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("CSV output file (default: host_discovery_<timestamp>.csv)")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase log verbosity (-v debug, -vv trace)")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the run summary as JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-progress")
                .long("no-progress")
                .help("Disable the progress bar")
                .action(ArgAction::SetTrue),
        )
}

fn config_from_matches(matches: &ArgMatches) -> anyhow::Result<ScanConfig> {
    let level = matches.get_one::<u8>("max-level").copied().unwrap_or(3);
    let mut config = ScanConfig::new()
        .with_max_level(ScanLevel::try_from(level)?)
        .with_timeout(
            matches
                .get_one::<u64>("timeout")
                .copied()
                .unwrap_or(DEFAULT_TIMEOUT_MS),
        )
        .with_concurrency(
            matches
                .get_one::<usize>("concurrency")
                .copied()
                .unwrap_or(DEFAULT_CONCURRENCY),
        );

    if let Some(output) = matches.get_one::<PathBuf>("output") {
        config = config.with_output_path(output.clone());
    }

    config.validate()?;
    Ok(config)
}

fn target_source(matches: &ArgMatches) -> Option<TargetSource> {
    let addresses: Vec<String> = matches
        .get_many::<String>("targets")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    if !addresses.is_empty() {
        Some(TargetSource::Addresses(addresses))
    } else {
        matches
            .get_one::<PathBuf>("input-file")
            .map(|path| TargetSource::File(path.clone()))
    }
}

fn print_summary(summary: &RunSummary, elapsed: std::time::Duration) {
    println!();
    println!("{}", "Host discovery summary".bright_blue().bold());
    println!("{}", "-".repeat(40).bright_blue());
    println!("  Scanned:       {}", summary.total_scanned);
    println!(
        "  Alive:         {} ({:.1}%)",
        summary.alive_hosts.to_string().bright_green(),
        summary.alive_percentage()
    );
    println!("  Dead:          {}", summary.dead_hosts);
    println!(
        "  Errors:        {}",
        if summary.error_hosts > 0 {
            summary.error_hosts.to_string().bright_red()
        } else {
            summary.error_hosts.to_string().normal()
        }
    );
    println!(
        "  Detected by:   ICMP {}, TCP-SYN {}, TCP-Advanced {}",
        summary.detection_methods.icmp,
        summary.detection_methods.basic_tcp,
        summary.detection_methods.advanced_tcp
    );
    if !summary.os_distribution.is_empty() {
        println!("  OS guesses:");
        for (os, count) in &summary.os_distribution {
            println!("    {:<15} {}", os, count);
        }
    }
    println!("  Duration:      {:.2}s", elapsed.as_secs_f64());
    println!(
        "  Results:       {}",
        summary.output_file.display().to_string().bright_cyan()
    );
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{} {}", "[!]".bright_red(), message);
    process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = build_cli().get_matches();

    let level = match matches.get_count("verbose") {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    Logger::init(level);

    let config = match config_from_matches(&matches) {
        Ok(config) => config,
        Err(e) => fail(e),
    };

    let source = target_source(&matches);
    let targets = match resolve_targets(source.as_ref()) {
        Ok(targets) => targets,
        Err(e) => fail(e),
    };

    let engine = match HostDiscoveryEngine::with_raw_transport(config) {
        Ok(engine) => engine,
        Err(e) => fail(e),
    };

    let engine = if matches.get_flag("no-progress") || matches.get_flag("json") {
        engine.with_observer(Arc::new(NoProgress))
    } else {
        engine.with_observer(Arc::new(BarProgress::new(targets.len())))
    };

    match engine.run_targets(&targets).await {
        Ok(report) => {
            if matches.get_flag("json") {
                println!("{}", report.summary.to_json()?);
            } else {
                print_summary(&report.summary, report.duration);
            }
            Ok(())
        }
        Err(RunFailure { error, results }) => {
            if let Some(results) = results {
                eprintln!(
                    "{} {} results were collected but could not be saved",
                    "[!]".bright_yellow(),
                    results.len()
                );
            }
            fail(error)
        }
    }
}
