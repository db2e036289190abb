use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use memtrace::analysis::overflow::{CandidateReport, Verdict};
use memtrace::config::{AnalysisConfig, NameSet};
use memtrace::logging::{init_tracing, init_tracing_json};
use memtrace::session::Session;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "memtrace")]
#[command(about = "Correlate allocations and memory accesses in a memory trace", long_about = None)]
struct Cli {
    /// Trace produced by the instrumented run.
    #[arg(short = 'f', long = "trace")]
    trace: PathBuf,

    /// JSON configuration; list flags below override its lists.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Allow list: drop allocations whose stack calls any of these functions.
    #[arg(short = 'w', long)]
    allow: Option<PathBuf>,

    /// Target list: keep only allocations whose stack calls one of these functions.
    #[arg(short = 't', long)]
    target: Option<PathBuf>,

    /// Module list: keep only allocations whose stack passes through one of these modules.
    #[arg(short = 'm', long)]
    module: Option<PathBuf>,

    /// Functions known to be safe; never reported as suspects.
    #[arg(long)]
    safe: Option<PathBuf>,

    /// Functions known to be vulnerable.
    #[arg(long)]
    vulnerable: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long)]
    json: bool,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the allocations that pass the filters.
    List,

    /// Show size and full stack trace of an allocation.
    Show {
        /// 1-based position in the `list` output.
        index: usize,
    },

    /// Trace the memory usage of an allocation into a file.
    Trace {
        index: usize,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print the function execution order of an allocation.
    Order { index: usize },

    /// Find the allocations an overflow from this allocation may corrupt.
    Attack {
        index: usize,
        /// Overflow offset from the allocation start (decimal or 0x-prefixed hex).
        #[arg(long, value_parser = parse_number)]
        offset: u64,
        /// Overflow length in bytes (decimal or 0x-prefixed hex).
        #[arg(long, value_parser = parse_number)]
        length: u64,
        /// Function in which the overflowing write happens.
        #[arg(long)]
        bug_site: String,
        /// Root directory for candidate traces.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn parse_number(text: &str) -> Result<u64, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid number {text:?}: {e}"))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.log_json {
        init_tracing_json();
    } else {
        init_tracing();
    }

    let config = load_config(&cli)?;
    let mut session = Session::open(&cli.trace, config)
        .with_context(|| format!("failed to load trace {}", cli.trace.display()))?;
    let visible = session.filtered();

    let resolve = |index: usize| -> anyhow::Result<usize> {
        match index.checked_sub(1).and_then(|i| visible.get(i)) {
            Some(&record) => Ok(record),
            None => bail!("allocation {index} is not in the list (1..={})", visible.len()),
        }
    };

    match cli.command {
        Commands::List => list(&session, &visible, cli.json),
        Commands::Show { index } => {
            let record = session.allocation(resolve(index)?)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(record)?);
            } else {
                println!("Size: {}", record.size);
                print!("{}", record.stack_text());
            }
            Ok(())
        }
        Commands::Trace { index, output } => {
            let trace = session.write_allocation_trace(resolve(index)?, &output)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&trace)?);
            } else {
                println!(
                    "{} operations in {} runs written to {}",
                    trace.matched_ops,
                    trace.function_order.len(),
                    output.display()
                );
            }
            Ok(())
        }
        Commands::Order { index } => {
            let record = resolve(index)?;
            if session.function_order(record)?.is_empty() {
                session.trace_allocation(record)?;
            }
            let order = session.function_order(record)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(order)?);
            } else {
                for (pos, function) in order.iter().enumerate() {
                    println!(" -[{:>2}] {}", pos + 1, function);
                }
            }
            Ok(())
        }
        Commands::Attack {
            index,
            offset,
            length,
            bug_site,
            out,
        } => {
            if let Some(out) = out {
                session.config_mut().output.artifact_root = out;
            }
            let outcome = session.analyze_overflow(resolve(index)?, offset, length, &bug_site)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome.report)?);
                return Ok(());
            }
            let report = &outcome.report;
            if !report.bug_site.found {
                println!("Bug site {bug_site} not found, traced from the top of the trace");
            }
            println!(
                "Overflow {}: {} candidate(s), {} vulnerable",
                report.overflow,
                report.candidates.len(),
                report.vulnerable().count()
            );
            for (candidate, artifact) in report.candidates.iter().zip(&outcome.artifacts) {
                print_candidate(candidate);
                println!("    trace: {}", artifact.display());
            }
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<AnalysisConfig> {
    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::from_json_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    let load = |path: &PathBuf| {
        NameSet::from_file(path).with_context(|| format!("failed to read list {}", path.display()))
    };
    if let Some(path) = &cli.allow {
        config.filters.allow = Some(load(path)?);
    }
    if let Some(path) = &cli.target {
        config.filters.target = Some(load(path)?);
    }
    if let Some(path) = &cli.module {
        config.filters.module = Some(load(path)?);
    }
    if let Some(path) = &cli.safe {
        config.classification.safe = load(path)?;
    }
    if let Some(path) = &cli.vulnerable {
        config.classification.vulnerable = load(path)?;
    }
    Ok(config)
}

fn list(session: &Session, visible: &[usize], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&session.filtered_records())?);
        return Ok(());
    }
    println!("Allocation Information :");
    for (pos, &i) in visible.iter().enumerate() {
        let record = session.allocation(i)?;
        println!(
            " -[{:>2}] {:#x}\t{} {}",
            pos + 1,
            record.address,
            record.allocation_site().unwrap_or("?"),
            record.site()
        );
    }
    if session.malformed() > 0 || session.truncated() {
        eprintln!(
            "note: {} malformed allocation(s) skipped{}",
            session.malformed(),
            if session.truncated() { ", trace ends mid-record" } else { "" }
        );
    }
    Ok(())
}

fn print_candidate(candidate: &CandidateReport) {
    let status = match candidate.verdict {
        Verdict::Safe => "currently safe".to_string(),
        other => other.to_string(),
    };
    println!(
        " - {:#x} (size {}) overlap {}: {}",
        candidate.address, candidate.size, candidate.overlap, status
    );
    if !candidate.trace.function_order.is_empty() {
        println!("    order: {}", candidate.trace.function_order.join(" -> "));
    }
    if !candidate.classification.vulnerable.is_empty() {
        println!("    vulnerable: {}", candidate.classification.vulnerable.join(", "));
    }
    if !candidate.classification.unknown.is_empty() {
        println!("    unknown: {}", candidate.classification.unknown.join(", "));
    }
}
