#![forbid(unsafe_code)]

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use jump_harness::thresholds::{
    load_thresholds_from_path, ThresholdRegistry, ThresholdSet, DEFAULT_SET, TABLE_CONFIG_ENV,
};
use jump_harness::verify::{
    render_report_markdown, render_summary_line, synthesize_trace, FailurePolicy,
    JsonlOutcomeSink, OutcomeFilter, OutcomeSink, SyntheticTraceSpec, TraceSchema, Verifier,
    VerifyOptions,
};

#[derive(Parser)]
#[command(name = "jumpcheck", version, about = "Verify fuzzy classification and jump decisions in simulation traces")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a trace; exits 1 when any record fails
    Verify {
        /// Whitespace-delimited trace file (9- or 10-field records)
        #[arg(long)]
        trace: PathBuf,

        /// Stop at the first failure or collect every failure
        #[arg(long, value_enum, default_value = "collect-all")]
        policy: CliPolicy,

        /// Named threshold set (see `tables list`)
        #[arg(long, conflicts_with = "table_config")]
        tables: Option<String>,

        /// Threshold set from a JSON config file
        #[arg(long)]
        table_config: Option<PathBuf>,

        /// Number of partitions checked concurrently
        #[arg(long, default_value_t = 1)]
        parallel: usize,

        /// Write the full report here
        #[arg(long)]
        report: Option<PathBuf>,

        /// Report format: md or json
        #[arg(long, default_value = "md")]
        format: String,

        /// JSONL log of every record outcome
        #[arg(long)]
        outcomes: Option<PathBuf>,

        /// Log only failing records to --outcomes
        #[arg(long, requires = "outcomes")]
        outcomes_failures_only: bool,
    },
    /// List, show or load threshold sets
    Tables {
        #[command(subcommand)]
        command: TableCommands,
    },
    /// Write a self-consistent synthetic trace
    Generate {
        #[arg(long)]
        out: PathBuf,

        #[arg(long, default_value_t = 10)]
        agents: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        #[arg(long, value_enum, default_value = "shared-baseline")]
        schema: CliSchema,

        /// Shared baseline for 10-field traces (drawn from the seed when omitted)
        #[arg(long)]
        common_cooperation: Option<f64>,

        #[arg(long, conflicts_with = "table_config")]
        tables: Option<String>,

        #[arg(long)]
        table_config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum TableCommands {
    List,
    Show {
        #[arg(long, default_value = DEFAULT_SET)]
        name: String,
    },
    Load {
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliPolicy {
    FailFast,
    CollectAll,
}

impl From<CliPolicy> for FailurePolicy {
    fn from(p: CliPolicy) -> Self {
        match p {
            CliPolicy::FailFast => FailurePolicy::FailFast,
            CliPolicy::CollectAll => FailurePolicy::CollectAll,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliSchema {
    Individual,
    SharedBaseline,
}

impl From<CliSchema> for TraceSchema {
    fn from(s: CliSchema) -> Self {
        match s {
            CliSchema::Individual => TraceSchema::Individual,
            CliSchema::SharedBaseline => TraceSchema::SharedBaseline,
        }
    }
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Verify {
            trace,
            policy,
            tables,
            table_config,
            parallel,
            report,
            format,
            outcomes,
            outcomes_failures_only,
        } => {
            if parallel == 0 {
                return Err("--parallel must be >= 1".into());
            }
            if format != "md" && format != "json" {
                return Err(format!("unknown report format '{format}'; expected md or json").into());
            }
            let thresholds = resolve_thresholds(tables, table_config)?;
            info!(thresholds = %thresholds.describe(), "using threshold set");

            let options = VerifyOptions {
                policy: policy.into(),
                parallelism: parallel,
            };
            let verifier = Verifier::new(thresholds, options);

            let (outcome_sink, outcome_worker) = if let Some(path) = outcomes {
                let filter = if outcomes_failures_only {
                    OutcomeFilter::FailuresOnly
                } else {
                    OutcomeFilter::All
                };
                let (sink, worker) = JsonlOutcomeSink::with_filter(path, filter)?;
                (Some(sink), Some(worker))
            } else {
                (None, None)
            };
            let sink_ref = outcome_sink.as_ref().map(|sink| sink as &dyn OutcomeSink);

            let result = verifier.verify_path(&trace, sink_ref);

            drop(outcome_sink);
            let logged = match outcome_worker {
                Some(worker) => Some(worker.join()?),
                None => None,
            };
            let result = result?;
            if let Some(stats) = logged {
                if stats.failing_rows != result.summary.records_failed {
                    return Err(format!(
                        "outcome log holds {} failing rows but the report has {} failed records",
                        stats.failing_rows, result.summary.records_failed
                    )
                    .into());
                }
                info!(rows = stats.rows, failing = stats.failing_rows, "outcome log written");
            }

            if let Some(report_path) = report {
                if format == "json" {
                    let json = serde_json::to_string_pretty(&result)?;
                    std::fs::write(report_path, json)?;
                } else {
                    std::fs::write(report_path, render_report_markdown(&result))?;
                }
            }

            println!("{}", render_summary_line(&result));
            if result.is_success() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(1))
            }
        }
        Commands::Tables { command } => {
            match command {
                TableCommands::List => {
                    let registry = ThresholdRegistry::default();
                    for name in registry.list() {
                        println!("{name}");
                    }
                }
                TableCommands::Show { name } => {
                    let set = lookup_named(&name)?;
                    println!("{}", serde_json::to_string_pretty(&set.to_config())?);
                }
                TableCommands::Load { config } => {
                    let set = load_thresholds_from_path(config)?;
                    println!("{}", set.describe());
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Generate {
            out,
            agents,
            seed,
            schema,
            common_cooperation,
            tables,
            table_config,
        } => {
            if let Some(value) = common_cooperation {
                if !value.is_finite() {
                    return Err("--common-cooperation must be finite".into());
                }
            }
            let thresholds = resolve_thresholds(tables, table_config)?;
            let spec = SyntheticTraceSpec {
                agents,
                schema: schema.into(),
                seed,
                common_cooperation,
            };
            let records = synthesize_trace(&spec, &thresholds)?;
            let mut file = File::create(&out)?;
            for record in &records {
                writeln!(file, "{}", record.to_line())?;
            }
            info!(agents, path = %out.display(), "wrote synthetic trace");
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Config path, then registry name, then `JUMPCHECK_TABLE_CONFIG`, then the default set.
fn resolve_thresholds(
    name: Option<String>,
    config: Option<PathBuf>,
) -> Result<ThresholdSet, Box<dyn std::error::Error>> {
    if let Some(path) = config {
        return Ok(load_thresholds_from_path(path)?);
    }
    if let Some(name) = name {
        return lookup_named(&name);
    }
    if let Some(path) = std::env::var_os(TABLE_CONFIG_ENV).filter(|value| !value.is_empty()) {
        return Ok(load_thresholds_from_path(PathBuf::from(path))?);
    }
    Ok(ThresholdSet::default())
}

fn lookup_named(name: &str) -> Result<ThresholdSet, Box<dyn std::error::Error>> {
    let registry = ThresholdRegistry::default();
    match registry.get(name) {
        Some(set) => Ok(set),
        None => {
            let available = registry.list().join(", ");
            Err(format!("unknown threshold set '{name}'; available sets: {available}").into())
        }
    }
}
