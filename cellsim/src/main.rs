use anyhow::{Context as _, Result, bail};
use cellsim::{ErrorPolicy, Scenario};
use cellsim_core::flow::ThroughputTrace;
use clap::{Parser, Subcommand};
use std::{fs, path::PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(Parser)]
#[command(version, about = "Cellular attachment, handover and flow statistics simulator")]
struct Command {
    /// log filter, overrides `RUST_LOG`
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Run a scenario and print the flow statistics report.
    Run {
        scenario: PathBuf,

        /// write the report to this file instead of the standard output
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// write the binned throughput trace to this file
        #[arg(long)]
        trace: Option<PathBuf>,

        /// log failed events and carry on instead of aborting
        #[arg(long)]
        skip_errors: bool,
    },
    /// Print the mean of the second column of a throughput trace.
    Average { trace: PathBuf },
}

fn main() -> Result<()> {
    let cmd = Command::parse();

    let filter = match &cmd.log {
        Some(directives) => EnvFilter::try_new(directives)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cmd.action {
        Action::Run {
            scenario,
            output,
            trace,
            skip_errors,
        } => run(scenario, output, trace, skip_errors),
        Action::Average { trace } => average(trace),
    }
}

fn run(
    scenario: PathBuf,
    output: Option<PathBuf>,
    trace: Option<PathBuf>,
    skip_errors: bool,
) -> Result<()> {
    let policy = if skip_errors {
        ErrorPolicy::Skip
    } else {
        ErrorPolicy::Abort
    };

    let mut runner = Scenario::load(&scenario)?
        .into_runner()?
        .with_error_policy(policy);
    runner
        .run()
        .with_context(|| format!("Failed to run {}", scenario.display()))?;

    let network = runner.network();
    let report = network.report().to_string();
    match output {
        Some(path) => fs::write(&path, report)
            .with_context(|| format!("Failed to write report to {}", path.display()))?,
        None => print!("{report}"),
    }

    if let Some(path) = trace {
        fs::write(&path, network.throughput_trace().to_string())
            .with_context(|| format!("Failed to write trace to {}", path.display()))?;
    }

    Ok(())
}

fn average(path: PathBuf) -> Result<()> {
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let Ok(trace) = content.parse::<ThroughputTrace>();

    let Some(mean) = trace.mean() else {
        bail!("No samples in {}", path.display())
    };
    println!("{mean}");
    Ok(())
}
