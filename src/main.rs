use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use veredicto::cli::{Cli, Command, OutputFormat};
use veredicto::config::RunPlan;
use veredicto::controller::{RunState, TerminationReason, TrialOutcome};
use veredicto::threshold::ThresholdSpecification;
use veredicto::verdict::{compose, Verdict};

/// Exit status for a configuration or input error
const EXIT_CONFIG_ERROR: u8 = 2;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_plan(path: &Path) -> Result<(RunPlan, ThresholdSpecification)> {
    let plan = RunPlan::from_file(path)?;
    let spec = plan
        .resolve()
        .with_context(|| format!("Cannot resolve threshold for plan '{}'", plan.name))?;
    Ok((plan, spec))
}

fn print_plan(plan: &RunPlan, spec: &ThresholdSpecification, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "name": plan.name,
                "mode": plan.threshold.name(),
                "specification": spec,
                "required_successes": spec.required_successes(),
                "failures_tolerated": spec.failures_tolerated(),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            println!("=== Plan: {} ===", plan.name);
            println!("Mode: {}", plan.threshold.name());
            println!("Samples: {}", spec.samples);
            println!("Threshold: {:.4}", spec.threshold);
            println!(
                "Required successes: {} (up to {} failures tolerated)",
                spec.required_successes(),
                spec.failures_tolerated()
            );
            println!("Origin: {}", spec.describe_origin());
            if let Some(confidence) = spec.implied_confidence() {
                println!("Implied confidence: {:.1}%", confidence * 100.0);
            }
        }
    }
    Ok(())
}

fn print_verdict(verdict: &Verdict, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(verdict)?),
        OutputFormat::Text => print!("{}", verdict.to_report_string()),
    }
    Ok(())
}

fn verdict_status(verdict: &Verdict) -> ExitCode {
    if verdict.passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn evaluate(path: &Path, successes: u64, samples: u64, format: OutputFormat) -> Result<ExitCode> {
    if samples == 0 {
        anyhow::bail!("Invalid counts: --samples must be > 0");
    }
    if successes > samples {
        anyhow::bail!(
            "Invalid counts: {} successes out of {} samples",
            successes,
            samples
        );
    }

    let (plan, spec) = load_plan(path)?;
    if samples != spec.samples {
        tracing::warn!(
            planned = spec.samples,
            recorded = samples,
            "recorded sample count differs from the plan"
        );
    }

    let state = RunState::recorded(samples, samples, successes);
    let verdict = compose(&spec, &state, &TerminationReason::Completed, &plan.caveats);
    print_verdict(&verdict, format)?;
    Ok(verdict_status(&verdict))
}

fn simulate(path: &Path, rate: f64, seed: Option<u64>, format: OutputFormat) -> Result<ExitCode> {
    if !(0.0..=1.0).contains(&rate) {
        anyhow::bail!("Invalid value for --rate: {} (must be in [0, 1])", rate);
    }

    let (plan, spec) = load_plan(path)?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let verdict = plan
        .build_run(spec)
        .run(move |_: u64| TrialOutcome::from_bool(rng.gen_bool(rate)));
    print_verdict(&verdict, format)?;
    Ok(verdict_status(&verdict))
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Plan { plan } => {
            let (run_plan, spec) = load_plan(&plan)?;
            print_plan(&run_plan, &spec, cli.format)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Evaluate {
            plan,
            successes,
            samples,
        } => evaluate(&plan, successes, samples, cli.format),
        Command::Simulate { plan, rate, seed } => simulate(&plan, rate, seed, cli.format),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing if --debug flag is set
    init_tracing(cli.debug);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}
