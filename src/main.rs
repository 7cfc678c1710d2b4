use anyhow::Context;
use clap::{Parser, Subcommand};
use safety_gateway::simulation::{StressOptions, StressReport, StressRunner, StressScenario};
use safety_gateway::GatewayConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Trading safety gateway
#[derive(Parser, Debug)]
#[command(name = "safety-gateway", about = "Pre-trade risk, circuit breakers and drift guard")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run synthetic stress scenarios through a paper-trading gateway
    Simulate {
        /// crash, pump, chop or all
        #[arg(short, long, default_value = "all")]
        scenario: String,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Price ticks per scenario
        #[arg(long, default_value_t = 500)]
        ticks: usize,
    },
    /// Print the effective configuration as JSON
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    let config =
        GatewayConfig::load(args.config.as_deref()).context("failed to load configuration")?;

    match args.command {
        Command::Simulate {
            scenario,
            seed,
            ticks,
        } => {
            let runner = StressRunner::new(config, seed).with_options(StressOptions {
                ticks,
                ..Default::default()
            });

            let reports = if scenario.eq_ignore_ascii_case("all") {
                runner.run_all().await?
            } else {
                let scenario: StressScenario =
                    scenario.parse().map_err(|e: String| anyhow::anyhow!(e))?;
                vec![runner.run(scenario).await?]
            };

            for report in &reports {
                print_report(report);
            }
            tracing::info!("Stress test complete");
        }
        Command::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn print_report(report: &StressReport) {
    println!("\n=== Scenario: {} ===", report.scenario);
    println!(
        "  Price:     {:.2} -> {:.2}",
        report.start_price, report.final_price
    );
    println!(
        "  Balance:   {:.2} -> {:.2} (max drawdown {:.2}%)",
        report.initial_balance,
        report.final_balance,
        report.max_drawdown * 100.0
    );
    println!(
        "  Trades:    {} submitted, {} executed, {} blocked, {} failed",
        report.trades_submitted, report.executed, report.blocked, report.failed
    );
    for (kind, count) in &report.blocked_by {
        println!("    blocked by {}: {}", kind, count);
    }
    println!(
        "  Halted:    {} after {} ticks",
        if report.halted { "yes" } else { "no" },
        report.ticks_run
    );
    println!("  Drift:     {} ({} alerts)", report.drift_status, report.alerts_raised);
}

fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("safety_gateway=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
