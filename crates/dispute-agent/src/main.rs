use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{error, info, warn};

use dispute_agent::config::LoggingConfig;
use dispute_agent::report::{self, ConfigurationEcho, SystemReport};
use dispute_agent::sources::{ProfileClient, SmartsheetClient, SnowflakeClient};
use dispute_agent::telemetry::{self, RunCollector, RunStats};
use dispute_agent::{
    AgentConfig, AuditTrail, Collaborators, EvidenceWriter, Orchestrator, QueueStore,
};

#[derive(Debug, Parser)]
#[command(
    name = "dispute-agent",
    version,
    about = "Triage booking disputes from the ticket queue"
)]
struct Cli {
    /// Process only the dispute row for this client reference.
    #[arg(long, value_name = "REF", conflicts_with_all = ["test", "report"])]
    client: Option<String>,

    /// Check connectivity to the queue, the warehouse and the profile service.
    #[arg(long, conflicts_with = "report")]
    test: bool,

    /// Print a system status report.
    #[arg(long)]
    report: bool,

    /// TOML file overriding the built-in business rules.
    #[arg(long, value_name = "PATH")]
    rules: Option<PathBuf>,

    /// Debug-level logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = telemetry::init_tracing(&LoggingConfig::from_env(), cli.verbose) {
        eprintln!("Failed to initialise logging: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("Critical error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = AgentConfig::from_env(cli.rules.as_deref()).context("Configuration error")?;
    info!(
        sheet_id = %config.smartsheet.sheet_id,
        warehouse = %config.warehouse.base_url,
        profile = %config.profile.base_url,
        rules = ?config.rules_path,
        "Dispute agent starting"
    );

    let warehouse = SnowflakeClient::new(&config.warehouse)?;
    let profiles = ProfileClient::new(&config.profile)?;

    if cli.test {
        let queue = match SmartsheetClient::connect(&config.smartsheet, config.rules.clone()).await
        {
            Ok(queue) => Some(queue),
            Err(e) => {
                warn!("Queue store unavailable: {e}");
                None
            }
        };
        let status = report::check_connections(
            queue.as_ref().map(|q| q as &dyn QueueStore),
            &warehouse,
            &profiles,
        )
        .await;
        print_json(&status)?;
        return Ok(if status.all_connected() {
            info!("All collaborators reachable");
            ExitCode::SUCCESS
        } else {
            warn!("Connectivity check failed");
            ExitCode::FAILURE
        });
    }

    let queue = SmartsheetClient::connect(&config.smartsheet, config.rules.clone())
        .await
        .context("Failed to open the dispute queue")?;
    let audit = AuditTrail::with_file(&config.audit_path);

    if cli.report {
        let status =
            report::check_connections(Some(&queue as &dyn QueueStore), &warehouse, &profiles)
                .await;
        let report = SystemReport::new(
            status,
            ConfigurationEcho::new(&config),
            RunStats::default(),
            audit.summary(),
        );
        print_json(&report)?;
        return Ok(ExitCode::SUCCESS);
    }

    let orchestrator = Orchestrator::new(
        Collaborators {
            queue: &queue,
            warehouse: &warehouse,
            profiles: &profiles,
            audit: &audit,
        },
        &config.rules,
        EvidenceWriter::new(&config.evidence_dir),
    );
    let mut collector = RunCollector::new();

    if let Some(client_reference) = cli.client.as_deref() {
        let report = tokio::select! {
            result = orchestrator.process_client_reference(client_reference, &mut collector) => {
                result.context("Single client run failed")?
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted");
                return Ok(ExitCode::FAILURE);
            }
        };
        print_json(&report)?;
        return Ok(if report.success {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let interrupted = tokio::select! {
        result = orchestrator.run(&mut collector) => {
            result.context("Dispute run failed")?;
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };

    let summary = collector.finalize(audit.summary());
    summary.emit();
    print_json(&summary)?;

    if interrupted {
        warn!("Run interrupted; statistics cover the rows finished so far");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
