use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use serde_json::json;
use tracing::level_filters::LevelFilter;

use ops_assistant::chat::run_chat;
use ops_assistant::cli::{Cli, Commands, ProfileCommands, TelemetryCommands, command_label};
use ops_assistant::config::{DotenvStatus, load_dotenv, load_profiles, resolve_runtime_config};
use ops_assistant::doctor::run_doctor;
use ops_assistant::error::{categorize_error, format_cli_error};
use ops_assistant::profiles::{run_profiles_list, run_profiles_show};
use ops_assistant::runner::{run_ask, run_execute, run_plan, run_tools};
use ops_assistant::server::run_server;
use ops_assistant::telemetry::{TelemetrySink, run_telemetry_report};

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = load_dotenv();
    let cli = Cli::parse();
    let show_sensitive_config = cli.show_sensitive_config;
    if let Err(err) = run_cli(cli, dotenv).await {
        eprintln!("{}", format_cli_error(&err, show_sensitive_config));
        tracing::error!(category = %categorize_error(&err).code(), "command failed");
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(log_filter: &str) -> Result<()> {
    let level = log_filter
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_env_filter(log_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}

async fn run_cli(cli: Cli, dotenv: DotenvStatus) -> Result<()> {
    init_tracing(&cli.log_filter)?;
    dotenv.log();
    let profiles = load_profiles(&cli.config_path)?;
    let cfg = resolve_runtime_config(&cli, &profiles)?;

    let command = cli.command.unwrap_or(Commands::Chat);
    let label = command_label(&command);
    let telemetry = TelemetrySink::new(&cfg, label.clone());
    telemetry.emit("command.started", json!({ "profile": cfg.profile }));
    let started_at = Instant::now();

    let outcome = match command {
        Commands::Ask { prompt, trace } => {
            run_ask(&cfg, &telemetry, &prompt.join(" "), trace).await
        }
        Commands::Chat => run_chat(&cfg, &telemetry).await,
        Commands::Plan { prompt } => run_plan(&cfg, &telemetry, &prompt.join(" ")).await,
        Commands::Execute { plan_file } => run_execute(&cfg, &telemetry, &plan_file).await,
        Commands::Tools => run_tools(&cfg),
        Commands::Serve { host, port } => run_server(cfg.clone(), host, port, &telemetry).await,
        Commands::Doctor => run_doctor(&cfg),
        Commands::Profiles { command } => match command {
            ProfileCommands::List => run_profiles_list(&profiles, &cfg),
            ProfileCommands::Show => run_profiles_show(&cfg),
        },
        Commands::Telemetry { command } => match command {
            TelemetryCommands::Report { path, limit } => run_telemetry_report(&cfg, path, limit),
        },
    };

    let duration_ms = started_at.elapsed().as_millis() as u64;
    match &outcome {
        Ok(()) => telemetry.emit("command.completed", json!({ "duration_ms": duration_ms })),
        Err(err) => telemetry.emit(
            "command.failed",
            json!({
                "duration_ms": duration_ms,
                "category": categorize_error(err).code(),
            }),
        ),
    }
    tracing::debug!(command = %label, duration_ms, "Command finished");
    outcome
}
