use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Auto,
    Gemini,
    Openai,
}

/// How the executor turns a plan into concurrent work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    /// Dependency-ordered batches derived from each step's parallel hint.
    Batched,
    /// Every step in a single fork-join batch.
    Flat,
}

#[derive(Debug, Subcommand)]
pub enum ProfileCommands {
    #[command(about = "List configured profiles and highlight the active profile")]
    List,
    #[command(about = "Show the active profile's resolved runtime settings")]
    Show,
}

#[derive(Debug, Subcommand)]
pub enum TelemetryCommands {
    #[command(about = "Summarize telemetry events from a JSONL stream")]
    Report {
        #[arg(long)]
        path: Option<String>,
        #[arg(long, default_value_t = 5000)]
        limit: usize,
    },
}

const CLI_EXAMPLES: &str = "Examples:\n\
  ops-assistant ask \"What's the weather in Delhi and the latest tech news in India?\"\n\
  ops-assistant ask --trace \"Convert 250 USD to INR\"\n\
  ops-assistant plan \"Find 3 romantic cafes in Indiranagar, Bangalore\"\n\
  ops-assistant execute --plan-file plan.json\n\
  ops-assistant --provider openai --model gpt-4o-mini chat\n\
  ops-assistant --max-concurrency 2 --schedule flat ask \"Stars on rust-lang/rust and weather in Pune\"\n\
  ops-assistant serve --host 127.0.0.1 --port 8788\n\
  ops-assistant tools\n\
  ops-assistant doctor\n\
  ops-assistant telemetry report --limit 2000\n\
\n\
Credentials are read from the environment (or a .env file):\n\
  GEMINI_API_KEY / OPENAI_API_KEY for planning and verification,\n\
  WEATHER_API_KEY, NEWS_API_KEY, EXCHANGE_RATE_KEY, TOMTOM_API_KEY, GITHUB_TOKEN (optional) for tools.";

#[derive(Debug, Parser)]
#[command(name = "ops-assistant")]
#[command(about = "Planner/executor/verifier operations assistant backed by REST tools")]
#[command(after_long_help = CLI_EXAMPLES)]
pub struct Cli {
    #[arg(long, env = "OPS_PROVIDER", value_enum, default_value_t = Provider::Auto)]
    pub provider: Provider,

    #[arg(long, env = "OPS_MODEL")]
    pub model: Option<String>,

    #[arg(long, env = "OPS_LLM_BASE_URL")]
    pub llm_base_url: Option<String>,

    #[arg(long, env = "OPS_PROFILE", default_value = "default")]
    pub profile: String,

    #[arg(long, env = "OPS_CONFIG", default_value = ".ops-assistant/config.toml")]
    pub config_path: String,

    #[arg(long, env = "OPS_TOOL_TIMEOUT_SECS")]
    pub tool_timeout_secs: Option<u64>,

    #[arg(long, env = "OPS_LLM_TIMEOUT_SECS")]
    pub llm_timeout_secs: Option<u64>,

    #[arg(long, env = "OPS_MAX_CONCURRENCY")]
    pub max_concurrency: Option<usize>,

    #[arg(long, env = "OPS_SCHEDULE", value_enum)]
    pub schedule: Option<ScheduleMode>,

    #[arg(long, env = "OPS_CACHE_TTL_SECS")]
    pub cache_ttl_secs: Option<u64>,

    #[arg(long, env = "OPS_TELEMETRY_ENABLED", action = clap::ArgAction::Set)]
    pub telemetry_enabled: Option<bool>,

    #[arg(long, env = "OPS_TELEMETRY_PATH")]
    pub telemetry_path: Option<String>,

    #[arg(long, env = "OPS_SHOW_SENSITIVE_CONFIG", default_value_t = false)]
    pub show_sensitive_config: bool,

    #[arg(long, env = "RUST_LOG", default_value = "error")]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Plan, execute and verify a one-shot request and print the final answer")]
    Ask {
        #[arg(required = true)]
        prompt: Vec<String>,
        #[arg(long, default_value_t = false)]
        trace: bool,
    },
    #[command(about = "Run interactive mode (each request is planned independently)")]
    Chat,
    #[command(about = "Print the plan the planner produces for a request")]
    Plan {
        #[arg(required = true)]
        prompt: Vec<String>,
    },
    #[command(about = "Execute a JSON plan file against the tool registry")]
    Execute {
        #[arg(long)]
        plan_file: String,
    },
    #[command(about = "List registered tools and their parameter schemas")]
    Tools,
    #[command(about = "Run HTTP server mode for plan, execute and ask endpoints")]
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8788)]
        port: u16,
    },
    #[command(about = "Validate provider and tool credentials")]
    Doctor,
    #[command(about = "Inspect profile configuration and active resolved profile state")]
    Profiles {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    #[command(about = "Telemetry utilities and reporting")]
    Telemetry {
        #[command(subcommand)]
        command: TelemetryCommands,
    },
}

pub fn command_label(command: &Commands) -> String {
    match command {
        Commands::Ask { .. } => "ask".to_string(),
        Commands::Chat => "chat".to_string(),
        Commands::Plan { .. } => "plan".to_string(),
        Commands::Execute { .. } => "execute".to_string(),
        Commands::Tools => "tools".to_string(),
        Commands::Serve { .. } => "serve".to_string(),
        Commands::Doctor => "doctor".to_string(),
        Commands::Profiles { command } => match command {
            ProfileCommands::List => "profiles.list".to_string(),
            ProfileCommands::Show => "profiles.show".to_string(),
        },
        Commands::Telemetry { command } => match command {
            TelemetryCommands::Report { .. } => "telemetry.report".to_string(),
        },
    }
}
