use clap::{Parser, Subcommand};

mod commands;

use commands::{CliError, run_agents, run_cleanup, run_process, run_status};

#[derive(Parser, Debug)]
#[command(name = "conductor", version)]
#[command(about = "Conductor CLI - Plan, route and run requests across agents")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process one goal through the default orchestrator
    Process {
        /// Natural-language goal
        #[arg(long)]
        goal: String,
        /// Context object as JSON
        #[arg(long)]
        context: Option<String>,
        /// Requesting user
        #[arg(long)]
        user: Option<String>,
        /// Archive agents of this type before processing (repeatable)
        #[arg(long)]
        disable: Vec<String>,
    },
    /// List registered agents
    Agents,
    /// Show orchestrator status
    Status,
    /// Remove terminal tasks and conversations older than N days
    Cleanup {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
}

fn init_tracing(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let env_filter = match "info".parse() {
        Ok(directive) => env_filter.add_directive(directive),
        Err(_) => env_filter,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

async fn dispatch(command: Commands) -> Result<serde_json::Value, CliError> {
    match command {
        Commands::Process {
            goal,
            context,
            user,
            disable,
        } => run_process(goal, context, user, disable).await,
        Commands::Agents => run_agents().await,
        Commands::Status => run_status().await,
        Commands::Cleanup { days } => run_cleanup(days).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match dispatch(cli.command).await {
        Ok(output) => match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                tracing::error!(error = %e, "Failed to render output");
                std::process::exit(1);
            }
        },
        Err(e) => {
            tracing::error!(error = %e, code = e.code(), "Command failed");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
