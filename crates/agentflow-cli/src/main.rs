//! agentflow CLI: register workflow jobs and run the polling engine that
//! drives external coding agents through them.

use agentflow_cli::commands;
use agentflow_core::OrchestratorConfig;
use clap::{Parser, Subcommand};

/// agentflow: orchestrate long-running coding agents
#[derive(Parser)]
#[command(name = "agentflow", version, about = "agentflow: orchestrate long-running coding agents")]
pub struct Cli {
    /// Path to the SQLite database file
    #[arg(long, env = "AGENTFLOW_DB_PATH", default_value = "agentflow.db")]
    db: String,

    /// Agent API base URL
    #[arg(long, env = "AGENTFLOW_API_BASE_URL", default_value = "https://api.cursor.com")]
    api_base_url: String,

    /// Agent API key (`${VAR}` references are expanded)
    #[arg(long, env = "CURSOR_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a job for a workflow file
    Add {
        /// Path to the workflow YAML file
        workflow: String,
    },

    /// List jobs as JSON
    List {
        /// Only jobs in this status (CREATING, RUNNING, FINISHED, ERROR, EXPIRED)
        #[arg(long)]
        status: Option<String>,
    },

    /// Delete a job, its fan-out children and their agents
    Delete {
        /// Job ID
        job_id: String,
    },

    /// Run a single polling cycle and exit
    Poll {
        /// Maximum jobs processed concurrently
        #[arg(long, env = "AGENTFLOW_MAX_CONCURRENT_JOBS", default_value_t = 8)]
        max_concurrent_jobs: usize,
    },

    /// Poll every interval until Ctrl-C
    Run {
        /// Seconds between polling cycles
        #[arg(long, env = "AGENTFLOW_POLL_INTERVAL_SECS", default_value_t = 30)]
        poll_interval_secs: u64,
        /// Maximum jobs processed concurrently
        #[arg(long, env = "AGENTFLOW_MAX_CONCURRENT_JOBS", default_value_t = 8)]
        max_concurrent_jobs: usize,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agentflow_core=info,agentflow=info".into()),
        )
        .init();

    let mut config = OrchestratorConfig::from_env();
    config.api_base_url = cli.api_base_url;
    if !cli.api_key.is_empty() {
        config.api_key = cli.api_key;
    }

    let Some(command) = cli.command else {
        // No subcommand: show help
        use clap::CommandFactory;
        Cli::command().print_help().ok();
        println!();
        return;
    };

    let state = match commands::init_state(&cli.db, &config) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match command {
        Commands::Add { workflow } => commands::job::add(&state, &workflow).await.map(|_| ()),
        Commands::List { status } => commands::job::list(&state, status.as_deref())
            .await
            .map(|_| ()),
        Commands::Delete { job_id } => commands::job::delete(&state, &job_id).await.map(|_| ()),
        Commands::Poll {
            max_concurrent_jobs,
        } => {
            config.max_concurrent_jobs = max_concurrent_jobs;
            commands::poll::once(&state, &config).await.map(|_| ())
        }
        Commands::Run {
            poll_interval_secs,
            max_concurrent_jobs,
        } => {
            config.poll_interval_secs = poll_interval_secs;
            config.max_concurrent_jobs = max_concurrent_jobs;
            commands::poll::run(&state, &config).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
