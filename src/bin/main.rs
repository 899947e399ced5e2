use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;
use customization_orchestrator::{DatabaseConfig, OrchestratorConfig, create_orchestrator};

#[derive(Parser)]
#[command(name = "customization-orchestrator")]
#[command(about = "Model customization job orchestrator")]
struct Cli {
    /// Config file; overrides ORCHESTRATOR_CONFIG and the default locations
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the job REST API
    Server {
        /// Bind address, e.g. 0.0.0.0:8080
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
        #[arg(long, default_value = "memory")]
        db_url: String,
    },
    /// Initialize the database
    Init {
        #[arg(long, default_value = "memory")]
        db_url: String,
    },
    /// Print the resolved configuration and exit
    CheckConfig,
}

fn load_config(path: Option<PathBuf>) -> Result<OrchestratorConfig> {
    match path {
        Some(path) => {
            let config = OrchestratorConfig::from_file(&path)?;
            config.validate()?;
            Ok(config)
        }
        None => OrchestratorConfig::load(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("customization_orchestrator=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server { bind, db_url } => {
            let config = load_config(cli.config)?;
            info!(
                "Customizer at {}, deployments at {}, namespace {}",
                config.nemo_url(),
                config.nim_url(),
                config.namespace
            );

            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url for REST server: {}", db_config.url);

            let orchestrator = create_orchestrator(config, db_config).await?;
            let app = customization_orchestrator::api::create_router(orchestrator);

            let listener = tokio::net::TcpListener::bind(&bind).await?;
            info!("Server listening on http://{}", bind);

            axum::serve(listener, app).await?;
        }
        Commands::Init { db_url } => {
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url for initialization: {}", db_config.url);

            info!("Initializing database...");
            let db = customization_orchestrator::create_connection(db_config).await?;
            customization_orchestrator::ensure_schema(&db).await?;
            info!("Database initialized successfully");
        }
        Commands::CheckConfig => {
            let config = load_config(cli.config)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
