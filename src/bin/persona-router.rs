#![forbid(unsafe_code)]

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use persona_router::{
    BatchRequest, BatchSummary, ChainRegistry, Context, Persona, PromptStore, RouterConfig,
    StaticPromptStore,
};

#[derive(Parser)]
#[command(name = "persona-router", version, about = "Multi-persona chat router")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the available personas
    Personas,
    /// Print the system prompt a persona would use
    Prompt {
        #[arg(long)]
        persona: String,
        /// Prompt override file (defaults to PERSONA_PROMPTS_PATH)
        #[arg(long)]
        prompts: Option<PathBuf>,
    },
    /// Send one message to a persona and print the result envelope
    Chat {
        #[arg(long)]
        persona: String,
        #[arg(long)]
        message: String,
        /// JSON object folded into the user turn
        #[arg(long)]
        context: Option<String>,
    },
    /// Run a JSON array of batch requests concurrently
    Batch {
        #[arg(long)]
        request: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Send a test message to every persona
    TestAll,
    /// Initialize every persona and print health plus metrics
    Health,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("persona_router=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn build_registry() -> Result<ChainRegistry, Box<dyn std::error::Error>> {
    let config = RouterConfig::from_env()?;
    let gateway = config.build_gateway()?;
    let prompts = config.build_prompt_store()?;
    Ok(ChainRegistry::new(gateway, prompts))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Personas => {
            for persona in Persona::ALL {
                let marker = if persona.is_sensitive() { "sensitive" } else { "-" };
                println!("{}\t{}\t{}", persona, persona.display_name(), marker);
            }
        }
        Commands::Prompt { persona, prompts } => {
            let persona: Persona = persona.parse()?;
            let path = prompts.or_else(|| std::env::var_os("PERSONA_PROMPTS_PATH").map(PathBuf::from));
            let store = match path {
                Some(path) => StaticPromptStore::load_from_path(path)?,
                None => StaticPromptStore::default(),
            };
            println!("{}", store.prompt(persona)?);
        }
        Commands::Chat {
            persona,
            message,
            context,
        } => {
            let context: Option<Context> = context
                .map(|raw| serde_json::from_str(&raw))
                .transpose()
                .map_err(|e| format!("--context must be a JSON object: {e}"))?;
            let registry = build_registry()?;
            let result = registry.chat(&persona, &message, context.as_ref()).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Batch { request, out } => {
            let raw = std::fs::read_to_string(&request)?;
            let requests: Vec<BatchRequest> = serde_json::from_str(&raw)?;
            let registry = build_registry()?;
            let summary = BatchSummary::from_results(registry.batch_chat(requests).await);
            let json = serde_json::to_string_pretty(&summary)?;
            match out {
                Some(path) => std::fs::write(path, json)?,
                None => println!("{json}"),
            }
        }
        Commands::TestAll => {
            let registry = build_registry()?;
            registry.preload();
            let results = registry.test_all().await;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Health => {
            let registry = build_registry()?;
            registry.preload();
            let report = serde_json::json!({
                "health": registry.health_status(),
                "metrics": registry.metrics_snapshot(None),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
