// Warden AI coding agent
// Main entry point for the warden binary

use clap::{CommandFactory, Parser};
use sdk::errors::{EngineError, WardenErrorExt};
use warden_engine::cli::Cli;
use warden_engine::config::Config;
use warden_engine::handlers::{api_key_from_env, handle_run, OutputFormat};
use warden_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is normal; the variable may already be exported
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    let Some(prompt) = cli.prompt_text() else {
        eprintln!("{}", Cli::command().render_usage());
        eprintln!("Example: warden \"How do I fix the calculator?\"");
        std::process::exit(1);
    };

    let api_key = match api_key_from_env() {
        Ok(key) => key,
        Err(e) => exit_with(&e),
    };

    // Load configuration; --workspace replaces the file's value before validation
    let config = match Config::load(cli.config.as_deref(), cli.workspace.as_deref()) {
        Ok(config) => config,
        Err(e) => exit_with(&e),
    };

    // RUST_LOG still wins over both
    init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Warden v{} ({} - {})", version, commit, timestamp);

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    if let Err(e) = handle_run(&prompt, &config, api_key, format, cli.verbose).await {
        if let Some(engine_error) = e.downcast_ref::<EngineError>() {
            eprintln!("Hint: {}", engine_error.user_hint());
        }
        return Err(e);
    }

    Ok(())
}

fn exit_with(error: &EngineError) -> ! {
    eprintln!("Error: {}", error);
    eprintln!("Hint: {}", error.user_hint());
    std::process::exit(1);
}
