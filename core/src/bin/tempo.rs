/// Tempo CLI
///
/// Compiles process definitions, runs them, and resumes suspended instances
/// from their checkpoints.
use tempo_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
