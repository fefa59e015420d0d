use tracing::error;

#[tokio::main]
async fn main() {
    // Load .env if present; missing files are fine
    if let Err(e) = dotenvy::dotenv() {
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    if let Err(e) = driftsync::cli::run_cli().await {
        error!(error = %e, "command failed");
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
