use tracing::error;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = eventhub::start_server().await {
        error!(error = %e, "server failed");
        std::process::exit(1);
    }
}
