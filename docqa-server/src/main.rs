use clap::Parser;
use docqa_server::{ServerConfig, run_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = ServerConfig::parse();
    docqa_telemetry::init_telemetry("docqa-server", config.log_format)?;

    run_server(config).await
}
