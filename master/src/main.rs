use clap::Parser;
use log::{error, info};
use master::config::MasterArgs;
use master::network::MasterServer;
use shared::logging::init_logger;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = MasterArgs::parse();
    init_logger(args.log.as_deref());

    let config = args.load_config();
    info!("Starting {}...", config.name);

    let server = MasterServer::bind(&config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Master server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    Ok(())
}
