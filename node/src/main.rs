use clap::Parser;
use log::{error, info};
use node::config::NodeArgs;
use node::network::NodeServer;
use shared::logging::init_logger;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = NodeArgs::parse();
    init_logger(args.log.as_deref());

    let config = args.load_config();
    info!("Starting {} for region {}...", config.name, config.region);

    let server = NodeServer::bind(&config).await?;
    let link = server.link();
    link.start().await;

    let result = tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            Ok(())
        }
    };

    link.stop().await;
    info!("Stopped.");

    if let Err(e) = result {
        error!("Node server stopped: {}", e);
        return Err(e.into());
    }
    Ok(())
}
