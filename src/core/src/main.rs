use log::{error, info};
use netsniff::configuration::config::Config;
use netsniff::controller::controller_handler::Controller;

#[tokio::main]
async fn main() {
    // RUST_LOG overrides the default level
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    println!(
        "
==============================================================================
   netsniff v{}  -  live packet capture, streaming and durable upload
==============================================================================
",
        env!("CARGO_PKG_VERSION")
    );

    info!("Importing configuration");

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to import configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration imported successfully");

    let mut controller = match Controller::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    let result = tokio::spawn(async move {
        info!("Spawning the controller");
        controller.run().await
    });

    match result.await {
        Ok(Ok(())) => info!("Shutdown complete"),
        Ok(Err(e)) => {
            error!("Error occured in the controller process: {}, exiting...", e);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Error joining at the end of execution: {:?}", e);
            std::process::exit(1);
        }
    }
}
