pub mod config;

use config::PwmuxConfig;
use config_rs::{Config, File};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pwmux=debug,pwmux_devices=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() != 2 {
        warn!("usage: pwmux <config.yaml>");
        warn!("only one parameter, the config file, is expected.");
        warn!("got {}", args.join(","));
    } else if let Some(cfg_name) = args.get(1).map(|o| o.as_str()) {
        let config_res = Config::builder()
            .add_source(File::with_name(cfg_name))
            .build()
            .and_then(|config| config.try_deserialize::<PwmuxConfig>());

        match config_res {
            Ok(config) => {
                info!("pwmux starting up!");
                if let Some(ref name) = config.metadata.name {
                    info!("name: {name}")
                }
                if let Some(ref descrip) = config.metadata.description {
                    info!("description: {descrip}")
                }
                info!(
                    "{} drivers at {} Hz, channels 0..{}",
                    config.drivers.len(),
                    config.frequency,
                    config.num_channels()
                );
                for (first, last, target) in config.channel_blocks() {
                    info!("  channels {first:>3}..={last:<3} -> {target}");
                }
                if config.debug {
                    info!("per-command debug output is on");
                }
                match config.start().await {
                    Ok(_) => info!("pwmux shut down!"),
                    Err(err) => error!("pwmux exited with an error: {:?}", err),
                }
            }
            Err(err) => {
                error!("Error starting pwmux. Failed to parse config: {:?}", err);
            }
        }
    }
}
