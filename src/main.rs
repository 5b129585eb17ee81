use clap::{Parser, Subcommand};
use proportional_symbols::{config, data, processing, render, server};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the per-family minima and attribute sequences of the dataset
    Summarize {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Write a symbol layer for every attribute, plus the legend
    Generate {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve symbol layers and the static map
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Summarize { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let families = &app_config.symbology.families;
            let features = data::load_data(&app_config)?;

            let minima = processing::summarize(&features, families)?;
            for (family, min) in &minima {
                println!("{}: minimum {}", family, min);
            }
            for seq in processing::attribute_sequences(&features, families) {
                println!("{}: {}", seq.family, seq.attributes.join(", "));
            }
        }
        Commands::Generate { config } => {
            info!("Generating symbol layers with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            let families = &app_config.symbology.families;

            // 1. Load Data
            let features = data::load_data(&app_config)?;

            // 2. Summarize; families without values are skipped
            let (minima, missing) = processing::summarize_partial(&features, families)?;
            for err in &missing {
                tracing::warn!("{}; skipping", err);
            }
            let sequences = processing::attribute_sequences(&features, families);

            // 3. Write layers
            let written = render::generate_layers(&app_config, &features, &minima, &sequences)?;

            info!("Generation complete: {} layers", written);
        }
        Commands::Serve { config } => {
            info!("Serving map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            let features = data::load_data(&app_config)?;

            server::start_server(app_config, features).await?;
        }
    }

    Ok(())
}
