//! CLI entry point for plasma-rnn-rs.

use std::path::Path;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plasma_rnn_rs::{checkpoint, PlasmaConfig, Result, Trainer};

#[derive(Parser)]
#[command(name = "plasma-rnn")]
#[command(about = "Scheduled-sampling RNN training for plasma state evolution")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file
    Validate {
        /// Path to configuration file
        config: String,
    },
    /// Start training
    Train {
        /// Path to configuration file
        config: String,
    },
    /// Generate a sample configuration file
    Init {
        /// Output path for config file
        #[arg(default_value = "config.yaml")]
        output: String,
        /// Model preset (rnn-lstm, rnn-linear, linear-dynamics)
        #[arg(long, default_value = "rnn-lstm")]
        preset: String,
    },
    /// Summarize a checkpoint directory
    Inspect {
        /// Checkpoint directory (`<output_dir>/<output_filename_base>`)
        checkpoint: String,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => {
            tracing::info!("Validating configuration: {}", config);
            let config = PlasmaConfig::from_file(&config)?;
            config.validate()?;
            let dims = config.signals.dims();
            println!("✓ Configuration is valid");
            println!("  Model: {}", config.model.model_type());
            println!("  Dataset: {}", config.data.path);
            println!(
                "  State: {} ({} profiles x {} points + {} parameters)",
                dims.state_dim,
                config.signals.profiles.len(),
                config.signals.profile_grid_points,
                config.signals.parameters.len()
            );
            println!("  Actuators: {}", dims.actuator_dim);
        }
        Commands::Train { config } => {
            tracing::info!("Starting training with config: {}", config);
            let config = PlasmaConfig::from_file(&config)?;
            config.validate()?;

            let mut trainer = Trainer::new(config)?;
            let report = trainer.train()?;
            println!(
                "✓ Trained {} epochs; checkpoint at: {}",
                report.train_losses.len(),
                report.checkpoint_dir.display()
            );
        }
        Commands::Init { output, preset } => {
            tracing::info!("Generating config for preset: {}", preset);
            let config = PlasmaConfig::from_preset(&preset)?;
            config.to_file(&output)?;
            println!("✓ Configuration written to: {output}");
        }
        Commands::Inspect { checkpoint } => {
            let metadata = checkpoint::load_metadata(Path::new(&checkpoint))?;
            let dims = metadata.dims();
            println!("Checkpoint: {checkpoint}");
            println!("  Model: {}", metadata.model.model_type());
            println!("  Epoch: {}", metadata.epoch + 1);
            println!("  State dim: {}", dims.state_dim);
            println!("  Actuator dim: {}", dims.actuator_dim);
            println!("  Validation digits: {:?}", metadata.val_indices);
            println!("  Optimizer steps: {}", metadata.optimizer_steps);
            match metadata.best_epoch() {
                Some(best) => println!(
                    "  Best epoch: {} (val {:.4e})",
                    best + 1,
                    metadata.val_losses[best]
                ),
                None => println!("  Best epoch: none"),
            }
        }
    }

    Ok(())
}
