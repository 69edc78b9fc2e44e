use clap::{Parser, Subcommand};
use squarecam::commands::{handle_record, handle_transform, RecordOptions, TransformOptions};
use squarecam::utils::{AppError, ErrorResponse};
use std::path::PathBuf;

/// Record a short camera clip, crop it square and resize it
#[derive(Parser)]
#[command(name = "squarecam")]
#[command(version)]
#[command(
    after_help = "CONFIGURATION:\n    JSON file passed with --config; every field is optional.\n    Logging is controlled with RUST_LOG (default: squarecam=debug)."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record from the camera
    ///
    /// Press Enter to start or stop, `s` to switch camera, `q` to quit.
    /// Recordings stop on their own at the configured maximum duration.
    #[command(visible_alias = "r")]
    Record {
        /// Configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Maximum recording length in seconds
        #[arg(short = 'd', long, value_name = "SECONDS")]
        max_duration: Option<u32>,

        /// Directory the final clips are saved into
        #[arg(short, long, value_name = "DIR")]
        library: Option<PathBuf>,
    },

    /// Crop and resize an existing movie
    #[command(visible_alias = "t")]
    Transform {
        /// Movie to transform
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Configuration file
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Directory the final clip is saved into
        #[arg(short, long, value_name = "DIR")]
        library: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    squarecam::init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Record {
            config,
            max_duration,
            library,
        } => {
            handle_record(RecordOptions {
                config,
                max_duration,
                library,
            })
            .await
        }
        Commands::Transform {
            input,
            config,
            library,
        } => {
            handle_transform(TransformOptions {
                input,
                config,
                library,
            })
            .await
        }
    };

    if let Err(e) = result {
        let code = match e.downcast::<AppError>() {
            Ok(app_error) => {
                let exit_code = if app_error.is_fatal() { 2 } else { 1 };
                let response = ErrorResponse::from(app_error);
                tracing::error!("{}: {}", response.code, response.message);
                eprintln!("error [{}]: {}", response.code, response.message);
                exit_code
            }
            Err(e) => {
                tracing::error!("{:#}", e);
                eprintln!("error: {:#}", e);
                1
            }
        };
        std::process::exit(code);
    }
}
