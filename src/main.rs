use std::path::PathBuf;

use clap::{Parser, Subcommand};

use panic_bell::{console, settings};

/// Panic-button voice dispatch and announcement clip editing
#[derive(Parser)]
#[command(name = "panic-bell")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a panic message and send it (interactive)
    Record,

    /// Render a waveform preview of an audio file
    Preview {
        file: PathBuf,
        /// Clip start in seconds
        #[arg(long)]
        start: Option<f64>,
        /// Clip end in seconds
        #[arg(long)]
        end: Option<f64>,
        /// PNG output path
        #[arg(long, default_value = "waveform.png")]
        out: PathBuf,
    },

    /// Upload a new song with its clip bounds
    UploadSong {
        file: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long)]
        start: f64,
        #[arg(long)]
        end: f64,
    },

    /// Check that the microphone can be opened
    CheckMic,

    /// Show or update the saved settings
    Config {
        /// Announcement server base URL
        #[arg(long)]
        server_url: Option<String>,
        /// Auto-stop recordings after this many seconds
        #[arg(long)]
        max_recording_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file if present (for development convenience)
    let _ = dotenvy::dotenv();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let settings = settings::load_settings();

    let result = match cli.command {
        Commands::Record => console::record(&settings).await,
        Commands::Preview {
            file,
            start,
            end,
            out,
        } => console::preview(&settings, &file, start, end, &out).await,
        Commands::UploadSong {
            file,
            name,
            start,
            end,
        } => console::upload_song(&settings, &file, &name, start, end).await,
        Commands::CheckMic => console::check_mic().await,
        Commands::Config {
            server_url,
            max_recording_secs,
        } => console::configure(server_url, max_recording_secs),
    };

    if let Err(e) = result {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
