//! examforge CLI: take timed exams from the terminal.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "examforge",
    version,
    about = "Timed exam sessions with auto-save and resume"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take an exam, reading commands from stdin
    Take {
        /// Exam id
        #[arg(long)]
        exam: String,

        /// Directory of exam files (default: exam_dir from config)
        #[arg(long)]
        exam_dir: Option<PathBuf>,

        /// Discard an unfinished session instead of resuming it
        #[arg(long)]
        restart: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate exam files
    Validate {
        /// Path to an exam file or directory
        #[arg(long)]
        exam_dir: PathBuf,
    },

    /// Show past attempts and statistics
    History {
        /// Only attempts at this exam
        #[arg(long)]
        exam: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List bookmarked questions
    Bookmarks {
        /// Only bookmarks from this exam
        #[arg(long)]
        exam: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Export history, bookmarks and settings to a JSON file
    Export {
        #[arg(long)]
        output: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Import a JSON export, replacing entries with the same key
    Import {
        #[arg(long)]
        input: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show or change settings
    Settings {
        /// Change a setting (e.g. "theme=dark")
        #[arg(long)]
        set: Option<String>,

        /// Restore the defaults
        #[arg(long, conflicts_with = "set")]
        reset: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config and a sample exam
    Init,
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("examforge=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Take {
            exam,
            exam_dir,
            restart,
            config,
        } => commands::take::execute(exam, exam_dir, restart, config).await,
        Commands::Validate { exam_dir } => commands::validate::execute(exam_dir),
        Commands::History { exam, config } => commands::history::execute(exam, config).await,
        Commands::Bookmarks { exam, config } => {
            commands::bookmarks::execute(exam, config).await
        }
        Commands::Export { output, config } => {
            commands::transfer::export(output, config).await
        }
        Commands::Import { input, config } => commands::transfer::import(input, config).await,
        Commands::Settings { set, reset, config } => {
            commands::settings::execute(set, reset, config).await
        }
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
