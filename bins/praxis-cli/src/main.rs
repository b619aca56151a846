mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "praxis-cli")]
#[command(about = "Praxis CLI - Author, check, and grade exercises locally", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check an exercise definition against the publishing gate
    Check {
        /// Path to the exercise JSON file
        #[arg(short, long)]
        exercise: String,
    },

    /// Grade a submission file against an exercise
    Grade {
        /// Path to the exercise JSON file
        #[arg(short, long)]
        exercise: String,

        /// Path to the submission source file
        #[arg(short, long)]
        submission: String,
    },

    /// Scaffold a new exercise definition
    Init {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        path: String,

        /// Exercise slug (e.g., intro-heading)
        #[arg(short, long)]
        slug: String,

        /// Exercise title
        #[arg(short, long)]
        title: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { exercise } => {
            commands::check_exercise(&exercise).await?;
        }
        Commands::Grade {
            exercise,
            submission,
        } => {
            commands::grade_submission(&exercise, &submission).await?;
        }
        Commands::Init { path, slug, title } => {
            commands::init_exercise(&path, &slug, &title).await?;
        }
    }

    Ok(())
}
