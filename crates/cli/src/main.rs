//! Warehub CLI - Database migrations and pass administration.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! warehub migrate
//!
//! # Grant a user 10 credits valid for 3 months
//! warehub pass grant --user <uuid> --count 10 --months 3
//!
//! # Extend a user's pass by one month
//! warehub pass extend --user <uuid> --months 1
//!
//! # Show a user's pass
//! warehub pass show --user <uuid>
//!
//! # Report unlocks without a recorded charge
//! warehub audit --user <uuid>
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use warehub_core::UserId;

mod commands;

#[derive(Parser)]
#[command(name = "warehub")]
#[command(author, version, about = "Warehub CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage viewing passes
    Pass {
        #[command(subcommand)]
        action: PassAction,
    },
    /// Compare a user's unlocks against their charged usage (read-only)
    Audit {
        /// User ID
        #[arg(short, long)]
        user: UserId,
    },
}

#[derive(Subcommand)]
enum PassAction {
    /// Create or replace a user's pass
    Grant {
        /// User ID
        #[arg(short, long)]
        user: UserId,

        /// Number of view credits
        #[arg(short, long, value_parser = clap::value_parser!(i32).range(1..))]
        count: i32,

        /// Validity in months from now
        #[arg(short, long)]
        months: u32,
    },
    /// Extend a user's pass
    Extend {
        /// User ID
        #[arg(short, long)]
        user: UserId,

        /// Months to add (from the current expiry, or from now if lapsed)
        #[arg(short, long)]
        months: u32,
    },
    /// Show a user's pass
    Show {
        /// User ID
        #[arg(short, long)]
        user: UserId,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Pass { action } => match action {
            PassAction::Grant {
                user,
                count,
                months,
            } => commands::pass::grant(user, count, months).await?,
            PassAction::Extend { user, months } => commands::pass::extend(user, months).await?,
            PassAction::Show { user } => commands::pass::show(user).await?,
        },
        Commands::Audit { user } => commands::audit::run(user).await?,
    }
    Ok(())
}
