use clap::Parser;
use tracing_subscriber::EnvFilter;
use turnstile::{TurnstileBuilder, TurnstileBuilderError, TurnstileError};

/// Administrative command line interface for Turnstile
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database connection string
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://turnstile.db")]
    db_url: String,

    /// Command to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(clap::Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Delete expired login attempts
    Cleanup,
    /// Unlock an account by clearing its failed attempts
    Unlock {
        email: String,
    },
    /// Print the lockout status of an account as JSON
    Status {
        email: String,
    },
    /// Create a user that can sign in
    CreateUser {
        email: String,
        #[arg(long, env = "TURNSTILE_NEW_USER_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Print version information
    Version,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Build(#[from] TurnstileBuilderError),
    #[error(transparent)]
    Turnstile(#[from] TurnstileError),
    #[error("Failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("Turnstile v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let turnstile = TurnstileBuilder::new()
        .with_sqlite(&cli.db_url)
        .await?
        .with_config_from_env()?
        .build()
        .await?;

    match cli.command {
        Commands::Migrate => {
            println!("Running migrations...");
            turnstile.migrate().await?;
        }
        Commands::Cleanup => {
            let report = turnstile.cleanup().await?;
            println!("Deleted {} login attempts", report.attempts_deleted);
        }
        Commands::Unlock { email } => {
            let deleted = turnstile.reset_attempts(&email).await?;
            println!("Unlocked {email} ({deleted} failed attempts cleared)");
        }
        Commands::Status { email } => {
            let status = turnstile.check_lockout(&email).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::CreateUser {
            email,
            password,
            name,
        } => {
            let user = turnstile.create_user(&email, &password, name).await?;
            println!("Created user {} ({})", user.email, user.id);
        }
        Commands::Version => {}
    }

    Ok(())
}
