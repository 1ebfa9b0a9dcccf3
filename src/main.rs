use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webhook_events::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webhook_events=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init { path, force }) => {
            webhook_events::cli::init::run(&path, force)?;
        }
        Some(Commands::Serve { host, port }) => {
            webhook_events::cli::serve::run(&cli.config, host, port).await?;
        }
        Some(Commands::Sign { secret, file }) => {
            webhook_events::cli::sign::sign(&secret, file.as_deref())?;
        }
        Some(Commands::Verify {
            secret,
            signature,
            file,
        }) => {
            webhook_events::cli::sign::verify(&secret, &signature, file.as_deref())?;
        }
        None => {
            // No subcommand provided, print help
            use clap::CommandFactory;
            Cli::command().print_help()?;
        }
    }

    Ok(())
}
