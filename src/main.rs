//! banwarden - CIDR ban list with chat approval and firewall sync.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use banwarden::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Shell => banwarden::commands::shell::run(&cli.config).await,
        Commands::Exec { text, actor_link } => {
            banwarden::commands::exec::run(&text.join(" "), actor_link.as_deref(), &cli.config)
                .await
        }
        Commands::Show { living } => banwarden::commands::show::run(living, &cli.config).await,
        Commands::Sweep => banwarden::commands::sweep::run(&cli.config).await,
        Commands::Request { user, text } => {
            banwarden::commands::request::run(&user, &text.join(" "), &cli.config).await
        }
        Commands::Respond { payload } => {
            banwarden::commands::respond::run(&payload, &cli.config).await
        }
        Commands::HelpGrammar => {
            println!("{}", banwarden::command::help());
            Ok(())
        }
        Commands::Version => {
            println!("banwarden {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
