// ABOUTME: Entry point for the imgferry CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;

use clap::Parser;
use cli::{AuthArgs, Cli, Commands, ImageCommand};
use imgferry::config::{self, Config};
use imgferry::error::Result;
use imgferry::output::Output;
use imgferry::runtime::LocalRuntime;
use imgferry::runtime::traits::RegistryAuth;
use imgferry::transfer::TransferCoordinator;
use imgferry::types::ImageRef;
use indicatif::HumanBytes;
use serde::Serialize;
use std::env;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let output = Output::new(cli.output);
    if let Err(e) = run(cli).await {
        output.error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cwd = env::current_dir()?;
    let command = match cli.command {
        Commands::Init { force } => {
            config::init_config(&cwd, force)?;
            Output::new(cli.output).success(&format!("Created {}", config::CONFIG_FILENAME));
            return Ok(());
        }
        Commands::Image(command) => command,
    };

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::discover_or_default(&cwd)?,
    };
    let mut settings = config.settings();
    if let Some(platform) = cli.platform {
        settings.platform = platform;
    }
    let timeout = settings.timeout;
    let store = cli.store.clone().unwrap_or_else(|| config.store_dir());
    let runtime = Arc::new(LocalRuntime::open(&store, config.registry_options())?);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, stopping progress output");
            on_interrupt.cancel();
        }
    });

    let coordinator =
        TransferCoordinator::new(runtime, cli.output.sink(), settings).with_cancellation(cancel);
    let mut output = Output::new(cli.output);
    output.start_timer();

    match command {
        ImageCommand::Pull { reference, auth } => {
            let auth = resolve_auth(&config, &auth, &[&reference])?;
            let image_config = coordinator
                .pull(&reference, auth.as_ref(), timeout)
                .await?;
            output.record(&image_config);
            output.success(&format!("Pulled {reference}"));
        }
        ImageCommand::Push { reference, auth } => {
            let auth = resolve_auth(&config, &auth, &[&reference])?;
            coordinator.push(&reference, auth.as_ref(), timeout).await?;
            output.success(&format!("Pushed {reference}"));
        }
        ImageCommand::Tag { source, target } => {
            coordinator.tag(&source, &target).await?;
            output.success(&format!("Tagged {source} as {target}"));
        }
        ImageCommand::Rm { reference } => {
            coordinator.remove(&reference).await?;
            output.success(&format!("Removed {reference}"));
        }
        ImageCommand::Ls => {
            let records = coordinator.list().await?;
            output.line(&format!("{:<60} {:<14} {:>10}  CREATED", "NAME", "DIGEST", "SIZE"));
            for record in &records {
                output.line(&format!(
                    "{:<60} {:<14} {:>10}  {}",
                    record.name,
                    record.target.digest.short(),
                    HumanBytes(record.target.size).to_string(),
                    record.created_at.format("%Y-%m-%d %H:%M:%S")
                ));
                output.record(record);
            }
            output.success(&format!("{} image(s)", records.len()));
        }
        ImageCommand::Save { reference, file } => {
            coordinator.save(&reference, &file).await?;
            output.success(&format!("Saved {reference} to {}", file.display()));
        }
        ImageCommand::Load { path } => {
            let names = coordinator.load(&path).await?;
            for name in &names {
                output.line(&format!("Loaded {name}"));
            }
            output.record(&Loaded { images: &names });
            output.success(&format!("Loaded {} image(s) from {}", names.len(), path.display()));
        }
        ImageCommand::Mirror {
            source,
            target,
            auth,
        } => {
            let auth = resolve_auth(&config, &auth, &[&source, &target])?;
            coordinator
                .mirror(&source, &target, auth.as_ref(), timeout)
                .await?;
            output.success(&format!("Mirrored {source} to {target}"));
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct Loaded<'a> {
    images: &'a [String],
}

/// Flags win over the config file; the first reference with configured
/// credentials supplies them otherwise.
fn resolve_auth(
    config: &Config,
    args: &AuthArgs,
    references: &[&str],
) -> Result<Option<RegistryAuth>> {
    if let (Some(username), Some(password)) = (&args.username, &args.password) {
        let server = references
            .first()
            .and_then(|r| ImageRef::parse(r).ok())
            .map(|r| r.registry().to_string());
        return Ok(Some(RegistryAuth {
            username: username.clone(),
            password: password.clone(),
            server,
        }));
    }
    for reference in references {
        let Ok(image) = ImageRef::parse(reference) else {
            continue;
        };
        if let Some(auth) = config.auth_for(image.registry())? {
            return Ok(Some(auth));
        }
    }
    Ok(None)
}
