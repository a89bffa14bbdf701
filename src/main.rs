use std::sync::Arc;

use clap::Parser;
use miette::Result;
use tracing_subscriber::{fmt, EnvFilter};

use tungsten::authz::{loader, Policy};
use tungsten::backend::Backend;
use tungsten::{jobs, repository, settings, storage, web};

#[derive(Parser, Debug)]
#[command(
    name = "tungsten",
    version,
    about = "Account, balance and product API"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    let policy = match &settings.authz.policy_path {
        Some(path) => loader::load_policy(path)?,
        None => {
            tracing::info!("No policy file configured, using built-in policy");
            Policy::default()
        }
    };

    let db = storage::init(&settings.database).await?;
    repository::user::ensure_first_admin(&db, &settings.auth.first_admin).await?;

    let backend = Arc::new(Backend::start(&settings, policy, db).await?);

    // Kept alive for the lifetime of the server
    let _scheduler =
        jobs::init_scheduler(backend.rate_limiter().clone(), &settings.rate_limit).await?;

    web::serve(&settings, backend).await?;
    Ok(())
}
