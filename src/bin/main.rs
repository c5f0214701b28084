use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use budsafe_gateway::{AuthConfig, DatabaseConfig, Store, create_app, create_pool};

#[derive(Parser)]
#[command(name = "budsafe-gateway")]
#[command(about = "Authenticated data-access gateway for license and compliance records")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Bind address, e.g. 0.0.0.0:8080
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
        #[arg(long, env = "DATABASE_URL")]
        db_url: Option<String>,
        /// Firebase project whose ID tokens are accepted
        #[arg(long, env = "FIREBASE_PROJECT_ID")]
        firebase_project: Option<String>,
        /// JWKS endpoint URL for RS256 signature verification
        #[arg(long, env = "BUDSAFE_JWKS_URL")]
        jwks_url: Option<String>,
        /// JWT issuer for validation
        #[arg(long, env = "BUDSAFE_JWT_ISSUER")]
        jwt_issuer: Option<String>,
        /// JWT audience for validation
        #[arg(long, env = "BUDSAFE_JWT_AUDIENCE")]
        jwt_audience: Option<String>,
    },
    /// Check that the database is reachable
    CheckDb {
        #[arg(long, env = "DATABASE_URL")]
        db_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("budsafe_gateway=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            db_url,
            firebase_project,
            jwks_url,
            jwt_issuer,
            jwt_audience,
        } => {
            let db_config = database_config(db_url);
            let auth_config =
                build_auth_config(firebase_project, jwks_url, jwt_issuer, jwt_audience)?;
            info!("Verifying ID tokens against {}", auth_config.jwks_url);

            let app = create_app(&db_config, &auth_config)?;
            let listener = tokio::net::TcpListener::bind(&bind).await?;
            info!("Gateway listening on http://{}", bind);

            axum::serve(listener, app).await?;
        }
        Commands::CheckDb { db_url } => {
            let store = Store::new(create_pool(&database_config(db_url))?);
            store.ping().await?;
            println!("Database is reachable.");
        }
    }

    Ok(())
}

fn database_config(db_url: Option<String>) -> DatabaseConfig {
    let mut config = DatabaseConfig::default();
    if let Some(url) = db_url {
        config.url = url;
    }
    config
}

/// Build verification config from CLI arguments.
///
/// An explicit JWKS URL wins over the Firebase project shortcut.
fn build_auth_config(
    firebase_project: Option<String>,
    jwks_url: Option<String>,
    jwt_issuer: Option<String>,
    jwt_audience: Option<String>,
) -> Result<AuthConfig> {
    if let Some(url) = jwks_url {
        if jwt_issuer.is_none() {
            tracing::warn!("JWKS configured without an issuer; `iss` will not be checked");
        }
        return Ok(AuthConfig::with_jwks(url, jwt_issuer, jwt_audience));
    }

    match firebase_project {
        Some(project) => {
            let mut config = AuthConfig::firebase(&project);
            if jwt_issuer.is_some() {
                config.issuer = jwt_issuer;
            }
            if jwt_audience.is_some() {
                config.audience = jwt_audience;
            }
            Ok(config)
        }
        None => bail!("Set --firebase-project or --jwks-url to enable token verification"),
    }
}
