//! Incident bot binary.
//!
//! Serves the slash command and paging webhooks, and helps obtain the Google
//! refresh token the calendar and notes integrations need.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::{theme::ColorfulTheme, Input};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use incident::google::{auth, GoogleEndpoints};
use incident::{config::Config, server, Integrations};

/// Slash-command incident response bot.
#[derive(Parser)]
#[command(name = "incident-bot")]
#[command(about = "Open incident channels, page on-call and collect incident artifacts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service (default)
    Serve,

    /// Obtain a Google refresh token interactively
    GoogleToken {
        /// OAuth2 client id
        #[arg(long, env = "GOOGLEAPI_CLIENT_ID")]
        client_id: String,

        /// OAuth2 client secret
        #[arg(long, env = "GOOGLEAPI_CLIENT_SECRET", hide_env_values = true)]
        client_secret: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve().await,
        Commands::GoogleToken {
            client_id,
            client_secret,
        } => google_token(&client_id, &client_secret).await,
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("incident=info,incident_bot=info"))?;
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    Ok(())
}

async fn serve() -> Result<()> {
    info!("Starting incident bot...");

    let config = Arc::new(Config::from_env().context("Invalid configuration")?);

    if config.dry_run {
        info!(dry_run = true, "Dry run enabled, no outbound side effects");
    }

    let integrations = Integrations::from_config(&config);
    let state = server::AppState::new(Arc::clone(&config), integrations);

    // Build router
    let app = server::build_router(state);

    // Bind and serve
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(port = config.port, "Incident bot listening");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

async fn google_token(client_id: &str, client_secret: &str) -> Result<()> {
    println!("Authorize this app by visiting this URL:\n");
    println!("{}\n", auth::authorization_url(client_id));
    println!(
        "After approving, the browser is sent to {}; copy the `code` query parameter.\n",
        auth::REDIRECT_URI
    );

    let code: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Authorization code")
        .interact_text()?;

    let token = auth::exchange_code(client_id, client_secret, code.trim(), &GoogleEndpoints::default())
        .await
        .context("Failed to exchange authorization code")?;

    let refresh_token = token
        .refresh_token
        .context("Google did not return a refresh token; revoke the app's access and retry")?;

    println!("\nSet this in the service environment:\n");
    println!("GOOGLE_REFRESH_TOKEN={refresh_token}");

    Ok(())
}
