use std::net::SocketAddr;

use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use leadflow::auth::password;
use leadflow::config::{AdminBootstrap, Config};
use leadflow::db;
use leadflow::mail::transport::DeliveryTransport;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(&config.log_level)
        }))
        .init();

    tracing::info!("Starting Leadflow");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!("Migrations applied");

    if let Some(admin) = &config.admin {
        bootstrap_admin(&pool, admin).await?;
    }

    if let Some(smtp) = &config.smtp {
        if config.sendgrid.is_none() {
            match leadflow::mail::smtp::SmtpTransport::new(smtp) {
                Ok(transport) => match transport.verify().await {
                    Ok(()) => tracing::info!("SMTP connection verified"),
                    Err(e) => tracing::warn!("{e}"),
                },
                Err(e) => tracing::warn!("SMTP not available: {e}"),
            }
        }
    }

    let addr = SocketAddr::new(config.host, config.port);
    let (app, state) = leadflow::build_app(pool, config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = leadflow::worker::spawn(state, shutdown_rx);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let _ = shutdown_tx.send(true);
    for handle in workers {
        let _ = handle.await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn bootstrap_admin(
    pool: &sqlx::PgPool,
    admin: &AdminBootstrap,
) -> Result<(), Box<dyn std::error::Error>> {
    if db::admin_users::find_by_email(pool, &admin.email).await?.is_some() {
        return Ok(());
    }

    let hash = password::hash(&admin.password)?;
    let user = db::admin_users::create(pool, &admin.email, &hash).await?;
    tracing::info!("Created admin user {}", user.email);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
