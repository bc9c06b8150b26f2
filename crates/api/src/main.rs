use anyhow::Context;

use bookstore_infra::BookstoreConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bookstore_observability::init();

    let config = BookstoreConfig::from_env().context("invalid configuration")?;
    let (app, services) =
        bookstore_api::app::build_app_from_config(&config).context("failed to wire services")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .context("server error")?;

    tokio::task::spawn_blocking(move || services.shutdown()).await?;
    Ok(())
}
