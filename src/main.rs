use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use mixboard::{
    application::{
        catalog::CatalogService,
        error::AppError,
        pages::CatalogPages,
        provider::MusicProvider,
        repos::CatalogRepo,
        session::{CatalogSession, SessionOptions},
    },
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState, HttpState, RouterState},
        memory::InMemoryCatalog,
        spotify::SpotifyClient,
        telemetry,
    },
    regen::PageScheduler,
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repo = init_repository(&settings).await?;
    let provider: Arc<dyn MusicProvider> =
        Arc::new(SpotifyClient::new(&settings.provider).map_err(AppError::from)?);
    if settings.provider.credentials.is_none() {
        warn!(
            target = "mixboard::startup",
            "provider credentials are not configured; requests are sent unauthenticated"
        );
    }

    let state = build_router_state(repo, provider, &settings);

    match state.http.scheduler.enumerate().await {
        Ok(report) => info!(
            target = "mixboard::startup",
            known = report.known,
            built = report.built,
            missing = report.missing,
            failed = report.failed,
            "prerendered catalog pages"
        ),
        Err(err) => warn!(
            target = "mixboard::startup",
            error = %err,
            "could not enumerate catalog; pages will be built on demand"
        ),
    }

    serve_http(&settings, state).await
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let database_url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| {
            InfraError::configuration(
                "database url is required (provide --database-url or set MIXBOARD__DATABASE__URL)",
            )
        })
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, 1)
        .await
        .map_err(|err| AppError::from(InfraError::database(err)))?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::migration(err)))?;

    info!(target = "mixboard::migrate", "migrations applied");
    Ok(())
}

async fn init_repository(settings: &config::Settings) -> Result<Arc<dyn CatalogRepo>, AppError> {
    let Some(database_url) = settings.database.url.as_deref() else {
        warn!(
            target = "mixboard::startup",
            "database url is not configured; using the in-memory catalog, data will not survive a restart"
        );
        return Ok(Arc::new(InMemoryCatalog::new()));
    };

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err)))?;

    if settings.database.run_migrations {
        PostgresRepositories::run_migrations(&pool)
            .await
            .map_err(|err| AppError::from(InfraError::migration(err)))?;
    }

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_router_state(
    repo: Arc<dyn CatalogRepo>,
    provider: Arc<dyn MusicProvider>,
    settings: &config::Settings,
) -> RouterState {
    let catalog = CatalogService::new(repo);
    let pages = CatalogPages::new(
        catalog.clone(),
        Arc::clone(&provider),
        settings.catalog.list_limit.get(),
    );
    let scheduler = PageScheduler::with_not_found_limit(
        Arc::new(pages),
        settings.catalog.staleness_window,
        settings.catalog.not_found_limit,
    );
    let session = Arc::new(CatalogSession::new(
        catalog.clone(),
        Arc::clone(&provider),
        SessionOptions {
            search_quiet: settings.search.debounce,
            search_limit: settings.search.limit.get(),
        },
    ));

    RouterState {
        http: HttpState {
            scheduler: scheduler.clone(),
            catalog: catalog.clone(),
        },
        api: ApiState {
            catalog,
            session,
            provider,
            scheduler,
        },
    }
}

async fn serve_http(settings: &config::Settings, state: RouterState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let addr = settings.server.addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| AppError::from(InfraError::Bind { addr, source }))?;
    info!(target = "mixboard::startup", addr = %addr, "listening");

    let stopping = Arc::new(Notify::new());
    let signal = Arc::clone(&stopping);
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signal.notify_one();
        })
        .into_future();

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = drain_deadline(stopping, settings.server.graceful_shutdown) => {
            warn!(
                target = "mixboard::shutdown",
                grace_seconds = settings.server.graceful_shutdown.as_secs(),
                "connections still open after the grace period; exiting"
            );
        }
    }

    info!(target = "mixboard::shutdown", "server stopped");
    Ok(())
}

async fn drain_deadline(stopping: Arc<Notify>, grace: Duration) {
    stopping.notified().await;
    tokio::time::sleep(grace).await;
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(target = "mixboard::shutdown", error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!(target = "mixboard::shutdown", "shutdown requested");
}
