use askama::Template;
use axum::Router;
use axum::http::StatusCode;
use axum::response::Html;
use migration::MigratorTrait;
use sea_orm::Database;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::alerts::{DeadlineAlerts, create_alerts_router};
use crate::config::Config;
use crate::notifier::{Notifier, SmtpNotifier};
use crate::scheduler::{ReminderJob, Scheduler};
use crate::task::web::{TaskState, create_task_router};

/// Failure while rendering a page outside the task routes.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error("Page rendering failed")]
    Template(#[from] askama::Error),
}

/// Served when even the error template cannot be rendered.
const RENDER_FAILURE_PAGE: &str =
    "<h1>Something went wrong</h1><p>remindr could not render this page. Your tasks and reminders are unaffected.</p>";

impl axum::response::IntoResponse for WebError {
    fn into_response(self) -> axum::response::Response {
        tracing::error!("{:?}", self);
        (StatusCode::INTERNAL_SERVER_ERROR, Html(RENDER_FAILURE_PAGE)).into_response()
    }
}

/// Page shown when a request cannot be served.
#[derive(Template)]
#[template(path = "error_message.html")]
pub(crate) struct ErrorMessageTemplate {
    message: String,
}

impl ErrorMessageTemplate {
    pub fn new(message: String) -> Self {
        Self { message }
    }
}

/// Connects the database, starts the reminder scheduler and serves the web
/// interface until Ctrl-C. The scheduler is stopped before returning.
#[tracing::instrument(skip(config))]
pub async fn start_web_server(config: Config) -> anyhow::Result<()> {
    let server_address = format!("{}:{}", &config.host, &config.port);
    let listener = tokio::net::TcpListener::bind(&server_address).await?;
    tracing::info!("Web server running on http://{}", server_address);

    let db = Arc::new(Database::connect(&config.database_url).await?);
    migration::Migrator::up(db.as_ref(), None).await?;
    tracing::info!("Database migrations applied successfully");

    let notifier: Arc<dyn Notifier> = Arc::new(SmtpNotifier::from_config(&config)?);
    let alerts = DeadlineAlerts::new();

    let mut scheduler = Scheduler::new();
    scheduler.register_job(Arc::new(ReminderJob::new(
        db.clone(),
        notifier.clone(),
        config.fallback_recipient(),
        alerts.clone(),
        Duration::from_secs(config.check_interval_secs),
    )));
    scheduler.start()?;

    let app = create_app(db, notifier, alerts.clone());
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            alerts.close();
        })
        .await;

    scheduler.stop().await;
    tracing::info!("Reminder scheduler stopped");
    served?;
    Ok(())
}

/// Builds the application router over the given store, notifier and alert
/// channel.
pub fn create_app(
    db: Arc<sea_orm::DatabaseConnection>,
    notifier: Arc<dyn Notifier>,
    alerts: DeadlineAlerts,
) -> Router {
    let task_state = Arc::new(TaskState { db, notifier });

    Router::new()
        .route("/health", axum::routing::get(health_check_handler))
        .merge(create_task_router(task_state))
        .merge(create_alerts_router(alerts))
        .fallback(not_found_handler)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tracing::instrument]
pub async fn health_check_handler() -> &'static str {
    "OK"
}

#[tracing::instrument]
pub async fn not_found_handler() -> Result<(StatusCode, Html<String>), WebError> {
    let template = ErrorMessageTemplate::new("The page you requested does not exist.".to_string());
    let rendered = template.render()?;
    Ok((StatusCode::NOT_FOUND, Html(rendered)))
}
