use axum::{
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Router,
};
use companion_backend::middleware::auth::{
    require_admin, require_auth, require_credential, require_doctor_or_admin,
};
use companion_backend::{
    config::{get_config, init_config},
    database::pool::create_pool,
    routes, ws, AppState,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    init_config()?;
    let config = get_config();

    let pool = create_pool().await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let app_state = AppState::new(pool);
    routes::health::mark_started();

    let base_routes = Router::new()
        .route("/health", get(routes::health::health))
        .route("/ws", get(ws::handlers::ws_handler));

    // The register and profile routes authenticate the raw credential only;
    // a directory entry may not exist yet.
    let credential_api = Router::new()
        .route("/api/users/register", post(routes::users::register))
        .route(
            "/api/users/me",
            get(routes::users::me).put(routes::users::update_me),
        )
        .layer(from_fn(require_credential));

    let chat_api = Router::new()
        .route("/api/chat/conversations", get(routes::chat::conversations))
        .route("/api/chat/messages", post(routes::chat::send_message))
        .route("/api/chat/messages/:id", get(routes::chat::history))
        .route(
            "/api/chat/messages/:id/read",
            patch(routes::chat::mark_read),
        )
        .layer(from_fn_with_state(app_state.clone(), require_auth));

    let user_api = Router::new()
        .route(
            "/api/users/assigned-doctor",
            get(routes::users::assigned_doctor),
        )
        .route("/api/users/doctors", get(routes::users::doctors))
        .layer(from_fn_with_state(app_state.clone(), require_auth));

    let staff_api = Router::new()
        .route("/api/users/patients", get(routes::users::patients))
        .route(
            "/api/users/unassigned-patients",
            get(routes::users::unassigned_patients),
        )
        .route("/api/users/assign-doctor", post(routes::users::assign_doctor))
        .layer(from_fn_with_state(
            app_state.clone(),
            require_doctor_or_admin,
        ));

    let admin_api = Router::new()
        .route("/api/users/all", get(routes::users::all_users))
        .route("/api/users/:user_id/role", patch(routes::users::set_role))
        .route(
            "/api/users/:user_id",
            axum::routing::delete(routes::users::deactivate),
        )
        .layer(from_fn_with_state(app_state.clone(), require_admin));

    let cors = match config.cors_origin.as_deref() {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    };

    let app = base_routes
        .merge(credential_api)
        .merge(chat_api)
        .merge(user_api)
        .merge(staff_api)
        .merge(admin_api)
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
