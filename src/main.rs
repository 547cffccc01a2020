use k2proxy::error::AppError;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,k2proxy=debug")),
        )
        .json()
        .init();

    if let Err(err) = run().await {
        eprintln!("error: {}", err.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let state = k2proxy::app::load_state()?;
    let app = k2proxy::app::build_app(state.clone());
    let addr: std::net::SocketAddr =
        state
            .config
            .listen
            .parse()
            .map_err(|err: std::net::AddrParseError| {
                AppError::new(axum::http::StatusCode::BAD_REQUEST, err.to_string())
                    .with_code("listen_invalid")
            })?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|err| {
        AppError::new(axum::http::StatusCode::BAD_REQUEST, err.to_string())
            .with_code("listen_failed")
    })?;
    tracing::info!("listening on {}", addr);
    axum::serve(listener, app).await.map_err(|err| {
        AppError::new(axum::http::StatusCode::BAD_REQUEST, err.to_string())
            .with_code("serve_failed")
    })?;
    Ok(())
}
