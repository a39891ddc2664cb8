//! 지표 릴레이 API 서버.
//!
//! 차트 플랫폼 웹훅을 받아 지표 값을 보관하고, 거래소 포지션과 함께
//! 자동화 클라이언트가 조회할 수 있는 REST API를 제공합니다.

use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use relay_api::metrics::setup_metrics_recorder;
use relay_api::middleware::metrics_layer;
use relay_api::routes::create_api_router;
use relay_api::state::AppState;
use relay_core::{init_logging, IndicatorStore, LogConfig, RelaySettings};
use relay_exchange::{BinanceFuturesClient, BinanceFuturesConfig};

/// 저장소 유지보수 주기.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// CORS 레이어 생성.
///
/// origin 목록이 없으면 모든 origin을 허용합니다.
fn cors_layer(origins: Option<&str>) -> CorsLayer {
    let configured = origins.map(str::trim).filter(|s| !s.is_empty());

    let allow_origin = match configured {
        Some(origins) => {
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();

            if origins.is_empty() {
                warn!("CORS_ORIGINS is set but contains no valid origins, allowing any");
                AllowOrigin::any()
            } else {
                info!("CORS configured with {} allowed origins", origins.len());
                AllowOrigin::list(origins)
            }
        }
        None => {
            warn!("CORS_ORIGINS not set, allowing any origin");
            AllowOrigin::any()
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::HeaderName::from_static("x-webhook-secret"),
        ])
        .max_age(Duration::from_secs(3600))
}

/// 메트릭 엔드포인트 핸들러.
async fn metrics_handler(
    axum::extract::State(handle): axum::extract::State<PrometheusHandle>,
) -> String {
    handle.render()
}

/// 라우터 생성.
fn create_router(
    state: Arc<AppState>,
    metrics_handle: PrometheusHandle,
    cors_origins: Option<&str>,
) -> Router {
    // 메트릭 라우터 (별도 상태)
    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_handle);

    Router::new()
        .merge(metrics_router)
        .merge(create_api_router().with_state(state))
        .layer(middleware::from_fn(metrics_layer))
        .layer(TraceLayer::new_for_http())
        // 전역 타임아웃 (30초) - 408 상태 코드 반환
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(cors_layer(cors_origins))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env 파일 로드 (있는 경우)
    let _ = dotenvy::dotenv();

    init_logging(LogConfig::from_env())?;

    info!("Starting relay API server...");

    let metrics_handle = setup_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let settings = RelaySettings::load().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;
    let staleness = settings.staleness_policy()?;

    let store = Arc::new(IndicatorStore::with_history_capacity(
        settings.store.history_capacity,
    ));

    let webhook_secret = settings.webhook_secret();
    if webhook_secret.is_none() {
        warn!("WEBHOOK_SECRET not set, accepting unauthenticated webhooks");
    }

    let mut state = AppState::new(store, webhook_secret)
        .with_staleness_policy(staleness)
        .with_default_symbols(settings.default_symbols());

    match settings.exchange_credentials() {
        Some(credentials) => {
            let config = BinanceFuturesConfig::from_credentials(&credentials);
            info!(
                base_url = config.rest_base_url(),
                testnet = credentials.testnet,
                "Binance futures position fetcher configured"
            );
            let client = BinanceFuturesClient::new(config).map_err(|e| {
                error!(error = %e, "Failed to build Binance client");
                e
            })?;
            state = state.with_position_fetcher(Arc::new(client));
        }
        None => {
            info!("Exchange credentials not set, positions disabled");
        }
    }

    let state = Arc::new(state);
    let shutdown_token = CancellationToken::new();

    let position_sync = state.start_position_sync(
        settings.position_refresh_interval(),
        shutdown_token.clone(),
    );
    if position_sync.is_some() {
        info!(
            interval_secs = settings.positions.refresh_secs,
            "Position sync service started"
        );
    }
    let maintenance = state.start_store_maintenance(
        settings.eviction_age(),
        MAINTENANCE_INTERVAL,
        shutdown_token.clone(),
    );

    let app = create_router(
        Arc::clone(&state),
        metrics_handle,
        settings.server.cors_origins.as_deref(),
    );

    let addr = settings.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        error!(%addr, error = %e, "Failed to bind listener. Check API_HOST and API_PORT");
        e
    })?;

    info!(%addr, "API server listening");
    info!("Webhook endpoint at http://{}/webhook/tradingview", addr);
    info!("Metrics available at http://{}/metrics", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_token.clone()))
        .await?;

    info!("Server shutdown initiated, cleaning up...");
    shutdown_token.cancel();

    // 백그라운드 서비스 종료 대기 (최대 10초)
    let cleanup = tokio::time::timeout(Duration::from_secs(10), async {
        if let Some(handle) = position_sync {
            let _ = handle.await;
        }
        let _ = maintenance.await;
    })
    .await;

    if cleanup.is_err() {
        warn!("Cleanup timeout, forcing shutdown");
    }

    info!("Server stopped gracefully");

    Ok(())
}

/// Graceful shutdown 시그널 대기.
///
/// Ctrl+C 또는 SIGTERM 시그널을 수신하면 종료 토큰을 취소합니다.
/// 핸들러 설치에 실패한 시그널은 무시합니다.
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    shutdown_token.cancel();
    info!("Shutdown signal propagated to background tasks");
}
