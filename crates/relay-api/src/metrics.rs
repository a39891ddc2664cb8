//! Prometheus 메트릭 설정 및 유틸리티.
//!
//! HTTP 요청 메트릭, 웹훅/포지션 메트릭을 수집하고 `/metrics` 엔드포인트로 노출합니다.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Prometheus 메트릭 레코더를 설정하고 핸들을 반환합니다.
///
/// # Errors
///
/// 버킷 설정이 잘못되었거나 레코더가 이미 설치되어 있으면 에러를 반환합니다.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )?
        .install_recorder()
}

// ============================================================================
// HTTP 메트릭 헬퍼 함수
// ============================================================================

/// HTTP 요청 카운터 증가.
pub fn record_http_request(method: &str, path: &str) {
    counter!("http_requests_total", "method" => method.to_string(), "path" => path.to_string())
        .increment(1);
}

/// HTTP 응답 카운터 증가.
pub fn record_http_response(method: &str, path: &str, status: u16) {
    counter!(
        "http_responses_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// HTTP 요청 지속 시간 기록.
pub fn record_http_duration(method: &str, path: &str, duration_secs: f64) {
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_secs);
}

// ============================================================================
// 도메인 메트릭 헬퍼 함수
// ============================================================================

/// 웹훅 처리 결과 카운터 증가 (`ok` 또는 거부 사유 코드).
pub fn record_webhook_alert(result: &str) {
    counter!("webhook_alerts_total", "result" => result.to_string()).increment(1);
}

/// 포지션 refresh 결과 카운터 증가.
pub fn record_position_refresh(result: &str) {
    counter!("position_refresh_total", "result" => result.to_string()).increment(1);
}

/// 저장된 지표 키 수 설정.
pub fn set_indicator_keys(count: usize) {
    gauge!("indicator_keys").set(count as f64);
}

/// 열린 포지션 수 설정.
pub fn set_open_positions(count: usize) {
    gauge!("positions_open").set(count as f64);
}

// ============================================================================
// 경로 정규화 유틸리티
// ============================================================================

/// 경로에서 동적 파라미터를 정규화합니다.
///
/// 예: `/api/indicators/BTCUSD/rsi_1d/history` → `/api/indicators/{symbol}/{key}/history`
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    let in_indicators = segments.get(1) == Some(&"api") && segments.get(2) == Some(&"indicators");
    if !in_indicators {
        return path.to_string();
    }

    segments
        .iter()
        .enumerate()
        .map(|(i, segment)| match i {
            3 if !segment.is_empty() => "{symbol}",
            4 if !segment.is_empty() => "{key}",
            _ => *segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}
