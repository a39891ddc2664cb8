//! 통합 API 에러 응답 타입.
//!
//! 모든 API 엔드포인트에서 일관된 에러 형식을 제공합니다.

use axum::http::StatusCode;
use axum::Json;
use relay_core::{RejectReason, Rejection};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 통합 API 에러 응답.
///
/// # 예시
///
/// ```json
/// {
///   "reason": "malformed_payload",
///   "message": "missing required field 'value'",
///   "timestamp": 1738300800
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// 사유 코드 (예: "unauthorized", "not_found", "invalid_query")
    pub reason: String,
    /// 사람이 읽을 수 있는 에러 메시지
    pub message: String,
    /// 추가 에러 상세 정보 (선택적)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// 에러 발생 타임스탬프 (Unix timestamp, 선택적)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl ApiErrorResponse {
    /// 기본 에러 생성 (타임스탬프 포함).
    pub fn new(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message: message.into(),
            details: None,
            timestamp: Some(chrono::Utc::now().timestamp()),
        }
    }

    /// 상세 정보 포함 에러 생성.
    pub fn with_details(
        reason: impl Into<String>,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            details: Some(details),
            ..Self::new(reason, message)
        }
    }
}

impl std::fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.reason, self.message)
    }
}

impl std::error::Error for ApiErrorResponse {}

/// API 핸들러 Result 타입 별칭.
pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiErrorResponse>)>;

/// 상태 코드와 함께 에러 응답을 생성합니다.
pub fn api_error(
    status: StatusCode,
    reason: &str,
    message: impl Into<String>,
) -> (StatusCode, Json<ApiErrorResponse>) {
    (status, Json(ApiErrorResponse::new(reason, message)))
}

/// 웹훅 거부 사유별 HTTP 상태 코드.
pub fn rejection_status(reason: RejectReason) -> StatusCode {
    match reason {
        RejectReason::Unauthorized => StatusCode::UNAUTHORIZED,
        RejectReason::MalformedPayload => StatusCode::BAD_REQUEST,
        RejectReason::InvalidValue => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

/// 웹훅 거부를 에러 응답으로 변환합니다.
pub fn rejection_response(rejection: &Rejection) -> (StatusCode, Json<ApiErrorResponse>) {
    api_error(
        rejection_status(rejection.reason),
        rejection.reason.as_str(),
        rejection.message.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_response_new() {
        let error = ApiErrorResponse::new("not_found", "indicator not found");
        assert_eq!(error.reason, "not_found");
        assert!(error.timestamp.is_some());
        assert!(error.details.is_none());

        let json = serde_json::to_string(&error).unwrap();
        assert!(!json.contains("details"));
        assert!(json.contains(r#""reason":"not_found""#));
    }

    #[test]
    fn test_api_error_response_with_details() {
        let details = serde_json::json!({"field": "hours", "max": 168});
        let error = ApiErrorResponse::with_details("invalid_query", "hours out of range", details);
        assert_eq!(error.reason, "invalid_query");
        assert!(error.details.is_some());
        assert!(error.timestamp.is_some());
    }

    #[test]
    fn test_rejection_status_codes() {
        assert_eq!(rejection_status(RejectReason::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(rejection_status(RejectReason::MalformedPayload), StatusCode::BAD_REQUEST);
        assert_eq!(
            rejection_status(RejectReason::InvalidValue),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let (status, Json(body)) = rejection_response(&Rejection::unauthorized());
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.reason, "unauthorized");
    }
}
