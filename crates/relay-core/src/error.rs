//! 에러 타입.
//!
//! 이 모듈은 코어 전반에서 사용되는 에러 타입을 정의합니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 코어 에러.
#[derive(Debug, Error)]
pub enum RelayError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    /// 내부 에러
    #[error("내부 에러: {0}")]
    Internal(String),
}

/// 코어 작업을 위한 Result 타입.
pub type RelayResult<T> = Result<T, RelayError>;

impl From<config::ConfigError> for RelayError {
    fn from(err: config::ConfigError) -> Self {
        RelayError::Config(err.to_string())
    }
}

/// 웹훅 거부 사유 코드.
///
/// 응답 본문의 `reason` 필드에 그대로 노출됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// 공유 시크릿 불일치
    Unauthorized,
    /// JSON 파싱 실패 또는 필수 필드 누락
    MalformedPayload,
    /// 값을 숫자로 변환할 수 없음
    InvalidValue,
}

impl RejectReason {
    /// 사유 코드 문자열.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Unauthorized => "unauthorized",
            RejectReason::MalformedPayload => "malformed_payload",
            RejectReason::InvalidValue => "invalid_value",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 웹훅 거부.
#[derive(Debug, Clone, Error)]
#[error("{reason}: {message}")]
pub struct Rejection {
    /// 사유 코드
    pub reason: RejectReason,
    /// 사람이 읽을 수 있는 설명
    pub message: String,
}

impl Rejection {
    /// 새 거부를 생성합니다.
    pub fn new(reason: RejectReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    /// 인증 실패.
    pub fn unauthorized() -> Self {
        Self::new(RejectReason::Unauthorized, "webhook secret mismatch")
    }

    /// 잘못된 페이로드.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(RejectReason::MalformedPayload, message)
    }

    /// 숫자 변환 실패.
    pub fn invalid_value(message: impl Into<String>) -> Self {
        Self::new(RejectReason::InvalidValue, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes() {
        assert_eq!(RejectReason::Unauthorized.as_str(), "unauthorized");
        assert_eq!(RejectReason::MalformedPayload.as_str(), "malformed_payload");
        assert_eq!(RejectReason::InvalidValue.as_str(), "invalid_value");

        let json = serde_json::to_string(&RejectReason::MalformedPayload).unwrap();
        assert_eq!(json, r#""malformed_payload""#);
    }

    #[test]
    fn test_rejection_display() {
        let rejection = Rejection::invalid_value("value 'abc' is not numeric");
        assert_eq!(rejection.to_string(), "invalid_value: value 'abc' is not numeric");
    }
}
