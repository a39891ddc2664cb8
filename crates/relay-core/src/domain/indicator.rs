//! 지표 키와 레코드.
//!
//! 이 모듈은 저장소에 보관되는 지표 관련 타입을 정의합니다:
//! - `IndicatorKey` - 정규화된 (심볼, 지표, 타임프레임) 복합 키
//! - `IndicatorRecord` - 키별 최신 값과 메타데이터

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 페이로드에 타임프레임이 없을 때 사용하는 기본값.
pub const DEFAULT_TIMEFRAME: &str = "1D";

/// 페이로드에 출처가 없을 때 사용하는 기본값.
pub const DEFAULT_SOURCE: &str = "tradingview";

/// 정규화된 지표 복합 키.
///
/// 심볼은 대문자, 지표와 타임프레임은 소문자로 정규화됩니다.
/// 같은 심볼 안에서는 `"{indicator}_{timeframe}"` 하위 키가 식별자입니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndicatorKey {
    symbol: String,
    indicator: String,
    timeframe: String,
}

impl IndicatorKey {
    /// 새 키를 생성합니다. 입력값은 정규화됩니다.
    ///
    /// 빈 타임프레임은 [`DEFAULT_TIMEFRAME`]으로 대체됩니다.
    pub fn new(symbol: &str, indicator: &str, timeframe: &str) -> Self {
        let timeframe = match timeframe.trim() {
            "" => DEFAULT_TIMEFRAME,
            tf => tf,
        };

        Self {
            symbol: normalize_symbol(symbol),
            indicator: indicator.trim().to_lowercase(),
            timeframe: timeframe.to_lowercase(),
        }
    }

    /// 심볼 (대문자).
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// 지표 이름 (소문자).
    pub fn indicator(&self) -> &str {
        &self.indicator
    }

    /// 타임프레임 (소문자).
    pub fn timeframe(&self) -> &str {
        &self.timeframe
    }

    /// 심볼 내 하위 키 (예: `rsi_1d`).
    pub fn sub_key(&self) -> String {
        format!("{}_{}", self.indicator, self.timeframe)
    }
}

impl fmt::Display for IndicatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}_{}", self.symbol, self.indicator, self.timeframe)
    }
}

/// 심볼 정규화 (공백 제거 + 대문자).
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// 키별 최신 지표 값.
///
/// 생성 후에는 변경되지 않으며, 같은 키로 새 값이 들어오면 통째로 교체됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRecord {
    /// 지표 값
    pub value: f64,
    /// 서버 수신 시각 (저장소가 기록 시점에 할당)
    pub received_at: DateTime<Utc>,
    /// 타임프레임 (소문자)
    pub timeframe: String,
    /// 값의 출처 (기본: tradingview)
    pub source: String,
}

impl IndicatorRecord {
    /// 주어진 시각 기준 레코드 나이.
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.received_at)
    }
}
