//! 지표 신선도 정책.
//!
//! 신선도는 조회 시점의 분류일 뿐이며 레코드를 제거하지 않습니다.
//! 임계값 결정 순서:
//! 1. 설정의 타임프레임별 오버라이드
//! 2. 타임프레임 문자열이 의미하는 봉 간격 (`1d` → 24시간, `15` → 15분)
//! 3. 기본 임계값 (24시간)

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::IndicatorRecord;
use crate::error::{RelayError, RelayResult};

/// 기본 신선도 임계값 (초).
pub const DEFAULT_STALENESS_SECS: i64 = 24 * 60 * 60;

/// 조회 시점의 신선도 분류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// 임계값 이내
    Fresh,
    /// 임계값 초과
    Stale,
}

/// 타임프레임 문자열을 봉 간격으로 변환합니다.
///
/// TradingView 표기(`"15"`, `"240"`, `"D"`, `"1W"`)와
/// 접미사 표기(`"15m"`, `"4h"`, `"1d"`, `"1w"`)를 지원합니다.
/// 대소문자를 구분하지 않으므로 `"1M"`은 1분으로 해석됩니다.
pub fn timeframe_interval(timeframe: &str) -> Option<Duration> {
    let tf = timeframe.trim().to_lowercase();
    if tf.is_empty() {
        return None;
    }

    // 숫자만 있으면 분 단위 (TradingView)
    if tf.chars().all(|c| c.is_ascii_digit()) {
        let minutes: i64 = tf.parse().ok()?;
        return positive(Duration::try_minutes(minutes)?);
    }

    let (unit_start, _) = tf.char_indices().last()?;
    let (count, unit) = tf.split_at(unit_start);
    let count: i64 = if count.is_empty() {
        1
    } else {
        count.parse().ok()?
    };

    let interval = match unit {
        "s" => Duration::try_seconds(count)?,
        "m" => Duration::try_minutes(count)?,
        "h" => Duration::try_hours(count)?,
        "d" => Duration::try_days(count)?,
        "w" => Duration::try_weeks(count)?,
        _ => return None,
    };
    positive(interval)
}

fn positive(duration: Duration) -> Option<Duration> {
    (duration > Duration::zero()).then_some(duration)
}

/// 타임프레임별 신선도 정책.
#[derive(Debug, Clone, PartialEq)]
pub struct StalenessPolicy {
    default_threshold: Duration,
    overrides: HashMap<String, Duration>,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_STALENESS_SECS))
    }
}

impl StalenessPolicy {
    /// 기본 임계값으로 정책을 생성합니다.
    pub fn new(default_threshold: Duration) -> Self {
        Self {
            default_threshold,
            overrides: HashMap::new(),
        }
    }

    /// 타임프레임별 임계값을 지정합니다.
    pub fn with_override(mut self, timeframe: &str, threshold: Duration) -> Self {
        self.overrides
            .insert(timeframe.trim().to_lowercase(), threshold);
        self
    }

    /// `"1d=86400,4h=14400"` 형식의 오버라이드 목록을 적용합니다.
    ///
    /// # Errors
    /// 항목 형식이 잘못되었거나 초 값이 양수가 아니면 `RelayError::Config`를 반환합니다.
    pub fn with_overrides_spec(mut self, spec: &str) -> RelayResult<Self> {
        for entry in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (timeframe, secs) = entry.split_once('=').ok_or_else(|| {
                RelayError::Config(format!("staleness override '{}' is not tf=secs", entry))
            })?;
            let secs: i64 = secs.trim().parse().map_err(|_| {
                RelayError::Config(format!("staleness override '{}' has invalid seconds", entry))
            })?;
            if secs <= 0 || timeframe.trim().is_empty() {
                return Err(RelayError::Config(format!(
                    "staleness override '{}' must name a timeframe and positive seconds",
                    entry
                )));
            }
            let threshold = Duration::try_seconds(secs).ok_or_else(|| {
                RelayError::Config(format!("staleness override '{}' is out of range", entry))
            })?;
            self = self.with_override(timeframe, threshold);
        }
        Ok(self)
    }

    /// 기본 임계값.
    pub fn default_threshold(&self) -> Duration {
        self.default_threshold
    }

    /// 타임프레임에 적용되는 임계값.
    pub fn threshold_for(&self, timeframe: &str) -> Duration {
        let tf = timeframe.trim().to_lowercase();
        self.overrides
            .get(&tf)
            .copied()
            .or_else(|| timeframe_interval(&tf))
            .unwrap_or(self.default_threshold)
    }

    /// 레코드의 신선도를 분류합니다.
    pub fn classify(&self, record: &IndicatorRecord, now: DateTime<Utc>) -> Freshness {
        if record.age_at(now) > self.threshold_for(&record.timeframe) {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(timeframe: &str, received_at: DateTime<Utc>) -> IndicatorRecord {
        IndicatorRecord {
            value: 1.0,
            received_at,
            timeframe: timeframe.to_string(),
            source: "test".to_string(),
        }
    }

    #[test]
    fn test_timeframe_interval() {
        assert_eq!(timeframe_interval("1D"), Some(Duration::days(1)));
        assert_eq!(timeframe_interval("d"), Some(Duration::days(1)));
        assert_eq!(timeframe_interval("4h"), Some(Duration::hours(4)));
        assert_eq!(timeframe_interval("240"), Some(Duration::hours(4)));
        assert_eq!(timeframe_interval("15m"), Some(Duration::minutes(15)));
        assert_eq!(timeframe_interval("1W"), Some(Duration::weeks(1)));
        assert_eq!(timeframe_interval("0"), None);
        assert_eq!(timeframe_interval("weekly"), None);
        assert_eq!(timeframe_interval(""), None);
    }

    #[test]
    fn test_daily_record_turns_stale_after_a_day() {
        let policy = StalenessPolicy::default();
        let now = Utc::now();

        let fresh = record("1d", now - Duration::hours(23));
        assert_eq!(policy.classify(&fresh, now), Freshness::Fresh);

        let stale = record("1d", now - Duration::hours(25));
        assert_eq!(policy.classify(&stale, now), Freshness::Stale);
    }

    #[test]
    fn test_unknown_timeframe_uses_default() {
        let policy = StalenessPolicy::new(Duration::hours(2));
        assert_eq!(policy.threshold_for("session"), Duration::hours(2));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let policy = StalenessPolicy::default()
            .with_overrides_spec("1d=172800, 4H=3600")
            .unwrap();

        assert_eq!(policy.threshold_for("1d"), Duration::days(2));
        assert_eq!(policy.threshold_for("4h"), Duration::hours(1));
        assert_eq!(policy.threshold_for("1h"), Duration::hours(1));
    }

    #[test]
    fn test_invalid_overrides_rejected() {
        assert!(StalenessPolicy::default().with_overrides_spec("1d").is_err());
        assert!(StalenessPolicy::default().with_overrides_spec("1d=abc").is_err());
        assert!(StalenessPolicy::default().with_overrides_spec("1d=-5").is_err());
    }
}
