//! 거래소 포지션 타입.
//!
//! 이 모듈은 포지션 캐시가 보관하는 타입을 정의합니다:
//! - `RawPosition` - 거래소 수집기가 반환하는 정규화 전 항목
//! - `Position` - 캐시에 보관되는 정규화된 포지션
//! - `PositionSnapshot` - 한 번의 refresh 결과 전체

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::indicator::normalize_symbol;

/// 포지션 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    /// 롱
    Long,
    /// 숏
    Short,
    /// 무포지션
    Flat,
}

impl PositionSide {
    /// 부호 있는 수량에서 방향을 결정합니다.
    pub fn from_signed_size(size: f64) -> Self {
        if size > 0.0 {
            PositionSide::Long
        } else if size < 0.0 {
            PositionSide::Short
        } else {
            PositionSide::Flat
        }
    }
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSide::Long => write!(f, "long"),
            PositionSide::Short => write!(f, "short"),
            PositionSide::Flat => write!(f, "flat"),
        }
    }
}

/// 거래소 수집기가 반환하는 정규화 전 포지션 항목.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPosition {
    /// 거래소 심볼 (예: BTCUSDT)
    pub symbol: String,
    /// 부호 있는 수량 (양수 = 롱, 음수 = 숏)
    pub size: f64,
    /// 평균 진입 가격
    pub entry_price: f64,
    /// 미실현 손익
    pub unrealized_pnl: f64,
    /// 마크 가격
    #[serde(default)]
    pub mark_price: Option<f64>,
    /// 레버리지
    #[serde(default)]
    pub leverage: Option<u32>,
    /// 거래소 기준 업데이트 시각
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RawPosition {
    /// 필수 필드만으로 항목을 생성합니다.
    pub fn new(symbol: impl Into<String>, size: f64, entry_price: f64, unrealized_pnl: f64) -> Self {
        Self {
            symbol: symbol.into(),
            size,
            entry_price,
            unrealized_pnl,
            mark_price: None,
            leverage: None,
            updated_at: None,
        }
    }

    /// 정규화된 포지션으로 변환합니다.
    ///
    /// 수량이 0인 항목(청산된 포지션)은 `Ok(None)`을 반환합니다.
    ///
    /// # Errors
    /// 심볼이 비어 있거나 숫자 필드가 유한하지 않으면 에러 메시지를 반환합니다.
    pub fn normalize(self, as_of: DateTime<Utc>) -> Result<Option<Position>, String> {
        let symbol = normalize_symbol(&self.symbol);
        if symbol.is_empty() {
            return Err("position entry without symbol".to_string());
        }

        let finite = [self.size, self.entry_price, self.unrealized_pnl]
            .iter()
            .chain(self.mark_price.iter())
            .all(|v| v.is_finite());
        if !finite {
            return Err(format!("non-finite numeric field for {}", symbol));
        }

        if self.size == 0.0 {
            return Ok(None);
        }

        Ok(Some(Position {
            symbol,
            side: PositionSide::from_signed_size(self.size),
            size: self.size.abs(),
            entry_price: self.entry_price,
            unrealized_pnl: self.unrealized_pnl,
            mark_price: self.mark_price,
            leverage: self.leverage,
            updated_at: self.updated_at.unwrap_or(as_of),
        }))
    }
}

/// 캐시에 보관되는 정규화된 포지션.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// 심볼 (대문자)
    pub symbol: String,
    /// 포지션 방향
    pub side: PositionSide,
    /// 수량 (절대값)
    pub size: f64,
    /// 평균 진입 가격
    pub entry_price: f64,
    /// 미실현 손익
    pub unrealized_pnl: f64,
    /// 마크 가격
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark_price: Option<f64>,
    /// 레버리지
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leverage: Option<u32>,
    /// 마지막 업데이트 시각
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// 명목 가치 (마크 가격이 없으면 진입 가격 기준).
    pub fn notional_value(&self) -> f64 {
        self.mark_price.unwrap_or(self.entry_price) * self.size
    }

    /// 진입 명목 가치 대비 수익률(%).
    pub fn return_pct(&self) -> f64 {
        let entry_notional = self.entry_price * self.size;
        if entry_notional == 0.0 {
            return 0.0;
        }
        self.unrealized_pnl / entry_notional * 100.0
    }
}

/// 한 번의 refresh로 얻은 포지션 전체.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// 포지션 목록
    pub positions: Vec<Position>,
    /// 스냅샷 시각 (아직 refresh 성공 이력이 없으면 None)
    pub as_of: Option<DateTime<Utc>>,
}

impl PositionSnapshot {
    /// 총 미실현 손익.
    pub fn total_unrealized_pnl(&self) -> f64 {
        self.positions.iter().map(|p| p.unrealized_pnl).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_from_signed_size() {
        assert_eq!(PositionSide::from_signed_size(0.5), PositionSide::Long);
        assert_eq!(PositionSide::from_signed_size(-2.0), PositionSide::Short);
        assert_eq!(PositionSide::from_signed_size(0.0), PositionSide::Flat);
    }

    #[test]
    fn test_normalize_short_position() {
        let now = Utc::now();
        let raw = RawPosition::new("btcusdt", -0.25, 60000.0, 125.0);
        let position = raw.normalize(now).unwrap().unwrap();

        assert_eq!(position.symbol, "BTCUSDT");
        assert_eq!(position.side, PositionSide::Short);
        assert_eq!(position.size, 0.25);
        assert_eq!(position.updated_at, now);
    }

    #[test]
    fn test_normalize_drops_closed_position() {
        let raw = RawPosition::new("ETHUSDT", 0.0, 0.0, 0.0);
        assert!(raw.normalize(Utc::now()).unwrap().is_none());
    }

    #[test]
    fn test_normalize_rejects_malformed_entry() {
        let raw = RawPosition::new("  ", 1.0, 100.0, 0.0);
        assert!(raw.normalize(Utc::now()).is_err());

        let raw = RawPosition::new("BTCUSDT", f64::NAN, 100.0, 0.0);
        assert!(raw.normalize(Utc::now()).is_err());
    }

    #[test]
    fn test_position_return_pct() {
        let position = RawPosition::new("BTCUSDT", 2.0, 100.0, 20.0)
            .normalize(Utc::now())
            .unwrap()
            .unwrap();
        assert!((position.return_pct() - 10.0).abs() < 1e-9);
        assert!((position.notional_value() - 200.0).abs() < 1e-9);
    }
}
