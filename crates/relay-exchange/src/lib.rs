//! # Relay Exchange
//!
//! 거래소 포지션 수집기 구현.
//!
//! 현재 지원:
//! - Binance USDⓈ-M 선물 (`/fapi/v2/positionRisk`)

pub mod binance;
pub mod error;

pub use binance::{BinanceFuturesClient, BinanceFuturesConfig};
pub use error::{ExchangeError, ExchangeResult};
