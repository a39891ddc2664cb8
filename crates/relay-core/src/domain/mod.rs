//! 지표 수집 및 포지션 조회를 위한 도메인 모델.

mod indicator;
mod position;

pub use indicator::*;
pub use position::*;
