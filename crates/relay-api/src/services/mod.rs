//! 백그라운드 서비스 모듈.
//!
//! 포지션 동기화와 저장소 유지보수처럼 요청 경로 밖에서 주기적으로 실행되는 서비스들입니다.

pub mod position_sync;
pub mod store_maintenance;

pub use position_sync::{start_position_sync_service, PositionSyncService};
pub use store_maintenance::{start_store_maintenance_service, StoreMaintenanceService};
