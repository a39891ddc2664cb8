//! 동시성 안전한 지표 저장소.
//!
//! 심볼별로 `하위 키 → 슬롯` 맵을 보관합니다. 슬롯은 최신 레코드(`Arc`)와
//! 크기가 제한된 히스토리를 가집니다.
//!
//! # 동시성
//!
//! - 쓰기는 write lock 안에서 `Arc` 하나를 교체하는 것이 전부이므로 readers는
//!   항상 이전 레코드 전체 또는 새 레코드 전체만 관찰합니다.
//! - 모든 임계 구역은 메모리 맵 갱신/복사만 수행하며 I/O를 하지 않습니다.
//! - lock이 poison되면 복구 후 계속 진행합니다 (레코드 교체는 원자적이므로
//!   부분 상태가 남지 않음).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error};

use crate::domain::{normalize_symbol, IndicatorKey, IndicatorRecord, DEFAULT_SOURCE};

/// 키별 히스토리 기본 보관 개수.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// 히스토리 항목.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// 지표 값
    pub value: f64,
    /// 서버 수신 시각
    pub received_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Slot {
    current: Arc<IndicatorRecord>,
    history: VecDeque<HistoryPoint>,
}

type SymbolSlots = BTreeMap<String, Slot>;

/// 지표 저장소.
///
/// 프로세스 수명 동안 `Arc`로 공유되며, 테스트에서는 인스턴스마다 독립된 상태를 가집니다.
#[derive(Debug)]
pub struct IndicatorStore {
    inner: RwLock<HashMap<String, SymbolSlots>>,
    history_capacity: usize,
}

impl Default for IndicatorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatorStore {
    /// 기본 히스토리 크기로 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// 키별 히스토리 크기를 지정해 생성합니다. 0이면 히스토리를 보관하지 않습니다.
    pub fn with_history_capacity(history_capacity: usize) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            history_capacity,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, SymbolSlots>> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("IndicatorStore RwLock poisoned (read), recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, SymbolSlots>> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("IndicatorStore RwLock poisoned (write), recovering");
                poisoned.into_inner()
            }
        }
    }

    /// 값을 기록합니다. 기존 레코드는 통째로 교체됩니다.
    ///
    /// `received_at`은 저장소가 할당하며 키별로 감소하지 않습니다.
    pub fn put(&self, key: &IndicatorKey, value: f64) -> Arc<IndicatorRecord> {
        self.put_with_source(key, value, DEFAULT_SOURCE)
    }

    /// 출처를 지정해 값을 기록합니다.
    pub fn put_with_source(
        &self,
        key: &IndicatorKey,
        value: f64,
        source: &str,
    ) -> Arc<IndicatorRecord> {
        let sub_key = key.sub_key();
        let mut inner = self.write();
        let slots = inner.entry(key.symbol().to_string()).or_default();

        let now = Utc::now();
        let received_at = match slots.get(&sub_key) {
            Some(prev) if prev.current.received_at > now => prev.current.received_at,
            _ => now,
        };

        let record = Arc::new(IndicatorRecord {
            value,
            received_at,
            timeframe: key.timeframe().to_string(),
            source: source.to_string(),
        });
        let point = HistoryPoint {
            value,
            received_at,
        };

        match slots.get_mut(&sub_key) {
            Some(slot) => {
                slot.current = Arc::clone(&record);
                push_bounded(&mut slot.history, point, self.history_capacity);
            }
            None => {
                let mut history = VecDeque::new();
                push_bounded(&mut history, point, self.history_capacity);
                slots.insert(
                    sub_key,
                    Slot {
                        current: Arc::clone(&record),
                        history,
                    },
                );
            }
        }

        debug!(key = %key, value, "Indicator stored");
        record
    }

    /// 키의 최신 레코드. 한 번도 기록되지 않았으면 `None`.
    pub fn get(&self, key: &IndicatorKey) -> Option<Arc<IndicatorRecord>> {
        self.get_by_name(key.symbol(), &key.sub_key())
    }

    /// 심볼과 하위 키(예: `rsi_1d`)로 최신 레코드를 조회합니다.
    pub fn get_by_name(&self, symbol: &str, sub_key: &str) -> Option<Arc<IndicatorRecord>> {
        let symbol = normalize_symbol(symbol);
        let sub_key = sub_key.trim().to_lowercase();
        self.read()
            .get(&symbol)
            .and_then(|slots| slots.get(&sub_key))
            .map(|slot| Arc::clone(&slot.current))
    }

    /// 심볼의 모든 지표 스냅샷 (하위 키 → 레코드 복사본).
    ///
    /// 반환 이후의 저장소 변경은 스냅샷에 영향을 주지 않습니다.
    pub fn list_by_symbol(&self, symbol: &str) -> BTreeMap<String, IndicatorRecord> {
        let symbol = normalize_symbol(symbol);
        self.read()
            .get(&symbol)
            .map(|slots| {
                slots
                    .iter()
                    .map(|(name, slot)| (name.clone(), slot.current.as_ref().clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 히스토리 조회 (`since` 이후, 오래된 순).
    ///
    /// 키가 존재하지 않으면 `None`을 반환합니다.
    pub fn history(
        &self,
        symbol: &str,
        sub_key: &str,
        since: DateTime<Utc>,
    ) -> Option<Vec<HistoryPoint>> {
        let symbol = normalize_symbol(symbol);
        let sub_key = sub_key.trim().to_lowercase();
        let inner = self.read();
        let slot = inner.get(&symbol)?.get(&sub_key)?;

        Some(
            slot.history
                .iter()
                .filter(|p| p.received_at > since)
                .cloned()
                .collect(),
        )
    }

    /// `before`보다 오래된 히스토리 항목을 제거하고 제거된 개수를 반환합니다.
    ///
    /// 최신 레코드는 유지됩니다.
    pub fn prune_history(&self, before: DateTime<Utc>) -> usize {
        let mut inner = self.write();
        let mut removed = 0;
        for slot in inner.values_mut().flat_map(|slots| slots.values_mut()) {
            let len = slot.history.len();
            slot.history.retain(|p| p.received_at >= before);
            removed += len - slot.history.len();
        }
        removed
    }

    /// `cutoff`보다 오래된 레코드를 제거하고 제거된 키 개수를 반환합니다.
    pub fn evict_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut inner = self.write();
        let mut removed = 0;
        inner.retain(|_, slots| {
            let len = slots.len();
            slots.retain(|_, slot| slot.current.received_at >= cutoff);
            removed += len - slots.len();
            !slots.is_empty()
        });
        removed
    }

    /// 값이 하나 이상 있는 심볼 목록 (정렬됨).
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// 전체 키 개수.
    pub fn len(&self) -> usize {
        self.read().values().map(BTreeMap::len).sum()
    }

    /// 비어 있는지 확인.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn push_bounded(history: &mut VecDeque<HistoryPoint>, point: HistoryPoint, capacity: usize) {
    if capacity == 0 {
        return;
    }
    while history.len() >= capacity {
        history.pop_front();
    }
    history.push_back(point);
}
