//! 설정 관리.
//!
//! 설정은 다음 순서로 적용됩니다 (뒤쪽이 우선):
//! 1. 기본값
//! 2. `config/relay.toml` (선택)
//! 3. `RELAY__SECTION__KEY` 환경 변수
//! 4. 운영용 환경 변수 (`WEBHOOK_SECRET`, `API_PORT`, `BINANCE_API_KEY` 등)

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::error::{RelayError, RelayResult};
use crate::staleness::StalenessPolicy;

/// 운영용 환경 변수 → 설정 키.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("API_HOST", "server.host"),
    ("API_PORT", "server.port"),
    ("CORS_ORIGINS", "server.cors_origins"),
    ("WEBHOOK_SECRET", "webhook.secret"),
    ("BINANCE_API_KEY", "binance.api_key"),
    ("BINANCE_API_SECRET", "binance.api_secret"),
    ("BINANCE_TESTNET", "binance.testnet"),
    ("BINANCE_BASE_URL", "binance.base_url"),
    ("STALENESS_DEFAULT_SECS", "staleness.default_secs"),
    ("STALENESS_THRESHOLDS", "staleness.thresholds"),
    ("POSITION_REFRESH_SECS", "positions.refresh_secs"),
    ("EVICT_AFTER_SECS", "store.evict_after_secs"),
    ("HISTORY_CAPACITY", "store.history_capacity"),
];

/// 쉼표 목록으로 들어오는 환경 변수.
const DEFAULT_SYMBOLS_ENV: &str = "DEFAULT_SYMBOLS";

/// 전체 설정.
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySettings {
    /// 서버 설정
    pub server: ServerSettings,
    /// 웹훅 설정
    #[serde(default)]
    pub webhook: WebhookSettings,
    /// Binance 선물 연동 설정
    pub binance: BinanceSettings,
    /// 저장소 설정
    pub store: StoreSettings,
    /// 신선도 설정
    pub staleness: StalenessSettings,
    /// 포지션 동기화 설정
    pub positions: PositionSettings,
    /// 요약 설정
    pub summary: SummarySettings,
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
    /// 허용 CORS origin (쉼표 구분, 없으면 모두 허용)
    #[serde(default)]
    pub cors_origins: Option<String>,
}

impl ServerSettings {
    /// `host:port` 형식 주소.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 웹훅 설정.
#[derive(Clone, Default, Deserialize)]
pub struct WebhookSettings {
    /// 공유 시크릿 (비어 있으면 인증 비활성)
    #[serde(default)]
    pub secret: Option<String>,
}

impl fmt::Debug for WebhookSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookSettings")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Binance 선물 연동 설정.
#[derive(Clone, Deserialize)]
pub struct BinanceSettings {
    /// API 키
    #[serde(default)]
    pub api_key: Option<String>,
    /// API 시크릿
    #[serde(default)]
    pub api_secret: Option<String>,
    /// 테스트넷 사용 여부
    pub testnet: bool,
    /// REST 엔드포인트 오버라이드
    #[serde(default)]
    pub base_url: Option<String>,
}

impl fmt::Debug for BinanceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinanceSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "[REDACTED]"))
            .field("testnet", &self.testnet)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// 저장소 설정.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    /// 키별 히스토리 보관 개수
    pub history_capacity: usize,
    /// 설정 시 이 시간(초)보다 오래된 레코드를 제거
    #[serde(default)]
    pub evict_after_secs: Option<u64>,
}

/// 신선도 설정.
#[derive(Debug, Clone, Deserialize)]
pub struct StalenessSettings {
    /// 기본 임계값 (초)
    pub default_secs: i64,
    /// 타임프레임별 오버라이드 (`1d=86400,4h=14400`)
    #[serde(default)]
    pub thresholds: String,
}

/// 포지션 동기화 설정.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionSettings {
    /// 백그라운드 refresh 주기 (초)
    pub refresh_secs: u64,
}

/// 요약 설정.
#[derive(Debug, Clone, Deserialize)]
pub struct SummarySettings {
    /// 요청에 심볼이 없을 때 사용할 심볼
    pub default_symbols: Vec<String>,
}

/// 검증된 거래소 자격 증명.
#[derive(Clone)]
pub struct ExchangeCredentials {
    /// API 키
    pub api_key: String,
    /// API 시크릿
    pub api_secret: SecretString,
    /// 테스트넷 사용 여부
    pub testnet: bool,
    /// REST 엔드포인트 오버라이드
    pub base_url: Option<String>,
}

impl fmt::Debug for ExchangeCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked = if self.api_key.chars().count() > 8 {
            format!("{}...", self.api_key.chars().take(8).collect::<String>())
        } else {
            "[REDACTED]".to_string()
        };
        f.debug_struct("ExchangeCredentials")
            .field("api_key", &masked)
            .field("api_secret", &"[REDACTED]")
            .field("testnet", &self.testnet)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl RelaySettings {
    /// 기본값만 채운 설정 빌더.
    pub fn defaults() -> RelayResult<ConfigBuilder<DefaultState>> {
        Ok(config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("binance.testnet", false)?
            .set_default("store.history_capacity", 1000)?
            .set_default("staleness.default_secs", 86_400)?
            .set_default("staleness.thresholds", "")?
            .set_default("positions.refresh_secs", 30)?
            .set_default("summary.default_symbols", vec!["BTCUSD"])?)
    }

    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// # Errors
    /// 설정 파싱 또는 검증 실패 시 `RelayError::Config`를 반환합니다.
    pub fn load() -> RelayResult<Self> {
        let builder = Self::defaults()?
            .add_source(File::with_name("config/relay").required(false))
            .add_source(
                Environment::with_prefix("RELAY")
                    .separator("__")
                    .try_parsing(true),
            );
        let builder = apply_env_overrides(builder, |name| std::env::var(name).ok())?;

        Self::from_config(builder.build()?)
    }

    /// 빌드된 `config::Config`에서 설정을 생성하고 검증합니다.
    pub fn from_config(config: config::Config) -> RelayResult<Self> {
        let settings: Self = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// 값 범위를 검증합니다.
    pub fn validate(&self) -> RelayResult<()> {
        if self.staleness.default_secs <= 0 {
            return Err(RelayError::Config(
                "staleness.default_secs must be positive".to_string(),
            ));
        }
        if self.positions.refresh_secs == 0 {
            return Err(RelayError::Config(
                "positions.refresh_secs must be positive".to_string(),
            ));
        }
        if self.store.evict_after_secs == Some(0) {
            return Err(RelayError::Config(
                "store.evict_after_secs must be positive when set".to_string(),
            ));
        }
        self.staleness_policy().map(|_| ())
    }

    /// 신선도 정책.
    pub fn staleness_policy(&self) -> RelayResult<StalenessPolicy> {
        let default_threshold = chrono::Duration::try_seconds(self.staleness.default_secs)
            .ok_or_else(|| RelayError::Config("staleness.default_secs out of range".to_string()))?;
        StalenessPolicy::new(default_threshold).with_overrides_spec(&self.staleness.thresholds)
    }

    /// 웹훅 시크릿. 공백뿐이면 `None`, 그 외에는 원래 값 그대로.
    pub fn webhook_secret(&self) -> Option<SecretString> {
        self.webhook
            .secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| SecretString::from(s.to_string()))
    }

    /// 거래소 자격 증명. 키와 시크릿이 모두 있어야 `Some`.
    pub fn exchange_credentials(&self) -> Option<ExchangeCredentials> {
        let api_key = self.binance.api_key.as_deref().map(str::trim)?;
        let api_secret = self.binance.api_secret.as_deref().map(str::trim)?;
        if api_key.is_empty() || api_secret.is_empty() {
            return None;
        }

        Some(ExchangeCredentials {
            api_key: api_key.to_string(),
            api_secret: SecretString::from(api_secret.to_string()),
            testnet: self.binance.testnet,
            base_url: self.binance.base_url.clone(),
        })
    }

    /// 포지션 refresh 주기.
    pub fn position_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.positions.refresh_secs)
    }

    /// 레코드 제거 기준 시간 (설정된 경우).
    pub fn eviction_age(&self) -> Option<chrono::Duration> {
        self.store
            .evict_after_secs
            .and_then(|secs| chrono::Duration::try_seconds(i64::try_from(secs).ok()?))
    }

    /// 요약 기본 심볼 (대문자, 빈 항목 제외).
    pub fn default_symbols(&self) -> Vec<String> {
        self.summary
            .default_symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// 운영용 환경 변수를 설정 오버라이드로 적용합니다. 빈 값은 무시합니다.
pub fn apply_env_overrides<F>(
    mut builder: ConfigBuilder<DefaultState>,
    lookup: F,
) -> RelayResult<ConfigBuilder<DefaultState>>
where
    F: Fn(&str) -> Option<String>,
{
    for (env, key) in ENV_OVERRIDES {
        if let Some(value) = lookup(env).filter(|v| !v.trim().is_empty()) {
            // 시크릿은 공백까지 그대로 비교
            let value = if *key == "webhook.secret" {
                value
            } else {
                value.trim().to_string()
            };
            builder = builder.set_override(*key, value)?;
        }
    }

    if let Some(symbols) = lookup(DEFAULT_SYMBOLS_ENV) {
        let symbols: Vec<String> = symbols
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if !symbols.is_empty() {
            builder = builder.set_override("summary.default_symbols", symbols)?;
        }
    }

    Ok(builder)
}
