//! 설정 관리 - dbsmoke.toml 파싱 및 런타임 설정
//!
//! [`DbSmokeConfig`]는 스모크 테스트 실행에 필요한 모든 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`DBSMOKE_API_BASE_URL=https://...` 형식)
//! 3. 설정 파일 (`dbsmoke.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), dbsmoke_core::error::DbSmokeError> {
//! use dbsmoke_core::config::DbSmokeConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = DbSmokeConfig::load("dbsmoke.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = DbSmokeConfig::parse("[scenario]\ndialect = \"mssql\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ConfigError, DbSmokeError};
use crate::types::Dialect;

/// 기본 프로비저닝 서비스 주소
pub const DEFAULT_BASE_URL: &str = "https://db-api.ljs.app";

/// dbsmoke 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbSmokeConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 프로비저닝 API 설정
    #[serde(default)]
    pub api: ApiConfig,
    /// 시나리오 설정
    #[serde(default)]
    pub scenario: ScenarioConfig,
}

impl DbSmokeConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용한 뒤 검증합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DbSmokeError> {
        let config = Self::load_unvalidated(path).await?;
        config.validate()?;
        Ok(config)
    }

    /// 파일이 없으면 기본값에서 시작한다는 점만 [`load`](Self::load)와 다릅니다.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self, DbSmokeError> {
        let config = Self::load_or_default_unvalidated(path).await?;
        config.validate()?;
        Ok(config)
    }

    /// 파일 + 환경변수 오버라이드까지만 적용합니다 (검증 없음).
    ///
    /// 호출자가 CLI 인자 같은 상위 오버라이드를 적용한 뒤
    /// [`validate`](Self::validate)를 직접 호출해야 합니다.
    pub async fn load_unvalidated(path: impl AsRef<Path>) -> Result<Self, DbSmokeError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// [`load_unvalidated`](Self::load_unvalidated)와 같지만 파일이 없으면 기본값을 사용합니다.
    pub async fn load_or_default_unvalidated(
        path: impl AsRef<Path>,
    ) -> Result<Self, DbSmokeError> {
        let path = path.as_ref();
        let mut config = match Self::from_file(path).await {
            Ok(config) => config,
            Err(DbSmokeError::Config(ConfigError::FileNotFound { .. })) => {
                debug!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// TOML 파일을 파싱만 합니다 (환경변수 오버라이드, 검증 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, DbSmokeError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DbSmokeError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                DbSmokeError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, DbSmokeError> {
        toml::from_str(toml_str).map_err(|e| {
            DbSmokeError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `DBSMOKE_{SECTION}_{FIELD}`
    /// 예: `DBSMOKE_API_BASE_URL=http://localhost:8080`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "DBSMOKE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "DBSMOKE_GENERAL_LOG_FORMAT");

        // API
        override_string(&mut self.api.base_url, "DBSMOKE_API_BASE_URL");
        override_opt_u64(
            &mut self.api.provision_timeout_secs,
            "DBSMOKE_API_PROVISION_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.api.query_timeout_secs,
            "DBSMOKE_API_QUERY_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.api.destroy_timeout_secs,
            "DBSMOKE_API_DESTROY_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.api.health_timeout_secs,
            "DBSMOKE_API_HEALTH_TIMEOUT_SECS",
        );
        override_bool(&mut self.api.preflight, "DBSMOKE_API_PREFLIGHT");

        // Scenario
        override_string(&mut self.scenario.dialect, "DBSMOKE_SCENARIO_DIALECT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), DbSmokeError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        let base_url = self.api.base_url.trim();
        if base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api.base_url".to_owned(),
                reason: "must not be empty".to_owned(),
            }
            .into());
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "api.base_url".to_owned(),
                reason: "must start with http:// or https://".to_owned(),
            }
            .into());
        }

        if self.api.provision_timeout_secs == Some(0) {
            return Err(zero_timeout("api.provision_timeout_secs"));
        }
        if self.api.query_timeout_secs == 0 {
            return Err(zero_timeout("api.query_timeout_secs"));
        }
        if self.api.destroy_timeout_secs == 0 {
            return Err(zero_timeout("api.destroy_timeout_secs"));
        }
        if self.api.health_timeout_secs == 0 {
            return Err(zero_timeout("api.health_timeout_secs"));
        }

        self.scenario.dialect().map_err(|e| match e {
            ConfigError::InvalidValue { reason, .. } => ConfigError::InvalidValue {
                field: "scenario.dialect".to_owned(),
                reason,
            },
            other => other,
        })?;

        Ok(())
    }
}

fn zero_timeout(field: &str) -> DbSmokeError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: "timeout must be greater than zero".to_owned(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 프로비저닝 API 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// 서비스 기본 주소
    pub base_url: String,
    /// 프로비저닝 타임아웃 (초). 없으면 방언별 기본값 사용
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provision_timeout_secs: Option<u64>,
    /// 쿼리 타임아웃 (초)
    pub query_timeout_secs: u64,
    /// 삭제 타임아웃 (초)
    pub destroy_timeout_secs: u64,
    /// 헬스 체크 타임아웃 (초)
    pub health_timeout_secs: u64,
    /// 프로비저닝 전에 헬스 체크 수행 여부
    pub preflight: bool,
}

impl ApiConfig {
    /// 설정된 프로비저닝 타임아웃 (없으면 `None`)
    pub fn provision_timeout(&self) -> Option<Duration> {
        self.provision_timeout_secs.map(Duration::from_secs)
    }

    /// 쿼리 타임아웃
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// 삭제 타임아웃
    pub fn destroy_timeout(&self) -> Duration {
        Duration::from_secs(self.destroy_timeout_secs)
    }

    /// 헬스 체크 타임아웃
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            provision_timeout_secs: None,
            query_timeout_secs: 30,
            destroy_timeout_secs: 30,
            health_timeout_secs: 10,
            preflight: false,
        }
    }
}

/// 시나리오 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// 실행할 방언 이름
    pub dialect: String,
}

impl ScenarioConfig {
    /// 설정된 방언을 파싱합니다.
    pub fn dialect(&self) -> Result<Dialect, ConfigError> {
        self.dialect.parse()
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::Mysql.wire_name().to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_opt_u64(target: &mut Option<u64>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = Some(parsed),
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
