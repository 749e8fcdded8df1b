//! 하네스 에러 타입
//!
//! [`ApiError`]는 프로비저닝 서비스와의 통신 계층 에러이고,
//! [`HarnessError`]는 어느 작업(프로비저닝, 쿼리, 정리)에서 실패했는지를
//! 담은 하네스 수준 에러입니다.
//! `From<HarnessError> for DbSmokeError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use std::time::Duration;

use dbsmoke_core::error::DbSmokeError;
use dbsmoke_core::types::Dialect;

/// 프로비저닝 서비스 통신 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// 호출이 제한 시간 안에 끝나지 않음
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// 서비스가 성공이 아닌 HTTP 상태를 반환
    #[error("service returned HTTP {status}: {detail}")]
    Status {
        /// HTTP 상태 코드
        status: u16,
        /// 응답 본문에서 추출한 에러 설명
        detail: String,
    },

    /// 서비스는 200으로 응답했지만 데이터베이스가 문장을 거부함
    #[error("database rejected statement: {0}")]
    Rejected(String),

    /// 응답 본문을 해석할 수 없음
    #[error("malformed response: {0}")]
    Decode(String),

    /// 연결 실패 등 전송 계층 에러
    #[error("transport error: {0}")]
    Transport(String),

    /// URL 경로에 넣을 수 없는 데이터베이스 ID
    #[error("invalid database id '{0}'")]
    InvalidId(String),
}

/// 하네스 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// 데이터베이스 프로비저닝 실패
    #[error("failed to provision {dialect} database: {reason}")]
    Provision {
        /// 요청한 방언
        dialect: Dialect,
        /// 실패 사유
        reason: String,
    },

    /// SQL 실행 실패 (서비스 거부, 타임아웃, 잘못된 결과 형태)
    #[error("query failed: {detail} [statement: {statement}]")]
    Query {
        /// 실행하려던 SQL 문
        statement: String,
        /// 실패 사유
        detail: String,
    },

    /// 시나리오 단계 실패
    #[error("step '{step}' failed: {source}")]
    Step {
        /// 실패한 단계 이름
        step: String,
        /// 원인 에러
        #[source]
        source: Box<HarnessError>,
    },

    /// 임시 데이터베이스 삭제 실패
    #[error("cleanup of database '{db_id}' failed: {reason}")]
    Cleanup {
        /// 삭제하려던 데이터베이스 ID
        db_id: String,
        /// 실패 사유
        reason: String,
    },

    /// 헬스 체크 실패
    #[error("health check failed: {reason}")]
    Health {
        /// 실패 사유
        reason: String,
    },

    /// 방언 SQL 테이블에 등록되지 않은 방언
    #[error("no SQL table entry for dialect '{0}'")]
    UnsupportedDialect(Dialect),

    /// HTTP 클라이언트 구성 실패
    #[error("http client setup failed: {0}")]
    ClientSetup(String),
}

impl HarnessError {
    /// 에러를 시나리오 단계 이름으로 감쌉니다.
    pub fn in_step(self, step: impl Into<String>) -> Self {
        Self::Step {
            step: step.into(),
            source: Box::new(self),
        }
    }

    /// 단계 에러라면 실패한 단계 이름을 반환합니다.
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::Step { step, .. } => Some(step),
            _ => None,
        }
    }

    /// 단계 래핑을 벗긴 원인 에러
    pub fn root(&self) -> &HarnessError {
        match self {
            Self::Step { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<HarnessError> for DbSmokeError {
    fn from(err: HarnessError) -> Self {
        DbSmokeError::Harness(err.to_string())
    }
}
