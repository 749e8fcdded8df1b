//! 리소스 클라이언트 - 프로비저닝 API 호출에 타이밍, 로깅, 에러 분류를 더합니다.
//!
//! 모든 작업은 [`timed`]로 감싸 단조 시계 기준 경과 시간을 결과와 함께 반환합니다.
//! 재시도는 하지 않습니다.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use dbsmoke_core::config::ApiConfig;
use dbsmoke_core::timing::{Timed, timed};
use dbsmoke_core::types::{DatabaseHandle, Dialect, QueryResult};

use crate::api::{HealthReport, ProvisionResponse, ProvisioningApi, validate_db_id};
use crate::dialect::default_provision_timeout;
use crate::error::HarnessError;

/// 호출별 제한 시간
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTimeouts {
    /// 프로비저닝 (None이면 방언 기본값)
    pub provision: Option<Duration>,
    /// 쿼리 실행
    pub query: Duration,
    /// 삭제
    pub destroy: Duration,
    /// 헬스 체크
    pub health: Duration,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            provision: None,
            query: Duration::from_secs(30),
            destroy: Duration::from_secs(30),
            health: Duration::from_secs(10),
        }
    }
}

impl ClientTimeouts {
    /// `[api]` 설정에서 제한 시간을 가져옵니다.
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            provision: config.provision_timeout(),
            query: config.query_timeout(),
            destroy: config.destroy_timeout(),
            health: config.health_timeout(),
        }
    }

    /// 방언에 적용할 프로비저닝 제한 시간
    pub fn provision_for(&self, dialect: Dialect) -> Duration {
        self.provision
            .unwrap_or_else(|| default_provision_timeout(dialect))
    }
}

/// 프로비저닝 API 래퍼
///
/// `Arc`로 API를 공유하므로 복제 비용이 작습니다.
pub struct ResourceClient<A: ProvisioningApi> {
    api: Arc<A>,
    timeouts: ClientTimeouts,
}

impl<A: ProvisioningApi> Clone for ResourceClient<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            timeouts: self.timeouts,
        }
    }
}

impl<A: ProvisioningApi> ResourceClient<A> {
    /// 새 리소스 클라이언트를 생성합니다.
    pub fn new(api: Arc<A>, timeouts: ClientTimeouts) -> Self {
        Self { api, timeouts }
    }

    /// 내부 API
    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    /// 적용 중인 제한 시간
    pub fn timeouts(&self) -> &ClientTimeouts {
        &self.timeouts
    }

    /// 새 임시 데이터베이스를 프로비저닝합니다.
    ///
    /// 응답에 `db_id`나 `status`가 없거나 비어 있으면 [`HarnessError::Provision`]입니다.
    pub async fn provision(&self, dialect: Dialect) -> Timed<Result<DatabaseHandle, HarnessError>> {
        let timeout = self.timeouts.provision_for(dialect);
        debug!(%dialect, timeout_secs = timeout.as_secs(), "provisioning database");

        let timed = timed(async {
            self.api
                .create_database(dialect, timeout)
                .await
                .map_err(|e| HarnessError::Provision {
                    dialect,
                    reason: e.to_string(),
                })
                .and_then(|response| handle_from_response(dialect, response))
        })
        .await;

        if let Ok(handle) = &timed.value {
            info!(
                db_id = %handle.id,
                %dialect,
                status = %handle.status,
                restored = handle.restored,
                elapsed_ms = timed.elapsed.as_millis() as u64,
                "database provisioned"
            );
        }
        timed
    }

    /// 프로비저닝된 데이터베이스에서 SQL 문 하나를 실행합니다.
    pub async fn execute(
        &self,
        handle: &DatabaseHandle,
        statement: &str,
    ) -> Timed<Result<QueryResult, HarnessError>> {
        let timeout = self.timeouts.query;

        let timed = timed(async {
            self.api
                .run_query(&handle.id, statement, timeout)
                .await
                .map_err(|e| HarnessError::Query {
                    statement: statement.to_owned(),
                    detail: e.to_string(),
                })
        })
        .await;

        if let Ok(result) = &timed.value {
            debug!(
                db_id = %handle.id,
                rows = result.row_count(),
                affected_rows = ?result.affected_rows,
                elapsed_ms = timed.elapsed.as_millis() as u64,
                "statement executed"
            );
            for message in &result.messages {
                debug!(db_id = %handle.id, message = %message, "server message");
            }
        }
        timed
    }

    /// 데이터베이스를 삭제합니다. 핸들은 소비되어 이후 사용할 수 없습니다.
    pub async fn destroy(&self, handle: DatabaseHandle) -> Timed<Result<(), HarnessError>> {
        let timeout = self.timeouts.destroy;
        let db_id = handle.id;

        let timed = timed(async {
            self.api
                .delete_database(&db_id, timeout)
                .await
                .map_err(|e| HarnessError::Cleanup {
                    db_id: db_id.clone(),
                    reason: e.to_string(),
                })
        })
        .await;

        if timed.value.is_ok() {
            info!(
                db_id = %db_id,
                elapsed_ms = timed.elapsed.as_millis() as u64,
                "database destroyed"
            );
        }
        timed
    }

    /// 서비스 헬스 체크
    pub async fn health(&self) -> Timed<Result<HealthReport, HarnessError>> {
        let timeout = self.timeouts.health;
        timed(async {
            self.api
                .health(timeout)
                .await
                .map_err(|e| HarnessError::Health {
                    reason: e.to_string(),
                })
        })
        .await
    }
}

/// 프로비저닝 응답을 검증해 핸들을 만듭니다.
fn handle_from_response(
    dialect: Dialect,
    response: ProvisionResponse,
) -> Result<DatabaseHandle, HarnessError> {
    let malformed = |reason: &str| HarnessError::Provision {
        dialect,
        reason: format!("malformed response: {reason}"),
    };

    let id = response
        .db_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| malformed("missing db_id"))?;
    validate_db_id(&id).map_err(|e| malformed(&e.to_string()))?;
    let status = response
        .status
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| malformed("missing status"))?;

    let mut handle = DatabaseHandle::new(id, dialect, status);
    handle.restored = response.restored.unwrap_or(false);
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockProvisioningApi;
    use crate::error::ApiError;

    fn client(mock: MockProvisioningApi) -> ResourceClient<MockProvisioningApi> {
        ResourceClient::new(Arc::new(mock), ClientTimeouts::default())
    }

    #[test]
    fn provision_timeout_falls_back_to_dialect_default() {
        let timeouts = ClientTimeouts::default();
        assert_eq!(
            timeouts.provision_for(Dialect::Mysql),
            Duration::from_secs(120)
        );
        assert_eq!(
            timeouts.provision_for(Dialect::Mssql),
            Duration::from_secs(180)
        );
    }

    #[test]
    fn configured_provision_timeout_wins() {
        let timeouts = ClientTimeouts {
            provision: Some(Duration::from_secs(42)),
            ..ClientTimeouts::default()
        };
        assert_eq!(
            timeouts.provision_for(Dialect::Mssql),
            Duration::from_secs(42)
        );
    }

    #[test]
    fn timeouts_from_config() {
        let config = ApiConfig {
            provision_timeout_secs: Some(300),
            query_timeout_secs: 15,
            ..ApiConfig::default()
        };
        let timeouts = ClientTimeouts::from_config(&config);
        assert_eq!(timeouts.provision, Some(Duration::from_secs(300)));
        assert_eq!(timeouts.query, Duration::from_secs(15));
        assert_eq!(timeouts.destroy, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn provision_returns_handle() {
        let client = client(MockProvisioningApi::echoing(3));
        let handle = client.provision(Dialect::Mysql).await.value.unwrap();
        assert_eq!(handle.id, "mock-db-0001");
        assert_eq!(handle.dialect, Dialect::Mysql);
        assert_eq!(handle.status, "running");
        assert!(!handle.restored);
    }

    #[tokio::test]
    async fn provision_rejects_missing_db_id() {
        let mock = MockProvisioningApi::echoing(3).with_provision(Ok(ProvisionResponse {
            db_id: None,
            status: Some("running".to_owned()),
            ..ProvisionResponse::default()
        }));
        let err = client(mock)
            .provision(Dialect::Mysql)
            .await
            .value
            .unwrap_err();
        assert!(matches!(err, HarnessError::Provision { .. }));
        assert!(err.to_string().contains("missing db_id"));
    }

    #[tokio::test]
    async fn provision_rejects_empty_status() {
        let mock = MockProvisioningApi::echoing(3).with_provision(Ok(ProvisionResponse {
            db_id: Some("abc".to_owned()),
            status: Some("  ".to_owned()),
            ..ProvisionResponse::default()
        }));
        let err = client(mock)
            .provision(Dialect::Mssql)
            .await
            .value
            .unwrap_err();
        assert!(err.to_string().contains("missing status"));
    }

    #[tokio::test]
    async fn provision_rejects_unsafe_db_id() {
        let mock = MockProvisioningApi::echoing(3).with_provision(Ok(ProvisionResponse {
            db_id: Some("../etc".to_owned()),
            status: Some("running".to_owned()),
            ..ProvisionResponse::default()
        }));
        let err = client(mock)
            .provision(Dialect::Mysql)
            .await
            .value
            .unwrap_err();
        assert!(matches!(err, HarnessError::Provision { .. }));
    }

    #[tokio::test]
    async fn provision_service_error_is_provision_error() {
        let mock = MockProvisioningApi::echoing(3).with_provision(Err(ApiError::Status {
            status: 503,
            detail: "DOCKER_UNAVAILABLE: docker down".to_owned(),
        }));
        let err = client(mock)
            .provision(Dialect::Mssql)
            .await
            .value
            .unwrap_err();
        match err {
            HarnessError::Provision { dialect, reason } => {
                assert_eq!(dialect, Dialect::Mssql);
                assert!(reason.contains("DOCKER_UNAVAILABLE"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn provision_times_out_with_dialect_budget() {
        let mock = MockProvisioningApi::echoing(3).with_delay(Duration::from_secs(150));
        let client = client(mock);

        // mysql: 120s 예산 초과
        let err = client.provision(Dialect::Mysql).await.value.unwrap_err();
        assert!(err.to_string().contains("timed out"));

        // mssql: 180s 예산 안
        assert!(client.provision(Dialect::Mssql).await.value.is_ok());
    }

    #[tokio::test]
    async fn execute_maps_rejection_to_query_error() {
        let mock = MockProvisioningApi::echoing(3).with_queries(vec![Err(ApiError::Rejected(
            "Incorrect syntax near 'AUTO_INCREMENT'".to_owned(),
        ))]);
        let client = client(mock);
        let handle = DatabaseHandle::new("mock-db-0001", Dialect::Mssql, "running");

        let err = client
            .execute(&handle, "CREATE TABLE users (id INT AUTO_INCREMENT)")
            .await
            .value
            .unwrap_err();
        match err {
            HarnessError::Query { statement, detail } => {
                assert!(statement.starts_with("CREATE TABLE"));
                assert!(detail.contains("AUTO_INCREMENT"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn destroy_consumes_handle_and_calls_delete() {
        let client = client(MockProvisioningApi::echoing(3));
        let handle = DatabaseHandle::new("mock-db-0001", Dialect::Mysql, "running");

        client.destroy(handle).await.value.unwrap();
        assert_eq!(client.api().calls().deleted, vec!["mock-db-0001".to_owned()]);
    }

    #[tokio::test]
    async fn destroy_failure_is_cleanup_error() {
        let mock = MockProvisioningApi::echoing(3).with_delete(Err(ApiError::Status {
            status: 404,
            detail: "NOT_FOUND: Database not found".to_owned(),
        }));
        let client = client(mock);
        let handle = DatabaseHandle::new("gone", Dialect::Mysql, "running");

        let err = client.destroy(handle).await.value.unwrap_err();
        assert!(matches!(err, HarnessError::Cleanup { ref db_id, .. } if db_id == "gone"));
    }

    #[tokio::test]
    async fn health_error_is_health_error() {
        let mock = MockProvisioningApi::echoing(3)
            .with_health(Err(ApiError::Transport("connection refused".to_owned())));
        let err = client(mock).health().await.value.unwrap_err();
        assert!(matches!(err, HarnessError::Health { .. }));
    }
}
