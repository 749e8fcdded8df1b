//! Provisioning service API abstraction for testability.
//!
//! The [`ProvisioningApi`] trait is the seam between the harness and the remote
//! ephemeral-database service. Production code uses [`HttpProvisioningClient`]
//! (reqwest); unit tests use `MockProvisioningApi`.
//!
//! ```text
//! ┌────────────────┐
//! │ ResourceClient │  timing, logging, error taxonomy
//! └───────┬────────┘
//!         ▼
//!  ┌────────────────┐
//!  │ProvisioningApi │ (trait)
//!  └────────────────┘
//!     │          │
//!     ▼          ▼
//!  ┌──────┐   ┌──────┐
//!  │ HTTP │   │ Mock │
//!  └──┬───┘   └──────┘
//!     ▼
//!  POST /db/new · POST /db/{id}/query · DELETE /db/{id} · GET /health
//! ```
//!
//! # Database ID Validation
//!
//! Database IDs are interpolated into URL paths, so every method that takes one
//! validates it first: 1-128 characters of ASCII alphanumerics, `-` or `_`.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use dbsmoke_core::types::{Dialect, QueryResult};

use crate::error::{ApiError, HarnessError};

/// 연결 수립 제한 시간 (요청별 제한 시간과 별개)
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// 데이터베이스 ID 최대 길이
const MAX_DB_ID_LEN: usize = 128;

/// Validates a database ID before it is placed in a URL path.
pub fn validate_db_id(id: &str) -> Result<(), ApiError> {
    if id.is_empty() || id.len() > MAX_DB_ID_LEN {
        return Err(ApiError::InvalidId(id.to_owned()));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ApiError::InvalidId(id.to_owned()));
    }
    Ok(())
}

/// Trait abstracting the provisioning service.
///
/// Every call takes its own timeout; implementations must give up and return
/// [`ApiError::Timeout`] once it elapses. No call is retried.
pub trait ProvisioningApi: Send + Sync + 'static {
    /// Requests a new ephemeral database of the given dialect.
    ///
    /// The response is returned as-is; checking that `db_id` and `status`
    /// are present is left to the caller.
    fn create_database(
        &self,
        dialect: Dialect,
        timeout: Duration,
    ) -> impl Future<Output = Result<ProvisionResponse, ApiError>> + Send;

    /// Executes one SQL statement against a provisioned database.
    ///
    /// # Errors
    ///
    /// - `ApiError::Rejected`: the service answered 200 with an `error` field
    /// - `ApiError::Decode`: malformed body or ragged rows
    fn run_query(
        &self,
        db_id: &str,
        statement: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<QueryResult, ApiError>> + Send;

    /// Destroys a database. The acknowledgment body is ignored.
    fn delete_database(
        &self,
        db_id: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Reports service health.
    fn health(&self, timeout: Duration)
    -> impl Future<Output = Result<HealthReport, ApiError>> + Send;
}

// =============================================================================
// Wire types
// =============================================================================

/// `POST /db/new` 요청 본문
#[derive(Debug, Serialize)]
struct CreateRequest<'a> {
    dialect: &'a str,
}

/// `POST /db/{id}/query` 요청 본문
#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    format: &'a str,
}

/// `POST /db/new` 응답
///
/// 필드 누락 여부는 호출자가 검증하므로 모두 선택 필드로 받습니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProvisionResponse {
    /// 서비스가 발급한 데이터베이스 ID
    #[serde(default)]
    pub db_id: Option<String>,
    /// 서비스가 정규화한 방언 이름
    #[serde(default)]
    pub dialect: Option<String>,
    /// 생성 직후 상태 (starting, running, ...)
    #[serde(default)]
    pub status: Option<String>,
    /// 백업에서 복원되었는지 여부
    #[serde(default)]
    pub restored: Option<bool>,
}

/// `POST /db/{id}/query` 응답 (format=json)
///
/// 행이 없으면 `columns`와 `rows`가 모두 생략됩니다.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub rows: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    pub affected_rows: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub messages: Vec<String>,
}

impl QueryResponse {
    /// 응답을 검증된 [`QueryResult`]로 변환합니다.
    pub fn into_result(self) -> Result<QueryResult, ApiError> {
        if let Some(error) = self.error {
            return Err(ApiError::Rejected(error));
        }
        let mut result = QueryResult::new(
            self.columns.unwrap_or_default(),
            self.rows.unwrap_or_default(),
        )
        .map_err(|e| ApiError::Decode(e.to_string()))?;
        result.affected_rows = self.affected_rows;
        result.messages = self.messages;
        Ok(result)
    }
}

/// `GET /health` 응답
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// "healthy" 또는 "unhealthy"
    pub status: String,
    /// Docker 연결 상태 ("connected" / "disconnected")
    #[serde(default)]
    pub docker: Option<String>,
}

impl HealthReport {
    /// 서비스가 요청을 받을 수 있는 상태인지
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}

/// `{"error": {"code", "message", "detail"?}}` 형태의 에러 본문
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Structured {
        code: String,
        message: String,
        #[serde(default)]
        detail: Option<String>,
    },
    Plain(String),
}

/// 에러 응답 본문에서 사람이 읽을 설명을 추출합니다.
///
/// 구조화된 에러 본문이 아니면 원문을 그대로 사용합니다.
pub(crate) fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope {
            error:
                ErrorBody::Structured {
                    code,
                    message,
                    detail,
                },
        }) => match detail {
            Some(detail) => format!("{code}: {message} ({detail})"),
            None => format!("{code}: {message}"),
        },
        Ok(ErrorEnvelope {
            error: ErrorBody::Plain(message),
        }) => message,
        Err(_) => {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "<empty body>".to_owned()
            } else {
                trimmed.to_owned()
            }
        }
    }
}

// =============================================================================
// HTTP implementation
// =============================================================================

/// reqwest 기반 프로비저닝 서비스 클라이언트
///
/// 하나의 `reqwest::Client`(연결 풀)를 모든 호출이 공유합니다.
#[derive(Debug, Clone)]
pub struct HttpProvisioningClient {
    client: Client,
    base_url: String,
}

impl HttpProvisioningClient {
    /// 기본 설정의 reqwest 클라이언트로 생성합니다.
    pub fn new(base_url: &str) -> Result<Self, HarnessError> {
        let client = Client::builder()
            .user_agent(concat!("dbsmoke/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| HarnessError::ClientSetup(e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    /// 미리 구성한 reqwest 클라이언트로 생성합니다.
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// 후행 슬래시가 제거된 기본 URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// reqwest 에러를 [`ApiError`]로 변환합니다.
fn map_reqwest_error(err: reqwest::Error, timeout: Duration) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout(timeout)
    } else if err.is_decode() {
        ApiError::Decode(err.to_string())
    } else {
        ApiError::Transport(err.to_string())
    }
}

/// 요청을 보내고 성공 상태가 아니면 에러 본문을 해석합니다.
async fn send(request: RequestBuilder, timeout: Duration) -> Result<reqwest::Response, ApiError> {
    let response = request
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| map_reqwest_error(e, timeout))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .map_err(|e| map_reqwest_error(e, timeout))?;
    Err(ApiError::Status {
        status: status.as_u16(),
        detail: error_detail(&body),
    })
}

async fn send_json<T>(request: RequestBuilder, timeout: Duration) -> Result<T, ApiError>
where
    T: DeserializeOwned,
{
    let response = send(request, timeout).await?;
    let body = response
        .bytes()
        .await
        .map_err(|e| map_reqwest_error(e, timeout))?;
    serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

impl ProvisioningApi for HttpProvisioningClient {
    async fn create_database(
        &self,
        dialect: Dialect,
        timeout: Duration,
    ) -> Result<ProvisionResponse, ApiError> {
        let request = self
            .client
            .post(self.endpoint("/db/new"))
            .json(&CreateRequest {
                dialect: dialect.wire_name(),
            });
        send_json(request, timeout).await
    }

    async fn run_query(
        &self,
        db_id: &str,
        statement: &str,
        timeout: Duration,
    ) -> Result<QueryResult, ApiError> {
        validate_db_id(db_id)?;

        let request = self
            .client
            .post(self.endpoint(&format!("/db/{db_id}/query")))
            .json(&QueryRequest {
                query: statement,
                format: "json",
            });
        let response: QueryResponse = send_json(request, timeout).await?;
        response.into_result()
    }

    async fn delete_database(&self, db_id: &str, timeout: Duration) -> Result<(), ApiError> {
        validate_db_id(db_id)?;

        let request = self.client.delete(self.endpoint(&format!("/db/{db_id}")));
        send(request, timeout).await?;
        Ok(())
    }

    async fn health(&self, timeout: Duration) -> Result<HealthReport, ApiError> {
        // 상태 코드와 무관하게 헬스 본문이면 그대로 보고합니다.
        let response = self
            .client
            .get(self.endpoint("/health"))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(e, timeout))?;

        match serde_json::from_slice::<HealthReport>(&body) {
            Ok(report) => Ok(report),
            Err(_) if !status.is_success() => Err(ApiError::Status {
                status: status.as_u16(),
                detail: error_detail(&String::from_utf8_lossy(&body)),
            }),
            Err(e) => Err(ApiError::Decode(e.to_string())),
        }
    }
}

// =============================================================================
// Test double
// =============================================================================

/// 테스트용 Mock 프로비저닝 API
///
/// 쿼리 응답은 스크립트 큐에서 순서대로 꺼내고, 큐가 비면 빈 결과를 반환합니다.
/// 호출 기록을 남겨 삭제 호출 횟수 등을 검증할 수 있습니다.
#[cfg(test)]
pub struct MockProvisioningApi {
    provision: Result<ProvisionResponse, ApiError>,
    queries: std::sync::Mutex<std::collections::VecDeque<Result<QueryResult, ApiError>>>,
    delete: Result<(), ApiError>,
    health: Result<HealthReport, ApiError>,
    delay: Duration,
    /// 호출 기록
    pub calls: std::sync::Mutex<MockCalls>,
}

/// Mock 호출 기록
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MockCalls {
    pub created: Vec<Dialect>,
    pub statements: Vec<String>,
    pub deleted: Vec<String>,
    pub health_checks: usize,
}

#[cfg(test)]
impl MockProvisioningApi {
    /// 프로비저닝은 성공하고 SELECT가 `rows`개의 행을 반환하는 mock
    pub fn echoing(rows: usize) -> Self {
        let select = QueryResult::new(
            vec!["id".to_owned(), "name".to_owned(), "email".to_owned()],
            (1..=rows)
                .map(|i| {
                    vec![
                        serde_json::json!(i),
                        serde_json::json!(format!("user{i}")),
                        serde_json::json!(format!("user{i}@example.com")),
                    ]
                })
                .collect(),
        )
        .expect("mock rows have matching arity");
        let mut insert = QueryResult::empty();
        insert.affected_rows = Some(3);

        Self {
            provision: Ok(ProvisionResponse {
                db_id: Some("mock-db-0001".to_owned()),
                dialect: None,
                status: Some("running".to_owned()),
                restored: Some(false),
            }),
            queries: std::sync::Mutex::new(
                [Ok(QueryResult::empty()), Ok(insert), Ok(select)].into(),
            ),
            delete: Ok(()),
            health: Ok(HealthReport {
                status: "healthy".to_owned(),
                docker: Some("connected".to_owned()),
            }),
            delay: Duration::ZERO,
            calls: std::sync::Mutex::new(MockCalls::default()),
        }
    }

    /// 프로비저닝 응답을 덮어씁니다.
    pub fn with_provision(mut self, provision: Result<ProvisionResponse, ApiError>) -> Self {
        self.provision = provision;
        self
    }

    /// 쿼리 응답 스크립트를 덮어씁니다.
    pub fn with_queries(mut self, queries: Vec<Result<QueryResult, ApiError>>) -> Self {
        self.queries = std::sync::Mutex::new(queries.into());
        self
    }

    /// 삭제 결과를 덮어씁니다.
    pub fn with_delete(mut self, delete: Result<(), ApiError>) -> Self {
        self.delete = delete;
        self
    }

    /// 헬스 체크 결과를 덮어씁니다.
    pub fn with_health(mut self, health: Result<HealthReport, ApiError>) -> Self {
        self.health = health;
        self
    }

    /// 모든 호출에 지연을 추가합니다. 지연이 timeout보다 길면 Timeout을 반환합니다.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// 호출 기록 스냅샷
    pub fn calls(&self) -> MockCalls {
        self.calls.lock().unwrap().clone()
    }

    async fn wait(&self, timeout: Duration) -> Result<(), ApiError> {
        if self.delay.is_zero() {
            return Ok(());
        }
        tokio::time::timeout(timeout, tokio::time::sleep(self.delay))
            .await
            .map_err(|_| ApiError::Timeout(timeout))
    }
}

#[cfg(test)]
impl ProvisioningApi for MockProvisioningApi {
    async fn create_database(
        &self,
        dialect: Dialect,
        timeout: Duration,
    ) -> Result<ProvisionResponse, ApiError> {
        self.calls.lock().unwrap().created.push(dialect);
        self.wait(timeout).await?;
        let mut response = self.provision.clone()?;
        if response.dialect.is_none() {
            response.dialect = Some(dialect.wire_name().to_owned());
        }
        Ok(response)
    }

    async fn run_query(
        &self,
        db_id: &str,
        statement: &str,
        timeout: Duration,
    ) -> Result<QueryResult, ApiError> {
        validate_db_id(db_id)?;
        self.calls
            .lock()
            .unwrap()
            .statements
            .push(statement.to_owned());
        self.wait(timeout).await?;
        let next = self.queries.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(QueryResult::empty()))
    }

    async fn delete_database(&self, db_id: &str, timeout: Duration) -> Result<(), ApiError> {
        validate_db_id(db_id)?;
        self.calls.lock().unwrap().deleted.push(db_id.to_owned());
        self.wait(timeout).await?;
        self.delete.clone()
    }

    async fn health(&self, timeout: Duration) -> Result<HealthReport, ApiError> {
        self.calls.lock().unwrap().health_checks += 1;
        self.wait(timeout).await?;
        self.health.clone()
    }
}
