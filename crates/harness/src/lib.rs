#![doc = include_str!("../README.md")]

pub mod api;
pub mod client;
pub mod dialect;
pub mod error;
pub mod lifecycle;
pub mod progress;
pub mod scenario;

// 프로비저닝 API
pub use api::{HealthReport, HttpProvisioningClient, ProvisionResponse, ProvisioningApi};

// 리소스 클라이언트
pub use client::{ClientTimeouts, ResourceClient};

// 방언 테이블
pub use dialect::{DIALECT_TABLE, DialectSql};

// 에러
pub use error::{ApiError, HarnessError};

// 라이프사이클
pub use lifecycle::{
    CleanupStatus, DatabaseLease, LifecycleController, RunOutcome, RunReport, RunState,
    combined_exit_code,
};

// 진행 이벤트
pub use progress::{ProgressEvent, ProgressSender};

// 시나리오
pub use scenario::{EXPECTED_ROWS, SEED_USERS, Scenario, ScenarioDriver, ScenarioOutcome, Step};
