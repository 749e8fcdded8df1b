//! 시나리오 드라이버 - 테이블 생성, 행 삽입, 조회, 검증
//!
//! 단계는 앞 단계에 의존하므로 첫 실패에서 중단하고,
//! 실패한 단계 이름을 [`HarnessError::Step`]에 담아 반환합니다.
//! 부분 검증은 하지 않습니다.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use dbsmoke_core::metrics as m;
use dbsmoke_core::timing::TimingLedger;
use dbsmoke_core::types::{DatabaseHandle, Dialect, QueryResult, Verdict};

use crate::api::ProvisioningApi;
use crate::client::ResourceClient;
use crate::dialect::{self, DialectSql};
use crate::error::HarnessError;
use crate::progress::ProgressSender;

/// 시나리오가 사용하는 테이블 이름
pub const USERS_TABLE: &str = "users";

/// 삽입하는 고정 행 (name, email)
pub const SEED_USERS: [(&str, &str); 3] = [
    ("Alice", "alice@example.com"),
    ("Bob", "bob@example.com"),
    ("Charlie", "charlie@example.com"),
];

/// 조회 단계가 반환해야 하는 행 수
pub const EXPECTED_ROWS: usize = SEED_USERS.len();

/// 원격 호출 단계
///
/// 이름은 타이밍 원장의 레이블과 메트릭 레이블로 쓰입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Health,
    Provision,
    CreateTable,
    InsertRows,
    SelectRows,
    Destroy,
}

impl Step {
    /// 원장 레이블
    pub fn label(&self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::Provision => "provision",
            Self::CreateTable => "create_table",
            Self::InsertRows => "insert_rows",
            Self::SelectRows => "select_rows",
            Self::Destroy => "destroy",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 단계 타이밍을 원장과 메트릭에 기록합니다.
pub(crate) fn record_step(
    ledger: &mut TimingLedger,
    step: Step,
    dialect: Dialect,
    elapsed: Duration,
) {
    ledger.record(step.label(), elapsed);
    metrics::histogram!(
        m::STEP_DURATION_SECONDS,
        m::LABEL_STEP => step.label(),
        m::LABEL_DIALECT => dialect.wire_name()
    )
    .record(elapsed.as_secs_f64());
}

/// 진행 출력용 결과 요약
fn step_detail(result: &QueryResult) -> Option<String> {
    match result.affected_rows {
        Some(n) => Some(format!("{n} row(s) affected")),
        None if !result.columns.is_empty() => Some(format!("{} row(s)", result.row_count())),
        None => None,
    }
}

/// 방언별로 만들어진 SQL 스크립트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    dialect: Dialect,
    create_table: String,
    insert_rows: String,
    select_rows: String,
}

impl Scenario {
    /// 방언 테이블 행으로 스크립트를 만듭니다.
    pub fn from_sql(sql: &DialectSql) -> Self {
        let create_table = format!(
            "CREATE TABLE {USERS_TABLE} (\
             id {identity}, \
             name {text} NOT NULL, \
             email {text} NOT NULL, \
             created_at {ts} DEFAULT {ts_default})",
            identity = sql.identity_column,
            text = sql.text_type,
            ts = sql.timestamp_type,
            ts_default = sql.timestamp_default,
        );

        let values = SEED_USERS
            .iter()
            .map(|(name, email)| format!("('{name}', '{email}')"))
            .collect::<Vec<_>>()
            .join(", ");
        let insert_rows = format!("INSERT INTO {USERS_TABLE} (name, email) VALUES {values}");

        let select_rows = format!("SELECT id, name, email FROM {USERS_TABLE} ORDER BY id");

        Self {
            dialect: sql.dialect,
            create_table,
            insert_rows,
            select_rows,
        }
    }

    /// 방언의 스크립트를 만듭니다.
    pub fn for_dialect(dialect: Dialect) -> Result<Self, HarnessError> {
        dialect::lookup(dialect)
            .map(Self::from_sql)
            .ok_or(HarnessError::UnsupportedDialect(dialect))
    }

    /// 대상 방언
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// 실행 순서대로의 (단계, SQL) 목록
    pub fn statements(&self) -> [(Step, &str); 3] {
        [
            (Step::CreateTable, self.create_table.as_str()),
            (Step::InsertRows, self.insert_rows.as_str()),
            (Step::SelectRows, self.select_rows.as_str()),
        ]
    }
}

/// 검증까지 끝난 시나리오 결과
///
/// 행 수 불일치는 에러가 아니라 `Verdict::Failed`입니다.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioOutcome {
    pub verdict: Verdict,
    pub expected_rows: usize,
    pub actual_rows: usize,
    /// 조회 단계 결과
    pub selected: QueryResult,
}

/// 시나리오 드라이버
#[derive(Debug, Clone)]
pub struct ScenarioDriver {
    scenario: Scenario,
    progress: ProgressSender,
}

impl ScenarioDriver {
    /// 방언의 드라이버를 생성합니다.
    pub fn new(dialect: Dialect) -> Result<Self, HarnessError> {
        Ok(Self {
            scenario: Scenario::for_dialect(dialect)?,
            progress: ProgressSender::disabled(),
        })
    }

    /// 단계마다 진행 이벤트를 보냅니다.
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = progress;
        self
    }

    /// 실행할 스크립트
    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// 스크립트를 순서대로 실행하고 조회 결과를 검증합니다.
    ///
    /// 각 원격 호출의 소요 시간은 성공 여부와 관계없이 `ledger`에 기록됩니다.
    pub async fn run<A: ProvisioningApi>(
        &self,
        client: &ResourceClient<A>,
        handle: &DatabaseHandle,
        ledger: &mut TimingLedger,
    ) -> Result<ScenarioOutcome, HarnessError> {
        let dialect = self.scenario.dialect;
        let mut last = QueryResult::empty();

        for (step, statement) in self.scenario.statements() {
            self.progress.started(dialect, step);
            let (result, elapsed) = client.execute(handle, statement).await.into_parts();
            record_step(ledger, step, dialect, elapsed);
            self.progress.finished(
                dialect,
                step,
                elapsed,
                result.is_ok(),
                result.as_ref().ok().and_then(step_detail),
            );

            let result = result.map_err(|e| e.in_step(step.label()))?;
            info!(
                db_id = %handle.id,
                %dialect,
                step = step.label(),
                elapsed_ms = elapsed.as_millis() as u64,
                "step completed"
            );
            last = result;
        }

        let actual_rows = last.row_count();
        let verdict = Verdict::from_counts(EXPECTED_ROWS, actual_rows);
        info!(
            db_id = %handle.id,
            %dialect,
            expected = EXPECTED_ROWS,
            actual = actual_rows,
            %verdict,
            "verification finished"
        );

        Ok(ScenarioOutcome {
            verdict,
            expected_rows: EXPECTED_ROWS,
            actual_rows,
            selected: last,
        })
    }
}
