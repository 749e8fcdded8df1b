//! 라이프사이클 컨트롤러 - 프로비저닝부터 정리까지 한 번의 실행을 조율합니다.
//!
//! # 실행 흐름
//!
//! ```text
//! Init ──► Provisioned ──► ScenarioRunning ──► VerifiedPass ─┐
//!   │           │                 ├──────────► VerifiedFail ─┼──► CleanedUp ──► Done
//!   │           │                 └──────────► Errored ──────┘
//!   │           └─────────────────────────────────────────────────► CleanedUp
//!   └──► Errored ──► Done   (프로비저닝/프리플라이트 실패: 정리할 것이 없음)
//! ```
//!
//! 프로비저닝에 성공하면 핸들은 [`DatabaseLease`]로 옮겨지고,
//! 시나리오 결과와 관계없이 컨트롤러가 정확히 한 번 `release`합니다.
//! 정리 실패는 경고로만 남고 판정과 종료 코드를 바꾸지 않습니다.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info, warn};

use dbsmoke_core::metrics as m;
use dbsmoke_core::timing::{Timed, TimingLedger, serialize_secs};
use dbsmoke_core::types::{DatabaseHandle, Dialect, QueryResult, Verdict};

use crate::api::ProvisioningApi;
use crate::client::ResourceClient;
use crate::error::HarnessError;
use crate::progress::ProgressSender;
use crate::scenario::{ScenarioDriver, Step, record_step};

/// 프로비저닝 또는 프리플라이트 실패 종료 코드
pub const EXIT_PROVISION_ERROR: i32 = 3;

/// 시나리오(쿼리) 실패 종료 코드
pub const EXIT_SCENARIO_ERROR: i32 = 4;

// =============================================================================
// RunState
// =============================================================================

/// 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    Provisioned,
    ScenarioRunning,
    VerifiedPass,
    VerifiedFail,
    Errored,
    CleanedUp,
    Done,
}

impl RunState {
    /// `next`로의 전이가 허용되는지 확인합니다.
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Init, Provisioned)
                | (Init, Errored)
                | (Provisioned, ScenarioRunning)
                | (Provisioned, Errored)
                | (Provisioned, CleanedUp)
                | (ScenarioRunning, VerifiedPass)
                | (ScenarioRunning, VerifiedFail)
                | (ScenarioRunning, Errored)
                | (ScenarioRunning, CleanedUp)
                | (VerifiedPass, CleanedUp)
                | (VerifiedFail, CleanedUp)
                | (Errored, CleanedUp)
                | (Errored, Done)
                | (CleanedUp, Done)
        )
    }

    /// 종료 상태 여부
    pub fn is_terminal(self) -> bool {
        self == RunState::Done
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Provisioned => "provisioned",
            Self::ScenarioRunning => "scenario_running",
            Self::VerifiedPass => "verified_pass",
            Self::VerifiedFail => "verified_fail",
            Self::Errored => "errored",
            Self::CleanedUp => "cleaned_up",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// 허용된 전이만 반영하고 방문한 상태를 기록합니다.
#[derive(Debug)]
struct StateTracker {
    current: RunState,
    visited: Vec<RunState>,
}

impl StateTracker {
    fn new() -> Self {
        Self {
            current: RunState::Init,
            visited: vec![RunState::Init],
        }
    }

    fn advance(&mut self, next: RunState) {
        if self.current.can_transition_to(next) {
            self.current = next;
            self.visited.push(next);
        } else {
            warn!(from = %self.current, to = %next, "illegal run state transition rejected");
        }
    }

    fn into_visited(self) -> Vec<RunState> {
        self.visited
    }
}

// =============================================================================
// DatabaseLease
// =============================================================================

/// 프로비저닝된 데이터베이스의 범위 소유권
///
/// [`release`](Self::release)가 lease를 소비하며 삭제를 호출합니다.
/// release 없이 drop되면 경고를 남기고, 비동기 런타임이 있으면
/// 백그라운드에서 삭제를 시도합니다.
#[must_use = "a lease must be released, otherwise the database leaks"]
pub struct DatabaseLease<A: ProvisioningApi> {
    client: ResourceClient<A>,
    handle: Option<DatabaseHandle>,
}

impl<A: ProvisioningApi> DatabaseLease<A> {
    /// 핸들의 소유권을 가져옵니다.
    pub fn acquire(client: &ResourceClient<A>, handle: DatabaseHandle) -> Self {
        Self {
            client: client.clone(),
            handle: Some(handle),
        }
    }

    /// 빌린 핸들
    pub fn handle(&self) -> &DatabaseHandle {
        match &self.handle {
            Some(handle) => handle,
            None => unreachable!("lease handle is only taken by release or drop"),
        }
    }

    /// 데이터베이스를 삭제하고 lease를 소비합니다.
    pub async fn release(mut self) -> Timed<Result<(), HarnessError>> {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => unreachable!("lease handle is only taken by release or drop"),
        };
        self.client.destroy(handle).await
    }
}

impl<A: ProvisioningApi> Drop for DatabaseLease<A> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        warn!(
            db_id = %handle.id,
            dialect = %handle.dialect,
            "database lease dropped without release"
        );

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let client = self.client.clone();
                runtime.spawn(async move {
                    if let Err(e) = client.destroy(handle).await.value {
                        warn!(error = %e, "background destroy of leaked database failed");
                    }
                });
            }
            Err(_) => {
                warn!(
                    db_id = %handle.id,
                    "no async runtime available, database left for the service's inactivity reaper"
                );
            }
        }
    }
}

// =============================================================================
// RunReport
// =============================================================================

/// 실행 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RunOutcome {
    /// 시나리오가 끝까지 실행되어 판정이 나옴
    Verified {
        verdict: Verdict,
        expected_rows: usize,
        actual_rows: usize,
    },
    /// 서비스가 unhealthy이거나 헬스 체크 실패
    PreflightFailed { error: String },
    /// 프로비저닝 실패 (정리 없음)
    ProvisionFailed { error: String },
    /// 시나리오 단계 실패 (정리 후 종료)
    ScenarioFailed { step: Option<String>, error: String },
}

impl RunOutcome {
    /// 메트릭 레이블 (passed / failed / errored)
    pub fn label(&self) -> &'static str {
        match self {
            Self::Verified {
                verdict: Verdict::Passed,
                ..
            } => "passed",
            Self::Verified {
                verdict: Verdict::Failed,
                ..
            } => "failed",
            _ => "errored",
        }
    }

    /// 종료 코드: 0 통과, 1 행 수 불일치, 3 프로비저닝/프리플라이트, 4 시나리오
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Verified { verdict, .. } => verdict.exit_code(),
            Self::PreflightFailed { .. } | Self::ProvisionFailed { .. } => EXIT_PROVISION_ERROR,
            Self::ScenarioFailed { .. } => EXIT_SCENARIO_ERROR,
        }
    }
}

/// 정리 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CleanupStatus {
    /// 프로비저닝되지 않아 정리할 것이 없음
    NotNeeded,
    /// 삭제 완료
    Destroyed,
    /// 삭제 실패 (경고)
    Failed { reason: String },
}

/// 한 번의 실행 보고서
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub dialect: Dialect,
    /// 프로비저닝된 데이터베이스 ID
    pub db_id: Option<String>,
    pub outcome: RunOutcome,
    pub cleanup: CleanupStatus,
    /// 원격 호출 단계별 소요 시간 (실행 순서)
    pub timings: TimingLedger,
    /// 실행 전체 소요 시간
    #[serde(rename = "total_secs", serialize_with = "serialize_secs")]
    pub total: Duration,
    /// 방문한 상태 (순서대로)
    pub states: Vec<RunState>,
    /// 조회 단계 결과
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<QueryResult>,
}

impl RunReport {
    /// 판정 (시나리오가 끝까지 실행된 경우)
    pub fn verdict(&self) -> Option<Verdict> {
        match &self.outcome {
            RunOutcome::Verified { verdict, .. } => Some(*verdict),
            _ => None,
        }
    }

    /// 프로세스 종료 코드. 정리 결과는 반영하지 않습니다.
    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }
}

/// 여러 실행 중 가장 나쁜 종료 코드
pub fn combined_exit_code(reports: &[RunReport]) -> i32 {
    reports.iter().map(RunReport::exit_code).max().unwrap_or(0)
}

// =============================================================================
// LifecycleController
// =============================================================================

/// 한 방언의 실행을 조율하는 컨트롤러
pub struct LifecycleController<A: ProvisioningApi> {
    client: ResourceClient<A>,
    dialect: Dialect,
    preflight: bool,
    progress: ProgressSender,
}

impl<A: ProvisioningApi> LifecycleController<A> {
    /// 새 컨트롤러를 생성합니다.
    pub fn new(client: ResourceClient<A>, dialect: Dialect) -> Self {
        Self {
            client,
            dialect,
            preflight: false,
            progress: ProgressSender::disabled(),
        }
    }

    /// 원격 호출마다 진행 이벤트를 보냅니다.
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = progress;
        self
    }

    /// 프로비저닝 전에 헬스 체크를 수행할지 설정합니다.
    pub fn with_preflight(mut self, preflight: bool) -> Self {
        self.preflight = preflight;
        self
    }

    /// 대상 방언
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// 내부 리소스 클라이언트
    pub fn client(&self) -> &ResourceClient<A> {
        &self.client
    }

    /// 프로비저닝 → 시나리오 → 정리를 실행하고 보고서를 반환합니다.
    pub async fn run(&self) -> RunReport {
        let started = Instant::now();
        let dialect = self.dialect;
        let mut ledger = TimingLedger::new();
        let mut states = StateTracker::new();

        info!(%dialect, preflight = self.preflight, "smoke run started");

        let early_exit = |outcome: RunOutcome,
                          ledger: TimingLedger,
                          mut states: StateTracker|
         -> RunReport {
            states.advance(RunState::Errored);
            states.advance(RunState::Done);
            RunReport {
                dialect,
                db_id: None,
                outcome,
                cleanup: CleanupStatus::NotNeeded,
                timings: ledger,
                total: started.elapsed(),
                states: states.into_visited(),
                selected: None,
            }
        };

        let driver = match ScenarioDriver::new(dialect) {
            Ok(driver) => driver.with_progress(self.progress.clone()),
            Err(e) => {
                error!(%dialect, error = %e, "no scenario for dialect");
                let report = early_exit(
                    RunOutcome::ScenarioFailed {
                        step: None,
                        error: e.to_string(),
                    },
                    ledger,
                    states,
                );
                return finish(report);
            }
        };

        if self.preflight {
            self.progress.started(dialect, Step::Health);
            let (health, elapsed) = self.client.health().await.into_parts();
            record_step(&mut ledger, Step::Health, dialect, elapsed);
            self.progress.finished(
                dialect,
                Step::Health,
                elapsed,
                matches!(&health, Ok(report) if report.is_healthy()),
                health.as_ref().ok().map(|report| report.status.clone()),
            );

            let failure = match health {
                Ok(report) if report.is_healthy() => None,
                Ok(report) => Some(format!(
                    "service reports '{}' (docker: {})",
                    report.status,
                    report.docker.as_deref().unwrap_or("unknown")
                )),
                Err(e) => Some(e.to_string()),
            };
            if let Some(error) = failure {
                error!(%dialect, %error, "preflight failed, not provisioning");
                let report = early_exit(RunOutcome::PreflightFailed { error }, ledger, states);
                return finish(report);
            }
        }

        // 1. provision
        self.progress.started(dialect, Step::Provision);
        let (provisioned, elapsed) = self.client.provision(dialect).await.into_parts();
        record_step(&mut ledger, Step::Provision, dialect, elapsed);
        self.progress.finished(
            dialect,
            Step::Provision,
            elapsed,
            provisioned.is_ok(),
            provisioned.as_ref().ok().map(|handle| handle.id.clone()),
        );

        let handle = match provisioned {
            Ok(handle) => handle,
            Err(e) => {
                error!(%dialect, error = %e, "provisioning failed");
                let report = early_exit(
                    RunOutcome::ProvisionFailed {
                        error: e.to_string(),
                    },
                    ledger,
                    states,
                );
                return finish(report);
            }
        };
        states.advance(RunState::Provisioned);

        // 2. scenario
        let db_id = handle.id.clone();
        let lease = DatabaseLease::acquire(&self.client, handle);
        states.advance(RunState::ScenarioRunning);

        let scenario = driver.run(&self.client, lease.handle(), &mut ledger).await;
        let (outcome, selected) = match scenario {
            Ok(outcome) => {
                states.advance(match outcome.verdict {
                    Verdict::Passed => RunState::VerifiedPass,
                    Verdict::Failed => RunState::VerifiedFail,
                });
                (
                    RunOutcome::Verified {
                        verdict: outcome.verdict,
                        expected_rows: outcome.expected_rows,
                        actual_rows: outcome.actual_rows,
                    },
                    Some(outcome.selected),
                )
            }
            Err(e) => {
                error!(%dialect, db_id = %db_id, error = %e, "scenario failed");
                states.advance(RunState::Errored);
                (
                    RunOutcome::ScenarioFailed {
                        step: e.step().map(str::to_owned),
                        error: e.to_string(),
                    },
                    None,
                )
            }
        };

        // 3. cleanup (항상, 정확히 한 번)
        self.progress.started(dialect, Step::Destroy);
        let (released, elapsed) = lease.release().await.into_parts();
        record_step(&mut ledger, Step::Destroy, dialect, elapsed);
        self.progress.finished(
            dialect,
            Step::Destroy,
            elapsed,
            released.is_ok(),
            Some(db_id.clone()),
        );
        let cleanup = match released {
            Ok(()) => CleanupStatus::Destroyed,
            Err(e) => {
                warn!(%dialect, db_id = %db_id, error = %e, "cleanup failed, database may leak");
                metrics::counter!(
                    m::CLEANUP_FAILURES_TOTAL,
                    m::LABEL_DIALECT => dialect.wire_name()
                )
                .increment(1);
                CleanupStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };
        states.advance(RunState::CleanedUp);
        states.advance(RunState::Done);

        finish(RunReport {
            dialect,
            db_id: Some(db_id),
            outcome,
            cleanup,
            timings: ledger,
            total: started.elapsed(),
            states: states.into_visited(),
            selected,
        })
    }
}

/// 실행 수 메트릭과 완료 로그를 남깁니다.
fn finish(report: RunReport) -> RunReport {
    let outcome = report.outcome.label();
    metrics::counter!(
        m::RUNS_TOTAL,
        m::LABEL_DIALECT => report.dialect.wire_name(),
        m::LABEL_OUTCOME => outcome
    )
    .increment(1);
    info!(
        dialect = %report.dialect,
        outcome,
        exit_code = report.exit_code(),
        total_ms = report.total.as_millis() as u64,
        "smoke run finished"
    );
    report
}
