//! 메트릭 상수 및 설명 등록
//!
//! 스모크 테스트에서 기록하는 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 레코더가 설치되지 않은 경우 `metrics` 매크로는 아무 동작도 하지 않습니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `dbsmoke_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 단계 레이블 키 (provision, create_table, insert_rows, select_rows, destroy)
pub const LABEL_STEP: &str = "step";

/// 방언 레이블 키 (mysql, mssql)
pub const LABEL_DIALECT: &str = "dialect";

/// 결과 레이블 키 (passed, failed, errored)
pub const LABEL_OUTCOME: &str = "outcome";

// ─── 메트릭 이름 ────────────────────────────────────────────────────

/// 원격 호출 단계별 소요 시간 (histogram, 초, labels: step, dialect)
pub const STEP_DURATION_SECONDS: &str = "dbsmoke_step_duration_seconds";

/// 완료된 스모크 실행 수 (counter, labels: dialect, outcome)
pub const RUNS_TOTAL: &str = "dbsmoke_runs_total";

/// 실패한 정리(삭제) 호출 수 (counter, label: dialect)
pub const CLEANUP_FAILURES_TOTAL: &str = "dbsmoke_cleanup_failures_total";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_histogram!(
        STEP_DURATION_SECONDS,
        "Wall-clock duration of each remote smoke-test step in seconds"
    );
    describe_counter!(RUNS_TOTAL, "Total number of completed smoke-test runs");
    describe_counter!(
        CLEANUP_FAILURES_TOTAL,
        "Total number of ephemeral databases whose destroy call failed"
    );
}
