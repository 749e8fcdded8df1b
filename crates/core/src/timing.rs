//! 타이밍 계측 - 단계별 소요 시간 측정 및 기록
//!
//! [`timed`]는 임의의 future를 감싸 단조 시계(`Instant`) 기준 경과 시간을 함께 반환합니다.
//! [`TimingLedger`]는 실행 중 기록된 [`StepTiming`]을 삽입 순서대로 보관합니다.

use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};

/// 경과 시간이 함께 붙은 값
#[derive(Debug)]
pub struct Timed<T> {
    /// 감싼 결과
    pub value: T,
    /// 경과 시간 (단조 시계 기준)
    pub elapsed: Duration,
}

impl<T> Timed<T> {
    /// 결과와 경과 시간을 분리합니다.
    pub fn into_parts(self) -> (T, Duration) {
        (self.value, self.elapsed)
    }
}

/// future를 실행하고 경과 시간을 함께 반환합니다.
///
/// 시스템 시간 조정의 영향을 받지 않는 `Instant`를 사용합니다.
pub async fn timed<F, T>(fut: F) -> Timed<T>
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let value = fut.await;
    Timed {
        value,
        elapsed: start.elapsed(),
    }
}

/// 단일 단계의 소요 시간
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepTiming {
    /// 단계 이름
    pub label: String,
    /// 경과 시간 (직렬화 시 초 단위 실수)
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Duration,
}

impl StepTiming {
    /// 새 단계 타이밍을 생성합니다.
    pub fn new(label: impl Into<String>, duration: Duration) -> Self {
        Self {
            label: label.into(),
            duration,
        }
    }
}

/// 단계 타이밍 목록 (삽입 순서 유지)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TimingLedger {
    entries: Vec<StepTiming>,
}

impl TimingLedger {
    /// 빈 원장을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 단계 타이밍을 끝에 추가합니다.
    pub fn record(&mut self, label: impl Into<String>, duration: Duration) {
        self.entries.push(StepTiming::new(label, duration));
    }

    /// 기록된 항목 (기록 순서)
    pub fn entries(&self) -> &[StepTiming] {
        &self.entries
    }

    /// 항목 반복자
    pub fn iter(&self) -> std::slice::Iter<'_, StepTiming> {
        self.entries.iter()
    }

    /// 모든 단계 소요 시간의 합
    pub fn total(&self) -> Duration {
        self.entries.iter().map(|e| e.duration).sum()
    }

    /// 항목 수
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a TimingLedger {
    type Item = &'a StepTiming;
    type IntoIter = std::slice::Iter<'a, StepTiming>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// `Duration`을 초 단위 `f64`로 직렬화합니다.
pub fn serialize_secs<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timed_returns_value_and_elapsed() {
        let timed = timed(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            42
        })
        .await;
        assert_eq!(timed.value, 42);
        assert!(timed.elapsed >= Duration::from_millis(5));
    }

    #[test]
    fn ledger_preserves_insertion_order() {
        let mut ledger = TimingLedger::new();
        ledger.record("provision", Duration::from_millis(300));
        ledger.record("create_table", Duration::from_millis(10));
        ledger.record("insert_rows", Duration::from_millis(20));

        let labels: Vec<_> = ledger.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["provision", "create_table", "insert_rows"]);
    }

    #[test]
    fn ledger_total_sums_durations() {
        let mut ledger = TimingLedger::new();
        ledger.record("a", Duration::from_millis(100));
        ledger.record("b", Duration::from_millis(250));
        assert_eq!(ledger.total(), Duration::from_millis(350));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn empty_ledger() {
        let ledger = TimingLedger::new();
        assert!(ledger.is_empty());
        assert_eq!(ledger.total(), Duration::ZERO);
    }

    #[test]
    fn step_timing_serializes_as_seconds() {
        let step = StepTiming::new("select_rows", Duration::from_millis(1500));
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["label"], "select_rows");
        assert_eq!(json["duration_secs"].as_f64(), Some(1.5));
    }

    #[test]
    fn ledger_serializes_as_array() {
        let mut ledger = TimingLedger::new();
        ledger.record("provision", Duration::from_secs(2));
        let json = serde_json::to_value(&ledger).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["label"], "provision");
    }
}
