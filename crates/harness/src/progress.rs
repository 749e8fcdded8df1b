//! 실행 진행 이벤트
//!
//! 컨트롤러와 시나리오 드라이버는 원격 호출을 시작하고 끝낼 때마다
//! [`ProgressEvent`]를 채널로 보냅니다. 수신 측(CLI)은 실행이 끝나기 전에
//! 진행 상황을 출력할 수 있습니다. 수신자가 없으면 이벤트는 버려집니다.

use std::time::Duration;

use tokio::sync::mpsc;

use dbsmoke_core::types::Dialect;

use crate::scenario::Step;

/// 단계 진행 이벤트
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// 원격 호출 시작
    StepStarted { dialect: Dialect, step: Step },
    /// 원격 호출 종료
    StepFinished {
        dialect: Dialect,
        step: Step,
        elapsed: Duration,
        /// 성공 여부
        ok: bool,
        /// 프로비저닝된 DB ID 같은 부가 정보
        detail: Option<String>,
    },
}

impl ProgressEvent {
    /// 이벤트의 단계
    pub fn step(&self) -> Step {
        match self {
            Self::StepStarted { step, .. } | Self::StepFinished { step, .. } => *step,
        }
    }
}

/// 진행 이벤트 송신 핸들
///
/// 기본값은 비활성 상태이며 아무것도 보내지 않습니다.
#[derive(Debug, Clone, Default)]
pub struct ProgressSender {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSender {
    /// 송신 핸들과 수신 채널을 만듭니다.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// 이벤트를 보내지 않는 핸들
    pub fn disabled() -> Self {
        Self::default()
    }

    pub(crate) fn started(&self, dialect: Dialect, step: Step) {
        self.send(ProgressEvent::StepStarted { dialect, step });
    }

    pub(crate) fn finished(
        &self,
        dialect: Dialect,
        step: Step,
        elapsed: Duration,
        ok: bool,
        detail: Option<String>,
    ) {
        self.send(ProgressEvent::StepFinished {
            dialect,
            step,
            elapsed,
            ok,
            detail,
        });
    }

    fn send(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            // 수신자가 먼저 닫혀도 실행은 계속됩니다.
            let _ = tx.send(event);
        }
    }
}
