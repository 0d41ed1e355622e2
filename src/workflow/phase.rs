//! 单元阶段状态机
//!
//! `Intro → Narrating → Analyzing → AwaitingRecording → ProcessingResponse → (Advance | Complete)`
//!
//! `Skip` 跳过当前阶段：不需要远程分析的单元在 Analyzing 直接 Skip，
//! 不录音的单元在 AwaitingRecording 直接 Skip。

use std::fmt::Display;

use crate::error::BusinessError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Intro,
    Narrating,
    Analyzing,
    AwaitingRecording,
    ProcessingResponse,
    Advance,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEvent {
    Start,
    AudioEnded,
    ResponseArrived,
    RecordingStopped,
    Skip,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Advance | Phase::Complete)
    }

    /// 纯转换函数
    ///
    /// # 参数
    /// - `has_more`: 本等级后面是否还有单元，决定结束于 Advance 还是 Complete
    pub fn next(self, event: FlowEvent, has_more: bool) -> Result<Phase, BusinessError> {
        let finish = if has_more {
            Phase::Advance
        } else {
            Phase::Complete
        };

        let next = match (self, event) {
            (Phase::Intro, FlowEvent::Start) => Phase::Narrating,
            (Phase::Intro, FlowEvent::Skip) => finish,

            (Phase::Narrating, FlowEvent::AudioEnded | FlowEvent::Skip) => Phase::Analyzing,

            // 回复到达后还要播放回复音频，播放结束才离开
            (Phase::Analyzing, FlowEvent::ResponseArrived) => Phase::Analyzing,
            (Phase::Analyzing, FlowEvent::AudioEnded | FlowEvent::Skip) => Phase::AwaitingRecording,

            (Phase::AwaitingRecording, FlowEvent::RecordingStopped) => Phase::ProcessingResponse,
            (Phase::AwaitingRecording, FlowEvent::Skip) => finish,

            (Phase::ProcessingResponse, FlowEvent::ResponseArrived) => Phase::ProcessingResponse,
            (Phase::ProcessingResponse, FlowEvent::AudioEnded | FlowEvent::Skip) => finish,

            (phase, event) => {
                return Err(BusinessError::InvalidTransition {
                    phase: phase.to_string(),
                    event: format!("{:?}", event),
                })
            }
        };
        Ok(next)
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Intro => "intro",
            Phase::Narrating => "narrating",
            Phase::Analyzing => "analyzing",
            Phase::AwaitingRecording => "awaiting-recording",
            Phase::ProcessingResponse => "processing-response",
            Phase::Advance => "advance",
            Phase::Complete => "complete",
        };
        f.write_str(name)
    }
}
