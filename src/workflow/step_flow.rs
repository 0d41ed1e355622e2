//! 单元处理流程 - 流程层
//!
//! 核心职责：定义"一个单元"的完整处理流程
//!
//! 流程顺序：
//! 1. 播放旁白（资源缺失按播放结束处理）
//! 2. （可选）远程分析 → 播放回复
//! 3. 录音 → 发送 → 播放回复
//! 4. 远程失败 → 兜底文案

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clients::{AnalysisBackend, AnalysisRequest, AnalysisTarget, ExerciseChannel};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::prefs::DEFAULT_RECORDING_SECS;
use crate::infrastructure::{
    AudioCache, AudioPlayer, AudioSource, PlaybackOutcome, RecordedAudio, RecorderSession,
    VoiceRecorder,
};
use crate::models::{
    ActivityLog, ActivityType, AnalysisReply, LevelPlan, PayloadShape, ReplyAudio, UnitPlan,
};
use crate::services::ActivityLogger;
use crate::session::SessionStore;
use crate::utils::truncate_text;
use crate::workflow::exercise_ctx::ExerciseCtx;
use crate::workflow::phase::{FlowEvent, Phase};

/// 远程调用失败时给孩子听/看的句子
pub const FALLBACK_NARRATION: &str =
    "Şu anda küçük bir bağlantı sorunu var ama çok iyi gidiyorsun, haydi devam edelim!";

/// 单元素材：数据库 level_steps 或计划提供的文字和旁白地址
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitContent {
    pub text: Option<String>,
    /// 覆盖计划里的旁白资源；http(s) 地址按远程音频播放
    pub audio_url: Option<String>,
}

impl UnitContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            audio_url: None,
        }
    }

    /// 旁白来源：素材地址优先，其次是计划里的资源
    pub fn narration(&self, plan: &LevelPlan, unit: &UnitPlan) -> Option<AudioSource> {
        match self.audio_url.as_deref().map(str::trim) {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
                Some(AudioSource::Url(url.to_string()))
            }
            Some(path) if !path.is_empty() => Some(AudioSource::Asset(path.to_string())),
            _ => plan.narration_path(unit).map(AudioSource::Asset),
        }
    }
}

/// 单元处理结果
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub final_phase: Phase,
    /// 过程中有远程或录音失败，用了兜底
    pub degraded: bool,
    pub cancelled: bool,
    /// 录音发送后的回复
    pub reply: Option<AnalysisReply>,
    pub recording: Option<Duration>,
    pub transcript: Option<String>,
}

impl StepOutcome {
    fn new() -> Self {
        Self {
            final_phase: Phase::Intro,
            degraded: false,
            cancelled: false,
            reply: None,
            recording: None,
            transcript: None,
        }
    }

    fn stopped_at(mut self, phase: Phase) -> Self {
        self.final_phase = phase;
        self.cancelled = true;
        self
    }

    fn finished_at(mut self, phase: Phase) -> Self {
        self.final_phase = phase;
        self
    }

    pub fn is_finished(&self) -> bool {
        !self.cancelled && self.final_phase.is_terminal()
    }
}

/// 单元处理流程
///
/// - 只依赖播放 / 录音 / 远程分析三种能力
/// - 不持有进度，进度由 orchestrator 写入
pub struct StepFlow {
    player: Arc<dyn AudioPlayer>,
    recorder: Arc<dyn VoiceRecorder>,
    backend: Arc<dyn AnalysisBackend>,
    activity: ActivityLogger,
    cache: AudioCache,
    session: Option<SessionStore>,
    strict_remote: bool,
    default_record_secs: u64,
    /// 计划不是 auto_arm 时，等待 `arm` 信号再开始录音
    manual_arm: bool,
    arm: Arc<Notify>,
    replay_recording: bool,
    phase_tx: watch::Sender<Phase>,
}

impl StepFlow {
    pub fn new(
        config: &Config,
        player: Arc<dyn AudioPlayer>,
        recorder: Arc<dyn VoiceRecorder>,
        backend: Arc<dyn AnalysisBackend>,
        activity: ActivityLogger,
    ) -> Self {
        let (phase_tx, _) = watch::channel(Phase::Intro);
        Self {
            player,
            recorder,
            backend,
            activity,
            cache: AudioCache::new(&config.audio_cache_dir),
            session: None,
            strict_remote: config.strict_remote,
            default_record_secs: DEFAULT_RECORDING_SECS,
            manual_arm: config.manual_arm,
            arm: Arc::new(Notify::new()),
            replay_recording: config.replay_recording,
            phase_tx,
        }
    }

    pub fn with_session(mut self, session: SessionStore) -> Self {
        self.session = Some(session);
        self
    }

    /// 计划里没有指定时长时使用的录音上限
    pub fn with_default_record_secs(mut self, secs: u64) -> Self {
        self.default_record_secs = secs.max(1);
        self
    }

    /// 手动开始录音的信号（相当于点击麦克风）
    pub fn arm_handle(&self) -> Arc<Notify> {
        self.arm.clone()
    }

    /// 订阅阶段变化
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase_tx.subscribe()
    }

    /// 处理一个单元
    ///
    /// # 参数
    /// - `content`: 单元文字和旁白地址（计划或 level_steps 提供），文字随请求发给后端
    /// - `channel`: 当前等级的请求通道，保存 resumeUrl
    ///
    /// # 返回
    /// 单元结果；取消时 `cancelled = true`，不会再产生任何写入
    pub async fn run(
        &self,
        ctx: &ExerciseCtx,
        plan: &LevelPlan,
        unit: &UnitPlan,
        content: &UnitContent,
        channel: &mut ExerciseChannel,
        cancel: &CancellationToken,
    ) -> AppResult<StepOutcome> {
        let text = content.text.as_deref();
        let has_more = ctx.has_more();
        let mut phase = Phase::Intro;
        let mut outcome = StepOutcome::new();
        self.phase_tx.send_replace(phase);

        if let Some(t) = text {
            info!("{} 📄 {}", ctx, truncate_text(t, 80));
        }

        // ========== 1. 旁白 ==========
        self.transition(ctx, &mut phase, FlowEvent::Start, has_more)?;
        if let Some(source) = content.narration(plan, unit) {
            let played = self.play(ctx, source, cancel).await;
            if played == PlaybackOutcome::Stopped || cancel.is_cancelled() {
                return Ok(outcome.stopped_at(phase));
            }
        }
        self.transition(ctx, &mut phase, FlowEvent::AudioEnded, has_more)?;

        // ========== 2. 录音前的分析 ==========
        if unit.analyze_first {
            let target = channel.next_target(plan.analysis_endpoint(unit));
            let request = self.unit_request(ctx, plan, unit, text, None);
            let result = self.backend.analyze(&target, request, cancel).await;
            if cancel.is_cancelled() {
                return Ok(outcome.stopped_at(phase));
            }
            let (reply, is_fallback) = self
                .accept_reply(ctx, &target, result, channel, &mut outcome)
                .await?;
            if cancel.is_cancelled() {
                return Ok(outcome.stopped_at(phase));
            }
            self.transition(ctx, &mut phase, FlowEvent::ResponseArrived, has_more)?;

            let cache_key = format!("{}-intro", unit.key);
            if !self
                .play_reply(ctx, &reply, Some(&cache_key), !is_fallback, &mut outcome, cancel)
                .await?
            {
                return Ok(outcome.stopped_at(phase));
            }
            self.transition(ctx, &mut phase, FlowEvent::AudioEnded, has_more)?;
        } else {
            self.transition(ctx, &mut phase, FlowEvent::Skip, has_more)?;
        }

        // ========== 3. 录音 ==========
        if !unit.record {
            self.transition(ctx, &mut phase, FlowEvent::Skip, has_more)?;
            return Ok(outcome.finished_at(phase));
        }

        let limit = Duration::from_secs(
            unit.record_secs
                .or(plan.record_secs)
                .unwrap_or(self.default_record_secs),
        );
        if plan.auto_arm || !self.manual_arm {
            info!("{} 🎤 旁白结束，自动开始录音 (最长 {} 秒)", ctx, limit.as_secs());
        } else {
            info!("{} 🎤 按回车开始录音 (最长 {} 秒)", ctx, limit.as_secs());
            tokio::select! {
                _ = self.arm.notified() => {}
                _ = cancel.cancelled() => return Ok(outcome.stopped_at(phase)),
            }
        }

        let mut recorder_state = RecorderSession::new();
        recorder_state.start()?;
        let recorded = self.recorder.record(limit, cancel.child_token()).await;
        if cancel.is_cancelled() {
            recorder_state.abort();
            return Ok(outcome.stopped_at(phase));
        }

        let audio = match recorded {
            Ok(audio) => {
                recorder_state.finish(audio)?;
                if self.replay_recording && !self.replay(ctx, &mut recorder_state, cancel).await? {
                    return Ok(outcome.stopped_at(phase));
                }
                recorder_state.mark_sent()?
            }
            Err(e) => {
                recorder_state.abort();
                error!("{} ❌ 录音失败: {}", ctx, e);
                self.activity
                    .log(
                        ActivityLog::new(ctx.student_id, ctx.story_id, ActivityType::MediaError)
                            .at(ctx.level, ctx.step())
                            .with_error(e.to_string()),
                    )
                    .await;
                outcome.degraded = true;
                self.transition(ctx, &mut phase, FlowEvent::Skip, has_more)?;
                return Ok(outcome.finished_at(phase));
            }
        };
        outcome.recording = Some(audio.duration);
        self.transition(ctx, &mut phase, FlowEvent::RecordingStopped, has_more)?;

        // ========== 4. 发送录音 ==========
        let target = channel.next_target(plan.voice_endpoint(unit));
        self.activity
            .log(
                ActivityLog::new(ctx.student_id, ctx.story_id, ActivityType::VoiceSubmitted)
                    .at(ctx.level, ctx.step())
                    .with_voice_file(audio.file_name()),
            )
            .await;
        if cancel.is_cancelled() {
            return Ok(outcome.stopped_at(phase));
        }

        let request = self.unit_request(ctx, plan, unit, text, Some(audio));
        let result = self.backend.analyze(&target, request, cancel).await;
        if cancel.is_cancelled() {
            return Ok(outcome.stopped_at(phase));
        }
        let (reply, is_fallback) = self
            .accept_reply(ctx, &target, result, channel, &mut outcome)
            .await?;
        if cancel.is_cancelled() {
            return Ok(outcome.stopped_at(phase));
        }
        outcome.transcript = reply.transcript.clone();
        self.transition(ctx, &mut phase, FlowEvent::ResponseArrived, has_more)?;

        let keep_going = self
            .play_reply(ctx, &reply, None, !is_fallback, &mut outcome, cancel)
            .await?;
        outcome.reply = Some(reply);
        if !keep_going {
            return Ok(outcome.stopped_at(phase));
        }
        self.transition(ctx, &mut phase, FlowEvent::AudioEnded, has_more)?;

        Ok(outcome.finished_at(phase))
    }

    fn transition(
        &self,
        ctx: &ExerciseCtx,
        phase: &mut Phase,
        event: FlowEvent,
        has_more: bool,
    ) -> AppResult<()> {
        let next = phase.next(event, has_more)?;
        debug!("{} {} --{:?}--> {}", ctx, phase, event, next);
        *phase = next;
        self.phase_tx.send_replace(next);
        Ok(())
    }

    /// 播放一段音频，取消时立刻停止
    async fn play(
        &self,
        ctx: &ExerciseCtx,
        source: AudioSource,
        cancel: &CancellationToken,
    ) -> PlaybackOutcome {
        debug!("{} ▶ {}", ctx, source.describe());
        let outcome = tokio::select! {
            outcome = self.player.play(&source) => outcome,
            _ = cancel.cancelled() => {
                self.player.stop_all();
                PlaybackOutcome::Stopped
            }
        };

        match &outcome {
            PlaybackOutcome::MissingAsset => {
                warn!("{} ⚠️ 音频不存在，按播放结束处理: {}", ctx, source.describe())
            }
            PlaybackOutcome::Failed(msg) => {
                warn!("{} ⚠️ 播放失败，按播放结束处理: {}", ctx, msg)
            }
            _ => {}
        }
        outcome
    }

    /// 发送前回放录音
    ///
    /// # 返回
    /// `false` 表示回放被取消
    async fn replay(
        &self,
        ctx: &ExerciseCtx,
        recorder_state: &mut RecorderSession,
        cancel: &CancellationToken,
    ) -> AppResult<bool> {
        let source = {
            let audio = recorder_state.begin_playback()?;
            AudioSource::Base64 {
                data: audio.to_base64(),
                mime: audio.mime_type.clone(),
            }
        };
        info!("{} 🔁 回放录音", ctx);
        let played = self.play(ctx, source, cancel).await;
        recorder_state.end_playback()?;
        if played == PlaybackOutcome::Stopped || cancel.is_cancelled() {
            recorder_state.abort();
            return Ok(false);
        }
        Ok(true)
    }

    /// 构建请求体
    fn unit_request(
        &self,
        ctx: &ExerciseCtx,
        plan: &LevelPlan,
        unit: &UnitPlan,
        text: Option<&str>,
        audio: Option<RecordedAudio>,
    ) -> AnalysisRequest {
        let text = text.unwrap_or_default();
        match plan.payload {
            PayloadShape::Json => {
                let mut body = json!({
                    "userId": ctx.student_id,
                    "storyId": ctx.story_id,
                    "level": ctx.level,
                    "step": ctx.unit_index,
                    "stepKey": unit.key,
                    "text": text,
                });
                if let Some(audio) = audio {
                    body["ses"] = json!(audio.to_base64());
                    body["mimeType"] = json!(audio.mime_type);
                }
                AnalysisRequest::Json(body)
            }
            PayloadShape::Multipart => AnalysisRequest::Multipart {
                fields: vec![
                    ("userId".to_string(), ctx.student_id.to_string()),
                    ("storyId".to_string(), ctx.story_id.to_string()),
                    ("level".to_string(), ctx.level.to_string()),
                    ("step".to_string(), ctx.unit_index.to_string()),
                    ("stepKey".to_string(), unit.key.clone()),
                    ("text".to_string(), text.to_string()),
                ],
                audio,
            },
        }
    }

    /// 接收回复：成功时更新通道和会话，失败时换成兜底文案
    ///
    /// # 返回
    /// (回复, 是否为兜底)
    async fn accept_reply(
        &self,
        ctx: &ExerciseCtx,
        target: &AnalysisTarget,
        result: AppResult<AnalysisReply>,
        channel: &mut ExerciseChannel,
        outcome: &mut StepOutcome,
    ) -> AppResult<(AnalysisReply, bool)> {
        match result {
            Ok(reply) => {
                channel.accept(&reply);
                if let Some(session) = &self.session {
                    session.set_last_analysis(&reply).await;
                }
                Ok((reply, false))
            }
            Err(e) => {
                warn!("{} 请求 {} 未成功", ctx, target.describe());
                self.report_remote_failure(ctx, e, outcome).await?;
                Ok((AnalysisReply::fallback(FALLBACK_NARRATION), true))
            }
        }
    }

    /// 远程失败：严格模式直接返回错误，否则记录并标记降级
    async fn report_remote_failure(
        &self,
        ctx: &ExerciseCtx,
        err: AppError,
        outcome: &mut StepOutcome,
    ) -> AppResult<()> {
        if self.strict_remote {
            return Err(err);
        }
        error!("{} ❌ 远程调用失败，使用兜底文案: {}", ctx, err);
        self.activity
            .log(
                ActivityLog::new(ctx.student_id, ctx.story_id, ActivityType::RemoteError)
                    .at(ctx.level, ctx.step())
                    .with_error(err.to_string()),
            )
            .await;
        outcome.degraded = true;
        Ok(())
    }

    /// 显示并播放回复
    ///
    /// # 返回
    /// `false` 表示播放被取消
    async fn play_reply(
        &self,
        ctx: &ExerciseCtx,
        reply: &AnalysisReply,
        cache_key: Option<&str>,
        synthesize: bool,
        outcome: &mut StepOutcome,
        cancel: &CancellationToken,
    ) -> AppResult<bool> {
        if let Some(text) = &reply.narration {
            info!("{} 💬 {}", ctx, text);
        }

        let audio = match (&reply.audio, &reply.narration) {
            (Some(audio), _) => Some(audio.clone()),
            (None, Some(text)) if synthesize => {
                self.synthesize(ctx, text, cache_key, outcome, cancel).await?
            }
            _ => None,
        };
        if cancel.is_cancelled() {
            return Ok(false);
        }

        if let Some(audio) = audio {
            let played = self.play(ctx, audio.into(), cancel).await;
            if played == PlaybackOutcome::Stopped || cancel.is_cancelled() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// 文字转语音，带磁盘缓存
    async fn synthesize(
        &self,
        ctx: &ExerciseCtx,
        text: &str,
        cache_key: Option<&str>,
        outcome: &mut StepOutcome,
        cancel: &CancellationToken,
    ) -> AppResult<Option<ReplyAudio>> {
        if let Some(key) = cache_key {
            if let Some(hit) = self.cache.get(ctx.story_id, ctx.level, key).await {
                return Ok(Some(hit));
            }
        }
        if cancel.is_cancelled() {
            return Ok(None);
        }

        match self.backend.generate_voice(text, cancel).await {
            Ok(audio) => {
                if let Some(key) = cache_key {
                    if let Err(e) = self.cache.put(ctx.story_id, ctx.level, key, &audio).await {
                        warn!("{} ⚠️ 写入语音缓存失败: {}", ctx, e);
                    }
                }
                Ok(Some(audio))
            }
            Err(AppError::Cancelled) => Ok(None),
            Err(e) => {
                self.report_remote_failure(ctx, e, outcome).await?;
                Ok(None)
            }
        }
    }
}
