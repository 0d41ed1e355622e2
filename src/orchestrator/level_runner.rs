//! 单个等级处理器 - 编排层
//!
//! ## 职责
//!
//! 1. **定位起点**：从进度里的 current_step 继续
//! 2. **遍历单元**：对每个单元调用 `StepFlow`
//! 3. **写进度**：每个单元结束后 advance_step + 积分 + step_completed
//! 4. **收尾**：最后一个单元结束后 complete_level、颁发徽章
//! 5. **统计输出**：返回 `LevelStats`

use anyhow::Result;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::clients::{DataStore, ExerciseChannel};
use crate::config::Config;
use crate::models::{ActivityLog, ActivityType, LevelStep, PlanTable, ReadingMetrics};
use crate::services::{
    ActivityLogger, BadgeService, ProgressService, ReadingLogService, StoryService,
};
use crate::session::SessionStore;
use crate::utils::logging::{log_level_complete, log_level_start, log_unit_start};
use crate::workflow::{ExerciseCtx, StepFlow, UnitContent};

/// 等级统计
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LevelStats {
    pub level: u8,
    pub total_units: usize,
    /// 本次完成的单元数
    pub completed_units: usize,
    pub degraded_units: usize,
    pub points: u32,
    pub level_completed: bool,
    pub story_completed: bool,
    pub cancelled: bool,
    pub badges: Vec<String>,
}

pub struct LevelRunner {
    flow: StepFlow,
    plans: PlanTable,
    progress: ProgressService,
    stories: StoryService,
    reading_logs: ReadingLogService,
    badges: BadgeService,
    activity: ActivityLogger,
    session: Option<SessionStore>,
    points_per_unit: u32,
    points_per_level: u32,
}

impl LevelRunner {
    pub fn new(config: &Config, store: Arc<dyn DataStore>, flow: StepFlow, plans: PlanTable) -> Self {
        Self {
            flow,
            plans,
            progress: ProgressService::new(store.clone()),
            stories: StoryService::new(store.clone()),
            reading_logs: ReadingLogService::new(store.clone()),
            badges: BadgeService::new(store.clone()),
            activity: ActivityLogger::new(store),
            session: None,
            points_per_unit: config.points_per_unit,
            points_per_level: config.points_per_level,
        }
    }

    pub fn with_session(mut self, session: SessionStore) -> Self {
        self.session = Some(session);
        self
    }

    pub fn plans(&self) -> &PlanTable {
        &self.plans
    }

    pub fn flow(&self) -> &StepFlow {
        &self.flow
    }

    /// 运行一个等级
    ///
    /// # 参数
    /// - `student_id`: 学生ID
    /// - `story_id`: 故事ID
    /// - `level`: 等级（1..=5）
    /// - `cancel`: 会话取消令牌
    ///
    /// # 返回
    /// 等级统计；被取消时 `cancelled = true`，取消之后不再写入任何数据
    pub async fn run_level(
        &self,
        student_id: i64,
        story_id: i64,
        level: u8,
        cancel: &CancellationToken,
    ) -> Result<LevelStats> {
        let plan = self.plans.get(level)?;
        plan.validate()?;
        let total = plan.units.len();

        let mut stats = LevelStats {
            level,
            total_units: total,
            ..Default::default()
        };

        // 断点续学：只有进度停在本等级时才使用 current_step
        let start_at = match self.progress.get_student_progress(student_id, story_id).await? {
            Some(p) if p.current_level == level => (p.current_step as usize).clamp(1, total),
            _ => 1,
        };
        if cancel.is_cancelled() {
            stats.cancelled = true;
            return Ok(stats);
        }

        let contents = self.step_contents(level).await;
        log_level_start(level, &plan.title, total, start_at);

        let mut channel = ExerciseChannel::new();
        let mut last_metrics: Option<(f64, f64)> = None;

        for (idx, unit) in plan.units.iter().enumerate().skip(start_at - 1) {
            let unit_index = idx + 1;
            let ctx = ExerciseCtx::new(student_id, story_id, level, unit_index, total);
            log_unit_start(level, unit_index, total, &unit.key);

            if let Some(session) = &self.session {
                session.set_position(level, ctx.step()).await;
            }
            self.activity
                .log(ActivityLog::new(student_id, story_id, ActivityType::StepStarted).at(level, ctx.step()))
                .await;
            if cancel.is_cancelled() {
                stats.cancelled = true;
                break;
            }

            let step = contents.get(&ctx.step());
            let content = UnitContent {
                text: unit
                    .text
                    .clone()
                    .or_else(|| step.and_then(|s| s.content.clone())),
                audio_url: step.and_then(|s| s.audio_url.clone()),
            };
            let text = content.text.as_deref();

            let outcome = self
                .flow
                .run(&ctx, plan, unit, &content, &mut channel, cancel)
                .await?;
            if outcome.cancelled || cancel.is_cancelled() {
                info!("{} ⏹ 已取消", ctx);
                stats.cancelled = true;
                break;
            }

            stats.completed_units += 1;
            if outcome.degraded {
                stats.degraded_units += 1;
            }

            // 计时朗读；没有单元文字时只统计语速
            if unit.timed_reading {
                if let Some(elapsed) = outcome.recording {
                    match self
                        .reading_logs
                        .record_attempt(
                            student_id,
                            story_id,
                            level,
                            text.unwrap_or_default(),
                            outcome.transcript.as_deref(),
                            elapsed,
                        )
                        .await
                    {
                        Ok(log) => last_metrics = Some((log.wpm, log.accuracy())),
                        Err(e) => warn!("{} ⚠️ 写入朗读记录失败: {}", ctx, e),
                    }
                }
            }

            if ctx.has_more() {
                if let Err(e) = self
                    .progress
                    .advance_step(student_id, story_id, level, ctx.step() + 1)
                    .await
                {
                    warn!("{} ⚠️ 保存进度失败: {}", ctx, e);
                }
            }
            if self.points_per_unit > 0 {
                match self
                    .progress
                    .award_points(student_id, story_id, self.points_per_unit)
                    .await
                {
                    Ok(_) => stats.points += self.points_per_unit,
                    Err(e) => warn!("{} ⚠️ 积分写入失败: {}", ctx, e),
                }
            }

            let mut done = ActivityLog::new(student_id, story_id, ActivityType::StepCompleted)
                .at(level, ctx.step());
            if let Some(reply) = &outcome.reply {
                done = done.with_response(json!({
                    "narration": reply.narration,
                    "transcript": reply.transcript,
                    "degraded": outcome.degraded,
                }));
            }
            self.activity.log(done).await;

            if cancel.is_cancelled() {
                stats.cancelled = true;
                break;
            }
        }

        let reached_end = !stats.cancelled && start_at + stats.completed_units > total;
        if reached_end {
            self.finish_level(student_id, story_id, level, last_metrics, &mut stats)
                .await?;
        }

        log_level_complete(level, stats.completed_units, stats.degraded_units, total);
        Ok(stats)
    }

    /// level_steps 里的单元素材，按步骤号索引；读取失败时为空
    async fn step_contents(&self, level: u8) -> HashMap<u32, LevelStep> {
        match self.stories.get_level_steps(level).await {
            Ok(steps) => steps.into_iter().map(|s| (s.step_number, s)).collect(),
            Err(e) => {
                warn!("⚠️ 读取等级 {} 的步骤内容失败，使用计划中的文字: {}", level, e);
                HashMap::new()
            }
        }
    }

    /// 等级收尾：完成等级、加奖励积分、检查徽章
    async fn finish_level(
        &self,
        student_id: i64,
        story_id: i64,
        level: u8,
        last_metrics: Option<(f64, f64)>,
        stats: &mut LevelStats,
    ) -> Result<()> {
        let saved = self
            .progress
            .complete_level(student_id, story_id, level, self.points_per_level)
            .await?;
        stats.points += self.points_per_level;
        stats.level_completed = true;
        stats.story_completed = saved.is_story_completed();

        self.activity
            .log(ActivityLog::new(student_id, story_id, ActivityType::LevelCompleted).at(level, 1))
            .await;

        let (wpm, accuracy) = match last_metrics {
            Some(m) => m,
            None => self
                .reading_logs
                .latest_metrics(student_id, story_id)
                .await
                .unwrap_or_else(|e| {
                    warn!("⚠️ 读取朗读指标失败: {}", e);
                    None
                })
                .unwrap_or_default(),
        };
        let metrics = ReadingMetrics {
            wpm,
            accuracy,
            points: saved.points,
            level: saved.completed_levels.iter().copied().max().unwrap_or(level),
        };

        match self.badges.check_and_award(student_id, story_id, &metrics).await {
            Ok(awarded) => {
                for badge in awarded {
                    self.activity
                        .log(
                            ActivityLog::new(student_id, story_id, ActivityType::BadgeAwarded)
                                .at(level, 1)
                                .with_response(json!({ "badge_id": badge.id, "name": badge.name })),
                        )
                        .await;
                    stats.badges.push(badge.name);
                }
            }
            Err(e) => error!("❌ 徽章检查失败: {}", e),
        }
        Ok(())
    }
}
