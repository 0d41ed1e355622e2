//! 学习会话 - 编排层
//!
//! ## 职责
//!
//! 1. **应用初始化**：读取偏好、创建数据层 / webhook 客户端 / 播放器 / 录音器
//! 2. **会话管理**：学生登录、Ctrl-C 取消
//! 3. **等级循环**：从当前等级开始，直到故事完成、被取消或等级未完成
//! 4. **全局统计**：汇总积分、徽章

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::clients::{AnalysisBackend, DataStore, RestStore, WebhookClient};
use crate::config::Config;
use crate::infrastructure::{AudioPlayer, CommandPlayer, CommandRecorder, PrefsFile, VoiceRecorder};
use crate::models::{load_plan_table, ActivityLog, ActivityType, PlanTable};
use crate::orchestrator::level_runner::LevelRunner;
use crate::services::{ActivityLogger, BadgeService, ProgressService, RosterService};
use crate::session::SessionStore;
use crate::utils::logging::{init_log_file, log_startup, print_final_stats};
use crate::workflow::StepFlow;

/// 组装 App 所需的部件
pub struct AppParts {
    pub store: Arc<dyn DataStore>,
    pub player: Arc<dyn AudioPlayer>,
    pub recorder: Arc<dyn VoiceRecorder>,
    pub backend: Arc<dyn AnalysisBackend>,
    pub plans: PlanTable,
    pub prefs: PrefsFile,
    /// 仅用于日志
    pub api_base: String,
    pub recording_secs: u64,
}

/// 一次学习会话的汇总
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SessionSummary {
    pub levels_completed: usize,
    pub points_earned: u32,
    pub degraded_units: usize,
    pub story_completed: bool,
    pub cancelled: bool,
    /// 会话结束时的总积分
    pub total_points: u32,
    pub badge_count: usize,
}

/// 应用主结构
pub struct App {
    config: Config,
    store: Arc<dyn DataStore>,
    session: SessionStore,
    runner: LevelRunner,
    progress: ProgressService,
    activity: ActivityLogger,
    api_base: String,
    cancel: CancellationToken,
}

impl App {
    /// 初始化应用（真实的数据层、webhook 与音频设备）
    pub async fn initialize(config: Config) -> Result<Self> {
        init_log_file(&config.output_log_file)?;

        let prefs = PrefsFile::new(&config.prefs_file);
        let local = prefs.load().await;

        let backend = WebhookClient::new(&config, local.api_env)?;
        let api_base = backend.api_base().to_string();
        let store = RestStore::new(&config).context("无法创建数据层客户端")?;
        let plans = load_plan_table(&config.plans_folder).await;

        let parts = AppParts {
            store: Arc::new(store),
            player: Arc::new(CommandPlayer::new(
                &config.player_command,
                &config.assets_dir,
                local.playback_rate,
            )),
            recorder: Arc::new(
                CommandRecorder::new(&config.recorder_command, &config.recording_mime)
                    .with_device(&config.recorder_input, &config.recorder_device),
            ),
            backend: Arc::new(backend),
            plans,
            prefs,
            api_base,
            recording_secs: local.recording_secs,
        };
        Ok(Self::from_parts(config, parts))
    }

    pub fn from_parts(config: Config, parts: AppParts) -> Self {
        let session = SessionStore::new(parts.prefs);
        let activity = ActivityLogger::new(parts.store.clone());

        let flow = StepFlow::new(
            &config,
            parts.player,
            parts.recorder,
            parts.backend,
            activity.clone(),
        )
        .with_session(session.clone())
        .with_default_record_secs(parts.recording_secs);

        let runner = LevelRunner::new(&config, parts.store.clone(), flow, parts.plans)
            .with_session(session.clone());

        Self {
            progress: ProgressService::new(parts.store.clone()),
            store: parts.store,
            session,
            runner,
            activity,
            api_base: parts.api_base,
            cancel: CancellationToken::new(),
            config,
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn runner(&self) -> &LevelRunner {
        &self.runner
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 手动开始录音（`manual_arm` 打开时使用）
    pub fn arm_handle(&self) -> Arc<Notify> {
        self.runner.flow().arm_handle()
    }

    /// 回车时开始录音
    pub fn arm_on_enter(&self) {
        let arm = self.arm_handle();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(_)) = lines.next_line().await {
                arm.notify_one();
            }
        });
    }

    /// Ctrl-C 时取消整个会话
    pub fn cancel_on_ctrl_c(&self) {
        let token = self.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("⏹ 收到 Ctrl-C，正在结束会话...");
                token.cancel();
            }
        });
    }

    /// 学习一个故事
    ///
    /// # 参数
    /// - `student_id`: 学生ID
    /// - `story_id`: 故事ID
    ///
    /// # 返回
    /// 本次会话的汇总
    pub async fn learn(&self, student_id: i64, story_id: i64) -> Result<SessionSummary> {
        let roster = RosterService::new(self.store.clone());
        let student = roster
            .get_student(student_id)
            .await?
            .with_context(|| format!("找不到学生 #{}", student_id))?;

        self.session.login_student(student, story_id).await?;
        log_startup(&self.api_base, student_id, story_id);
        self.activity
            .log(ActivityLog::new(student_id, story_id, ActivityType::SessionStarted))
            .await;

        let mut summary = SessionSummary::default();

        loop {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            if self.progress.is_story_completed(student_id, story_id).await? {
                info!("🏆 故事 {} 已完成", story_id);
                summary.story_completed = true;
                break;
            }

            let level = self.progress.get_current_level(student_id, story_id).await?;
            let stats = match self
                .runner
                .run_level(student_id, story_id, level, &self.cancel)
                .await
            {
                Ok(stats) => stats,
                Err(e) => {
                    error!("❌ 等级 {} 运行失败: {}", level, e);
                    return Err(e);
                }
            };

            summary.points_earned += stats.points;
            summary.degraded_units += stats.degraded_units;
            if stats.level_completed {
                summary.levels_completed += 1;
            }
            if stats.cancelled {
                summary.cancelled = true;
                break;
            }
            if stats.story_completed {
                summary.story_completed = true;
                break;
            }
            if !stats.level_completed {
                warn!("⚠️ 等级 {} 未完成，结束本次会话", level);
                break;
            }
        }

        let badges = BadgeService::new(self.store.clone());
        let (progress, earned) = futures::try_join!(
            self.progress.get_student_progress(student_id, story_id),
            badges.get_student_badges(student_id),
        )?;
        summary.total_points = progress.map_or(0, |p| p.points);
        summary.badge_count = earned.len();

        print_final_stats(
            summary.levels_completed,
            summary.points_earned,
            summary.story_completed,
            &self.config.output_log_file,
        );
        Ok(summary)
    }
}
