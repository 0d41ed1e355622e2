use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};

use dost_reading_tutor::clients::DataStore;
use dost_reading_tutor::infrastructure::PrefsFile;
use dost_reading_tutor::services::{
    LevelOverride, ProgressService, RosterService, StoryService, StudentList,
};
use dost_reading_tutor::utils::logging;
use dost_reading_tutor::{get_api_base, ApiEnv, App, Config, RestStore};

/// DOST 阅读辅导命令行
#[derive(Parser, Debug)]
#[command(name = "dost", about = "Children's leveled reading tutor")]
struct Cli {
    /// 显示 debug 日志
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 从当前等级开始学习一个故事
    Learn {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        story: i64,
        /// 所有等级都在旁白后自动开始录音
        #[arg(long)]
        hands_free: bool,
    },
    /// 查看或切换 webhook 环境（test / product）
    Env { value: Option<ApiEnv> },
    /// 查看或修改录音时长、播放速度
    Prefs {
        /// 录音时长（秒）
        #[arg(long)]
        recording_secs: Option<u64>,
        /// 播放速度（0.5 - 2.0）
        #[arg(long)]
        playback_rate: Option<f32>,
    },
    /// 查看学生的进度（不指定故事时列出全部）
    Progress {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        story: Option<i64>,
    },
    /// 管理员直接设置等级
    SetLevel {
        #[arg(long)]
        student: i64,
        #[arg(long)]
        story: i64,
        #[arg(long)]
        level: u8,
    },
    /// 为教师添加学生
    AddStudent {
        #[arg(long)]
        teacher: i64,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
    },
    /// 列出所有故事
    Stories,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let mut config = Config::from_env();
    logging::init(cli.verbose || config.verbose_logging);

    match cli.command {
        Command::Learn {
            student,
            story,
            hands_free,
        } => {
            config.manual_arm = !hands_free;
            let app = App::initialize(config).await?;
            app.cancel_on_ctrl_c();
            app.arm_on_enter();
            let summary = app.learn(student, story).await?;
            if summary.cancelled {
                warn!("⏹ 会话已取消，进度保存在最后完成的单元");
            }
        }
        Command::Env { value } => {
            let prefs = PrefsFile::new(&config.prefs_file);
            if let Some(env) = value {
                prefs.set_api_env(env).await?;
            }
            let env = prefs.api_env().await;
            info!("🌐 当前环境: {} ({})", env, get_api_base(&config.n8n_base_url, env));
        }
        Command::Prefs {
            recording_secs,
            playback_rate,
        } => {
            let prefs = PrefsFile::new(&config.prefs_file);
            if let Some(secs) = recording_secs {
                prefs.set_recording_secs(secs).await?;
            }
            if let Some(rate) = playback_rate {
                prefs.set_playback_rate(rate).await?;
            }
            let local = prefs.load().await;
            info!(
                "⚙️ 录音时长 {} 秒 | 播放速度 {}x",
                local.recording_secs, local.playback_rate
            );
        }
        Command::Progress { student, story } => {
            let progress = ProgressService::new(connect(&config)?);
            let rows: Vec<_> = match story {
                Some(story) => progress
                    .get_student_progress(student, story)
                    .await?
                    .into_iter()
                    .collect(),
                None => progress.get_all_progress(student).await?,
            };
            if rows.is_empty() {
                info!("📊 尚无进度，将从等级 1 开始");
            }
            for p in rows {
                info!(
                    "📊 故事 {} | 等级 {} 步骤 {} | 已完成 {:?} | 积分 {} | 故事完成: {}",
                    p.story_id,
                    p.current_level,
                    p.current_step,
                    p.completed_levels,
                    p.points,
                    p.is_story_completed()
                );
            }
        }
        Command::SetLevel {
            student,
            story,
            level,
        } => {
            let progress = ProgressService::new(connect(&config)?);
            match progress.admin_update_level(student, story, level).await? {
                LevelOverride::Inserted => info!("✓ 已创建进度: 等级 {}", level),
                LevelOverride::Updated => info!("✓ 已更新进度: 等级 {}", level),
            }
        }
        Command::AddStudent {
            teacher,
            first_name,
            last_name,
        } => {
            let roster = RosterService::new(connect(&config)?);
            let mut list = StudentList::load(&roster, teacher).await?;
            let added = list
                .handle_add_student(&roster, &first_name, &last_name)
                .await?;
            info!("✓ #{} {}", added.id, added.full_name());
            info!("👥 共 {} 名学生", list.students.len());
        }
        Command::Stories => {
            let stories = StoryService::new(connect(&config)?);
            for story in stories.get_stories().await? {
                info!(
                    "📖 #{} {}{}",
                    story.id,
                    story.title,
                    if story.locked { " 🔒" } else { "" }
                );
            }
        }
    }

    Ok(())
}

fn connect(config: &Config) -> Result<Arc<dyn DataStore>> {
    Ok(Arc::new(RestStore::new(config)?))
}
