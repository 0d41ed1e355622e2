use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Webhook 环境：test 走 `/webhook-test`，product 走 `/webhook`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiEnv {
    #[default]
    Test,
    Product,
}

impl ApiEnv {
    pub fn webhook_suffix(self) -> &'static str {
        match self {
            ApiEnv::Test => "/webhook-test",
            ApiEnv::Product => "/webhook",
        }
    }
}

impl FromStr for ApiEnv {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "test" => Ok(ApiEnv::Test),
            "product" | "prod" | "production" => Ok(ApiEnv::Product),
            other => Err(ConfigError::UnknownApiEnv {
                value: other.to_string(),
            }),
        }
    }
}

impl Display for ApiEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiEnv::Test => f.write_str("test"),
            ApiEnv::Product => f.write_str("product"),
        }
    }
}

/// 程序配置
///
/// 默认值可被 `DOST_*` 环境变量覆盖。用户在设置面板里切换的选项
/// （API 环境、录音时长、播放速度）不在这里，见 `infrastructure::prefs`。
#[derive(Clone, Debug)]
pub struct Config {
    /// n8n 工作流服务地址（不含 /webhook 后缀）
    pub n8n_base_url: String,
    /// 托管数据库地址
    pub supabase_url: String,
    /// 托管数据库匿名 key
    pub supabase_anon_key: String,
    /// 静态资源目录（/audios, /images）
    pub assets_dir: String,
    /// 等级计划 TOML 目录
    pub plans_folder: String,
    /// 本地偏好文件
    pub prefs_file: String,
    /// 语音缓存目录
    pub audio_cache_dir: String,
    /// 播放器命令
    pub player_command: String,
    /// 录音命令
    pub recorder_command: String,
    /// 录音输入格式（ffmpeg -f）
    pub recorder_input: String,
    /// 录音设备（ffmpeg -i）
    pub recorder_device: String,
    /// 录音输出的 mime 类型，决定编码参数（webm / ogg / wav）
    pub recording_mime: String,
    /// 发送前先回放一遍孩子的录音
    pub replay_recording: bool,
    /// 非 auto_arm 的等级等待手动开始录音
    pub manual_arm: bool,
    /// 远程调用超时（秒），最小 1 秒
    pub request_timeout_secs: u64,
    /// 远程失败时直接报错，而不是使用兜底文案
    pub strict_remote: bool,
    /// 每完成一个单元获得的积分
    pub points_per_unit: u32,
    /// 每完成一个等级额外获得的积分
    pub points_per_level: u32,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            n8n_base_url: "http://localhost:5678".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: String::new(),
            assets_dir: "public".to_string(),
            plans_folder: "levels".to_string(),
            prefs_file: "dost_prefs.json".to_string(),
            audio_cache_dir: ".dost_audio_cache".to_string(),
            player_command: "ffplay".to_string(),
            recorder_command: "ffmpeg".to_string(),
            recorder_input: "pulse".to_string(),
            recorder_device: "default".to_string(),
            recording_mime: "audio/webm".to_string(),
            replay_recording: false,
            manual_arm: false,
            request_timeout_secs: 60,
            strict_remote: false,
            points_per_unit: 5,
            points_per_level: 20,
            verbose_logging: false,
            output_log_file: "dost_session.txt".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            n8n_base_url: std::env::var("DOST_N8N_BASE_URL").unwrap_or(default.n8n_base_url),
            supabase_url: std::env::var("DOST_SUPABASE_URL").unwrap_or(default.supabase_url),
            supabase_anon_key: std::env::var("DOST_SUPABASE_ANON_KEY").unwrap_or(default.supabase_anon_key),
            assets_dir: std::env::var("DOST_ASSETS_DIR").unwrap_or(default.assets_dir),
            plans_folder: std::env::var("DOST_PLANS_FOLDER").unwrap_or(default.plans_folder),
            prefs_file: std::env::var("DOST_PREFS_FILE").unwrap_or(default.prefs_file),
            audio_cache_dir: std::env::var("DOST_AUDIO_CACHE_DIR").unwrap_or(default.audio_cache_dir),
            player_command: std::env::var("DOST_PLAYER_COMMAND").unwrap_or(default.player_command),
            recorder_command: std::env::var("DOST_RECORDER_COMMAND").unwrap_or(default.recorder_command),
            recorder_input: std::env::var("DOST_RECORDER_INPUT").unwrap_or(default.recorder_input),
            recorder_device: std::env::var("DOST_RECORDER_DEVICE").unwrap_or(default.recorder_device),
            recording_mime: std::env::var("DOST_RECORDING_MIME").unwrap_or(default.recording_mime),
            replay_recording: std::env::var("DOST_REPLAY_RECORDING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.replay_recording),
            manual_arm: std::env::var("DOST_MANUAL_ARM").ok().and_then(|v| v.parse().ok()).unwrap_or(default.manual_arm),
            request_timeout_secs: std::env::var("DOST_REQUEST_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.request_timeout_secs),
            strict_remote: std::env::var("DOST_STRICT_REMOTE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.strict_remote),
            points_per_unit: std::env::var("DOST_POINTS_PER_UNIT").ok().and_then(|v| v.parse().ok()).unwrap_or(default.points_per_unit),
            points_per_level: std::env::var("DOST_POINTS_PER_LEVEL").ok().and_then(|v| v.parse().ok()).unwrap_or(default.points_per_level),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_env_parses_and_defaults_to_test() {
        assert_eq!(ApiEnv::default(), ApiEnv::Test);
        assert_eq!("product".parse::<ApiEnv>().unwrap(), ApiEnv::Product);
        assert_eq!(" TEST ".parse::<ApiEnv>().unwrap(), ApiEnv::Test);
        assert!("staging".parse::<ApiEnv>().is_err());
    }

    #[test]
    fn zero_timeout_is_clamped() {
        let config = Config {
            request_timeout_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.request_timeout(), Duration::from_secs(1));
        assert_eq!(Config::default().request_timeout(), Duration::from_secs(60));
    }
}
