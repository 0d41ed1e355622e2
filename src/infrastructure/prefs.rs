//! 本地偏好文件
//!
//! 保存用户在设置面板里切换的选项和会话缓存，JSON 格式。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::config::ApiEnv;
use crate::error::{AppError, AppResult};
use crate::models::{Student, Teacher, User};

pub const DEFAULT_RECORDING_SECS: u64 = 8;
pub const DEFAULT_PLAYBACK_RATE: f32 = 1.0;
pub const MAX_RECORDING_SECS: u64 = 120;
pub const PLAYBACK_RATE_RANGE: (f32, f32) = (0.5, 2.0);

/// 缓存的登录信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub teacher: Option<Teacher>,
    #[serde(default)]
    pub student: Option<Student>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalPrefs {
    pub api_env: ApiEnv,
    pub recording_secs: u64,
    pub playback_rate: f32,
    pub session: Option<SessionSnapshot>,
}

impl Default for LocalPrefs {
    fn default() -> Self {
        Self {
            api_env: ApiEnv::Test,
            recording_secs: DEFAULT_RECORDING_SECS,
            playback_rate: DEFAULT_PLAYBACK_RATE,
            session: None,
        }
    }
}

/// 偏好文件
#[derive(Debug, Clone)]
pub struct PrefsFile {
    path: PathBuf,
}

impl PrefsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取偏好；文件不存在或内容损坏时返回默认值
    pub async fn load(&self) -> LocalPrefs {
        let content = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) => {
                debug!("偏好文件不可读 ({}): {}", self.path.display(), e);
                return LocalPrefs::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(prefs) => prefs,
            Err(e) => {
                warn!("⚠️ 偏好文件已损坏，使用默认值 ({}): {}", self.path.display(), e);
                LocalPrefs::default()
            }
        }
    }

    pub async fn save(&self, prefs: &LocalPrefs) -> AppResult<()> {
        let path = self.path.display().to_string();
        let json = serde_json::to_string_pretty(prefs)
            .map_err(|e| AppError::file_write_failed(path.clone(), e))?;
        fs::write(&self.path, json)
            .await
            .map_err(|e| AppError::file_write_failed(path, e))
    }

    /// 读取 → 修改 → 写回
    pub async fn update<F>(&self, f: F) -> AppResult<LocalPrefs>
    where
        F: FnOnce(&mut LocalPrefs),
    {
        let mut prefs = self.load().await;
        f(&mut prefs);
        self.save(&prefs).await?;
        Ok(prefs)
    }

    /// 当前 API 环境（相当于读取 cookie，默认 test）
    pub async fn api_env(&self) -> ApiEnv {
        self.load().await.api_env
    }

    pub async fn set_api_env(&self, env: ApiEnv) -> AppResult<()> {
        self.update(|p| p.api_env = env).await.map(|_| ())
    }

    /// 设置录音时长，限制在 1..=MAX_RECORDING_SECS 秒
    pub async fn set_recording_secs(&self, secs: u64) -> AppResult<u64> {
        let secs = secs.clamp(1, MAX_RECORDING_SECS);
        self.update(|p| p.recording_secs = secs).await?;
        Ok(secs)
    }

    /// 设置播放速度，限制在 0.5..=2.0
    pub async fn set_playback_rate(&self, rate: f32) -> AppResult<f32> {
        let (min, max) = PLAYBACK_RATE_RANGE;
        let rate = if rate.is_finite() {
            rate.clamp(min, max)
        } else {
            DEFAULT_PLAYBACK_RATE
        };
        self.update(|p| p.playback_rate = rate).await?;
        Ok(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clean_prefs_default_to_test_env() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = PrefsFile::new(dir.path().join("prefs.json"));
        assert_eq!(prefs.api_env().await, ApiEnv::Test);
        assert_eq!(prefs.load().await.recording_secs, DEFAULT_RECORDING_SECS);
    }

    #[tokio::test]
    async fn env_toggle_persists() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = PrefsFile::new(dir.path().join("prefs.json"));
        prefs.set_api_env(ApiEnv::Product).await.unwrap();
        assert_eq!(PrefsFile::new(prefs.path()).api_env().await, ApiEnv::Product);
    }

    #[tokio::test]
    async fn corrupt_file_loads_defaults_and_partial_file_fills_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(PrefsFile::new(&path).load().await, LocalPrefs::default());

        std::fs::write(&path, r#"{"playback_rate": 0.75}"#).unwrap();
        let loaded = PrefsFile::new(&path).load().await;
        assert_eq!(loaded.playback_rate, 0.75);
        assert_eq!(loaded.api_env, ApiEnv::Test);
    }

    #[tokio::test]
    async fn recording_and_playback_settings_are_clamped_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = PrefsFile::new(dir.path().join("prefs.json"));

        assert_eq!(prefs.set_recording_secs(0).await.unwrap(), 1);
        assert_eq!(prefs.set_recording_secs(12).await.unwrap(), 12);
        assert_eq!(prefs.set_playback_rate(5.0).await.unwrap(), 2.0);
        assert_eq!(prefs.set_playback_rate(0.75).await.unwrap(), 0.75);

        let loaded = PrefsFile::new(prefs.path()).load().await;
        assert_eq!(loaded.recording_secs, 12);
        assert_eq!(loaded.playback_rate, 0.75);
        assert_eq!(loaded.api_env, ApiEnv::Test);
    }

    #[tokio::test]
    async fn save_into_missing_directory_is_a_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = PrefsFile::new(dir.path().join("missing").join("prefs.json"));
        let err = prefs.save(&LocalPrefs::default()).await.unwrap_err();
        assert!(matches!(err, AppError::File(_)));
    }
}
