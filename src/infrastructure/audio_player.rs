//! 音频播放器 - 基础设施层
//!
//! 持有唯一的播放通道，只暴露"播放 / 全部停止"的能力。
//! 同一时刻只会有一个片段在播放：后来的 `play` 会等前一个结束。

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::ReplyAudio;

/// 音频来源
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSource {
    /// 静态资源，例如 `/audios/level1/step1.mp3`
    Asset(String),
    /// 远程地址
    Url(String),
    /// base64 编码的音频
    Base64 { data: String, mime: String },
}

impl From<ReplyAudio> for AudioSource {
    fn from(audio: ReplyAudio) -> Self {
        AudioSource::Base64 {
            data: audio.data,
            mime: audio.mime,
        }
    }
}

impl AudioSource {
    /// 日志用的简短描述
    pub fn describe(&self) -> String {
        match self {
            AudioSource::Asset(path) => path.clone(),
            AudioSource::Url(url) => url.clone(),
            AudioSource::Base64 { data, mime } => format!("<{} {} bytes b64>", mime, data.len()),
        }
    }
}

/// 播放结果
///
/// 播放失败从不作为错误返回，流程把除 `Stopped` 以外的结果都当作"已结束"
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackOutcome {
    Finished,
    MissingAsset,
    Failed(String),
    Stopped,
}

#[async_trait]
pub trait AudioPlayer: Send + Sync {
    async fn play(&self, source: &AudioSource) -> PlaybackOutcome;

    /// 停止正在播放的片段
    fn stop_all(&self);
}

/// 播放结束后删除的临时文件
struct TempAudio(PathBuf);

impl Drop for TempAudio {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn extension_for(mime: &str) -> &'static str {
    match mime.split(';').next().unwrap_or_default().trim() {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" => "ogg",
        "audio/mp4" | "audio/aac" => "m4a",
        _ => "webm",
    }
}

/// 通过外部播放器进程播放（默认 ffplay）
pub struct CommandPlayer {
    program: String,
    assets_dir: PathBuf,
    playback_rate: f32,
    serial: Mutex<()>,
    current: std::sync::Mutex<CancellationToken>,
}

impl CommandPlayer {
    pub fn new(program: impl Into<String>, assets_dir: impl Into<PathBuf>, playback_rate: f32) -> Self {
        Self {
            program: program.into(),
            assets_dir: assets_dir.into(),
            playback_rate: playback_rate.clamp(0.5, 2.0),
            serial: Mutex::new(()),
            current: std::sync::Mutex::new(CancellationToken::new()),
        }
    }

    /// 静态资源在磁盘上的位置
    pub fn asset_path(&self, asset: &str) -> PathBuf {
        self.assets_dir.join(asset.trim_start_matches('/'))
    }

    fn build_args(&self, target: &str) -> Vec<String> {
        let mut args = vec![
            "-nodisp".to_string(),
            "-autoexit".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
        ];
        if (self.playback_rate - 1.0).abs() > f32::EPSILON {
            args.push("-af".to_string());
            args.push(format!("atempo={}", self.playback_rate));
        }
        args.push(target.to_string());
        args
    }

    fn fresh_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Ok(mut current) = self.current.lock() {
            *current = token.clone();
        }
        token
    }

    async fn run_player(&self, target: &str, token: &CancellationToken) -> PlaybackOutcome {
        let mut child = match Command::new(&self.program)
            .args(self.build_args(target))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!("⚠️ 无法启动播放器 {}: {}", self.program, e);
                return PlaybackOutcome::Failed(e.to_string());
            }
        };

        tokio::select! {
            status = child.wait() => match status {
                Ok(s) if s.success() => PlaybackOutcome::Finished,
                Ok(s) => PlaybackOutcome::Failed(format!("播放器退出: {}", s)),
                Err(e) => PlaybackOutcome::Failed(e.to_string()),
            },
            _ = token.cancelled() => {
                let _ = child.kill().await;
                PlaybackOutcome::Stopped
            }
        }
    }
}

#[async_trait]
impl AudioPlayer for CommandPlayer {
    async fn play(&self, source: &AudioSource) -> PlaybackOutcome {
        // 先解析来源，找不到文件时不占用播放通道
        let (target, _temp) = match source {
            AudioSource::Asset(asset) => {
                let path = self.asset_path(asset);
                if !Path::new(&path).exists() {
                    warn!("⚠️ 音频文件不存在，视为已播放: {}", asset);
                    return PlaybackOutcome::MissingAsset;
                }
                (path.to_string_lossy().to_string(), None)
            }
            AudioSource::Url(url) => (url.clone(), None),
            AudioSource::Base64 { data, mime } => {
                let bytes = match general_purpose::STANDARD.decode(data.trim()) {
                    Ok(b) => b,
                    Err(e) => {
                        warn!("⚠️ base64 音频无法解码: {}", e);
                        return PlaybackOutcome::Failed(e.to_string());
                    }
                };
                let path = std::env::temp_dir().join(format!(
                    "dost-{}.{}",
                    uuid::Uuid::new_v4(),
                    extension_for(mime)
                ));
                if let Err(e) = tokio::fs::write(&path, bytes).await {
                    warn!("⚠️ 无法写入临时音频: {}", e);
                    return PlaybackOutcome::Failed(e.to_string());
                }
                let target = path.to_string_lossy().to_string();
                (target, Some(TempAudio(path)))
            }
        };

        let _guard = self.serial.lock().await;
        let token = self.fresh_token();
        debug!("▶️ 播放: {}", source.describe());
        self.run_player(&target, &token).await
    }

    fn stop_all(&self) {
        if let Ok(current) = self.current.lock() {
            current.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_asset_does_not_spawn_player() {
        let dir = tempfile::tempdir().unwrap();
        let player = CommandPlayer::new("definitely-not-a-player", dir.path(), 1.0);
        let outcome = player
            .play(&AudioSource::Asset("/audios/level1/none.mp3".into()))
            .await;
        assert_eq!(outcome, PlaybackOutcome::MissingAsset);
    }

    #[tokio::test]
    async fn missing_player_binary_is_a_soft_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("audios")).unwrap();
        std::fs::write(dir.path().join("audios/a.mp3"), b"ID3").unwrap();
        let player = CommandPlayer::new("definitely-not-a-player", dir.path(), 1.0);
        let outcome = player.play(&AudioSource::Asset("/audios/a.mp3".into())).await;
        assert!(matches!(outcome, PlaybackOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn bad_base64_fails_softly() {
        let player = CommandPlayer::new("ffplay", ".", 1.0);
        let outcome = player
            .play(&AudioSource::Base64 {
                data: "%%%".into(),
                mime: "audio/mpeg".into(),
            })
            .await;
        assert!(matches!(outcome, PlaybackOutcome::Failed(_)));
    }

    #[test]
    fn rate_is_clamped_and_passed_as_atempo() {
        let player = CommandPlayer::new("ffplay", ".", 3.0);
        let args = player.build_args("x.mp3");
        assert!(args.contains(&"atempo=2".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("x.mp3"));
        assert_eq!(extension_for("audio/webm;codecs=opus"), "webm");
    }
}
