//! 录音器 - 基础设施层
//!
//! 状态：Idle → Recording → Stopped(有数据) → {Playing | Sent}

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::MediaError;

/// 一次录音的结果
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedAudio {
    pub bytes: Vec<u8>,
    /// 录音实际使用的格式，原样传给后端
    pub mime_type: String,
    pub duration: Duration,
}

impl RecordedAudio {
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }

    /// multipart 上传时使用的文件名
    pub fn file_name(&self) -> String {
        let ext = self
            .mime_type
            .split(';')
            .next()
            .and_then(|m| m.split('/').nth(1))
            .unwrap_or("webm");
        format!("ses.{}", ext)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Stopped,
    Playing,
    Sent,
}

impl std::fmt::Display for RecorderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecorderState::Idle => "idle",
            RecorderState::Recording => "recording",
            RecorderState::Stopped => "stopped",
            RecorderState::Playing => "playing",
            RecorderState::Sent => "sent",
        };
        f.write_str(name)
    }
}

/// 录音状态机
#[derive(Debug)]
pub struct RecorderSession {
    state: RecorderState,
    audio: Option<RecordedAudio>,
}

impl Default for RecorderSession {
    fn default() -> Self {
        Self::new()
    }
}

impl RecorderSession {
    pub fn new() -> Self {
        Self {
            state: RecorderState::Idle,
            audio: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    fn invalid(&self, action: &str) -> MediaError {
        MediaError::InvalidRecorderState {
            from: self.state.to_string(),
            action: action.to_string(),
        }
    }

    /// 开始录音；已有录音时允许重录
    pub fn start(&mut self) -> Result<(), MediaError> {
        match self.state {
            RecorderState::Idle | RecorderState::Stopped | RecorderState::Sent => {
                self.audio = None;
                self.state = RecorderState::Recording;
                Ok(())
            }
            _ => Err(self.invalid("start")),
        }
    }

    pub fn finish(&mut self, audio: RecordedAudio) -> Result<(), MediaError> {
        if self.state != RecorderState::Recording {
            return Err(self.invalid("finish"));
        }
        self.audio = Some(audio);
        self.state = RecorderState::Stopped;
        Ok(())
    }

    /// 录音失败或被取消，回到 Idle
    pub fn abort(&mut self) {
        self.audio = None;
        self.state = RecorderState::Idle;
    }

    pub fn begin_playback(&mut self) -> Result<&RecordedAudio, MediaError> {
        if self.state != RecorderState::Stopped {
            return Err(self.invalid("play"));
        }
        self.state = RecorderState::Playing;
        self.audio.as_ref().ok_or(MediaError::EmptyRecording)
    }

    pub fn end_playback(&mut self) -> Result<(), MediaError> {
        if self.state != RecorderState::Playing {
            return Err(self.invalid("end_playback"));
        }
        self.state = RecorderState::Stopped;
        Ok(())
    }

    /// 交出录音用于发送
    pub fn mark_sent(&mut self) -> Result<RecordedAudio, MediaError> {
        if self.state != RecorderState::Stopped {
            return Err(self.invalid("send"));
        }
        let audio = self.audio.take().ok_or(MediaError::EmptyRecording)?;
        self.state = RecorderState::Sent;
        Ok(audio)
    }
}

#[async_trait]
pub trait VoiceRecorder: Send + Sync {
    /// 录音直到 `limit` 到期或 `stop` 被触发
    async fn record(
        &self,
        limit: Duration,
        stop: CancellationToken,
    ) -> Result<RecordedAudio, MediaError>;
}

/// 采集进程的输出格式，决定编码参数和上报给后端的 mime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    WebmOpus,
    OggOpus,
    Wav,
}

impl CaptureFormat {
    /// 按配置的 mime 选择格式；不支持的 mime 退回 webm/opus
    pub fn from_mime(mime: &str) -> Self {
        let base = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        match base.as_str() {
            "audio/webm" => CaptureFormat::WebmOpus,
            "audio/ogg" => CaptureFormat::OggOpus,
            "audio/wav" | "audio/x-wav" | "audio/wave" => CaptureFormat::Wav,
            other => {
                warn!("⚠️ 不支持的录音格式 {}，改用 webm/opus", other);
                CaptureFormat::WebmOpus
            }
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            CaptureFormat::WebmOpus => "audio/webm;codecs=opus",
            CaptureFormat::OggOpus => "audio/ogg;codecs=opus",
            CaptureFormat::Wav => "audio/wav",
        }
    }

    fn codec_args(self) -> [&'static str; 4] {
        match self {
            CaptureFormat::WebmOpus => ["-c:a", "libopus", "-f", "webm"],
            CaptureFormat::OggOpus => ["-c:a", "libopus", "-f", "ogg"],
            CaptureFormat::Wav => ["-c:a", "pcm_s16le", "-f", "wav"],
        }
    }
}

/// 通过外部采集进程录音（默认 ffmpeg，输出到 stdout）
pub struct CommandRecorder {
    program: String,
    input_format: String,
    device: String,
    format: CaptureFormat,
}

impl CommandRecorder {
    pub fn new(program: impl Into<String>, mime_type: &str) -> Self {
        Self {
            program: program.into(),
            input_format: "pulse".to_string(),
            device: "default".to_string(),
            format: CaptureFormat::from_mime(mime_type),
        }
    }

    /// 采集输入，例如 `pulse default`、`alsa hw:0`、`avfoundation :0`
    pub fn with_device(mut self, input_format: impl Into<String>, device: impl Into<String>) -> Self {
        self.input_format = input_format.into();
        self.device = device.into();
        self
    }

    /// 录音结果上报的 mime
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    fn build_args(&self, limit: Duration) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            self.input_format.clone(),
            "-i".into(),
            self.device.clone(),
            "-t".into(),
            format!("{:.1}", limit.as_secs_f64()),
        ];
        args.extend(self.format.codec_args().iter().map(|a| a.to_string()));
        args.push("pipe:1".into());
        args
    }
}

/// 根据采集进程的 stderr 判断错误类型
pub(crate) fn classify_capture_error(stderr: &str) -> MediaError {
    let lower = stderr.to_lowercase();
    if lower.contains("permission denied") || lower.contains("not allowed") {
        MediaError::PermissionDenied(stderr.trim().to_string())
    } else if lower.contains("no such")
        || lower.contains("cannot open")
        || lower.contains("not found")
        || lower.contains("connection refused")
    {
        MediaError::DeviceNotFound(stderr.trim().to_string())
    } else {
        MediaError::CaptureFailed(stderr.trim().to_string())
    }
}

#[async_trait]
impl VoiceRecorder for CommandRecorder {
    async fn record(
        &self,
        limit: Duration,
        stop: CancellationToken,
    ) -> Result<RecordedAudio, MediaError> {
        let mut child = Command::new(&self.program)
            .args(self.build_args(limit))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!("❌ 无法启动录音程序 {}: {}", self.program, e);
                if e.kind() == std::io::ErrorKind::NotFound {
                    MediaError::DeviceNotFound(format!("{} 未安装", self.program))
                } else {
                    MediaError::CaptureFailed(e.to_string())
                }
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::CaptureFailed("stdout 不可用".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::CaptureFailed("stderr 不可用".into()))?;
        let mut stdin = child.stdin.take();

        let out_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout.read_to_end(&mut buf).await;
            buf
        });
        let err_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        info!("🎙️ 开始录音，最长 {:.1} 秒", limit.as_secs_f64());
        let started = Instant::now();

        let status = tokio::select! {
            status = child.wait() => status.ok(),
            _ = stop.cancelled() => None,
            _ = tokio::time::sleep(limit + Duration::from_secs(2)) => None,
        };

        let status = match status {
            Some(s) => Some(s),
            None => {
                // ffmpeg 收到 q 会正常收尾，写完容器
                if let Some(stdin) = stdin.as_mut() {
                    let _ = stdin.write_all(b"q").await;
                }
                match tokio::time::timeout(Duration::from_secs(2), child.wait()).await {
                    Ok(Ok(s)) => Some(s),
                    _ => {
                        let _ = child.kill().await;
                        None
                    }
                }
            }
        };
        let duration = started.elapsed();

        let bytes = out_task.await.unwrap_or_default();
        let stderr_text = err_task.await.unwrap_or_default();
        debug!("录音结束: {} bytes, status={:?}", bytes.len(), status);

        if bytes.is_empty() {
            let err = if stderr_text.trim().is_empty() {
                MediaError::EmptyRecording
            } else {
                classify_capture_error(&stderr_text)
            };
            error!("❌ 录音失败: {}", err);
            return Err(err);
        }

        Ok(RecordedAudio {
            bytes,
            mime_type: self.mime_type().to_string(),
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RecordedAudio {
        RecordedAudio {
            bytes: vec![1, 2, 3],
            mime_type: "audio/webm;codecs=opus".into(),
            duration: Duration::from_secs(2),
        }
    }

    #[test]
    fn session_follows_recorder_lifecycle() {
        let mut s = RecorderSession::new();
        assert!(s.mark_sent().is_err());

        s.start().unwrap();
        assert!(s.start().is_err());
        s.finish(sample()).unwrap();
        assert_eq!(s.state(), RecorderState::Stopped);

        assert_eq!(s.begin_playback().unwrap().bytes, vec![1, 2, 3]);
        assert!(s.mark_sent().is_err());
        s.end_playback().unwrap();

        let audio = s.mark_sent().unwrap();
        assert_eq!(audio.file_name(), "ses.webm");
        assert_eq!(s.state(), RecorderState::Sent);

        // 发送后可以重录
        s.start().unwrap();
        s.abort();
        assert_eq!(s.state(), RecorderState::Idle);
    }

    #[test]
    fn capture_errors_are_classified() {
        assert!(matches!(
            classify_capture_error("pulse: Permission denied"),
            MediaError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_capture_error("default: No such file or directory"),
            MediaError::DeviceNotFound(_)
        ));
        assert!(matches!(
            classify_capture_error("something odd"),
            MediaError::CaptureFailed(_)
        ));
    }

    #[tokio::test]
    async fn missing_capture_binary_reports_device_not_found() {
        let recorder = CommandRecorder::new("definitely-not-ffmpeg", "audio/webm");
        let err = recorder
            .record(Duration::from_secs(1), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::DeviceNotFound(_)));
    }

    #[test]
    fn codec_arguments_follow_configured_mime() {
        let wav = CommandRecorder::new("ffmpeg", "audio/wav");
        let args = wav.build_args(Duration::from_secs(5));
        assert_eq!(&args[args.len() - 5..], ["-c:a", "pcm_s16le", "-f", "wav", "pipe:1"]);
        assert_eq!(wav.mime_type(), "audio/wav");

        let ogg = CommandRecorder::new("ffmpeg", "audio/ogg");
        let args = ogg.build_args(Duration::from_secs(5));
        assert_eq!(&args[args.len() - 5..], ["-c:a", "libopus", "-f", "ogg", "pipe:1"]);
        assert_eq!(ogg.mime_type(), "audio/ogg;codecs=opus");

        let fallback = CommandRecorder::new("ffmpeg", "audio/aac");
        let args = fallback.build_args(Duration::from_secs(5));
        assert_eq!(&args[args.len() - 3..], ["-f", "webm", "pipe:1"]);
        assert_eq!(fallback.mime_type(), "audio/webm;codecs=opus");
    }

    #[test]
    fn capture_device_is_configurable() {
        let recorder = CommandRecorder::new("ffmpeg", "audio/webm").with_device("alsa", "hw:1");
        let args = recorder.build_args(Duration::from_secs(8));
        assert_eq!(&args[3..7], ["-f", "alsa", "-i", "hw:1"]);
        assert_eq!(&args[7..9], ["-t", "8.0"]);
    }

    #[test]
    fn base64_encoding() {
        assert_eq!(sample().to_base64(), "AQID");
    }
}
