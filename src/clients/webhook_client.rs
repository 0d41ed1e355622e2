/// 工作流后端（n8n webhook）客户端
///
/// 封装远程分析与语音生成调用。后端在等待下一次输入时会返回
/// `resumeUrl`，同一练习的下一次请求必须发到这个地址。
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ApiEnv, Config};
use crate::error::{ApiError, AppError, AppResult};
use crate::infrastructure::RecordedAudio;
use crate::models::{AnalysisReply, ReplyAudio};
use crate::utils::truncate_text;

/// 后端提供的固定接口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Level1,
    Level1Step(u8),
    Level1ChildrenVoice,
    Level2Step1,
    Level3Step1,
    Level4Step1,
    Level4Step2,
    /// 问答等级，后端没有固定命名时使用 `/dost/level5/stepN`
    Level5Step(u8),
    VoiceGenerator,
}

impl Endpoint {
    pub fn path(self) -> String {
        match self {
            Endpoint::Level1 => "/dost/level1".to_string(),
            Endpoint::Level1Step(n) => format!("/dost/level1/step{}", n),
            Endpoint::Level1ChildrenVoice => "/dost/level1/children-voice".to_string(),
            Endpoint::Level2Step1 => "/dost/level2/step1".to_string(),
            Endpoint::Level3Step1 => "/dost/level3/step1".to_string(),
            Endpoint::Level4Step1 => "/dost/level4/step1".to_string(),
            Endpoint::Level4Step2 => "/dost/level4/step2".to_string(),
            Endpoint::Level5Step(n) => format!("/dost/level5/step{}", n),
            Endpoint::VoiceGenerator => "/dost/voice-generator".to_string(),
        }
    }
}

/// webhook 根地址：test → `/webhook-test`，product → `/webhook`
pub fn get_api_base(n8n_base_url: &str, env: ApiEnv) -> String {
    format!("{}{}", n8n_base_url.trim_end_matches('/'), env.webhook_suffix())
}

/// 请求发往哪里
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisTarget {
    /// 固定接口路径（拼在 webhook 根地址后面）
    Endpoint(String),
    /// 后端给出的一次性 resumeUrl
    Resume(String),
}

impl AnalysisTarget {
    pub fn describe(&self) -> &str {
        match self {
            AnalysisTarget::Endpoint(path) => path,
            AnalysisTarget::Resume(url) => url,
        }
    }
}

/// 同一练习内的请求通道
///
/// 收到 resumeUrl 后，下一次请求改发到该地址；用过即失效，
/// 除非新的回复里又带了一个。
#[derive(Debug, Clone, Default)]
pub struct ExerciseChannel {
    pending_resume: Option<String>,
}

impl ExerciseChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_pending_resume(&self) -> bool {
        self.pending_resume.is_some()
    }

    /// 取出下一次请求的目标
    pub fn next_target(&mut self, endpoint: &str) -> AnalysisTarget {
        match self.pending_resume.take() {
            Some(url) => AnalysisTarget::Resume(url),
            None => AnalysisTarget::Endpoint(endpoint.to_string()),
        }
    }

    /// 记录回复里的 resumeUrl
    pub fn accept(&mut self, reply: &AnalysisReply) {
        if let Some(url) = &reply.resume_url {
            self.pending_resume = Some(url.clone());
        }
    }
}

/// 请求体
#[derive(Debug, Clone)]
pub enum AnalysisRequest {
    Json(Value),
    Multipart {
        fields: Vec<(String, String)>,
        audio: Option<RecordedAudio>,
    },
}

/// 流程依赖的远程分析能力
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn analyze(
        &self,
        target: &AnalysisTarget,
        request: AnalysisRequest,
        cancel: &CancellationToken,
    ) -> AppResult<AnalysisReply>;

    /// 文字转语音
    async fn generate_voice(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> AppResult<ReplyAudio>;
}

/// Webhook 客户端
pub struct WebhookClient {
    http: Client,
    api_base: String,
    timeout: Duration,
}

impl WebhookClient {
    /// 创建新的 webhook 客户端
    pub fn new(config: &Config, env: ApiEnv) -> AppResult<Self> {
        let timeout = config.request_timeout();
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_base: get_api_base(&config.n8n_base_url, env),
            timeout,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// 目标的完整 URL
    pub fn resolve(&self, target: &AnalysisTarget) -> String {
        match target {
            AnalysisTarget::Endpoint(path) => {
                format!("{}/{}", self.api_base, path.trim_start_matches('/'))
            }
            AnalysisTarget::Resume(url) => url.clone(),
        }
    }

    fn build_request(&self, url: &str, request: AnalysisRequest) -> AppResult<RequestBuilder> {
        let builder = self.http.post(url);
        Ok(match request {
            AnalysisRequest::Json(body) => builder.json(&body),
            AnalysisRequest::Multipart { fields, audio } => {
                let mut form = Form::new();
                for (k, v) in fields {
                    form = form.text(k, v);
                }
                if let Some(audio) = audio {
                    form = form.text("mimeType", audio.mime_type.clone());
                    let file_name = audio.file_name();
                    let part = Part::bytes(audio.bytes)
                        .file_name(file_name)
                        .mime_str(&audio.mime_type)?;
                    form = form.part("ses", part);
                }
                builder.multipart(form)
            }
        })
    }

    async fn send(&self, url: &str, request: AnalysisRequest) -> AppResult<Value> {
        let resp = self
            .build_request(url, request)?
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Api(ApiError::Timeout {
                        endpoint: url.to_string(),
                        secs: self.timeout.as_secs(),
                    })
                } else {
                    AppError::api_request_failed(url, e)
                }
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| AppError::api_request_failed(url, e))?;

        if !status.is_success() {
            warn!("⚠️ Webhook 返回 {}: {}", status, truncate_text(&body, 200));
            return Err(ApiError::BadResponse {
                endpoint: url.to_string(),
                status: status.as_u16(),
                body: Some(truncate_text(&body, 500)),
            }
            .into());
        }

        if body.trim().is_empty() {
            return Err(ApiError::EmptyResponse {
                endpoint: url.to_string(),
            }
            .into());
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// 发送请求，并在取消时立刻放弃
    async fn send_cancellable(
        &self,
        url: &str,
        request: AnalysisRequest,
        cancel: &CancellationToken,
    ) -> AppResult<Value> {
        tokio::select! {
            result = self.send(url, request) => result,
            _ = cancel.cancelled() => {
                debug!("请求已取消: {}", url);
                Err(AppError::Cancelled)
            }
        }
    }
}

#[async_trait]
impl AnalysisBackend for WebhookClient {
    async fn analyze(
        &self,
        target: &AnalysisTarget,
        request: AnalysisRequest,
        cancel: &CancellationToken,
    ) -> AppResult<AnalysisReply> {
        let url = self.resolve(target);
        info!("📡 请求分析: {}", target.describe());

        let body = self.send_cancellable(&url, request, cancel).await?;
        let reply = AnalysisReply::from_json(&url, &body)?;

        debug!(
            "分析回复: narration={:?}, audio={}, resume={}",
            reply.narration.as_deref().map(|t| truncate_text(t, 60)),
            reply.audio.is_some(),
            reply.resume_url.is_some()
        );
        Ok(reply)
    }

    async fn generate_voice(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> AppResult<ReplyAudio> {
        let target = AnalysisTarget::Endpoint(Endpoint::VoiceGenerator.path());
        let url = self.resolve(&target);
        debug!("🔊 生成语音: {}", truncate_text(text, 40));

        let body = self
            .send_cancellable(&url, AnalysisRequest::Json(json!({ "text": text })), cancel)
            .await?;
        AnalysisReply::from_json(&url, &body)?
            .audio
            .ok_or_else(|| ApiError::EmptyResponse { endpoint: url }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_base_follows_env() {
        let test = get_api_base("https://n8n.example.com/", ApiEnv::Test);
        assert_eq!(test, "https://n8n.example.com/webhook-test");

        let product = get_api_base("https://n8n.example.com", ApiEnv::Product);
        assert!(product.ends_with("/webhook"));
        assert!(!product.contains("/webhook-test"));
    }

    #[test]
    fn resume_url_is_used_once() {
        let mut channel = ExerciseChannel::new();
        assert_eq!(
            channel.next_target("/dost/level2/step1"),
            AnalysisTarget::Endpoint("/dost/level2/step1".into())
        );

        channel.accept(&AnalysisReply {
            resume_url: Some("https://n8n.example.com/webhook-waiting/7".into()),
            ..Default::default()
        });
        assert!(channel.has_pending_resume());
        assert_eq!(
            channel.next_target("/dost/level2/step1"),
            AnalysisTarget::Resume("https://n8n.example.com/webhook-waiting/7".into())
        );
        assert!(!channel.has_pending_resume());

        // 没有新的 resumeUrl 时回到固定接口
        channel.accept(&AnalysisReply::fallback("tamam"));
        assert!(matches!(
            channel.next_target("/dost/level2/step1"),
            AnalysisTarget::Endpoint(_)
        ));
    }

    #[test]
    fn resolve_joins_paths_and_passes_resume_through() {
        let mut config = Config::default();
        config.n8n_base_url = "https://n8n.example.com".into();
        let client = WebhookClient::new(&config, ApiEnv::Product).unwrap();
        assert_eq!(
            client.resolve(&AnalysisTarget::Endpoint(Endpoint::Level1Step(3).path())),
            "https://n8n.example.com/webhook/dost/level1/step3"
        );
        assert_eq!(
            client.resolve(&AnalysisTarget::Resume("https://x/resume/1".into())),
            "https://x/resume/1"
        );
    }

    #[test]
    fn zero_timeout_is_raised_to_one_second() {
        let config = Config {
            request_timeout_secs: 0,
            ..Config::default()
        };
        let client = WebhookClient::new(&config, ApiEnv::Test).unwrap();
        assert_eq!(client.timeout, Duration::from_secs(1));
    }

    #[test]
    fn multipart_request_carries_recording_mime() {
        let client = WebhookClient::new(&Config::default(), ApiEnv::Test).unwrap();
        let request = AnalysisRequest::Multipart {
            fields: vec![("stepKey".into(), "paragraph1".into())],
            audio: Some(RecordedAudio {
                bytes: vec![1, 2, 3],
                mime_type: "audio/ogg;codecs=opus".into(),
                duration: Duration::from_secs(3),
            }),
        };
        let built = client
            .build_request("http://localhost/dost/level3/step1", request)
            .unwrap()
            .build()
            .unwrap();
        let content_type = built
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert!(content_type.starts_with("multipart/form-data"));

        let json = client
            .build_request("http://localhost/dost/level1", AnalysisRequest::Json(serde_json::json!({"ses": "AQID"})))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            json.body().and_then(|b| b.as_bytes()),
            Some(br#"{"ses":"AQID"}"#.as_slice())
        );
    }
}
