//! Webhook 返回结果的类型化视图
//!
//! 工作流后端的返回结构并不固定：旁白文字可能放在 `text`、`message`、
//! `response`、`imageExplanation` 等任意一个键里，有时还会包成单元素数组。
//! 这里统一解析成 [`AnalysisReply`]，解析不出任何内容时返回错误。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

/// 旁白文字可能使用的键，按优先级排列
const NARRATION_KEYS: [&str; 6] = [
    "text",
    "message",
    "response",
    "imageExplanation",
    "output",
    "feedback",
];

/// TTS 默认格式
pub const DEFAULT_REPLY_MIME: &str = "audio/mpeg";

/// base64 编码的回复音频
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyAudio {
    pub data: String,
    pub mime: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReply {
    pub narration: Option<String>,
    pub audio: Option<ReplyAudio>,
    pub resume_url: Option<String>,
    /// 后端识别出的朗读文字（计时朗读时使用）
    pub transcript: Option<String>,
}

impl AnalysisReply {
    /// 本地兜底回复（只有文字）
    pub fn fallback(text: impl Into<String>) -> Self {
        Self {
            narration: Some(text.into()),
            ..Default::default()
        }
    }

    /// 解析 webhook 返回的 JSON
    ///
    /// # 参数
    /// - `endpoint`: 仅用于错误信息
    /// - `value`: 返回体
    pub fn from_json(endpoint: &str, value: &Value) -> Result<Self, ApiError> {
        let obj = match value {
            Value::Array(items) => items.first(),
            other => Some(other),
        }
        .and_then(Value::as_object)
        .ok_or_else(|| ApiError::EmptyResponse {
            endpoint: endpoint.to_string(),
        })?;

        let non_empty_str = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let narration = NARRATION_KEYS.iter().find_map(|k| non_empty_str(k));

        let audio = non_empty_str("audioBase64").map(|data| ReplyAudio {
            data,
            mime: non_empty_str("mimeType").unwrap_or_else(|| DEFAULT_REPLY_MIME.to_string()),
        });

        let resume_url = match non_empty_str("resumeUrl") {
            Some(url) => {
                reqwest::Url::parse(&url).map_err(|_| ApiError::InvalidResumeUrl { url: url.clone() })?;
                Some(url)
            }
            None => None,
        };

        let transcript = non_empty_str("transcript");

        if narration.is_none() && audio.is_none() && resume_url.is_none() {
            return Err(ApiError::EmptyResponse {
                endpoint: endpoint.to_string(),
            });
        }

        Ok(Self {
            narration,
            audio,
            resume_url,
            transcript,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn narration_key_priority() {
        let reply = AnalysisReply::from_json(
            "/dost/level1",
            &json!({"message": "ikinci", "text": "birinci"}),
        )
        .unwrap();
        assert_eq!(reply.narration.as_deref(), Some("birinci"));

        let reply =
            AnalysisReply::from_json("/dost/level1", &json!({"imageExplanation": "resimde bir kedi var"}))
                .unwrap();
        assert_eq!(reply.narration.as_deref(), Some("resimde bir kedi var"));
    }

    #[test]
    fn array_wrapped_reply_with_audio_and_resume() {
        let reply = AnalysisReply::from_json(
            "/dost/level2/step1",
            &json!([{
                "response": "Aferin!",
                "audioBase64": "SUQz",
                "resumeUrl": "https://n8n.example.com/webhook-waiting/abc"
            }]),
        )
        .unwrap();
        assert_eq!(reply.audio.unwrap().mime, DEFAULT_REPLY_MIME);
        assert_eq!(
            reply.resume_url.as_deref(),
            Some("https://n8n.example.com/webhook-waiting/abc")
        );
    }

    #[test]
    fn empty_or_blank_reply_is_an_error() {
        assert!(matches!(
            AnalysisReply::from_json("/x", &json!({"text": "   "})),
            Err(ApiError::EmptyResponse { .. })
        ));
        assert!(AnalysisReply::from_json("/x", &json!([])).is_err());
        assert!(AnalysisReply::from_json("/x", &json!("plain string")).is_err());
    }

    #[test]
    fn bad_resume_url_is_rejected() {
        assert!(matches!(
            AnalysisReply::from_json("/x", &json!({"text": "ok", "resumeUrl": "not a url"})),
            Err(ApiError::InvalidResumeUrl { .. })
        ));
    }
}
