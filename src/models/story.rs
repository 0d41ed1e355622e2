//! 故事目录与等级参考数据

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub locked: bool,
}

impl Story {
    /// 未设置图片时按约定使用 `/images/story{id}.png`
    pub fn image_path(&self) -> String {
        self.image
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("/images/story{}.png", self.id))
    }
}

/// 新建 / 编辑故事时提交的字段
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryDraft {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub locked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelInfo {
    pub id: i64,
    pub level_number: u8,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelStep {
    pub id: i64,
    pub level_id: i64,
    pub step_number: u32,
    pub title: String,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_path_falls_back_to_convention() {
        let mut story = Story {
            id: 4,
            title: "Kırmızı Başlıklı Kız".into(),
            description: None,
            image: None,
            locked: false,
        };
        assert_eq!(story.image_path(), "/images/story4.png");
        story.image = Some("/images/custom.png".into());
        assert_eq!(story.image_path(), "/images/custom.png");
    }
}
