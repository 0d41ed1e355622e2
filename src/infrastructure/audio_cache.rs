//! 生成语音的磁盘缓存，按 (故事, 等级, 单元) 存放

use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::models::ReplyAudio;

#[derive(Debug, Clone)]
pub struct AudioCache {
    dir: PathBuf,
}

impl AudioCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, story_id: i64, level: u8, unit_key: &str) -> PathBuf {
        let safe_key: String = unit_key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir
            .join(format!("story{}_level{}_{}.json", story_id, level, safe_key))
    }

    /// 读不到或内容损坏时返回 None
    pub async fn get(&self, story_id: i64, level: u8, unit_key: &str) -> Option<ReplyAudio> {
        let path = self.entry_path(story_id, level, unit_key);
        let content = fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str(&content) {
            Ok(audio) => {
                debug!("命中语音缓存: {}", path.display());
                Some(audio)
            }
            Err(e) => {
                warn!("⚠️ 语音缓存损坏 ({}): {}", path.display(), e);
                None
            }
        }
    }

    pub async fn put(
        &self,
        story_id: i64,
        level: u8,
        unit_key: &str,
        audio: &ReplyAudio,
    ) -> AppResult<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::file_write_failed(self.dir.display().to_string(), e))?;
        let path = self.entry_path(story_id, level, unit_key);
        let json = serde_json::to_string(audio)
            .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;
        fs::write(&path, json)
            .await
            .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))
    }

    /// 清空缓存目录
    pub async fn clear(&self) -> AppResult<()> {
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::file_write_failed(self.dir.display().to_string(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AudioCache::new(dir.path().join("cache"));
        let audio = ReplyAudio {
            data: "SUQz".into(),
            mime: "audio/mpeg".into(),
        };

        assert!(cache.get(1, 2, "step1").await.is_none());
        cache.put(1, 2, "step1", &audio).await.unwrap();
        assert_eq!(cache.get(1, 2, "step1").await, Some(audio));
        assert!(cache.get(1, 3, "step1").await.is_none());

        cache.clear().await.unwrap();
        assert!(cache.get(1, 2, "step1").await.is_none());
        cache.clear().await.unwrap();
    }

    #[tokio::test]
    async fn put_into_unwritable_dir_is_a_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("cache");
        std::fs::write(&blocked, b"not a dir").unwrap();
        let cache = AudioCache::new(&blocked);
        let audio = ReplyAudio {
            data: "SUQz".into(),
            mime: "audio/mpeg".into(),
        };
        let err = cache.put(1, 1, "step1", &audio).await.unwrap_err();
        assert!(matches!(err, AppError::File(_)));
    }
}
