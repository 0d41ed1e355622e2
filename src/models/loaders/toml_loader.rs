use crate::error::FileError;
use crate::models::plan::{LevelPlan, PlanTable};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 从 TOML 文件加载单个等级计划
pub async fn load_level_plan(toml_file_path: &Path) -> Result<LevelPlan> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let plan: LevelPlan = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    plan.validate()
        .with_context(|| format!("等级计划无效: {}", toml_file_path.display()))?;

    Ok(plan)
}

/// 从文件夹中加载所有等级计划
///
/// 无法解析的文件会被跳过并记录警告
pub async fn load_all_plan_files(folder_path: &str) -> Result<Vec<LevelPlan>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        return Err(FileError::DirectoryNotFound {
            path: folder_path.to_string(),
        }
        .into());
    }

    let mut toml_files = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml_files.push(path);
        }
    }

    // 同号等级以文件名排序靠后的为准
    toml_files.sort();

    let mut plans = Vec::new();
    for path in toml_files {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_level_plan(&path).await {
            Ok(plan) => {
                tracing::info!("等级 {} 计划加载成功，{} 个单元", plan.level, plan.units.len());
                plans.push(plan);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {:#}", path.display(), e);
            }
        }
    }

    Ok(plans)
}

/// 内置计划 + 文件夹中的覆盖
///
/// 文件夹不存在时只使用内置计划
pub async fn load_plan_table(folder_path: &str) -> PlanTable {
    match load_all_plan_files(folder_path).await {
        Ok(overrides) => PlanTable::builtin().with_overrides(overrides),
        Err(e) => {
            tracing::debug!("未加载外部等级计划 ({}), 使用内置计划", e);
            PlanTable::builtin()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEVEL5: &str = r#"
level = 5
title = "Sınav"
endpoint = "/dost/level5/quiz"
audio_dir = "/audios/level5"
auto_arm = true

[[units]]
kind = "question"
key = "q1"
narration = "q1.mp3"
text = "Kedi neden ağaca çıktı?"
"#;

    #[tokio::test]
    async fn folder_overrides_builtin_level_and_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("level5.toml"), LEVEL5).unwrap();
        std::fs::write(dir.path().join("broken.toml"), "level = \"x\"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let table = load_plan_table(dir.path().to_str().unwrap()).await;
        let level5 = table.get(5).unwrap();
        assert_eq!(level5.endpoint, "/dost/level5/quiz");
        assert_eq!(level5.units.len(), 1);
        assert!(level5.units[0].record);
        assert_eq!(table.get(1).unwrap().units.len(), 4);
    }

    #[tokio::test]
    async fn missing_folder_falls_back_to_builtin() {
        let table = load_plan_table("/definitely/not/here").await;
        assert_eq!(table.levels().count(), 5);
    }
}
