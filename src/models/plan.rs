//! 等级计划（声明式配置表）
//!
//! 每个等级都是同一个流程：播放旁白 → （可选）远程分析 → 播放回复 →
//! 录音 → 发送录音 → 播放回复 → 下一个单元。不同等级之间只差在
//! 单元列表、接口路径、请求体格式和音频目录，这些都放在 [`LevelPlan`] 里。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::clients::webhook_client::Endpoint;
use crate::error::BusinessError;

/// 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Step,
    Paragraph,
    SchemaSection,
    Question,
}

/// 请求体格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadShape {
    #[default]
    Json,
    Multipart,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitPlan {
    pub kind: UnitKind,
    pub key: String,
    /// 旁白文件名（相对 `audio_dir`）
    #[serde(default)]
    pub narration: Option<String>,
    /// 单元文字；为空时由数据库中的 level_steps.content 补齐
    #[serde(default)]
    pub text: Option<String>,
    /// 录音前先请求一次分析（例如看图说话的图片讲解）
    #[serde(default)]
    pub analyze_first: bool,
    #[serde(default = "default_true")]
    pub record: bool,
    /// 计时朗读，完成后写 reading_logs
    #[serde(default)]
    pub timed_reading: bool,
    /// 覆盖等级的接口路径
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub record_secs: Option<u64>,
}

impl UnitPlan {
    fn new(kind: UnitKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            narration: None,
            text: None,
            analyze_first: false,
            record: true,
            timed_reading: false,
            endpoint: None,
            record_secs: None,
        }
    }

    fn narrated(mut self, file: impl Into<String>) -> Self {
        self.narration = Some(file.into());
        self
    }

    fn analyze_first(mut self) -> Self {
        self.analyze_first = true;
        self
    }

    fn timed(mut self) -> Self {
        self.timed_reading = true;
        self
    }

    fn at(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelPlan {
    pub level: u8,
    pub title: String,
    /// 单元分析接口
    pub endpoint: String,
    /// 发送录音的接口；为空时与 `endpoint` 相同
    #[serde(default)]
    pub voice_endpoint: Option<String>,
    #[serde(default)]
    pub payload: PayloadShape,
    /// 旁白目录，例如 `/audios/level1`
    pub audio_dir: String,
    /// 覆盖偏好里的录音时长；内置计划不设置
    #[serde(default)]
    pub record_secs: Option<u64>,
    /// 旁白结束后自动开始录音
    #[serde(default)]
    pub auto_arm: bool,
    pub units: Vec<UnitPlan>,
}

impl LevelPlan {
    /// 单元旁白的资源路径
    pub fn narration_path(&self, unit: &UnitPlan) -> Option<String> {
        unit.narration.as_ref().map(|file| {
            format!("{}/{}", self.audio_dir.trim_end_matches('/'), file)
        })
    }

    /// 单元分析时使用的接口
    pub fn analysis_endpoint<'a>(&'a self, unit: &'a UnitPlan) -> &'a str {
        unit.endpoint.as_deref().unwrap_or(&self.endpoint)
    }

    /// 录音发送时使用的接口（没有 resumeUrl 时）
    pub fn voice_endpoint<'a>(&'a self, unit: &'a UnitPlan) -> &'a str {
        self.voice_endpoint
            .as_deref()
            .or(unit.endpoint.as_deref())
            .unwrap_or(&self.endpoint)
    }

    pub fn validate(&self) -> Result<(), BusinessError> {
        crate::models::progress::validate_level(self.level)?;
        if self.units.is_empty() {
            return Err(BusinessError::EmptyPlan { level: self.level });
        }
        Ok(())
    }
}

/// 等级号 → 计划
#[derive(Debug, Clone, Default)]
pub struct PlanTable {
    plans: BTreeMap<u8, LevelPlan>,
}

impl PlanTable {
    pub fn builtin() -> Self {
        let mut table = Self::default();
        for plan in builtin_plans() {
            table.plans.insert(plan.level, plan);
        }
        table
    }

    /// 用外部计划覆盖同号等级
    pub fn with_overrides(mut self, overrides: Vec<LevelPlan>) -> Self {
        for plan in overrides {
            self.plans.insert(plan.level, plan);
        }
        self
    }

    pub fn get(&self, level: u8) -> Result<&LevelPlan, BusinessError> {
        self.plans
            .get(&level)
            .ok_or(BusinessError::PlanNotFound { level })
    }

    pub fn levels(&self) -> impl Iterator<Item = u8> + '_ {
        self.plans.keys().copied()
    }
}

/// 内置的五个等级
pub fn builtin_plans() -> Vec<LevelPlan> {
    vec![
        LevelPlan {
            level: 1,
            title: "Ön Okuma".to_string(),
            endpoint: Endpoint::Level1.path(),
            voice_endpoint: Some(Endpoint::Level1ChildrenVoice.path()),
            payload: PayloadShape::Json,
            audio_dir: "/audios/level1".to_string(),
            record_secs: None,
            auto_arm: false,
            units: vec![
                UnitPlan::new(UnitKind::Step, "step1")
                    .narrated("step1.mp3")
                    .analyze_first()
                    .at(&Endpoint::Level1Step(1).path()),
                UnitPlan::new(UnitKind::Step, "step2")
                    .narrated("step2.mp3")
                    .at(&Endpoint::Level1Step(2).path()),
                UnitPlan::new(UnitKind::Step, "step3")
                    .narrated("step3.mp3")
                    .at(&Endpoint::Level1Step(3).path()),
                UnitPlan::new(UnitKind::Step, "step4")
                    .narrated("step4.mp3")
                    .at(&Endpoint::Level1Step(4).path()),
            ],
        },
        LevelPlan {
            level: 2,
            title: "Okuma ve Anlama".to_string(),
            endpoint: Endpoint::Level2Step1.path(),
            voice_endpoint: None,
            payload: PayloadShape::Multipart,
            audio_dir: "/audios/level2".to_string(),
            record_secs: None,
            auto_arm: true,
            units: (1..=4)
                .map(|n| {
                    let unit = UnitPlan::new(UnitKind::Paragraph, format!("step{}", n))
                        .narrated(format!("step{}.mp3", n));
                    if n == 1 {
                        unit.timed()
                    } else {
                        unit
                    }
                })
                .collect(),
        },
        LevelPlan {
            level: 3,
            title: "Paragraf Okuma".to_string(),
            endpoint: Endpoint::Level3Step1.path(),
            voice_endpoint: None,
            payload: PayloadShape::Multipart,
            audio_dir: "/audios/level3".to_string(),
            record_secs: None,
            auto_arm: true,
            units: (1..=4)
                .map(|n| {
                    UnitPlan::new(UnitKind::Paragraph, format!("paragraph{}", n))
                        .narrated(format!("paragraph{}.mp3", n))
                        .timed()
                })
                .collect(),
        },
        LevelPlan {
            level: 4,
            title: "Şema ve Özet".to_string(),
            endpoint: Endpoint::Level4Step1.path(),
            voice_endpoint: None,
            payload: PayloadShape::Multipart,
            audio_dir: "/audios/level4".to_string(),
            record_secs: None,
            auto_arm: true,
            units: vec![
                UnitPlan::new(UnitKind::SchemaSection, "schema")
                    .narrated("step1.mp3")
                    .analyze_first(),
                UnitPlan::new(UnitKind::SchemaSection, "summary")
                    .narrated("step2.mp3")
                    .at(&Endpoint::Level4Step2.path()),
            ],
        },
        LevelPlan {
            level: 5,
            title: "Sorular".to_string(),
            endpoint: Endpoint::Level5Step(1).path(),
            voice_endpoint: None,
            payload: PayloadShape::Json,
            audio_dir: "/audios/level5".to_string(),
            record_secs: None,
            auto_arm: true,
            units: vec![
                UnitPlan::new(UnitKind::Question, "question1").narrated("step1.mp3"),
                UnitPlan::new(UnitKind::Question, "question2")
                    .narrated("step2.mp3")
                    .at(&Endpoint::Level5Step(2).path()),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_covers_all_levels_with_expected_unit_counts() {
        let table = PlanTable::builtin();
        let counts: Vec<(u8, usize)> = table
            .levels()
            .map(|l| (l, table.get(l).unwrap().units.len()))
            .collect();
        assert_eq!(counts, vec![(1, 4), (2, 4), (3, 4), (4, 2), (5, 2)]);
        for level in table.levels() {
            table.get(level).unwrap().validate().unwrap();
        }
    }

    #[test]
    fn builtin_levels_leave_recording_length_to_prefs() {
        let table = PlanTable::builtin();
        for level in table.levels() {
            let plan = table.get(level).unwrap();
            assert_eq!(plan.record_secs, None, "level {}", level);
            assert!(plan.units.iter().all(|u| u.record_secs.is_none()));
        }
    }

    #[test]
    fn endpoint_resolution_prefers_unit_override() {
        let table = PlanTable::builtin();
        let level1 = table.get(1).unwrap();
        let step2 = &level1.units[1];
        assert_eq!(level1.analysis_endpoint(step2), "/dost/level1/step2");
        assert_eq!(
            level1.narration_path(step2).as_deref(),
            Some("/audios/level1/step2.mp3")
        );

        let level2 = table.get(2).unwrap();
        assert_eq!(level2.voice_endpoint(&level2.units[0]), "/dost/level2/step1");
        assert_eq!(level1.voice_endpoint(step2), "/dost/level1/children-voice");
    }

    #[test]
    fn overrides_replace_whole_level() {
        let mut custom = builtin_plans().remove(4);
        custom.title = "Quiz".into();
        custom.units.truncate(1);
        let table = PlanTable::builtin().with_overrides(vec![custom]);
        assert_eq!(table.get(5).unwrap().units.len(), 1);
        assert!(table.get(6).is_err());
    }
}
