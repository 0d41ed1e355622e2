//! 徽章目录与颁发记录

use serde::{Deserialize, Serialize};

/// 徽章判定依据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeCriteria {
    Wpm,
    Accuracy,
    Points,
    Level,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Badge {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub criteria_type: BadgeCriteria,
    pub criteria_value: f64,
}

impl Badge {
    /// 指标达到阈值（含等于）即满足
    pub fn is_earned_by(&self, metrics: &ReadingMetrics) -> bool {
        let value = match self.criteria_type {
            BadgeCriteria::Wpm => metrics.wpm,
            BadgeCriteria::Accuracy => metrics.accuracy,
            BadgeCriteria::Points => f64::from(metrics.points),
            BadgeCriteria::Level => f64::from(metrics.level),
        };
        value >= self.criteria_value
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentBadge {
    #[serde(default)]
    pub id: Option<i64>,
    pub student_id: i64,
    pub badge_id: i64,
    pub story_id: i64,
    #[serde(default)]
    pub awarded_at: Option<String>,
}

/// 用于判定徽章的汇总指标
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReadingMetrics {
    pub wpm: f64,
    /// 0..=100
    pub accuracy: f64,
    pub points: u32,
    /// 已完成的最高等级
    pub level: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn badge(criteria_type: BadgeCriteria, criteria_value: f64) -> Badge {
        Badge {
            id: 1,
            name: "Hızlı Okuyucu".into(),
            description: None,
            criteria_type,
            criteria_value,
        }
    }

    #[test]
    fn thresholds_are_inclusive() {
        let m = ReadingMetrics {
            wpm: 60.0,
            accuracy: 92.5,
            points: 100,
            level: 3,
        };
        assert!(badge(BadgeCriteria::Wpm, 60.0).is_earned_by(&m));
        assert!(!badge(BadgeCriteria::Accuracy, 95.0).is_earned_by(&m));
        assert!(badge(BadgeCriteria::Points, 100.0).is_earned_by(&m));
        assert!(!badge(BadgeCriteria::Level, 4.0).is_earned_by(&m));
    }
}
