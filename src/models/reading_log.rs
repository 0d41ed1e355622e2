//! 计时朗读记录

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingLog {
    pub student_id: i64,
    pub story_id: i64,
    pub level: u8,
    pub wpm: f64,
    pub correct_words: u32,
    pub total_words: u32,
    pub duration_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl ReadingLog {
    /// 0..=100，total 为 0 时返回 0
    pub fn accuracy(&self) -> f64 {
        if self.total_words == 0 {
            0.0
        } else {
            f64::from(self.correct_words) * 100.0 / f64::from(self.total_words)
        }
    }
}

fn word_regex() -> &'static Regex {
    static WORDS: OnceLock<Regex> = OnceLock::new();
    WORDS.get_or_init(|| Regex::new(r"[\p{L}\p{N}']+").expect("word regex"))
}

/// 按字母/数字切词并转小写
pub fn tokenize(text: &str) -> Vec<String> {
    word_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// 单次朗读的统计
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttemptScore {
    pub wpm: f64,
    pub correct_words: u32,
    pub total_words: u32,
}

/// 计算朗读成绩
///
/// # 参数
/// - `reference`: 单元原文
/// - `transcript`: 后端识别出的文字；没有时视为全部读对
/// - `elapsed`: 录音时长
pub fn score_attempt(reference: &str, transcript: Option<&str>, elapsed: Duration) -> AttemptScore {
    let expected = tokenize(reference);
    let total_words = expected.len() as u32;

    let (spoken, correct_words) = match transcript {
        Some(t) => {
            let spoken = tokenize(t);
            let mut pool: HashMap<&str, u32> = HashMap::new();
            for w in &spoken {
                *pool.entry(w.as_str()).or_default() += 1;
            }
            let mut correct = 0u32;
            for w in &expected {
                if let Some(n) = pool.get_mut(w.as_str()) {
                    if *n > 0 {
                        *n -= 1;
                        correct += 1;
                    }
                }
            }
            (spoken.len() as u32, correct)
        }
        None => (total_words, total_words),
    };

    let minutes = elapsed.as_secs_f64() / 60.0;
    let wpm = if minutes > 0.0 {
        (f64::from(spoken) / minutes * 10.0).round() / 10.0
    } else {
        0.0
    };

    AttemptScore {
        wpm,
        correct_words,
        total_words,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_handles_turkish_letters() {
        assert_eq!(
            tokenize("Küçük kedi, ağaca çıktı!"),
            vec!["küçük", "kedi", "ağaca", "çıktı"]
        );
    }

    #[test]
    fn score_counts_matched_words_once() {
        let s = score_attempt(
            "kedi kedi süt içti",
            Some("kedi süt süt içti"),
            Duration::from_secs(30),
        );
        assert_eq!(s.total_words, 4);
        assert_eq!(s.correct_words, 3);
        assert_eq!(s.wpm, 8.0);
    }

    #[test]
    fn missing_transcript_assumes_full_read() {
        let s = score_attempt("bir iki üç", None, Duration::from_secs(0));
        assert_eq!((s.correct_words, s.total_words), (3, 3));
        assert_eq!(s.wpm, 0.0);
    }
}
