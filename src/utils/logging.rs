/// 日志工具模块
///
/// 提供日志初始化以及学习会话相关的输出辅助函数
use anyhow::Result;
use std::fs;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化 tracing
///
/// `RUST_LOG` 优先；否则 verbose 时为 debug，默认 info
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // 测试中可能被重复调用，忽略重复初始化
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\nDOST 学习会话日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
///
/// # 参数
/// - `api_base`: 当前使用的 webhook 地址
/// - `student_id`: 学生ID
/// - `story_id`: 故事ID
pub fn log_startup(api_base: &str, student_id: i64, story_id: i64) {
    info!("{}", "=".repeat(60));
    info!("🚀 DOST 启动 - 学习模式");
    info!("🌐 Webhook: {}", api_base);
    info!("👦 学生: {} | 📖 故事: {}", student_id, story_id);
    info!("{}", "=".repeat(60));
}

/// 记录等级开始
pub fn log_level_start(level: u8, title: &str, unit_count: usize, start_at: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始等级 {}: {}", level, title);
    info!("📄 共 {} 个单元，从第 {} 个开始", unit_count, start_at);
    info!("{}", "=".repeat(60));
}

/// 记录单元开始
pub fn log_unit_start(level: u8, unit_index: usize, total: usize, key: &str) {
    info!("\n[等级 {}] {}", level, "─".repeat(30));
    info!("[等级 {}] 处理第 {}/{} 个单元 ({})", level, unit_index, total, key);
}

/// 记录等级完成
///
/// # 参数
/// - `level`: 等级
/// - `completed`: 完成的单元数
/// - `degraded`: 使用兜底文案的单元数
/// - `total`: 单元总数
pub fn log_level_complete(level: u8, completed: usize, degraded: usize, total: usize) {
    info!("\n{}", "─".repeat(60));
    info!(
        "✓ 等级 {} 结束: 完成 {}/{} (兜底 {})",
        level, completed, total, degraded
    );
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(levels_run: usize, points: u32, story_completed: bool, log_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 学习会话结束");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("📚 本次完成等级数: {}", levels_run);
    info!("⭐ 本次获得积分: {}", points);
    if story_completed {
        info!("🏆 故事已全部完成");
    }
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_counts_chars_not_bytes() {
        assert_eq!(truncate_text("Merhaba çocuk", 7), "Merhaba...");
        assert_eq!(truncate_text("kısa", 10), "kısa");
    }
}
