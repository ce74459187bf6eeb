use std::path::Path;

use chromiumoxide::{Browser, BrowserConfig};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::connection::spawn_event_loop;
use crate::config::Config;
use crate::error::BrowserError;

/// 启动一个独立的浏览器进程
///
/// `profile_dir` 为本次会话专用的用户目录，会话之间不共享 cookie / 缓存。
pub async fn launch_browser(
    config: &Config,
    profile_dir: &Path,
) -> Result<(Browser, JoinHandle<()>), BrowserError> {
    info!("🚀 启动浏览器 (headless: {})...", config.headless);
    debug!("用户目录: {}", profile_dir.display());

    let mut builder = BrowserConfig::builder()
        .user_data_dir(profile_dir)
        .window_size(config.window_width, config.window_height)
        .args(vec![
            "--disable-gpu",           // 无头模式下禁用 GPU
            "--no-sandbox",            // 容器内运行时避免权限问题
            "--disable-dev-shm-usage", // 防止共享内存不足
        ]);

    builder = if config.headless {
        builder.new_headless_mode()
    } else {
        builder.with_head()
    };

    if let Some(executable) = config.chrome_executable.as_deref() {
        builder = builder.chrome_executable(Path::new(executable));
    }

    let browser_config = builder.build().map_err(|reason| {
        error!("配置浏览器失败: {}", reason);
        BrowserError::ConfigurationFailed { reason }
    })?;

    let (browser, handler) = Browser::launch(browser_config).await.map_err(|e| {
        error!("启动浏览器失败: {}", e);
        BrowserError::launch_failed(e)
    })?;
    debug!("浏览器启动成功");

    let handler_task = spawn_event_loop(handler).await;
    Ok((browser, handler_task))
}
