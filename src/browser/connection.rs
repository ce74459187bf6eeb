use chromiumoxide::{Browser, Handler};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::error::BrowserError;

/// 连接到已在运行的浏览器（需以 --remote-debugging-port 启动）
///
/// 返回浏览器句柄和后台事件处理任务
pub async fn connect_to_browser(port: u16) -> Result<(Browser, JoinHandle<()>), BrowserError> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);

    let (browser, handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        BrowserError::connection_failed(port, e)
    })?;
    debug!("浏览器连接成功");

    let handler_task = spawn_event_loop(handler).await;
    Ok((browser, handler_task))
}

/// 在后台处理浏览器事件，返回任务句柄（会话结束时 abort）
pub(crate) async fn spawn_event_loop(mut handler: Handler) -> JoinHandle<()> {
    let task = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;
    task
}
