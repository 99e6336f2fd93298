// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetLocaleOverrideParams, SetTimezoneOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::layout::Point;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::settings::ScraperSettings;
use crate::engines::fingerprint::Fingerprint;
use crate::engines::traits::{BrowserAutomation, BrowserSession, EngineError};

/// DOM 就绪等待脚本，只等 DOMContentLoaded，不等网络空闲
const WAIT_FOR_DOM_READY: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
        }
    })
"#;

fn cdp(err: CdpError) -> EngineError {
    EngineError::Cdp(err.to_string())
}

struct BrowserHandle {
    browser: RwLock<Browser>,
    handler: Mutex<Option<JoinHandle<()>>>,
}

/// 基于 chromiumoxide 的浏览器自动化实现
///
/// 首次打开会话时才启动（或连接）浏览器，之后所有尝试共享同一个进程，
/// 每个会话使用独立的浏览器上下文。
pub struct ChromiumBrowser {
    headless: bool,
    remote_debugging_url: Option<String>,
    request_timeout: Duration,
    handle: OnceCell<Arc<BrowserHandle>>,
    shut_down: AtomicBool,
}

impl ChromiumBrowser {
    pub fn new(settings: &ScraperSettings) -> Self {
        Self {
            headless: settings.headless,
            remote_debugging_url: settings
                .remote_debugging_url
                .clone()
                .filter(|url| !url.is_empty()),
            request_timeout: settings.navigation_timeout(),
            handle: OnceCell::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    async fn handle(&self) -> Result<Arc<BrowserHandle>, EngineError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(EngineError::Shutdown);
        }
        self.handle
            .get_or_try_init(|| async { self.start().await.map(Arc::new) })
            .await
            .cloned()
    }

    async fn start(&self) -> Result<BrowserHandle, EngineError> {
        let (browser, mut handler) = if let Some(url) = &self.remote_debugging_url {
            info!("Connecting to remote Chrome instance at: {}", url);
            Browser::connect(url.as_str())
                .await
                .map_err(|e| EngineError::Launch(format!("connect {}: {}", url, e)))?
        } else {
            let mut builder = BrowserConfig::builder()
                .no_sandbox()
                .request_timeout(self.request_timeout)
                .arg("--disable-gpu")
                .arg("--disable-dev-shm-usage")
                .arg("--disable-blink-features=AutomationControlled");
            if !self.headless {
                builder = builder.with_head();
            }
            let config = builder.build().map_err(EngineError::Launch)?;
            info!(headless = self.headless, "Launching Chrome");
            Browser::launch(config)
                .await
                .map_err(|e| EngineError::Launch(e.to_string()))?
        };

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(BrowserHandle {
            browser: RwLock::new(browser),
            handler: Mutex::new(Some(handler_task)),
        })
    }

    async fn prepare_page(page: &Page, fingerprint: &Fingerprint) -> Result<(), EngineError> {
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
            fingerprint.init_script.clone(),
        ))
        .await
        .map_err(cdp)?;

        let mut user_agent = SetUserAgentOverrideParams::new(fingerprint.user_agent.clone());
        user_agent.accept_language = fingerprint.headers.get("Accept-Language").cloned();
        page.execute(user_agent).await.map_err(cdp)?;

        page.execute(SetDeviceMetricsOverrideParams::new(
            fingerprint.viewport.width as i64,
            fingerprint.viewport.height as i64,
            1.0,
            false,
        ))
        .await
        .map_err(cdp)?;

        page.execute(SetTimezoneOverrideParams::new(fingerprint.timezone.clone()))
            .await
            .map_err(cdp)?;

        page.execute(SetLocaleOverrideParams {
            locale: Some(fingerprint.locale.clone()),
        })
        .await
        .map_err(cdp)?;

        let headers = serde_json::to_value(&fingerprint.headers)
            .map_err(|e| EngineError::Cdp(e.to_string()))?;
        page.execute(SetExtraHttpHeadersParams::new(Headers::new(headers)))
            .await
            .map_err(cdp)?;

        Ok(())
    }
}

#[async_trait]
impl BrowserAutomation for ChromiumBrowser {
    async fn open_session(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Box<dyn BrowserSession>, EngineError> {
        let handle = self.handle().await?;

        let (context_id, page) = {
            let browser = handle.browser.read().await;
            let context_id = browser
                .execute(CreateBrowserContextParams::default())
                .await
                .map_err(cdp)?
                .result
                .browser_context_id;

            let target = CreateTargetParams::builder()
                .url("about:blank")
                .browser_context_id(context_id.clone())
                .build()
                .map_err(EngineError::Cdp)?;

            match browser.new_page(target).await {
                Ok(page) => (context_id, page),
                Err(e) => {
                    let _ = browser
                        .execute(DisposeBrowserContextParams::new(context_id))
                        .await;
                    return Err(cdp(e));
                }
            }
        };

        let session = ChromiumSession {
            browser: handle,
            context_id,
            page,
            closed: AtomicBool::new(false),
        };

        if let Err(e) = Self::prepare_page(&session.page, fingerprint).await {
            let _ = session.close().await;
            return Err(e);
        }

        Ok(Box::new(session))
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let Some(handle) = self.handle.get() else {
            return Ok(());
        };

        info!("Closing browser");
        {
            let mut browser = handle.browser.write().await;
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser cleanly: {}", e);
            }
            let _ = browser.wait().await;
        }
        if let Some(task) = handle.handler.lock().await.take() {
            task.abort();
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "chromium"
    }
}

/// 单个浏览器上下文中的页面
struct ChromiumSession {
    browser: Arc<BrowserHandle>,
    context_id: BrowserContextId,
    page: Page,
    closed: AtomicBool,
}

impl ChromiumSession {
    async fn eval<T: serde::de::DeserializeOwned>(&self, script: String) -> Result<T, EngineError> {
        self.page
            .evaluate(script)
            .await
            .map_err(cdp)?
            .into_value::<T>()
            .map_err(|e| EngineError::Cdp(e.to_string()))
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), EngineError> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(EngineError::Navigation)?;

        let navigation = async {
            self.page
                .execute(params)
                .await
                .map_err(|e| EngineError::Navigation(e.to_string()))?;
            let state: String = self.eval(WAIT_FOR_DOM_READY.to_string()).await?;
            debug!(url = %url, ready_state = %state, "DOM ready");
            Ok::<(), EngineError>(())
        };

        tokio::time::timeout(timeout, navigation)
            .await
            .map_err(|_| EngineError::Timeout(timeout))?
    }

    async fn query_selector(&self, selector: &str) -> Result<bool, EngineError> {
        let literal = serde_json::to_string(selector).map_err(|e| EngineError::Cdp(e.to_string()))?;
        self.eval(format!("document.querySelector({}) !== null", literal))
            .await
    }

    async fn title(&self) -> Result<Option<String>, EngineError> {
        self.page.get_title().await.map_err(cdp)
    }

    async fn content(&self) -> Result<String, EngineError> {
        self.page.content().await.map_err(cdp)
    }

    async fn scroll_to(&self, y: u32) -> Result<(), EngineError> {
        self.page
            .evaluate(format!("window.scrollTo(0, {})", y))
            .await
            .map_err(cdp)?;
        Ok(())
    }

    async fn move_pointer(&self, x: f64, y: f64) -> Result<(), EngineError> {
        self.page.move_mouse(Point::new(x, y)).await.map_err(cdp)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), EngineError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(e) = self.page.clone().close().await {
            debug!("Page close failed: {}", e);
        }

        let browser = self.browser.browser.read().await;
        browser
            .execute(DisposeBrowserContextParams::new(self.context_id.clone()))
            .await
            .map_err(cdp)?;
        Ok(())
    }
}
