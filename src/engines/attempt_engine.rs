// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::settings::ScraperSettings;
use crate::domain::models::product::{ItemKey, ProductSnapshot};
use crate::engines::fingerprint::Fingerprint;
use crate::engines::session_limiter::SessionLimiter;
use crate::engines::traits::{BrowserAutomation, BrowserSession, ContentExtractor, EngineError};
use crate::utils::errors::ScrapeError;
use crate::utils::retry_policy::RetryPolicy;

/// 已知的挑战页选择器
pub const BLOCK_SELECTORS: &[&str] = &[
    "form[action*='validateCaptcha']",
    "[data-testid=\"captcha\"]",
    "#captchacharacters",
];

const BLOCK_TITLE_KEYWORDS: &[&str] = &["robot check", "captcha", "service unavailable"];

const BLOCK_CONTENT_KEYWORDS: &[&str] = &[
    "enter the characters you see below",
    "type the characters you see in this image",
    "sorry, we just need to make sure you're not a robot",
    "to discuss automated access to amazon data",
];

/// 在标题和页面文本中查找挑战页关键字
///
/// # 返回值
///
/// 命中时返回描述原因的字符串
pub fn detect_block_in_text(title: Option<&str>, content: &str) -> Option<String> {
    if let Some(title) = title {
        let lowered = title.to_lowercase();
        if let Some(keyword) = BLOCK_TITLE_KEYWORDS.iter().find(|k| lowered.contains(*k)) {
            return Some(format!("challenge keyword in title: {}", keyword));
        }
    }

    let lowered = content.to_lowercase();
    BLOCK_CONTENT_KEYWORDS
        .iter()
        .find(|k| lowered.contains(*k))
        .map(|keyword| format!("challenge keyword in page: {}", keyword))
}

/// 单次尝试配置
#[derive(Debug, Clone)]
pub struct AttemptConfig {
    pub navigation_timeout: Duration,
    /// 会话级重试（被拦截或网络失败）
    pub block_retry: RetryPolicy,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
}

impl AttemptConfig {
    pub fn from_settings(settings: &ScraperSettings) -> Self {
        Self {
            navigation_timeout: settings.navigation_timeout(),
            block_retry: settings.block_retry_policy(),
            jitter_min: Duration::from_millis(settings.jitter_min_ms),
            jitter_max: Duration::from_millis(settings.jitter_max_ms.max(settings.jitter_min_ms)),
        }
    }
}

enum AttemptOutcome {
    Extracted(ProductSnapshot),
    Blocked(String),
    Failed(ScrapeError),
}

/// 会话守卫
///
/// 正常路径显式 `close`；若 future 在中途被取消，drop 时在后台关闭会话。
struct SessionGuard {
    session: Arc<dyn BrowserSession>,
    closed: bool,
}

impl SessionGuard {
    fn new(session: Box<dyn BrowserSession>) -> Self {
        Self {
            session: Arc::from(session),
            closed: false,
        }
    }

    fn session(&self) -> &dyn BrowserSession {
        self.session.as_ref()
    }

    async fn close(mut self) {
        self.closed = true;
        if let Err(e) = self.session.close().await {
            warn!("Failed to close browser session: {}", e);
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let session = self.session.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = session.close().await {
                    debug!("Background session close failed: {}", e);
                }
            });
        }
    }
}

/// 抓取尝试引擎
///
/// Init → Navigated → {Blocked, Extracted}。每次会话尝试都单独获取全局许可，
/// 退避期间不占用许可。
pub struct AttemptEngine {
    browser: Arc<dyn BrowserAutomation>,
    extractor: Arc<dyn ContentExtractor>,
    limiter: SessionLimiter,
    config: AttemptConfig,
}

impl AttemptEngine {
    pub fn new(
        browser: Arc<dyn BrowserAutomation>,
        extractor: Arc<dyn ContentExtractor>,
        limiter: SessionLimiter,
        config: AttemptConfig,
    ) -> Self {
        Self {
            browser,
            extractor,
            limiter,
            config,
        }
    }

    pub fn limiter(&self) -> &SessionLimiter {
        &self.limiter
    }

    /// 抓取一个商品页，带有限次数的会话级重试
    ///
    /// # 返回值
    ///
    /// * `Ok(ProductSnapshot)` - 提取成功
    /// * `Err(ScrapeError::TransientBlocked)` - 每次都被拦截
    /// * `Err(ScrapeError)` - 其他失败，最后一次的原因
    pub async fn scrape(&self, key: &ItemKey) -> Result<ProductSnapshot, ScrapeError> {
        let max_attempts = self.config.block_retry.max_attempts.max(1);
        let started = Instant::now();
        let mut last_error: Option<ScrapeError> = None;

        for attempt in 1..=max_attempts {
            counter!("scrape_attempts_total").increment(1);

            match self.attempt_once(key).await {
                AttemptOutcome::Extracted(snapshot) => {
                    histogram!("scrape_duration_seconds").record(started.elapsed().as_secs_f64());
                    info!(product = %key, attempt, "Page extracted");
                    return Ok(snapshot);
                }
                AttemptOutcome::Blocked(cause) => {
                    counter!("scrape_blocked_total").increment(1);
                    warn!(product = %key, attempt, max_attempts, "Blocked: {}", cause);
                    last_error = Some(ScrapeError::TransientBlocked {
                        attempts: attempt,
                        cause,
                    });
                }
                AttemptOutcome::Failed(err) if err.is_retryable() => {
                    warn!(product = %key, attempt, max_attempts, "Attempt failed: {}", err);
                    last_error = Some(err);
                }
                AttemptOutcome::Failed(err) => return Err(err),
            }

            if self.config.block_retry.should_retry(attempt) {
                let backoff = self.config.block_retry.calculate_backoff(attempt);
                debug!(product = %key, "Backing off for {:?}", backoff);
                sleep(backoff).await;
            }
        }

        Err(last_error
            .unwrap_or_else(|| ScrapeError::Transport(format!("no attempt made for {}", key))))
    }

    async fn attempt_once(&self, key: &ItemKey) -> AttemptOutcome {
        let _permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(e) => return AttemptOutcome::Failed(e.into()),
        };

        let fingerprint = Fingerprint::random_for(&key.marketplace);
        let session = match self.browser.open_session(&fingerprint).await {
            Ok(session) => SessionGuard::new(session),
            Err(e) => return AttemptOutcome::Failed(e.into()),
        };

        let outcome = self.drive(session.session(), key, &fingerprint).await;
        session.close().await;
        outcome
    }

    async fn drive(
        &self,
        session: &dyn BrowserSession,
        key: &ItemKey,
        fingerprint: &Fingerprint,
    ) -> AttemptOutcome {
        self.pre_navigation_jitter().await;

        let url = key.product_url();
        debug!(url = %url, user_agent = %fingerprint.user_agent, "Navigating");
        if let Err(e) = session.navigate(&url, self.config.navigation_timeout).await {
            return AttemptOutcome::Failed(e.into());
        }

        if let Err(e) = simulate_interaction(session, fingerprint).await {
            debug!("Interaction simulation failed: {}", e);
        }

        if let Some(cause) = detect_block(session).await {
            return AttemptOutcome::Blocked(cause);
        }

        match self.extractor.extract(session, key).await {
            Ok(snapshot) => AttemptOutcome::Extracted(snapshot),
            Err(e) => AttemptOutcome::Failed(e),
        }
    }

    async fn pre_navigation_jitter(&self) {
        let (min, max) = (self.config.jitter_min, self.config.jitter_max);
        if max.is_zero() {
            return;
        }
        let millis = rand::random_range(min.as_millis() as u64..=max.as_millis() as u64);
        sleep(Duration::from_millis(millis)).await;
    }
}

/// 随机滚动与鼠标移动
async fn simulate_interaction(
    session: &dyn BrowserSession,
    fingerprint: &Fingerprint,
) -> Result<(), EngineError> {
    let scroll_y = rand::random_range(200..=1200u32);
    session.scroll_to(scroll_y).await?;

    let x = rand::random_range(0.0..fingerprint.viewport.width as f64);
    let y = rand::random_range(0.0..fingerprint.viewport.height as f64);
    session.move_pointer(x, y).await
}

/// 挑战页检测：先查选择器，再扫描标题与正文关键字
async fn detect_block(session: &dyn BrowserSession) -> Option<String> {
    for selector in BLOCK_SELECTORS {
        if session.query_selector(selector).await.unwrap_or(false) {
            return Some(format!("challenge selector matched: {}", selector));
        }
    }

    let title = session.title().await.ok().flatten();
    let content = session.content().await.unwrap_or_default();
    detect_block_in_text(title.as_deref(), &content)
}
