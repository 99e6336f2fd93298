// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use rand::seq::IndexedRandom;

/// 桌面浏览器 UA 池
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

pub const VIEWPORT_WIDTH: RangeInclusive<u32> = 1280..=1920;
pub const VIEWPORT_HEIGHT: RangeInclusive<u32> = 720..=1080;

/// 导航前注入的反自动化脚本
///
/// 隐藏 webdriver 标记、伪造非空插件列表、规范化权限查询结果。
pub const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', {
    get: () => undefined,
    configurable: true
});
Object.defineProperty(navigator, 'plugins', {
    get: () => [
        { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
        { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai', description: '' },
        { name: 'Native Client', filename: 'internal-nacl-plugin', description: '' }
    ],
    configurable: true
});
window.chrome = window.chrome || { runtime: {} };
if (window.navigator.permissions && window.navigator.permissions.query) {
    const originalQuery = window.navigator.permissions.query.bind(window.navigator.permissions);
    window.navigator.permissions.query = (parameters) => (
        parameters && parameters.name === 'notifications'
            ? Promise.resolve({ state: Notification.permission })
            : originalQuery(parameters)
    );
}
"#;

/// 站点对应的语言环境
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketplaceProfile {
    pub locale: &'static str,
    pub timezone: &'static str,
    pub accept_language: &'static str,
}

/// 按站点域名查找语言环境，未知站点回退到美国站
pub fn marketplace_profile(marketplace: &str) -> MarketplaceProfile {
    match marketplace {
        "amazon.co.jp" => MarketplaceProfile {
            locale: "ja-JP",
            timezone: "Asia/Tokyo",
            accept_language: "ja-JP,ja;q=0.9,en;q=0.8",
        },
        "amazon.de" => MarketplaceProfile {
            locale: "de-DE",
            timezone: "Europe/Berlin",
            accept_language: "de-DE,de;q=0.9,en;q=0.8",
        },
        "amazon.co.uk" => MarketplaceProfile {
            locale: "en-GB",
            timezone: "Europe/London",
            accept_language: "en-GB,en;q=0.9",
        },
        "amazon.fr" => MarketplaceProfile {
            locale: "fr-FR",
            timezone: "Europe/Paris",
            accept_language: "fr-FR,fr;q=0.9,en;q=0.8",
        },
        _ => MarketplaceProfile {
            locale: "en-US",
            timezone: "America/New_York",
            accept_language: "en-US,en;q=0.9",
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// 单次尝试的随机浏览器指纹
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    pub user_agent: String,
    pub viewport: Viewport,
    pub locale: String,
    pub timezone: String,
    /// 额外请求头
    pub headers: BTreeMap<String, String>,
    /// 在任何页面脚本之前执行
    pub init_script: String,
}

impl Fingerprint {
    /// 为指定站点生成随机指纹
    pub fn random_for(marketplace: &str) -> Self {
        let mut rng = rand::rng();
        let profile = marketplace_profile(marketplace);

        let user_agent = USER_AGENTS
            .choose(&mut rng)
            .copied()
            .unwrap_or(USER_AGENTS[0])
            .to_string();

        let viewport = Viewport {
            width: rand::random_range(VIEWPORT_WIDTH),
            height: rand::random_range(VIEWPORT_HEIGHT),
        };

        let mut headers = BTreeMap::new();
        headers.insert("Accept-Language".to_string(), profile.accept_language.to_string());
        headers.insert(
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
                .to_string(),
        );
        headers.insert("Upgrade-Insecure-Requests".to_string(), "1".to_string());
        headers.insert("Sec-Fetch-Dest".to_string(), "document".to_string());
        headers.insert("Sec-Fetch-Mode".to_string(), "navigate".to_string());
        headers.insert("Sec-Fetch-Site".to_string(), "none".to_string());

        let languages = profile
            .accept_language
            .split(',')
            .map(|part| part.split(';').next().unwrap_or(part).trim())
            .map(|lang| format!("'{}'", lang))
            .collect::<Vec<_>>()
            .join(", ");
        let init_script = format!(
            "{}\nObject.defineProperty(navigator, 'languages', {{ get: () => [{}], configurable: true }});\n",
            STEALTH_SCRIPT, languages
        );

        Self {
            user_agent,
            viewport,
            locale: profile.locale.to_string(),
            timezone: profile.timezone.to_string(),
            headers,
            init_script,
        }
    }
}
