// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Duration, Utc};

use crate::domain::models::product::ProductRecord;

/// 新鲜度判定
///
/// 纯函数，无副作用：
/// - 没有记录或从未成功抓取 ⇒ 需要抓取
/// - `force` ⇒ 需要抓取
/// - 否则当且仅当 `now - last_scraped_at > ttl`
#[derive(Debug, Clone, Copy)]
pub struct FreshnessPolicy {
    ttl: Duration,
}

impl FreshnessPolicy {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn needs_fetch(&self, existing: Option<&ProductRecord>, force: bool) -> bool {
        self.needs_fetch_at(existing, force, Utc::now())
    }

    pub fn needs_fetch_at(
        &self,
        existing: Option<&ProductRecord>,
        force: bool,
        now: DateTime<Utc>,
    ) -> bool {
        if force {
            return true;
        }
        match existing.and_then(|record| record.last_scraped_at) {
            None => true,
            Some(last) => now - last > self.ttl,
        }
    }
}
