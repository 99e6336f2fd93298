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

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::domain::models::product::ItemKey;

pub const DEFAULT_MARKETPLACE: &str = "amazon.com";

/// ASIN 为 10 位字母数字
fn validate_asin(asin: &str) -> Result<(), ValidationError> {
    if asin.len() == 10 && asin.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid asin"))
    }
}

/// 站点域名，如 `amazon.co.jp`
fn validate_marketplace(marketplace: &str) -> Result<(), ValidationError> {
    let valid = marketplace.contains('.')
        && !marketplace.starts_with('.')
        && !marketplace.ends_with('.')
        && marketplace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid marketplace"))
    }
}

fn default_marketplace() -> String {
    DEFAULT_MARKETPLACE.to_string()
}

/// 单个抓取目标
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ScrapeItemDto {
    #[validate(custom(function = validate_asin))]
    pub asin: String,
    #[serde(default = "default_marketplace")]
    #[validate(custom(function = validate_marketplace))]
    pub marketplace: String,
}

impl ScrapeItemDto {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.asin.to_uppercase(), self.marketplace.to_lowercase())
    }
}

/// 抓取请求，单个目标即长度为 1 的批次
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct ScrapeRequestDto {
    #[validate(length(min = 1, max = 100, message = "items cannot be empty"), nested)]
    pub items: Vec<ScrapeItemDto>,
    /// 忽略新鲜度强制抓取
    #[serde(default)]
    pub force: bool,
    pub requested_by: Option<String>,
}

/// `GET /v1/products/{asin}` 查询参数
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct ProductQueryDto {
    #[serde(default = "default_marketplace")]
    #[validate(custom(function = validate_marketplace))]
    pub marketplace: String,
    #[serde(default)]
    pub force: bool,
    /// 为真时最多等待 30 秒拿到新鲜记录
    #[serde(default)]
    pub wait: bool,
}
