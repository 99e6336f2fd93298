// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::domain::models::product::{
    AttributeSource, ImageRef, ItemKey, Price, ProductAttribute, ProductSnapshot,
};
use crate::engines::traits::{BrowserSession, ContentExtractor};
use crate::utils::errors::ScrapeError;

const MAX_BULLETS: usize = 5;
const MIN_BULLET_CHARS: usize = 10;
const MAX_GALLERY: usize = 10;
const RAW_HTML_LIMIT: usize = 10_000;

static RATING_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(\d+(?:[.,]\d+)?)\s*(?:out of|von|sur|su)\s*5|5つ星のうち\s*(\d+(?:[.,]\d+)?)").ok()
});
static COUNT_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\d[\d,.\s]*").ok());
static PRICE_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(S\$|[€$£¥￥])?\s*(\d[\d.,]*)\s*([€£¥￥]|[A-Z]{3})?").ok());
static BSR_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"#\s?([\d,.]+)\s+(?:in|en|in der|dans)\s+([^(#\n]+)").ok());

/// 基于页面 HTML 的商品提取器
#[derive(Debug, Default, Clone)]
pub struct HtmlExtractor;

impl HtmlExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContentExtractor for HtmlExtractor {
    async fn extract(
        &self,
        session: &dyn BrowserSession,
        key: &ItemKey,
    ) -> Result<ProductSnapshot, ScrapeError> {
        let html = session.content().await?;
        // scraper::Html 不是 Send，解析必须在同步函数里完成
        let snapshot = parse_snapshot(&html, key);
        if snapshot.title.is_none()
            && snapshot.hero_image.is_none()
            && snapshot.bullets.is_empty()
            && snapshot.price.is_none()
        {
            return Err(ScrapeError::Extraction(format!(
                "no product fields found on page for {}",
                key
            )));
        }
        Ok(snapshot)
    }
}

/// 从商品详情页 HTML 解析快照
///
/// 每个字段独立解析，失败时为 `None` 或空集合。
pub fn parse_snapshot(html: &str, key: &ItemKey) -> ProductSnapshot {
    let document = Html::parse_document(html);

    let (rating, ratings_count) = extract_rating(&document);

    ProductSnapshot {
        title: first_text(&document, "#productTitle").or_else(|| first_text(&document, "#titleSection")),
        rating,
        ratings_count,
        price: extract_price(&document, &key.marketplace),
        availability: first_text(&document, "#availability"),
        hero_image: extract_hero(&document),
        gallery: extract_gallery(&document),
        bullets: extract_bullets(&document),
        attributes: extract_attributes(&document),
        best_sellers_rank: extract_bsr(&document),
        aplus_images: extract_aplus(&document),
        raw_html: Some(html.chars().take(RAW_HTML_LIMIT).collect()),
    }
}

fn normalize_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = normalize_ws(&element.text().collect::<String>());
    (!text.is_empty()).then_some(text)
}

fn select<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    select(document, css).into_iter().find_map(element_text)
}

fn child_text(element: ElementRef<'_>, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    element.select(&selector).find_map(element_text)
}

fn usable_image_url(url: &str) -> bool {
    url.starts_with("http") && !url.contains("transparent-pixel") && !url.contains("grey-pixel")
}

/// 解析数字，最后出现的 `.` 或 `,` 在其后恰好有 1-2 位时视为小数点
fn parse_number(raw: &str) -> Option<f64> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',').collect();
    let digits = digits.trim_matches(|c| c == '.' || c == ',');
    if digits.is_empty() {
        return None;
    }
    let normalized = match digits.rfind(['.', ',']) {
        Some(idx) if (1..=2).contains(&(digits.len() - idx - 1)) => {
            let (int_part, frac_part) = digits.split_at(idx);
            let int_part: String = int_part.chars().filter(|c| c.is_ascii_digit()).collect();
            format!("{}.{}", int_part, &frac_part[1..])
        }
        _ => digits.chars().filter(|c| c.is_ascii_digit()).collect(),
    };
    normalized.parse().ok()
}

fn extract_rating(document: &Html) -> (Option<f64>, Option<i32>) {
    let rating_text = select(document, "#acrPopover")
        .into_iter()
        .find_map(|el| el.value().attr("title").map(str::to_string).or_else(|| element_text(el)));

    let rating = rating_text.as_deref().and_then(|text| {
        let caps = RATING_RE.as_ref()?.captures(text)?;
        let value = caps.get(1).or_else(|| caps.get(2))?.as_str().replace(',', ".");
        value.parse::<f64>().ok().filter(|r| (0.0..=5.0).contains(r))
    });

    let ratings_count = first_text(document, "#acrCustomerReviewText").and_then(|text| {
        let m = COUNT_RE.as_ref()?.find(&text)?;
        let digits: String = m.as_str().chars().filter(char::is_ascii_digit).collect();
        digits.parse::<i32>().ok()
    });

    (rating, ratings_count)
}

fn currency_for(symbol: Option<&str>, code: Option<&str>, marketplace: &str) -> String {
    let from_symbol = |s: &str| match s {
        "$" => Some("USD"),
        "€" => Some("EUR"),
        "£" => Some("GBP"),
        "S$" => Some("SGD"),
        "¥" | "￥" if marketplace == "amazon.co.jp" => Some("JPY"),
        "¥" | "￥" => Some("CNY"),
        _ => None,
    };

    if let Some(code) = code.filter(|c| c.len() == 3 && c.chars().all(|ch| ch.is_ascii_uppercase())) {
        return code.to_string();
    }
    if let Some(currency) = symbol.or(code).and_then(from_symbol) {
        return currency.to_string();
    }
    match marketplace {
        "amazon.co.jp" => "JPY",
        "amazon.de" | "amazon.fr" => "EUR",
        "amazon.co.uk" => "GBP",
        _ => "USD",
    }
    .to_string()
}

fn extract_price(document: &Html, marketplace: &str) -> Option<Price> {
    let text = first_text(document, ".a-price .a-offscreen")
        .or_else(|| first_text(document, "#corePrice_desktop .a-offscreen"));

    if let Some(text) = text {
        if let Some(caps) = PRICE_RE.as_ref().and_then(|re| re.captures(&text)) {
            if let Some(amount) = caps.get(2).and_then(|m| parse_number(m.as_str())) {
                let currency = currency_for(
                    caps.get(1).map(|m| m.as_str()),
                    caps.get(3).map(|m| m.as_str()),
                    marketplace,
                );
                return Some(Price { amount, currency });
            }
        }
    }

    let whole = first_text(document, ".a-price .a-price-whole")?;
    let fraction = first_text(document, ".a-price .a-price-fraction");
    let symbol = first_text(document, ".a-price .a-price-symbol");
    let whole_digits: String = whole.chars().filter(char::is_ascii_digit).collect();
    let joined = match fraction {
        Some(f) => format!("{}.{}", whole_digits, f.trim()),
        None => whole_digits,
    };
    let amount = joined.parse::<f64>().ok()?;
    Some(Price {
        amount,
        currency: currency_for(symbol.as_deref(), None, marketplace),
    })
}

/// `data-a-dynamic-image` 为 `{"url": [w, h], ...}`，取面积最大者
fn largest_dynamic_image(raw: &str) -> Option<(String, i32, i32)> {
    let map: BTreeMap<String, Vec<i64>> = serde_json::from_str(raw).ok()?;
    map.into_iter()
        .filter(|(_, dims)| dims.len() >= 2)
        .max_by_key(|(_, dims)| dims[0] * dims[1])
        .map(|(url, dims)| (url, dims[0] as i32, dims[1] as i32))
}

fn extract_hero(document: &Html) -> Option<ImageRef> {
    let element = select(document, "#imgTagWrapperId img, #landingImage")
        .into_iter()
        .next()?;
    let attrs = element.value();

    let mut image = if let Some(url) = attrs.attr("data-old-hires").filter(|u| usable_image_url(u)) {
        ImageRef::new(url, 0)
    } else if let Some((url, w, h)) = attrs.attr("data-a-dynamic-image").and_then(largest_dynamic_image) {
        ImageRef {
            width: Some(w),
            height: Some(h),
            ..ImageRef::new(url, 0)
        }
    } else {
        ImageRef::new(attrs.attr("src").filter(|u| usable_image_url(u))?, 0)
    };
    image.alt_text = attrs.attr("alt").map(normalize_ws).filter(|a| !a.is_empty());
    Some(image)
}

fn extract_gallery(document: &Html) -> Vec<ImageRef> {
    let mut seen = HashSet::new();
    select(document, "#altImages img")
        .into_iter()
        .filter_map(|el| el.value().attr("src"))
        .filter(|src| usable_image_url(src) && !src.contains("play-icon"))
        .filter(|src| seen.insert(src.to_string()))
        .take(MAX_GALLERY)
        .enumerate()
        .map(|(idx, src)| ImageRef::new(src, idx as i32 + 1))
        .collect()
}

fn extract_bullets(document: &Html) -> Vec<String> {
    let mut seen = HashSet::new();
    select(document, "#feature-bullets ul li span")
        .into_iter()
        .filter_map(element_text)
        .filter(|text| text.chars().count() > MIN_BULLET_CHARS)
        .filter(|text| seen.insert(text.clone()))
        .take(MAX_BULLETS)
        .collect()
}

fn is_meta_row(name: &str) -> bool {
    let lowered = name.to_lowercase();
    lowered.contains("best sellers rank") || lowered.contains("customer reviews")
}

fn extract_attributes(document: &Html) -> Vec<ProductAttribute> {
    let mut attributes = Vec::new();

    let tables = [
        ("#productDetails_techSpec_section_1 tr", AttributeSource::TechDetails),
        ("#productDetails_detailBullets_sections1 tr", AttributeSource::ProductInformation),
    ];
    for (css, source) in tables {
        for row in select(document, css) {
            if let (Some(name), Some(value)) = (child_text(row, "th"), child_text(row, "td")) {
                if !is_meta_row(&name) {
                    attributes.push(ProductAttribute { name, value, source });
                }
            }
        }
    }

    for item in select(document, "#detailBullets_feature_div li") {
        let Some(text) = element_text(item) else {
            continue;
        };
        let Some((name, value)) = text.split_once(':') else {
            continue;
        };
        let name = name.trim_matches(|c: char| c.is_whitespace() || c == '\u{200f}' || c == '\u{200e}');
        let value = value.trim();
        if !name.is_empty() && !value.is_empty() && !is_meta_row(name) {
            attributes.push(ProductAttribute {
                name: name.to_string(),
                value: value.to_string(),
                source: AttributeSource::ProductInformation,
            });
        }
    }

    attributes
}

fn extract_bsr(document: &Html) -> BTreeMap<String, i64> {
    let mut ranks = BTreeMap::new();
    let Some(re) = BSR_RE.as_ref() else {
        return ranks;
    };

    for section in select(
        document,
        "#SalesRank, #detailBulletsWrapper_feature_div, #productDetails_detailBullets_sections1",
    ) {
        let Some(text) = element_text(section) else {
            continue;
        };
        for caps in re.captures_iter(&text) {
            let rank: String = caps[1].chars().filter(char::is_ascii_digit).collect();
            let category = caps[2].trim().to_string();
            if let Ok(rank) = rank.parse::<i64>() {
                if !category.is_empty() {
                    ranks.entry(category).or_insert(rank);
                }
            }
        }
    }
    ranks
}

fn extract_aplus(document: &Html) -> Vec<ImageRef> {
    let mut seen = HashSet::new();
    select(document, "#aplus img, #aplus_feature_div img")
        .into_iter()
        .filter_map(|el| {
            let attrs = el.value();
            let url = attrs
                .attr("data-src")
                .filter(|u| usable_image_url(u))
                .or_else(|| attrs.attr("src").filter(|u| usable_image_url(u)))?;
            seen.insert(url.to_string()).then(|| {
                let alt = attrs.attr("alt").map(normalize_ws).filter(|a| !a.is_empty());
                (url.to_string(), alt)
            })
        })
        .enumerate()
        .map(|(idx, (url, alt))| ImageRef {
            alt_text: alt,
            ..ImageRef::new(url, idx as i32 + 1)
        })
        .collect()
}
