// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::models::product::{ItemKey, ProductRecord, ProductSnapshot};
use crate::domain::repositories::product_repository::ProductRepository;
use crate::domain::repositories::task_repository::RepositoryError;

/// 计算快照的结构摘要
///
/// 只覆盖结构字段：标题、bullets 文本、主图与画廊图的源地址。
/// 评分、评论数、价格、库存与排名等易变字段刻意不参与，
/// A+ 图片与属性表同样不参与。
pub fn structural_digest(snapshot: &ProductSnapshot) -> String {
    let structural = json!({
        "title": snapshot.title,
        "bullets": snapshot.bullets,
        "hero": snapshot.hero_image.as_ref().map(|img| img.url.as_str()),
        "gallery": snapshot
            .gallery
            .iter()
            .map(|img| img.url.as_str())
            .collect::<Vec<_>>(),
    });

    let mut hasher = Sha256::new();
    hasher.update(structural.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// 截取十六进制摘要的前 8 位
pub fn short_hash(hex_digest: &str) -> &str {
    hex_digest.get(..8).unwrap_or(hex_digest)
}

/// 持久化分支
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// 无记录：插入记录与全部从属集合
    Insert,
    /// 摘要不同：更新核心字段并整体替换从属集合
    Refresh(Uuid),
    /// 摘要相同：只更新易变字段
    Touch(Uuid),
}

pub fn decide(existing: Option<&ProductRecord>, digest: &str) -> GateDecision {
    match existing {
        None => GateDecision::Insert,
        Some(record) if record.structural_digest != digest => GateDecision::Refresh(record.id),
        Some(record) => GateDecision::Touch(record.id),
    }
}

/// 变更检测结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub record_id: Uuid,
    /// 为真时需要重新镜像图片
    pub changed: bool,
    pub digest: String,
}

/// 变更检测闸门
///
/// 根据结构摘要在三种持久化分支中选择，返回 `(record_id, changed)`。
pub struct ChangeDetectionGate<P: ProductRepository + ?Sized> {
    repository: Arc<P>,
}

impl<P: ProductRepository + ?Sized> ChangeDetectionGate<P> {
    pub fn new(repository: Arc<P>) -> Self {
        Self { repository }
    }

    /// 持久化快照
    ///
    /// # 参数
    ///
    /// * `key` - 抓取目标
    /// * `snapshot` - 本次提取结果
    ///
    /// # 返回值
    ///
    /// * `Ok(UpsertOutcome)` - 记录 ID 以及是否发生结构变化
    /// * `Err(RepositoryError)` - 存储不可用
    pub async fn persist(
        &self,
        key: &ItemKey,
        snapshot: &ProductSnapshot,
    ) -> Result<UpsertOutcome, RepositoryError> {
        let digest = structural_digest(snapshot);
        let existing = self.repository.find_by_key(key).await?;

        let (record_id, changed) = match decide(existing.as_ref(), &digest) {
            GateDecision::Insert => {
                let record = ProductRecord::from_snapshot(key, snapshot, &digest);
                let id = self
                    .repository
                    .insert_with_derived(&record, &snapshot.derived_collections())
                    .await?;
                info!(product = %key, digest = short_hash(&digest), "Inserted new product");
                (id, true)
            }
            GateDecision::Refresh(id) => {
                let mut record = ProductRecord::from_snapshot(key, snapshot, &digest);
                record.id = id;
                if let Some(previous) = &existing {
                    record.created_at = previous.created_at;
                }
                self.repository
                    .replace_with_derived(&record, &snapshot.derived_collections())
                    .await?;
                info!(product = %key, digest = short_hash(&digest), "Structural change detected, derived rows replaced");
                (id, true)
            }
            GateDecision::Touch(id) => {
                self.repository
                    .touch_volatile(id, &snapshot.volatile_fields())
                    .await?;
                debug!(product = %key, "Digest unchanged, volatile fields updated");
                (id, false)
            }
        };

        Ok(UpsertOutcome {
            record_id,
            changed,
            digest,
        })
    }
}
