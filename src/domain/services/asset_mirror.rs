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
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::change_detection::short_hash;
use crate::domain::models::asset::{AssetRecord, AssetRole};
use crate::domain::models::product::{ItemKey, ProductSnapshot};
use crate::domain::repositories::product_repository::ProductRepository;
use crate::domain::repositories::storage_repository::{StorageError, StorageRepository};
use crate::utils::errors::ScrapeError;

/// 缩略图尺寸后缀，按从具体到宽泛排列，首个命中的规则生效
static RESIZE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\._[A-Z]{2}\d+[A-Z]{2}\d+_\.",
        r"\._[A-Z]{2}\d+,\d+_\.",
        r"\._[A-Z]{2}\d+_\.",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// 将图片地址改写为最大分辨率版本
///
/// 例如 `71abc._SX300_.jpg` → `71abc.jpg`；没有命中任何规则时原样返回。
pub fn rewrite_to_full_resolution(url: &str) -> String {
    RESIZE_PATTERNS
        .iter()
        .find(|re| re.is_match(url))
        .map(|re| re.replace_all(url, ".").into_owned())
        .unwrap_or_else(|| url.to_string())
}

/// 从地址路径中取小写扩展名，缺失时为 `.jpg`
pub fn file_extension(url: &str) -> String {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.split(['?', '#']).next().unwrap_or(url).to_string());

    let file_name = path.rsplit('/').next().unwrap_or("");
    match file_name.rfind('.') {
        Some(idx) if idx + 1 < file_name.len() => file_name[idx..].to_ascii_lowercase(),
        _ => ".jpg".to_string(),
    }
}

pub fn content_type_for(extension: &str) -> &'static str {
    match extension {
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        _ => "image/jpeg",
    }
}

/// 对象存储中的目录与同角色同位置的清理前缀
fn storage_dir(key: &ItemKey, role: AssetRole) -> String {
    match role {
        AssetRole::Aplus => format!("{}/{}/aplus", key.marketplace, key.asin),
        _ => format!("{}/{}", key.marketplace, key.asin),
    }
}

/// 生成图片存储路径
///
/// `{dir}/{role}_{position}_{bytes8}-{digest8}{ext}`，内容不变时名称不变。
pub fn storage_path(
    key: &ItemKey,
    role: AssetRole,
    position: i32,
    bytes: &[u8],
    structural_digest: &str,
    extension: &str,
) -> String {
    let bytes_digest = hex::encode(Sha256::digest(bytes));
    format!(
        "{}/{}_{}_{}-{}{}",
        storage_dir(key, role),
        role,
        position,
        short_hash(&bytes_digest),
        short_hash(structural_digest),
        extension
    )
}

fn slot_prefix(key: &ItemKey, role: AssetRole, position: i32) -> String {
    format!("{}/{}_{}_", storage_dir(key, role), role, position)
}

/// 单张图片镜像结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirroredAsset {
    pub role: AssetRole,
    pub position: i32,
    pub storage_path: String,
    /// 本次实际写入的字节数；目标已存在时为 0
    pub uploaded_bytes: u64,
}

/// 一次镜像的汇总
#[derive(Debug, Default, Clone)]
pub struct MirrorReport {
    pub stored: Vec<MirroredAsset>,
    /// 单张图片失败被收集于此，不会让任务失败
    pub errors: Vec<String>,
}

impl MirrorReport {
    pub fn uploaded_bytes(&self) -> u64 {
        self.stored.iter().map(|a| a.uploaded_bytes).sum()
    }
}

/// 图片镜像流水线
pub struct AssetMirror<P, S>
where
    P: ProductRepository + ?Sized,
    S: StorageRepository + ?Sized,
{
    repository: Arc<P>,
    storage: Arc<S>,
    client: reqwest::Client,
    max_concurrent: usize,
}

impl<P, S> AssetMirror<P, S>
where
    P: ProductRepository + ?Sized,
    S: StorageRepository + ?Sized,
{
    /// 创建镜像流水线
    ///
    /// # 参数
    ///
    /// * `repository` - 用于回写存储路径
    /// * `storage` - 对象存储
    /// * `download_timeout` - 单张图片下载超时
    /// * `max_concurrent` - 同一任务内并发处理的图片数
    pub fn new(
        repository: Arc<P>,
        storage: Arc<S>,
        download_timeout: Duration,
        max_concurrent: usize,
    ) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .timeout(download_timeout)
            .user_agent(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
            )
            .build()
            .map_err(|e| ScrapeError::Transport(e.to_string()))?;

        Ok(Self {
            repository,
            storage,
            client,
            max_concurrent: max_concurrent.max(1),
        })
    }

    /// 镜像快照中的全部图片
    ///
    /// 每张图片独立处理，失败只记录到报告中；指针按 (role, position) 回写。
    pub async fn mirror(
        &self,
        key: &ItemKey,
        record_id: Uuid,
        snapshot: &ProductSnapshot,
        structural_digest: &str,
    ) -> MirrorReport {
        let assets = snapshot.asset_records();
        let total = assets.len();

        let jobs: Vec<_> = assets
            .into_iter()
            .map(|asset| async move {
                let result = self.mirror_one(key, &asset, structural_digest).await;
                (asset, result)
            })
            .collect();
        let results: Vec<(AssetRecord, Result<MirroredAsset, ScrapeError>)> = stream::iter(jobs)
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut report = MirrorReport::default();
        for (asset, result) in results {
            match result {
                Ok(mirrored) => {
                    if let Err(e) = self
                        .repository
                        .set_asset_stored(record_id, asset.role, asset.position, &mirrored.storage_path)
                        .await
                    {
                        warn!(product = %key, role = %asset.role, position = asset.position, "Failed to record asset pointer: {}", e);
                        report.errors.push(format!("{} {}: {}", asset.role, asset.position, e));
                        continue;
                    }
                    report.stored.push(mirrored);
                }
                Err(e) => {
                    counter!("asset_failures_total", "role" => asset.role.as_str()).increment(1);
                    warn!(product = %key, role = %asset.role, position = asset.position, url = %asset.source_url, "Asset mirror failed: {}", e);
                    if let Err(db_err) = self
                        .repository
                        .set_asset_failed(record_id, asset.role, asset.position)
                        .await
                    {
                        debug!("Failed to mark asset as failed: {}", db_err);
                    }
                    report.errors.push(format!("{} {}: {}", asset.role, asset.position, e));
                }
            }
        }

        info!(
            product = %key,
            total,
            stored = report.stored.len(),
            failed = report.errors.len(),
            uploaded_bytes = report.uploaded_bytes(),
            "Asset mirror finished"
        );
        report
    }

    async fn mirror_one(
        &self,
        key: &ItemKey,
        asset: &AssetRecord,
        structural_digest: &str,
    ) -> Result<MirroredAsset, ScrapeError> {
        let (bytes, fetched_from) = self.fetch_with_fallback(&asset.source_url).await?;

        let extension = file_extension(&fetched_from);
        let path = storage_path(
            key,
            asset.role,
            asset.position,
            &bytes,
            structural_digest,
            &extension,
        );

        let already_present = self.prune_slot(key, asset, &path).await;
        let uploaded_bytes = if already_present {
            debug!(path = %path, "Asset already mirrored, skipping upload");
            0
        } else {
            match self
                .storage
                .put(&path, &bytes, content_type_for(&extension))
                .await
            {
                Ok(()) => {
                    counter!("asset_uploads_total", "role" => asset.role.as_str()).increment(1);
                    bytes.len() as u64
                }
                Err(StorageError::AlreadyExists(_)) => 0,
                Err(e) => return Err(ScrapeError::Asset(format!("upload {}: {}", path, e))),
            }
        };

        Ok(MirroredAsset {
            role: asset.role,
            position: asset.position,
            storage_path: path,
            uploaded_bytes,
        })
    }

    /// 删除同角色同位置下除目标外的所有对象，返回目标是否已存在
    ///
    /// 列举或删除失败只记录日志，不阻止上传。
    async fn prune_slot(&self, key: &ItemKey, asset: &AssetRecord, target: &str) -> bool {
        let prefix = slot_prefix(key, asset.role, asset.position);
        let existing = match self.storage.list(&prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(prefix = %prefix, "Failed to list existing assets, continuing: {}", e);
                return false;
            }
        };

        let (current, stale): (Vec<String>, Vec<String>) =
            existing.into_iter().partition(|k| k == target);

        if !stale.is_empty() {
            match self.storage.delete(&stale).await {
                Ok(()) => debug!(removed = stale.len(), prefix = %prefix, "Removed superseded assets"),
                Err(e) => warn!(prefix = %prefix, "Failed to remove superseded assets: {}", e),
            }
        }

        !current.is_empty()
    }

    /// 先取最大分辨率地址，失败后回退一次原始地址
    async fn fetch_with_fallback(&self, source_url: &str) -> Result<(Bytes, String), ScrapeError> {
        let rewritten = rewrite_to_full_resolution(source_url);
        match self.fetch(&rewritten).await {
            Ok(bytes) => Ok((bytes, rewritten)),
            Err(e) if rewritten != source_url => {
                debug!(url = %rewritten, "Full resolution fetch failed, falling back: {}", e);
                let bytes = self.fetch(source_url).await?;
                Ok((bytes, source_url.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch(&self, url: &str) -> Result<Bytes, ScrapeError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ScrapeError::Asset(format!("fetch {}: {}", url, e)))?
            .error_for_status()
            .map_err(|e| ScrapeError::Asset(format!("fetch {}: {}", url, e)))?;

        response
            .bytes()
            .await
            .map_err(|e| ScrapeError::Asset(format!("read {}: {}", url, e)))
    }
}
