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

use std::time::Duration;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tokio::time::{sleep, Instant};
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

use super::scrape_handler::admit;
use super::AppState;
use crate::application::dto::scrape_request::{ProductQueryDto, ScrapeItemDto};
use crate::application::dto::scrape_response::{PendingProductDto, ProductResponseDto};
use crate::domain::models::product::ProductStatus;
use crate::presentation::errors::AppError;

const WAIT_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// 轮询任务直到进入终态
///
/// 超时返回 `false`，不视为错误
async fn wait_for_task(state: &AppState, task_id: Uuid) -> Result<bool, AppError> {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    loop {
        if let Some(task) = state.tasks.find_by_id(task_id).await? {
            if task.status.is_terminal() {
                return Ok(true);
            }
        }
        if Instant::now() + POLL_INTERVAL > deadline {
            debug!(%task_id, "Wait for task timed out");
            return Ok(false);
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// `GET /v1/products/{asin}?marketplace&force&wait`
///
/// 记录过期或 `force=true` 时入队刷新。`wait=true` 时最多等待 30 秒；
/// 仍然没有记录则返回 202。
pub async fn get_product(
    Extension(state): Extension<AppState>,
    Path(asin): Path<String>,
    Query(query): Query<ProductQueryDto>,
) -> Result<Response, AppError> {
    query.validate()?;
    let item = ScrapeItemDto {
        asin,
        marketplace: query.marketplace.clone(),
    };
    item.validate()?;
    let key = item.key();

    let existing = state.products.find_by_key(&key).await?;
    let task_id = if state.freshness.needs_fetch(existing.as_ref(), query.force) {
        if existing.is_some() {
            state.products.set_status(&key, ProductStatus::Stale).await?;
        }
        Some(admit(&state, key.clone(), query.force, None).await?.id)
    } else {
        None
    };

    let (record, completed) = match (query.wait, task_id) {
        (true, Some(id)) => {
            let completed = wait_for_task(&state, id).await?;
            (state.products.find_by_key(&key).await?, completed)
        }
        _ => (existing, false),
    };

    match record {
        Some(record) => {
            let derived = state.products.find_derived(record.id).await?;
            let refreshing = task_id.is_some() && !completed;
            Ok(Json(ProductResponseDto::new(record, derived, refreshing, task_id)).into_response())
        }
        None => Ok((
            StatusCode::ACCEPTED,
            Json(PendingProductDto {
                asin: key.asin,
                marketplace: key.marketplace,
                task_id,
                status: "queued",
            }),
        )
            .into_response()),
    }
}
