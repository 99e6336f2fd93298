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

use axum::{extract::Extension, http::StatusCode, Json};
use tracing::{info, warn};
use validator::Validate;

use super::AppState;
use crate::application::dto::scrape_request::ScrapeRequestDto;
use crate::application::dto::scrape_response::{ScrapeResponseDto, TaskDto};
use crate::domain::models::product::ItemKey;
use crate::domain::models::task::{ScrapeTask, TaskStatus};
use crate::presentation::errors::AppError;
use crate::queue::task_queue::QueuedScrape;

/// 创建任务并放入准入队列
pub(crate) async fn admit(
    state: &AppState,
    key: ItemKey,
    force: bool,
    requested_by: Option<String>,
) -> Result<ScrapeTask, AppError> {
    let task = state
        .tasks
        .create(&ScrapeTask::new(&key, requested_by))
        .await?;

    let mut queued = QueuedScrape::new(key, Some(task.id));
    if force {
        queued = queued.forced();
    }
    if let Err(e) = state.queue.enqueue(queued) {
        warn!(task_id = %task.id, "Admission rejected: {}", e);
        if let Err(db_err) = state
            .tasks
            .update_status(task.id, TaskStatus::Failed, Some(e.to_string()))
            .await
        {
            warn!("Failed to mark rejected task failed: {}", db_err);
        }
        return Err(e.into());
    }

    Ok(task)
}

/// `POST /v1/scrape`
pub async fn create_scrape(
    Extension(state): Extension<AppState>,
    Json(payload): Json<ScrapeRequestDto>,
) -> Result<(StatusCode, Json<ScrapeResponseDto>), AppError> {
    payload.validate()?;

    let mut tasks = Vec::with_capacity(payload.items.len());
    for item in &payload.items {
        let task = admit(
            &state,
            item.key(),
            payload.force,
            payload.requested_by.clone(),
        )
        .await?;
        tasks.push(TaskDto::from(task));
    }

    info!(
        count = tasks.len(),
        queue_size = state.queue.len(),
        "Scrape tasks admitted"
    );
    Ok((StatusCode::ACCEPTED, Json(ScrapeResponseDto { tasks })))
}
