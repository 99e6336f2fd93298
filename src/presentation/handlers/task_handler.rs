// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    extract::{Extension, Path},
    Json,
};
use uuid::Uuid;

use super::AppState;
use crate::application::dto::scrape_response::TaskDto;
use crate::domain::repositories::task_repository::RepositoryError;
use crate::presentation::errors::AppError;

/// `GET /v1/tasks/{id}`
pub async fn get_task(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskDto>, AppError> {
    let task = state
        .tasks
        .find_by_id(id)
        .await?
        .ok_or(RepositoryError::NotFound)?;
    Ok(Json(task.into()))
}
