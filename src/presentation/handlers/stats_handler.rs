// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::atomic::Ordering;

use axum::{extract::Extension, Json};

use super::AppState;
use crate::application::dto::scrape_response::StatsResponseDto;
use crate::presentation::errors::AppError;

/// `GET /v1/stats`
pub async fn get_stats(
    Extension(state): Extension<AppState>,
) -> Result<Json<StatsResponseDto>, AppError> {
    Ok(Json(StatsResponseDto {
        queue_size: state.queue.len(),
        active_workers: state.active_workers.load(Ordering::SeqCst),
        sessions_open: state.limiter.in_use(),
        session_capacity: state.limiter.capacity(),
        products: state.products.stats().await?,
        tasks: state.tasks.stats().await?,
    }))
}
