// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 工作池、外层重试流水线以及按商品键的互斥
pub mod key_lock;
pub mod manager;
pub mod pipeline;
pub mod scrape_worker;
