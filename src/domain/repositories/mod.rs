// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 该模块定义了领域层的仓库接口，具体实现由基础设施层提供：
/// - 商品仓库（product_repository）：商品记录与从属集合
/// - 存储仓库（storage_repository）：图片对象存储
/// - 任务仓库（task_repository）：抓取任务状态
pub mod product_repository;
pub mod storage_repository;
pub mod task_repository;
