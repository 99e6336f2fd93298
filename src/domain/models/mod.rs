// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了系统的核心业务实体，包括：
/// - 抓取任务（task）：一次入队请求及其状态机
/// - 商品（product）：抓取目标键、提取快照与持久化记录
/// - 图片资源（asset）：按角色与位置寻址的镜像描述
pub mod asset;
pub mod product;
pub mod task;
