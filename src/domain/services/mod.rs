// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 包含的服务：
/// - 新鲜度判定（freshness）：依据 TTL 与 force 决定是否抓取
/// - 变更检测（change_detection）：结构摘要与三分支持久化
/// - 图片镜像（asset_mirror）：下载、命名、去重与上传图片
pub mod asset_mirror;
pub mod change_detection;
pub mod freshness;
