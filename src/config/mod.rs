// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理数据库、服务器、抓取引擎、工作器与对象存储等配置
pub mod settings;
