// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// HTTP 请求与响应的数据传输对象
pub mod application;

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 包含核心业务实体、服务和仓库接口
pub mod domain;

/// 引擎模块
///
/// 浏览器会话、反检测指纹、并发限制与页面提取
pub mod engines;

/// 基础设施模块
///
/// 提供外部服务集成，如数据库、存储、指标
pub mod infrastructure;

/// 表示层模块
///
/// 处理HTTP请求和响应，包括路由和处理器
pub mod presentation;

/// 队列模块
///
/// 准入队列
pub mod queue;

/// 工具模块
///
/// 错误分类、重试策略与日志初始化
pub mod utils;

/// 工作器模块
///
/// 工作池与抓取流水线
pub mod workers;
