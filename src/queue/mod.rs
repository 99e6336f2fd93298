// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 队列模块
///
/// 请求入口与工作池之间的 FIFO 交接
pub mod task_queue;
