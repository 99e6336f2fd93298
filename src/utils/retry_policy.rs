// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;

/// 退避曲线形状
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffShape {
    /// `initial_backoff * attempt`
    Linear,
    /// `initial_backoff * multiplier^(attempt-1)`
    Exponential,
}

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数（包含首次）
    pub max_attempts: u32,
    /// 初始退避时间
    pub initial_backoff: Duration,
    /// 最大退避时间
    pub max_backoff: Duration,
    /// 退避乘数
    pub backoff_multiplier: f64,
    /// 抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
    /// 退避曲线
    pub shape: BackoffShape,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(15),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
            shape: BackoffShape::Exponential,
        }
    }
}

impl RetryPolicy {
    /// 外层（任务级）重试：线性退避，无抖动
    ///
    /// # 参数
    ///
    /// * `max_attempts` - 最大尝试次数
    /// * `delay` - 第 n 次失败后等待 `delay * n`
    pub fn linear(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff: delay,
            max_backoff: Duration::MAX,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
            shape: BackoffShape::Linear,
        }
    }

    /// 内层（会话级）重试：指数退避加抖动
    pub fn exponential(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff: base,
            max_backoff: max,
            ..Self::default()
        }
    }

    /// 计算第 `attempt` 次失败后的退避时间（attempt 从 1 开始）
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let base = self.initial_backoff.as_secs_f64();

        let raw = match self.shape {
            BackoffShape::Linear => base * attempt as f64,
            BackoffShape::Exponential => {
                base * self.backoff_multiplier.powi(attempt as i32 - 1)
            }
        };

        let capped = raw.min(self.max_backoff.as_secs_f64());

        let final_backoff = if self.jitter_factor > 0.0 && capped > 0.0 {
            let jitter_range = capped * self.jitter_factor;
            let jitter = rand::random_range(-jitter_range..jitter_range);
            (capped + jitter).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(final_backoff)
    }

    /// 第 `attempt` 次失败后是否还应继续
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
