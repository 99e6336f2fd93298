// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use metrics::gauge;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::engines::traits::EngineError;

/// 全局浏览器会话限流器
///
/// 所有工作器共享。每次抓取尝试在打开会话前获取一个许可，
/// 许可随 `SessionPermit` 的 drop 在任何退出路径上释放。
#[derive(Clone, Debug)]
pub struct SessionLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    in_use: Arc<AtomicUsize>,
}

/// 会话许可
#[derive(Debug)]
pub struct SessionPermit {
    _permit: OwnedSemaphorePermit,
    in_use: Arc<AtomicUsize>,
}

impl Drop for SessionPermit {
    fn drop(&mut self) {
        let now = self.in_use.fetch_sub(1, Ordering::SeqCst) - 1;
        gauge!("browser_sessions_open").set(now as f64);
    }
}

impl SessionLimiter {
    /// 创建限流器
    ///
    /// # 参数
    ///
    /// * `capacity` - 同时打开的会话上限，最小为 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_use: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 等待并获取一个会话许可
    ///
    /// 限流器关闭后返回 `EngineError::Shutdown`。
    pub async fn acquire(&self) -> Result<SessionPermit, EngineError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Shutdown)?;

        let now = self.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        gauge!("browser_sessions_open").set(now as f64);

        Ok(SessionPermit {
            _permit: permit,
            in_use: self.in_use.clone(),
        })
    }

    /// 停止发放新许可
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::SeqCst)
    }
}
