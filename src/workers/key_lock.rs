// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::models::product::ItemKey;

/// 进程内按商品键的互斥锁
///
/// 同一键的两个任务串行进入流水线，避免派生集合的删除重建交错。
/// 没有持有者的条目在释放时移除。
#[derive(Clone, Default)]
pub struct KeyLocks {
    locks: Arc<DashMap<ItemKey, Arc<Mutex<()>>>>,
}

/// 持有期间同键的其他任务等待
pub struct KeyGuard {
    key: ItemKey,
    locks: Arc<DashMap<ItemKey, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &ItemKey) -> KeyGuard {
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;

        KeyGuard {
            key: key.clone(),
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }

    /// 当前被跟踪的键数量
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // map 自身持有一份引用，只剩这一份时说明没有等待者
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
