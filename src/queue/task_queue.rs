// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::domain::models::product::ItemKey;

/// 队列错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// 队列已关闭
    #[error("Queue closed")]
    Closed,
}

/// 一条待处理的抓取请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedScrape {
    pub key: ItemKey,
    /// 由请求入口创建的任务；内部触发的刷新可以没有任务
    pub task_id: Option<Uuid>,
    pub force: bool,
}

impl QueuedScrape {
    pub fn new(key: ItemKey, task_id: Option<Uuid>) -> Self {
        Self {
            key,
            task_id,
            force: false,
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// 准入队列
///
/// 无界 FIFO，多个工作者共享同一个接收端。进程退出时未出队的请求直接丢弃。
#[derive(Clone)]
pub struct AdmissionQueue {
    sender: mpsc::UnboundedSender<QueuedScrape>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<QueuedScrape>>>,
    len: Arc<AtomicUsize>,
}

impl Default for AdmissionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            len: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 入队
    pub fn enqueue(&self, item: QueuedScrape) -> Result<(), QueueError> {
        self.sender.send(item).map_err(|_| QueueError::Closed)?;
        self.len.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// 出队，最多等待 `poll_timeout`
    ///
    /// # 返回值
    ///
    /// * `Ok(Some(item))` - 取到请求
    /// * `Ok(None)` - 超时，调用方应检查停机信号后再次轮询
    /// * `Err(QueueError::Closed)` - 队列已关闭且已排空
    pub async fn dequeue(&self, poll_timeout: Duration) -> Result<Option<QueuedScrape>, QueueError> {
        let received = tokio::time::timeout(poll_timeout, async {
            self.receiver.lock().await.recv().await
        })
        .await;

        match received {
            Ok(Some(item)) => {
                self.len.fetch_sub(1, Ordering::SeqCst);
                Ok(Some(item))
            }
            Ok(None) => Err(QueueError::Closed),
            Err(_) => Ok(None),
        }
    }

    /// 当前排队数量
    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 关闭接收端，之后入队失败；已排队的请求仍可取出
    pub async fn close(&self) {
        self.receiver.lock().await.close();
    }
}
