//! 结果存储 (Results store)
//!
//! 主循环是唯一写者, 控制接口随时读取。`updated` 只维护一个共享游标:
//! 多个调用方会互相"消费"更新。

use std::sync::Arc;

use parking_lot::Mutex;

use super::types::{Detection, Results};

#[derive(Default)]
struct StoreInner {
    latest: Option<Arc<Results>>,
    last_returned: Option<u64>,
}

/// 线程安全的最新结果
#[derive(Default)]
pub struct ResultsStore {
    inner: Mutex<StoreInner>,
}

impl ResultsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 原子替换最新快照
    pub fn publish(&self, results: Arc<Results>) {
        self.inner.lock().latest = Some(results);
    }

    /// 最新快照 (尚无结果时为空列表, 从不阻塞等待)
    pub fn latest(&self) -> Arc<Results> {
        self.inner
            .lock()
            .latest
            .clone()
            .unwrap_or_else(|| Arc::new(Results::default()))
    }

    pub fn recognitions(&self) -> Vec<Detection> {
        self.latest().detections().to_vec()
    }

    /// 仅当时间戳严格新于上次通过本方法返回的结果时才返回
    pub fn updated(&self) -> Option<Arc<Results>> {
        let mut inner = self.inner.lock();
        let latest = inner.latest.clone()?;
        if inner
            .last_returned
            .is_some_and(|last| latest.timestamp() <= last)
        {
            return None;
        }
        inner.last_returned = Some(latest.timestamp());
        Some(latest)
    }

    pub fn updated_recognitions(&self) -> Option<Vec<Detection>> {
        self.updated().map(|r| r.detections().to_vec())
    }
}
