//! 工作线程池 (Worker pool)
//!
//! 每个线程独占一个 `DetectionWorker`。可用令牌队列保证同一实例不会被并发调用:
//! 派发前取走令牌, 完成路径中先送出结果再归还令牌。

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::detection::{Detection, DetectionWorker};
use crate::error::{PipelineError, Result};
use crate::frame::Frame;
use crate::region::Zoom;

/// 工作令牌 (即工作者编号)
#[derive(Debug, PartialEq, Eq)]
pub struct WorkerToken(usize);

impl WorkerToken {
    pub fn worker_id(&self) -> usize {
        self.0
    }
}

struct Task {
    frame: Arc<Frame>,
    zoom: Zoom,
}

/// 一次检测任务的完成结果
pub struct Completion {
    pub worker_id: usize,
    pub frame: Arc<Frame>,
    pub result: Result<Vec<Detection>>,
    pub elapsed: Duration,
}

pub struct WorkerPool {
    task_txs: Vec<Sender<Task>>,
    token_tx: Sender<usize>,
    token_rx: Receiver<usize>,
    completion_rx: Receiver<Completion>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// 为每个工作者启动一个线程
    pub fn spawn(workers: Vec<DetectionWorker>) -> Result<Self> {
        let size = workers.len();
        let (token_tx, token_rx) = crossbeam_channel::bounded(size.max(1));
        let (completion_tx, completion_rx) = crossbeam_channel::unbounded();

        let mut task_txs = Vec::with_capacity(size);
        let mut handles = Vec::with_capacity(size);
        for (id, worker) in workers.into_iter().enumerate() {
            let (task_tx, task_rx) = crossbeam_channel::bounded::<Task>(1);
            let worker_tokens = token_tx.clone();
            let worker_completions = completion_tx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("tfod-worker-{}", id))
                .spawn(move || worker_loop(id, worker, task_rx, worker_completions, worker_tokens))
                .map_err(|e| PipelineError::Spawn(e.to_string()))?;

            token_tx
                .send(id)
                .map_err(|e| PipelineError::Disconnected(e.to_string()))?;
            task_txs.push(task_tx);
            handles.push(handle);
        }

        info!("👷 工作线程池启动: {} 个工作者", size);
        Ok(Self {
            task_txs,
            token_tx,
            token_rx,
            completion_rx,
            handles,
        })
    }

    pub fn size(&self) -> usize {
        self.task_txs.len()
    }

    /// 尝试取得一个空闲工作者, 不阻塞
    pub fn try_acquire(&self) -> Option<WorkerToken> {
        self.token_rx.try_recv().ok().map(WorkerToken)
    }

    /// 归还未使用的令牌
    pub fn release(&self, token: WorkerToken) {
        let _ = self.token_tx.send(token.0);
    }

    /// 把帧派发给持有令牌的工作者
    ///
    /// 失败时令牌随错误一起交还, 由调用方 `release`。
    pub fn submit(
        &self,
        token: WorkerToken,
        frame: Arc<Frame>,
        zoom: Zoom,
    ) -> std::result::Result<(), (WorkerToken, PipelineError)> {
        let Some(tx) = self.task_txs.get(token.0) else {
            let error = PipelineError::InvalidArgument(format!("unknown worker {}", token.0));
            return Err((token, error));
        };
        match tx.send(Task { frame, zoom }) {
            Ok(()) => Ok(()),
            Err(_) => {
                let error = PipelineError::Disconnected(format!("worker {} exited", token.0));
                Err((token, error))
            }
        }
    }

    /// 取出所有已完成的任务, 不阻塞
    pub fn drain_completions(&self) -> Vec<Completion> {
        self.completion_rx.try_iter().collect()
    }

    /// 关闭: 等待所有工作者空闲 (最多 `timeout`), 然后结束线程
    ///
    /// 超时则记录告警并分离线程, 返回 false。
    pub fn shutdown(self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let size = self.size();
        let mut collected = 0;
        while collected < size {
            match self.token_rx.recv_deadline(deadline) {
                Ok(_) => collected += 1,
                Err(_) => break,
            }
        }

        // 关闭任务通道, 空闲的工作者随之退出
        drop(self.task_txs);

        if collected < size {
            warn!(
                "⚠️ 关闭超时 ({:?}): {} 个工作者仍在运行, 分离线程",
                timeout,
                size - collected
            );
            return false;
        }

        for handle in self.handles {
            if handle.join().is_err() {
                warn!("⚠️ 工作线程异常退出");
            }
        }
        info!("🛑 工作线程池已关闭");
        true
    }
}

fn worker_loop(
    id: usize,
    mut worker: DetectionWorker,
    tasks: Receiver<Task>,
    completions: Sender<Completion>,
    tokens: Sender<usize>,
) {
    debug!("worker {} 启动", id);
    while let Ok(task) = tasks.recv() {
        let start = Instant::now();
        let result = worker.detect(&task.frame, task.zoom);
        let completion = Completion {
            worker_id: id,
            frame: task.frame,
            result,
            elapsed: start.elapsed(),
        };
        // 接收端已关闭时结果无人消费, 仍要归还令牌
        let _ = completions.send(completion);
        if tokens.send(id).is_err() {
            break;
        }
    }
    debug!("worker {} 退出", id);
}
