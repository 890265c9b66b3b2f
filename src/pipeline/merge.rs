//! 识别结果合并 (Recognition merger)
//!
//! 只在主循环线程上使用。把异步完成的检测批次合并进跟踪器,
//! 或在关闭跟踪时直接作为发布列表。

use tracing::{debug, warn};

use crate::detection::Detection;
use crate::frame::Frame;
use crate::tracker::MultiObjectTracker;

pub struct RecognitionMerger {
    tracker: Option<MultiObjectTracker>,
    last_accepted: Option<u64>,
    latest_raw: Vec<Detection>,
}

impl RecognitionMerger {
    /// `tracker` 为 None 时不做跟踪, 最新一批检测原样发布
    pub fn new(tracker: Option<MultiObjectTracker>) -> Self {
        Self {
            tracker,
            last_accepted: None,
            latest_raw: Vec::new(),
        }
    }

    pub fn tracker(&self) -> Option<&MultiObjectTracker> {
        self.tracker.as_ref()
    }

    pub fn is_tracking(&self) -> bool {
        self.tracker.is_some()
    }

    /// 最近接受的批次时间戳
    pub fn last_accepted(&self) -> Option<u64> {
        self.last_accepted
    }

    pub fn on_frame(&mut self, frame: &Frame) {
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.on_frame(frame);
        }
    }

    /// 合并一批检测, 早于已接受批次的旧批次被丢弃 (返回 false)
    pub fn on_batch(&mut self, frame: &Frame, detections: Vec<Detection>) -> bool {
        let timestamp = frame.timestamp();
        if let Some(last) = self.last_accepted {
            if timestamp < last {
                warn!(
                    "⚠️ 丢弃过期检测批次: 帧 {} 早于已接受的 {}",
                    timestamp, last
                );
                return false;
            }
        }
        self.last_accepted = Some(timestamp);
        debug!("接受检测批次: 帧 {}, {} 个检测", timestamp, detections.len());

        match self.tracker.as_mut() {
            Some(tracker) => tracker.on_results_from_recognizer(&detections, frame),
            None => self.latest_raw = detections,
        }
        true
    }

    /// 当前发布列表 (帧空间)
    pub fn current(&self) -> Vec<Detection> {
        match self.tracker.as_ref() {
            Some(tracker) => tracker.tracked_detections(),
            None => self.latest_raw.clone(),
        }
    }

    /// 停用时清空状态, 颜色全部归还
    pub fn reset(&mut self) {
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.clear();
        }
        self.latest_raw.clear();
    }
}
