//! 集成测试共用的替身实现
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use image::{GrayImage, RgbaImage};
use parking_lot::Mutex;

use tfod_rs::detection::BBox;
use tfod_rs::models::{ObjectDetector, RawDetection, TensorImage};
use tfod_rs::region::ClippingMargins;
use tfod_rs::tracker::{CorrelationTracker, TrackHandle};
use tfod_rs::{CameraInfo, CoordinateSpace, Detection, Frame};

/// 相关度由外部控制, 位置保持为开始跟踪时的框
pub struct ControlledEngine {
    correlation: Arc<Mutex<f32>>,
    boxes: HashMap<TrackHandle, BBox>,
    next: u64,
}

impl ControlledEngine {
    pub fn new(correlation: f32) -> (Self, Arc<Mutex<f32>>) {
        let shared = Arc::new(Mutex::new(correlation));
        (
            Self {
                correlation: Arc::clone(&shared),
                boxes: HashMap::new(),
                next: 0,
            },
            shared,
        )
    }
}

impl CorrelationTracker for ControlledEngine {
    fn next_frame(&mut self, _timestamp: u64, _luminance: Arc<GrayImage>) {}

    fn track(&mut self, bbox: &BBox, _timestamp: u64, _luminance: &GrayImage) -> TrackHandle {
        let handle = TrackHandle(self.next);
        self.next += 1;
        self.boxes.insert(handle, *bbox);
        handle
    }

    fn correlation(&self, handle: TrackHandle) -> f32 {
        if self.boxes.contains_key(&handle) {
            *self.correlation.lock()
        } else {
            0.0
        }
    }

    fn position(&self, handle: TrackHandle) -> Option<BBox> {
        self.boxes.get(&handle).copied()
    }

    fn stop(&mut self, handle: TrackHandle) {
        self.boxes.remove(&handle);
    }
}

/// 按顺序返回预先排好的检测批次, 用完后返回 `fallback` (默认为空)
#[derive(Clone, Default)]
pub struct ScriptedDetector {
    batches: Arc<Mutex<VecDeque<Vec<RawDetection>>>>,
    fallback: Arc<Mutex<Vec<RawDetection>>>,
}

impl ScriptedDetector {
    pub fn push(&self, batch: Vec<RawDetection>) {
        self.batches.lock().push_back(batch);
    }

    /// 队列为空后每次都返回这一批
    pub fn repeat(&self, batch: Vec<RawDetection>) {
        *self.fallback.lock() = batch;
    }
}

impl ObjectDetector for ScriptedDetector {
    fn detect(&mut self, _image: &TensorImage) -> tfod_rs::Result<Vec<RawDetection>> {
        let next = self.batches.lock().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.lock().clone()))
    }
}

pub const FRAME_SIZE: u32 = 320;

pub fn camera() -> CameraInfo {
    CameraInfo::new(FRAME_SIZE, FRAME_SIZE)
}

pub fn frame(timestamp: u64) -> Frame {
    Frame::new(
        timestamp,
        RgbaImage::new(FRAME_SIZE, FRAME_SIZE),
        camera(),
        &ClippingMargins::default(),
    )
}

/// 100x100 的帧空间检测, 左上角 (x, y)
pub fn detection_at(x: f32, y: f32, confidence: f32) -> Detection {
    Detection::new(
        "obj",
        confidence,
        BBox::new(x, y, x + 100.0, y + 100.0),
        CoordinateSpace::Frame,
        camera(),
        1,
    )
}
