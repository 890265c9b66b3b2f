//! 相关跟踪能力 (Correlation tracking capability)
//!
//! 多目标跟踪器只依赖 `CorrelationTracker` trait;
//! 内置的 `NccCorrelationTracker` 用归一化互相关在亮度图上做局部搜索。

use std::collections::HashMap;
use std::sync::Arc;

use image::GrayImage;
use tracing::trace;

use crate::detection::BBox;

/// 跟踪句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackHandle(pub u64);

/// 相关跟踪引擎
///
/// 所有坐标都在跟踪器亮度图空间内。
pub trait CorrelationTracker: Send {
    /// 送入新一帧亮度图, 更新所有跟踪的位置与相关度
    fn next_frame(&mut self, timestamp: u64, luminance: Arc<GrayImage>);

    /// 在 `timestamp` 那一帧的 `bbox` 处开始跟踪, `luminance` 是该帧的亮度图
    fn track(&mut self, bbox: &BBox, timestamp: u64, luminance: &GrayImage) -> TrackHandle;

    /// 当前相关度 (未知句柄为 0)
    fn correlation(&self, handle: TrackHandle) -> f32;

    /// 当前位置
    fn position(&self, handle: TrackHandle) -> Option<BBox>;

    /// 停止跟踪, 释放资源
    fn stop(&mut self, handle: TrackHandle);
}

impl<T: CorrelationTracker + ?Sized> CorrelationTracker for Box<T> {
    fn next_frame(&mut self, timestamp: u64, luminance: Arc<GrayImage>) {
        (**self).next_frame(timestamp, luminance)
    }

    fn track(&mut self, bbox: &BBox, timestamp: u64, luminance: &GrayImage) -> TrackHandle {
        (**self).track(bbox, timestamp, luminance)
    }

    fn correlation(&self, handle: TrackHandle) -> f32 {
        (**self).correlation(handle)
    }

    fn position(&self, handle: TrackHandle) -> Option<BBox> {
        (**self).position(handle)
    }

    fn stop(&mut self, handle: TrackHandle) {
        (**self).stop(handle)
    }
}

// ========== 归一化互相关引擎 ==========

/// 模板采样网格边长
const GRID: usize = 16;
/// 搜索步长 (像素)
const SEARCH_STEP: i32 = 1;

struct NccTrack {
    bbox: BBox,
    template: Vec<f32>,
    correlation: f32,
}

/// 基于归一化互相关 (NCC) 的简单跟踪引擎
pub struct NccCorrelationTracker {
    tracks: HashMap<TrackHandle, NccTrack>,
    latest: Option<Arc<GrayImage>>,
    latest_timestamp: u64,
    next_id: u64,
}

impl Default for NccCorrelationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl NccCorrelationTracker {
    pub fn new() -> Self {
        Self {
            tracks: HashMap::new(),
            latest: None,
            latest_timestamp: 0,
            next_id: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// 搜索半径: 框较长边的 1/4, 限制在 [2, 12] 像素
    fn search_radius(bbox: &BBox) -> i32 {
        ((bbox.width().max(bbox.height()) / 4.0) as i32).clamp(2, 12)
    }

    /// 在 `image` 中以 `bbox` 为中心局部搜索最佳匹配
    fn search(&self, image: &GrayImage, bbox: &BBox, template: &[f32]) -> (BBox, f32) {
        let radius = Self::search_radius(bbox);
        let mut best = (*bbox, f32::MIN);
        let mut dy = -radius;
        while dy <= radius {
            let mut dx = -radius;
            while dx <= radius {
                let candidate = BBox::new(
                    bbox.left + dx as f32,
                    bbox.top + dy as f32,
                    bbox.right + dx as f32,
                    bbox.bottom + dy as f32,
                );
                let score = ncc(template, &sample_grid(image, &candidate));
                if score > best.1 {
                    best = (candidate, score);
                }
                dx += SEARCH_STEP;
            }
            dy += SEARCH_STEP;
        }
        (best.0, best.1.max(0.0))
    }
}

impl CorrelationTracker for NccCorrelationTracker {
    fn next_frame(&mut self, timestamp: u64, luminance: Arc<GrayImage>) {
        let handles: Vec<TrackHandle> = self.tracks.keys().copied().collect();
        for handle in handles {
            let Some(track) = self.tracks.get(&handle) else {
                continue;
            };
            let (bbox, correlation) = self.search(&luminance, &track.bbox, &track.template);
            if let Some(track) = self.tracks.get_mut(&handle) {
                track.bbox = bbox;
                track.correlation = correlation;
            }
            trace!("track {:?} @ {}: corr {:.3}", handle, timestamp, correlation);
        }
        self.latest = Some(luminance);
        self.latest_timestamp = timestamp;
    }

    fn track(&mut self, bbox: &BBox, timestamp: u64, luminance: &GrayImage) -> TrackHandle {
        let template = sample_grid(luminance, bbox);
        let (position, correlation) = match self.latest.as_ref() {
            // 检测帧早于最新帧: 在最新帧中找回目标
            Some(latest) if timestamp < self.latest_timestamp => {
                self.search(latest, bbox, &template)
            }
            _ => (*bbox, ncc(&template, &template).max(0.0)),
        };

        let handle = TrackHandle(self.next_id);
        self.next_id += 1;
        self.tracks.insert(
            handle,
            NccTrack {
                bbox: position,
                template,
                correlation,
            },
        );
        handle
    }

    fn correlation(&self, handle: TrackHandle) -> f32 {
        self.tracks.get(&handle).map_or(0.0, |t| t.correlation)
    }

    fn position(&self, handle: TrackHandle) -> Option<BBox> {
        self.tracks.get(&handle).map(|t| t.bbox)
    }

    fn stop(&mut self, handle: TrackHandle) {
        self.tracks.remove(&handle);
    }
}

/// 在框内均匀采样 GRID x GRID 个亮度值 (越界坐标截断到图像边缘)
fn sample_grid(image: &GrayImage, bbox: &BBox) -> Vec<f32> {
    let (w, h) = image.dimensions();
    let max_x = w.saturating_sub(1) as f32;
    let max_y = h.saturating_sub(1) as f32;
    let step_x = bbox.width() / GRID as f32;
    let step_y = bbox.height() / GRID as f32;

    let mut samples = Vec::with_capacity(GRID * GRID);
    for gy in 0..GRID {
        let y = (bbox.top + (gy as f32 + 0.5) * step_y).clamp(0.0, max_y) as u32;
        for gx in 0..GRID {
            let x = (bbox.left + (gx as f32 + 0.5) * step_x).clamp(0.0, max_x) as u32;
            samples.push(image.get_pixel(x, y)[0] as f32);
        }
    }
    samples
}

/// 归一化互相关, 任一方无纹理时为 0
fn ncc(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let mean_a = a[..n].iter().sum::<f32>() / n as f32;
    let mean_b = b[..n].iter().sum::<f32>() / n as f32;

    let (mut cov, mut var_a, mut var_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a[..n].iter().zip(&b[..n]) {
        let da = x - mean_a;
        let db = y - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    let denom = (var_a * var_b).sqrt();
    if denom < 1e-6 {
        return 0.0;
    }
    (cov / denom).clamp(-1.0, 1.0)
}
