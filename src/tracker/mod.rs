//! 多目标跟踪器 (Multi-object tracker)
//!
//! - 每帧: 相关跟踪更新位置, 丢弃相关度过低的框
//! - 每批检测: IOU 关联 / 替换 / 淘汰, 有界调色板分配颜色
//!
//! 关联是贪心的单遍扫描, 结果依赖检测的输入顺序。
//! 跟踪框的标签与置信度冻结为产生它的那次检测, 之后不再刷新。

pub mod correlation;
pub mod palette;

pub use correlation::{CorrelationTracker, NccCorrelationTracker, TrackHandle};
pub use palette::{ColorPool, ColorSlot};

use tracing::{debug, trace};

use crate::config::PipelineParameters;
use crate::detection::{BBox, CoordinateSpace, Detection};
use crate::frame::{Frame, Size};
use crate::utils::BoxTransform;

// ========== 配置 ==========

/// 跟踪器参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    pub max_overlap: f32,
    pub min_size: f32,
    pub marginal_correlation: f32,
    pub min_correlation: f32,
    pub downsample: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::from(&PipelineParameters::default())
    }
}

impl From<&PipelineParameters> for TrackerConfig {
    fn from(p: &PipelineParameters) -> Self {
        Self {
            max_overlap: p.tracker_max_overlap,
            min_size: p.tracker_min_size,
            marginal_correlation: p.tracker_marginal_correlation,
            min_correlation: p.tracker_min_correlation,
            downsample: p.tracker_downsample.max(1),
        }
    }
}

// ========== 跟踪框 ==========

/// 一个被跟踪的目标
#[derive(Debug, Clone)]
pub struct TrackedBox {
    /// 产生该跟踪的检测 (帧空间)
    detection: Detection,
    /// 当前位置 (跟踪器空间)
    position: BBox,
    color: ColorSlot,
    handle: TrackHandle,
}

impl TrackedBox {
    pub fn detection(&self) -> &Detection {
        &self.detection
    }

    pub fn color(&self) -> ColorSlot {
        self.color
    }

    pub fn handle(&self) -> TrackHandle {
        self.handle
    }

    pub fn confidence(&self) -> f32 {
        self.detection.confidence()
    }
}

/// 帧空间 ↔ 跟踪器空间
#[derive(Debug, Clone, Copy)]
struct SpaceMapping {
    size: Size,
    to_tracker: BoxTransform,
    to_frame: BoxTransform,
}

impl SpaceMapping {
    fn for_frame(width: u32, height: u32, downsample: u32) -> Self {
        let size = Size::new((width / downsample).max(1), (height / downsample).max(1));
        let to_tracker = BoxTransform::scale(
            size.width as f32 / width as f32,
            size.height as f32 / height as f32,
        );
        let to_frame = BoxTransform::scale(
            width as f32 / size.width as f32,
            height as f32 / size.height as f32,
        );
        Self {
            size,
            to_tracker,
            to_frame,
        }
    }
}

// ========== 多目标跟踪器 ==========

pub struct MultiObjectTracker {
    engine: Box<dyn CorrelationTracker>,
    config: TrackerConfig,
    boxes: Vec<TrackedBox>,
    colors: ColorPool,
    mapping: Option<SpaceMapping>,
}

impl MultiObjectTracker {
    pub fn new(
        engine: Box<dyn CorrelationTracker>,
        config: TrackerConfig,
        palette_size: usize,
    ) -> Self {
        Self {
            engine,
            config,
            boxes: Vec::new(),
            colors: ColorPool::new(palette_size),
            mapping: None,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn tracked_boxes(&self) -> &[TrackedBox] {
        &self.boxes
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn available_colors(&self) -> usize {
        self.colors.available()
    }

    pub fn palette_size(&self) -> usize {
        self.colors.capacity()
    }

    fn mapping_for(&mut self, frame: &Frame) -> SpaceMapping {
        let mapping = SpaceMapping::for_frame(frame.width(), frame.height(), self.config.downsample);
        if self.mapping.is_none() {
            self.mapping = Some(mapping);
        }
        mapping
    }

    /// 新帧: 更新所有跟踪位置, 移除相关度低于阈值的框
    pub fn on_frame(&mut self, frame: &Frame) {
        let mapping = SpaceMapping::for_frame(frame.width(), frame.height(), self.config.downsample);
        self.mapping = Some(mapping);

        let luminance = frame.luminance(mapping.size);
        self.engine.next_frame(frame.timestamp(), luminance);

        let min_correlation = self.config.min_correlation;
        let mut kept = Vec::with_capacity(self.boxes.len());
        for mut tracked in self.boxes.drain(..) {
            let correlation = self.engine.correlation(tracked.handle);
            if correlation < min_correlation {
                debug!(
                    "跟踪丢失: {} (corr {:.3} < {:.3})",
                    tracked.detection.label(),
                    correlation,
                    min_correlation
                );
                self.engine.stop(tracked.handle);
                self.colors.give_back(tracked.color);
                continue;
            }
            if let Some(position) = self.engine.position(tracked.handle) {
                tracked.position = position;
            }
            kept.push(tracked);
        }
        self.boxes = kept;
    }

    /// 一批新检测 (帧空间), `frame` 是产生这批检测的帧
    pub fn on_results_from_recognizer(&mut self, detections: &[Detection], frame: &Frame) {
        if detections.is_empty() {
            return;
        }
        let mapping = self.mapping_for(frame);
        let luminance = frame.luminance(mapping.size);

        for detection in detections {
            if detection.width() < self.config.min_size || detection.height() < self.config.min_size
            {
                trace!(
                    "检测过小, 不跟踪: {} {:.0}x{:.0}",
                    detection.label(),
                    detection.width(),
                    detection.height()
                );
                continue;
            }
            let tracker_space = detection.to_space(CoordinateSpace::Tracker, &mapping.to_tracker);
            self.handle_detection(detection, tracker_space.bbox(), frame.timestamp(), &luminance);
        }
    }

    fn handle_detection(
        &mut self,
        detection: &Detection,
        bbox: &BBox,
        timestamp: u64,
        luminance: &image::GrayImage,
    ) {
        let to_frame = self.current_to_frame();
        let candidate = self.engine.track(bbox, timestamp, luminance);

        // 1. 相关度不足
        let correlation = self.engine.correlation(candidate);
        if correlation < self.config.marginal_correlation {
            trace!(
                "候选相关度不足: {} ({:.3})",
                detection.label(),
                correlation
            );
            self.engine.stop(candidate);
            return;
        }
        let candidate_position = self.engine.position(candidate).unwrap_or(*bbox);
        let candidate_frame = candidate_position.transformed(&to_frame);

        // 2. 与已跟踪框的重叠
        let mut remove: Vec<usize> = Vec::new();
        let mut donor: Option<usize> = None;
        let mut max_overlap = 0.0f32;
        for (i, tracked) in self.boxes.iter().enumerate() {
            let overlap = tracked.position.transformed(&to_frame).iou(&candidate_frame);
            if overlap <= self.config.max_overlap {
                continue;
            }
            if detection.confidence() < tracked.confidence()
                && self.engine.correlation(tracked.handle) > self.config.marginal_correlation
            {
                debug!(
                    "候选被已有跟踪压制: {} {:.2} < {} {:.2}",
                    detection.label(),
                    detection.confidence(),
                    tracked.detection.label(),
                    tracked.confidence()
                );
                self.engine.stop(candidate);
                return;
            }
            remove.push(i);
            if overlap > max_overlap {
                max_overlap = overlap;
                donor = Some(i);
            }
        }

        // 3. 没有空闲颜色也没有可替换的: 淘汰置信度最低且低于候选的框
        if !self.colors.has_available() && remove.is_empty() {
            for (i, tracked) in self.boxes.iter().enumerate() {
                if tracked.confidence() < detection.confidence()
                    && donor.map_or(true, |d| tracked.confidence() < self.boxes[d].confidence())
                {
                    donor = Some(i);
                }
            }
            if let Some(d) = donor {
                remove.push(d);
            }
        }

        // 4. 无颜色可用
        if donor.is_none() && !self.colors.has_available() {
            trace!("调色板耗尽, 丢弃候选 {}", detection.label());
            self.engine.stop(candidate);
            return;
        }

        // 5. 移除被替换的框, 捐赠者的颜色直接转给新框
        let mut donated = None;
        remove.sort_unstable();
        for &i in remove.iter().rev() {
            let removed = self.boxes.remove(i);
            self.engine.stop(removed.handle);
            if Some(i) == donor {
                donated = Some(removed.color);
            } else {
                self.colors.give_back(removed.color);
            }
        }

        let Some(color) = donated.or_else(|| self.colors.take()) else {
            self.engine.stop(candidate);
            return;
        };
        debug!(
            "开始跟踪: {} {:.2} 颜色 {} (替换 {} 个)",
            detection.label(),
            detection.confidence(),
            color.index(),
            remove.len()
        );
        self.boxes.push(TrackedBox {
            detection: detection.clone(),
            position: candidate_position,
            color,
            handle: candidate,
        });
    }

    fn current_to_frame(&self) -> BoxTransform {
        self.mapping
            .map(|m| m.to_frame)
            .unwrap_or_else(BoxTransform::identity)
    }

    /// 当前所有跟踪框 (帧空间), 标签和置信度来自原始检测
    pub fn tracked_detections(&self) -> Vec<Detection> {
        let to_frame = self.current_to_frame();
        self.boxes
            .iter()
            .map(|t| {
                t.detection
                    .with_bbox(t.position.transformed(&to_frame))
                    .with_color(t.color)
            })
            .collect()
    }

    /// 停止所有跟踪, 颜色全部归还
    pub fn clear(&mut self) {
        for tracked in self.boxes.drain(..) {
            self.engine.stop(tracked.handle);
            self.colors.give_back(tracked.color);
        }
    }
}
