/// 检测系统数据结构定义
/// Data structures for the detection pipeline
use std::sync::Arc;

use crate::frame::CameraInfo;
use crate::tracker::ColorSlot;
use crate::utils::BoxTransform;

// ========== 枚举类型 ==========

/// 框坐标所在的坐标空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinateSpace {
    /// 模型输入空间 [0, input_size]
    ModelInput,
    /// 原始帧像素空间
    Frame,
    /// 跟踪器亮度图空间 (降采样)
    Tracker,
    /// 变焦显示空间
    Zoom,
}

// ========== 检测框 ==========

/// 检测框 (left, top, right, bottom)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    pub fn intersection_area(&self, another: &BBox) -> f32 {
        let l = self.left.max(another.left);
        let r = self.right.min(another.right);
        let t = self.top.max(another.top);
        let b = self.bottom.min(another.bottom);
        (r - l).max(0.0) * (b - t).max(0.0)
    }

    pub fn union(&self, another: &BBox) -> f32 {
        self.area() + another.area() - self.intersection_area(another)
    }

    /// 交并比 (Intersection over Union)
    pub fn iou(&self, another: &BBox) -> f32 {
        let union = self.union(another);
        if union <= 0.0 {
            return 0.0;
        }
        self.intersection_area(another) / union
    }

    /// 变换后的新框
    pub fn transformed(&self, t: &BoxTransform) -> BBox {
        let (left, top) = t.transform_point(self.left, self.top);
        let (right, bottom) = t.transform_point(self.right, self.bottom);
        BBox::new(
            left.min(right),
            top.min(bottom),
            left.max(right),
            top.max(bottom),
        )
    }
}

// ========== 检测结果 ==========

/// 一个识别出的目标
///
/// 不可变: 换坐标空间时生成新值, 从不原地修改框。
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    label: Arc<str>,
    confidence: f32,
    bbox: BBox,
    space: CoordinateSpace,
    camera: CameraInfo,
    frame_timestamp: u64,
    color: Option<ColorSlot>,
}

impl Detection {
    pub fn new(
        label: impl Into<Arc<str>>,
        confidence: f32,
        bbox: BBox,
        space: CoordinateSpace,
        camera: CameraInfo,
        frame_timestamp: u64,
    ) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
            space,
            camera,
            frame_timestamp,
            color: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn bbox(&self) -> &BBox {
        &self.bbox
    }

    pub fn space(&self) -> CoordinateSpace {
        self.space
    }

    pub fn camera(&self) -> &CameraInfo {
        &self.camera
    }

    /// 产生该检测的帧时间戳 (纳秒)
    pub fn frame_timestamp(&self) -> u64 {
        self.frame_timestamp
    }

    /// 跟踪框的颜色槽位 (未跟踪时为 None)
    pub fn color(&self) -> Option<ColorSlot> {
        self.color
    }

    pub fn left(&self) -> f32 {
        self.bbox.left
    }

    pub fn top(&self) -> f32 {
        self.bbox.top
    }

    pub fn right(&self) -> f32 {
        self.bbox.right
    }

    pub fn bottom(&self) -> f32 {
        self.bbox.bottom
    }

    pub fn width(&self) -> f32 {
        self.bbox.width()
    }

    pub fn height(&self) -> f32 {
        self.bbox.height()
    }

    /// 换到另一个坐标空间
    pub fn to_space(&self, space: CoordinateSpace, t: &BoxTransform) -> Detection {
        Detection {
            bbox: self.bbox.transformed(t),
            space,
            ..self.clone()
        }
    }

    /// 同一空间内的新位置 (跟踪器更新位置用)
    pub fn with_bbox(&self, bbox: BBox) -> Detection {
        Detection {
            bbox,
            ..self.clone()
        }
    }

    pub fn with_color(&self, color: ColorSlot) -> Detection {
        Detection {
            color: Some(color),
            ..self.clone()
        }
    }

    /// 目标中心相对光轴的水平角度 (弧度, 右正左负)
    ///
    /// 只对帧空间的检测有意义; 焦距未知时返回 0。
    pub fn estimate_angle_to_object(&self) -> f64 {
        let focal = self.camera.horizontal_focal_length as f64;
        if focal <= 0.0 {
            return 0.0;
        }
        let (cx, _) = self.bbox.center();
        let opposite = cx as f64 - 0.5 * self.camera.width as f64;
        (opposite / focal).atan()
    }
}

// ========== 结果快照 ==========

/// 某一帧的识别结果快照 (按置信度降序)
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Results {
    timestamp: u64,
    detections: Vec<Detection>,
}

impl Results {
    pub fn new(timestamp: u64, mut detections: Vec<Detection>) -> Self {
        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Self {
            timestamp,
            detections,
        }
    }

    pub fn empty(timestamp: u64) -> Self {
        Self {
            timestamp,
            detections: Vec::new(),
        }
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
