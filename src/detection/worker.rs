//! 检测工作者 (Detection worker)
//!
//! 一个模型实例: 帧 + 变焦 → 帧空间的带标签检测。
//! 同一实例由工作令牌保证不会被并发调用。

use std::sync::Arc;
use std::time::Instant;

use fast_image_resize as fr;
use tracing::{debug, warn};

use super::types::{CoordinateSpace, Detection};
use crate::error::{PipelineError, Result};
use crate::frame::Frame;
use crate::models::{ObjectDetector, TensorImage};
use crate::region::{Rect, Zoom};
use crate::utils::BoxTransform;

pub struct DetectionWorker {
    id: usize,
    detector: Box<dyn ObjectDetector>,
    labels: Arc<[String]>,
    input_size: u32,
    min_confidence: f32,
    resizer: fr::Resizer,
}

impl DetectionWorker {
    pub fn new(
        id: usize,
        detector: Box<dyn ObjectDetector>,
        labels: Arc<[String]>,
        input_size: u32,
        min_confidence: f32,
    ) -> Self {
        Self {
            id,
            detector,
            labels,
            input_size,
            min_confidence,
            resizer: fr::Resizer::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// 检测一帧, 返回帧像素空间的检测
    pub fn detect(&mut self, frame: &Frame, zoom: Zoom) -> Result<Vec<Detection>> {
        let t0 = Instant::now();

        // 1. 构造模型输入 (变焦时先裁剪)
        let area = zoom.area(frame.width(), frame.height());
        let tensor = self.build_tensor(frame, &area, zoom.is_zoomed())?;
        let resize_ms = t0.elapsed().as_secs_f64() * 1000.0;

        // 2. 推理
        let t1 = Instant::now();
        let raw = self.detector.detect(&tensor)?;
        let inference_ms = t1.elapsed().as_secs_f64() * 1000.0;

        // 3. 过滤 + 4. 模型空间 → 帧空间
        let size = self.input_size as f32;
        let to_frame = BoxTransform::rect_to_rect(
            size,
            size,
            area.left as f32,
            area.top as f32,
            area.width() as f32,
            area.height() as f32,
        );

        let mut detections = Vec::with_capacity(raw.len());
        for r in raw {
            if r.score < self.min_confidence {
                continue;
            }
            let Some(label) = self.labels.get(r.label_index) else {
                warn!(
                    "⚠️ worker {} 标签索引越界: {} (共 {} 个标签), 跳过",
                    self.id,
                    r.label_index,
                    self.labels.len()
                );
                continue;
            };
            let model_space = Detection::new(
                label.as_str(),
                r.score,
                r.bbox,
                CoordinateSpace::ModelInput,
                *frame.camera(),
                frame.timestamp(),
            );
            detections.push(model_space.to_space(CoordinateSpace::Frame, &to_frame));
        }

        debug!(
            "worker {} 帧 {}: {} 个检测 | 缩放 {:.1}ms 推理 {:.1}ms",
            self.id,
            frame.timestamp(),
            detections.len(),
            resize_ms,
            inference_ms
        );
        Ok(detections)
    }

    /// 缩放到模型输入尺寸 (fast_image_resize, 可带裁剪)
    fn build_tensor(&mut self, frame: &Frame, area: &Rect, zoomed: bool) -> Result<TensorImage> {
        let src = fr::images::ImageRef::new(
            frame.width(),
            frame.height(),
            frame.image().as_raw(),
            fr::PixelType::U8x4,
        )
        .map_err(|e| PipelineError::Image(format!("source image: {:?}", e)))?;

        let mut dst = fr::images::Image::new(self.input_size, self.input_size, fr::PixelType::U8x4);

        let mut options = fr::ResizeOptions::new()
            .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear));
        if zoomed && !area.is_empty() {
            options = options.crop(
                area.left as f64,
                area.top as f64,
                area.width() as f64,
                area.height() as f64,
            );
        }

        self.resizer
            .resize(&src, &mut dst, &options)
            .map_err(|e| PipelineError::Image(format!("resize: {:?}", e)))?;

        TensorImage::from_rgba(self.input_size, dst.buffer())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;
    use crate::frame::CameraInfo;
    use crate::models::{InputTensor, InterpreterDetector, OutputLayout, RawDetection, TensorEngine};
    use crate::region::ClippingMargins;
    use image::{Rgba, RgbaImage};
    use ndarray::{arr1, arr2, arr3, ArrayD};

    struct FixedDetector(Vec<RawDetection>);

    impl ObjectDetector for FixedDetector {
        fn detect(&mut self, image: &TensorImage) -> Result<Vec<RawDetection>> {
            assert_eq!(image.size(), 100);
            Ok(self.0.clone())
        }
    }

    fn labels() -> Arc<[String]> {
        vec!["duck".to_string(), "cube".to_string()].into()
    }

    fn frame(width: u32, height: u32) -> Frame {
        Frame::new(
            9,
            RgbaImage::from_pixel(width, height, Rgba([50, 60, 70, 255])),
            CameraInfo::new(width, height),
            &ClippingMargins::default(),
        )
    }

    #[test]
    fn test_filters_and_scales_to_frame() {
        let detector = FixedDetector(vec![
            RawDetection::new(1, 0.9, BBox::new(10.0, 20.0, 50.0, 60.0)),
            RawDetection::new(0, 0.2, BBox::new(0.0, 0.0, 10.0, 10.0)),
            RawDetection::new(7, 0.95, BBox::new(0.0, 0.0, 10.0, 10.0)),
        ]);
        let mut worker = DetectionWorker::new(0, Box::new(detector), labels(), 100, 0.4);
        let dets = worker.detect(&frame(200, 100), Zoom::default()).unwrap();

        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].label(), "cube");
        assert_eq!(dets[0].space(), CoordinateSpace::Frame);
        assert_eq!(dets[0].frame_timestamp(), 9);
        assert_eq!(dets[0].bbox(), &BBox::new(20.0, 20.0, 100.0, 60.0));
    }

    #[test]
    fn test_zoomed_boxes_offset_by_crop() {
        let detector = FixedDetector(vec![RawDetection::new(
            0,
            0.8,
            BBox::new(0.0, 0.0, 100.0, 100.0),
        )]);
        let mut worker = DetectionWorker::new(1, Box::new(detector), labels(), 100, 0.4);
        let zoom = Zoom::new(2.0, 16.0 / 9.0).unwrap();
        let dets = worker.detect(&frame(640, 480), zoom).unwrap();
        // 裁剪区域 (160, 150)-(480, 330)
        assert_eq!(dets[0].bbox(), &BBox::new(160.0, 150.0, 480.0, 330.0));
    }

    /// 单个检测, 类别值为 -1
    struct NegativeClassEngine;

    impl TensorEngine for NegativeClassEngine {
        fn invoke(&mut self, _input: &InputTensor) -> Result<Vec<ArrayD<f32>>> {
            Ok(vec![
                arr3(&[[[0.0, 0.0, 0.5, 0.5]]]).into_dyn(),
                arr2(&[[-1.0]]).into_dyn(),
                arr2(&[[0.9]]).into_dyn(),
                arr1(&[1.0]).into_dyn(),
            ])
        }
    }

    #[test]
    fn test_negative_class_index_is_not_labeled() {
        let detector = InterpreterDetector::new(NegativeClassEngine, OutputLayout::Tf1, true, 10);
        let duck_only: Arc<[String]> = vec!["duck".to_string()].into();
        let mut worker = DetectionWorker::new(0, Box::new(detector), duck_only, 100, 0.4);
        let dets = worker.detect(&frame(200, 100), Zoom::default()).unwrap();
        assert!(dets.is_empty());
    }
}
