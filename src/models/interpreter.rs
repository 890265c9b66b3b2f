//! 解释器后端: 解码 SSD 风格的原始输出张量
//!
//! 输出为四个张量 (框 / 类别 / 分数 / 数量), 顺序取决于导出方式:
//! - TF1: boxes, classes, scores, count
//! - TF2: scores, boxes, count, classes
//!
//! 框为归一化的 `[ymin, xmin, ymax, xmax]`, 乘以输入尺寸得到模型输入空间坐标。

use ndarray::{Array4, ArrayD, Axis, Ix2};
use tracing::{debug, warn};

use super::{ObjectDetector, RawDetection, TensorImage};
use crate::detection::BBox;
use crate::error::{PipelineError, Result};

/// 输出张量布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputLayout {
    #[default]
    Tf1,
    Tf2,
}

impl OutputLayout {
    pub fn from_tensorflow2(is_tensorflow2: bool) -> Self {
        if is_tensorflow2 {
            OutputLayout::Tf2
        } else {
            OutputLayout::Tf1
        }
    }

    /// (boxes, classes, scores, count) 在输出列表中的位置
    fn indices(&self) -> (usize, usize, usize, usize) {
        match self {
            OutputLayout::Tf1 => (0, 1, 2, 3),
            OutputLayout::Tf2 => (1, 3, 0, 2),
        }
    }
}

/// 模型输入张量
#[derive(Debug, Clone)]
pub enum InputTensor {
    /// 量化模型, 原始像素
    Quantized(Array4<u8>),
    /// 浮点模型, 归一化到 [-1, 1]
    Float(Array4<f32>),
}

/// 张量推理引擎 (黑盒)
pub trait TensorEngine: Send {
    /// 运行一次推理, 返回按模型导出顺序排列的输出张量
    fn invoke(&mut self, input: &InputTensor) -> Result<Vec<ArrayD<f32>>>;
}

/// 基于原始输出张量的检测器
pub struct InterpreterDetector<E: TensorEngine> {
    engine: E,
    layout: OutputLayout,
    quantized: bool,
    max_num_detections: usize,
}

impl<E: TensorEngine> InterpreterDetector<E> {
    pub fn new(engine: E, layout: OutputLayout, quantized: bool, max_num_detections: usize) -> Self {
        Self {
            engine,
            layout,
            quantized,
            max_num_detections,
        }
    }

    fn input_tensor(&self, image: &TensorImage) -> InputTensor {
        if self.quantized {
            InputTensor::Quantized(image.to_quantized())
        } else {
            InputTensor::Float(image.to_float())
        }
    }

    /// 解码输出张量
    pub fn decode(&self, outputs: &[ArrayD<f32>], input_size: u32) -> Result<Vec<RawDetection>> {
        if outputs.len() < 4 {
            return Err(PipelineError::Inference(format!(
                "expected 4 output tensors, got {}",
                outputs.len()
            )));
        }
        let (bi, ci, si, ni) = self.layout.indices();
        let boxes = squeeze_batch(&outputs[bi])
            .into_dimensionality::<Ix2>()
            .map_err(|e| PipelineError::Inference(format!("boxes tensor: {}", e)))?;
        let classes = squeeze_batch(&outputs[ci]);
        let scores = squeeze_batch(&outputs[si]);
        let count = outputs[ni].iter().next().copied().unwrap_or(0.0).max(0.0) as usize;

        if boxes.shape()[1] != 4 {
            return Err(PipelineError::Inference(format!(
                "boxes tensor must be [N, 4], got {:?}",
                boxes.shape()
            )));
        }

        let available = boxes.shape()[0].min(classes.len()).min(scores.len());
        let n = count.min(available).min(self.max_num_detections);
        let scale = input_size as f32;

        let classes: Vec<f32> = classes.iter().copied().collect();
        let scores: Vec<f32> = scores.iter().copied().collect();
        let detections = boxes
            .axis_iter(Axis(0))
            .take(n)
            .enumerate()
            .filter_map(|(i, b)| {
                let class = classes[i];
                // 负数或非有限值不是合法的标签索引
                if !class.is_finite() || class < 0.0 {
                    warn!("⚠️ 类别值非法: {} (第 {} 个检测), 跳过", class, i);
                    return None;
                }
                let bbox = BBox::new(b[1] * scale, b[0] * scale, b[3] * scale, b[2] * scale);
                Some(RawDetection::new(class as usize, scores[i], bbox))
            })
            .collect::<Vec<_>>();

        debug!("解码 {} 个检测 (count={}, cap={})", detections.len(), count, self.max_num_detections);
        Ok(detections)
    }
}

/// 去掉前导的 batch 维
fn squeeze_batch(t: &ArrayD<f32>) -> ArrayD<f32> {
    if t.ndim() > 1 && t.shape()[0] == 1 {
        t.index_axis(Axis(0), 0).to_owned()
    } else {
        t.clone()
    }
}

impl<E: TensorEngine> ObjectDetector for InterpreterDetector<E> {
    fn detect(&mut self, image: &TensorImage) -> Result<Vec<RawDetection>> {
        let input = self.input_tensor(image);
        let outputs = self.engine.invoke(&input)?;
        self.decode(&outputs, image.size())
    }
}
