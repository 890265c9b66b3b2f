/// 推理后端统一接口 (Inference backends)
///
/// # 架构说明
///
/// 推理运行时本身是黑盒: `图像张量 → [(类别索引, 分数, 框)]`。
/// 两种后端在构造时选定, 对外都是 `ObjectDetector`:
///
/// ## 解释器后端 (Interpreter)
/// - 原始 SSD 输出张量, 由可插拔的 `TensorEngine` 产生
/// - 支持 TF1 / TF2 两种输出布局, 量化 (u8) 与浮点输入
/// - 文件: `interpreter.rs`
///
/// ## 任务视觉后端 (Task vision)
/// - 结构化的逐类别结果, 由可插拔的 `VisionTask` 产生
/// - 文件: `task_vision.rs`
///
/// 按流水线参数构造两种后端的工厂见 `factory.rs`。
pub mod factory;
pub mod interpreter;
pub mod task_vision;

pub use factory::{interpreter_factory, task_vision_factory};
pub use interpreter::{InputTensor, InterpreterDetector, OutputLayout, TensorEngine};
pub use task_vision::{Category, TaskDetection, TaskVisionDetector, VisionTask};

use image::RgbImage;
use ndarray::Array4;

use crate::detection::BBox;
use crate::error::{PipelineError, Result};

/// 模型原始输出的一条检测 (模型输入空间, [0, input_size])
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub label_index: usize,
    pub score: f32,
    pub bbox: BBox,
}

impl RawDetection {
    pub fn new(label_index: usize, score: f32, bbox: BBox) -> Self {
        Self {
            label_index,
            score,
            bbox,
        }
    }
}

/// 模型输入尺寸的 RGB 图像 (正方形, 行优先 HWC)
#[derive(Debug, Clone)]
pub struct TensorImage {
    size: u32,
    rgb: RgbImage,
}

impl TensorImage {
    pub fn new(rgb: RgbImage) -> Result<Self> {
        let (w, h) = rgb.dimensions();
        if w != h || w == 0 {
            return Err(PipelineError::Image(format!(
                "tensor image must be a non-empty square, got {}x{}",
                w, h
            )));
        }
        Ok(Self { size: w, rgb })
    }

    /// 从 RGBA 字节构造 (丢弃 Alpha 通道)
    pub fn from_rgba(size: u32, rgba: &[u8]) -> Result<Self> {
        let expected = (size * size * 4) as usize;
        if rgba.len() != expected {
            return Err(PipelineError::Image(format!(
                "expected {} RGBA bytes, got {}",
                expected,
                rgba.len()
            )));
        }
        let mut rgb_data = Vec::with_capacity((size * size * 3) as usize);
        for chunk in rgba.chunks_exact(4) {
            rgb_data.extend_from_slice(&chunk[..3]);
        }
        let rgb = RgbImage::from_raw(size, size, rgb_data)
            .ok_or_else(|| PipelineError::Image("RGB buffer size mismatch".to_string()))?;
        Self::new(rgb)
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn image(&self) -> &RgbImage {
        &self.rgb
    }

    /// 量化模型输入 [1, H, W, 3] u8
    pub fn to_quantized(&self) -> Array4<u8> {
        let s = self.size as usize;
        Array4::from_shape_fn((1, s, s, 3), |(_, y, x, c)| {
            self.rgb.get_pixel(x as u32, y as u32)[c]
        })
    }

    /// 浮点模型输入 [1, H, W, 3], 归一化到 [-1, 1]
    pub fn to_float(&self) -> Array4<f32> {
        const MEAN: f32 = 127.5;
        const STD: f32 = 127.5;
        let s = self.size as usize;
        Array4::from_shape_fn((1, s, s, 3), |(_, y, x, c)| {
            (self.rgb.get_pixel(x as u32, y as u32)[c] as f32 - MEAN) / STD
        })
    }
}

/// 目标检测能力
///
/// 每个工作线程持有一个实例, 同一实例不会被并发调用。
pub trait ObjectDetector: Send {
    /// 在模型输入尺寸的图像上检测, 框位于模型输入空间
    fn detect(&mut self, image: &TensorImage) -> Result<Vec<RawDetection>>;
}

impl<T: ObjectDetector + ?Sized> ObjectDetector for Box<T> {
    fn detect(&mut self, image: &TensorImage) -> Result<Vec<RawDetection>> {
        (**self).detect(image)
    }
}
