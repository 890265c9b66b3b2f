#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 实时多线程目标检测帧流水线
//!
//! 帧来源 → 主循环 → (工作线程池异步检测 + 每帧相关跟踪) → 结果存储 → 调用方轮询
pub mod config; // 流水线参数
pub mod detection; // 检测数据结构, 检测工作者, 结果存储
pub mod error; // 错误类型
pub mod frame; // 帧缓冲与帧来源契约
pub mod models; // 推理后端接口
pub mod pipeline; // 主循环与工作线程池
pub mod region; // 变焦与裁边
pub mod tracker; // 多目标跟踪
pub mod utils; // 滑动平均, 框变换

pub use crate::config::PipelineParameters;
pub use crate::detection::{BBox, CoordinateSpace, Detection, Results, ResultsStore};
pub use crate::error::{PipelineError, Result};
pub use crate::frame::{
    AcquisitionError, CameraInfo, ChannelFrameGenerator, Frame, FrameGenerator, FrameSink,
    Rotation,
};
pub use crate::models::{ObjectDetector, RawDetection, TensorImage};
pub use crate::pipeline::{FrameManager, PipelineState};
pub use crate::region::{zoom_area, ClippingRegion, Rect, Zoom};
pub use crate::tracker::{CorrelationTracker, MultiObjectTracker, NccCorrelationTracker};
