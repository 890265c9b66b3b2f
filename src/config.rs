//! 流水线参数 - 通过JSON文件调整参数
//! Pipeline parameters, loadable from a JSON file

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};

/// 默认调色板 (跟踪框显示颜色)
pub const DEFAULT_PALETTE: [[u8; 3]; 12] = [
    [0, 0, 255],     // 蓝色
    [255, 0, 0],     // 红色
    [0, 255, 0],     // 绿色
    [255, 255, 0],   // 黄色
    [0, 255, 255],   // 青色
    [255, 0, 255],   // 品红
    [255, 255, 255], // 白色
    [85, 255, 85],   // 浅绿
    [255, 165, 0],   // 橙色
    [255, 136, 136], // 粉色
    [170, 170, 255], // 浅蓝
    [255, 255, 170], // 浅黄
];

/// 流水线参数 (一个流水线实例生命周期内不可变)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParameters {
    // === 模型参数 ===
    pub input_size: u32,               // 模型输入尺寸 (正方形)
    pub is_model_quantized: bool,      // u8 输入张量
    pub is_model_tensorflow2: bool,    // TF2 SSD 输出顺序
    pub num_interpreter_threads: u32,  // 每个模型实例的推理线程数
    pub num_executor_threads: u32,     // 工作线程数 = 模型实例数
    pub max_num_detections: usize,     // 每帧最多解码的检测数
    pub min_result_confidence: f32,    // 置信度阈值

    // === 调度参数 ===
    pub timing_buffer_size: usize,     // 推理耗时滑动窗口大小
    pub shutdown_timeout_ms: u64,      // 关闭时等待工作线程的最长时间
    pub frame_poll_timeout_ms: u64,    // 拉取帧的超时 (用于响应关闭)

    // === 跟踪器参数 ===
    pub use_object_tracker: bool,
    pub tracker_max_overlap: f32,          // IOU 超过此值视为同一目标
    pub tracker_min_size: f32,             // 小于此尺寸的检测不跟踪 (像素)
    pub tracker_marginal_correlation: f32, // 新目标的最低相关度
    pub tracker_min_correlation: f32,      // 低于此相关度的跟踪被丢弃
    pub tracker_downsample: u32,           // 跟踪器亮度图的降采样倍数
    pub palette: Vec<[u8; 3]>,             // 颜色槽位

    // === 标注帧 ===
    pub annotate_frames: bool,
    pub annotation_width: u32,
}

impl Default for PipelineParameters {
    fn default() -> Self {
        Self {
            input_size: 300,
            is_model_quantized: true,
            is_model_tensorflow2: false,
            num_interpreter_threads: 1,
            num_executor_threads: 2,
            max_num_detections: 10,
            min_result_confidence: 0.4,

            timing_buffer_size: 10,
            shutdown_timeout_ms: 500,
            frame_poll_timeout_ms: 100,

            use_object_tracker: true,
            tracker_max_overlap: 0.2,
            tracker_min_size: 16.0,
            tracker_marginal_correlation: 0.75,
            tracker_min_correlation: 0.3,
            tracker_downsample: 2,
            palette: DEFAULT_PALETTE.to_vec(),

            annotate_frames: false,
            annotation_width: 640,
        }
    }
}

impl PipelineParameters {
    /// 校验参数, 配置错误立即失败
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(PipelineError::InvalidParameters(msg.to_string()));

        if self.input_size == 0 {
            return fail("input_size must be non-zero");
        }
        if self.num_interpreter_threads == 0 {
            return fail("num_interpreter_threads must be non-zero");
        }
        if self.num_executor_threads == 0 {
            return fail("num_executor_threads must be non-zero");
        }
        if self.max_num_detections == 0 {
            return fail("max_num_detections must be non-zero");
        }
        if self.timing_buffer_size == 0 {
            return fail("timing_buffer_size must be non-zero");
        }
        if self.tracker_downsample == 0 {
            return fail("tracker_downsample must be non-zero");
        }
        if self.annotation_width == 0 {
            return fail("annotation_width must be non-zero");
        }
        if self.palette.is_empty() {
            return fail("palette must contain at least one color");
        }
        if self.tracker_min_size < 0.0 {
            return fail("tracker_min_size must not be negative");
        }

        let unit = [
            ("min_result_confidence", self.min_result_confidence),
            ("tracker_max_overlap", self.tracker_max_overlap),
            ("tracker_marginal_correlation", self.tracker_marginal_correlation),
            ("tracker_min_correlation", self.tracker_min_correlation),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(PipelineError::InvalidParameters(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn frame_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_poll_timeout_ms)
    }

    /// 从JSON文件加载配置 (并校验)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        let params: Self = serde_json::from_str(&json)?;
        params.validate()?;
        info!("✅ 配置已从 {} 加载", path.as_ref().display());
        Ok(params)
    }

    /// 加载配置, 失败时使用默认值
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(params) => params,
            Err(e) => {
                warn!(
                    "⚠️  配置文件 {} 加载失败: {}, 使用默认值",
                    path.as_ref().display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        info!("💾 配置已保存到 {}", path.as_ref().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let params = PipelineParameters::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.palette.len(), 12);
        assert_eq!(params.tracker_max_overlap, 0.2);
        assert_eq!(params.tracker_min_size, 16.0);
    }

    #[test]
    fn test_validation_rejects_zero_threads() {
        let mut params = PipelineParameters::default();
        params.num_executor_threads = 0;
        assert!(matches!(
            params.validate(),
            Err(PipelineError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_validation_rejects_out_of_range_thresholds() {
        let mut params = PipelineParameters::default();
        params.tracker_min_correlation = 1.5;
        assert!(params.validate().is_err());

        let mut params = PipelineParameters::default();
        params.min_result_confidence = -0.1;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_palette() {
        let mut params = PipelineParameters::default();
        params.palette.clear();
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let params: PipelineParameters =
            serde_json::from_str(r#"{ "input_size": 320, "use_object_tracker": false }"#).unwrap();
        assert_eq!(params.input_size, 320);
        assert!(!params.use_object_tracker);
        assert_eq!(params.timing_buffer_size, 10);
    }
}
