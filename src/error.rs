//! 错误类型 (Error types)
//!
//! 配置错误立即失败, 运行期错误只记录日志, 不让流水线崩溃。

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// 非法参数 (变焦倍率 < 1.0, 宽高比 <= 0 等)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 相机旋转角度只允许 0/90/180/270
    #[error("Invalid rotation: {0} (expected 0, 90, 180 or 270)")]
    InvalidRotation(u32),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to spawn thread: {0}")]
    Spawn(String),

    /// 流水线已关闭 (终态)
    #[error("Pipeline has been shut down")]
    Shutdown,

    #[error("Channel disconnected: {0}")]
    Disconnected(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
