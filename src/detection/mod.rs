/// 检测系统 (Detection System)
///
/// - types:   检测框 / 坐标空间 / 检测结果
/// - worker:  单个模型实例的检测流程
/// - results: 最新结果的线程安全存储
pub mod results;
pub mod types;
pub mod worker;

pub use results::ResultsStore;
pub use types::{BBox, CoordinateSpace, Detection, Results};
pub use worker::DetectionWorker;
