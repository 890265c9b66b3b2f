/// 工具模块
/// Utility modules
pub mod rolling_average;
pub mod transform;

pub use rolling_average::RollingAverage;
pub use transform::BoxTransform;

/// 浮点比较容差, 决定派生格式缓存是否失效
pub const EPSILON: f64 = 1e-4;

/// 在 1e-4 容差内比较两个浮点数
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}
