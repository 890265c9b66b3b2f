/// 区域配置 (Region configuration)
///
/// 两个由控制接口写入, 多个阶段读取的小型可变状态:
/// - ZoomRegion:     变焦裁剪
/// - ClippingRegion: 边距涂黑
pub mod clipping;
pub mod zoom;

pub use clipping::{ClippingMargins, ClippingRegion};
pub use zoom::{zoom_area, Rect, Zoom, ZoomRegion};
