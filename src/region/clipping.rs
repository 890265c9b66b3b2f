//! 裁边区域 (Clipping region)
//!
//! 边距以显示方向给出, 按相机旋转换算到传感器方向后再涂黑到新帧上。

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect as PaintRect;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::frame::Rotation;

/// 涂黑边距使用的颜色
pub const MASK_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// 四边像素边距
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClippingMargins {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl ClippingMargins {
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.left == 0 && self.top == 0 && self.right == 0 && self.bottom == 0
    }

    /// 显示方向 → 传感器方向
    ///
    /// `rotation` 为显示相对传感器的顺时针旋转角度。
    pub fn to_sensor(&self, rotation: Rotation) -> Self {
        match rotation {
            Rotation::Deg0 => *self,
            Rotation::Deg90 => Self::new(self.top, self.right, self.bottom, self.left),
            Rotation::Deg180 => Self::new(self.right, self.bottom, self.left, self.top),
            Rotation::Deg270 => Self::new(self.bottom, self.left, self.top, self.right),
        }
    }

    /// 将边距区域涂黑 (传感器方向)
    pub fn paint(&self, image: &mut RgbaImage) {
        let (width, height) = image.dimensions();
        let left = self.left.min(width);
        let right = self.right.min(width);
        let top = self.top.min(height);
        let bottom = self.bottom.min(height);

        // (x, y, w, h), 宽或高为 0 时跳过
        let strips = [
            (0, 0, left, height),
            (width - right, 0, right, height),
            (0, 0, width, top),
            (0, height - bottom, width, bottom),
        ];
        for (x, y, w, h) in strips {
            if w == 0 || h == 0 {
                continue;
            }
            let rect = PaintRect::at(x as i32, y as i32).of_size(w, h);
            draw_filled_rect_mut(image, rect, MASK_COLOR);
        }
    }
}

/// 裁边状态 (独立锁保护)
#[derive(Debug)]
pub struct ClippingRegion {
    rotation: Rotation,
    margins: Mutex<ClippingMargins>,
}

impl ClippingRegion {
    pub fn new(rotation: Rotation) -> Self {
        Self {
            rotation,
            margins: Mutex::new(ClippingMargins::default()),
        }
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// 设置显示方向的边距, 对之后构造的帧生效
    pub fn set(&self, left: u32, top: u32, right: u32, bottom: u32) {
        *self.margins.lock() = ClippingMargins::new(left, top, right, bottom);
    }

    pub fn display_margins(&self) -> ClippingMargins {
        *self.margins.lock()
    }

    /// 传感器方向的快照, 帧构造时使用
    pub fn sensor_margins(&self) -> ClippingMargins {
        self.display_margins().to_sensor(self.rotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_mapping() {
        let m = ClippingMargins::new(1, 2, 3, 4);
        assert_eq!(m.to_sensor(Rotation::Deg0), m);
        assert_eq!(m.to_sensor(Rotation::Deg90), ClippingMargins::new(2, 3, 4, 1));
        assert_eq!(m.to_sensor(Rotation::Deg180), ClippingMargins::new(3, 4, 1, 2));
        assert_eq!(m.to_sensor(Rotation::Deg270), ClippingMargins::new(4, 1, 2, 3));
    }

    #[test]
    fn test_full_turn_is_identity() {
        let m = ClippingMargins::new(5, 0, 7, 9);
        let back = m
            .to_sensor(Rotation::Deg90)
            .to_sensor(Rotation::Deg90)
            .to_sensor(Rotation::Deg180);
        assert_eq!(back, m);
    }

    #[test]
    fn test_paint_masks_only_margins() {
        let mut image = RgbaImage::from_pixel(10, 8, Rgba([200, 200, 200, 255]));
        ClippingMargins::new(2, 1, 0, 3).paint(&mut image);

        assert_eq!(*image.get_pixel(0, 4), MASK_COLOR);
        assert_eq!(*image.get_pixel(1, 4), MASK_COLOR);
        assert_eq!(*image.get_pixel(5, 0), MASK_COLOR);
        assert_eq!(*image.get_pixel(5, 7), MASK_COLOR);
        assert_eq!(*image.get_pixel(5, 5), MASK_COLOR);
        assert_eq!(*image.get_pixel(9, 4), Rgba([200, 200, 200, 255]));
        assert_eq!(*image.get_pixel(2, 1), Rgba([200, 200, 200, 255]));
    }

    #[test]
    fn test_oversized_margins_are_clamped() {
        let mut image = RgbaImage::from_pixel(4, 4, Rgba([1, 1, 1, 255]));
        ClippingMargins::new(100, 0, 0, 0).paint(&mut image);
        assert!(image.pixels().all(|p| *p == MASK_COLOR));
    }

    #[test]
    fn test_region_sensor_snapshot() {
        let region = ClippingRegion::new(Rotation::Deg90);
        region.set(10, 20, 30, 40);
        assert_eq!(region.display_margins(), ClippingMargins::new(10, 20, 30, 40));
        assert_eq!(region.sensor_margins(), ClippingMargins::new(20, 30, 40, 10));
    }
}
