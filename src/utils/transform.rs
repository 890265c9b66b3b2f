/// 坐标空间变换工具
/// 轴对齐的缩放 + 平移, 用于 模型输入 / 帧 / 跟踪器 / 变焦 空间之间的框坐标换算
///
/// | sx  0  dx |
/// |  0 sy  dy |
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxTransform {
    pub sx: f32,
    pub sy: f32,
    pub dx: f32,
    pub dy: f32,
}

impl BoxTransform {
    /// 单位变换
    pub fn identity() -> Self {
        Self {
            sx: 1.0,
            sy: 1.0,
            dx: 0.0,
            dy: 0.0,
        }
    }

    /// 平移
    pub fn translation(dx: f32, dy: f32) -> Self {
        Self {
            dx,
            dy,
            ..Self::identity()
        }
    }

    /// 缩放
    pub fn scale(sx: f32, sy: f32) -> Self {
        Self {
            sx,
            sy,
            ..Self::identity()
        }
    }

    /// 把 [0,src_w]x[0,src_h] 映射到目标矩形
    pub fn rect_to_rect(
        src_w: f32,
        src_h: f32,
        dst_left: f32,
        dst_top: f32,
        dst_w: f32,
        dst_h: f32,
    ) -> Self {
        Self::translation(dst_left, dst_top).compose(&Self::scale(dst_w / src_w, dst_h / src_h))
    }

    /// 应用到点 (x, y)
    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        (self.sx * x + self.dx, self.sy * y + self.dy)
    }

    /// 变换组合 (self * other): 先应用 other, 再应用 self
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            sx: self.sx * other.sx,
            sy: self.sy * other.sy,
            dx: self.sx * other.dx + self.dx,
            dy: self.sy * other.dy + self.dy,
        }
    }
}

impl Default for BoxTransform {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transform() {
        let t = BoxTransform::identity();
        assert_eq!(t.transform_point(10.0, 20.0), (10.0, 20.0));
    }

    #[test]
    fn test_compose_order() {
        // 先缩放 2 倍, 再平移 (5, 10)
        let t = BoxTransform::translation(5.0, 10.0).compose(&BoxTransform::scale(2.0, 2.0));
        assert_eq!(t.transform_point(10.0, 20.0), (25.0, 50.0));
    }

    #[test]
    fn test_rect_to_rect() {
        let t = BoxTransform::rect_to_rect(300.0, 300.0, 160.0, 150.0, 320.0, 180.0);
        assert_eq!(t.transform_point(0.0, 0.0), (160.0, 150.0));
        assert_eq!(t.transform_point(300.0, 300.0), (480.0, 330.0));
    }
}
