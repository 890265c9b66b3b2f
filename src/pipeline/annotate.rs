//! 标注帧 (Annotated frame)
//!
//! 变焦区域缩放到固定宽度, 按调色板颜色画出跟踪框。

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect as PaintRect;

use crate::detection::{CoordinateSpace, Detection};
use crate::frame::{Frame, Size};
use crate::region::Zoom;
use crate::utils::BoxTransform;

/// 框线宽度 (像素)
const LINE_WIDTH: i32 = 2;

/// 未跟踪检测使用的颜色
const UNTRACKED_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

pub struct Annotator {
    palette: Vec<Rgba<u8>>,
    width: u32,
}

impl Annotator {
    pub fn new(palette: &[[u8; 3]], width: u32) -> Self {
        Self {
            palette: palette
                .iter()
                .map(|[r, g, b]| Rgba([*r, *g, *b, 255]))
                .collect(),
            width: width.max(1),
        }
    }

    /// 输出尺寸: 固定宽度, 高度按变焦区域宽高比
    pub fn output_size(&self, frame: &Frame, zoom: &Zoom) -> Size {
        let area = zoom.area(frame.width(), frame.height());
        let height = (self.width as f64 * area.height().max(1) as f64 / area.width().max(1) as f64)
            .round()
            .max(1.0) as u32;
        Size::new(self.width, height)
    }

    /// 帧空间 → 标注图空间
    pub fn frame_to_zoom(&self, frame: &Frame, zoom: &Zoom) -> BoxTransform {
        let area = zoom.area(frame.width(), frame.height());
        let size = self.output_size(frame, zoom);
        BoxTransform::scale(
            size.width as f32 / area.width().max(1) as f32,
            size.height as f32 / area.height().max(1) as f32,
        )
        .compose(&BoxTransform::translation(
            -(area.left as f32),
            -(area.top as f32),
        ))
    }

    pub fn annotate(&self, frame: &Frame, zoom: Zoom, detections: &[Detection]) -> RgbaImage {
        let size = self.output_size(frame, &zoom);
        let mut canvas = frame.display_image(size, zoom).as_ref().clone();
        let to_zoom = self.frame_to_zoom(frame, &zoom);

        for detection in detections {
            let b = detection.to_space(CoordinateSpace::Zoom, &to_zoom);
            let color = detection
                .color()
                .and_then(|c| self.palette.get(c.index()).copied())
                .unwrap_or(UNTRACKED_COLOR);

            for inset in 0..LINE_WIDTH {
                let x = b.left().round() as i32 + inset;
                let y = b.top().round() as i32 + inset;
                let w = b.width().round() as i32 - 2 * inset;
                let h = b.height().round() as i32 - 2 * inset;
                if w <= 0 || h <= 0 {
                    break;
                }
                draw_hollow_rect_mut(
                    &mut canvas,
                    PaintRect::at(x, y).of_size(w as u32, h as u32),
                    color,
                );
            }
        }
        canvas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;
    use crate::frame::CameraInfo;
    use crate::region::ClippingMargins;
    use crate::tracker::ColorSlot;

    fn frame() -> Frame {
        Frame::new(
            1,
            RgbaImage::from_pixel(640, 480, Rgba([0, 0, 0, 255])),
            CameraInfo::new(640, 480),
            &ClippingMargins::default(),
        )
    }

    #[test]
    fn test_draws_box_in_palette_color() {
        let annotator = Annotator::new(&[[255, 0, 0], [0, 255, 0]], 320);
        let f = frame();
        let detection = Detection::new(
            "obj",
            0.9,
            BBox::new(100.0, 100.0, 300.0, 200.0),
            CoordinateSpace::Frame,
            *f.camera(),
            1,
        )
        .with_color(ColorSlot(1));

        let image = annotator.annotate(&f, Zoom::default(), &[detection]);
        assert_eq!(image.dimensions(), (320, 240));
        // 缩放比例 0.5: 左上角 (50, 50)
        assert_eq!(image.get_pixel(50, 50).0, [0, 255, 0, 255]);
        assert_eq!(image.get_pixel(100, 75).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_zoom_transform() {
        let annotator = Annotator::new(&[[255, 0, 0]], 320);
        let zoom = Zoom::new(2.0, 16.0 / 9.0).unwrap();
        let t = annotator.frame_to_zoom(&frame(), &zoom);
        // 变焦区域 (160, 150)-(480, 330) → 320x180
        assert_eq!(t.transform_point(160.0, 150.0), (0.0, 0.0));
        assert_eq!(t.transform_point(480.0, 330.0), (320.0, 180.0));
    }
}
