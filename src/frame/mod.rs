/// 帧缓冲 (Frame buffer)
///
/// 每帧图像 + 惰性计算并缓存的派生格式:
/// - 亮度图 (给跟踪器)
/// - 变焦区域的 RGBA/ARGB 图 (给显示)
///
/// 每种派生格式有独立的锁, 请求不同格式的线程互不阻塞。
pub mod generator;

pub use generator::{AcquisitionError, ChannelFrameGenerator, FrameGenerator, FrameSink};

use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbaImage};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PipelineError;
use crate::region::{ClippingMargins, Zoom};

// ========== 相机元数据 ==========

/// 显示相对传感器的顺时针旋转
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

impl TryFrom<u32> for Rotation {
    type Error = PipelineError;

    fn try_from(degrees: u32) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(PipelineError::InvalidRotation(other)),
        }
    }
}

/// 相机信息 (帧来源提供)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    pub horizontal_focal_length: f32, // 像素
    pub vertical_focal_length: f32,   // 像素
}

impl CameraInfo {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rotation: Rotation::Deg0,
            // 约 60° 水平视场
            horizontal_focal_length: width as f32 * 0.866,
            vertical_focal_length: width as f32 * 0.866,
        }
    }
}

/// 派生格式尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

// ========== 帧 ==========

struct CachedLuminance {
    size: Size,
    image: Arc<GrayImage>,
}

struct CachedDisplay {
    size: Size,
    zoom: Zoom,
    image: Arc<RgbaImage>,
}

/// 单帧图像
///
/// 构造后不可变 (派生缓存除外), 以 `Arc<Frame>` 在流水线各阶段间共享。
pub struct Frame {
    timestamp_ns: u64,
    camera: CameraInfo,
    image: RgbaImage,
    luminance: Mutex<Option<CachedLuminance>>,
    display: Mutex<Option<CachedDisplay>>,
}

impl Frame {
    /// 从原始 RGBA 像素构造, 立即涂黑裁边区域
    ///
    /// `margins` 必须已经换算到传感器方向。
    ///
    /// # Panics
    /// 空图像是编程错误
    pub fn new(
        timestamp_ns: u64,
        mut image: RgbaImage,
        camera: CameraInfo,
        margins: &ClippingMargins,
    ) -> Self {
        assert!(
            image.width() > 0 && image.height() > 0,
            "frame must not be empty"
        );
        if !margins.is_empty() {
            margins.paint(&mut image);
        }
        Self {
            timestamp_ns,
            camera,
            image,
            luminance: Mutex::new(None),
            display: Mutex::new(None),
        }
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp_ns
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn camera(&self) -> &CameraInfo {
        &self.camera
    }

    /// 原始 (已裁边) RGBA 图像
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// 指定尺寸的亮度图, 首次调用时计算并缓存
    ///
    /// 缓存只保存一组参数: 换参数会覆盖缓存并告警。
    pub fn luminance(&self, size: Size) -> Arc<GrayImage> {
        assert!(
            size.width > 0 && size.height > 0,
            "luminance size must be positive"
        );

        let mut cache = self.luminance.lock();
        if let Some(cached) = cache.as_ref() {
            if cached.size == size {
                return Arc::clone(&cached.image);
            }
            warn!(
                "⚠️ 帧 {} 的亮度缓存尺寸从 {:?} 改为 {:?}, 同一帧不应以多种尺寸读取",
                self.timestamp_ns, cached.size, size
            );
        }

        let gray = imageops::grayscale(&self.image);
        let gray = if gray.dimensions() == (size.width, size.height) {
            gray
        } else {
            imageops::resize(&gray, size.width, size.height, FilterType::Triangle)
        };
        let image = Arc::new(gray);
        *cache = Some(CachedLuminance {
            size,
            image: Arc::clone(&image),
        });
        image
    }

    /// 变焦区域缩放到指定尺寸的 RGBA 图, 首次调用时计算并缓存
    pub fn display_image(&self, size: Size, zoom: Zoom) -> Arc<RgbaImage> {
        assert!(
            size.width > 0 && size.height > 0,
            "display size must be positive"
        );

        let mut cache = self.display.lock();
        if let Some(cached) = cache.as_ref() {
            if cached.size == size && cached.zoom.approx_eq(&zoom) {
                return Arc::clone(&cached.image);
            }
            warn!(
                "⚠️ 帧 {} 的显示缓存参数改变 ({:?}/{:?} → {:?}/{:?})",
                self.timestamp_ns, cached.size, cached.zoom, size, zoom
            );
        }

        let area = zoom.area(self.width(), self.height());
        let cropped = imageops::crop_imm(
            &self.image,
            area.left as u32,
            area.top as u32,
            area.width().max(1) as u32,
            area.height().max(1) as u32,
        )
        .to_image();
        let scaled = if cropped.dimensions() == (size.width, size.height) {
            cropped
        } else {
            imageops::resize(&cropped, size.width, size.height, FilterType::Triangle)
        };
        let image = Arc::new(scaled);
        *cache = Some(CachedDisplay {
            size,
            zoom,
            image: Arc::clone(&image),
        });
        image
    }

    /// 变焦区域的 ARGB 像素 (0xAARRGGBB)
    pub fn argb(&self, size: Size, zoom: Zoom) -> Vec<u32> {
        self.display_image(size, zoom)
            .pixels()
            .map(|p| {
                let [r, g, b, a] = p.0;
                (a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32
            })
            .collect()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("timestamp_ns", &self.timestamp_ns)
            .field("width", &self.width())
            .field("height", &self.height())
            .field("rotation", &self.camera.rotation)
            .finish()
    }
}
