//! 变焦区域 (Zoom region)
//!
//! 根据放大倍率和宽高比计算居中裁剪矩形, 同时用作显示区域和检测输入区域。

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::utils::{approx_eq, EPSILON};

/// 整数像素矩形 (left/top 包含, right/bottom 不包含)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// 整帧矩形
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// 与帧边界求交
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        Self::new(
            self.left.clamp(0, width as i32),
            self.top.clamp(0, height as i32),
            self.right.clamp(0, width as i32),
            self.bottom.clamp(0, height as i32),
        )
    }
}

/// 变焦参数: 倍率 >= 1.0, 宽高比 > 0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Zoom {
    pub magnification: f64,
    pub aspect_ratio: f64,
}

impl Zoom {
    pub fn new(magnification: f64, aspect_ratio: f64) -> Result<Self> {
        validate(magnification, aspect_ratio)?;
        Ok(Self {
            magnification,
            aspect_ratio,
        })
    }

    /// 倍率不为 ~1.0 时才裁剪
    pub fn is_zoomed(&self) -> bool {
        !approx_eq(self.magnification, 1.0)
    }

    /// 容差比较, 用于判断缓存是否过期
    pub fn approx_eq(&self, other: &Zoom) -> bool {
        approx_eq(self.magnification, other.magnification)
            && approx_eq(self.aspect_ratio, other.aspect_ratio)
    }

    /// 该变焦在给定帧上的裁剪区域 (已与帧边界求交)
    pub fn area(&self, frame_width: u32, frame_height: u32) -> Rect {
        if !self.is_zoomed() {
            return Rect::full(frame_width, frame_height);
        }
        zoom_area(
            self.magnification,
            self.aspect_ratio,
            frame_width,
            frame_height,
        )
        .map(|r| r.clamp_to(frame_width, frame_height))
        .unwrap_or_else(|_| Rect::full(frame_width, frame_height))
    }
}

impl Default for Zoom {
    fn default() -> Self {
        Self {
            magnification: 1.0,
            aspect_ratio: 16.0 / 9.0,
        }
    }
}

/// 校验变焦参数
pub fn validate(magnification: f64, aspect_ratio: f64) -> Result<()> {
    if !magnification.is_finite() || magnification < 1.0 - EPSILON {
        return Err(PipelineError::InvalidArgument(format!(
            "magnification must be >= 1.0, got {}",
            magnification
        )));
    }
    if !aspect_ratio.is_finite() || aspect_ratio <= 0.0 {
        return Err(PipelineError::InvalidArgument(format!(
            "aspect ratio must be > 0, got {}",
            aspect_ratio
        )));
    }
    Ok(())
}

/// 计算居中裁剪矩形
///
/// `center_w = frame_w / magnification`, `center_h = center_w / aspect_ratio`,
/// 左上角居中后四舍五入。倍率 ~1.0 时返回整帧。
pub fn zoom_area(
    magnification: f64,
    aspect_ratio: f64,
    frame_width: u32,
    frame_height: u32,
) -> Result<Rect> {
    validate(magnification, aspect_ratio)?;

    if approx_eq(magnification, 1.0) {
        return Ok(Rect::full(frame_width, frame_height));
    }

    let frame_w = frame_width as f64;
    let frame_h = frame_height as f64;
    let center_w = frame_w / magnification;
    let center_h = center_w / aspect_ratio;
    let left = ((frame_w - center_w) / 2.0).round() as i32;
    let top = ((frame_h - center_h) / 2.0).round() as i32;

    Ok(Rect::new(
        left,
        top,
        left + center_w.round() as i32,
        top + center_h.round() as i32,
    ))
}

/// 变焦状态 (独立锁保护)
///
/// 由控制接口写入, 被帧裁剪, 检测坐标换算和显示读取。
#[derive(Debug, Default)]
pub struct ZoomRegion {
    zoom: Mutex<Zoom>,
}

impl ZoomRegion {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同步校验, 非法值返回 InvalidArgument 且不修改状态
    pub fn set(&self, magnification: f64, aspect_ratio: f64) -> Result<()> {
        let zoom = Zoom::new(magnification, aspect_ratio)?;
        *self.zoom.lock() = zoom;
        Ok(())
    }

    pub fn get(&self) -> Zoom {
        *self.zoom.lock()
    }
}
