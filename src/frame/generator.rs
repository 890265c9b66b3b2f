//! 帧来源契约 (Frame generator contract)
//!
//! 流水线只依赖阻塞拉取接口; `FrameSink` 提供推送式的"新帧就绪"回调,
//! 通过有界通道交给 `ChannelFrameGenerator`。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use image::RgbaImage;
use thiserror::Error;
use tracing::{debug, info};

use super::{CameraInfo, Frame};
use crate::region::ClippingRegion;

/// 取帧失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    /// 超时内没有新帧 (正常, 用于响应关闭)
    #[error("no frame within timeout")]
    Timeout,

    /// 暂时性失败, 下一轮重试
    #[error("transient acquisition failure: {0}")]
    Transient(String),

    /// 帧来源已关闭, 主循环退出
    #[error("frame source closed")]
    Closed,
}

/// 帧来源
pub trait FrameGenerator: Send {
    /// 相机元数据
    fn camera_info(&self) -> CameraInfo;

    /// 阻塞等待下一帧, 最多等待 `timeout`
    fn next_frame(&mut self, timeout: Duration) -> Result<Arc<Frame>, AcquisitionError>;
}

/// 推送端: 相机回调线程调用 `on_new_frame`
#[derive(Clone)]
pub struct FrameSink {
    tx: Sender<Arc<Frame>>,
    camera: CameraInfo,
    clipping: Arc<ClippingRegion>,
    epoch: Instant,
    dropped: Arc<AtomicU64>,
}

impl FrameSink {
    /// 新帧就绪, 以单调时钟打时间戳
    pub fn on_new_frame(&self, image: RgbaImage) -> bool {
        let timestamp = self.epoch.elapsed().as_nanos() as u64;
        self.on_new_frame_at(timestamp, image)
    }

    /// 新帧就绪 (调用方提供时间戳, 纳秒)
    ///
    /// 队列满时丢弃新帧, 返回 false。
    pub fn on_new_frame_at(&self, timestamp_ns: u64, image: RgbaImage) -> bool {
        let frame = Frame::new(
            timestamp_ns,
            image,
            self.camera,
            &self.clipping.sensor_margins(),
        );
        match self.tx.try_send(Arc::new(frame)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("帧队列已满, 丢弃帧 {} (累计 {})", timestamp_ns, dropped);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// 因队列满被丢弃的帧数
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// 基于有界通道的帧来源
pub struct ChannelFrameGenerator {
    rx: Receiver<Arc<Frame>>,
    camera: CameraInfo,
}

impl ChannelFrameGenerator {
    /// 创建 (推送端, 拉取端) 对
    pub fn new(
        camera: CameraInfo,
        clipping: Arc<ClippingRegion>,
        capacity: usize,
    ) -> (FrameSink, ChannelFrameGenerator) {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        info!(
            "📹 帧来源: {}x{}, 旋转 {}°, 队列容量 {}",
            camera.width,
            camera.height,
            camera.rotation.degrees(),
            capacity.max(1)
        );
        let sink = FrameSink {
            tx,
            camera,
            clipping,
            epoch: Instant::now(),
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (sink, ChannelFrameGenerator { rx, camera })
    }
}

impl FrameGenerator for ChannelFrameGenerator {
    fn camera_info(&self) -> CameraInfo {
        self.camera
    }

    fn next_frame(&mut self, timeout: Duration) -> Result<Arc<Frame>, AcquisitionError> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Ok(frame),
            Err(RecvTimeoutError::Timeout) => Err(AcquisitionError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(AcquisitionError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Rotation;
    use image::Rgba;

    fn camera() -> CameraInfo {
        CameraInfo::new(8, 6)
    }

    #[test]
    fn test_push_then_pull() {
        let clipping = Arc::new(ClippingRegion::new(Rotation::Deg0));
        let (sink, mut generator) = ChannelFrameGenerator::new(camera(), clipping, 2);
        assert!(sink.on_new_frame_at(5, RgbaImage::new(8, 6)));
        let frame = generator.next_frame(Duration::from_millis(10)).unwrap();
        assert_eq!(frame.timestamp(), 5);
        assert_eq!(
            generator.next_frame(Duration::from_millis(1)).unwrap_err(),
            AcquisitionError::Timeout
        );
    }

    #[test]
    fn test_full_queue_drops_new_frames() {
        let clipping = Arc::new(ClippingRegion::new(Rotation::Deg0));
        let (sink, _generator) = ChannelFrameGenerator::new(camera(), clipping, 1);
        assert!(sink.on_new_frame_at(1, RgbaImage::new(8, 6)));
        assert!(!sink.on_new_frame_at(2, RgbaImage::new(8, 6)));
        assert_eq!(sink.dropped_frames(), 1);
    }

    #[test]
    fn test_frames_use_current_clipping_snapshot() {
        let clipping = Arc::new(ClippingRegion::new(Rotation::Deg180));
        let (sink, mut generator) = ChannelFrameGenerator::new(camera(), Arc::clone(&clipping), 2);
        // 显示方向的右边距 → 传感器方向的左边距
        clipping.set(0, 0, 2, 0);
        sink.on_new_frame_at(1, RgbaImage::from_pixel(8, 6, Rgba([9, 9, 9, 255])));
        let frame = generator.next_frame(Duration::from_millis(10)).unwrap();
        assert_eq!(frame.image().get_pixel(0, 3).0, [0, 0, 0, 255]);
        assert_eq!(frame.image().get_pixel(7, 3).0, [9, 9, 9, 255]);
    }

    #[test]
    fn test_closed_when_sink_dropped() {
        let clipping = Arc::new(ClippingRegion::new(Rotation::Deg0));
        let (sink, mut generator) = ChannelFrameGenerator::new(camera(), clipping, 1);
        drop(sink);
        assert_eq!(
            generator.next_frame(Duration::from_millis(1)).unwrap_err(),
            AcquisitionError::Closed
        );
    }
}
