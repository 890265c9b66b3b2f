/// 帧流水线演示 (Frame pipeline demo)
///
/// 合成帧来源: 固定纹理背景 + 一个移动的亮方块。
/// 亮斑检测器作为任务视觉后端, 跑完整流水线 (工作线程池 + NCC 跟踪),
/// 主线程轮询并打印识别结果。
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use image::{Rgba, RgbImage, RgbaImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tfod_rs::detection::BBox;
use tfod_rs::models::{Category, TaskDetection, VisionTask};
use tfod_rs::{
    CameraInfo, ChannelFrameGenerator, ClippingRegion, FrameManager, PipelineParameters, Rotation,
};

/// 演示参数
#[derive(Parser, Debug)]
#[command(author, version, about = "实时目标检测帧流水线演示", long_about = None)]
struct Args {
    /// 参数文件 (JSON), 不存在时使用默认值
    #[arg(short, long)]
    config: Option<String>,

    /// 帧宽
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// 帧高
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// 总帧数
    #[arg(short, long, default_value_t = 300)]
    frames: u32,

    /// 帧率
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// 工作线程数 (覆盖参数文件)
    #[arg(short, long)]
    workers: Option<u32>,

    /// 变焦倍率
    #[arg(short, long, default_value_t = 1.0)]
    zoom: f64,

    /// 相机旋转角度 (0/90/180/270)
    #[arg(long, default_value_t = 0)]
    rotation: u32,

    /// 关闭跟踪器, 直接发布检测
    #[arg(long, default_value_t = false)]
    no_tracker: bool,

    /// 背景纹理随机种子
    #[arg(long, default_value_t = 7)]
    seed: u64,
}

// ========== 亮斑检测器 ==========

/// 把所有高亮像素的外接框当作一个目标
struct BlobDetector {
    threshold: u8,
}

impl VisionTask for BlobDetector {
    fn detect(&mut self, image: &RgbImage) -> tfod_rs::Result<Vec<TaskDetection>> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        let mut count = 0u32;
        for (x, y, p) in image.enumerate_pixels() {
            if p.0.iter().all(|&c| c >= self.threshold) {
                count += 1;
                bounds = Some(match bounds {
                    None => (x, y, x, y),
                    Some((l, t, r, b)) => (l.min(x), t.min(y), r.max(x), b.max(y)),
                });
            }
        }
        let Some((l, t, r, b)) = bounds else {
            return Ok(Vec::new());
        };
        let area = ((r - l + 1) * (b - t + 1)) as f32;
        // 填充率作为置信度
        let score = (count as f32 / area).clamp(0.0, 1.0);
        let bbox = BBox::new(l as f32, t as f32, (r + 1) as f32, (b + 1) as f32);
        Ok(vec![TaskDetection {
            bbox,
            categories: vec![Category { index: 0, score }],
        }])
    }
}

// ========== 合成帧 ==========

struct Scene {
    background: RgbaImage,
    target: u32,
}

impl Scene {
    fn new(width: u32, height: u32, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let background = RgbaImage::from_fn(width, height, |_, _| {
            let v: u8 = rng.gen_range(0..180);
            Rgba([v, v / 2 + 40, 180 - v, 255])
        });
        Self {
            background,
            target: (width.min(height) / 6).max(8),
        }
    }

    /// 第 i 帧: 方块沿水平方向往返移动
    fn render(&self, i: u32) -> RgbaImage {
        let (w, h) = self.background.dimensions();
        let span = w.saturating_sub(self.target).max(1);
        let phase = (i * 4) % (2 * span);
        let x = if phase < span { phase } else { 2 * span - phase };
        let y = (h.saturating_sub(self.target)) / 2;

        let mut image = self.background.clone();
        for py in y..(y + self.target).min(h) {
            for px in x..(x + self.target).min(w) {
                image.put_pixel(px, py, Rgba([255, 255, 255, 255]));
            }
        }
        image
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut params = match &args.config {
        Some(path) => PipelineParameters::load_or_default(path),
        None => PipelineParameters::default(),
    };
    if let Some(workers) = args.workers {
        params.num_executor_threads = workers;
    }
    if args.no_tracker {
        params.use_object_tracker = false;
    }

    let rotation = Rotation::try_from(args.rotation).context("invalid --rotation")?;
    let mut camera = CameraInfo::new(args.width, args.height);
    camera.rotation = rotation;

    let clipping = Arc::new(ClippingRegion::new(rotation));
    let (sink, generator) = ChannelFrameGenerator::new(camera, Arc::clone(&clipping), 4);

    let manager = FrameManager::builder(params)
        .labels(["target"])
        .vision_task(|id, threads| {
            info!("🧩 worker {} 使用亮斑检测器 ({} 线程)", id, threads);
            Ok(BlobDetector { threshold: 240 })
        })
        .clipping(clipping)
        .start(generator)
        .context("failed to start pipeline")?;

    manager.set_zoom(args.zoom, 16.0 / 9.0)?;
    manager.activate()?;

    // ========== 生产者线程 ==========
    let scene = Scene::new(args.width, args.height, args.seed);
    let frame_interval = Duration::from_secs_f64(1.0 / args.fps.max(1) as f64);
    let total = args.frames;
    let producer = std::thread::Builder::new()
        .name("tfod-demo-camera".to_string())
        .spawn(move || {
            for i in 0..total {
                sink.on_new_frame(scene.render(i));
                std::thread::sleep(frame_interval);
            }
            sink.dropped_frames()
        })?;

    // ========== 轮询结果 ==========
    let start = Instant::now();
    let mut updates = 0u32;
    while !producer.is_finished() {
        if let Some(recognitions) = manager.updated_recognitions() {
            updates += 1;
            if updates % 10 == 0 {
                for r in &recognitions {
                    println!(
                        "[{:>6.2}s] {} {:.2} ({:.0}, {:.0})-({:.0}, {:.0}) {:+.1}° color={:?}",
                        start.elapsed().as_secs_f64(),
                        r.label(),
                        r.confidence(),
                        r.left(),
                        r.top(),
                        r.right(),
                        r.bottom(),
                        r.estimate_angle_to_object().to_degrees(),
                        r.color().map(|c| c.index())
                    );
                }
            }
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    let dropped = producer
        .join()
        .map_err(|_| anyhow::anyhow!("camera thread panicked"))?;
    manager.shutdown();
    info!("✅ 演示结束: {} 次结果更新, 丢弃 {} 帧", updates, dropped);
    Ok(())
}
