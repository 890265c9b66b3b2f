/// 帧处理流水线 (Frame pipeline)
///
/// 线程架构:
/// - 主循环线程: 拉取帧, 节奏控制, 跟踪, 发布结果
/// - 工作线程池: 每个线程一个模型实例, 异步检测
/// - 调用方线程: 控制接口 (激活/停用/关闭, 变焦, 裁边, 读取结果)
///
/// 跟踪器, 颜色池和耗时统计只在主循环线程上访问;
/// 结果, 变焦, 裁边和标注帧各有独立的锁。
pub mod annotate;
pub mod merge;
pub mod worker_pool;

pub use annotate::Annotator;
pub use merge::RecognitionMerger;
pub use worker_pool::{Completion, WorkerPool, WorkerToken};

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use image::RgbaImage;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::PipelineParameters;
use crate::detection::{Detection, DetectionWorker, Results, ResultsStore};
use crate::error::{PipelineError, Result};
use crate::frame::{AcquisitionError, Frame, FrameGenerator};
use crate::models::{
    interpreter_factory, task_vision_factory, ObjectDetector, TensorEngine, VisionTask,
};
use crate::region::{ClippingRegion, Zoom, ZoomRegion};
use crate::tracker::{CorrelationTracker, MultiObjectTracker, NccCorrelationTracker, TrackerConfig};
use crate::utils::RollingAverage;

// ========== 状态 ==========

/// 流水线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// 帧照常拉取但不检测, 发布空结果
    Inactive,
    Active,
    /// 终态
    Shutdown,
}

/// 每次发布结果时在主循环线程上调用
pub type ResultsCallback = Box<dyn FnMut(&Results) + Send>;

/// 为编号为 `id` 的工作者构造一个模型实例
pub type DetectorFactory =
    Box<dyn Fn(usize, &PipelineParameters) -> Result<Box<dyn ObjectDetector>>>;

struct Shared {
    state: Mutex<PipelineState>,
    zoom: ZoomRegion,
    clipping: Arc<ClippingRegion>,
    results: ResultsStore,
    annotated: Mutex<Option<Arc<RgbaImage>>>,
}

impl Shared {
    fn state(&self) -> PipelineState {
        *self.state.lock()
    }
}

// ========== 构造 ==========

pub struct FrameManagerBuilder {
    params: PipelineParameters,
    labels: Vec<String>,
    detector_factory: Option<DetectorFactory>,
    correlation_engine: Option<Box<dyn CorrelationTracker>>,
    clipping: Option<Arc<ClippingRegion>>,
    callback: Option<ResultsCallback>,
}

impl FrameManagerBuilder {
    pub fn labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn detector_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(usize, &PipelineParameters) -> Result<Box<dyn ObjectDetector>> + 'static,
    {
        self.detector_factory = Some(Box::new(factory));
        self
    }

    /// 解释器后端: `build_engine(工作者编号, 推理线程数)` 为每个工作者构造一个引擎
    pub fn interpreter<F, E>(self, build_engine: F) -> Self
    where
        F: Fn(usize, u32) -> Result<E> + 'static,
        E: TensorEngine + 'static,
    {
        self.detector_factory(interpreter_factory(build_engine))
    }

    /// 任务视觉后端: `build_task(工作者编号, 推理线程数)`
    pub fn vision_task<F, T>(self, build_task: F) -> Self
    where
        F: Fn(usize, u32) -> Result<T> + 'static,
        T: VisionTask + 'static,
    {
        self.detector_factory(task_vision_factory(build_task))
    }

    /// 相关跟踪引擎, 默认使用内置的 NCC 引擎
    pub fn correlation_engine(mut self, engine: Box<dyn CorrelationTracker>) -> Self {
        self.correlation_engine = Some(engine);
        self
    }

    /// 与帧来源共享的裁边区域
    pub fn clipping(mut self, clipping: Arc<ClippingRegion>) -> Self {
        self.clipping = Some(clipping);
        self
    }

    pub fn on_results<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&Results) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// 构造工作者, 启动工作线程池和主循环线程 (初始为 Inactive)
    pub fn start<G>(self, generator: G) -> Result<FrameManager>
    where
        G: FrameGenerator + 'static,
    {
        let params = self.params;
        params.validate()?;
        let factory = self.detector_factory.ok_or_else(|| {
            PipelineError::InvalidParameters("a detector factory is required".to_string())
        })?;
        if self.labels.is_empty() {
            return Err(PipelineError::InvalidParameters(
                "label list must not be empty".to_string(),
            ));
        }

        let camera = generator.camera_info();
        info!(
            "🚀 启动流水线: 相机 {}x{} 旋转 {}°, {} 个工作者, 输入 {}",
            camera.width,
            camera.height,
            camera.rotation.degrees(),
            params.num_executor_threads,
            params.input_size
        );

        let labels: Arc<[String]> = self.labels.into();
        let mut workers = Vec::with_capacity(params.num_executor_threads as usize);
        for id in 0..params.num_executor_threads as usize {
            let detector = factory(id, &params)?;
            workers.push(DetectionWorker::new(
                id,
                detector,
                Arc::clone(&labels),
                params.input_size,
                params.min_result_confidence,
            ));
        }
        let pool = WorkerPool::spawn(workers)?;

        let tracker = if params.use_object_tracker {
            let engine = self
                .correlation_engine
                .unwrap_or_else(|| Box::new(NccCorrelationTracker::new()));
            Some(MultiObjectTracker::new(
                engine,
                TrackerConfig::from(&params),
                params.palette.len(),
            ))
        } else {
            info!("跟踪器已关闭, 直接发布检测结果");
            None
        };

        let annotator = params
            .annotate_frames
            .then(|| Annotator::new(&params.palette, params.annotation_width));

        let shared = Arc::new(Shared {
            state: Mutex::new(PipelineState::Inactive),
            zoom: ZoomRegion::new(),
            clipping: self
                .clipping
                .unwrap_or_else(|| Arc::new(ClippingRegion::new(camera.rotation))),
            results: ResultsStore::new(),
            annotated: Mutex::new(None),
        });

        let frame_loop = FrameLoop {
            timing: RollingAverage::new(params.timing_buffer_size),
            params,
            generator: Box::new(generator),
            pool: Some(pool),
            merger: RecognitionMerger::new(tracker),
            annotator,
            shared: Arc::clone(&shared),
            callback: self.callback,
            last_submit: None,
            was_active: false,
        };

        let handle = std::thread::Builder::new()
            .name("tfod-frame-manager".to_string())
            .spawn(move || frame_loop.run())
            .map_err(|e| PipelineError::Spawn(e.to_string()))?;

        Ok(FrameManager {
            shared,
            loop_handle: Mutex::new(Some(handle)),
        })
    }
}

// ========== 控制接口 ==========

/// 流水线编排器
pub struct FrameManager {
    shared: Arc<Shared>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl FrameManager {
    pub fn builder(params: PipelineParameters) -> FrameManagerBuilder {
        FrameManagerBuilder {
            params,
            labels: Vec::new(),
            detector_factory: None,
            correlation_engine: None,
            clipping: None,
            callback: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.shared.state()
    }

    /// Inactive → Active
    pub fn activate(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        match *state {
            PipelineState::Shutdown => Err(PipelineError::Shutdown),
            PipelineState::Active => Ok(()),
            PipelineState::Inactive => {
                *state = PipelineState::Active;
                info!("▶️ 流水线已激活");
                Ok(())
            }
        }
    }

    /// Active → Inactive (幂等, 可再次激活)
    pub fn deactivate(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        match *state {
            PipelineState::Shutdown => Err(PipelineError::Shutdown),
            PipelineState::Inactive => Ok(()),
            PipelineState::Active => {
                *state = PipelineState::Inactive;
                info!("⏸️ 流水线已停用");
                Ok(())
            }
        }
    }

    /// 进入终态并等待主循环退出 (工作线程池有界等待)
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if *state != PipelineState::Shutdown {
                *state = PipelineState::Shutdown;
                info!("🛑 流水线关闭中...");
            }
        }
        if let Some(handle) = self.loop_handle.lock().take() {
            if handle.join().is_err() {
                error!("❌ 主循环线程异常退出");
            }
        }
    }

    /// 设置变焦 (同步校验, 非法参数立即失败)
    pub fn set_zoom(&self, magnification: f64, aspect_ratio: f64) -> Result<()> {
        self.shared.zoom.set(magnification, aspect_ratio)
    }

    pub fn zoom(&self) -> Zoom {
        self.shared.zoom.get()
    }

    /// 设置裁边 (显示方向), 对之后构造的帧生效
    pub fn set_clipping_margins(&self, left: u32, top: u32, right: u32, bottom: u32) {
        self.shared.clipping.set(left, top, right, bottom);
    }

    pub fn clipping(&self) -> &Arc<ClippingRegion> {
        &self.shared.clipping
    }

    /// 最新识别结果 (从不阻塞等待计算)
    pub fn recognitions(&self) -> Vec<Detection> {
        self.shared.results.recognitions()
    }

    /// 仅当有比上次返回更新的结果时返回
    pub fn updated_recognitions(&self) -> Option<Vec<Detection>> {
        self.shared.results.updated_recognitions()
    }

    pub fn latest_results(&self) -> Arc<Results> {
        self.shared.results.latest()
    }

    /// 最新标注帧 (未开启标注或尚无结果时为 None)
    pub fn annotated_frame(&self) -> Option<Arc<RgbaImage>> {
        self.shared.annotated.lock().clone()
    }
}

impl Drop for FrameManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ========== 主循环 ==========

struct FrameLoop {
    params: PipelineParameters,
    generator: Box<dyn FrameGenerator>,
    pool: Option<WorkerPool>,
    merger: RecognitionMerger,
    annotator: Option<Annotator>,
    shared: Arc<Shared>,
    callback: Option<ResultsCallback>,
    timing: RollingAverage,
    last_submit: Option<Instant>,
    was_active: bool,
}

impl FrameLoop {
    fn run(mut self) {
        info!("🎬 主循环启动");
        let poll_timeout = self.params.frame_poll_timeout();
        let mut frames: u64 = 0;

        loop {
            if self.shared.state() == PipelineState::Shutdown {
                break;
            }

            let frame = match self.generator.next_frame(poll_timeout) {
                Ok(frame) => frame,
                Err(AcquisitionError::Timeout) => continue,
                Err(AcquisitionError::Transient(msg)) => {
                    warn!("⚠️ 取帧失败, 重试: {}", msg);
                    continue;
                }
                Err(AcquisitionError::Closed) => {
                    info!("帧来源已关闭");
                    break;
                }
            };
            frames += 1;

            match self.shared.state() {
                PipelineState::Shutdown => break,
                PipelineState::Inactive => self.process_inactive(&frame),
                PipelineState::Active => self.process_active(frame),
            }
        }

        *self.shared.state.lock() = PipelineState::Shutdown;
        if let Some(pool) = self.pool.take() {
            pool.shutdown(self.params.shutdown_timeout());
        }
        info!("🏁 主循环退出, 共处理 {} 帧", frames);
    }

    fn process_inactive(&mut self, frame: &Frame) {
        if self.was_active {
            self.was_active = false;
            self.merger.reset();
            *self.shared.annotated.lock() = None;
            debug!("停用: 跟踪器已清空");
        }
        // 在途任务的结果直接丢弃
        if let Some(pool) = self.pool.as_ref() {
            let dropped = pool.drain_completions().len();
            if dropped > 0 {
                debug!("停用期间丢弃 {} 个检测结果", dropped);
            }
        }
        self.publish(Arc::new(Results::empty(frame.timestamp())));
    }

    fn process_active(&mut self, frame: Arc<Frame>) {
        self.was_active = true;
        let zoom = self.shared.zoom.get();

        // 1. 节奏控制: 距上次提交不少于 平均耗时 / 工作者数
        self.maybe_submit(&frame, zoom);

        // 2. 跟踪器前进一帧
        self.merger.on_frame(&frame);

        // 3. 合并已完成的检测
        let completions = self
            .pool
            .as_ref()
            .map(|p| p.drain_completions())
            .unwrap_or_default();
        for completion in completions {
            self.timing.add(completion.elapsed.as_nanos() as i64);
            match completion.result {
                Ok(detections) => {
                    self.merger.on_batch(&completion.frame, detections);
                }
                Err(e) => error!(
                    "❌ worker {} 检测帧 {} 失败: {}",
                    completion.worker_id,
                    completion.frame.timestamp(),
                    e
                ),
            }
        }

        // 4. 发布
        let results = Arc::new(Results::new(frame.timestamp(), self.merger.current()));
        if let Some(annotator) = self.annotator.as_ref() {
            let image = annotator.annotate(&frame, zoom, results.detections());
            *self.shared.annotated.lock() = Some(Arc::new(image));
        }
        self.publish(results);
    }

    fn maybe_submit(&mut self, frame: &Arc<Frame>, zoom: Zoom) {
        let Some(pool) = self.pool.as_ref() else {
            return;
        };
        let interval = self.timing.get().max(0) as u128 / pool.size().max(1) as u128;
        let due = self
            .last_submit
            .map_or(true, |t| t.elapsed().as_nanos() >= interval);
        if !due {
            return;
        }
        let Some(token) = pool.try_acquire() else {
            return;
        };
        let worker_id = token.worker_id();
        match pool.submit(token, Arc::clone(frame), zoom) {
            Ok(()) => {
                self.last_submit = Some(Instant::now());
                debug!("帧 {} → worker {}", frame.timestamp(), worker_id);
            }
            Err((token, e)) => {
                error!("❌ 派发失败: {}", e);
                pool.release(token);
            }
        }
    }

    fn publish(&mut self, results: Arc<Results>) {
        self.shared.results.publish(Arc::clone(&results));
        if let Some(callback) = self.callback.as_mut() {
            callback(&results);
        }
    }
}
