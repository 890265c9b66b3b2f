//! 按流水线参数构造检测器
//!
//! 推理引擎本身由调用方提供: 构造闭包收到 (工作者编号, 推理线程数),
//! 其余后端选项 (输出布局, 量化, 检测数上限) 从参数读取。

use tracing::info;

use super::{InterpreterDetector, ObjectDetector, OutputLayout, TaskVisionDetector, TensorEngine, VisionTask};
use crate::config::PipelineParameters;
use crate::error::Result;

impl<E: TensorEngine> InterpreterDetector<E> {
    pub fn from_params(engine: E, params: &PipelineParameters) -> Self {
        Self::new(
            engine,
            OutputLayout::from_tensorflow2(params.is_model_tensorflow2),
            params.is_model_quantized,
            params.max_num_detections,
        )
    }
}

impl<T: VisionTask> TaskVisionDetector<T> {
    pub fn from_params(task: T, params: &PipelineParameters) -> Self {
        Self::new(task, params.max_num_detections)
    }
}

/// 解释器后端的工作者工厂
pub fn interpreter_factory<F, E>(
    build_engine: F,
) -> impl Fn(usize, &PipelineParameters) -> Result<Box<dyn ObjectDetector>> + 'static
where
    F: Fn(usize, u32) -> Result<E> + 'static,
    E: TensorEngine + 'static,
{
    move |id: usize, params: &PipelineParameters| {
        let engine = build_engine(id, params.num_interpreter_threads)?;
        info!(
            "🧠 worker {} 解释器后端: {:?}, 量化 {}, 推理线程 {}",
            id,
            OutputLayout::from_tensorflow2(params.is_model_tensorflow2),
            params.is_model_quantized,
            params.num_interpreter_threads
        );
        Ok(Box::new(InterpreterDetector::from_params(engine, params)) as Box<dyn ObjectDetector>)
    }
}

/// 任务视觉后端的工作者工厂
pub fn task_vision_factory<F, T>(
    build_task: F,
) -> impl Fn(usize, &PipelineParameters) -> Result<Box<dyn ObjectDetector>> + 'static
where
    F: Fn(usize, u32) -> Result<T> + 'static,
    T: VisionTask + 'static,
{
    move |id: usize, params: &PipelineParameters| {
        let task = build_task(id, params.num_interpreter_threads)?;
        info!(
            "🧠 worker {} 任务视觉后端, 推理线程 {}",
            id, params.num_interpreter_threads
        );
        Ok(Box::new(TaskVisionDetector::from_params(task, params)) as Box<dyn ObjectDetector>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BBox;
    use crate::models::{Category, InputTensor, TaskDetection, TensorImage};
    use image::RgbImage;
    use ndarray::{arr1, arr2, arr3, ArrayD};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// 记录收到的输入类型, 按 TF2 顺序返回两条检测
    struct RecordingEngine {
        saw_quantized: Arc<Mutex<Option<bool>>>,
    }

    impl TensorEngine for RecordingEngine {
        fn invoke(&mut self, input: &InputTensor) -> Result<Vec<ArrayD<f32>>> {
            *self.saw_quantized.lock() = Some(matches!(input, InputTensor::Quantized(_)));
            Ok(vec![
                arr2(&[[0.9, 0.8]]).into_dyn(),
                arr3(&[[[0.0, 0.0, 0.5, 0.5], [0.5, 0.5, 1.0, 1.0]]]).into_dyn(),
                arr1(&[2.0]).into_dyn(),
                arr2(&[[1.0, 0.0]]).into_dyn(),
            ])
        }
    }

    fn image() -> TensorImage {
        TensorImage::new(RgbImage::new(10, 10)).unwrap()
    }

    #[test]
    fn test_interpreter_factory_applies_params() {
        let params = PipelineParameters {
            is_model_tensorflow2: true,
            is_model_quantized: false,
            num_interpreter_threads: 3,
            max_num_detections: 1,
            ..PipelineParameters::default()
        };
        let calls = Arc::new(Mutex::new(Vec::new()));
        let saw_quantized = Arc::new(Mutex::new(None));

        let seen_calls = Arc::clone(&calls);
        let engine_flag = Arc::clone(&saw_quantized);
        let factory = interpreter_factory(move |id, threads| {
            seen_calls.lock().push((id, threads));
            Ok(RecordingEngine {
                saw_quantized: Arc::clone(&engine_flag),
            })
        });

        let mut detector = factory(4, &params).unwrap();
        assert_eq!(*calls.lock(), vec![(4, 3)]);

        let dets = detector.detect(&image()).unwrap();
        // TF2 布局 + 上限 1
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].label_index, 1);
        assert_eq!(dets[0].score, 0.9);
        assert_eq!(*saw_quantized.lock(), Some(false));
    }

    struct ManyBoxes;

    impl VisionTask for ManyBoxes {
        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<TaskDetection>> {
            Ok((0..5)
                .map(|i| TaskDetection {
                    bbox: BBox::new(i as f32, 0.0, i as f32 + 1.0, 1.0),
                    categories: vec![Category { index: 0, score: 0.5 }],
                })
                .collect())
        }
    }

    #[test]
    fn test_task_vision_factory_caps_detections() {
        let params = PipelineParameters {
            max_num_detections: 2,
            num_interpreter_threads: 2,
            ..PipelineParameters::default()
        };
        let threads = Arc::new(Mutex::new(0));
        let seen = Arc::clone(&threads);
        let factory = task_vision_factory(move |_, n| {
            *seen.lock() = n;
            Ok(ManyBoxes)
        });
        let mut detector = factory(0, &params).unwrap();
        assert_eq!(*threads.lock(), 2);
        assert_eq!(detector.detect(&image()).unwrap().len(), 2);
    }
}
