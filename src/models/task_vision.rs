//! 任务视觉后端: 消费结构化的逐类别检测结果

use image::RgbImage;

use super::{ObjectDetector, RawDetection, TensorImage};
use crate::detection::BBox;
use crate::error::Result;

/// 一个候选类别
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Category {
    pub index: usize,
    pub score: f32,
}

/// 任务视觉库返回的一条检测 (框位于输入图像像素空间)
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDetection {
    pub bbox: BBox,
    pub categories: Vec<Category>,
}

/// 结构化检测任务 (黑盒)
pub trait VisionTask: Send {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<TaskDetection>>;
}

/// 基于任务视觉库的检测器
pub struct TaskVisionDetector<T: VisionTask> {
    task: T,
    max_num_detections: usize,
}

impl<T: VisionTask> TaskVisionDetector<T> {
    pub fn new(task: T, max_num_detections: usize) -> Self {
        Self {
            task,
            max_num_detections,
        }
    }
}

impl<T: VisionTask> ObjectDetector for TaskVisionDetector<T> {
    fn detect(&mut self, image: &TensorImage) -> Result<Vec<RawDetection>> {
        let detections = self.task.detect(image.image())?;
        // 每条检测取分数最高的类别, 无类别的跳过
        Ok(detections
            .into_iter()
            .filter_map(|d| {
                d.categories
                    .iter()
                    .max_by(|a, b| a.score.total_cmp(&b.score))
                    .map(|c| RawDetection::new(c.index, c.score, d.bbox))
            })
            .take(self.max_num_detections)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticTask(Vec<TaskDetection>);

    impl VisionTask for StaticTask {
        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<TaskDetection>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_best_category_wins() {
        let task = StaticTask(vec![
            TaskDetection {
                bbox: BBox::new(1.0, 2.0, 3.0, 4.0),
                categories: vec![
                    Category { index: 0, score: 0.2 },
                    Category { index: 4, score: 0.7 },
                ],
            },
            TaskDetection {
                bbox: BBox::default(),
                categories: vec![],
            },
        ]);
        let mut detector = TaskVisionDetector::new(task, 10);
        let image = TensorImage::new(RgbImage::new(8, 8)).unwrap();
        let dets = detector.detect(&image).unwrap();
        assert_eq!(dets, vec![RawDetection::new(4, 0.7, BBox::new(1.0, 2.0, 3.0, 4.0))]);
    }
}
