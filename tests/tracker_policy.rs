//! 多目标跟踪策略: 重叠阈值, 淘汰, 过期批次, 颜色槽位不变式

mod common;

use std::collections::HashSet;

use proptest::prelude::*;

use common::{detection_at, frame, ControlledEngine};
use tfod_rs::detection::BBox;
use tfod_rs::pipeline::RecognitionMerger;
use tfod_rs::tracker::{MultiObjectTracker, TrackerConfig};
use tfod_rs::{CoordinateSpace, Detection};

fn tracker(palette: usize) -> MultiObjectTracker {
    let (engine, _) = ControlledEngine::new(1.0);
    MultiObjectTracker::new(Box::new(engine), TrackerConfig::default(), palette)
}

fn colors(t: &MultiObjectTracker) -> Vec<usize> {
    t.tracked_boxes().iter().map(|b| b.color().index()).collect()
}

#[test]
fn overlap_just_below_threshold_keeps_both() {
    // IOU = 32 / 168 ≈ 0.19
    let mut t = tracker(4);
    let f = frame(1);
    t.on_frame(&f);
    t.on_results_from_recognizer(&[detection_at(0.0, 0.0, 0.6), detection_at(68.0, 0.0, 0.5)], &f);
    assert_eq!(t.len(), 2);
}

#[test]
fn overlap_just_above_threshold_with_higher_confidence_replaces() {
    // IOU = 35 / 165 ≈ 0.21, 新检测置信度更高 → 替换并继承颜色
    let mut t = tracker(4);
    let f = frame(1);
    t.on_frame(&f);
    t.on_results_from_recognizer(&[detection_at(0.0, 0.0, 0.5)], &f);
    let inherited = colors(&t)[0];

    t.on_results_from_recognizer(&[detection_at(65.0, 0.0, 0.6)], &f);
    assert_eq!(t.len(), 1);
    assert_eq!(colors(&t), vec![inherited]);
    assert_eq!(t.tracked_detections()[0].confidence(), 0.6);
    assert_eq!(t.available_colors(), 3);
}

#[test]
fn single_color_palette_evicts_lowest_confidence() {
    let mut t = tracker(1);
    let f = frame(1);
    t.on_frame(&f);

    t.on_results_from_recognizer(&[detection_at(0.0, 0.0, 0.5)], &f);
    assert_eq!(t.len(), 1);

    // 不重叠, 没有空闲颜色 → 淘汰置信度更低的旧框, 颜色转给新框
    t.on_results_from_recognizer(&[detection_at(200.0, 200.0, 0.8)], &f);
    assert_eq!(t.len(), 1);
    assert_eq!(t.tracked_detections()[0].confidence(), 0.8);
    assert_eq!(colors(&t), vec![0]);

    // 置信度更低的候选无框可淘汰 → 丢弃
    t.on_results_from_recognizer(&[detection_at(0.0, 200.0, 0.3)], &f);
    assert_eq!(t.len(), 1);
    assert_eq!(t.tracked_detections()[0].confidence(), 0.8);
    assert_eq!(t.available_colors(), 0);
}

#[test]
fn low_correlation_tracks_are_dropped_on_frame() {
    let (engine, correlation) = ControlledEngine::new(1.0);
    let mut t = MultiObjectTracker::new(Box::new(engine), TrackerConfig::default(), 3);
    let f = frame(1);
    t.on_frame(&f);
    t.on_results_from_recognizer(&[detection_at(0.0, 0.0, 0.9)], &f);
    assert_eq!(t.len(), 1);

    *correlation.lock() = 0.29;
    t.on_frame(&frame(2));
    assert!(t.is_empty());
    assert_eq!(t.available_colors(), 3);
}

#[test]
fn stale_batch_leaves_tracker_untouched() {
    let mut merger = RecognitionMerger::new(Some(tracker(3)));
    let newer = frame(10);
    merger.on_frame(&newer);
    assert!(merger.on_batch(&newer, vec![detection_at(0.0, 0.0, 0.5)]));

    let before = merger.current();
    let available = merger.tracker().map(|t| t.available_colors());

    let older = frame(5);
    assert!(!merger.on_batch(
        &older,
        vec![detection_at(10.0, 0.0, 0.9), detection_at(200.0, 200.0, 0.9)]
    ));
    assert_eq!(merger.current(), before);
    assert_eq!(merger.tracker().map(|t| t.available_colors()), available);
}

// ========== 颜色槽位不变式 ==========

#[derive(Debug, Clone)]
enum Op {
    Frame(f32),
    Batch(Vec<(f32, f32, f32, f32, f32)>),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0.0f32..1.0).prop_map(Op::Frame),
        prop::collection::vec(
            (0.0f32..280.0, 0.0f32..280.0, 8.0f32..120.0, 8.0f32..120.0, 0.0f32..1.0),
            0..6
        )
        .prop_map(Op::Batch),
    ]
}

proptest! {
    #[test]
    fn color_slots_never_shared(
        palette in 1usize..5,
        ops in prop::collection::vec(op_strategy(), 1..40),
    ) {
        let (engine, correlation) = ControlledEngine::new(1.0);
        let mut t = MultiObjectTracker::new(Box::new(engine), TrackerConfig::default(), palette);
        let mut ts = 0u64;

        for op in ops {
            ts += 1;
            let f = frame(ts);
            match op {
                Op::Frame(c) => {
                    *correlation.lock() = c;
                    t.on_frame(&f);
                }
                Op::Batch(boxes) => {
                    let detections: Vec<Detection> = boxes
                        .into_iter()
                        .map(|(x, y, w, h, conf)| {
                            Detection::new(
                                "obj",
                                conf,
                                BBox::new(x, y, x + w, y + h),
                                CoordinateSpace::Frame,
                                common::camera(),
                                ts,
                            )
                        })
                        .collect();
                    t.on_results_from_recognizer(&detections, &f);
                }
            }

            let assigned = colors(&t);
            let unique: HashSet<usize> = assigned.iter().copied().collect();
            prop_assert_eq!(unique.len(), assigned.len());
            prop_assert!(assigned.iter().all(|&c| c < palette));
            prop_assert_eq!(assigned.len() + t.available_colors(), palette);
        }
    }
}
