//! 颜色槽位池 (Color slot pool)
//!
//! 调色板下标的有界集合: 同一槽位不会同时分配给两个存活的跟踪框,
//! 已分配 + 可用 == 调色板大小。

use std::collections::VecDeque;

/// 调色板下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColorSlot(pub usize);

impl ColorSlot {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// 可用槽位队列 (先进先出)
#[derive(Debug, Clone)]
pub struct ColorPool {
    available: VecDeque<ColorSlot>,
    capacity: usize,
}

impl ColorPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            available: (0..capacity).map(ColorSlot).collect(),
            capacity,
        }
    }

    /// 取出一个可用槽位
    pub fn take(&mut self) -> Option<ColorSlot> {
        self.available.pop_front()
    }

    /// 归还槽位
    pub fn give_back(&mut self, slot: ColorSlot) {
        debug_assert!(slot.0 < self.capacity, "color slot out of palette range");
        debug_assert!(!self.available.contains(&slot), "color slot returned twice");
        self.available.push_back(slot);
    }

    pub fn has_available(&self) -> bool {
        !self.available.is_empty()
    }

    pub fn available(&self) -> usize {
        self.available.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
