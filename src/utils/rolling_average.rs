//! 滑动平均 (Rolling average)
//!
//! 固定容量的环形缓冲区, 只用于提交节奏控制, 不影响正确性。

#[derive(Debug, Clone)]
pub struct RollingAverage {
    samples: Vec<i64>,
    next: usize,
    filled: usize,
    sum: i64,
}

impl RollingAverage {
    /// # Panics
    /// 容量为 0 是编程错误
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "rolling average capacity must be non-zero");
        Self {
            samples: vec![0; capacity],
            next: 0,
            filled: 0,
            sum: 0,
        }
    }

    /// 添加样本, 覆盖最旧的槽位
    pub fn add(&mut self, sample: i64) {
        self.sum -= self.samples[self.next];
        self.samples[self.next] = sample;
        self.sum += sample;
        self.next = (self.next + 1) % self.samples.len();
        if self.filled < self.samples.len() {
            self.filled += 1;
        }
    }

    /// 已填充槽位的算术平均, 无样本时为 0
    pub fn get(&self) -> i64 {
        if self.filled == 0 {
            0
        } else {
            self.sum / self.filled as i64
        }
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_average_is_zero() {
        let avg = RollingAverage::new(4);
        assert_eq!(avg.get(), 0);
        assert!(avg.is_empty());
    }

    #[test]
    fn test_partial_fill() {
        let mut avg = RollingAverage::new(4);
        avg.add(10);
        avg.add(20);
        assert_eq!(avg.get(), 15);
        assert_eq!(avg.len(), 2);
    }

    #[test]
    fn test_overwrites_oldest() {
        let mut avg = RollingAverage::new(3);
        for sample in [100, 200, 300, 400] {
            avg.add(sample);
        }
        // 100 被覆盖
        assert_eq!(avg.get(), 300);
        assert_eq!(avg.len(), 3);
    }

    #[test]
    #[should_panic]
    fn test_zero_capacity_panics() {
        let _ = RollingAverage::new(0);
    }
}
