//! 历史窗口 - 最近 N 个回合结果（FIFO）

use std::collections::VecDeque;

/// 默认窗口大小
pub const DEFAULT_CAPACITY: usize = 20;

/// 有界、保序的结果缓冲区
///
/// 与最新元素完全相同的值会被拒绝：这是远端状态未变化时的重复读取。
#[derive(Debug, Clone)]
pub struct HistoryWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl HistoryWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::new(),
            capacity,
        }
    }

    /// 追加一个值，返回 (是否接受, 当前窗口快照)
    pub fn push(&mut self, value: f64) -> (bool, Vec<f64>) {
        if self.values.back() == Some(&value) {
            return (false, self.snapshot());
        }

        self.values.push_back(value);
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
        (true, self.snapshot())
    }

    pub fn newest(&self) -> Option<f64> {
        self.values.back().copied()
    }

    /// 从旧到新
    pub fn snapshot(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_is_rejected() {
        let mut window = HistoryWindow::default();
        assert!(window.push(1.5).0);
        let (accepted, snapshot) = window.push(1.5);
        assert!(!accepted);
        assert_eq!(snapshot, vec![1.5]);
    }

    #[test]
    fn test_non_adjacent_repeat_is_accepted() {
        let mut window = HistoryWindow::default();
        window.push(1.5);
        window.push(3.0);
        assert!(window.push(1.5).0);
        assert_eq!(window.snapshot(), vec![1.5, 3.0, 1.5]);
    }

    #[test]
    fn test_capacity_drops_oldest_first() {
        let mut window = HistoryWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            window.push(v);
        }
        assert_eq!(window.snapshot(), vec![2.0, 3.0, 4.0]);
        assert_eq!(window.newest(), Some(4.0));
    }

    #[test]
    fn test_default_window_keeps_newest_twenty_in_order() {
        let mut window = HistoryWindow::default();
        // 相邻值各不相同，1.0 非相邻地重复出现
        let pushed: Vec<f64> = (0..25).map(|i| if i % 5 == 0 { 1.0 } else { 2.0 + i as f64 }).collect();
        for &v in &pushed {
            assert!(window.push(v).0);
        }

        assert_eq!(window.len(), DEFAULT_CAPACITY);
        assert_eq!(window.snapshot(), pushed[5..].to_vec());
        assert_eq!(window.newest(), Some(26.0));
    }

    #[test]
    fn test_huge_capacity_does_not_preallocate() {
        let mut window = HistoryWindow::new(usize::MAX);
        assert!(window.push(2.0).0);
        assert_eq!(window.capacity(), usize::MAX);
        assert_eq!(window.snapshot(), vec![2.0]);
    }
}
