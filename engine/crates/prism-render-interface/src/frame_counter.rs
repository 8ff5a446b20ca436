use crate::pipeline_settings::FrameLabel;

pub struct FrameCounter {
    /// 当前的帧序号，一直累加
    frame_id: u64,
}
// new & init
impl FrameCounter {
    pub fn new(init_frame_id: u64) -> Self {
        Self { frame_id: init_frame_id }
    }
}
impl Default for FrameCounter {
    fn default() -> Self {
        Self::new(1)
    }
}
// update
impl FrameCounter {
    #[inline]
    pub fn next_frame(&mut self) {
        self.frame_id = self.frame_id.wrapping_add(1);
    }
}
// getters
impl FrameCounter {
    const FIF_COUNT: usize = 3;
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }
    #[inline]
    pub const fn fif_count() -> usize {
        Self::FIF_COUNT
    }
    #[inline]
    pub const fn frame_labels() -> [FrameLabel; Self::FIF_COUNT] {
        [FrameLabel::A, FrameLabel::B, FrameLabel::C]
    }
    #[inline]
    pub fn frame_label(&self) -> FrameLabel {
        FrameLabel::from_usize(self.frame_id as usize % Self::fif_count())
    }
    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}{}]", self.frame_id, self.frame_label())
    }

    /// 在 `retired_frame_id` 提交的工作是否已经确定执行完毕
    #[inline]
    pub fn is_frame_complete(retired_frame_id: u64, current_frame_id: u64) -> bool {
        retired_frame_id + Self::FIF_COUNT as u64 <= current_frame_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_label_cycles() {
        let mut counter = FrameCounter::new(0);
        let mut labels = Vec::new();
        for _ in 0..4 {
            labels.push(*counter.frame_label());
            counter.next_frame();
        }
        assert_eq!(labels, vec![0, 1, 2, 0]);
        assert_eq!(counter.frame_name(), "[F4B]");
    }

    #[test]
    fn test_frame_complete() {
        assert!(!FrameCounter::is_frame_complete(5, 7));
        assert!(FrameCounter::is_frame_complete(5, 8));
    }
}
