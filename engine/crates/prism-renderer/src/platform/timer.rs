use std::time::{Duration, Instant};

/// 帧计时
///
/// 离线渲染没有帧率限制，这里只记录每帧耗时用于日志。
#[derive(Debug)]
pub struct Timer {
    last_tick: Instant,

    delta_time: Duration,
    total_time: Duration,
    tick_count: u64,
}
impl Default for Timer {
    fn default() -> Self {
        Self {
            last_tick: Instant::now(),
            delta_time: Duration::ZERO,
            total_time: Duration::ZERO,
            tick_count: 0,
        }
    }
}
// update
impl Timer {
    /// 每帧开始的时候调用
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.delta_time = now.duration_since(self.last_tick);
        self.last_tick = now;
        self.total_time += self.delta_time;
        self.tick_count += 1;
    }

    pub fn elapsed_since_tick(&self) -> Duration {
        self.last_tick.elapsed()
    }
}
// getter
impl Timer {
    #[inline]
    pub fn delta_time(&self) -> Duration {
        self.delta_time
    }

    /// 上一帧的时间（毫秒）
    #[inline]
    pub fn delta_time_ms(&self) -> f32 {
        self.delta_time.as_secs_f32() * 1000.0
    }

    #[inline]
    pub fn total_time_s(&self) -> f32 {
        self.total_time.as_secs_f32()
    }

    #[inline]
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// 所有帧的平均耗时（毫秒），还没有 tick 过时为 0
    pub fn average_frame_ms(&self) -> f32 {
        if self.tick_count == 0 {
            return 0.0;
        }
        self.total_time.as_secs_f32() * 1000.0 / self.tick_count as f32
    }
}
