//! 请求限流器 - 基于分钟/天两个滑动窗口的请求配额控制

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::{ConfigError, RateLimitConfig};
use crate::llm::model_manager::LogicalModel;

const MINUTE_WINDOW: Duration = Duration::from_secs(60);
const DAY_WINDOW: Duration = Duration::from_secs(86_400);
const WAIT_BUFFER: Duration = Duration::from_secs(1);

/// Counters exposed for inspection; limiting never consults `per_model`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UsageSnapshot {
    pub requests_last_minute: usize,
    pub requests_last_day: usize,
    pub requests_per_minute: u32,
    pub requests_per_day: u32,
    pub per_model: HashMap<LogicalModel, usize>,
}

#[derive(Default)]
struct WindowState {
    minute: VecDeque<Instant>,
    day: VecDeque<Instant>,
    per_model: HashMap<LogicalModel, usize>,
}

impl WindowState {
    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.minute.front() {
            if now.duration_since(*oldest) >= MINUTE_WINDOW {
                self.minute.pop_front();
            } else {
                break;
            }
        }
        while let Some(oldest) = self.day.front() {
            if now.duration_since(*oldest) >= DAY_WINDOW {
                self.day.pop_front();
            } else {
                break;
            }
        }
    }

    fn record(&mut self, model: LogicalModel, now: Instant) {
        self.minute.push_back(now);
        self.day.push_back(now);
        *self.per_model.entry(model).or_default() += 1;
    }
}

/// 限流器
///
/// One mutex guards both windows. Callers sleep outside the lock, so waiting
/// suspends only the calling task and never serializes other callers' sleeps.
pub struct RateLimiter {
    requests_per_minute: u32,
    requests_per_day: u32,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Result<Self, ConfigError> {
        if config.requests_per_minute == 0 {
            return Err(ConfigError::ZeroRateLimit("requests_per_minute"));
        }
        if config.requests_per_day == 0 {
            return Err(ConfigError::ZeroRateLimit("requests_per_day"));
        }

        Ok(Self {
            requests_per_minute: config.requests_per_minute,
            requests_per_day: config.requests_per_day,
            state: Mutex::new(WindowState::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 检查当前是否允许发起新请求
    pub fn can_make_request(&self, model: LogicalModel) -> bool {
        let mut state = self.lock();
        state.prune(Instant::now());
        let allowed = self.has_capacity(&state);
        if !allowed {
            debug!(%model, "rate window full");
        }
        allowed
    }

    /// 记录一次请求
    pub fn record_request(&self, model: LogicalModel) {
        self.lock().record(model, Instant::now());
    }

    /// 等待直到允许发起请求（不记录）
    pub async fn wait_if_needed(&self, model: LogicalModel) {
        while let Some(delay) = self.time_until_capacity() {
            info!(
                "⏳ 请求配额已满，{} 模型等待 {:.1} 秒...",
                model,
                delay.as_secs_f64()
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Waits for capacity and records the request in the same critical section,
    /// so two callers cannot both take the last free slot.
    pub async fn acquire(&self, model: LogicalModel) {
        loop {
            let delay = {
                let mut state = self.lock();
                let now = Instant::now();
                state.prune(now);
                if self.has_capacity(&state) {
                    state.record(model, now);
                    return;
                }
                self.delay_until_capacity(&state, now)
            };
            info!(
                "⏳ 请求配额已满，{} 模型等待 {:.1} 秒...",
                model,
                delay.as_secs_f64()
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Number of requests recorded for one model since startup.
    pub fn usage_for(&self, model: LogicalModel) -> usize {
        self.lock().per_model.get(&model).copied().unwrap_or(0)
    }

    pub fn usage_snapshot(&self) -> UsageSnapshot {
        let mut state = self.lock();
        state.prune(Instant::now());
        UsageSnapshot {
            requests_last_minute: state.minute.len(),
            requests_last_day: state.day.len(),
            requests_per_minute: self.requests_per_minute,
            requests_per_day: self.requests_per_day,
            per_model: state.per_model.clone(),
        }
    }

    fn time_until_capacity(&self) -> Option<Duration> {
        let mut state = self.lock();
        let now = Instant::now();
        state.prune(now);
        if self.has_capacity(&state) {
            None
        } else {
            Some(self.delay_until_capacity(&state, now))
        }
    }

    fn has_capacity(&self, state: &WindowState) -> bool {
        state.minute.len() < self.requests_per_minute as usize
            && state.day.len() < self.requests_per_day as usize
    }

    /// Sleep until the oldest entry of the first full window ages out, plus a buffer.
    fn delay_until_capacity(&self, state: &WindowState, now: Instant) -> Duration {
        let (oldest, window) = if state.minute.len() >= self.requests_per_minute as usize {
            (state.minute.front(), MINUTE_WINDOW)
        } else {
            (state.day.front(), DAY_WINDOW)
        };

        match oldest {
            Some(oldest) => (*oldest + window).saturating_duration_since(now) + WAIT_BUFFER,
            None => WAIT_BUFFER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(requests_per_minute: u32, requests_per_day: u32) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            requests_per_minute,
            requests_per_day,
        })
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_minute_window_blocks_third_call_until_61_seconds() {
        let limiter = limiter(2, 100);

        for i in 0..3 {
            if i < 2 {
                assert!(limiter.can_make_request(LogicalModel::Fast));
            }
            limiter.record_request(LogicalModel::Fast);
            tokio::time::advance(Duration::from_millis(300)).await;
        }
        assert!(!limiter.can_make_request(LogicalModel::Fast));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.can_make_request(LogicalModel::Fast));
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_within_limit_are_all_allowed() {
        let limiter = limiter(5, 100);

        for _ in 0..5 {
            assert!(limiter.can_make_request(LogicalModel::Precise));
            limiter.record_request(LogicalModel::Precise);
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        assert!(!limiter.can_make_request(LogicalModel::Precise));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oldest_entry_frees_capacity_first() {
        let limiter = limiter(2, 100);

        limiter.record_request(LogicalModel::Fast);
        tokio::time::advance(Duration::from_secs(30)).await;
        limiter.record_request(LogicalModel::Fast);
        assert!(!limiter.can_make_request(LogicalModel::Fast));

        // first entry is 60s old, second only 30s
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.can_make_request(LogicalModel::Fast));
    }

    #[tokio::test(start_paused = true)]
    async fn test_day_window_blocks_regardless_of_minute_window() {
        let limiter = limiter(10, 3);

        for _ in 0..3 {
            limiter.record_request(LogicalModel::Creative);
        }
        assert!(!limiter.can_make_request(LogicalModel::Creative));

        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(!limiter.can_make_request(LogicalModel::Creative));

        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert!(limiter.can_make_request(LogicalModel::Creative));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_if_needed_sleeps_until_oldest_ages_out() {
        let limiter = limiter(1, 100);
        limiter.record_request(LogicalModel::Fast);

        let start = Instant::now();
        limiter.wait_if_needed(LogicalModel::Fast).await;
        let waited = start.elapsed();

        assert!(waited >= Duration::from_secs(60));
        assert!(waited <= Duration::from_secs(62));
        assert!(limiter.can_make_request(LogicalModel::Fast));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_if_needed_returns_immediately_with_capacity() {
        let limiter = limiter(3, 100);

        let start = Instant::now();
        limiter.wait_if_needed(LogicalModel::Fast).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquire_never_exceeds_minute_limit() {
        let limiter = Arc::new(limiter(3, 100));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire(LogicalModel::Fast).await;
                Instant::now()
            }));
        }

        let start = Instant::now();
        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap());
        }

        let immediate = finished.iter().filter(|t| **t == start).count();
        assert_eq!(immediate, 3);
        assert_eq!(limiter.usage_for(LogicalModel::Fast), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_usage_is_tracked_per_model() {
        let limiter = limiter(10, 100);

        limiter.record_request(LogicalModel::Fast);
        limiter.record_request(LogicalModel::Fast);
        limiter.record_request(LogicalModel::Precise);

        let snapshot = limiter.usage_snapshot();
        assert_eq!(snapshot.requests_last_minute, 3);
        assert_eq!(snapshot.requests_last_day, 3);
        assert_eq!(snapshot.per_model[&LogicalModel::Fast], 2);
        assert_eq!(snapshot.per_model[&LogicalModel::Precise], 1);
        assert_eq!(limiter.usage_for(LogicalModel::Creative), 0);

        // lifetime counters outlive the windows
        tokio::time::advance(Duration::from_secs(2 * 86_400)).await;
        let snapshot = limiter.usage_snapshot();
        assert_eq!(snapshot.requests_last_day, 0);
        assert_eq!(snapshot.per_model[&LogicalModel::Fast], 2);
    }

    #[test]
    fn test_zero_limits_are_configuration_errors() {
        let per_minute = RateLimiter::new(&RateLimitConfig {
            requests_per_minute: 0,
            requests_per_day: 10,
        });
        assert!(matches!(
            per_minute,
            Err(ConfigError::ZeroRateLimit("requests_per_minute"))
        ));

        let per_day = RateLimiter::new(&RateLimitConfig {
            requests_per_minute: 10,
            requests_per_day: 0,
        });
        assert!(matches!(
            per_day,
            Err(ConfigError::ZeroRateLimit("requests_per_day"))
        ));
    }
}
