// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 警报控制器 (Alert Controller)
//!
//! 每个检测周期输入一次人数, 决定是否触发警报, 并用冷却时间防止连续刷屏。
//! 两次警报的触发时间间隔一定大于冷却时间。

use std::time::{Duration, Instant};

use crate::config::clamp_threshold;

/// 不触发警报的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// 人数低于阈值
    BelowThreshold,
    /// 仍在冷却期内
    Cooldown { remaining: Duration },
}

/// 单次评估结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    NoAlert(Suppression),
    Alert { count: usize },
}

impl AlertDecision {
    pub fn is_alert(&self) -> bool {
        matches!(self, AlertDecision::Alert { .. })
    }
}

#[derive(Debug, Clone)]
pub struct AlertController {
    threshold: u32,
    cooldown: Duration,
    last_alert: Option<Instant>,
}

impl AlertController {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: clamp_threshold(threshold),
            cooldown,
            last_alert: None,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// 阈值可随时修改, 下一次 evaluate 立即生效
    pub fn set_threshold(&mut self, threshold: u32) {
        self.threshold = clamp_threshold(threshold);
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn last_alert(&self) -> Option<Instant> {
        self.last_alert
    }

    /// 人数是否达到警报阈值 (与冷却无关, 用于状态栏着色)
    pub fn exceeds(&self, person_count: usize) -> bool {
        person_count >= self.threshold as usize
    }

    pub fn evaluate(&mut self, person_count: usize, now: Instant) -> AlertDecision {
        if !self.exceeds(person_count) {
            return AlertDecision::NoAlert(Suppression::BelowThreshold);
        }

        if let Some(last) = self.last_alert {
            let elapsed = now.saturating_duration_since(last);
            if elapsed <= self.cooldown {
                return AlertDecision::NoAlert(Suppression::Cooldown {
                    remaining: self.cooldown - elapsed,
                });
            }
        }

        self.last_alert = Some(now);
        AlertDecision::Alert {
            count: person_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(t0: Instant, secs: u64) -> Instant {
        t0 + Duration::from_secs(secs)
    }

    #[test]
    fn test_scenario_counts_and_times() {
        // threshold=2, cooldown=10s, counts [1,2,3,1,2] @ [0,1,2,5,12]s
        let t0 = Instant::now();
        let mut ctrl = AlertController::new(2, Duration::from_secs(10));
        let ticks = [(1, 0), (2, 1), (3, 2), (1, 5), (2, 12)];

        let fired: Vec<(u64, usize)> = ticks
            .iter()
            .filter_map(|&(count, secs)| match ctrl.evaluate(count, at(t0, secs)) {
                AlertDecision::Alert { count } => Some((secs, count)),
                AlertDecision::NoAlert(_) => None,
            })
            .collect();

        assert_eq!(fired, vec![(1, 2), (12, 2)]);
    }

    #[test]
    fn test_first_qualifying_count_fires() {
        let t0 = Instant::now();
        let mut ctrl = AlertController::new(3, Duration::from_secs(10));
        assert_eq!(ctrl.evaluate(3, t0), AlertDecision::Alert { count: 3 });
        assert_eq!(ctrl.last_alert(), Some(t0));
    }

    #[test]
    fn test_below_threshold_ignores_cooldown() {
        let t0 = Instant::now();
        let mut ctrl = AlertController::new(2, Duration::from_secs(10));
        assert!(ctrl.evaluate(2, t0).is_alert());
        // 冷却中, 但人数不足 → 原因是低于阈值
        assert_eq!(
            ctrl.evaluate(1, at(t0, 1)),
            AlertDecision::NoAlert(Suppression::BelowThreshold)
        );
        // 冷却结束后人数不足依旧不触发
        assert_eq!(
            ctrl.evaluate(0, at(t0, 60)),
            AlertDecision::NoAlert(Suppression::BelowThreshold)
        );
    }

    #[test]
    fn test_cooldown_boundary_is_inclusive() {
        let t0 = Instant::now();
        let mut ctrl = AlertController::new(1, Duration::from_secs(10));
        assert!(ctrl.evaluate(1, t0).is_alert());
        assert_eq!(
            ctrl.evaluate(1, at(t0, 10)),
            AlertDecision::NoAlert(Suppression::Cooldown {
                remaining: Duration::ZERO
            })
        );
        assert!(ctrl
            .evaluate(1, at(t0, 10) + Duration::from_millis(1))
            .is_alert());
    }

    #[test]
    fn test_threshold_change_applies_next_tick() {
        let t0 = Instant::now();
        let mut ctrl = AlertController::new(3, Duration::from_secs(10));
        assert!(!ctrl.evaluate(2, t0).is_alert());
        ctrl.set_threshold(2);
        assert!(ctrl.evaluate(2, at(t0, 1)).is_alert());
        // 提高阈值不会撤销已触发的警报
        ctrl.set_threshold(5);
        assert_eq!(ctrl.last_alert(), Some(at(t0, 1)));
        assert_eq!(
            ctrl.evaluate(4, at(t0, 20)),
            AlertDecision::NoAlert(Suppression::BelowThreshold)
        );
    }

    #[test]
    fn test_alerts_never_closer_than_cooldown() {
        let t0 = Instant::now();
        let cooldown = Duration::from_secs(10);
        let mut ctrl = AlertController::new(2, cooldown);
        let mut fired = Vec::new();
        // 每 700ms 一个周期, 人数在 0..5 之间循环
        for i in 0..400u64 {
            let now = t0 + Duration::from_millis(700 * i);
            if ctrl.evaluate((i % 5) as usize, now).is_alert() {
                fired.push(now);
            }
        }
        assert!(fired.len() > 1);
        for pair in fired.windows(2) {
            assert!(pair[1].duration_since(pair[0]) > cooldown);
        }
    }

    #[test]
    fn test_threshold_is_clamped() {
        let mut ctrl = AlertController::new(0, Duration::from_secs(10));
        assert_eq!(ctrl.threshold(), 1);
        ctrl.set_threshold(99);
        assert_eq!(ctrl.threshold(), 10);
    }
}
