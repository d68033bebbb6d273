//! Decides which alert, if any, a probe result deserves.

use super::AlertKind;

/// Consecutive failures at which a down target escalates to a critical alert.
pub const ESCALATION_THRESHOLD: u32 = 3;

/// While a target stays down, every this-many failures re-sends a critical alert.
pub const STILL_DOWN_REMINDER_EVERY: u32 = 5;

/// What happened between two consecutive statuses of one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Recovered,
    WentDown,
    /// Went down (again) with the failure streak at or past the threshold.
    WentDownCritical { failures: u32 },
    /// Failure streak just reached the escalation threshold.
    Escalated { failures: u32 },
    /// Periodic reminder while the target stays down.
    StillDown { failures: u32 },
}

impl Verdict {
    pub fn kind(&self) -> AlertKind {
        match self {
            Verdict::Recovered => AlertKind::Up,
            Verdict::WentDown => AlertKind::Down,
            Verdict::WentDownCritical { .. }
            | Verdict::Escalated { .. }
            | Verdict::StillDown { .. } => AlertKind::Critical,
        }
    }

    /// Short status label used in alert texts.
    pub fn label(&self) -> String {
        match self {
            Verdict::Recovered => "UP".to_string(),
            Verdict::WentDown => "DOWN".to_string(),
            Verdict::WentDownCritical { failures } | Verdict::Escalated { failures } => {
                format!("DOWN (failures: {failures})")
            }
            Verdict::StillDown { failures } => format!("STILL DOWN (failures: {failures})"),
        }
    }
}

/// Failure streak of a single check loop.
///
/// Lives as long as the loop does; a restarted loop starts from zero.
#[derive(Debug, Default, Clone)]
pub struct FailurePolicy {
    consecutive_failures: u32,
}

impl FailurePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Feeds one result and returns the alert it calls for.
    pub fn observe(&mut self, was_up: bool, is_up: bool) -> Option<Verdict> {
        if is_up {
            self.consecutive_failures = 0;
            return (!was_up).then_some(Verdict::Recovered);
        }

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let failures = self.consecutive_failures;

        if was_up {
            if failures >= ESCALATION_THRESHOLD {
                Some(Verdict::WentDownCritical { failures })
            } else {
                Some(Verdict::WentDown)
            }
        } else if failures == ESCALATION_THRESHOLD {
            Some(Verdict::Escalated { failures })
        } else if failures % STILL_DOWN_REMINDER_EVERY == 0 {
            Some(Verdict::StillDown { failures })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Runs a sequence of results starting from `initial` and returns the verdict per step.
    fn run(initial: bool, results: &[bool]) -> Vec<Option<Verdict>> {
        let mut policy = FailurePolicy::new();
        let mut prev = initial;
        results
            .iter()
            .map(|&up| {
                let v = policy.observe(prev, up);
                prev = up;
                v
            })
            .collect()
    }

    #[test]
    fn up_to_up_is_silent() {
        assert_eq!(run(true, &[true, true, true]), vec![None, None, None]);
    }

    #[test]
    fn recovery_resets_the_streak() {
        let mut policy = FailurePolicy::new();
        policy.observe(true, false);
        policy.observe(false, false);
        assert_eq!(policy.consecutive_failures(), 2);
        assert_eq!(policy.observe(false, true), Some(Verdict::Recovered));
        assert_eq!(policy.consecutive_failures(), 0);
    }

    #[test]
    fn third_consecutive_down_after_up_is_critical() {
        let verdicts = run(true, &[false, false, false]);
        assert_eq!(verdicts[0], Some(Verdict::WentDown));
        assert_eq!(verdicts[1], None);
        assert_eq!(verdicts[2], Some(Verdict::Escalated { failures: 3 }));
        assert_eq!(verdicts[2].unwrap().kind(), AlertKind::Critical);
    }

    #[test]
    fn still_down_reminders_every_fifth_failure() {
        let verdicts = run(false, &[false; 15]);
        let critical_at: Vec<usize> = verdicts
            .iter()
            .enumerate()
            .filter(|(_, v)| matches!(v, Some(Verdict::StillDown { .. })))
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(critical_at, vec![5, 10, 15]);
        for n in 6..=9 {
            assert_eq!(verdicts[n - 1], None, "failure #{n} must stay silent");
        }
    }

    #[test]
    fn labels() {
        assert_eq!(Verdict::Recovered.label(), "UP");
        assert_eq!(Verdict::WentDown.label(), "DOWN");
        assert_eq!(
            Verdict::StillDown { failures: 10 }.label(),
            "STILL DOWN (failures: 10)"
        );
    }
}
