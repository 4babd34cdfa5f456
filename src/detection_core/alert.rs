//! Alert smoothing with a hysteresis band
//!
//! Raising an alert needs `on_count` anomalous windows among the most recent
//! `history_len`, and may happen before the history has filled. Clearing it
//! needs a full history with at most `off_count` anomalous windows.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum AlertState {
    #[default]
    Inactive,
    Active,
}

impl AlertState {
    pub fn is_active(&self) -> bool {
        matches!(self, AlertState::Active)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlertPolicyError {
    #[error("alert history length must be at least 1")]
    EmptyHistory,
    #[error("on_count {on_count} must be between 1 and history length {history_len}")]
    OnCountOutOfRange { on_count: usize, history_len: usize },
    #[error("off_count {off_count} must be below on_count {on_count}")]
    OffCountNotBelowOn { off_count: usize, on_count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPolicy {
    pub history_len: usize,
    pub on_count: usize,
    pub off_count: usize,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            history_len: 5,
            on_count: 3,
            off_count: 0,
        }
    }
}

impl AlertPolicy {
    pub fn validate(&self) -> Result<(), AlertPolicyError> {
        if self.history_len == 0 {
            return Err(AlertPolicyError::EmptyHistory);
        }
        if self.on_count == 0 || self.on_count > self.history_len {
            return Err(AlertPolicyError::OnCountOutOfRange {
                on_count: self.on_count,
                history_len: self.history_len,
            });
        }
        if self.off_count >= self.on_count {
            return Err(AlertPolicyError::OffCountNotBelowOn {
                off_count: self.off_count,
                on_count: self.on_count,
            });
        }
        Ok(())
    }
}

/// Fixed-capacity ring of the most recent raw anomaly flags
#[derive(Debug, Clone)]
pub struct AlertHistory {
    slots: Box<[bool]>,
    next: usize,
    len: usize,
    anomalous: usize,
}

impl AlertHistory {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![false; capacity.max(1)].into_boxed_slice(),
            next: 0,
            len: 0,
            anomalous: 0,
        }
    }

    pub fn push(&mut self, is_anomaly: bool) {
        if self.is_full() && self.slots[self.next] {
            self.anomalous -= 1;
        }

        self.slots[self.next] = is_anomaly;
        if is_anomaly {
            self.anomalous += 1;
        }

        self.next = (self.next + 1) % self.slots.len();
        self.len = (self.len + 1).min(self.slots.len());
    }

    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn anomalous_count(&self) -> usize {
        self.anomalous
    }
}

/// Two-state debounce machine over an [`AlertHistory`]
#[derive(Debug, Clone)]
pub struct AlertStateMachine {
    policy: AlertPolicy,
    history: AlertHistory,
    state: AlertState,
}

impl AlertStateMachine {
    pub fn new(policy: AlertPolicy) -> Result<Self, AlertPolicyError> {
        policy.validate()?;

        Ok(Self {
            policy,
            history: AlertHistory::new(policy.history_len),
            state: AlertState::Inactive,
        })
    }

    /// Record one raw decision and apply the transition rules in order
    pub fn update(&mut self, is_anomaly: bool) -> AlertState {
        self.history.push(is_anomaly);

        let anomalous = self.history.anomalous_count();
        let next = if anomalous >= self.policy.on_count {
            AlertState::Active
        } else if self.history.is_full() && anomalous <= self.policy.off_count {
            AlertState::Inactive
        } else {
            self.state
        };

        if next != self.state {
            log::debug!(
                "alert {:?} -> {:?} ({}/{} anomalous)",
                self.state,
                next,
                anomalous,
                self.history.len()
            );
        }

        self.state = next;
        self.state
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    pub fn history(&self) -> &AlertHistory {
        &self.history
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> AlertStateMachine {
        AlertStateMachine::new(AlertPolicy::default()).unwrap()
    }

    #[test]
    fn test_history_ring_counts() {
        let mut history = AlertHistory::new(3);
        history.push(true);
        history.push(true);
        assert!(!history.is_full());
        assert_eq!(history.anomalous_count(), 2);

        history.push(false);
        assert!(history.is_full());

        // evicts the first `true`
        history.push(false);
        assert_eq!(history.len(), 3);
        assert_eq!(history.anomalous_count(), 1);

        history.push(false);
        assert_eq!(history.anomalous_count(), 0);
    }

    #[test]
    fn test_activates_before_history_full() {
        let mut alerts = machine();

        assert_eq!(alerts.update(true), AlertState::Inactive);
        assert_eq!(alerts.update(true), AlertState::Inactive);
        assert_eq!(alerts.update(true), AlertState::Active);
        assert!(!alerts.history().is_full());
    }

    #[test]
    fn test_clears_only_with_full_clean_history() {
        let mut alerts = machine();
        for _ in 0..3 {
            alerts.update(true);
        }
        assert!(alerts.state().is_active());

        // anomalies still in the history keep the alert raised
        for _ in 0..4 {
            assert_eq!(alerts.update(false), AlertState::Active);
        }
        assert_eq!(alerts.update(false), AlertState::Inactive);
    }

    #[test]
    fn test_partial_history_does_not_clear() {
        let mut alerts = AlertStateMachine::new(AlertPolicy {
            history_len: 5,
            on_count: 1,
            off_count: 0,
        })
        .unwrap();

        assert_eq!(alerts.update(true), AlertState::Active);
        for _ in 0..3 {
            assert_eq!(alerts.update(false), AlertState::Active);
        }
        assert!(!alerts.history().is_full());

        // history full, but the first `true` is still in it
        assert_eq!(alerts.update(false), AlertState::Active);
        assert_eq!(alerts.update(false), AlertState::Inactive);
    }

    #[test]
    fn test_hysteresis_band_holds_state() {
        let mut alerts = machine();
        for decision in [true, false, true, false, false] {
            alerts.update(decision);
        }
        // 2 anomalous: neither on (>=3) nor off (<=0)
        assert_eq!(alerts.state(), AlertState::Inactive);

        for decision in [true, true] {
            alerts.update(decision);
        }
        assert_eq!(alerts.state(), AlertState::Active);

        alerts.update(false);
        alerts.update(false);
        assert_eq!(alerts.history().anomalous_count(), 2);
        assert_eq!(alerts.state(), AlertState::Active);
    }

    #[test]
    fn test_policy_validation() {
        assert!(AlertPolicy::default().validate().is_ok());

        let empty = AlertPolicy { history_len: 0, on_count: 1, off_count: 0 };
        assert_eq!(empty.validate(), Err(AlertPolicyError::EmptyHistory));

        let too_many = AlertPolicy { history_len: 5, on_count: 6, off_count: 0 };
        assert!(matches!(
            too_many.validate(),
            Err(AlertPolicyError::OnCountOutOfRange { .. })
        ));

        let overlapping = AlertPolicy { history_len: 5, on_count: 3, off_count: 3 };
        assert!(AlertStateMachine::new(overlapping).is_err());
    }
}
