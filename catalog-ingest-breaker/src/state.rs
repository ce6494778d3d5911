//! Breaker state and its transition rules.
//!
//! [`BreakerSnapshot`] is plain data: it is what the state stores persist and
//! what operators see. The transition methods are pure functions of the
//! snapshot, the configuration and the current time, so the same rules apply
//! whichever store the snapshot came from.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::elapsed_between;
use crate::config::BreakerConfig;

/// The three breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Requests flow.
    Closed,
    /// Requests fail fast until the recovery timeout elapses.
    Open,
    /// A limited number of probe requests test whether the dependency recovered.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CLOSED" => Some(CircuitState::Closed),
            "OPEN" => Some(CircuitState::Open),
            "HALF_OPEN" => Some(CircuitState::HalfOpen),
            _ => None,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change, returned so the caller can log it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Full breaker state for one dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    /// Consecutive failures since the last success or reset.
    pub failure_count: u32,
    /// Consecutive successes while half-open.
    pub half_open_successes: u32,
    /// Probes allowed while half-open whose outcome has not been recorded yet.
    pub probes_in_flight: u32,
    /// Half-open to open transitions since the breaker last closed.
    pub reopen_count: u32,
    /// Times the breaker opened.
    pub trips: u64,
    /// Times the breaker closed again, automatically or by an operator.
    pub resets: u64,
    /// Requests refused without calling the dependency.
    pub rejected: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_state_change_at: DateTime<Utc>,
    /// When the most recent half-open slot was handed out.
    #[serde(default)]
    pub last_slot_granted_at: Option<DateTime<Utc>>,
}

impl BreakerSnapshot {
    /// A closed breaker with no history.
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            state: CircuitState::Closed,
            failure_count: 0,
            half_open_successes: 0,
            probes_in_flight: 0,
            reopen_count: 0,
            trips: 0,
            resets: 0,
            rejected: 0,
            last_failure_at: None,
            last_state_change_at: now,
            last_slot_granted_at: None,
        }
    }

    /// Recovery timeout currently in force, taking re-opens into account.
    pub fn current_recovery_timeout(&self, config: &BreakerConfig) -> Duration {
        config.recovery_timeout_after(self.reopen_count)
    }

    /// Decide whether a request may go through.
    ///
    /// An open breaker whose recovery timeout has elapsed moves to half-open
    /// here. A half-open breaker hands out at most
    /// `half_open_success_threshold` probes at a time. Slots whose outcome
    /// never arrives are reclaimed once a full recovery timeout has passed
    /// since the last one was granted.
    pub fn try_acquire(
        &mut self,
        config: &BreakerConfig,
        now: DateTime<Utc>,
    ) -> (bool, Option<Transition>) {
        let mut transition = None;

        if self.state == CircuitState::Open {
            let waited = elapsed_between(self.last_state_change_at, now);
            if waited < self.current_recovery_timeout(config) {
                self.rejected += 1;
                return (false, None);
            }
            transition = self.move_to(CircuitState::HalfOpen, now);
        }

        match self.state {
            CircuitState::Closed => (true, transition),
            CircuitState::HalfOpen => {
                if self.probes_in_flight >= config.half_open_success_threshold
                    && self.slots_expired(config, now)
                {
                    self.probes_in_flight = 0;
                }
                if self.probes_in_flight < config.half_open_success_threshold {
                    self.probes_in_flight += 1;
                    self.last_slot_granted_at = Some(now);
                    (true, transition)
                } else {
                    self.rejected += 1;
                    (false, transition)
                }
            }
            CircuitState::Open => (false, transition),
        }
    }

    /// Apply a successful call.
    pub fn on_success(
        &mut self,
        config: &BreakerConfig,
        now: DateTime<Utc>,
    ) -> Option<Transition> {
        match self.state {
            CircuitState::Closed => {
                self.failure_count = 0;
                None
            }
            CircuitState::HalfOpen => {
                self.probes_in_flight = self.probes_in_flight.saturating_sub(1);
                self.half_open_successes += 1;
                if self.half_open_successes >= config.half_open_success_threshold {
                    self.resets += 1;
                    self.move_to(CircuitState::Closed, now)
                } else {
                    None
                }
            }
            // A call that started before the breaker opened
            CircuitState::Open => None,
        }
    }

    /// Apply a failed call.
    pub fn on_failure(
        &mut self,
        config: &BreakerConfig,
        now: DateTime<Utc>,
    ) -> Option<Transition> {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure_at = Some(now);

        match self.state {
            CircuitState::Closed if self.failure_count >= config.failure_threshold => {
                self.trips += 1;
                self.move_to(CircuitState::Open, now)
            }
            CircuitState::HalfOpen => {
                self.trips += 1;
                self.reopen_count = self.reopen_count.saturating_add(1);
                self.move_to(CircuitState::Open, now)
            }
            _ => None,
        }
    }

    /// Force the breaker closed, clearing counters but keeping metrics.
    pub fn reset(&mut self, now: DateTime<Utc>) -> Option<Transition> {
        self.failure_count = 0;
        self.reopen_count = 0;
        if self.state == CircuitState::Closed {
            return None;
        }
        self.resets += 1;
        self.move_to(CircuitState::Closed, now)
    }

    fn slots_expired(&self, config: &BreakerConfig, now: DateTime<Utc>) -> bool {
        let granted = self.last_slot_granted_at.unwrap_or(self.last_state_change_at);
        elapsed_between(granted, now) >= self.current_recovery_timeout(config)
    }

    fn move_to(&mut self, to: CircuitState, now: DateTime<Utc>) -> Option<Transition> {
        let from = self.state;
        self.state = to;
        self.last_state_change_at = now;
        self.half_open_successes = 0;
        self.probes_in_flight = 0;
        self.last_slot_granted_at = None;
        if to == CircuitState::Closed {
            self.failure_count = 0;
            self.reopen_count = 0;
        }
        (from != to).then_some(Transition { from, to })
    }
}
