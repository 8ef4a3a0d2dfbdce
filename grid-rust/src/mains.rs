//! Mains-relay state machine.
//!
//! The relay backs the battery bus with AC power when solar cannot keep up.
//! Relay flips are expensive, so automatic mode runs on proposals: a state
//! change must hold unchanged for its dwell interval before it is committed.
//! The first evaluation after start-up commits immediately so the relay is
//! never left floating while timers run.

use std::time::Instant;

use tracing::{debug, info};

use crate::config::MainsMode;
use crate::power::MainsParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainsState {
    /// Start-up value, before the first sensor reading.
    Undecided,
    Off,
    On,
}

impl MainsState {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            MainsState::Undecided => None,
            MainsState::Off => Some(false),
            MainsState::On => Some(true),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Proposal {
    value: bool,
    since: Instant,
}

#[derive(Debug)]
pub struct MainsController {
    state: MainsState,
    proposal: Option<Proposal>,
}

impl MainsController {
    pub fn new() -> Self {
        Self {
            state: MainsState::Undecided,
            proposal: None,
        }
    }

    pub fn state(&self) -> MainsState {
        self.state
    }

    /// Re-evaluate the relay against a fresh SOC reading.
    ///
    /// Returns `Some(active)` when the relay state changed and must be
    /// actioned; `None` otherwise.
    pub fn reconsider(
        &mut self,
        soc: f32,
        mode: MainsMode,
        params: &MainsParams,
        now: Instant,
    ) -> Option<bool> {
        match mode {
            MainsMode::AlwaysOn => return self.force(true),
            MainsMode::AlwaysOff => return self.force(false),
            MainsMode::Auto => {}
        }

        let proposed = if soc < params.activate_soc {
            // Battery is getting low, propose enabling mains backup.
            Some(true)
        } else if soc >= params.deactivate_soc {
            Some(false)
        } else {
            None
        };

        if self.state == MainsState::Undecided {
            // First run: commit whatever the rule says. No proposal = no mains.
            info!("initial set for mains relay");
            self.proposal = proposed.map(|value| Proposal { value, since: now });
            return self.commit(proposed == Some(true));
        }

        let value = proposed?;

        match self.proposal {
            Some(p) if p.value == value => {
                if self.state.as_bool() == Some(value) {
                    // Proposing what we're already doing.
                    return None;
                }
                let dwell = if value {
                    params.activate_time
                } else {
                    params.deactivate_time
                };
                if now.duration_since(p.since) >= dwell {
                    return self.commit(value);
                }
                None
            }
            _ => {
                debug!("proposed mains relay state: {value}");
                self.proposal = Some(Proposal { value, since: now });
                None
            }
        }
    }

    fn force(&mut self, active: bool) -> Option<bool> {
        self.proposal = None;
        self.commit(active)
    }

    fn commit(&mut self, active: bool) -> Option<bool> {
        let next = if active { MainsState::On } else { MainsState::Off };
        if next == self.state {
            return None;
        }
        self.state = next;
        Some(active)
    }
}

impl Default for MainsController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn params() -> MainsParams {
        MainsParams {
            activate_soc: 45.0,
            activate_time: Duration::from_secs(5),
            deactivate_soc: 50.0,
            deactivate_time: Duration::from_secs(5),
        }
    }

    fn at(base: Instant, secs: f64) -> Instant {
        base + Duration::from_secs_f64(secs)
    }

    #[test]
    fn first_run_commits_without_dwell() {
        let mut mains = MainsController::new();
        let t0 = Instant::now();
        let change = mains.reconsider(30.0, MainsMode::Auto, &params(), t0);
        assert_eq!(change, Some(true));
        assert_eq!(mains.state(), MainsState::On);
    }

    #[test]
    fn first_run_without_proposal_settles_off() {
        let mut mains = MainsController::new();
        let t0 = Instant::now();
        // 47 is between activate (45) and deactivate (50): no proposal.
        let change = mains.reconsider(47.0, MainsMode::Auto, &params(), t0);
        assert_eq!(change, Some(false));
        assert_eq!(mains.state(), MainsState::Off);
    }

    #[test]
    fn activation_waits_out_the_dwell() {
        let mut mains = MainsController::new();
        let t0 = Instant::now();

        // t=0: SOC 50 proposes off; first run commits it.
        assert_eq!(mains.reconsider(50.0, MainsMode::Auto, &params(), t0), Some(false));
        // t=1: SOC drops, proposal flips to on; timer starts.
        assert_eq!(mains.reconsider(40.0, MainsMode::Auto, &params(), at(t0, 1.0)), None);
        // t=4: held 3 s of the 5 s dwell, no commit yet.
        assert_eq!(mains.reconsider(40.0, MainsMode::Auto, &params(), at(t0, 4.0)), None);
        assert_eq!(mains.state(), MainsState::Off);
        // t=5.9: still short of t=1 + 5 s... just barely.
        assert_eq!(mains.reconsider(40.0, MainsMode::Auto, &params(), at(t0, 5.9)), None);
        // t=6: dwell satisfied, relay goes on.
        assert_eq!(mains.reconsider(40.0, MainsMode::Auto, &params(), at(t0, 6.0)), Some(true));
        assert_eq!(mains.state(), MainsState::On);
    }

    #[test]
    fn flapping_readings_restart_the_timer() {
        let mut mains = MainsController::new();
        let t0 = Instant::now();
        mains.reconsider(50.0, MainsMode::Auto, &params(), t0);

        mains.reconsider(40.0, MainsMode::Auto, &params(), at(t0, 1.0));
        // SOC recovers above deactivate: proposal flips to off (current state).
        mains.reconsider(50.0, MainsMode::Auto, &params(), at(t0, 3.0));
        // Drops again; the on-proposal timer must restart here.
        mains.reconsider(40.0, MainsMode::Auto, &params(), at(t0, 4.0));
        assert_eq!(mains.reconsider(40.0, MainsMode::Auto, &params(), at(t0, 8.0)), None);
        assert_eq!(
            mains.reconsider(40.0, MainsMode::Auto, &params(), at(t0, 9.0)),
            Some(true)
        );
    }

    #[test]
    fn matching_proposal_is_a_no_op() {
        let mut mains = MainsController::new();
        let t0 = Instant::now();
        mains.reconsider(30.0, MainsMode::Auto, &params(), t0);
        assert_eq!(mains.state(), MainsState::On);
        // Still low; proposing on while on does nothing, forever.
        for s in 1..20 {
            assert_eq!(
                mains.reconsider(30.0, MainsMode::Auto, &params(), at(t0, s as f64)),
                None
            );
        }
    }

    #[test]
    fn overrides_bypass_proposals() {
        let mut mains = MainsController::new();
        let t0 = Instant::now();
        assert_eq!(mains.reconsider(100.0, MainsMode::AlwaysOn, &params(), t0), Some(true));
        assert_eq!(mains.reconsider(100.0, MainsMode::AlwaysOn, &params(), at(t0, 1.0)), None);
        assert_eq!(
            mains.reconsider(0.0, MainsMode::AlwaysOff, &params(), at(t0, 2.0)),
            Some(false)
        );
    }

    #[test]
    fn no_proposal_band_leaves_state_alone() {
        let mut mains = MainsController::new();
        let t0 = Instant::now();
        mains.reconsider(30.0, MainsMode::Auto, &params(), t0);
        // In the hysteresis band nothing changes.
        assert_eq!(mains.reconsider(47.0, MainsMode::Auto, &params(), at(t0, 60.0)), None);
        assert_eq!(mains.state(), MainsState::On);
    }
}
