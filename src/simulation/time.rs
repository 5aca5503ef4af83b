//! The time model (§4.6): real-time → sim-time reconciliation and the
//! terminal-condition check that follows every advance.
//!
//! `sync_time` and `check_end_conditions` are the only two functions in
//! this crate permitted to mutate `simulation_time` — per §9's "time as
//! data, not control flow" note, every other handler treats it read-only.

use chrono::{DateTime, Utc};

use crate::event::{Event, EventKind};
use crate::scenarios::Scenario;
use crate::simulation::model::{Simulation, SimulationState};

/// Sub-100ms wall-clock deltas are treated as a no-op: no advance, no
/// `time_update`. This is what makes back-to-back `background_check`
/// calls with no real elapsed time idempotent (§8 property 6).
const MIN_ADVANCE_MILLIS: i64 = 100;

/// Advances `simulation_time` by the wall-clock delta since
/// `last_real_time_sync`, clamped to not overshoot `simulation_end_time`.
/// Returns a `time_update` event iff the advance was strictly positive.
pub fn sync_time(sim: &mut Simulation, now_wallclock: DateTime<Utc>) -> Option<Event> {
    let delta = now_wallclock - sim.last_real_time_sync;
    if delta.num_milliseconds() < MIN_ADVANCE_MILLIS {
        return None;
    }

    let remaining = sim.simulation_end_time - sim.simulation_time;
    let advance = if delta > remaining { remaining } else { delta };
    sim.last_real_time_sync = now_wallclock;

    if advance.num_milliseconds() <= 0 {
        return None;
    }

    sim.simulation_time = sim.simulation_time + advance;
    if sim.simulation_time > sim.simulation_end_time {
        sim.simulation_time = sim.simulation_end_time;
    }

    Some(Event::new(
        sim.simulation_id.clone(),
        EventKind::TimeUpdate {
            sim_time_iso: sim.simulation_time.to_rfc3339(),
            end_time_iso: sim.simulation_end_time.to_rfc3339(),
        },
    ))
}

/// `true` while the simulation is still eligible to hit an end condition:
/// running, and not already past the crisis boundary.
fn eligible_for_end_check(sim: &Simulation) -> bool {
    sim.simulation_running
        && !matches!(
            sim.simulation_state,
            SimulationState::Ended
                | SimulationState::PostInitialCrisis
                | SimulationState::DecisionPointShutdown
                | SimulationState::AwaitingAnalystBriefing
        )
}

/// Checks the two end conditions (§4.6) after a time advance: reaching
/// `simulation_end_time`, or the scenario's critical-failure status.
/// Transitions to `POST_INITIAL_CRISIS` and emits `state_change` +
/// `display_message` on either. Returns `true` iff an end condition fired.
pub fn check_end_conditions(sim: &mut Simulation, scenario: &Scenario, events: &mut Vec<Event>) -> bool {
    if !eligible_for_end_check(sim) {
        return false;
    }

    let time_expired = sim.simulation_time >= sim.simulation_end_time;
    let (critical_system, critical_status) = scenario.critical_failure;
    let critical_failure = critical_system != "__none__"
        && sim
            .system_status
            .get(critical_system)
            .map(|s| s == critical_status)
            .unwrap_or(false);

    if !time_expired && !critical_failure {
        return false;
    }

    if time_expired {
        sim.simulation_time = sim.simulation_end_time;
    }

    let old_state = sim.simulation_state.as_str().to_string();
    sim.simulation_state = SimulationState::PostInitialCrisis;

    events.push(Event::new(
        sim.simulation_id.clone(),
        EventKind::StateChange {
            old_state,
            new_state: sim.simulation_state.as_str().to_string(),
        },
    ));
    events.push(Event::new(
        sim.simulation_id.clone(),
        EventKind::DisplayMessage {
            source: "System".to_string(),
            message: "Transitioning to debrief phase.".to_string(),
            notification: None,
        },
    ));

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::{self, RANSOMWARE};
    use std::collections::HashMap;

    fn sample_sim(now: DateTime<Utc>, duration_minutes: i64) -> Simulation {
        Simulation::new(
            "sim-time-test".into(),
            None,
            Some("sim-time-test".into()),
            "Player".into(),
            "CTO".into(),
            RANSOMWARE.into(),
            1.0,
            duration_minutes,
            HashMap::new(),
            &HashMap::new(),
            now,
        )
    }

    #[test]
    fn sub_100ms_delta_is_a_no_op() {
        let now = Utc::now();
        let mut sim = sample_sim(now, 30);
        let event = sync_time(&mut sim, now + chrono::Duration::milliseconds(50));
        assert!(event.is_none());
        assert_eq!(sim.simulation_time, now);
    }

    #[test]
    fn positive_delta_advances_time_and_emits_event() {
        let now = Utc::now();
        let mut sim = sample_sim(now, 30);
        let later = now + chrono::Duration::seconds(10);
        let event = sync_time(&mut sim, later);
        assert!(event.is_some());
        assert_eq!(sim.simulation_time, later);
        assert_eq!(sim.last_real_time_sync, later);
    }

    #[test]
    fn advance_clamps_to_end_time() {
        let now = Utc::now();
        let mut sim = sample_sim(now, 1);
        let far_future = now + chrono::Duration::hours(5);
        sync_time(&mut sim, far_future);
        assert_eq!(sim.simulation_time, sim.simulation_end_time);
    }

    #[test]
    fn time_expiry_transitions_to_post_initial_crisis() {
        let now = Utc::now();
        let mut sim = sample_sim(now, 1);
        sim.simulation_time = sim.simulation_end_time;
        let catalog = scenarios::scenario_catalog();
        let scenario = &catalog[RANSOMWARE];
        let mut events = Vec::new();
        let fired = check_end_conditions(&mut sim, scenario, &mut events);
        assert!(fired);
        assert_eq!(sim.simulation_state, SimulationState::PostInitialCrisis);
        assert!(events.iter().any(|e| e.type_str() == "state_change"));
    }

    #[test]
    fn critical_failure_status_ends_the_run_before_time_expires() {
        let now = Utc::now();
        let mut sim = sample_sim(now, 30);
        sim.system_status
            .insert("File_Servers".to_string(), "ENCRYPTED (CRITICAL)".to_string());
        let catalog = scenarios::scenario_catalog();
        let scenario = &catalog[RANSOMWARE];
        let mut events = Vec::new();
        let fired = check_end_conditions(&mut sim, scenario, &mut events);
        assert!(fired);
        assert_eq!(sim.simulation_state, SimulationState::PostInitialCrisis);
    }

    #[test]
    fn already_ended_sim_is_not_reevaluated() {
        let now = Utc::now();
        let mut sim = sample_sim(now, 1);
        sim.simulation_state = SimulationState::Ended;
        sim.simulation_time = sim.simulation_end_time;
        let catalog = scenarios::scenario_catalog();
        let scenario = &catalog[RANSOMWARE];
        let mut events = Vec::new();
        assert!(!check_end_conditions(&mut sim, scenario, &mut events));
        assert!(events.is_empty());
    }
}
