//! Dynamic intensity decay (§4.6).
//!
//! Two independent candidate chains — one keyed off elapsed sim-time, one
//! off `escalation_level` — are each recomputed from
//! `initial_intensity_mod` every tick; the lower of the two wins, and the
//! result only ever ratchets `current_intensity_mod` downward.

use crate::event::{Event, EventKind};
use crate::simulation::model::{Simulation, MIN_INTENSITY_MOD};
use crate::simulation::{
    INTENSITY_DECREASE_FACTOR, INTENSITY_ESCALATION_THRESHOLD, INTENSITY_TIME_THRESHOLD_MINUTES,
};

/// Below this, a "decrease" is treated as no change (§4.6: "a change below
/// a 0.001 epsilon is treated as no change").
const INTENSITY_EPSILON: f64 = 0.001;

fn time_candidate(sim: &Simulation) -> f64 {
    let elapsed_minutes =
        (sim.simulation_time - sim.simulation_start_time).num_seconds() as f64 / 60.0;
    let crossings = INTENSITY_TIME_THRESHOLD_MINUTES
        .iter()
        .filter(|&&threshold| elapsed_minutes >= threshold)
        .count() as i32;
    sim.initial_intensity_mod * INTENSITY_DECREASE_FACTOR.powi(crossings)
}

fn escalation_candidate(sim: &Simulation) -> f64 {
    let crossings = INTENSITY_ESCALATION_THRESHOLD
        .iter()
        .filter(|&&threshold| sim.escalation_level >= threshold)
        .count() as i32;
    sim.initial_intensity_mod * INTENSITY_DECREASE_FACTOR.powi(crossings)
}

/// Recomputes `current_intensity_mod`. Returns an `intensity_update` event
/// iff the value strictly decreased (beyond epsilon).
pub fn recompute_intensity(sim: &mut Simulation) -> Option<Event> {
    let target = time_candidate(sim)
        .min(escalation_candidate(sim))
        .max(MIN_INTENSITY_MOD);

    let new_value = sim.current_intensity_mod.min(target);
    if sim.current_intensity_mod - new_value <= INTENSITY_EPSILON {
        return None;
    }

    sim.current_intensity_mod = new_value;
    Some(Event::new(
        sim.simulation_id.clone(),
        EventKind::IntensityUpdate {
            current_intensity_mod: new_value,
            reason: "Intensity decay".to_string(),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::RANSOMWARE;
    use std::collections::HashMap;

    fn sim_with_elapsed_minutes(minutes: i64, escalation_level: u32) -> Simulation {
        let now = chrono::Utc::now();
        let mut sim = Simulation::new(
            "sim-1".into(),
            None,
            Some("sim-1".into()),
            "Player".into(),
            "CTO".into(),
            RANSOMWARE.into(),
            1.0,
            60,
            HashMap::new(),
            &HashMap::new(),
            now,
        );
        sim.simulation_time = now + chrono::Duration::minutes(minutes);
        sim.escalation_level = escalation_level;
        sim
    }

    #[test]
    fn no_decrease_below_thresholds_is_a_no_op() {
        let mut sim = sim_with_elapsed_minutes(5, 0);
        assert!(recompute_intensity(&mut sim).is_none());
        assert_eq!(sim.current_intensity_mod, 1.0);
    }

    #[test]
    fn ten_minute_threshold_drops_intensity_by_one_factor() {
        let mut sim = sim_with_elapsed_minutes(10, 0);
        let event = recompute_intensity(&mut sim);
        assert!(event.is_some());
        assert!((sim.current_intensity_mod - 0.9).abs() < 1e-9);
    }

    #[test]
    fn escalation_axis_can_be_the_lower_candidate() {
        let mut sim = sim_with_elapsed_minutes(5, 2);
        recompute_intensity(&mut sim);
        assert!((sim.current_intensity_mod - 0.9).abs() < 1e-9);
    }

    #[test]
    fn both_axes_crossed_compounds_to_the_lower_candidate() {
        let mut sim = sim_with_elapsed_minutes(20, 2);
        recompute_intensity(&mut sim);
        // time axis: 0.9^2 = 0.81; escalation axis: 0.9^1 = 0.9; min = 0.81.
        assert!((sim.current_intensity_mod - 0.81).abs() < 1e-9);
    }

    #[test]
    fn never_drops_below_the_floor() {
        let mut sim = sim_with_elapsed_minutes(20, 4);
        sim.initial_intensity_mod = 0.6;
        recompute_intensity(&mut sim);
        assert!(sim.current_intensity_mod >= MIN_INTENSITY_MOD);
    }

    #[test]
    fn intensity_never_increases_across_repeated_calls() {
        let mut sim = sim_with_elapsed_minutes(20, 4);
        recompute_intensity(&mut sim);
        let after_first = sim.current_intensity_mod;
        sim.simulation_time = sim.simulation_time - chrono::Duration::minutes(15);
        sim.escalation_level = 0;
        recompute_intensity(&mut sim);
        assert!(sim.current_intensity_mod <= after_first);
    }
}
