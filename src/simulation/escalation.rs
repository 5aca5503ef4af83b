//! The escalation rule engine (§4.6).
//!
//! Evaluated once per tick, gated on a sim-time interval that itself
//! shrinks as `current_intensity_mod` decays. At most one rule fires per
//! tick, even when several conditions are simultaneously true — the first
//! match in declared order wins and ends the pass.

use crate::event::{Event, EventKind};
use crate::log_generator;
use crate::scenarios::Scenario;
use crate::simulation::intensity::recompute_intensity;
use crate::simulation::model::Simulation;
use crate::simulation::BASE_ESCALATION_CHECK_INTERVAL_SECONDS;

/// Runs the escalation pass if due. Always advances
/// `last_escalation_check_time` when the interval-gated evaluation runs,
/// regardless of whether a rule fired (§4.6).
pub fn run_escalation_pass(sim: &mut Simulation, scenario: &Scenario) -> Vec<Event> {
    let mut events = Vec::new();

    let since_last_check =
        (sim.simulation_time - sim.last_escalation_check_time).num_milliseconds() as f64 / 1000.0;
    let interval = BASE_ESCALATION_CHECK_INTERVAL_SECONDS * sim.current_intensity_mod;
    if since_last_check < interval {
        return events;
    }
    sim.last_escalation_check_time = sim.simulation_time;

    let now_sim_utc = sim.simulation_time;
    for rule in &scenario.escalation_rules {
        if !rule.condition_met(sim, now_sim_utc) {
            continue;
        }
        if !rule.fire(sim) {
            continue;
        }

        sim.escalation_level += 1;
        sim.metrics.escalations_triggered += 1;

        if crate::simulation::model::is_critical_status(rule.action.new_status)
            && sim.metrics.time_to_first_critical.is_none()
        {
            sim.metrics.time_to_first_critical = Some(sim.simulation_time);
        }

        let mut details = std::collections::HashMap::new();
        details.insert("reason".to_string(), rule.action.reason.to_string());
        let (log_line, _severity) = log_generator::generate_log_entry(
            rule.action.log_event_type,
            "CRITICAL",
            rule.action.system,
            &details,
        );
        sim.push_log(format!("[{} / WARN] {}", sim.sim_clock_face(), log_line));

        events.push(Event::new(
            sim.simulation_id.clone(),
            EventKind::SystemStatusUpdate {
                system_key: rule.action.system.to_string(),
                status: rule.action.new_status.to_string(),
                reason: rule.action.reason.to_string(),
            },
        ));
        events.push(Event::new(
            sim.simulation_id.clone(),
            EventKind::Log {
                message: format!("ESCALATION: {}", rule.action.reason),
                level: "WARN".to_string(),
            },
        ));

        if let Some(event) = recompute_intensity(sim) {
            events.push(event);
        }

        break;
    }

    events
}
