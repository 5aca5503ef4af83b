//! The simulation engine: the state machine described in §4.6.
//!
//! `model` owns the durable `Simulation` value; every other submodule here
//! is a pure-ish operation that takes `&mut Simulation` (plus whatever
//! external collaborator it needs — an `Oracle`, a scenario lookup) and
//! returns the `Event`s it produced. Nothing in this module talks to the
//! state store or event bus directly; `crate::tasks` is the only caller
//! that threads those in, per §9's "ownership across components" note.

pub mod contact;
pub mod debrief;
pub mod dispatch;
pub mod escalation;
pub mod initiative;
pub mod intensity;
pub mod model;
pub mod time;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::{SimError, SimResult};
use crate::event::{Event, EventKind};
use crate::scenarios::{self, Scenario};
use model::Simulation;

/// `BACKGROUND_THREAD_CHECK_INTERVAL_REALTIME_SECONDS`: the base real-time
/// delay between self-rescheduled `background_check` runs (§9).
pub const BACKGROUND_CHECK_INTERVAL_REALTIME_SECONDS: f64 = 10.0;
/// Floor under which the self-reschedule delay never drops, regardless of
/// intensity or jitter.
pub const BACKGROUND_CHECK_MIN_DELAY_SECONDS: f64 = 5.0;

/// `BASE_ESCALATION_CHECK_INTERVAL_SECONDS`.
pub const BASE_ESCALATION_CHECK_INTERVAL_SECONDS: f64 = 150.0;
/// `BASE_IDLE_AGENT_UPDATE_INTERVAL_SECONDS`.
pub const BASE_IDLE_AGENT_UPDATE_INTERVAL_SECONDS: f64 = 240.0;
/// `AGENT_CONTACT_COOLDOWN_MINUTES`.
pub const AGENT_CONTACT_COOLDOWN_MINUTES: i64 = 3;
/// `BACKGROUND_LOG_NOISE_INTERVAL_SECONDS`.
pub const BACKGROUND_LOG_NOISE_INTERVAL_SECONDS: f64 = 60.0;

/// `INTENSITY_TIME_THRESHOLD_MINUTES`.
pub const INTENSITY_TIME_THRESHOLD_MINUTES: [f64; 2] = [10.0, 20.0];
/// `INTENSITY_ESCALATION_THRESHOLD`.
pub const INTENSITY_ESCALATION_THRESHOLD: [u32; 2] = [2, 4];
/// `INTENSITY_DECREASE_FACTOR`.
pub const INTENSITY_DECREASE_FACTOR: f64 = 0.90;

/// `AGENT_RESPONSE_TEMPERATURE` / `AGENT_RESPONSE_MAX_TOKENS`.
pub const AGENT_RESPONSE_TEMPERATURE: f32 = 0.7;
pub const AGENT_RESPONSE_MAX_TOKENS: u32 = 250;
/// `RATING_MAX_TOKENS`.
pub const RATING_MAX_TOKENS: u32 = 600;
/// `BRIEFING_FEEDBACK_MAX_TOKENS`.
pub const BRIEFING_FEEDBACK_MAX_TOKENS: u32 = 400;

/// Builds a brand-new `Simulation` from a scenario/intensity selection,
/// mirroring `SimulationManager.start_simulation`'s setup phase. Returns
/// the simulation plus the `simulation_started` event the caller should
/// publish once it has been saved.
pub fn start_new_simulation(
    simulation_id: String,
    owner_user_id: Option<String>,
    guest_id: Option<String>,
    player_name: String,
    player_role: String,
    scenario_key: &str,
    intensity_key: &str,
    duration_minutes: i64,
    now: DateTime<Utc>,
) -> SimResult<(Simulation, Event)> {
    let catalog = scenarios::scenario_catalog();
    let scenario = catalog
        .get(scenario_key)
        .ok_or_else(|| SimError::InvalidScenario(scenario_key.to_string()))?;

    let intensity_mod = scenario
        .intensity_modifier
        .resolve(intensity_key)
        .ok_or_else(|| SimError::InvalidScenario(format!("{}/{}", scenario_key, intensity_key)))?;

    let initial_status = (scenario.initial_system_status)();
    let initial_agent_overrides = (scenario.initial_agent_states)();

    let mut sim = Simulation::new(
        simulation_id,
        owner_user_id,
        guest_id,
        player_name,
        player_role,
        scenario_key.to_string(),
        intensity_mod,
        duration_minutes,
        initial_status.clone(),
        &initial_agent_overrides,
        now,
    );

    for (system_key, status) in &initial_status {
        sim.push_log(format!(
            "[{} / INFO] initial state: {} ({})",
            sim.sim_clock_face(),
            status,
            system_key
        ));
    }

    let event = Event::new(
        sim.simulation_id.clone(),
        EventKind::SimulationStarted {
            scenario: scenario.key.to_string(),
            description: scenario.description.to_string(),
            intensity_key: intensity_key.to_string(),
            current_intensity_mod: sim.current_intensity_mod,
            duration_minutes: sim.duration_minutes,
            player_name: sim.player_name.clone(),
            player_role: sim.player_role.clone(),
            start_time_iso: sim.simulation_start_time.to_rfc3339(),
            end_time_iso: sim.simulation_end_time.to_rfc3339(),
            current_sim_time_iso: sim.simulation_time.to_rfc3339(),
            initial_system_status: serde_json::to_value(&sim.system_status).unwrap_or_default(),
            initial_agent_status: agent_status_snapshot(&sim),
        },
    );

    sim.simulation_state = model::SimulationState::AwaitingPlayerChoice;

    Ok((sim, event))
}

/// Renders the agent roster's public state as a JSON map, for
/// `simulation_started`/`initial_state` payloads.
pub fn agent_status_snapshot(sim: &Simulation) -> serde_json::Value {
    let map: HashMap<&str, &str> = sim
        .agents
        .iter()
        .map(|(name, agent)| (name.as_str(), agent.state.as_str()))
        .collect();
    serde_json::to_value(map).unwrap_or_default()
}

/// Looks up the live scenario definition for a simulation's `scenario_key`.
pub fn scenario_for(sim: &Simulation) -> SimResult<Scenario> {
    scenarios::scenario_catalog()
        .remove(sim.scenario_key.as_str())
        .ok_or_else(|| SimError::InvalidScenario(sim.scenario_key.clone()))
}
