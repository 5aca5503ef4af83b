//! Agent-initiative scanning (§4.6 "Agent initiative").
//!
//! A pure per-tick decision: given the current `Simulation`, which agent
//! (if any) wants to place an unprompted call, and is it a status update
//! or a fresh contact? Selecting a candidate is itself allowed to flip a
//! one-shot "already alerted" flag (Lynda Carney's encryption/critical
//! triggers) so the same condition doesn't reselect her every tick.
//! Actually placing the call is the caller's job, via
//! `contact::handle_agent_contact`.

use rand::seq::SliceRandom;

use crate::agents::{HAO_WANG, LYNDA_CARNEY, PAUL_KAHN};
use crate::simulation::model::{AgentRuntimeState, AgentState, Simulation};
use crate::simulation::{AGENT_CONTACT_COOLDOWN_MINUTES, BASE_IDLE_AGENT_UPDATE_INTERVAL_SECONDS};

/// `BASE_AGENT_INITIATIVE_DELAY_SECONDS["Paul Kahn"]`.
const PAUL_KAHN_INITIATIVE_DELAY_SECONDS: f64 = 300.0;

/// `true` once `agent.last_contact_time` is either unset or older than the
/// cooldown (§4.6: "whose `last_contact_time` is older than a sim-time
/// cooldown (3 sim-minutes)"). Never contacted is always past cooldown.
fn past_contact_cooldown(agent: &AgentRuntimeState, sim: &Simulation) -> bool {
    match agent.last_contact_time {
        Some(last) => {
            let since_minutes = (sim.simulation_time - last).num_seconds() as f64 / 60.0;
            since_minutes >= AGENT_CONTACT_COOLDOWN_MINUTES as f64
        }
        None => true,
    }
}

struct Candidate {
    agent_name: &'static str,
    is_update: bool,
    critical: bool,
}

fn paul_kahn_candidate(sim: &Simulation) -> Option<Candidate> {
    let agent = sim.agents.get(PAUL_KAHN)?;
    if !agent.state.is_initiative_eligible() {
        return None;
    }
    if !past_contact_cooldown(agent, sim) {
        return None;
    }
    if agent.flag("called_by_player") || agent.flag("attempted_call") {
        return None;
    }
    let elapsed = (sim.simulation_time - sim.simulation_start_time).num_seconds() as f64;
    if elapsed >= PAUL_KAHN_INITIATIVE_DELAY_SECONDS * sim.current_intensity_mod {
        Some(Candidate {
            agent_name: PAUL_KAHN,
            is_update: false,
            critical: false,
        })
    } else {
        None
    }
}

fn hao_wang_candidate(sim: &Simulation) -> Option<Candidate> {
    let agent = sim.agents.get(HAO_WANG)?;
    if agent.state != AgentState::Investigating {
        return None;
    }
    if !past_contact_cooldown(agent, sim) {
        return None;
    }
    let interval = BASE_IDLE_AGENT_UPDATE_INTERVAL_SECONDS * sim.current_intensity_mod;

    let wants_call = match agent.last_update_time.or(agent.last_contact_time) {
        Some(last) => {
            let since = (sim.simulation_time - last).num_seconds() as f64;
            since >= interval
        }
        None => {
            let elapsed = (sim.simulation_time - sim.simulation_start_time).num_seconds() as f64;
            elapsed > interval / 2.0
        }
    };

    if wants_call {
        Some(Candidate {
            agent_name: HAO_WANG,
            is_update: true,
            critical: false,
        })
    } else {
        None
    }
}

/// Lynda Carney's candidate is the only one that mutates state as a side
/// effect of being *considered*: if she qualifies on the encryption or
/// critical/compromised trigger, the corresponding one-shot flag is set
/// immediately so the same system status doesn't reselect her every tick
/// thereafter, regardless of whether this candidate ends up chosen.
fn lynda_carney_candidate(sim: &mut Simulation) -> Option<Candidate> {
    let roster_agent = sim.agents.get(LYNDA_CARNEY)?;
    if roster_agent.state != AgentState::BusyMonitoring {
        return None;
    }
    if !past_contact_cooldown(roster_agent, sim) {
        return None;
    }

    let has_encrypting = sim.system_status.values().any(|s| s.contains("ENCRYPTING"));
    let has_critical = sim
        .system_status
        .values()
        .any(|s| s.contains("CRITICAL") || s.contains("COMPROMISED"));

    let agent = sim.agents.get_mut(LYNDA_CARNEY)?;

    if has_encrypting && !agent.flag("alerted_encryption") {
        agent.set_flag("alerted_encryption", true);
        return Some(Candidate {
            agent_name: LYNDA_CARNEY,
            is_update: true,
            critical: true,
        });
    }
    if has_critical && !agent.flag("alerted_critical") {
        agent.set_flag("alerted_critical", true);
        return Some(Candidate {
            agent_name: LYNDA_CARNEY,
            is_update: true,
            critical: true,
        });
    }

    let interval = (BASE_IDLE_AGENT_UPDATE_INTERVAL_SECONDS / 1.5) * sim.current_intensity_mod;
    let wants_idle_call = match agent.last_update_time.or(agent.last_contact_time) {
        Some(last) => (sim.simulation_time - last).num_seconds() as f64 >= interval,
        None => (sim.simulation_time - sim.simulation_start_time).num_seconds() as f64 >= interval,
    };

    if wants_idle_call {
        Some(Candidate {
            agent_name: LYNDA_CARNEY,
            is_update: true,
            critical: false,
        })
    } else {
        None
    }
}

/// Scans the roster once and, if any agent wants to place an unprompted
/// call, returns `(agent_name, is_update)` for the single winner.
///
/// Among all agents that want to call, critical-tier candidates (Lynda
/// Carney's encryption/compromise alerts) outrank idle-update candidates;
/// ties within a tier are broken at random (§4.6).
pub fn scan_for_initiative(sim: &mut Simulation) -> Option<(String, bool)> {
    let mut candidates = Vec::new();
    if let Some(c) = paul_kahn_candidate(sim) {
        candidates.push(c);
    }
    if let Some(c) = hao_wang_candidate(sim) {
        candidates.push(c);
    }
    if let Some(c) = lynda_carney_candidate(sim) {
        candidates.push(c);
    }

    if candidates.is_empty() {
        return None;
    }

    let top_tier: Vec<&Candidate> = if candidates.iter().any(|c| c.critical) {
        candidates.iter().filter(|c| c.critical).collect()
    } else {
        candidates.iter().collect()
    };

    let mut rng = rand::thread_rng();
    top_tier
        .choose(&mut rng)
        .map(|c| (c.agent_name.to_string(), c.is_update))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::RANSOMWARE;
    use std::collections::HashMap;

    fn sample_sim() -> Simulation {
        let now = chrono::Utc::now();
        Simulation::new(
            "sim-init".into(),
            None,
            Some("sim-init".into()),
            "Player".into(),
            "CTO".into(),
            RANSOMWARE.into(),
            1.0,
            30,
            HashMap::new(),
            &HashMap::new(),
            now,
        )
    }

    #[test]
    fn paul_kahn_wants_a_call_after_his_delay_elapses() {
        let mut sim = sample_sim();
        sim.simulation_time = sim.simulation_time + chrono::Duration::seconds(301);
        let picked = scan_for_initiative(&mut sim);
        assert_eq!(picked, Some((PAUL_KAHN.to_string(), false)));
    }

    #[test]
    fn paul_kahn_is_suppressed_once_player_already_called_him() {
        let mut sim = sample_sim();
        sim.simulation_time = sim.simulation_time + chrono::Duration::seconds(301);
        sim.agents.get_mut(PAUL_KAHN).unwrap().set_flag("called_by_player", true);
        assert_eq!(scan_for_initiative(&mut sim), None);
    }

    #[test]
    fn hao_wang_wants_an_early_checkin_while_investigating() {
        let mut sim = sample_sim();
        sim.agents.get_mut(HAO_WANG).unwrap().state = AgentState::Investigating;
        sim.simulation_time = sim.simulation_time + chrono::Duration::seconds(130);
        let picked = scan_for_initiative(&mut sim);
        assert_eq!(picked, Some((HAO_WANG.to_string(), true)));
    }

    #[test]
    fn lynda_carney_escalation_alert_outranks_paul_kahns_idle_call() {
        let mut sim = sample_sim();
        sim.simulation_time = sim.simulation_time + chrono::Duration::seconds(301);
        sim.system_status
            .insert("File_Servers".to_string(), "ENCRYPTING".to_string());
        let picked = scan_for_initiative(&mut sim);
        assert_eq!(picked, Some((LYNDA_CARNEY.to_string(), true)));
        assert!(sim.agents.get(LYNDA_CARNEY).unwrap().flag("alerted_encryption"));
    }

    #[test]
    fn lynda_carney_does_not_realert_on_the_same_encryption_condition() {
        let mut sim = sample_sim();
        sim.system_status
            .insert("File_Servers".to_string(), "ENCRYPTING".to_string());
        sim.agents
            .get_mut(LYNDA_CARNEY)
            .unwrap()
            .set_flag("alerted_encryption", true);
        assert_eq!(scan_for_initiative(&mut sim), None);
    }

    #[test]
    fn nobody_wants_to_call_at_the_very_start() {
        let mut sim = sample_sim();
        assert_eq!(scan_for_initiative(&mut sim), None);
    }

    #[test]
    fn lynda_carneys_idle_call_is_suppressed_within_the_contact_cooldown() {
        // Her idle interval (240/1.5 = 160s) is shorter than the 3-minute
        // (180s) contact cooldown, so the cooldown is the binding
        // constraint between 160s and 180s since last contact.
        let mut sim = sample_sim();
        sim.agents.get_mut(LYNDA_CARNEY).unwrap().state = AgentState::BusyMonitoring;
        let contacted_at = sim.simulation_time;
        sim.agents.get_mut(LYNDA_CARNEY).unwrap().last_contact_time = Some(contacted_at);
        sim.simulation_time = sim.simulation_time + chrono::Duration::seconds(170);
        assert_eq!(scan_for_initiative(&mut sim), None);
    }

    #[test]
    fn lynda_carneys_idle_call_fires_once_past_both_interval_and_cooldown() {
        let mut sim = sample_sim();
        sim.agents.get_mut(LYNDA_CARNEY).unwrap().state = AgentState::BusyMonitoring;
        let contacted_at = sim.simulation_time;
        sim.agents.get_mut(LYNDA_CARNEY).unwrap().last_contact_time = Some(contacted_at);
        sim.simulation_time = sim.simulation_time + chrono::Duration::seconds(181);
        assert_eq!(scan_for_initiative(&mut sim), Some((LYNDA_CARNEY.to_string(), true)));
    }
}
