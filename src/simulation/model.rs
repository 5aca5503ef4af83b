//! The durable `Simulation` value object and its supporting types.
//!
//! This is the thing that gets loaded at the top of every task handler,
//! mutated in place, and saved at the bottom. Nothing here talks to the
//! state store, the event bus, or the oracle directly — those are
//! threaded in by the task runtime (`crate::tasks`) and the engine
//! operations (`crate::simulation::*`) that take `&mut Simulation`.

use std::collections::{BTreeSet, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::default_agent_table;

/// Rolling history caps: last ~100 log lines, last ~50 player actions.
pub const EVENT_LOG_HISTORY_CAP: usize = 100;
pub const PLAYER_ACTION_LOG_CAP: usize = 50;

pub const MIN_INTENSITY_MOD: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationState {
    Setup,
    InitialAlert,
    AwaitingPlayerChoice,
    InConversation,
    DecisionPointShutdown,
    PostInitialCrisis,
    AwaitingAnalystBriefing,
    AwaitingUserRating,
    Ended,
    Error,
}

impl SimulationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimulationState::Setup => "SETUP",
            SimulationState::InitialAlert => "INITIAL_ALERT",
            SimulationState::AwaitingPlayerChoice => "AWAITING_PLAYER_CHOICE",
            SimulationState::InConversation => "IN_CONVERSATION",
            SimulationState::DecisionPointShutdown => "DECISION_POINT_SHUTDOWN",
            SimulationState::PostInitialCrisis => "POST_INITIAL_CRISIS",
            SimulationState::AwaitingAnalystBriefing => "AWAITING_ANALYST_BRIEFING",
            SimulationState::AwaitingUserRating => "AWAITING_USER_RATING",
            SimulationState::Ended => "ENDED",
            SimulationState::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownDirective {
    Pending,
    Hold,
    Targeted,
    Broad,
}

impl ShutdownDirective {
    /// Parses the three player-facing directive words from `decide`'s
    /// follow-up prompt. `pending` is not player-enterable.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "hold" => Some(ShutdownDirective::Hold),
            "targeted" => Some(ShutdownDirective::Targeted),
            "broad" => Some(ShutdownDirective::Broad),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerDecisions {
    pub shutdown_directive: ShutdownDirective,
}

impl Default for PlayerDecisions {
    fn default() -> Self {
        PlayerDecisions {
            shutdown_directive: ShutdownDirective::Pending,
        }
    }
}

/// An NPC's small state machine, per the glossary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Available,
    Investigating,
    BusyMonitoring,
    BusyExternalCall,
    OnCallWithCto,
    WaitingCtoResponse,
    TryingToCallCto,
}

/// Per-agent runtime state carried inside a `Simulation`.
///
/// `conversation_history` is intentionally `#[serde(skip)]`: it is never
/// persisted across task boundaries (§9 Design Notes). Every load starts
/// every agent's history empty; a handler may append to it during its own
/// invocation only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRuntimeState {
    pub role: String,
    pub persona_prompt: String,
    pub update_persona_prompt: Option<String>,
    pub state: AgentState,
    pub flags: HashMap<String, bool>,
    pub last_contact_time: Option<DateTime<Utc>>,
    pub last_update_time: Option<DateTime<Utc>>,
    pub last_initiative_check_time: Option<DateTime<Utc>>,
    #[serde(skip, default)]
    pub conversation_history: Vec<(String, String)>,
}

impl AgentRuntimeState {
    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    pub fn set_flag(&mut self, name: &str, value: bool) {
        self.flags.insert(name.to_string(), value);
    }
}

impl AgentState {
    /// Wire representation, matching the glossary's state names.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Available => "available",
            AgentState::Investigating => "investigating",
            AgentState::BusyMonitoring => "busy_monitoring",
            AgentState::BusyExternalCall => "busy_external_call",
            AgentState::OnCallWithCto => "on_call_with_cto",
            AgentState::WaitingCtoResponse => "waiting_cto_response",
            AgentState::TryingToCallCto => "trying_to_call_cto",
        }
    }

    /// `true` for the three states agent-initiative scans over (§4.6).
    pub fn is_initiative_eligible(&self) -> bool {
        matches!(
            self,
            AgentState::Available | AgentState::Investigating | AgentState::BusyMonitoring
        )
    }
}

/// Aggregated performance metrics, surfaced in the debrief.
///
/// `compromised_set` backs `systems_compromised_count`'s dedup logic and
/// is never serialized — it is recomputed from `system_status` on load
/// instead of persisted redundantly alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    pub time_to_first_critical: Option<DateTime<Utc>>,
    pub systems_compromised_count: u32,
    pub agents_contacted: BTreeSet<String>,
    pub critical_agent_contact_time: HashMap<String, DateTime<Utc>>,
    pub time_wasted_waiting_seconds: f64,
    pub escalations_triggered: u32,
    pub key_actions_taken: Vec<(String, String, String)>,
    #[serde(skip, default)]
    pub compromised_set: BTreeSet<String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            time_to_first_critical: None,
            systems_compromised_count: 0,
            agents_contacted: BTreeSet::new(),
            critical_agent_contact_time: HashMap::new(),
            time_wasted_waiting_seconds: 0.0,
            escalations_triggered: 0,
            key_actions_taken: Vec::new(),
            compromised_set: BTreeSet::new(),
        }
    }
}

/// True for status strings like `ENCRYPTED (CRITICAL)`, `COMPROMISED
/// (CRITICAL)`, or any other status containing one of the three critical
/// markers.
pub fn is_critical_status(status: &str) -> bool {
    ["CRITICAL", "COMPROMISED", "ENCRYPTED"]
        .iter()
        .any(|marker| status.contains(marker))
}

/// The durable value object described in §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    // Identity
    pub simulation_id: String,
    pub owner_user_id: Option<String>,
    pub guest_id: Option<String>,

    // Configuration
    pub scenario_key: String,
    pub initial_intensity_mod: f64,
    pub duration_minutes: i64,
    pub player_name: String,
    pub player_role: String,

    // Time
    pub simulation_start_time: DateTime<Utc>,
    pub simulation_end_time: DateTime<Utc>,
    pub simulation_time: DateTime<Utc>,
    pub last_real_time_sync: DateTime<Utc>,
    pub last_escalation_check_time: DateTime<Utc>,
    pub last_intensity_check_time: DateTime<Utc>,
    pub last_background_noise_time: DateTime<Utc>,

    // Dynamic state
    pub simulation_state: SimulationState,
    pub simulation_running: bool,
    pub current_intensity_mod: f64,
    pub escalation_level: u32,
    pub player_decisions: PlayerDecisions,
    pub active_conversation_partner: Option<String>,
    pub waiting_call_agent_name: Option<String>,
    pub missed_calls: Vec<String>,

    // System map
    pub system_status: HashMap<String, String>,

    // Agent table
    pub agents: HashMap<String, AgentRuntimeState>,

    // Metrics
    pub metrics: Metrics,

    // Logs
    pub event_log_history: VecDeque<String>,
    pub player_action_log: VecDeque<(String, String, Option<String>)>,
}

impl Simulation {
    /// Constructs a freshly-started simulation. Mirrors
    /// `SimulationManager.start_simulation`'s reset-then-initialize flow.
    pub fn new(
        simulation_id: String,
        owner_user_id: Option<String>,
        guest_id: Option<String>,
        player_name: String,
        player_role: String,
        scenario_key: String,
        initial_intensity_mod: f64,
        duration_minutes: i64,
        initial_system_status: HashMap<String, String>,
        initial_agent_overrides: &HashMap<String, AgentState>,
        now: DateTime<Utc>,
    ) -> Self {
        let duration_minutes = if duration_minutes <= 0 {
            crate::scenarios::DEFAULT_SIM_DURATION_MINUTES
        } else {
            duration_minutes
        };

        let mut agents = default_agent_table();
        for (name, state) in initial_agent_overrides {
            if let Some(agent) = agents.get_mut(name) {
                agent.state = *state;
            }
        }
        for agent in agents.values_mut() {
            agent.last_initiative_check_time = Some(now);
        }

        Simulation {
            simulation_id,
            owner_user_id,
            guest_id,
            scenario_key,
            initial_intensity_mod,
            duration_minutes,
            player_name,
            player_role,
            simulation_start_time: now,
            simulation_end_time: now + chrono::Duration::minutes(duration_minutes),
            simulation_time: now,
            last_real_time_sync: now,
            last_escalation_check_time: now,
            last_intensity_check_time: now,
            last_background_noise_time: now,
            simulation_state: SimulationState::InitialAlert,
            simulation_running: true,
            current_intensity_mod: initial_intensity_mod,
            escalation_level: 0,
            player_decisions: PlayerDecisions::default(),
            active_conversation_partner: None,
            waiting_call_agent_name: None,
            missed_calls: Vec::new(),
            system_status: initial_system_status,
            agents,
            metrics: Metrics::default(),
            event_log_history: VecDeque::new(),
            player_action_log: VecDeque::new(),
        }
    }

    /// Recomputes `metrics.compromised_set` from `system_status` — called
    /// after every deserialization, since the set itself is never
    /// persisted.
    pub fn reconstruct_compromised_set(&mut self) {
        self.metrics.compromised_set = self
            .system_status
            .iter()
            .filter(|(_, status)| is_critical_status(status))
            .map(|(key, _)| key.clone())
            .collect();
    }

    pub fn push_log(&mut self, line: String) {
        self.event_log_history.push_back(line);
        while self.event_log_history.len() > EVENT_LOG_HISTORY_CAP {
            self.event_log_history.pop_front();
        }
    }

    pub fn push_player_action(&mut self, sim_time_iso: String, action: String, target: Option<String>) {
        self.player_action_log.push_back((sim_time_iso, action, target));
        while self.player_action_log.len() > PLAYER_ACTION_LOG_CAP {
            self.player_action_log.pop_front();
        }
    }

    /// `true` if any system currently carries a critical-marker status.
    pub fn any_system_critical(&self) -> bool {
        self.system_status.values().any(|s| is_critical_status(s))
    }

    /// `HH:MM:SS` clock face derived from `simulation_time`, used in the
    /// rolling event log's `"[HH:MM:SS / LEVEL] message"` format.
    pub fn sim_clock_face(&self) -> String {
        self.simulation_time.format("%H:%M:%S").to_string()
    }

    /// Scans `player_action_log` in reverse for a matching mitigating
    /// action at or after `since`. Mirrors `check_recent_player_action`.
    pub fn check_recent_player_action(
        &self,
        kind: &str,
        target: Option<&str>,
        since: DateTime<Utc>,
    ) -> bool {
        for (sim_time_iso, action, action_target) in self.player_action_log.iter().rev() {
            let Ok(logged_at) = DateTime::parse_from_rfc3339(sim_time_iso) else {
                continue;
            };
            let logged_at = logged_at.with_timezone(&Utc);
            if logged_at < since {
                break;
            }
            if action != kind {
                continue;
            }
            match (target, action_target) {
                (Some(expected), Some(actual)) if expected == actual => return true,
                (None, _) => return true,
                _ => continue,
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_critical_status_detects_all_three_markers() {
        assert!(is_critical_status("ENCRYPTED (CRITICAL)"));
        assert!(is_critical_status("COMPROMISED (CRITICAL)"));
        assert!(is_critical_status("HIGH_FAILURES").eq(&false));
        assert!(!is_critical_status("NOMINAL"));
    }

    #[test]
    fn reconstruct_compromised_set_ignores_serialized_value() {
        let now = Utc::now();
        let mut sim = Simulation::new(
            "sim-1".into(),
            None,
            Some("sim-1".into()),
            "Player".into(),
            "CTO".into(),
            "Ransomware".into(),
            1.0,
            30,
            HashMap::new(),
            &HashMap::new(),
            now,
        );
        sim.system_status
            .insert("File_Servers".into(), "ENCRYPTED (CRITICAL)".into());
        sim.metrics.compromised_set.clear();
        sim.reconstruct_compromised_set();
        assert!(sim.metrics.compromised_set.contains("File_Servers"));
    }
}
