//! Events emitted by the simulation engine.
//!
//! Every handler invocation collects a `Vec<Event>` which the task runtime
//! publishes onto the [`event_bus`](crate::event_bus) atomically, in
//! insertion order, after the handler's state has been saved. The engine
//! itself never talks to the bus directly — keeping events as plain data
//! is what lets a single background tick, action, or debrief handler be
//! tested without a running bus at all.
//!
//! ```text
//! handler invocation
//!   │
//!   ├─ mutate Simulation, push Event values into a local Vec
//!   ▼
//! task runtime
//!   │
//!   ├─ save(sim_id, simulation)
//!   ├─ bus.publish(sim_id, events)   // atomic, in order
//!   ▼
//! live WebSocket subscribers (zero or more)
//! ```
//!
//! The event type set is closed — every variant in [`EventKind`]
//! corresponds to exactly one of the wire `type` strings the event bus
//! contract defines.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// An event ready for publication: a simulation id plus a typed payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub simulation_id: String,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(simulation_id: impl Into<String>, kind: EventKind) -> Self {
        Event {
            simulation_id: simulation_id.into(),
            kind,
        }
    }

    /// The wire `type` string for this event, e.g. `"time_update"`.
    pub fn type_str(&self) -> &'static str {
        self.kind.type_str()
    }

    /// Renders the payload as a bare JSON object (without the wrapping
    /// `type`/`simulation_id` envelope), for callers that want the raw
    /// field map on its own.
    pub fn payload(&self) -> Value {
        self.kind.payload()
    }
}

/// The closed set of event types the engine can emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventKind {
    SimulationStarted {
        scenario: String,
        description: String,
        intensity_key: String,
        current_intensity_mod: f64,
        duration_minutes: i64,
        player_name: String,
        player_role: String,
        start_time_iso: String,
        end_time_iso: String,
        current_sim_time_iso: String,
        initial_system_status: Value,
        initial_agent_status: Value,
    },
    TimeUpdate {
        sim_time_iso: String,
        end_time_iso: String,
    },
    StateChange {
        old_state: String,
        new_state: String,
    },
    DisplayMessage {
        source: String,
        message: String,
        notification: Option<String>,
    },
    AgentStatusUpdate {
        agent_name: String,
        state: String,
    },
    SystemStatusUpdate {
        system_key: String,
        status: String,
        reason: String,
    },
    IntensityUpdate {
        current_intensity_mod: f64,
        reason: String,
    },
    ConversationStarted {
        agent_name: String,
    },
    ConversationEnded {
        agent_name: String,
    },
    CallWaiting {
        agent_name: String,
    },
    CallAnswered {
        agent_name: String,
    },
    CallIgnored {
        agent_name: String,
    },
    MissedCallsUpdate {
        missed_calls: Vec<String>,
    },
    LogFeedUpdate {
        log_line: String,
    },
    DecisionPointInfo {
        summary: String,
        options: Vec<String>,
    },
    RequestYesNo {
        prompt: String,
        action_context: String,
    },
    RequestAnalystInput {
        prompt: String,
    },
    RequestUserRating {
        performance_rating: Value,
    },
    DebriefInfo {
        title: String,
        final_status_report: String,
        summary_points: Vec<String>,
        performance_rating: Option<Value>,
    },
    DebriefRatingUpdate {
        performance_rating: Value,
    },
    SimulationEnded {
        message: String,
    },
    InitialState {
        state: Value,
    },
    Log {
        message: String,
        level: String,
    },
    Error {
        message: String,
    },
}

impl EventKind {
    pub fn type_str(&self) -> &'static str {
        match self {
            EventKind::SimulationStarted { .. } => "simulation_started",
            EventKind::TimeUpdate { .. } => "time_update",
            EventKind::StateChange { .. } => "state_change",
            EventKind::DisplayMessage { .. } => "display_message",
            EventKind::AgentStatusUpdate { .. } => "agent_status_update",
            EventKind::SystemStatusUpdate { .. } => "system_status_update",
            EventKind::IntensityUpdate { .. } => "intensity_update",
            EventKind::ConversationStarted { .. } => "conversation_started",
            EventKind::ConversationEnded { .. } => "conversation_ended",
            EventKind::CallWaiting { .. } => "call_waiting",
            EventKind::CallAnswered { .. } => "call_answered",
            EventKind::CallIgnored { .. } => "call_ignored",
            EventKind::MissedCallsUpdate { .. } => "missed_calls_update",
            EventKind::LogFeedUpdate { .. } => "log_feed_update",
            EventKind::DecisionPointInfo { .. } => "decision_point_info",
            EventKind::RequestYesNo { .. } => "request_yes_no",
            EventKind::RequestAnalystInput { .. } => "request_analyst_input",
            EventKind::RequestUserRating { .. } => "request_user_rating",
            EventKind::DebriefInfo { .. } => "debrief_info",
            EventKind::DebriefRatingUpdate { .. } => "debrief_rating_update",
            EventKind::SimulationEnded { .. } => "simulation_ended",
            EventKind::InitialState { .. } => "initial_state",
            EventKind::Log { .. } => "log",
            EventKind::Error { .. } => "error",
        }
    }

    pub fn payload(&self) -> Value {
        // `serde_json::to_value` on the tagged enum yields `{"type": ..,
        // "payload": ..}`; we only want the inner payload map here.
        let full = serde_json::to_value(self).unwrap_or_else(|_| json!({}));
        full.get("payload").cloned().unwrap_or_else(|| json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_str_matches_serialized_tag() {
        let event = Event::new(
            "guest_abc123abc123",
            EventKind::TimeUpdate {
                sim_time_iso: "2026-01-01T00:00:00Z".to_string(),
                end_time_iso: "2026-01-01T00:30:00Z".to_string(),
            },
        );
        assert_eq!(event.type_str(), "time_update");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "time_update");
        assert_eq!(value["simulation_id"], "guest_abc123abc123");
    }
}
