//! Conversation establishment (`handle_agent_contact`, §4.6).

use chrono::{DateTime, Utc};

use crate::error::{SimError, SimResult};
use crate::event::{Event, EventKind};
use crate::oracle::{GenerateOptions, HistoryTurn, Oracle};
use crate::simulation::model::{AgentState, Simulation, SimulationState};
use crate::simulation::{AGENT_RESPONSE_MAX_TOKENS, AGENT_RESPONSE_TEMPERATURE};

/// Who initiated a call: the player via `call <agent>`, or the agent via
/// its own initiative heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactInitiator {
    Player,
    Agent,
}

fn opening_trigger_text(agent_name: &str, initiated_by: ContactInitiator, is_update: bool) -> String {
    match (initiated_by, is_update) {
        (ContactInitiator::Player, _) => {
            format!("The CTO is calling you, {}. Greet them and report in.", agent_name)
        }
        (ContactInitiator::Agent, true) => {
            "You are calling the CTO unprompted to give a brief status update.".to_string()
        }
        (ContactInitiator::Agent, false) => {
            "You are calling the CTO unprompted because something urgent needs their attention."
                .to_string()
        }
    }
}

/// Establishes (or queues) a conversation with `agent_name`.
///
/// - If the player is already on a call with someone else and the contact
///   is agent-initiated, the caller is placed in the waiting slot (if
///   empty) or appended to `missed_calls`, and no oracle call happens.
/// - Otherwise the call connects immediately: state transitions to
///   `IN_CONVERSATION`, and the oracle is invoked once for the agent's
///   opening line.
pub async fn handle_agent_contact(
    sim: &mut Simulation,
    oracle: &dyn Oracle,
    agent_name: &str,
    initiated_by: ContactInitiator,
    is_update: bool,
    now_sim: DateTime<Utc>,
) -> SimResult<Vec<Event>> {
    if !sim.agents.contains_key(agent_name) {
        return Err(SimError::InvalidAction(format!("no such agent '{}'", agent_name)));
    }

    let mut events = Vec::new();

    let player_busy_elsewhere = sim.simulation_state == SimulationState::InConversation
        && sim.active_conversation_partner.as_deref() != Some(agent_name);

    if initiated_by == ContactInitiator::Agent && player_busy_elsewhere {
        if sim.waiting_call_agent_name.is_none() {
            sim.waiting_call_agent_name = Some(agent_name.to_string());
            if let Some(agent) = sim.agents.get_mut(agent_name) {
                agent.state = AgentState::TryingToCallCto;
            }
            events.push(Event::new(
                sim.simulation_id.clone(),
                EventKind::CallWaiting {
                    agent_name: agent_name.to_string(),
                },
            ));
        } else {
            sim.missed_calls.push(agent_name.to_string());
            if let Some(agent) = sim.agents.get_mut(agent_name) {
                agent.state = AgentState::Available;
            }
            events.push(Event::new(
                sim.simulation_id.clone(),
                EventKind::MissedCallsUpdate {
                    missed_calls: sim.missed_calls.clone(),
                },
            ));
        }
        return Ok(events);
    }

    if sim.waiting_call_agent_name.as_deref() == Some(agent_name) {
        sim.waiting_call_agent_name = None;
    }
    sim.active_conversation_partner = Some(agent_name.to_string());
    sim.simulation_state = SimulationState::InConversation;

    let persona = {
        let agent = sim.agents.get_mut(agent_name).expect("checked above");
        agent.state = AgentState::OnCallWithCto;
        agent.last_contact_time = Some(now_sim);
        if is_update {
            agent.last_update_time = Some(now_sim);
        }
        if initiated_by == ContactInitiator::Player {
            agent.set_flag("called_by_player", true);
        } else {
            agent.set_flag("attempted_call", true);
        }
        if is_update {
            agent
                .update_persona_prompt
                .clone()
                .unwrap_or_else(|| agent.persona_prompt.clone())
        } else {
            agent.persona_prompt.clone()
        }
    };

    sim.metrics.agents_contacted.insert(agent_name.to_string());
    if sim.any_system_critical() && !sim.metrics.critical_agent_contact_time.contains_key(agent_name) {
        sim.metrics
            .critical_agent_contact_time
            .insert(agent_name.to_string(), now_sim);
    }

    events.push(Event::new(
        sim.simulation_id.clone(),
        EventKind::ConversationStarted {
            agent_name: agent_name.to_string(),
        },
    ));
    events.push(Event::new(
        sim.simulation_id.clone(),
        EventKind::AgentStatusUpdate {
            agent_name: agent_name.to_string(),
            state: AgentState::OnCallWithCto.as_str().to_string(),
        },
    ));

    let opening = opening_trigger_text(agent_name, initiated_by, is_update);
    let reply = oracle
        .generate(
            &persona,
            &[] as &[HistoryTurn],
            &opening,
            &GenerateOptions {
                max_tokens: AGENT_RESPONSE_MAX_TOKENS,
                temperature: AGENT_RESPONSE_TEMPERATURE,
                expects_json_object: false,
            },
        )
        .await;

    events.push(Event::new(
        sim.simulation_id.clone(),
        EventKind::DisplayMessage {
            source: agent_name.to_string(),
            message: reply,
            notification: None,
        },
    ));

    Ok(events)
}

/// Ends the current conversation, if any. A no-op if nobody is on the
/// line. Mirrors the `hang up` / `end call` / `bye` / `end` dispatch.
pub fn hang_up(sim: &mut Simulation) -> Vec<Event> {
    let Some(agent_name) = sim.active_conversation_partner.take() else {
        return Vec::new();
    };

    if let Some(agent) = sim.agents.get_mut(&agent_name) {
        agent.state = AgentState::Available;
    }
    sim.simulation_state = SimulationState::AwaitingPlayerChoice;

    vec![
        Event::new(
            sim.simulation_id.clone(),
            EventKind::ConversationEnded {
                agent_name: agent_name.clone(),
            },
        ),
        Event::new(
            sim.simulation_id.clone(),
            EventKind::AgentStatusUpdate {
                agent_name,
                state: AgentState::Available.as_str().to_string(),
            },
        ),
    ]
}
