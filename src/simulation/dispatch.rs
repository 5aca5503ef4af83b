//! Player-input dispatch (`handle_player_input`, §4.6).
//!
//! Normalizes `action_text` (trim + lowercase) and routes on
//! `simulation_state`. Every branch returns the `Event`s its handler
//! produced; the oracle is only ever touched by the conversation and
//! decision branches that actually need a reply.

use chrono::{DateTime, Utc};

use crate::agents::{resolve_agent_name, HAO_WANG, PAUL_KAHN, PR_HEAD};
use crate::error::SimResult;
use crate::event::{Event, EventKind};
use crate::log_generator;
use crate::oracle::{GenerateOptions, HistoryTurn, Oracle};
use crate::simulation::contact::{self, ContactInitiator};
use crate::simulation::debrief;
use crate::simulation::model::{AgentState, ShutdownDirective, Simulation, SimulationState};
use crate::simulation::{AGENT_RESPONSE_MAX_TOKENS, AGENT_RESPONSE_TEMPERATURE, BRIEFING_FEEDBACK_MAX_TOKENS};

/// Fraction of `duration_minutes` elapsed past which the decision-point
/// gate opens regardless of advisor input (§4.6 "Decision-point readiness
/// gate").
const DECISION_POINT_DURATION_FRACTION: f64 = 0.6;

const KEY_ACTIONS: &[&str] = &["isolate", "block_ip", "decide", "call"];

fn push_player_action(sim: &mut Simulation, action: &str, target: Option<&str>) {
    let sim_time_iso = sim.simulation_time.to_rfc3339();
    if KEY_ACTIONS.contains(&action) {
        sim.metrics.key_actions_taken.push((
            sim_time_iso.clone(),
            action.to_string(),
            target.unwrap_or("").to_string(),
        ));
    }
    sim.push_player_action(sim_time_iso, action.to_string(), target.map(|s| s.to_string()));
}

fn display(sim: &Simulation, source: &str, message: impl Into<String>) -> Event {
    Event::new(
        sim.simulation_id.clone(),
        EventKind::DisplayMessage {
            source: source.to_string(),
            message: message.into(),
            notification: None,
        },
    )
}

/// `true` when any of the decision-point readiness conditions holds,
/// short of an explicit player force.
fn decision_point_ready_unforced(sim: &Simulation) -> bool {
    if sim.any_system_critical() {
        return true;
    }
    let hao_advised = sim
        .agents
        .get(HAO_WANG)
        .map(|a| a.flag("has_advised_caution"))
        .unwrap_or(false);
    let paul_demanded = sim
        .agents
        .get(PAUL_KAHN)
        .map(|a| a.flag("has_demanded_shutdown"))
        .unwrap_or(false);
    if hao_advised && paul_demanded {
        return true;
    }
    let elapsed_minutes = (sim.simulation_time - sim.simulation_start_time).num_seconds() as f64 / 60.0;
    let fraction = elapsed_minutes / sim.duration_minutes as f64;
    fraction > DECISION_POINT_DURATION_FRACTION
}

/// Attempts to enter `DECISION_POINT_SHUTDOWN`. `forced` corresponds to
/// an explicit `decide` action, which alone satisfies the gate.
fn try_enter_decision_point(sim: &mut Simulation, forced: bool) -> Vec<Event> {
    let ready = forced || decision_point_ready_unforced(sim);

    if ready {
        let old_state = sim.simulation_state.as_str().to_string();
        sim.simulation_state = SimulationState::DecisionPointShutdown;
        return vec![
            Event::new(
                sim.simulation_id.clone(),
                EventKind::StateChange {
                    old_state,
                    new_state: sim.simulation_state.as_str().to_string(),
                },
            ),
            Event::new(
                sim.simulation_id.clone(),
                EventKind::DecisionPointInfo {
                    summary: "A shutdown decision is required.".to_string(),
                    options: vec!["hold".to_string(), "targeted".to_string(), "broad".to_string()],
                },
            ),
        ];
    }

    let hao_advised = sim
        .agents
        .get(HAO_WANG)
        .map(|a| a.flag("has_advised_caution"))
        .unwrap_or(false);
    let paul_demanded = sim
        .agents
        .get(PAUL_KAHN)
        .map(|a| a.flag("has_demanded_shutdown"))
        .unwrap_or(false);
    let mut missing = Vec::new();
    if !hao_advised {
        missing.push("Hao Wang's caution advice");
    }
    if !paul_demanded {
        missing.push("Paul Kahn's shutdown urgency");
    }
    let message = if missing.is_empty() {
        "Not ready to force a shutdown decision yet.".to_string()
    } else {
        format!("Not ready to force a shutdown decision yet: still missing {}.", missing.join(" and "))
    };

    let mut events = vec![display(sim, "System", message)];
    if sim.simulation_state == SimulationState::DecisionPointShutdown {
        let old_state = sim.simulation_state.as_str().to_string();
        sim.simulation_state = SimulationState::AwaitingPlayerChoice;
        events.push(Event::new(
            sim.simulation_id.clone(),
            EventKind::StateChange {
                old_state,
                new_state: sim.simulation_state.as_str().to_string(),
            },
        ));
    }
    events
}

fn status_summary(sim: &Simulation) -> String {
    let mut lines: Vec<String> = sim
        .system_status
        .iter()
        .map(|(key, status)| format!("{}: {}", key, status))
        .collect();
    lines.sort();
    if lines.is_empty() {
        "No systems tracked.".to_string()
    } else {
        lines.join("; ")
    }
}

fn resolve_system_key<'a>(sim: &'a Simulation, query: &str) -> Option<&'a str> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return None;
    }
    for key in sim.system_status.keys() {
        if key.to_lowercase() == query {
            return Some(key.as_str());
        }
    }
    for key in sim.system_status.keys() {
        if key.to_lowercase().contains(&query) || query.contains(&key.to_lowercase()) {
            return Some(key.as_str());
        }
    }
    None
}

fn set_system_status(sim: &mut Simulation, system_key: &str, status: &str, reason: &str) -> Vec<Event> {
    sim.system_status.insert(system_key.to_string(), status.to_string());
    vec![Event::new(
        sim.simulation_id.clone(),
        EventKind::SystemStatusUpdate {
            system_key: system_key.to_string(),
            status: status.to_string(),
            reason: reason.to_string(),
        },
    )]
}

async fn handle_awaiting_player_choice(
    sim: &mut Simulation,
    oracle: &dyn Oracle,
    normalized: &str,
    now: DateTime<Utc>,
) -> SimResult<Vec<Event>> {
    if let Some(rest) = normalized.strip_prefix("call ") {
        let Some(agent_name) = resolve_agent_name(&sim.agents, rest).map(str::to_string) else {
            return Ok(vec![display(sim, "System", format!("No such agent '{}'.", rest.trim()))]);
        };
        push_player_action(sim, "call", Some(&agent_name));
        return contact::handle_agent_contact(sim, oracle, &agent_name, ContactInitiator::Player, false, now).await;
    }

    if let Some(rest) = normalized.strip_prefix("isolate ") {
        let Some(system_key) = resolve_system_key(sim, rest).map(str::to_string) else {
            return Ok(vec![display(sim, "System", format!("No such system '{}'.", rest.trim()))]);
        };
        push_player_action(sim, "isolate", Some(&system_key));
        let mut events = set_system_status(sim, &system_key, "ISOLATING (Manual)", "player isolation order");
        sim.push_log(format!("[{} / INFO] isolating {} by manual order", sim.sim_clock_face(), system_key));
        events.extend(set_system_status(sim, &system_key, "ISOLATED (Manual)", "player isolation order"));
        sim.push_log(format!("[{} / INFO] {} isolated by manual order", sim.sim_clock_face(), system_key));
        return Ok(events);
    }

    if let Some(rest) = normalized.strip_prefix("block ip ") {
        let ip = rest.trim().to_string();
        push_player_action(sim, "block_ip", Some(&ip));
        let mut details = std::collections::HashMap::new();
        details.insert("ip".to_string(), ip.clone());
        let (log_line, _severity) =
            log_generator::generate_log_entry("BLOCK_RULE_APPLIED", "INFO", "Network_Edge", &details);
        sim.push_log(format!("[{} / INFO] {}", sim.sim_clock_face(), log_line));
        return Ok(vec![Event::new(
            sim.simulation_id.clone(),
            EventKind::Log {
                message: log_line,
                level: "INFO".to_string(),
            },
        )]);
    }

    if let Some(rest) = normalized.strip_prefix("status check ") {
        let query = rest.trim();
        let message = match resolve_system_key(sim, query) {
            Some(key) => format!("{}: {}", key, sim.system_status.get(key).cloned().unwrap_or_default()),
            None => format!("No such system '{}'.", query),
        };
        return Ok(vec![display(sim, "System", message)]);
    }

    match normalized {
        "status" => Ok(vec![display(sim, "System", status_summary(sim))]),
        "missed" => {
            let message = if sim.missed_calls.is_empty() {
                "No missed calls.".to_string()
            } else {
                format!("Missed calls: {}", sim.missed_calls.join(", "))
            };
            Ok(vec![display(sim, "System", message)])
        }
        "wait" => {
            push_player_action(sim, "wait", None);
            sim.push_log(format!("[{} / INFO] player is waiting", sim.sim_clock_face()));
            Ok(vec![display(sim, "System", "Standing by.")])
        }
        "decide" => {
            push_player_action(sim, "decide", None);
            Ok(try_enter_decision_point(sim, true))
        }
        "answer call" => Ok(answer_waiting_call(sim, oracle, now).await?),
        "ignore call" => Ok(ignore_waiting_call(sim)),
        _ => Ok(vec![display(sim, "System", "Unrecognized action.")]),
    }
}

async fn answer_waiting_call(sim: &mut Simulation, oracle: &dyn Oracle, now: DateTime<Utc>) -> SimResult<Vec<Event>> {
    let Some(agent_name) = sim.waiting_call_agent_name.take() else {
        return Ok(vec![display(sim, "System", "No call is waiting.")]);
    };

    let mut events = Vec::new();
    if sim.active_conversation_partner.is_some() {
        events.extend(contact::hang_up(sim));
    }
    events.push(Event::new(
        sim.simulation_id.clone(),
        EventKind::CallAnswered {
            agent_name: agent_name.clone(),
        },
    ));
    events.extend(contact::handle_agent_contact(sim, oracle, &agent_name, ContactInitiator::Agent, false, now).await?);
    Ok(events)
}

fn ignore_waiting_call(sim: &mut Simulation) -> Vec<Event> {
    let Some(agent_name) = sim.waiting_call_agent_name.take() else {
        return vec![display(sim, "System", "No call is waiting.")];
    };
    if let Some(agent) = sim.agents.get_mut(&agent_name) {
        agent.state = AgentState::Available;
    }
    vec![Event::new(
        sim.simulation_id.clone(),
        EventKind::CallIgnored { agent_name },
    )]
}

fn apply_keyword_flags(sim: &mut Simulation, agent_name: &str, reply: &str) {
    let lower = reply.to_lowercase();
    if agent_name == HAO_WANG && (lower.contains("caution") || lower.contains("be careful") || lower.contains("hold off")) {
        if let Some(agent) = sim.agents.get_mut(HAO_WANG) {
            agent.set_flag("has_advised_caution", true);
        }
    }
    if agent_name == PAUL_KAHN && (lower.contains("shut") || lower.contains("pull the plug") || lower.contains("shutdown")) {
        if let Some(agent) = sim.agents.get_mut(PAUL_KAHN) {
            agent.set_flag("has_demanded_shutdown", true);
        }
    }
}

async fn handle_in_conversation(
    sim: &mut Simulation,
    oracle: &dyn Oracle,
    normalized: &str,
    raw_text: &str,
    now: DateTime<Utc>,
) -> SimResult<Vec<Event>> {
    match normalized {
        "hang up" | "end call" | "bye" | "end" => return Ok(contact::hang_up(sim)),
        "status" => return Ok(vec![display(sim, "System", status_summary(sim))]),
        "answer call" => return answer_waiting_call(sim, oracle, now).await,
        "ignore call" => return Ok(ignore_waiting_call(sim)),
        _ => {}
    }

    let Some(agent_name) = sim.active_conversation_partner.clone() else {
        return Ok(vec![display(sim, "System", "Not currently on a call.")]);
    };

    let (persona, history): (String, Vec<HistoryTurn>) = {
        let agent = sim.agents.get_mut(&agent_name).expect("active partner must exist");
        agent.conversation_history.push(("player".to_string(), raw_text.to_string()));
        let history = agent
            .conversation_history
            .iter()
            .rev()
            .take(2)
            .rev()
            .map(|(role, content)| HistoryTurn {
                role: role.clone(),
                content: content.clone(),
            })
            .collect();
        (agent.persona_prompt.clone(), history)
    };

    let reply = oracle
        .generate(
            &persona,
            &history,
            raw_text,
            &GenerateOptions {
                max_tokens: AGENT_RESPONSE_MAX_TOKENS,
                temperature: AGENT_RESPONSE_TEMPERATURE,
                expects_json_object: false,
            },
        )
        .await;

    if let Some(agent) = sim.agents.get_mut(&agent_name) {
        agent.conversation_history.push(("agent".to_string(), reply.clone()));
    }
    apply_keyword_flags(sim, &agent_name, &reply);

    Ok(vec![display(sim, &agent_name, reply)])
}

fn handle_decision_point_shutdown(sim: &mut Simulation, normalized: &str) -> Vec<Event> {
    let Some(directive) = ShutdownDirective::parse(normalized) else {
        return vec![display(sim, "System", "Choose one of: hold, targeted, broad.")];
    };

    sim.player_decisions.shutdown_directive = directive;
    let mut events = Vec::new();

    match directive {
        ShutdownDirective::Hold => {
            sim.push_log(format!("[{} / INFO] shutdown directive: hold", sim.sim_clock_face()));
        }
        ShutdownDirective::Targeted => {
            let affected: Vec<String> = sim
                .system_status
                .iter()
                .filter(|(_, status)| status.as_str() != "NOMINAL")
                .map(|(key, _)| key.clone())
                .collect();
            for key in affected {
                events.extend(set_system_status(sim, &key, "ISOLATING (Manual)", "targeted shutdown directive"));
            }
            sim.push_log(format!("[{} / INFO] shutdown directive: targeted", sim.sim_clock_face()));
        }
        ShutdownDirective::Broad => {
            let all_keys: Vec<String> = sim.system_status.keys().cloned().collect();
            for key in all_keys {
                events.extend(set_system_status(sim, &key, "OFFLINE (Manual)", "broad shutdown directive"));
            }
            sim.push_log(format!("[{} / INFO] shutdown directive: broad", sim.sim_clock_face()));
        }
        ShutdownDirective::Pending => unreachable!("parse() never returns Pending"),
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
    events.extend(debrief::trigger_debrief(sim));
    events
}

fn handle_post_initial_crisis(sim: &mut Simulation, normalized: &str) -> Vec<Event> {
    match normalized {
        "yes" => {
            let old_state = sim.simulation_state.as_str().to_string();
            sim.simulation_state = SimulationState::AwaitingAnalystBriefing;
            vec![
                Event::new(
                    sim.simulation_id.clone(),
                    EventKind::StateChange {
                        old_state,
                        new_state: sim.simulation_state.as_str().to_string(),
                    },
                ),
                Event::new(
                    sim.simulation_id.clone(),
                    EventKind::RequestAnalystInput {
                        prompt: "Give your talking points for the press briefing.".to_string(),
                    },
                ),
            ]
        }
        "no" => debrief::end_simulation(sim),
        _ => vec![display(sim, "System", "Answer yes or no.")],
    }
}

async fn handle_awaiting_analyst_briefing(
    sim: &mut Simulation,
    oracle: &dyn Oracle,
    raw_text: &str,
) -> SimResult<Vec<Event>> {
    let prompt = format!(
        "The CTO has handed you these talking points for a press briefing: \"{}\". \
         Give brief feedback on them.",
        raw_text
    );
    let reply = oracle
        .generate(
            "You are the Head of PR. You give candid, concise feedback on proposed press talking points.",
            &[] as &[HistoryTurn],
            &prompt,
            &GenerateOptions {
                max_tokens: BRIEFING_FEEDBACK_MAX_TOKENS,
                temperature: AGENT_RESPONSE_TEMPERATURE,
                expects_json_object: false,
            },
        )
        .await;

    let mut events = vec![display(sim, PR_HEAD, reply)];
    events.extend(debrief::end_simulation(sim));
    Ok(events)
}

/// Entry point: normalizes `action_text` and routes on `simulation_state`.
pub async fn handle_player_input(
    sim: &mut Simulation,
    oracle: &dyn Oracle,
    action_text: &str,
    now: DateTime<Utc>,
) -> SimResult<Vec<Event>> {
    let normalized = action_text.trim().to_lowercase();

    match sim.simulation_state {
        SimulationState::AwaitingPlayerChoice => {
            handle_awaiting_player_choice(sim, oracle, &normalized, now).await
        }
        SimulationState::InConversation => {
            handle_in_conversation(sim, oracle, &normalized, action_text.trim(), now).await
        }
        SimulationState::DecisionPointShutdown => Ok(handle_decision_point_shutdown(sim, &normalized)),
        SimulationState::PostInitialCrisis => Ok(handle_post_initial_crisis(sim, &normalized)),
        SimulationState::AwaitingAnalystBriefing => {
            handle_awaiting_analyst_briefing(sim, oracle, action_text.trim()).await
        }
        _ => Ok(vec![display(sim, "System", "That action is not applicable right now.")]),
    }
}

/// Used by the background tick to let the engine itself propose entering
/// the decision point, rather than waiting on the player's `decide`.
pub fn maybe_propose_decision_point(sim: &mut Simulation) -> Vec<Event> {
    if sim.simulation_state != SimulationState::AwaitingPlayerChoice {
        return Vec::new();
    }
    if !decision_point_ready_unforced(sim) {
        return Vec::new();
    }
    try_enter_decision_point(sim, false)
}
