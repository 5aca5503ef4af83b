//! Debrief and post-hoc rating (§4.6 "Debrief").
//!
//! `trigger_debrief` is synchronous — it only formats `Metrics` into the
//! `debrief_info` payload. The oracle call that produces the numeric
//! rating (`generate_rating`) is a separate, async step the task runtime
//! drives on its own schedule, matching the chain described in §4.6:
//! debrief → `generate_rating` → `request_user_rating` → briefing prompt.

use crate::event::{Event, EventKind};
use crate::oracle::{is_error_reply, GenerateOptions, HistoryTurn, Oracle};
use crate::rating_store::LlmRatingFields;
use crate::simulation::model::{is_critical_status, Simulation, SimulationState};
use crate::simulation::RATING_MAX_TOKENS;

const SCORE_MIDPOINT: i32 = 5;
const SCORE_MIN: i32 = 1;
const SCORE_MAX: i32 = 10;

fn format_seconds(sim: &Simulation, at: chrono::DateTime<chrono::Utc>) -> i64 {
    (at - sim.simulation_start_time).num_seconds().max(0)
}

/// Emits `debrief_info`: final status plus metrics formatted as
/// human-readable summary lines. Does not touch the oracle.
pub fn trigger_debrief(sim: &mut Simulation) -> Vec<Event> {
    sim.reconstruct_compromised_set();

    let compromised_count = sim.metrics.compromised_set.len();
    let mut points = Vec::new();

    points.push(match sim.metrics.time_to_first_critical {
        Some(at) => format!("Time to first critical status: {}s", format_seconds(sim, at)),
        None => "No system ever reached a critical status.".to_string(),
    });
    points.push(format!("Systems compromised: {}", compromised_count));
    points.push(format!("Escalations triggered: {}", sim.metrics.escalations_triggered));
    points.push(format!(
        "Time spent waiting: {}s",
        sim.metrics.time_wasted_waiting_seconds.round() as i64
    ));
    points.push(if sim.metrics.agents_contacted.is_empty() {
        "No agents were contacted.".to_string()
    } else {
        format!(
            "Agents contacted: {}",
            sim.metrics.agents_contacted.iter().cloned().collect::<Vec<_>>().join(", ")
        )
    });
    if !sim.metrics.key_actions_taken.is_empty() {
        let actions: Vec<String> = sim
            .metrics
            .key_actions_taken
            .iter()
            .map(|(_, action, target)| {
                if target.is_empty() {
                    action.clone()
                } else {
                    format!("{} {}", action, target)
                }
            })
            .collect();
        points.push(format!("Key actions taken: {}", actions.join("; ")));
    }

    let final_status_report = sim
        .system_status
        .iter()
        .map(|(key, status)| format!("{}: {}", key, status))
        .collect::<Vec<_>>()
        .join("; ");

    vec![Event::new(
        sim.simulation_id.clone(),
        EventKind::DebriefInfo {
            title: "Incident debrief".to_string(),
            final_status_report,
            summary_points: points,
            performance_rating: None,
        },
    )]
}

/// Ends the simulation: stops the background tick and emits the terminal
/// events.
pub fn end_simulation(sim: &mut Simulation) -> Vec<Event> {
    sim.simulation_running = false;
    let old_state = sim.simulation_state.as_str().to_string();
    sim.simulation_state = SimulationState::Ended;
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
            EventKind::SimulationEnded {
                message: "The simulation has ended.".to_string(),
            },
        ),
    ]
}

fn build_rating_prompt(sim: &Simulation) -> String {
    format!(
        "You are scoring a trainee CTO's handling of a \"{}\" incident-response exercise. \
         Agents contacted: {}. Escalations triggered: {}. Systems left compromised: {}. \
         Time wasted waiting (s): {}. Respond with ONLY a JSON object with integer fields \
         1-10 named timeliness_score, contact_strategy_score, decision_quality_score, \
         efficiency_score, overall_score, plus a qualitative_feedback string.",
        sim.scenario_key,
        if sim.metrics.agents_contacted.is_empty() {
            "none".to_string()
        } else {
            sim.metrics.agents_contacted.iter().cloned().collect::<Vec<_>>().join(", ")
        },
        sim.metrics.escalations_triggered,
        sim.metrics.compromised_set.len(),
        sim.metrics.time_wasted_waiting_seconds.round() as i64,
    )
}

fn clamp_score(value: Option<i64>) -> i32 {
    match value {
        Some(v) if (SCORE_MIN as i64..=SCORE_MAX as i64).contains(&v) => v as i32,
        Some(v) => v.clamp(SCORE_MIN as i64, SCORE_MAX as i64) as i32,
        None => SCORE_MIDPOINT,
    }
}

/// Parses and validates a rating reply. Invalid/missing scores default to
/// the midpoint; a missing or blank `qualitative_feedback` fails the
/// whole rating (§4.6 Debrief).
fn parse_rating_reply(reply: &str) -> Result<LlmRatingFields, String> {
    if is_error_reply(reply) {
        return Err(reply.trim().to_string());
    }

    let value: serde_json::Value = serde_json::from_str(reply.trim())
        .map_err(|e| format!("rating reply was not valid JSON: {}", e))?;

    let get_score = |key: &str| clamp_score(value.get(key).and_then(|v| v.as_i64()));

    let feedback = value
        .get("qualitative_feedback")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .unwrap_or("");
    if feedback.is_empty() {
        return Err("rating reply was missing qualitative_feedback".to_string());
    }

    Ok(LlmRatingFields {
        timeliness_score: get_score("timeliness_score"),
        contact_strategy_score: get_score("contact_strategy_score"),
        decision_quality_score: get_score("decision_quality_score"),
        efficiency_score: get_score("efficiency_score"),
        overall_score: get_score("overall_score"),
        qualitative_feedback: feedback.to_string(),
    })
}

/// Calls the oracle for a JSON-only rating and returns the
/// `debrief_rating_update` event alongside the parsed fields (`None` on
/// failure — the event payload carries the error in that case).
pub async fn generate_rating(sim: &Simulation, oracle: &dyn Oracle) -> (Event, Option<LlmRatingFields>) {
    let prompt = build_rating_prompt(sim);
    let reply = oracle
        .generate(
            "You are an objective incident-response performance evaluator.",
            &[] as &[HistoryTurn],
            &prompt,
            &GenerateOptions {
                max_tokens: RATING_MAX_TOKENS,
                temperature: 0.2,
                expects_json_object: true,
            },
        )
        .await;

    match parse_rating_reply(&reply) {
        Ok(fields) => {
            let payload = serde_json::json!({
                "timeliness_score": fields.timeliness_score,
                "contact_strategy_score": fields.contact_strategy_score,
                "decision_quality_score": fields.decision_quality_score,
                "efficiency_score": fields.efficiency_score,
                "overall_score": fields.overall_score,
                "qualitative_feedback": fields.qualitative_feedback,
            });
            let event = Event::new(
                sim.simulation_id.clone(),
                EventKind::DebriefRatingUpdate {
                    performance_rating: payload,
                },
            );
            (event, Some(fields))
        }
        Err(message) => {
            let event = Event::new(
                sim.simulation_id.clone(),
                EventKind::DebriefRatingUpdate {
                    performance_rating: serde_json::json!({ "error": message }),
                },
            );
            (event, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockOracle;
    use crate::scenarios::RANSOMWARE;
    use std::collections::HashMap;

    fn sample_sim() -> Simulation {
        let now = chrono::Utc::now();
        Simulation::new(
            "sim-debrief".into(),
            None,
            Some("sim-debrief".into()),
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
    fn trigger_debrief_emits_one_summary_event() {
        let mut sim = sample_sim();
        let events = trigger_debrief(&mut sim);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].type_str(), "debrief_info");
    }

    #[test]
    fn end_simulation_stops_the_run_and_marks_ended() {
        let mut sim = sample_sim();
        let events = end_simulation(&mut sim);
        assert!(!sim.simulation_running);
        assert_eq!(sim.simulation_state, SimulationState::Ended);
        assert!(events.iter().any(|e| e.type_str() == "simulation_ended"));
    }

    #[tokio::test]
    async fn valid_json_reply_produces_clamped_scores() {
        let sim = sample_sim();
        let oracle = MockOracle::new(
            r#"{"timeliness_score": 11, "contact_strategy_score": 7, "decision_quality_score": 0, "efficiency_score": 5, "overall_score": 6, "qualitative_feedback": "Solid effort."}"#,
        );
        let (event, fields) = generate_rating(&sim, &oracle).await;
        let fields = fields.unwrap();
        assert_eq!(fields.timeliness_score, 10);
        assert_eq!(fields.decision_quality_score, 1);
        assert_eq!(event.type_str(), "debrief_rating_update");
    }

    #[tokio::test]
    async fn missing_feedback_fails_the_rating() {
        let sim = sample_sim();
        let oracle = MockOracle::new(r#"{"timeliness_score": 5}"#);
        let (_, fields) = generate_rating(&sim, &oracle).await;
        assert!(fields.is_none());
    }

    #[tokio::test]
    async fn error_reply_fails_the_rating() {
        let sim = sample_sim();
        let oracle = MockOracle::new("(LLM Client Error: timeout)");
        let (_, fields) = generate_rating(&sim, &oracle).await;
        assert!(fields.is_none());
    }

    #[test]
    fn missing_score_fields_default_to_the_midpoint() {
        let value: serde_json::Value = serde_json::from_str(r#"{"qualitative_feedback": "ok"}"#).unwrap();
        let get_score = |key: &str| clamp_score(value.get(key).and_then(|v| v.as_i64()));
        assert_eq!(get_score("overall_score"), SCORE_MIDPOINT);
    }

    #[test]
    fn critical_status_markers_are_recognized_when_reconstructing() {
        assert!(is_critical_status("ENCRYPTED (CRITICAL)"));
    }
}
