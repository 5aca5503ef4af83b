//! The task runtime (§5, §9 "ownership across components").
//!
//! Task handlers are plain `tokio::spawn`ed futures driven by an
//! `Arc<TaskRuntime>` — there is no separate worker process or broker in
//! this crate (the delayed scheduler is a `tokio::time::sleep` re-arm,
//! not a queue), following the same `tokio::spawn` + `Vec<JoinHandle>`
//! fan-out idiom used elsewhere in this codebase.
//!
//! Every handler follows load → mutate → save → publish. On `Err`, a
//! handler never panics: it logs at `error` and publishes a best-effort
//! `error` event, leaving the last-saved state untouched (§7).

use std::sync::Arc;
use std::time::Duration as StdDuration;

use rand::Rng;
use tokio::time::timeout;

use crate::access_gate::verify_access;
use crate::error::{SimError, SimResult};
use crate::event::{Event, EventKind};
use crate::event_bus::EventBus;
use crate::oracle::Oracle;
use crate::rating_store::RatingStore;
use crate::simulation::model::{Simulation, SimulationState};
use crate::simulation::{
    self, contact, debrief, dispatch, escalation, initiative, intensity, time as sim_time,
    BACKGROUND_CHECK_INTERVAL_REALTIME_SECONDS, BACKGROUND_CHECK_MIN_DELAY_SECONDS,
    BACKGROUND_LOG_NOISE_INTERVAL_SECONDS,
};
use crate::state_store::{StateStore, DEFAULT_TTL};

const START_TIMEOUT: StdDuration = StdDuration::from_secs(60);
const ACTION_TIMEOUT: StdDuration = StdDuration::from_secs(180);
const BACKGROUND_TIMEOUT: StdDuration = StdDuration::from_secs(60);
const RATING_TIMEOUT: StdDuration = StdDuration::from_secs(300);

/// Pacing delay the debrief chain uses between `request_user_rating` and
/// `trigger_briefing_prompt` (§4.6 Debrief: "a ~10-second delay... to pace
/// the UI").
const BRIEFING_PACING_DELAY_SECONDS: u64 = 10;

/// Shared collaborators every task handler needs. One instance is built
/// at process start and handed to every spawned task as an `Arc`.
pub struct TaskRuntime {
    pub state_store: Arc<dyn StateStore>,
    pub event_bus: Arc<EventBus>,
    pub oracle: Arc<dyn Oracle>,
    pub rating_store: Arc<dyn RatingStore>,
}

impl TaskRuntime {
    pub fn new(
        state_store: Arc<dyn StateStore>,
        event_bus: Arc<EventBus>,
        oracle: Arc<dyn Oracle>,
        rating_store: Arc<dyn RatingStore>,
    ) -> Arc<Self> {
        Arc::new(TaskRuntime {
            state_store,
            event_bus,
            oracle,
            rating_store,
        })
    }

    fn publish_error(&self, simulation_id: &str, err: &SimError) {
        log::error!("task failed for {}: {}", simulation_id, err);
        self.event_bus.publish(
            simulation_id,
            &[Event::new(
                simulation_id.to_string(),
                EventKind::Error {
                    message: err.to_string(),
                },
            )],
        );
    }

    async fn save_and_publish(&self, sim: &Simulation, events: Vec<Event>) -> SimResult<()> {
        self.state_store.save(&sim.simulation_id, sim, DEFAULT_TTL).await?;
        self.event_bus.publish(&sim.simulation_id, &events);
        Ok(())
    }

    /// `start_simulation`: builds and persists a brand-new `Simulation`.
    pub async fn start_simulation(
        self: &Arc<Self>,
        simulation_id: String,
        owner_user_id: Option<String>,
        guest_id: Option<String>,
        player_name: String,
        player_role: String,
        scenario_key: String,
        intensity_key: String,
        duration_minutes: i64,
    ) {
        let this = Arc::clone(self);
        let sim_id_for_error = simulation_id.clone();
        let result = timeout(START_TIMEOUT, async move {
            let now = chrono::Utc::now();
            let (sim, event) = simulation::start_new_simulation(
                simulation_id.clone(),
                owner_user_id,
                guest_id,
                player_name,
                player_role,
                &scenario_key,
                &intensity_key,
                duration_minutes,
                now,
            )?;
            this.save_and_publish(&sim, vec![event]).await?;
            this.spawn_background_check(sim.simulation_id.clone());
            Ok::<_, SimError>(())
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.publish_error(&sim_id_for_error, &err),
            Err(_) => log::error!("start_simulation timed out for {}", sim_id_for_error),
        }
    }

    /// `handle_action`: authorizes, loads, dispatches one player action.
    pub async fn handle_action(
        self: &Arc<Self>,
        simulation_id: String,
        requester_user_id: Option<String>,
        action_text: String,
    ) {
        let this = Arc::clone(self);
        let sim_id_for_error = simulation_id.clone();
        let result = timeout(ACTION_TIMEOUT, async move {
            this.run_dispatch(&simulation_id, requester_user_id.as_deref(), &action_text)
                .await
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.publish_error(&sim_id_for_error, &err),
            Err(_) => log::error!("handle_action timed out for {}", sim_id_for_error),
        }
    }

    /// `handle_briefing`: same dispatch path as `handle_action`, named
    /// separately because it is its own task-queue entry point in the
    /// original process (the `AWAITING_ANALYST_BRIEFING` branch of
    /// `handle_player_input` is where the actual behavior lives).
    pub async fn handle_briefing(
        self: &Arc<Self>,
        simulation_id: String,
        requester_user_id: Option<String>,
        talking_points: String,
    ) {
        let this = Arc::clone(self);
        let sim_id_for_error = simulation_id.clone();
        let result = timeout(ACTION_TIMEOUT, async move {
            this.run_dispatch(&simulation_id, requester_user_id.as_deref(), &talking_points)
                .await
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.publish_error(&sim_id_for_error, &err),
            Err(_) => log::error!("handle_briefing timed out for {}", sim_id_for_error),
        }
    }

    async fn run_dispatch(
        &self,
        simulation_id: &str,
        requester_user_id: Option<&str>,
        action_text: &str,
    ) -> SimResult<()> {
        if !verify_access(self.state_store.as_ref(), simulation_id, requester_user_id).await {
            return Err(SimError::AccessDenied);
        }
        let mut sim = self
            .state_store
            .load(simulation_id)
            .await?
            .ok_or_else(|| SimError::NotFound(simulation_id.to_string()))?;

        let now = chrono::Utc::now();
        let events = dispatch::handle_player_input(&mut sim, self.oracle.as_ref(), action_text, now).await?;
        self.save_and_publish(&sim, events).await
    }

    /// `background_check`: one tick of the engine. Advances time, runs
    /// escalation + intensity + agent initiative, emits background log
    /// noise, checks end conditions, then either re-arms itself or hands
    /// off to the debrief/rating chain.
    pub async fn background_check(self: &Arc<Self>, simulation_id: String) {
        let this = Arc::clone(self);
        let sim_id_for_error = simulation_id.clone();
        let result = timeout(BACKGROUND_TIMEOUT, async move { this.run_background_check(&simulation_id).await })
            .await;

        match result {
            Ok(Ok(Some(next_id))) => self.spawn_background_check(next_id),
            Ok(Ok(None)) => {}
            Ok(Err(err)) => self.publish_error(&sim_id_for_error, &err),
            Err(_) => log::error!("background_check timed out for {}", sim_id_for_error),
        }
    }

    /// Runs one tick and returns `Some(simulation_id)` if it should be
    /// rescheduled, `None` if the run ended (the caller should not spawn
    /// another tick in that case — the debrief/rating chain takes over).
    async fn run_background_check(&self, simulation_id: &str) -> SimResult<Option<String>> {
        let Some(mut sim) = self.state_store.load(simulation_id).await? else {
            return Ok(None);
        };
        if !sim.simulation_running {
            return Ok(None);
        }

        let scenario = simulation::scenario_for(&sim)?;
        let mut events = Vec::new();

        let time_before_sync = sim.simulation_time;
        if let Some(event) = sim_time::sync_time(&mut sim, chrono::Utc::now()) {
            events.push(event);
        }
        accumulate_wait_time(&mut sim, time_before_sync);

        let ended = sim_time::check_end_conditions(&mut sim, &scenario, &mut events);

        if !ended {
            events.extend(escalation::run_escalation_pass(&mut sim, &scenario));
            if let Some(event) = intensity::recompute_intensity(&mut sim) {
                events.push(event);
            }
            events.extend(dispatch::maybe_propose_decision_point(&mut sim));

            if let Some((agent_name, is_update)) = initiative::scan_for_initiative(&mut sim) {
                let now = sim.simulation_time;
                events.extend(
                    contact::handle_agent_contact(
                        &mut sim,
                        self.oracle.as_ref(),
                        &agent_name,
                        contact::ContactInitiator::Agent,
                        is_update,
                        now,
                    )
                    .await?,
                );
            }

            if should_emit_background_noise(&sim) {
                sim.last_background_noise_time = sim.simulation_time;
                for (log_line, severity) in crate::log_generator::generate_background_noise() {
                    sim.push_log(format!("[{} / {}] {}", sim.sim_clock_face(), severity, log_line));
                    events.push(Event::new(
                        sim.simulation_id.clone(),
                        EventKind::LogFeedUpdate { log_line },
                    ));
                }
            }
        }

        let still_running = sim.simulation_running && !ended;

        if ended {
            events.extend(debrief::trigger_debrief(&mut sim));
        }

        self.save_and_publish(&sim, events).await?;

        if ended {
            self.spawn_rating_chain(simulation_id.to_string());
            return Ok(None);
        }
        if !still_running {
            return Ok(None);
        }
        Ok(Some(simulation_id.to_string()))
    }

    fn spawn_background_check(self: &Arc<Self>, simulation_id: String) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let delay = this.next_background_delay(&simulation_id).await;
            tokio::time::sleep(delay).await;
            this.background_check(simulation_id).await;
        });
    }

    async fn next_background_delay(&self, simulation_id: &str) -> StdDuration {
        let intensity_mod = self
            .state_store
            .load(simulation_id)
            .await
            .ok()
            .flatten()
            .map(|sim| sim.current_intensity_mod)
            .unwrap_or(1.0);

        let jitter = rand::thread_rng().gen_range(0.8..1.2);
        let seconds = (BACKGROUND_CHECK_INTERVAL_REALTIME_SECONDS * intensity_mod * jitter)
            .max(BACKGROUND_CHECK_MIN_DELAY_SECONDS);
        StdDuration::from_secs_f64(seconds)
    }

    fn spawn_rating_chain(self: &Arc<Self>, simulation_id: String) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.generate_rating(simulation_id.clone()).await;
            tokio::time::sleep(StdDuration::from_secs(BRIEFING_PACING_DELAY_SECONDS)).await;
            this.request_user_rating(simulation_id.clone()).await;
            tokio::time::sleep(StdDuration::from_secs(BRIEFING_PACING_DELAY_SECONDS)).await;
            this.trigger_briefing_prompt(simulation_id).await;
        });
    }

    /// `generate_rating`: scores the run via the oracle and upserts into
    /// the rating store on success.
    pub async fn generate_rating(self: &Arc<Self>, simulation_id: String) {
        let this = Arc::clone(self);
        let sim_id_for_error = simulation_id.clone();
        let result = timeout(RATING_TIMEOUT, async move {
            let Some(sim) = this.state_store.load(&simulation_id).await? else {
                return Ok::<_, SimError>(());
            };
            let (event, fields) = debrief::generate_rating(&sim, this.oracle.as_ref()).await;
            this.event_bus.publish(&simulation_id, &[event]);
            if let Some(fields) = fields {
                this.rating_store
                    .upsert_llm_rating(&simulation_id, &fields, sim.owner_user_id.as_deref(), &sim.scenario_key)
                    .await;
            }
            Ok(())
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.publish_error(&sim_id_for_error, &err),
            Err(_) => log::error!("generate_rating timed out for {}", sim_id_for_error),
        }
    }

    /// `request_user_rating`: surfaces the stored (or still-pending)
    /// rating to the player as `request_user_rating`.
    pub async fn request_user_rating(self: &Arc<Self>, simulation_id: String) {
        let rating = self
            .rating_store
            .get(&simulation_id)
            .await
            .map(|record| {
                serde_json::json!({
                    "overall_score": record.llm_overall_score,
                    "qualitative_feedback": record.llm_qualitative_feedback,
                })
            })
            .unwrap_or_else(|| serde_json::json!({}));

        self.event_bus.publish(
            &simulation_id,
            &[Event::new(
                simulation_id.clone(),
                EventKind::RequestUserRating {
                    performance_rating: rating,
                },
            )],
        );
    }

    /// `trigger_briefing_prompt`: a silent no-op unless the simulation is
    /// still sitting in `POST_INITIAL_CRISIS` (§4.6 Debrief).
    pub async fn trigger_briefing_prompt(self: &Arc<Self>, simulation_id: String) {
        let Ok(Some(sim)) = self.state_store.load(&simulation_id).await else {
            return;
        };
        if sim.simulation_state != SimulationState::PostInitialCrisis {
            return;
        }
        self.event_bus.publish(
            &simulation_id,
            &[Event::new(
                simulation_id,
                EventKind::RequestYesNo {
                    prompt: "Would you like to proceed to the analyst briefing?".to_string(),
                    action_context: "post_initial_crisis".to_string(),
                },
            )],
        );
    }
}

fn should_emit_background_noise(sim: &Simulation) -> bool {
    let since = (sim.simulation_time - sim.last_background_noise_time).num_seconds() as f64;
    since >= BACKGROUND_LOG_NOISE_INTERVAL_SECONDS
}

/// Accumulates this tick's sim-time advance onto `time_wasted_waiting_seconds`
/// for as long as the player's last logged action is `wait` (§4.6 player
/// input dispatch: `wait` itself does not advance time, but the background
/// tick charges the elapsed sim-time against the metric while it holds).
fn accumulate_wait_time(sim: &mut Simulation, time_before_sync: chrono::DateTime<chrono::Utc>) {
    let elapsed = (sim.simulation_time - time_before_sync).num_milliseconds() as f64 / 1000.0;
    if elapsed <= 0.0 {
        return;
    }
    let is_waiting = sim
        .player_action_log
        .back()
        .map(|(_, action, _)| action == "wait")
        .unwrap_or(false);
    if is_waiting {
        sim.metrics.time_wasted_waiting_seconds += elapsed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::MockOracle;
    use crate::rating_store::InMemoryRatingStore;
    use crate::scenarios::RANSOMWARE;
    use crate::state_store::InMemoryStateStore;

    fn runtime() -> Arc<TaskRuntime> {
        TaskRuntime::new(
            InMemoryStateStore::new(),
            EventBus::new(),
            Arc::new(MockOracle::new("Understood, on it.")),
            InMemoryRatingStore::new(),
        )
    }

    #[tokio::test]
    async fn start_simulation_persists_and_publishes() {
        let runtime = runtime();
        let mut sub = runtime.event_bus.subscribe("sim-task-1");

        runtime
            .start_simulation(
                "sim-task-1".into(),
                None,
                Some("sim-task-1".into()),
                "Player".into(),
                "CTO".into(),
                RANSOMWARE.into(),
                "Medium".into(),
                30,
            )
            .await;

        let loaded = runtime.state_store.load("sim-task-1").await.unwrap();
        assert!(loaded.is_some());
        let event = sub.receiver.recv().await.unwrap();
        assert_eq!(event.type_str(), "simulation_started");
    }

    #[tokio::test]
    async fn handle_action_denies_a_mismatched_owner() {
        let runtime = runtime();
        runtime
            .start_simulation(
                "sim-task-2".into(),
                Some("owner-a".into()),
                None,
                "Player".into(),
                "CTO".into(),
                RANSOMWARE.into(),
                "Medium".into(),
                30,
            )
            .await;

        let mut sub = runtime.event_bus.subscribe("sim-task-2");
        runtime
            .handle_action("sim-task-2".into(), Some("owner-b".into()), "status".into())
            .await;

        let event = sub.receiver.recv().await.unwrap();
        assert_eq!(event.type_str(), "error");
    }

    #[tokio::test]
    async fn handle_action_dispatches_for_the_owner() {
        let runtime = runtime();
        runtime
            .start_simulation(
                "sim-task-3".into(),
                Some("owner-a".into()),
                None,
                "Player".into(),
                "CTO".into(),
                RANSOMWARE.into(),
                "Medium".into(),
                30,
            )
            .await;

        runtime
            .handle_action("sim-task-3".into(), Some("owner-a".into()), "status".into())
            .await;

        let sim = runtime.state_store.load("sim-task-3").await.unwrap().unwrap();
        assert_eq!(sim.simulation_state, SimulationState::AwaitingPlayerChoice);
    }

    #[tokio::test]
    async fn background_check_on_a_finished_run_does_not_reschedule() {
        let runtime = runtime();
        runtime
            .start_simulation(
                "sim-task-4".into(),
                None,
                Some("sim-task-4".into()),
                "Player".into(),
                "CTO".into(),
                RANSOMWARE.into(),
                "Medium".into(),
                1,
            )
            .await;

        {
            let mut sim = runtime.state_store.load("sim-task-4").await.unwrap().unwrap();
            sim.simulation_time = sim.simulation_end_time;
            runtime
                .state_store
                .save(&sim.simulation_id, &sim, DEFAULT_TTL)
                .await
                .unwrap();
        }

        let next = runtime.run_background_check("sim-task-4").await.unwrap();
        assert!(next.is_none());

        let sim = runtime.state_store.load("sim-task-4").await.unwrap().unwrap();
        assert_eq!(sim.simulation_state, SimulationState::PostInitialCrisis);
    }

    #[tokio::test]
    async fn request_user_rating_with_no_stored_rating_emits_an_empty_object() {
        let runtime = runtime();
        let mut sub = runtime.event_bus.subscribe("sim-task-5");
        runtime.request_user_rating("sim-task-5".into()).await;
        let event = sub.receiver.recv().await.unwrap();
        assert_eq!(event.type_str(), "request_user_rating");
    }
}
