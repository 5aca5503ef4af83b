//! Black-box lifecycle test: start a simulation, drive it through a few
//! player actions and a shutdown decision, and check what actually comes
//! out of the event bus and the state store — only through the crate's
//! public API, no internal module access.

use crisis_sim_engine::event::EventKind;
use crisis_sim_engine::event_bus::EventBus;
use crisis_sim_engine::oracle::MockOracle;
use crisis_sim_engine::rating_store::InMemoryRatingStore;
use crisis_sim_engine::scenarios::RANSOMWARE;
use crisis_sim_engine::simulation::model::SimulationState;
use crisis_sim_engine::state_store::InMemoryStateStore;
use crisis_sim_engine::TaskRuntime;
use std::sync::Arc;

fn runtime() -> Arc<TaskRuntime> {
    TaskRuntime::new(
        InMemoryStateStore::new(),
        EventBus::new(),
        Arc::new(MockOracle::new("Understood, I'm on it.")),
        InMemoryRatingStore::new(),
    )
}

#[tokio::test]
async fn a_guest_can_call_an_agent_and_force_a_decision() {
    let runtime = runtime();
    let sim_id = "lifecycle-guest-1".to_string();

    runtime
        .start_simulation(
            sim_id.clone(),
            None,
            Some(sim_id.clone()),
            "Player".into(),
            "CTO".into(),
            RANSOMWARE.into(),
            "Medium".into(),
            30,
        )
        .await;

    let sim = runtime.state_store.load(&sim_id).await.unwrap().unwrap();
    assert_eq!(sim.simulation_state, SimulationState::AwaitingPlayerChoice);

    let mut sub = runtime.event_bus.subscribe(&sim_id);

    runtime
        .handle_action(sim_id.clone(), None, "call hao wang".into())
        .await;
    let sim = runtime.state_store.load(&sim_id).await.unwrap().unwrap();
    assert_eq!(sim.simulation_state, SimulationState::InConversation);
    let event = sub.receiver.recv().await.unwrap();
    assert_eq!(event.type_str(), "conversation_started");

    runtime
        .handle_action(sim_id.clone(), None, "hang up".into())
        .await;
    let sim = runtime.state_store.load(&sim_id).await.unwrap().unwrap();
    assert_eq!(sim.simulation_state, SimulationState::AwaitingPlayerChoice);

    runtime
        .handle_action(sim_id.clone(), None, "decide".into())
        .await;
    let sim = runtime.state_store.load(&sim_id).await.unwrap().unwrap();
    assert_eq!(sim.simulation_state, SimulationState::DecisionPointShutdown);

    runtime
        .handle_action(sim_id.clone(), None, "broad".into())
        .await;
    let sim = runtime.state_store.load(&sim_id).await.unwrap().unwrap();
    assert_eq!(sim.simulation_state, SimulationState::PostInitialCrisis);
    assert!(sim
        .system_status
        .values()
        .all(|status| status == "OFFLINE (Manual)"));
}

#[tokio::test]
async fn an_owned_simulation_rejects_a_different_owner() {
    let runtime = runtime();
    let sim_id = "lifecycle-owned-1".to_string();

    runtime
        .start_simulation(
            sim_id.clone(),
            Some("owner-1".into()),
            None,
            "Player".into(),
            "CTO".into(),
            RANSOMWARE.into(),
            "Medium".into(),
            30,
        )
        .await;

    let mut sub = runtime.event_bus.subscribe(&sim_id);
    runtime
        .handle_action(sim_id.clone(), Some("intruder".into()), "status".into())
        .await;

    let event = sub.receiver.recv().await.unwrap();
    match event.kind {
        EventKind::Error { .. } => {}
        other => panic!("expected an access-denied error event, got {:?}", other),
    }

    // State is untouched: still awaiting the owner's first action.
    let sim = runtime.state_store.load(&sim_id).await.unwrap().unwrap();
    assert_eq!(sim.simulation_state, SimulationState::AwaitingPlayerChoice);
}

#[tokio::test]
async fn post_initial_crisis_no_ends_the_run_without_a_briefing() {
    let runtime = runtime();
    let sim_id = "lifecycle-end-1".to_string();

    runtime
        .start_simulation(
            sim_id.clone(),
            None,
            Some(sim_id.clone()),
            "Player".into(),
            "CTO".into(),
            RANSOMWARE.into(),
            "Medium".into(),
            30,
        )
        .await;
    runtime.handle_action(sim_id.clone(), None, "decide".into()).await;
    runtime.handle_action(sim_id.clone(), None, "hold".into()).await;

    let sim = runtime.state_store.load(&sim_id).await.unwrap().unwrap();
    assert_eq!(sim.simulation_state, SimulationState::PostInitialCrisis);

    runtime.handle_action(sim_id.clone(), None, "no".into()).await;
    let sim = runtime.state_store.load(&sim_id).await.unwrap().unwrap();
    assert_eq!(sim.simulation_state, SimulationState::Ended);
    assert!(!sim.simulation_running);
}
