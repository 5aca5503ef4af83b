//! The external rating-store boundary (§6).
//!
//! Relational persistence of finalized ratings is explicitly out of
//! scope (§1) — a real SQL-backed implementation belongs to the
//! embedder. This module defines the trait the debrief/rating chain
//! calls through, plus an in-memory reference implementation for tests
//! and for embedders who haven't wired a database up yet.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One row of the `simulation_ratings` table, unique on `simulation_id`.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RatingRecord {
    pub simulation_id: String,
    pub user_id: Option<String>,
    pub scenario_key: Option<String>,
    pub llm_timeliness_score: Option<i32>,
    pub llm_contact_strategy_score: Option<i32>,
    pub llm_decision_quality_score: Option<i32>,
    pub llm_efficiency_score: Option<i32>,
    pub llm_overall_score: Option<i32>,
    pub llm_qualitative_feedback: Option<String>,
    pub llm_rated_at: Option<DateTime<Utc>>,
    pub user_rating_stars: Option<i32>,
    pub user_feedback_text: Option<String>,
    pub user_rated_at: Option<DateTime<Utc>>,
}

/// The validated rating produced by `generate_rating` (§4.6 Debrief).
#[derive(Debug, Clone)]
pub struct LlmRatingFields {
    pub timeliness_score: i32,
    pub contact_strategy_score: i32,
    pub decision_quality_score: i32,
    pub efficiency_score: i32,
    pub overall_score: i32,
    pub qualitative_feedback: String,
}

#[async_trait]
pub trait RatingStore: Send + Sync {
    /// Updates only the `llm_*` field group, creating the row if absent.
    async fn upsert_llm_rating(
        &self,
        simulation_id: &str,
        fields: &LlmRatingFields,
        user_id: Option<&str>,
        scenario_key: &str,
    );

    /// Updates only the `user_*` field group, creating the row if absent.
    async fn upsert_user_star_rating(
        &self,
        simulation_id: &str,
        stars: i32,
        feedback: Option<&str>,
        user_id: Option<&str>,
    );

    async fn get(&self, simulation_id: &str) -> Option<RatingRecord>;
}

#[derive(Default)]
pub struct InMemoryRatingStore {
    rows: Mutex<HashMap<String, RatingRecord>>,
}

impl InMemoryRatingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(InMemoryRatingStore::default())
    }
}

#[async_trait]
impl RatingStore for InMemoryRatingStore {
    async fn upsert_llm_rating(
        &self,
        simulation_id: &str,
        fields: &LlmRatingFields,
        user_id: Option<&str>,
        scenario_key: &str,
    ) {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.entry(simulation_id.to_string()).or_insert_with(|| RatingRecord {
            simulation_id: simulation_id.to_string(),
            ..Default::default()
        });
        row.user_id = user_id.map(|s| s.to_string());
        row.scenario_key = Some(scenario_key.to_string());
        row.llm_timeliness_score = Some(fields.timeliness_score);
        row.llm_contact_strategy_score = Some(fields.contact_strategy_score);
        row.llm_decision_quality_score = Some(fields.decision_quality_score);
        row.llm_efficiency_score = Some(fields.efficiency_score);
        row.llm_overall_score = Some(fields.overall_score);
        row.llm_qualitative_feedback = Some(fields.qualitative_feedback.clone());
        row.llm_rated_at = Some(Utc::now());
    }

    async fn upsert_user_star_rating(
        &self,
        simulation_id: &str,
        stars: i32,
        feedback: Option<&str>,
        user_id: Option<&str>,
    ) {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.entry(simulation_id.to_string()).or_insert_with(|| RatingRecord {
            simulation_id: simulation_id.to_string(),
            ..Default::default()
        });
        if row.user_id.is_none() {
            row.user_id = user_id.map(|s| s.to_string());
        }
        row.user_rating_stars = Some(stars);
        row.user_feedback_text = feedback.map(|s| s.to_string());
        row.user_rated_at = Some(Utc::now());
    }

    async fn get(&self, simulation_id: &str) -> Option<RatingRecord> {
        self.rows.lock().unwrap().get(simulation_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn llm_and_user_upserts_only_touch_their_own_field_group() {
        let store = InMemoryRatingStore::new();
        store
            .upsert_llm_rating(
                "sim-1",
                &LlmRatingFields {
                    timeliness_score: 7,
                    contact_strategy_score: 8,
                    decision_quality_score: 6,
                    efficiency_score: 9,
                    overall_score: 7,
                    qualitative_feedback: "Solid response.".into(),
                },
                Some("user-a"),
                "Ransomware",
            )
            .await;
        store
            .upsert_user_star_rating("sim-1", 4, Some("Good scenario"), Some("user-a"))
            .await;

        let row = store.get("sim-1").await.unwrap();
        assert_eq!(row.llm_overall_score, Some(7));
        assert_eq!(row.user_rating_stars, Some(4));
        assert_eq!(row.scenario_key.as_deref(), Some("Ransomware"));
    }
}
