//! Access gate (§4.4) and JWT claim modeling (§6).
//!
//! The HTTP/WebSocket front door that actually decodes a bearer token is
//! out of scope (§1); what this module owns is the claim shape and the
//! ownership check the front door would call through to, so that "missing
//! or invalid JWT downgrades to guest" is a concrete, testable contract
//! rather than a sentence in a different service's code.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::state_store::StateStore;

/// JWT claims, per §6: `{user_id, email, role, name, exp}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub email: String,
    pub role: String,
    pub name: String,
    pub exp: i64,
}

#[derive(Debug)]
pub enum ClaimsError {
    Invalid(jsonwebtoken::errors::Error),
}

impl std::fmt::Display for ClaimsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimsError::Invalid(e) => write!(f, "invalid token: {}", e),
        }
    }
}

impl std::error::Error for ClaimsError {}

/// Mints a signed HS256 token for the given claims. Exposed mainly so
/// tests (and embedders wiring up their own login endpoint) don't need a
/// second JWT dependency.
pub fn encode_claims(claims: &Claims, secret: &str) -> Result<String, ClaimsError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(ClaimsError::Invalid)
}

/// Decodes and validates a bearer/query-param token. Any failure here —
/// expired, malformed, wrong signature — is the caller's cue to downgrade
/// to a guest attempt per §6, not to hard-fail the request.
pub fn decode_claims(token: &str, secret: &str) -> Result<Claims, ClaimsError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(ClaimsError::Invalid)?;
    Ok(data.claims)
}

/// Given `sim_id` and an optional requester `user_id`, grants or denies
/// access per §4.4. Never distinguishes "does not exist" from "not
/// owned" in its return value — both collapse to `false`.
pub async fn verify_access(
    store: &dyn StateStore,
    simulation_id: &str,
    user_id: Option<&str>,
) -> bool {
    let Ok(Some(sim)) = store.load(simulation_id).await else {
        return false;
    };

    match user_id {
        Some(requester) => sim
            .owner_user_id
            .as_deref()
            .map(|owner| owner == requester)
            .unwrap_or(false),
        None => sim.owner_user_id.is_none()
            && sim.guest_id.as_deref() == Some(simulation_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_store::{InMemoryStateStore, StateStore as _};
    use std::collections::HashMap;

    fn owned_sim(id: &str, owner: &str) -> crate::simulation::model::Simulation {
        let now = chrono::Utc::now();
        let mut sim = crate::simulation::model::Simulation::new(
            id.into(),
            Some(owner.into()),
            None,
            "Player".into(),
            "CTO".into(),
            crate::scenarios::RANSOMWARE.into(),
            1.0,
            30,
            HashMap::new(),
            &HashMap::new(),
            now,
        );
        sim.owner_user_id = Some(owner.to_string());
        sim.guest_id = None;
        sim
    }

    fn guest_sim(id: &str) -> crate::simulation::model::Simulation {
        let now = chrono::Utc::now();
        let mut sim = crate::simulation::model::Simulation::new(
            id.into(),
            None,
            Some(id.into()),
            "Guest".into(),
            "CTO".into(),
            crate::scenarios::RANSOMWARE.into(),
            1.0,
            30,
            HashMap::new(),
            &HashMap::new(),
            now,
        );
        sim.owner_user_id = None;
        sim.guest_id = Some(id.to_string());
        sim
    }

    #[tokio::test]
    async fn owner_is_granted_and_others_are_denied() {
        let store = InMemoryStateStore::new();
        let sim = owned_sim("sim-a", "user-a");
        store
            .save(&sim.simulation_id, &sim, crate::state_store::DEFAULT_TTL)
            .await
            .unwrap();

        assert!(verify_access(store.as_ref(), "sim-a", Some("user-a")).await);
        assert!(!verify_access(store.as_ref(), "sim-a", Some("user-b")).await);
        assert!(!verify_access(store.as_ref(), "sim-a", None).await);
    }

    #[tokio::test]
    async fn guest_sim_grants_anonymous_and_denies_any_authenticated_user() {
        let store = InMemoryStateStore::new();
        let sim = guest_sim("guest-xxxx");
        store
            .save(&sim.simulation_id, &sim, crate::state_store::DEFAULT_TTL)
            .await
            .unwrap();

        assert!(verify_access(store.as_ref(), "guest-xxxx", None).await);
        assert!(!verify_access(store.as_ref(), "guest-xxxx", Some("user-a")).await);
    }

    #[tokio::test]
    async fn missing_simulation_is_denied_either_way() {
        let store = InMemoryStateStore::new();
        assert!(!verify_access(store.as_ref(), "nope", None).await);
        assert!(!verify_access(store.as_ref(), "nope", Some("user-a")).await);
    }

    #[test]
    fn claims_round_trip_through_encode_decode() {
        let claims = Claims {
            user_id: "user-a".into(),
            email: "a@example.com".into(),
            role: "player".into(),
            name: "Alice".into(),
            exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
        };
        let token = encode_claims(&claims, "secret").unwrap();
        let decoded = decode_claims(&token, "secret").unwrap();
        assert_eq!(decoded.user_id, "user-a");
    }

    #[test]
    fn wrong_secret_fails_to_decode() {
        let claims = Claims {
            user_id: "user-a".into(),
            email: "a@example.com".into(),
            role: "player".into(),
            name: "Alice".into(),
            exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
        };
        let token = encode_claims(&claims, "secret").unwrap();
        assert!(decode_claims(&token, "wrong-secret").is_err());
    }
}
