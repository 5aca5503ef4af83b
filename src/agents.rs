//! The default agent roster: a static data table, not a class hierarchy.
//!
//! Per §9's "Agent roster as data" note, every NPC is the same
//! [`AgentRuntimeState`](crate::simulation::model::AgentRuntimeState)
//! record; persona text and initial flags live here as plain constants.

use std::collections::HashMap;

use crate::simulation::model::{AgentRuntimeState, AgentState};

pub const HAO_WANG: &str = "Hao Wang";
pub const PAUL_KAHN: &str = "Paul Kahn";
pub const LYNDA_CARNEY: &str = "Lynda Carney";
pub const CEO: &str = "CEO";
pub const LEGAL_COUNSEL: &str = "Legal Counsel";
pub const PR_HEAD: &str = "PR Head";

const HAO_WANG_PERSONA: &str = "You are Hao Wang, Head of IT Security. You are methodical, \
technical, and cautious. You favor containment over speed and will push back on rash actions \
that risk destroying forensic evidence.";

const HAO_WANG_UPDATE_PERSONA: &str = "You are Hao Wang, Head of IT Security. You are methodical, \
technical, and cautious. Goal Now: give a brief, unsolicited status update on the investigation, \
unprompted, in two sentences or fewer.";

const PAUL_KAHN_PERSONA: &str = "You are Paul Kahn, a company executive. You are impatient, \
focused on business continuity and optics, and increasingly anxious the longer the crisis runs \
unresolved. You want a decision, not a process.";

const LYNDA_CARNEY_PERSONA: &str = "You are Lynda Carney, Senior Security Analyst. You are calm, \
observant, and report facts from the monitoring console without editorializing.";

const LYNDA_CARNEY_UPDATE_PERSONA: &str = "You are Lynda Carney, Senior Security Analyst. You are \
calm and observant. Goal Now: give a brief, unsolicited status update from the monitoring console, \
unprompted, in two sentences or fewer.";

const CEO_PERSONA: &str = "You are the CEO. You are currently on an external call and unavailable \
for most of the crisis; when reached, you defer technical decisions to the CTO but care deeply \
about reputational and legal exposure.";

const LEGAL_PERSONA: &str = "You are Legal Counsel. You speak in terms of liability, disclosure \
obligations, and regulatory exposure, and want to be consulted before any public statement.";

const PR_PERSONA: &str = "You are the Head of PR. You care about the narrative the public and \
press will take away from this incident, and how the company's response will be perceived.";

/// Builds the default six-agent roster with its initial states and flag
/// defaults, ready to be overridden per-scenario by the caller.
pub fn default_agent_table() -> HashMap<String, AgentRuntimeState> {
    let mut agents = HashMap::new();

    agents.insert(
        HAO_WANG.to_string(),
        AgentRuntimeState {
            role: "Head of IT Security".to_string(),
            persona_prompt: HAO_WANG_PERSONA.to_string(),
            update_persona_prompt: Some(HAO_WANG_UPDATE_PERSONA.to_string()),
            state: AgentState::Available,
            flags: flags(&["has_advised_caution", "called_by_player", "attempted_call"]),
            last_contact_time: None,
            last_update_time: None,
            last_initiative_check_time: None,
            conversation_history: Vec::new(),
        },
    );

    agents.insert(
        PAUL_KAHN.to_string(),
        AgentRuntimeState {
            role: "Executive".to_string(),
            persona_prompt: PAUL_KAHN_PERSONA.to_string(),
            update_persona_prompt: None,
            state: AgentState::Available,
            flags: flags(&[
                "has_demanded_shutdown",
                "called_by_player",
                "attempted_call",
            ]),
            last_contact_time: None,
            last_update_time: None,
            last_initiative_check_time: None,
            conversation_history: Vec::new(),
        },
    );

    agents.insert(
        LYNDA_CARNEY.to_string(),
        AgentRuntimeState {
            role: "Sr. Security Analyst".to_string(),
            persona_prompt: LYNDA_CARNEY_PERSONA.to_string(),
            update_persona_prompt: Some(LYNDA_CARNEY_UPDATE_PERSONA.to_string()),
            state: AgentState::BusyMonitoring,
            flags: flags(&[
                "has_reported",
                "called_by_player",
                "alerted_encryption",
                "alerted_critical",
                "alerted_compromise",
            ]),
            last_contact_time: None,
            last_update_time: None,
            last_initiative_check_time: None,
            conversation_history: Vec::new(),
        },
    );

    agents.insert(
        CEO.to_string(),
        AgentRuntimeState {
            role: "CEO".to_string(),
            persona_prompt: CEO_PERSONA.to_string(),
            update_persona_prompt: None,
            state: AgentState::BusyExternalCall,
            flags: HashMap::new(),
            last_contact_time: None,
            last_update_time: None,
            last_initiative_check_time: None,
            conversation_history: Vec::new(),
        },
    );

    agents.insert(
        LEGAL_COUNSEL.to_string(),
        AgentRuntimeState {
            role: "Legal Counsel".to_string(),
            persona_prompt: LEGAL_PERSONA.to_string(),
            update_persona_prompt: None,
            state: AgentState::Available,
            flags: HashMap::new(),
            last_contact_time: None,
            last_update_time: None,
            last_initiative_check_time: None,
            conversation_history: Vec::new(),
        },
    );

    agents.insert(
        PR_HEAD.to_string(),
        AgentRuntimeState {
            role: "Head of PR".to_string(),
            persona_prompt: PR_PERSONA.to_string(),
            update_persona_prompt: None,
            state: AgentState::Available,
            flags: HashMap::new(),
            last_contact_time: None,
            last_update_time: None,
            last_initiative_check_time: None,
            conversation_history: Vec::new(),
        },
    );

    agents
}

fn flags(names: &[&str]) -> HashMap<String, bool> {
    names.iter().map(|n| (n.to_string(), false)).collect()
}

/// Resolves player input like `"call hao"` against the roster: exact
/// match first, then substring, then first-token match, as described in
/// §4.6's player input dispatch for `call <agent>`.
pub fn resolve_agent_name<'a>(
    agents: &'a HashMap<String, AgentRuntimeState>,
    query: &str,
) -> Option<&'a str> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return None;
    }

    for name in agents.keys() {
        if name.to_lowercase() == query {
            return Some(name.as_str());
        }
    }
    for name in agents.keys() {
        if name.to_lowercase().contains(&query) {
            return Some(name.as_str());
        }
    }
    let first_token = query.split_whitespace().next().unwrap_or(&query);
    for name in agents.keys() {
        if name
            .to_lowercase()
            .split_whitespace()
            .next()
            .map(|t| t == first_token)
            .unwrap_or(false)
        {
            return Some(name.as_str());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_has_six_agents() {
        let agents = default_agent_table();
        assert_eq!(agents.len(), 6);
        assert!(agents.contains_key(HAO_WANG));
        assert!(agents.contains_key(LYNDA_CARNEY));
    }

    #[test]
    fn resolve_agent_name_matches_by_substring_and_first_token() {
        let agents = default_agent_table();
        assert_eq!(resolve_agent_name(&agents, "hao wang"), Some(HAO_WANG));
        assert_eq!(resolve_agent_name(&agents, "hao"), Some(HAO_WANG));
        assert_eq!(resolve_agent_name(&agents, "lynda"), Some(LYNDA_CARNEY));
        assert_eq!(resolve_agent_name(&agents, "nobody"), None);
    }
}
