//! Scenario catalog: data, not code.
//!
//! Per §9's "Rule functions as data" note, escalation rules are tagged
//! structs evaluated against a live `Simulation`, never raw closures
//! embedded in state. A scenario is fully described by this module's
//! static table; the engine (`crate::simulation::escalation`) only knows
//! how to *evaluate* a rule, not what any particular rule says.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::simulation::model::{AgentState, Simulation};

pub const DEFAULT_SIM_DURATION_MINUTES: i64 = 30;

pub const RANSOMWARE: &str = "Ransomware";
pub const DDOS: &str = "DDoS";
pub const CRITICAL_DATA_BREACH: &str = "Critical Data Breach";
pub const INSIDER_THREAT: &str = "Insider Threat";

/// A single condition an escalation rule's status requirements check.
#[derive(Debug, Clone)]
pub enum StatusRequirement {
    /// `system_status[system] == status`.
    Equals { system: &'static str, status: &'static str },
    /// `system_status[system]` contains `substring`.
    Contains {
        system: &'static str,
        substring: &'static str,
    },
}

impl StatusRequirement {
    fn is_met(&self, sim: &Simulation) -> bool {
        match self {
            StatusRequirement::Equals { system, status } => sim
                .system_status
                .get(*system)
                .map(|s| s == status)
                .unwrap_or(false),
            StatusRequirement::Contains { system, substring } => sim
                .system_status
                .get(*system)
                .map(|s| s.contains(substring))
                .unwrap_or(false),
        }
    }
}

/// A guard requiring the *absence* of a recent mitigating player action.
#[derive(Debug, Clone)]
pub struct PlayerActionGuard {
    pub kind: &'static str,
    pub target: Option<&'static str>,
    /// How far back (sim-seconds) to look for the mitigating action,
    /// before dividing by `current_intensity_mod` the same way
    /// `after_seconds` is scaled.
    pub lookback_seconds: f64,
}

/// The status mutation an escalation rule applies once it fires.
#[derive(Debug, Clone)]
pub struct EscalationAction {
    pub system: &'static str,
    pub new_status: &'static str,
    pub reason: &'static str,
    pub log_event_type: &'static str,
}

/// One escalation rule: fires at most once, the first time its
/// requirements and elapsed-time threshold are met and its guard (if any)
/// is not tripped by a recent player action.
#[derive(Debug, Clone)]
pub struct EscalationRule {
    pub requires: Vec<StatusRequirement>,
    /// Sim-seconds since simulation start before this rule is eligible,
    /// *before* dividing by `current_intensity_mod`.
    pub after_seconds: f64,
    pub guard: Option<PlayerActionGuard>,
    pub action: EscalationAction,
}

impl EscalationRule {
    /// `true` iff every status requirement holds, the scaled time
    /// threshold has elapsed, and (if present) the guard's mitigating
    /// player action has *not* been logged recently.
    pub fn condition_met(&self, sim: &Simulation, now_sim_utc: DateTime<Utc>) -> bool {
        if !self.requires.iter().all(|r| r.is_met(sim)) {
            return false;
        }

        let elapsed = (now_sim_utc - sim.simulation_start_time).num_milliseconds() as f64 / 1000.0;
        let scaled_threshold = self.after_seconds / sim.current_intensity_mod;
        if elapsed < scaled_threshold {
            return false;
        }

        if let Some(guard) = &self.guard {
            let scaled_lookback = guard.lookback_seconds / sim.current_intensity_mod;
            let since = now_sim_utc - chrono::Duration::milliseconds((scaled_lookback * 1000.0) as i64);
            if sim.check_recent_player_action(guard.kind, guard.target, since) {
                return false;
            }
        }

        true
    }

    /// Applies the rule's action. Returns `true` iff the status actually
    /// changed (a no-op status "change" does not count as a fire).
    pub fn fire(&self, sim: &mut Simulation) -> bool {
        let old = sim.system_status.get(self.action.system).cloned();
        if old.as_deref() == Some(self.action.new_status) {
            return false;
        }
        sim.system_status
            .insert(self.action.system.to_string(), self.action.new_status.to_string());
        true
    }
}

/// Intensity modifier choices a player selects from when starting a
/// scenario; maps to the scalar actually stored as `initial_intensity_mod`.
#[derive(Debug, Clone, Copy)]
pub struct IntensityChoices {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl IntensityChoices {
    pub fn resolve(&self, key: &str) -> Option<f64> {
        match key {
            "Low" => Some(self.low),
            "Medium" => Some(self.medium),
            "High" => Some(self.high),
            _ => None,
        }
    }
}

pub struct Scenario {
    pub key: &'static str,
    pub description: &'static str,
    pub intensity_modifier: IntensityChoices,
    pub initial_system_status: fn() -> HashMap<String, String>,
    pub initial_agent_states: fn() -> HashMap<String, AgentState>,
    pub escalation_rules: Vec<EscalationRule>,
    /// The system/status pair whose presence ends the simulation with a
    /// critical failure (see `check_end_conditions` in §4.6).
    pub critical_failure: (&'static str, &'static str),
}

fn status_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn ransomware_initial_status() -> HashMap<String, String> {
    status_map(&[
        ("Auth_System", "NOMINAL"),
        ("Network_Segment_Internal", "NOMINAL"),
        ("File_Servers", "NOMINAL"),
        ("Network_Edge", "NOMINAL"),
        ("Website_Public", "NOMINAL"),
    ])
}

fn no_agent_overrides() -> HashMap<String, AgentState> {
    HashMap::new()
}

fn ddos_initial_status() -> HashMap<String, String> {
    status_map(&[
        ("Network_Edge", "NOMINAL"),
        ("Website_Public", "NOMINAL"),
        ("VPN_Access", "NOMINAL"),
    ])
}

fn breach_initial_status() -> HashMap<String, String> {
    status_map(&[
        ("Customer_Database", "NOMINAL"),
        ("Network_Edge", "NOMINAL"),
        ("Website_Public", "NOMINAL"),
    ])
}

fn insider_initial_status() -> HashMap<String, String> {
    status_map(&[
        ("Auth_System", "NOMINAL"),
        ("Network_Segment_Internal", "NOMINAL"),
        ("Customer_Database", "NOMINAL"),
        ("HR_System", "NOMINAL"),
    ])
}

fn insider_initial_agent_states() -> HashMap<String, AgentState> {
    let mut m = HashMap::new();
    m.insert(crate::agents::LYNDA_CARNEY.to_string(), AgentState::Investigating);
    m
}

pub fn scenario_catalog() -> HashMap<&'static str, Scenario> {
    let mut catalog = HashMap::new();

    catalog.insert(
        RANSOMWARE,
        Scenario {
            key: RANSOMWARE,
            description: "A ransomware strain is spreading through the internal network, \
encrypting file shares as it goes.",
            intensity_modifier: IntensityChoices {
                low: 1.5,
                medium: 1.0,
                high: 0.7,
            },
            initial_system_status: ransomware_initial_status,
            initial_agent_states: no_agent_overrides,
            escalation_rules: vec![
                EscalationRule {
                    requires: vec![StatusRequirement::Equals {
                        system: "Auth_System",
                        status: "HIGH_FAILURES",
                    }],
                    after_seconds: 300.0,
                    guard: Some(PlayerActionGuard {
                        kind: "isolate",
                        target: Some("Network_Segment_Internal"),
                        lookback_seconds: 300.0,
                    }),
                    action: EscalationAction {
                        system: "Network_Segment_Internal",
                        new_status: "ANOMALOUS_TRAFFIC",
                        reason: "Lateral movement detected",
                        log_event_type: "ESCALATION",
                    },
                },
                EscalationRule {
                    requires: vec![StatusRequirement::Equals {
                        system: "Network_Segment_Internal",
                        status: "ANOMALOUS_TRAFFIC",
                    }],
                    after_seconds: 600.0,
                    guard: None,
                    action: EscalationAction {
                        system: "File_Servers",
                        new_status: "ENCRYPTING",
                        reason: "Ransomware payload executing",
                        log_event_type: "ESCALATION",
                    },
                },
                EscalationRule {
                    requires: vec![StatusRequirement::Equals {
                        system: "File_Servers",
                        status: "ENCRYPTING",
                    }],
                    after_seconds: 900.0,
                    guard: None,
                    action: EscalationAction {
                        system: "File_Servers",
                        new_status: "ENCRYPTED (CRITICAL)",
                        reason: "Encryption complete",
                        log_event_type: "ESCALATION",
                    },
                },
            ],
            critical_failure: ("File_Servers", "ENCRYPTED (CRITICAL)"),
        },
    );

    catalog.insert(
        DDOS,
        Scenario {
            key: DDOS,
            description: "A distributed denial-of-service attack is saturating the public-facing \
edge network.",
            intensity_modifier: IntensityChoices {
                low: 1.5,
                medium: 1.0,
                high: 0.6,
            },
            initial_system_status: ddos_initial_status,
            initial_agent_states: no_agent_overrides,
            escalation_rules: vec![
                EscalationRule {
                    requires: vec![StatusRequirement::Equals {
                        system: "Network_Edge",
                        status: "HIGH_LOAD",
                    }],
                    after_seconds: 300.0,
                    guard: Some(PlayerActionGuard {
                        kind: "block ip",
                        target: None,
                        lookback_seconds: 300.0,
                    }),
                    action: EscalationAction {
                        system: "Website_Public",
                        new_status: "OFFLINE",
                        reason: "Edge capacity exhausted",
                        log_event_type: "ESCALATION",
                    },
                },
                EscalationRule {
                    requires: vec![StatusRequirement::Equals {
                        system: "Website_Public",
                        status: "OFFLINE",
                    }],
                    after_seconds: 900.0,
                    guard: None,
                    action: EscalationAction {
                        system: "VPN_Access",
                        new_status: "DEGRADED",
                        reason: "Attack traffic saturating VPN concentrators",
                        log_event_type: "ESCALATION",
                    },
                },
            ],
            critical_failure: ("__none__", "__none__"),
        },
    );

    catalog.insert(
        CRITICAL_DATA_BREACH,
        Scenario {
            key: CRITICAL_DATA_BREACH,
            description: "Anomalous access patterns suggest the customer database is being \
exfiltrated.",
            intensity_modifier: IntensityChoices {
                low: 1.5,
                medium: 1.0,
                high: 0.8,
            },
            initial_system_status: breach_initial_status,
            initial_agent_states: no_agent_overrides,
            escalation_rules: vec![
                EscalationRule {
                    requires: vec![
                        StatusRequirement::Equals {
                            system: "Customer_Database",
                            status: "ANOMALOUS_ACCESS",
                        },
                        StatusRequirement::Equals {
                            system: "Network_Edge",
                            status: "HIGH_EGRESS",
                        },
                    ],
                    after_seconds: 480.0,
                    guard: Some(PlayerActionGuard {
                        kind: "isolate",
                        target: Some("Customer_Database"),
                        lookback_seconds: 480.0,
                    }),
                    action: EscalationAction {
                        system: "Customer_Database",
                        new_status: "COMPROMISED (CRITICAL)",
                        reason: "Exfiltration confirmed",
                        log_event_type: "ESCALATION",
                    },
                },
                EscalationRule {
                    requires: vec![StatusRequirement::Contains {
                        system: "Customer_Database",
                        substring: "COMPROMISED",
                    }],
                    after_seconds: 900.0,
                    guard: None,
                    action: EscalationAction {
                        system: "Website_Public",
                        new_status: "DEGRADED",
                        reason: "Incident response load impacting public services",
                        log_event_type: "ESCALATION",
                    },
                },
            ],
            critical_failure: ("Customer_Database", "COMPROMISED (CRITICAL)"),
        },
    );

    catalog.insert(
        INSIDER_THREAT,
        Scenario {
            key: INSIDER_THREAT,
            description: "An internal account is exhibiting anomalous administrative behavior \
consistent with insider misuse.",
            intensity_modifier: IntensityChoices {
                low: 1.5,
                medium: 1.0,
                high: 0.7,
            },
            initial_system_status: insider_initial_status,
            initial_agent_states: insider_initial_agent_states,
            escalation_rules: vec![
                EscalationRule {
                    requires: vec![
                        StatusRequirement::Equals {
                            system: "Auth_System",
                            status: "ANOMALOUS_ADMIN_LOGIN",
                        },
                        StatusRequirement::Equals {
                            system: "Network_Segment_Internal",
                            status: "ANOMALOUS_TRAFFIC",
                        },
                    ],
                    after_seconds: 420.0,
                    guard: None,
                    action: EscalationAction {
                        system: "Customer_Database",
                        new_status: "ANOMALOUS_ACCESS",
                        reason: "Insider pivoting toward customer data",
                        log_event_type: "ESCALATION",
                    },
                },
                EscalationRule {
                    requires: vec![StatusRequirement::Equals {
                        system: "Auth_System",
                        status: "ANOMALOUS_ADMIN_LOGIN",
                    }],
                    after_seconds: 720.0,
                    guard: None,
                    action: EscalationAction {
                        system: "HR_System",
                        new_status: "ANOMALOUS_ACCESS",
                        reason: "Insider accessing HR records",
                        log_event_type: "ESCALATION",
                    },
                },
                EscalationRule {
                    requires: vec![StatusRequirement::Contains {
                        system: "Customer_Database",
                        substring: "ANOMALOUS_ACCESS",
                    }],
                    after_seconds: 1080.0,
                    guard: Some(PlayerActionGuard {
                        kind: "isolate",
                        target: Some("Customer_Database"),
                        lookback_seconds: 600.0,
                    }),
                    action: EscalationAction {
                        system: "Customer_Database",
                        new_status: "COMPROMISED (CRITICAL)",
                        reason: "Insider completed exfiltration (Insider)",
                        log_event_type: "ESCALATION",
                    },
                },
            ],
            critical_failure: ("Customer_Database", "COMPROMISED (CRITICAL)"),
        },
    );

    catalog
}
