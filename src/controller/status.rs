//! Status management utilities.
//!
//! Folds the status reported by a backend resource into the normalised
//! InferenceService status. Two views are maintained side by side: the
//! coarse `state` (Creating/Available/Failed) and an ordered condition set
//! whose aggregate `Ready` condition is derived from its dependents.
//!
//! Everything here is pure. The current time is passed in by the caller so
//! identical inputs always produce an identical status.

use std::collections::BTreeMap;

use crate::backends::BackendStatus;
use crate::backends::kserve::KServeStatus;
use crate::backends::seldon::SeldonStatus;
use crate::crd::{Condition, ConditionStatus, ConditionType, InferenceServiceStatus, ServiceState};

/// Conditions the aggregate `Ready` condition depends on.
pub const DEPENDENTS: &[ConditionType] = &[ConditionType::BackendReady];

/// Reason used while the backend has not reported any status yet.
pub const REASON_AWAITING_BACKEND: &str = "AwaitingBackendStatus";

/// Reason used when the backend reports a failed deployment.
pub const REASON_DEPLOYMENT_FAILED: &str = "DeploymentFailed";

/// Reason used when `spec.backend` names no supported backend.
pub const REASON_UNSUPPORTED_BACKEND: &str = "UnsupportedBackend";

/// Ordered set of conditions keyed by type.
///
/// Marking a condition only moves its `lastTransitionTime` when the status
/// actually changes.
#[derive(Clone, Debug, Default)]
pub struct ConditionSet {
    conditions: BTreeMap<String, Condition>,
    now: String,
}

impl ConditionSet {
    /// Start from previously persisted conditions.
    pub fn from_conditions(conditions: &[Condition], now: &str) -> Self {
        Self {
            conditions: conditions
                .iter()
                .map(|c| (c.r#type.clone(), c.clone()))
                .collect(),
            now: now.to_string(),
        }
    }

    /// Look up a condition by type
    pub fn get(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.conditions.get(condition_type.as_str())
    }

    /// Add or update a condition
    pub fn mark(
        &mut self,
        condition_type: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: &str,
    ) -> &mut Self {
        let transition_time = match self.conditions.get(condition_type.as_str()) {
            Some(existing) if existing.status == status => existing.last_transition_time.clone(),
            _ => self.now.clone(),
        };
        self.conditions.insert(
            condition_type.as_str().to_string(),
            Condition::new(
                condition_type.as_str(),
                status,
                reason,
                message,
                &transition_time,
            ),
        );
        self
    }

    pub fn mark_true(&mut self, condition_type: ConditionType) -> &mut Self {
        self.mark(condition_type, ConditionStatus::True, "", "")
    }

    pub fn mark_false(
        &mut self,
        condition_type: ConditionType,
        reason: &str,
        message: &str,
    ) -> &mut Self {
        self.mark(condition_type, ConditionStatus::False, reason, message)
    }

    pub fn mark_unknown(
        &mut self,
        condition_type: ConditionType,
        reason: &str,
        message: &str,
    ) -> &mut Self {
        self.mark(condition_type, ConditionStatus::Unknown, reason, message)
    }

    /// Recompute the aggregate `Ready` condition from `dependents`.
    pub fn aggregate(&mut self, dependents: &[ConditionType]) -> &mut Self {
        let (status, reason, message) =
            aggregate_ready(dependents.iter().map(|t| self.get(*t)));
        self.mark(ConditionType::Ready, status, &reason, &message)
    }

    /// Build the conditions list, ordered by type
    pub fn build(self) -> Vec<Condition> {
        self.conditions.into_values().collect()
    }
}

/// Aggregate readiness over dependent conditions.
///
/// `True` only when every dependent is `True`. Any `False` dependent makes
/// the aggregate `False` and lends it its reason and message. Otherwise the
/// aggregate is `Unknown`; a dependent that has never been marked counts as
/// `Unknown`.
pub fn aggregate_ready<'a>(
    dependents: impl IntoIterator<Item = Option<&'a Condition>>,
) -> (ConditionStatus, String, String) {
    let mut unknown: Option<(String, String)> = None;
    for dependent in dependents {
        match dependent {
            Some(c) if c.status == ConditionStatus::False => {
                return (ConditionStatus::False, c.reason.clone(), c.message.clone());
            }
            Some(c) if c.status == ConditionStatus::True => {}
            Some(c) => {
                unknown.get_or_insert_with(|| (c.reason.clone(), c.message.clone()));
            }
            None => {
                unknown.get_or_insert_with(|| (REASON_AWAITING_BACKEND.to_string(), String::new()));
            }
        }
    }
    match unknown {
        Some((reason, message)) => (ConditionStatus::Unknown, reason, message),
        None => (ConditionStatus::True, String::new(), String::new()),
    }
}

/// Readiness as reported by a backend resource, reduced to a common shape.
#[derive(Clone, Debug, PartialEq)]
struct Readiness {
    status: ConditionStatus,
    reason: String,
    message: String,
}

/// Everything the aggregator needs from a backend status.
#[derive(Clone, Debug, Default, PartialEq)]
struct Observed {
    readiness: Option<Readiness>,
    /// Whether the backend counts as serving traffic.
    serving: bool,
    url: Option<String>,
    components: Option<BTreeMap<String, serde_json::Value>>,
}

fn parse_condition_status(status: &str) -> ConditionStatus {
    match status {
        "True" => ConditionStatus::True,
        "False" => ConditionStatus::False,
        _ => ConditionStatus::Unknown,
    }
}

fn observe_kserve(status: &KServeStatus) -> Observed {
    let readiness = status.readiness().map(|c| Readiness {
        status: parse_condition_status(&c.status),
        reason: c.reason.clone().unwrap_or_default(),
        message: c.message.clone().unwrap_or_default(),
    });
    let url = status.serving_url().map(str::to_string);
    let serving = readiness
        .as_ref()
        .is_some_and(|r| r.status == ConditionStatus::True)
        && url.is_some();
    Observed {
        readiness,
        serving,
        url,
        components: status.components.clone(),
    }
}

fn observe_seldon(status: &SeldonStatus) -> Observed {
    let readiness = status.state.as_deref().map(|state| match state {
        "Available" => Readiness {
            status: ConditionStatus::True,
            reason: String::new(),
            message: String::new(),
        },
        "Failed" => Readiness {
            status: ConditionStatus::False,
            reason: REASON_DEPLOYMENT_FAILED.to_string(),
            message: status.description.clone().unwrap_or_default(),
        },
        other => Readiness {
            status: ConditionStatus::Unknown,
            reason: other.to_string(),
            message: status.description.clone().unwrap_or_default(),
        },
    });
    // An Available deployment is serving even before it reports an address
    let serving = readiness
        .as_ref()
        .is_some_and(|r| r.status == ConditionStatus::True);
    Observed {
        readiness,
        serving,
        url: status.address.as_ref().and_then(|a| a.url.clone()),
        components: status.deployment_status.clone(),
    }
}

/// Map a backend status onto the parent status.
///
/// Both policies are applied: `state` follows the state-enum rules and the
/// condition set carries `BackendReady` plus the aggregate `Ready`.
/// `observedGeneration` is carried over from `previous`.
pub fn propagate(
    previous: &InferenceServiceStatus,
    backend: &str,
    child: &BackendStatus,
    now: &str,
) -> InferenceServiceStatus {
    let observed = match child {
        BackendStatus::KServe(s) => observe_kserve(s),
        BackendStatus::Seldon(s) => observe_seldon(s),
    };

    let state = match &observed.readiness {
        None => ServiceState::Creating,
        Some(_) if observed.serving => ServiceState::Available,
        Some(r) if r.status == ConditionStatus::False => ServiceState::Failed,
        Some(_) => ServiceState::Creating,
    };

    let mut conditions = ConditionSet::from_conditions(&previous.conditions, now);
    let mut url = None;
    match &observed.readiness {
        None => {
            conditions.mark_unknown(
                ConditionType::BackendReady,
                REASON_AWAITING_BACKEND,
                "Backend has not reported status yet",
            );
        }
        Some(r) => match r.status {
            ConditionStatus::True => {
                conditions.mark_true(ConditionType::BackendReady);
                url = observed.url.clone();
            }
            ConditionStatus::False => {
                conditions.mark_false(ConditionType::BackendReady, &r.reason, &r.message);
            }
            ConditionStatus::Unknown => {
                conditions.mark_unknown(ConditionType::BackendReady, &r.reason, &r.message);
            }
        },
    }
    conditions.aggregate(DEPENDENTS);

    InferenceServiceStatus {
        state,
        url,
        backend: Some(backend.to_string()),
        observed_generation: previous.observed_generation,
        conditions: conditions.build(),
        components: observed.components,
    }
}

/// Status of a service whose `spec.backend` names no supported backend.
pub fn unsupported_backend(
    previous: &InferenceServiceStatus,
    backend: &str,
    now: &str,
) -> InferenceServiceStatus {
    let mut conditions = ConditionSet::from_conditions(&previous.conditions, now);
    conditions
        .mark_false(
            ConditionType::BackendReady,
            REASON_UNSUPPORTED_BACKEND,
            &format!("backend {backend:?} is not supported"),
        )
        .aggregate(DEPENDENTS);

    InferenceServiceStatus {
        state: ServiceState::Failed,
        url: None,
        backend: None,
        observed_generation: previous.observed_generation,
        conditions: conditions.build(),
        components: None,
    }
}

/// Whether a status reports the service as Available.
pub fn is_available(status: Option<&InferenceServiceStatus>) -> bool {
    status.is_some_and(|s| s.state == ServiceState::Available)
}

/// Check if a condition type is true
pub fn is_condition_true(conditions: &[Condition], condition_type: ConditionType) -> bool {
    conditions
        .iter()
        .find(|c| c.r#type == condition_type.as_str())
        .is_some_and(Condition::is_true)
}

/// Get the reason for a condition
pub fn get_condition_reason(conditions: &[Condition], condition_type: ConditionType) -> Option<&str> {
    conditions
        .iter()
        .find(|c| c.r#type == condition_type.as_str())
        .map(|c| c.reason.as_str())
}
