use openchoreo_connection_controller_k8s_api::{Condition, Time};

/// The condition type summarizing whether every connection has resolved.
pub const ALL_RESOLVED: &str = "AllResolved";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reason {
    AllResolved,
    ConnectionsPending,
    NoConnections,
}

// === impl Reason ===

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllResolved => "AllResolved",
            Self::ConnectionsPending => "ConnectionsPending",
            Self::NoConnections => "NoConnections",
        }
    }
}

/// Builds the `AllResolved` condition for a binding that declares `declared`
/// connections, `pending` of which could not be resolved.
pub fn all_resolved(
    declared: usize,
    pending: usize,
    observed_generation: Option<i64>,
    now: Time,
) -> Condition {
    let (status, reason, message) = if declared == 0 {
        (
            true,
            Reason::NoConnections,
            "No connections to resolve".to_string(),
        )
    } else if pending == 0 {
        (
            true,
            Reason::AllResolved,
            "All connections resolved".to_string(),
        )
    } else {
        (
            false,
            Reason::ConnectionsPending,
            format!("{pending} of {declared} connections pending"),
        )
    };

    Condition {
        type_: ALL_RESOLVED.to_string(),
        status: if status { "True" } else { "False" }.to_string(),
        reason: reason.as_str().to_string(),
        message,
        observed_generation,
        last_transition_time: now,
    }
}

/// Merges `condition` into `conditions` by type.
///
/// An existing condition keeps its transition time unless its status changes.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    let Some(existing) = conditions.iter_mut().find(|c| c.type_ == condition.type_) else {
        conditions.push(condition);
        return;
    };

    if existing.status != condition.status {
        existing.status = condition.status;
        existing.last_transition_time = condition.last_transition_time;
    }
    existing.reason = condition.reason;
    existing.message = condition.message;
    existing.observed_generation = condition.observed_generation;
}

/// Returns the condition of the given type, if present.
pub fn find<'c>(conditions: &'c [Condition], type_: &str) -> Option<&'c Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn at(offset_secs: i64) -> Time {
        Time(DateTime::<Utc>::MIN_UTC + Duration::seconds(offset_secs))
    }

    #[test]
    fn no_connections() {
        let c = all_resolved(0, 0, Some(1), at(0));
        assert_eq!(c.type_, ALL_RESOLVED);
        assert_eq!(c.status, "True");
        assert_eq!(c.reason, "NoConnections");
        assert_eq!(c.observed_generation, Some(1));
    }

    #[test]
    fn connections_pending_message() {
        let c = all_resolved(2, 1, None, at(0));
        assert_eq!(c.status, "False");
        assert_eq!(c.reason, "ConnectionsPending");
        assert_eq!(c.message, "1 of 2 connections pending");
    }

    #[test]
    fn transition_time_kept_while_status_unchanged() {
        let mut conditions = vec![all_resolved(2, 2, Some(1), at(0))];

        set_condition(&mut conditions, all_resolved(2, 1, Some(2), at(10)));
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, at(0));
        assert_eq!(conditions[0].message, "1 of 2 connections pending");
        assert_eq!(conditions[0].observed_generation, Some(2));

        set_condition(&mut conditions, all_resolved(2, 0, Some(2), at(20)));
        assert_eq!(conditions[0].status, "True");
        assert_eq!(conditions[0].reason, "AllResolved");
        assert_eq!(conditions[0].last_transition_time, at(20));
    }

    #[test]
    fn unrelated_conditions_are_preserved() {
        let other = Condition {
            type_: "Ready".to_string(),
            status: "True".to_string(),
            reason: "Ready".to_string(),
            message: String::new(),
            observed_generation: None,
            last_transition_time: at(0),
        };
        let mut conditions = vec![other.clone()];
        set_condition(&mut conditions, all_resolved(0, 0, None, at(5)));
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0], other);
        assert_eq!(
            find(&conditions, ALL_RESOLVED).map(|c| c.reason.as_str()),
            Some("NoConnections")
        );
    }
}
