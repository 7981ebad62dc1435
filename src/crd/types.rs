//! Status types for the HelidonApp CRD

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Layout of `lastActionTime`: UTC, second precision
pub const ACTION_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Lifecycle state recorded on a HelidonApp after each mutation
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[non_exhaustive]
pub enum AppState {
    /// Record accepted, nothing deployed yet
    Created,
    /// Deployment or service was created
    Deployed,
    /// Drift was corrected on an existing deployment or service
    Updated,
    /// The last create/update failed
    Failed,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Deployed => write!(f, "Deployed"),
            Self::Updated => write!(f, "Updated"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Observed status of a HelidonApp, written only by the operator
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HelidonAppStatus {
    /// State after the last action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<AppState>,

    /// Message describing the last action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action_message: Option<String>,

    /// When the last action happened (`YYYY-MM-DDTHH:MM:SSZ`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action_time: Option<String>,
}

impl HelidonAppStatus {
    /// Build a status for an action taken at `at`
    pub fn stamped(state: Option<AppState>, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            state,
            last_action_message: Some(message.into()),
            last_action_time: Some(format_action_time(at)),
        }
    }
}

/// Format a timestamp for `lastActionTime`
pub fn format_action_time(at: DateTime<Utc>) -> String {
    at.format(ACTION_TIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_action_time_has_second_precision() {
        let at = Utc
            .with_ymd_and_hms(2020, 3, 7, 4, 5, 9)
            .single()
            .expect("valid timestamp")
            + chrono::Duration::milliseconds(750);
        assert_eq!(format_action_time(at), "2020-03-07T04:05:09Z");
    }

    #[test]
    fn test_state_serializes_as_plain_string() {
        let json = serde_json::to_value(AppState::Deployed).unwrap();
        assert_eq!(json, serde_json::json!("Deployed"));
        assert_eq!(AppState::Failed.to_string(), "Failed");
    }

    /// Story: an empty status serializes to an empty object so a fresh
    /// record is not given a spurious state
    #[test]
    fn story_default_status_is_empty_object() {
        let json = serde_json::to_value(HelidonAppStatus::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }

    #[test]
    fn test_stamped_status_uses_camel_case_fields() {
        let at = Utc.with_ymd_and_hms(2021, 12, 31, 23, 59, 59).unwrap();
        let status = HelidonAppStatus::stamped(Some(AppState::Updated), "updated", at);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "state": "Updated",
                "lastActionMessage": "updated",
                "lastActionTime": "2021-12-31T23:59:59Z"
            })
        );
    }
}
