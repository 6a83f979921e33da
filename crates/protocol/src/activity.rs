//! Rich presence activity record.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_BUTTONS, MAX_FIELD_LEN};

/// Errors from activity validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActivityError {
    #[error("activity details too long: {len} characters (max {max})", max = MAX_FIELD_LEN)]
    DetailsTooLong { len: usize },

    #[error("activity state too long: {len} characters (max {max})", max = MAX_FIELD_LEN)]
    StateTooLong { len: usize },

    #[error("too many buttons: {count} (max {max})", max = MAX_BUTTONS)]
    TooManyButtons { count: usize },
}

/// A clickable button shown under the presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub url: String,
}

impl Button {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// Status payload describing what the user is currently doing.
///
/// Timestamps are unix seconds. Unset fields are omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_image_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_image_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_image_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub small_image_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Button>,
}

impl Activity {
    /// Shorthand for an activity that only sets `details`.
    pub fn with_details(details: impl Into<String>) -> Self {
        Self {
            details: Some(details.into()),
            ..Self::default()
        }
    }

    /// Checks the field-length limits enforced by the peer.
    pub fn validate(&self) -> Result<(), ActivityError> {
        if let Some(len) = char_len(self.details.as_deref())
            && len > MAX_FIELD_LEN
        {
            return Err(ActivityError::DetailsTooLong { len });
        }
        if let Some(len) = char_len(self.state.as_deref())
            && len > MAX_FIELD_LEN
        {
            return Err(ActivityError::StateTooLong { len });
        }
        if self.buttons.len() > MAX_BUTTONS {
            return Err(ActivityError::TooManyButtons {
                count: self.buttons.len(),
            });
        }
        Ok(())
    }

    /// Image keys referenced by this activity.
    pub fn image_keys(&self) -> impl Iterator<Item = &str> {
        self.large_image_key
            .as_deref()
            .into_iter()
            .chain(self.small_image_key.as_deref())
    }
}

fn char_len(s: Option<&str>) -> Option<usize> {
    s.map(|s| s.chars().count())
}

/// Current time as fractional unix seconds.
pub fn unix_now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Computes `(start, end)` for a progress bar that is `percent` complete
/// out of `duration_secs`, as seen at time `now`.
pub fn progress_window(now: f64, percent: f64, duration_secs: f64) -> (f64, f64) {
    let start = now - (percent / 100.0) * duration_secs;
    (start, start + duration_secs)
}
