use chrono::NaiveTime;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Canonical encoding of a time-of-day on the wire.
pub const TIME_OF_DAY_FORMAT: &str = "%H:%M:%S";

/// Limit value meaning "no limit".
pub const UNLIMITED: i64 = -1;

const SECONDS_PER_DAY: i64 = 86_400;

/// Health of the most recent engine operation for an account.
///
/// Persisted as its integer code so the registry stays readable by older clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum NetworkState {
    NetworkError = -2,
    Unauthorized = -1,
    #[default]
    Unknown = 0,
    Active = 1,
}

impl TryFrom<i8> for NetworkState {
    type Error = String;

    fn try_from(code: i8) -> Result<Self, Self::Error> {
        match code {
            -2 => Ok(NetworkState::NetworkError),
            -1 => Ok(NetworkState::Unauthorized),
            0 => Ok(NetworkState::Unknown),
            1 => Ok(NetworkState::Active),
            other => Err(format!("unknown network state code {}", other)),
        }
    }
}

impl From<NetworkState> for i8 {
    fn from(state: NetworkState) -> Self {
        state as i8
    }
}

impl fmt::Display for NetworkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NetworkState::NetworkError => "network error",
            NetworkState::Unauthorized => "signed out",
            NetworkState::Unknown => "unknown",
            NetworkState::Active => "active",
        };
        f.write_str(label)
    }
}

/// A locally registered, remotely managed computer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub name: String,
    pub auth_key: String,
    #[serde(default)]
    pub state: NetworkState,
    /// Epoch milliseconds of the last successful fetch or push, 0 when never synced
    #[serde(default)]
    pub last_sync: i64,
}

impl Account {
    pub fn new(name: impl Into<String>, auth_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            auth_key: auth_key.into(),
            state: NetworkState::Unknown,
            last_sync: 0,
        }
    }

    pub fn has_synced(&self) -> bool {
        self.last_sync > 0
    }
}

/// Last known state of a managed computer, as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteState {
    /// Seconds allowed per day, [`UNLIMITED`] for no limit
    pub daily_time_limit: i64,
    /// Seconds allowed today, [`UNLIMITED`] for no limit
    pub today_time_limit: i64,
    #[serde(default)]
    pub used_time: i64,
    pub usage_date: String,
    pub bedtime: String,
    pub waketime: String,
    pub grace_given: bool,
    #[serde(default)]
    pub sync_author: Option<String>,
}

impl RemoteState {
    /// Equal bedtime and waketime is a zero-length downtime window.
    pub fn has_downtime(&self) -> bool {
        self.bedtime != self.waketime
    }

    /// Fraction of today's budget already used, clamped to `0.0..=1.0`.
    pub fn usage_ratio(&self) -> f64 {
        let total = if self.today_time_limit == UNLIMITED {
            SECONDS_PER_DAY
        } else {
            self.today_time_limit
        };
        if total <= 0 {
            return 1.0;
        }
        (self.used_time as f64 / total as f64).clamp(0.0, 1.0)
    }

    /// Overwrite every field the patch carries; fields it leaves out are retained.
    pub fn apply(&mut self, patch: &RemoteStatePatch) {
        if let Some(v) = patch.daily_time_limit {
            self.daily_time_limit = v;
        }
        if let Some(v) = patch.today_time_limit {
            self.today_time_limit = v;
        }
        if let Some(v) = patch.used_time {
            self.used_time = v;
        }
        if let Some(v) = &patch.usage_date {
            self.usage_date = v.clone();
        }
        if let Some(v) = &patch.bedtime {
            self.bedtime = v.clone();
        }
        if let Some(v) = &patch.waketime {
            self.waketime = v.clone();
        }
        if let Some(v) = patch.grace_given {
            self.grace_given = v;
        }
        if let Some(v) = &patch.sync_author {
            self.sync_author = v.clone();
        }
    }

    /// Field-level merge of a push: `delta` wins, then `submitted`, then `self`.
    pub fn merged(&self, submitted: &RemoteStatePatch, delta: Option<&RemoteStatePatch>) -> Self {
        let mut next = self.clone();
        next.apply(submitted);
        if let Some(delta) = delta {
            next.apply(delta);
        }
        next
    }
}

/// Partial [`RemoteState`] used as a push body and as the server's override delta.
///
/// `sync_author` keeps "absent" (`None`) apart from an explicit `null` (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_time_limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub today_time_limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bedtime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waketime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_given: Option<bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_present"
    )]
    pub sync_author: Option<Option<String>>,
}

fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl RemoteStatePatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Set the daily limit in seconds, `None` for unlimited.
    pub fn with_daily_limit(mut self, seconds: Option<i64>) -> Self {
        self.daily_time_limit = Some(seconds.unwrap_or(UNLIMITED));
        self
    }

    /// Set today's limit in seconds, `None` for unlimited.
    pub fn with_today_limit(mut self, seconds: Option<i64>) -> Self {
        self.today_time_limit = Some(seconds.unwrap_or(UNLIMITED));
        self
    }

    /// Set the downtime window as `(bedtime, waketime)`, `None` to lift it.
    pub fn with_downtime(mut self, window: Option<(NaiveTime, NaiveTime)>) -> Self {
        let (bed, wake) = match window {
            Some((bed, wake)) => (bed, wake),
            None => (NaiveTime::MIN, NaiveTime::MIN),
        };
        self.bedtime = Some(bed.format(TIME_OF_DAY_FORMAT).to_string());
        self.waketime = Some(wake.format(TIME_OF_DAY_FORMAT).to_string());
        self
    }

    pub fn with_grace_given(mut self, given: bool) -> Self {
        self.grace_given = Some(given);
        self
    }

    /// Layer `other` on top of this patch; fields present in `other` win.
    pub fn overlay(&self, other: &RemoteStatePatch) -> Self {
        RemoteStatePatch {
            daily_time_limit: other.daily_time_limit.or(self.daily_time_limit),
            today_time_limit: other.today_time_limit.or(self.today_time_limit),
            used_time: other.used_time.or(self.used_time),
            usage_date: other.usage_date.clone().or_else(|| self.usage_date.clone()),
            bedtime: other.bedtime.clone().or_else(|| self.bedtime.clone()),
            waketime: other.waketime.clone().or_else(|| self.waketime.clone()),
            grace_given: other.grace_given.or(self.grace_given),
            sync_author: other.sync_author.clone().or_else(|| self.sync_author.clone()),
        }
    }

    /// Build a full state when every required field is present.
    pub fn into_complete(self) -> Option<RemoteState> {
        Some(RemoteState {
            daily_time_limit: self.daily_time_limit?,
            today_time_limit: self.today_time_limit?,
            used_time: self.used_time.unwrap_or(0),
            usage_date: self.usage_date?,
            bedtime: self.bedtime?,
            waketime: self.waketime?,
            grace_given: self.grace_given?,
            sync_author: self.sync_author.flatten(),
        })
    }

    /// Whether pushing this patch would change `state`.
    pub fn differs_from(&self, state: &RemoteState) -> bool {
        let mut applied = state.clone();
        applied.apply(self);
        applied != *state
    }
}

/// Parse `HH:MM` or `HH:MM:SS`.
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, TIME_OF_DAY_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeResponse {
    pub success: bool,
    #[serde(default)]
    pub auth_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub accepted: bool,
    #[serde(default)]
    pub delta: Option<RemoteStatePatch>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_state() -> RemoteState {
        RemoteState {
            daily_time_limit: 7200,
            today_time_limit: 3600,
            used_time: 1200,
            usage_date: "2024-01-01".to_string(),
            bedtime: "22:00:00".to_string(),
            waketime: "07:00:00".to_string(),
            grace_given: false,
            sync_author: None,
        }
    }

    #[test]
    fn test_network_state_uses_integer_codes() {
        assert_eq!(serde_json::to_string(&NetworkState::NetworkError).unwrap(), "-2");
        assert_eq!(serde_json::to_string(&NetworkState::Active).unwrap(), "1");
        let parsed: NetworkState = serde_json::from_str("-1").unwrap();
        assert_eq!(parsed, NetworkState::Unauthorized);
        assert!(serde_json::from_str::<NetworkState>("7").is_err());
    }

    #[test]
    fn test_account_accepts_legacy_record() {
        // Records written before health tracking only carried name and token
        let account: Account =
            serde_json::from_value(json!({"name": "Den PC", "authKey": "k"})).unwrap();
        assert_eq!(account.state, NetworkState::Unknown);
        assert_eq!(account.last_sync, 0);
        assert!(!account.has_synced());
    }

    #[test]
    fn test_remote_state_wire_names() {
        let value = serde_json::to_value(sample_state()).unwrap();
        assert_eq!(value["dailyTimeLimit"], 7200);
        assert_eq!(value["usageDate"], "2024-01-01");
        assert_eq!(value["graceGiven"], false);
        assert!(value["syncAuthor"].is_null());

        // usedTime is optional and extra server fields are ignored
        let parsed: RemoteState = serde_json::from_value(json!({
            "hashedPassword": "x",
            "dailyTimeLimit": -1,
            "todayTimeLimit": -1,
            "usageDate": "2024-01-02",
            "bedtime": "00:00:00",
            "waketime": "00:00:00",
            "graceGiven": true
        }))
        .unwrap();
        assert_eq!(parsed.used_time, 0);
        assert!(!parsed.has_downtime());
    }

    #[test]
    fn test_patch_distinguishes_null_author() {
        let absent: RemoteStatePatch = serde_json::from_value(json!({})).unwrap();
        assert_eq!(absent.sync_author, None);
        assert!(absent.is_empty());

        let null: RemoteStatePatch =
            serde_json::from_value(json!({"syncAuthor": null})).unwrap();
        assert_eq!(null.sync_author, Some(None));

        let set: RemoteStatePatch =
            serde_json::from_value(json!({"syncAuthor": "desktop"})).unwrap();
        assert_eq!(set.sync_author, Some(Some("desktop".to_string())));

        // Absent fields are not serialized at all
        let body = serde_json::to_value(RemoteStatePatch {
            daily_time_limit: Some(5400),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(body, json!({"dailyTimeLimit": 5400}));
    }

    #[test]
    fn test_merge_order() {
        let old = sample_state();
        let submitted = RemoteStatePatch {
            daily_time_limit: Some(5400),
            today_time_limit: Some(3000),
            ..Default::default()
        };
        let delta = RemoteStatePatch {
            today_time_limit: Some(1800),
            sync_author: Some(Some("server".to_string())),
            ..Default::default()
        };

        let merged = old.merged(&submitted, Some(&delta));
        assert_eq!(merged.daily_time_limit, 5400);
        assert_eq!(merged.today_time_limit, 1800);
        assert_eq!(merged.sync_author.as_deref(), Some("server"));
        assert_eq!(merged.used_time, old.used_time);
        assert_eq!(merged.bedtime, old.bedtime);

        assert_eq!(old.merged(&RemoteStatePatch::default(), None), old);
    }

    #[test]
    fn test_usage_ratio() {
        let mut state = sample_state();
        assert!((state.usage_ratio() - 1200.0 / 3600.0).abs() < f64::EPSILON);

        state.today_time_limit = UNLIMITED;
        state.used_time = 43_200;
        assert!((state.usage_ratio() - 0.5).abs() < f64::EPSILON);

        state.today_time_limit = 0;
        assert_eq!(state.usage_ratio(), 1.0);
    }

    #[test]
    fn test_patch_builders() {
        let bed = parse_time_of_day("22:30").unwrap();
        let wake = parse_time_of_day("06:45:00").unwrap();
        let patch = RemoteStatePatch::default()
            .with_daily_limit(None)
            .with_today_limit(Some(5400))
            .with_downtime(Some((bed, wake)));

        assert_eq!(patch.daily_time_limit, Some(UNLIMITED));
        assert_eq!(patch.today_time_limit, Some(5400));
        assert_eq!(patch.bedtime.as_deref(), Some("22:30:00"));
        assert_eq!(patch.waketime.as_deref(), Some("06:45:00"));

        let lifted = RemoteStatePatch::default().with_downtime(None);
        assert_eq!(lifted.bedtime, lifted.waketime);
        assert_eq!(lifted.bedtime.as_deref(), Some("00:00:00"));

        assert!(parse_time_of_day("25:00").is_none());
    }

    #[test]
    fn test_differs_from() {
        let state = sample_state();
        let same = RemoteStatePatch {
            daily_time_limit: Some(7200),
            bedtime: Some("22:00:00".to_string()),
            ..Default::default()
        };
        assert!(!same.differs_from(&state));
        assert!(same.clone().with_grace_given(true).differs_from(&state));
    }

    #[test]
    fn test_overlay_and_complete() {
        let submitted = RemoteStatePatch {
            daily_time_limit: Some(60),
            today_time_limit: Some(60),
            ..Default::default()
        };
        assert!(submitted.clone().into_complete().is_none());

        let delta = RemoteStatePatch {
            today_time_limit: Some(30),
            usage_date: Some("2024-03-03".to_string()),
            bedtime: Some("21:00:00".to_string()),
            waketime: Some("07:00:00".to_string()),
            grace_given: Some(false),
            ..Default::default()
        };
        let state = submitted.overlay(&delta).into_complete().unwrap();
        assert_eq!(state.daily_time_limit, 60);
        assert_eq!(state.today_time_limit, 30);
        assert_eq!(state.used_time, 0);
    }
}
