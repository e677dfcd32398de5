use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{ListPage, PaginatedTable, RecordStore, TableResource};

/// A configured subscriber, as returned by the subscriber listing endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Subscriber {
    /// The IMSI.
    pub id: String,
    /// Optional human readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// LTE subscription settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<LteSubscription>,
    /// APNs the subscriber may use.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active_apns: Vec<String>,
    /// Reachability monitoring, reported by the gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<SubscriberMonitoring>,
}

/// LTE subscription settings of a [`Subscriber`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LteSubscription {
    /// `ACTIVE` or `INACTIVE`.
    pub state: String,
    /// Name of the subscriber profile.
    #[serde(default)]
    pub sub_profile: String,
}

/// Monitoring data of a [`Subscriber`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubscriberMonitoring {
    /// Last ICMP ping result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icmp: Option<IcmpStatus>,
}

/// Last ICMP ping result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IcmpStatus {
    /// Unix seconds, `0` when never reported.
    pub last_reported_time: i64,
    /// Round trip of the last ping.
    #[serde(default)]
    pub latency_ms: f64,
}

/// Live session state of a subscriber, fetched per IMSI.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubscriberState {
    /// Sessions grouped by APN name.
    #[serde(default)]
    pub subscriber_state: BTreeMap<String, Vec<SessionInfo>>,
}

/// One session of a subscriber on an APN.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct SessionInfo {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,
    pub lifecycle_state: String,
    #[serde(default)]
    pub active_duration_sec: u64,
    #[serde(default)]
    pub active_policy_rules: Vec<PolicyRuleRef>,
}

/// A policy rule attached to a session, only the id is used here.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct PolicyRuleRef {
    pub id: String,
}

/// Usage metrics of a subscriber, computed elsewhere and handed to [`SubscriberResource::set_metrics`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct SubscriberMetrics {
    pub current_usage: String,
    pub daily_avg: String,
}

/// The subscriber listing endpoint's response body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct SubscriberPage {
    #[serde(default)]
    pub subscribers: BTreeMap<String, Subscriber>,
    #[serde(default)]
    pub next_page_token: String,
    /// Reported by newer backends, not trusted by the table.
    #[serde(default)]
    pub total_count: u64,
}

impl From<SubscriberPage> for ListPage<String, Subscriber> {
    fn from(page: SubscriberPage) -> Self {
        ListPage {
            records: page.subscribers.into_iter().collect(),
            next_page_token: page.next_page_token,
        }
    }
}

/// A row of the subscriber table.
#[derive(Debug, Clone, PartialEq, Default)]
#[allow(missing_docs)]
pub struct SubscriberRow {
    /// The configured name, the IMSI when unnamed.
    pub name: String,
    pub imsi: String,
    /// LTE subscription state, empty when not configured.
    pub service: String,
    pub current_usage: String,
    pub daily_avg: String,
    pub last_reported_time: Option<chrono::DateTime<chrono::Utc>>,
    /// APNs with at least one session.
    pub active_apns: Vec<String>,
    pub ip_addresses: Vec<String>,
    pub active_sessions: usize,
}

impl SubscriberRow {
    /// The last reported time as shown in the table, `-` if never reported.
    pub fn last_reported_display(&self) -> String {
        self.last_reported_time
            .map(|time| time.to_rfc3339())
            .unwrap_or_else(|| "-".to_string())
    }
}

/// A row of a subscriber's session detail panel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct SessionRow {
    pub apn_name: String,
    pub session_id: String,
    /// `-` when the session has no IPv4 address.
    pub ip_addr: String,
    pub state: String,
    pub active_duration: String,
    pub active_policies: Vec<String>,
}

/// Flatten a subscriber's session state into detail panel rows, grouped by APN.
pub fn session_rows(state: &SubscriberState) -> Vec<SessionRow> {
    state
        .subscriber_state
        .iter()
        .flat_map(|(apn_name, sessions)| {
            sessions.iter().map(move |session| SessionRow {
                apn_name: apn_name.clone(),
                session_id: session.session_id.clone(),
                ip_addr: session.ipv4.clone().unwrap_or_else(|| "-".to_string()),
                state: session.lifecycle_state.clone(),
                active_duration: format!("{} sec", session.active_duration_sec),
                active_policies: session
                    .active_policy_rules
                    .iter()
                    .map(|rule| rule.id.clone())
                    .collect(),
            })
        })
        .collect()
}

/// Subscribers keyed by IMSI, with live session state as supplementary state.
#[derive(Debug, Clone, Default)]
pub struct SubscriberResource {
    metrics: Arc<RwLock<HashMap<String, SubscriberMetrics>>>,
}

impl SubscriberResource {
    /// A resource with no metrics known yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all known metrics. Only affects rows projected afterwards.
    pub fn set_metrics(&self, metrics: HashMap<String, SubscriberMetrics>) {
        *self.metrics.write() = metrics;
    }

    /// Metrics of one subscriber, if known.
    pub fn metrics(&self, imsi: &str) -> Option<SubscriberMetrics> {
        self.metrics.read().get(imsi).cloned()
    }
}

impl TableResource for SubscriberResource {
    type Key = String;
    type Record = Subscriber;
    type State = SubscriberState;
    type Row = SubscriberRow;

    fn to_row(&self, imsi: &String, subscriber: &Subscriber, state: Option<&SubscriberState>) -> SubscriberRow {
        let metrics = self.metrics(imsi).unwrap_or_default();
        let sessions = state.map(|state| &state.subscriber_state);
        let last_reported_time = subscriber
            .monitoring
            .as_ref()
            .and_then(|monitoring| monitoring.icmp.as_ref())
            .map(|icmp| icmp.last_reported_time)
            .filter(|time| *time != 0)
            .and_then(|time| chrono::DateTime::from_timestamp(time, 0));

        SubscriberRow {
            name: subscriber.name.clone().unwrap_or_else(|| imsi.clone()),
            imsi: imsi.clone(),
            service: subscriber
                .lte
                .as_ref()
                .map(|lte| lte.state.clone())
                .unwrap_or_default(),
            current_usage: non_empty_or_zero(metrics.current_usage),
            daily_avg: non_empty_or_zero(metrics.daily_avg),
            last_reported_time,
            active_apns: sessions
                .map(|sessions| {
                    sessions
                        .iter()
                        .filter(|(_, sessions)| !sessions.is_empty())
                        .map(|(apn, _)| apn.clone())
                        .collect()
                })
                .unwrap_or_default(),
            ip_addresses: sessions
                .map(|sessions| {
                    sessions
                        .values()
                        .flatten()
                        .filter_map(|session| session.ipv4.clone())
                        .collect()
                })
                .unwrap_or_default(),
            active_sessions: sessions
                .map(|sessions| sessions.values().map(Vec::len).sum())
                .unwrap_or(0),
        }
    }
}

fn non_empty_or_zero(value: String) -> String {
    if value.is_empty() {
        "0".to_string()
    } else {
        value
    }
}

/// The shared store of subscribers and their session state.
pub type SubscriberStore = RecordStore<String, Subscriber, SubscriberState>;

/// A [`PaginatedTable`] of subscribers.
pub type SubscriberTable<A> = PaginatedTable<SubscriberResource, A>;

/// The JSON shown by the "View JSON" dialog: the configured subscriber with its session state under `state`.
///
/// Subscribers only known through their session state show just the `state` key.
pub fn subscriber_json(store: &SubscriberStore, imsi: &str) -> Result<serde_json::Value, serde_json::Error> {
    let entry = store.get(&imsi.to_string());
    let mut value = match entry.as_ref().and_then(|entry| entry.record.as_ref()) {
        Some(subscriber) => serde_json::to_value(subscriber)?,
        None => serde_json::Value::Object(Default::default()),
    };
    let state = match entry.and_then(|entry| entry.state) {
        Some(state) => serde_json::to_value(state)?,
        None => serde_json::Value::Object(Default::default()),
    };
    if let Some(object) = value.as_object_mut() {
        object.insert("state".to_string(), state);
    }
    Ok(value)
}
