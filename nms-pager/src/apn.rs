use serde::{Deserialize, Serialize};

use crate::{PaginatedTable, RecordStore, ResourceApi, SyncError, TableResource};

/// An access point name and its QoS configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Apn {
    /// Unique name, also the record key.
    pub apn_name: String,
    /// Bitrate and QoS settings.
    pub apn_configuration: ApnConfiguration,
}

impl Default for Apn {
    /// The values the editor starts from when adding a new APN.
    fn default() -> Self {
        Self {
            apn_name: String::new(),
            apn_configuration: ApnConfiguration {
                ambr: AggregatedMaximumBitrate {
                    max_bandwidth_dl: 1_000_000,
                    max_bandwidth_ul: 1_000_000,
                },
                qos_profile: QosProfile {
                    class_id: 9,
                    preemption_capability: false,
                    preemption_vulnerability: false,
                    priority_level: 15,
                },
            },
        }
    }
}

/// Configuration of an [`Apn`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ApnConfiguration {
    /// Aggregated maximum bitrate.
    pub ambr: AggregatedMaximumBitrate,
    /// QoS profile.
    pub qos_profile: QosProfile,
}

/// Aggregated maximum bitrate, in bits per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct AggregatedMaximumBitrate {
    pub max_bandwidth_dl: u64,
    pub max_bandwidth_ul: u64,
}

/// QoS profile of an [`Apn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QosProfile {
    /// QoS class identifier.
    pub class_id: u32,
    /// Whether bearers of this APN may preempt others.
    pub preemption_capability: bool,
    /// Whether bearers of this APN may be preempted.
    pub preemption_vulnerability: bool,
    /// ARP priority level, lower is higher priority.
    pub priority_level: u32,
}

/// A row of the APN table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct ApnRow {
    pub apn_id: String,
    pub qos_class_id: u32,
    pub priority_level: u32,
    pub max_bandwidth_dl: u64,
    pub max_bandwidth_ul: u64,
}

/// APNs keyed by name. APNs have no supplementary state.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApnResource;

impl TableResource for ApnResource {
    type Key = String;
    type Record = Apn;
    type State = ();
    type Row = ApnRow;

    const HAS_SUPPLEMENTARY_STATE: bool = false;

    fn to_row(&self, apn_name: &String, apn: &Apn, _state: Option<&()>) -> ApnRow {
        let config = &apn.apn_configuration;
        ApnRow {
            apn_id: apn_name.clone(),
            qos_class_id: config.qos_profile.class_id,
            priority_level: config.qos_profile.priority_level,
            max_bandwidth_dl: config.ambr.max_bandwidth_dl,
            max_bandwidth_ul: config.ambr.max_bandwidth_ul,
        }
    }
}

/// The shared store of APNs.
pub type ApnStore = RecordStore<String, Apn, ()>;

/// A [`PaginatedTable`] of APNs.
pub type ApnTable<A> = PaginatedTable<ApnResource, A>;

/// The APN the editor opens with: the stored one when editing `apn_name`, defaults when adding.
pub fn apn_for_editor(store: &ApnStore, apn_name: Option<&str>) -> Apn {
    apn_name
        .and_then(|apn_name| store.record(&apn_name.to_string()))
        .unwrap_or_default()
}

/// Save the editor's APN: an update of `editing` when set, a create otherwise.
///
/// An APN without a name is rejected before anything is sent.
pub async fn save_apn<A>(table: &ApnTable<A>, editing: Option<&str>, apn: Apn) -> Result<(), SyncError>
where
    A: ResourceApi<ApnResource>,
{
    if apn.apn_name.is_empty() {
        return Err(SyncError::InvalidRecord("Invalid Name".to_string()));
    }
    match editing {
        Some(apn_name) => table.update_record(apn_name.to_string(), apn).await,
        None => table.create_record(apn.apn_name.clone(), apn).await,
    }
}
