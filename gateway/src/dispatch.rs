//! # dispatch
//!
//! Fans decoded poll replies out to HTTP subscribers.
//!
//! The engine hands over the poll-info list and the source monitor's
//! MAC; this module extracts the valid numeric observations, renders
//! them symbolically, and POSTs one JSON payload to every subscription
//! bound to that MAC. Posts are fire-and-forget with a bounded timeout —
//! a slow or dead subscriber never stalls the protocol loop.

use std::time::Duration;

use chrono::Utc;
use intellivue_proto::attrs::AttrValue;
use intellivue_proto::nomenclature::{self, Partition};
use intellivue_proto::pdu::PollInfoList;
use intellivue_proto::MacAddr;
use tracing::{debug, warn};

use crate::state::{Observation, ObservationPayload, SharedSubscriptions, Subscription};

/// Per-request webhook timeout.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Walk a poll reply and pull out every valid numeric observation.
///
/// Invalid measurements (any of the top four state bits set) are
/// skipped; physio and unit ids are partition-qualified symbolic names
/// with a decimal fallback.
pub fn extract_observations(list: &PollInfoList) -> Vec<Observation> {
    let mut observations = Vec::new();
    for context in &list.contexts {
        for poll in &context.polls {
            for attr in &poll.attributes.attributes {
                let AttrValue::NumericObservation(nu) = &attr.value else { continue };
                if !nu.measurement_is_valid() {
                    continue;
                }
                observations.push(Observation {
                    physio_id: nomenclature::display(Partition::Scada, nu.physio_id),
                    state: nomenclature::measurement_state_names(nu.state)
                        .into_iter()
                        .map(str::to_owned)
                        .collect(),
                    unit_code: nomenclature::display(Partition::Dimension, nu.unit_code),
                    value: nu.float().as_f64(),
                });
            }
        }
    }
    observations
}

/// Subscriptions bound to this monitor, snapshotted under one read guard
/// so a poll reply sees a consistent view.
pub async fn matching_subscriptions(
    subscriptions: &SharedSubscriptions,
    mac: MacAddr,
) -> Vec<Subscription> {
    subscriptions
        .read()
        .await
        .values()
        .filter(|s| s.monitor_id == mac)
        .cloned()
        .collect()
}

/// Publish one poll reply. No valid observations means no HTTP activity
/// at all.
pub async fn publish(
    client: &reqwest::Client,
    subscriptions: &SharedSubscriptions,
    mac: MacAddr,
    list: &PollInfoList,
) {
    let observations = extract_observations(list);
    if observations.is_empty() {
        debug!(monitor = %mac, "no valid measurements to send");
        return;
    }

    let payload = ObservationPayload { monitor_id: mac, datetime: Utc::now(), observations };

    for sub in matching_subscriptions(subscriptions, mac).await {
        let client = client.clone();
        let payload = payload.clone();
        tokio::spawn(async move {
            match client.post(&sub.url).json(&payload).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(subscription = %sub.subscription_id, url = %sub.url, "webhook delivered");
                }
                Ok(resp) => {
                    warn!(
                        subscription = %sub.subscription_id,
                        url = %sub.url,
                        status = %resp.status(),
                        "webhook rejected"
                    );
                }
                Err(e) => {
                    warn!(subscription = %sub.subscription_id, url = %sub.url, "webhook failed: {e}");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intellivue_proto::attrs::{Attribute, AttributeList, NuObsValue};
    use intellivue_proto::float::to_bits;
    use intellivue_proto::nomenclature::{
        INVALID, NOM_ATTR_NU_VAL_OBS, NOM_DIM_PERCENT, NOM_PULS_OXIM_SAT_O2, NOM_RESP_RATE,
    };
    use intellivue_proto::pdu::{ObservationPoll, SingleContextPoll};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use uuid::Uuid;

    fn nu_attr(physio_id: u16, state: u16, unit_code: u16, value: u32) -> Attribute {
        Attribute {
            attribute_id: NOM_ATTR_NU_VAL_OBS,
            value: AttrValue::NumericObservation(NuObsValue { physio_id, state, unit_code, value }),
        }
    }

    fn reply_with(attrs: Vec<Attribute>) -> PollInfoList {
        PollInfoList {
            contexts: vec![SingleContextPoll {
                context_id: 1,
                polls: vec![ObservationPoll { obj_handle: 2, attributes: AttributeList::new(attrs) }],
            }],
        }
    }

    #[test]
    fn extracts_only_valid_observations() {
        let list = reply_with(vec![
            nu_attr(NOM_PULS_OXIM_SAT_O2, 0, NOM_DIM_PERCENT, to_bits(98, 0)),
            nu_attr(NOM_RESP_RATE, INVALID, NOM_DIM_PERCENT, to_bits(12, 0)),
        ]);
        let obs = extract_observations(&list);
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].physio_id, "NOM_PULS_OXIM_SAT_O2");
        assert_eq!(obs[0].unit_code, "NOM_DIM_PERCENT");
        assert_eq!(obs[0].value, 98.0);
        assert!(obs[0].state.is_empty());
    }

    #[test]
    fn renders_state_flags_and_unknown_codes() {
        let state = intellivue_proto::nomenclature::VALIDATED_DATA
            | intellivue_proto::nomenclature::MSMT_ONGOING;
        let list = reply_with(vec![nu_attr(12345, state, 999, to_bits(7, 0))]);
        let obs = extract_observations(&list);
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].physio_id, "12345");
        assert_eq!(obs[0].unit_code, "999");
        assert_eq!(obs[0].state, vec!["VALIDATED_DATA", "MSMT_ONGOING"]);
    }

    #[test]
    fn non_numeric_attributes_are_ignored() {
        let list = reply_with(vec![Attribute::new(0x0921, vec![0x00, 0x05])]);
        assert!(extract_observations(&list).is_empty());
    }

    #[tokio::test]
    async fn subscription_matching_is_per_monitor() {
        let mac_a: MacAddr = "06:08:06:08:00:01".parse().unwrap();
        let mac_b: MacAddr = "00:09:fb:09:77:bd".parse().unwrap();

        let mut map = HashMap::new();
        for (mac, url) in [(mac_a, "http://a/hook"), (mac_a, "http://a2/hook"), (mac_b, "http://b/hook")] {
            let sub = Subscription {
                monitor_id: mac,
                url: url.into(),
                subscription_id: Uuid::new_v4(),
            };
            map.insert(sub.subscription_id, sub);
        }
        let shared: SharedSubscriptions = Arc::new(RwLock::new(map));

        let mut urls: Vec<String> = matching_subscriptions(&shared, mac_a)
            .await
            .into_iter()
            .map(|s| s.url)
            .collect();
        urls.sort();
        assert_eq!(urls, vec!["http://a/hook", "http://a2/hook"]);
    }
}
