use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::Subscription;

const SUBSCRIPTIONS_FILE: &str = "subscriptions.json";

/// Load persisted subscriptions from disk. Returns empty if the file is
/// missing or corrupt.
pub async fn load_subscriptions() -> HashMap<Uuid, Subscription> {
    if !Path::new(SUBSCRIPTIONS_FILE).exists() {
        info!("no {SUBSCRIPTIONS_FILE} found, starting with no subscriptions");
        return HashMap::new();
    }

    match fs::read_to_string(SUBSCRIPTIONS_FILE).await {
        Ok(data) => match serde_json::from_str::<Vec<Subscription>>(&data) {
            Ok(subs) => {
                info!("loaded {} subscription(s) from disk", subs.len());
                subs.into_iter().map(|s| (s.subscription_id, s)).collect()
            }
            Err(e) => {
                warn!("failed to parse {SUBSCRIPTIONS_FILE}: {e}, starting empty");
                HashMap::new()
            }
        },
        Err(e) => {
            warn!("failed to read {SUBSCRIPTIONS_FILE}: {e}, starting empty");
            HashMap::new()
        }
    }
}

/// Save the subscription map to disk.
pub async fn save_subscriptions(subscriptions: &HashMap<Uuid, Subscription>) -> Result<()> {
    let mut subs: Vec<&Subscription> = subscriptions.values().collect();
    subs.sort_by_key(|s| s.subscription_id);
    let json = serde_json::to_string_pretty(&subs)?;
    fs::write(SUBSCRIPTIONS_FILE, json).await?;
    Ok(())
}
