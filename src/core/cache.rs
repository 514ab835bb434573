//! Short-lived values kept next to the regular documents.
//!
//! Each entry carries its own expiry and is checked against the clock on read,
//! so expiry does not depend on the backend supporting TTLs. Writes overwrite
//! whatever was there.

use chrono::{DateTime, Duration, Utc};

use crate::core::store::Store;
use crate::models::models::ExpiringValue;

pub fn set_at(
    store: &Store,
    key: &str,
    value: &str,
    ttl_secs: i64,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let entry = ExpiringValue {
        value: value.to_string(),
        expires_at: now + Duration::seconds(ttl_secs),
    };
    store.set_json(key, &entry)
}

pub fn get_at(store: &Store, key: &str, now: DateTime<Utc>) -> anyhow::Result<Option<String>> {
    match store.get_json::<ExpiringValue>(key)? {
        Some(entry) if entry.expires_at > now => Ok(Some(entry.value)),
        Some(_) => {
            store.delete(key)?;
            Ok(None)
        }
        None => Ok(None),
    }
}

pub fn set(store: &Store, key: &str, value: &str, ttl_secs: i64) -> anyhow::Result<()> {
    set_at(store, key, value, ttl_secs, Utc::now())
}

pub fn get(store: &Store, key: &str) -> anyhow::Result<Option<String>> {
    get_at(store, key, Utc::now())
}
