use crate::config::Config;
use crate::core::store::Store;
use crate::mail::Outbox;

pub struct AppState {
    pub store: Store,
    pub config: Config,
    pub outbox: Outbox,
}

impl AppState {
    pub fn new(store: Store, config: Config, outbox: Outbox) -> Self {
        Self {
            store,
            config,
            outbox,
        }
    }
}
