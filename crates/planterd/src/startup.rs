use tracing::error;
use tracing::info;

use crate::engine::state::ActuatorState;
use crate::engine::state::MemoryRecord;
use crate::store::Store;
use crate::store::StoreError;

/// Seed the actuator mirror from the memory record at `path`.
///
/// If no record exists a zeroed one is written. Any failure is logged and the
/// default (everything off) is returned; the read is not retried.
pub async fn load_initial_state(store: &dyn Store, path: &str) -> ActuatorState {
    match read_or_initialize(store, path).await {
        Ok(state) => state,
        Err(e) => {
            error!("Error loading initial states: {}", e);
            ActuatorState::default()
        }
    }
}

async fn read_or_initialize(store: &dyn Store, path: &str) -> Result<ActuatorState, StoreError> {
    match store.get(path).await? {
        Some(value) => {
            let record: MemoryRecord = serde_json::from_value(value)?;
            info!(
                "Restored actuator states: pump_status={}, fan_status={}",
                record.pump_status, record.fan_status
            );
            Ok(record.into())
        }
        None => {
            info!("No memory record at '{}', creating one", path);
            store.set(path, MemoryRecord::default().to_value()).await?;
            Ok(ActuatorState::default())
        }
    }
}
