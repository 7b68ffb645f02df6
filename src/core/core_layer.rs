// The core module contains all business logic.
// Nothing in here knows about Discord; every feature talks to storage
// through the `KeyValueStore` port.

#[path = "storage/kv_store.rs"]
pub mod storage;

#[path = "leveling/leveling_service.rs"]
pub mod leveling;

#[path = "settings/settings_service.rs"]
pub mod settings;
