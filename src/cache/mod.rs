pub mod capability;
pub mod codec;
pub mod discovery_cache;
