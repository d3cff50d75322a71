// Project tracking library shared by the `pm` binary and the integration tests

// Store module (entities, flat-file codec, settings, project store)
pub mod store;
