// Domain layer: triage value types, persisted entities and the ports the core depends on.

pub mod model;
pub mod ports;
