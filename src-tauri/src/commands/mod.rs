pub mod agents;
pub mod session;
pub mod snapshot;
