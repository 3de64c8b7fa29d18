pub mod fixtures;
pub mod invariants;
pub mod lattice;

pub use fixtures::Scenario;
