pub mod csv_import;
pub mod error;
pub mod overtime;
pub mod ports;
pub mod reconcile;
pub mod roles;
