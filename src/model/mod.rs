pub mod attendance;
pub mod department;
pub mod employee;
pub mod overtime;
pub mod role;
pub mod user;
