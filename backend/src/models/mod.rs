pub mod attendance;
pub mod common;
pub mod days;
pub mod employee;
pub mod leave;
pub mod shift;
