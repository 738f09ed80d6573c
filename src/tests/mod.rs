pub mod common;

mod session_lifecycle;
