pub mod restore_worker;

pub use restore_worker::*;
