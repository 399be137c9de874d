#![allow(unused_imports)]
pub mod fake_transport;
pub mod fixtures;
pub mod test_db;

pub use fake_transport::*;
pub use fixtures::*;
pub use test_db::*;
