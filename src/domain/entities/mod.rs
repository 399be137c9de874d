pub mod account;
pub mod archived_email;
pub mod import;
pub mod job;
pub mod restore;

pub use account::*;
pub use archived_email::*;
pub use import::*;
pub use job::*;
pub use restore::*;
