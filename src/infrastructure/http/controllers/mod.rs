pub mod accounts;
pub mod imports;
pub mod jobs;
pub mod restore;
