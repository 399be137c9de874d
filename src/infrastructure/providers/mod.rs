pub mod email_parser;
pub mod imap_transport;
pub mod mbox_reader;

pub use email_parser::*;
pub use imap_transport::*;
pub use mbox_reader::*;
