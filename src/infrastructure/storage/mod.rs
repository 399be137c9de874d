pub mod selection_stash;

pub use selection_stash::SelectionStash;
