use std::collections::VecDeque;
use std::sync::Mutex;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::SelectionHandoff;

/// Keeps the most recent restore selections in memory so a follow-up page
/// can show what was restored. Oldest selections fall out first.
pub struct SelectionStash {
    entries: Mutex<VecDeque<Vec<String>>>,
    max_entries: usize,
    max_selection: usize,
}

impl SelectionStash {
    pub fn new(max_entries: usize, max_selection: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_entries)),
            max_entries: max_entries.max(1),
            max_selection,
        }
    }
}

impl SelectionHandoff for SelectionStash {
    fn stage(&self, email_ids: &[String]) -> DomainResult<()> {
        if email_ids.len() > self.max_selection {
            return Err(DomainError::Capacity {
                requested: email_ids.len(),
                limit: self.max_selection,
            });
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| DomainError::Internal("Selection stash is poisoned".to_string()))?;
        while entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(email_ids.to_vec());
        Ok(())
    }
}
