use crate::domain::errors::DomainResult;

/// Caller-supplied mechanism that stages a restore selection before it is
/// processed inline (for example stashing the ids for a follow-up page).
pub trait SelectionHandoff: Send + Sync {
    fn stage(&self, email_ids: &[String]) -> DomainResult<()>;
}
