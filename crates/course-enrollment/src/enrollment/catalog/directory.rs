use std::sync::Arc;

use tracing::info;

use super::super::domain::{NewUser, User, UserId, UserRole};
use super::super::repository::{RecordStore, RepositoryError};

/// Result of looking an instructor up by display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstructorMatch {
    Existing(User),
    Created(User),
    /// Several instructor accounts share the name; the caller must pick one.
    Ambiguous(Vec<UserId>),
}

impl InstructorMatch {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            InstructorMatch::Existing(user) | InstructorMatch::Created(user) => Some(user.id),
            InstructorMatch::Ambiguous(_) => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("instructor name must not be blank")]
    BlankName,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Resolves instructor display names to accounts, creating one when none exists.
pub trait InstructorDirectory: Send + Sync {
    fn resolve_or_create(&self, display_name: &str) -> Result<InstructorMatch, DirectoryError>;
}

/// Directory backed by the user table of a [`RecordStore`].
pub struct StoreInstructorDirectory<R> {
    repository: Arc<R>,
}

impl<R> StoreInstructorDirectory<R>
where
    R: RecordStore,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }
}

impl<R> InstructorDirectory for StoreInstructorDirectory<R>
where
    R: RecordStore,
{
    fn resolve_or_create(&self, display_name: &str) -> Result<InstructorMatch, DirectoryError> {
        let name = display_name.trim();
        if name.is_empty() {
            return Err(DirectoryError::BlankName);
        }

        let mut matches = self.repository.users_named(name, UserRole::Instructor)?;
        match matches.len() {
            0 => {
                let created = self.repository.insert_user(NewUser {
                    full_name: name.to_string(),
                    name: name.to_string(),
                    role: UserRole::Instructor,
                    email: None,
                })?;
                info!(instructor = %created.id, name, "instructor account created");
                Ok(InstructorMatch::Created(created))
            }
            1 => Ok(InstructorMatch::Existing(matches.remove(0))),
            _ => Ok(InstructorMatch::Ambiguous(
                matches.into_iter().map(|user| user.id).collect(),
            )),
        }
    }
}
