//! Caller identity checks.
//!
//! GalleryDB doesn't issue or verify credentials. The host application
//! authenticates the request and hands over the resulting identity; every
//! operation refuses to run without one.

use crate::error::{GalleryDBError, Result};
use crate::types::UserId;

/// A verified caller.
///
/// # Example
/// ```
/// use gallerydb::Caller;
///
/// let caller = Caller::new("alice");
/// assert_eq!(caller.user_id.as_str(), "alice");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Caller {
    /// Identity established by the authentication layer.
    pub user_id: UserId,
}

impl Caller {
    /// Creates a caller for the given user id.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
        }
    }
}

/// Returns the caller's user id, or `Unauthorized` if there is no caller or
/// the id is blank.
pub(crate) fn authorize(caller: Option<&Caller>) -> Result<&UserId> {
    match caller {
        Some(caller) if !caller.user_id.as_str().trim().is_empty() => Ok(&caller.user_id),
        _ => Err(GalleryDBError::Unauthorized),
    }
}
