use std::ops::{Deref, DerefMut};

use crate::session::DocumentSession;

/// Keeps the session's conversion cache open while alive.
///
/// Only the guard that opened the cache closes it on drop; a scope opened
/// while the cache was already open just empties it.
pub struct CachingScope<'s> {
    session: &'s mut DocumentSession,
    owns: bool,
}

impl<'s> CachingScope<'s> {
    pub(crate) fn new(session: &'s mut DocumentSession) -> Self {
        let owns = session.begin_caching();
        CachingScope { session, owns }
    }
}

impl Deref for CachingScope<'_> {
    type Target = DocumentSession;

    fn deref(&self) -> &Self::Target {
        self.session
    }
}

impl DerefMut for CachingScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session
    }
}

impl Drop for CachingScope<'_> {
    fn drop(&mut self) {
        if self.owns {
            self.session.end_caching();
        }
    }
}
