//! FETCH with profile fallback.

use mailkeeper_imap::{FetchProfile, FetchedMessage, Rights, Transport, Uid, UidSet};
use tracing::warn;

use crate::error::Result;
use crate::handle::OpenMode;
use crate::session::MailSession;

impl<T: Transport> MailSession<T> {
    /// Fetches messages of `folder`.
    ///
    /// The request runs at `profile` or the session's fallback level,
    /// whichever is leaner. A FETCH the server rejects is retried one level
    /// down, and the session keeps that level for later calls.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`](crate::Error::NotFound) for a missing folder
    /// - [`Error::Permission`](crate::Error::Permission) without read right
    /// - the FETCH failure once the leanest profile is rejected too
    pub async fn fetch(&mut self, folder: &str, uids: &[Uid], profile: FetchProfile) -> Result<Vec<FetchedMessage>> {
        let name = self.selectable_folder(folder).await?;
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        self.require_rights(&name, Rights::READ, "reading messages")
            .await?;
        self.open_folder(&name, OpenMode::ReadOnly).await?;

        let mut messages = Vec::with_capacity(uids.len());
        for chunk in uids.chunks(self.engine.properties().fetch_limit) {
            if let Some(set) = UidSet::from_uids(chunk) {
                messages.extend(self.fetch_open(&name, &set, profile).await?);
            }
        }
        Ok(messages)
    }

    /// FETCH against the open mailbox, degrading on rejection.
    pub(crate) async fn fetch_open(
        &mut self,
        name: &str,
        set: &UidSet,
        requested: FetchProfile,
    ) -> Result<Vec<FetchedMessage>> {
        let mut profile = requested.max(self.fetch_profile);
        loop {
            match self.transport.uid_fetch(set, profile).await {
                Ok(messages) => return Ok(messages),
                Err(err) if err.is_command_failure() => {
                    let Some(next) = profile.degrade() else {
                        return Err(self.fail(name, err));
                    };
                    warn!(folder = name, from = ?profile, to = ?next, error = %err, "FETCH rejected, degrading");
                    profile = next;
                    self.fetch_profile = self.fetch_profile.max(next);
                }
                Err(err) => return Err(self.fail(name, err)),
            }
        }
    }
}
