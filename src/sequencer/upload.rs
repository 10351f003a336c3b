//! Multi-phase attachment upload.
//!
//! Destination attachment upload is a three-step protocol: allocate an
//! upload slot, transfer the bytes to it, then finalize so the attachment
//! becomes visible on its message. The destination rejects out-of-order and
//! overlapping phases within one message, which is why
//! [`Sequencer::upload_attachments`](crate::sequencer::Sequencer::upload_attachments)
//! drives these strictly sequentially.

use crate::error::MigrateError;

/// A source-side attachment to be migrated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    /// Source platform attachment id
    pub id: String,
    /// File name, preserved on the destination
    pub name: String,
}

impl AttachmentRef {
    /// Create an attachment reference.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// An allocated destination upload slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSlot {
    /// Where the bytes go (an upload URL or resumable session)
    pub upload_target: String,
    /// Opaque handle the destination uses to refer to the pending upload
    pub handle: String,
}

/// How far one attachment has progressed. Phases only ever advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UploadPhase {
    /// Slot allocated, no bytes sent
    Allocated,
    /// Bytes transferred, not yet attached
    Transferred,
    /// Attached to its message and visible
    Finalized,
}

/// Per-attachment upload progress, scoped to one attachment of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    /// The attachment being uploaded
    pub attachment: AttachmentRef,
    /// The allocated upload target
    pub upload_target: Option<String>,
    /// The destination handle; replaced by the final attachment id on
    /// finalize
    pub remote_handle: Option<String>,
    /// Current phase
    pub phase: UploadPhase,
}

impl UploadSession {
    /// A session that has just allocated `slot`.
    pub fn allocated(attachment: AttachmentRef, slot: &UploadSlot) -> Self {
        Self {
            attachment,
            upload_target: Some(slot.upload_target.clone()),
            remote_handle: Some(slot.handle.clone()),
            phase: UploadPhase::Allocated,
        }
    }

    /// Advance to [`UploadPhase::Transferred`].
    pub fn mark_transferred(&mut self) {
        debug_assert_eq!(self.phase, UploadPhase::Allocated);
        self.phase = UploadPhase::Transferred;
    }

    /// Advance to [`UploadPhase::Finalized`] with the final attachment id.
    pub fn mark_finalized(&mut self, remote_id: String) {
        debug_assert_eq!(self.phase, UploadPhase::Transferred);
        self.remote_handle = Some(remote_id);
        self.phase = UploadPhase::Finalized;
    }
}

/// The destination platform's upload calls, one method per phase.
///
/// Implemented by the driver over its authenticated client; each method is
/// one API call and may be invoked more than once under retry.
pub trait UploadPhases: Send + Sync {
    /// Allocate an upload slot for `attachment`.
    fn allocate(
        &self,
        attachment: &AttachmentRef,
    ) -> impl Future<Output = Result<UploadSlot, MigrateError>> + Send;

    /// Transfer the attachment's bytes into `slot`.
    fn transfer(
        &self,
        attachment: &AttachmentRef,
        slot: &UploadSlot,
    ) -> impl Future<Output = Result<(), MigrateError>> + Send;

    /// Attach the uploaded content to its message; returns the final
    /// destination attachment id.
    fn finalize(
        &self,
        attachment: &AttachmentRef,
        slot: &UploadSlot,
    ) -> impl Future<Output = Result<String, MigrateError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_ordering() {
        assert!(UploadPhase::Allocated < UploadPhase::Transferred);
        assert!(UploadPhase::Transferred < UploadPhase::Finalized);
    }

    #[test]
    fn test_session_progression() {
        let slot = UploadSlot {
            upload_target: "https://upload.example/session/1".into(),
            handle: "pending-1".into(),
        };
        let mut session = UploadSession::allocated(AttachmentRef::new("F1", "notes.pdf"), &slot);
        assert_eq!(session.phase, UploadPhase::Allocated);
        assert_eq!(session.remote_handle.as_deref(), Some("pending-1"));

        session.mark_transferred();
        assert_eq!(session.phase, UploadPhase::Transferred);

        session.mark_finalized("att-99".into());
        assert_eq!(session.phase, UploadPhase::Finalized);
        assert_eq!(session.remote_handle.as_deref(), Some("att-99"));
    }
}
