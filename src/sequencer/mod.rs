//! Order-sensitive migration protocols.
//!
//! Two destination protocols care about call order, and both ride on top of
//! the [`BackoffExecutor`]:
//!
//! - **Thread resolution**: a reply can only be posted once its thread root
//!   exists on the destination and its assigned id is known. The sequencer
//!   keeps a write-once [`ThreadMapping`] from source thread keys to
//!   destination root ids.
//! - **Attachment upload**: each attachment moves through
//!   Allocate → Transfer → Finalize strictly in order, and attachments of
//!   one message never overlap each other. Attachments of different
//!   messages are unordered relative to each other.
//!
//! The token bucket and executor are order-agnostic; ordering lives here and
//! only here.

mod thread;
mod upload;

pub use thread::{ThreadMapping, ThreadPost};
pub use upload::{AttachmentRef, UploadPhase, UploadPhases, UploadSession, UploadSlot};

use crate::error::MigrateError;
use crate::executor::BackoffExecutor;
use crate::rate_limit::ServiceTier;

/// Drives thread resolution and attachment upload through the executor.
///
/// Scoped to one migration run, like the [`ThreadMapping`] it owns.
#[derive(Debug)]
pub struct Sequencer {
    executor: BackoffExecutor,
    threads: ThreadMapping,
    message_tier: ServiceTier,
    upload_tier: ServiceTier,
}

impl Sequencer {
    /// Create a sequencer posting messages and uploads under the default
    /// destination tiers.
    pub fn new(executor: BackoffExecutor) -> Self {
        Self::with_tiers(
            executor,
            ServiceTier::DestMessagePost,
            ServiceTier::DestFileUpload,
        )
    }

    /// Create a sequencer with explicit tiers for message posts and uploads.
    pub fn with_tiers(
        executor: BackoffExecutor,
        message_tier: ServiceTier,
        upload_tier: ServiceTier,
    ) -> Self {
        Self {
            executor,
            threads: ThreadMapping::new(),
            message_tier,
            upload_tier,
        }
    }

    /// The thread mapping accumulated so far this run.
    pub fn threads(&self) -> &ThreadMapping {
        &self.threads
    }

    /// Post one message into its thread, resolving the thread root first.
    ///
    /// If `key` is already mapped, `post_reply` runs with the recorded
    /// destination root id. Otherwise `post_root` runs and the id it returns
    /// is recorded first-writer-wins; see [`ThreadMapping`] for the racing
    /// behavior.
    ///
    /// Both closures are invoked through the executor under the message
    /// tier, so they may run more than once on retryable failures.
    pub async fn resolve_thread<Root, RootFut, Reply, ReplyFut>(
        &self,
        key: &str,
        post_root: Root,
        mut post_reply: Reply,
    ) -> Result<ThreadPost, MigrateError>
    where
        Root: FnMut() -> RootFut,
        RootFut: Future<Output = Result<String, MigrateError>>,
        Reply: FnMut(String) -> ReplyFut,
        ReplyFut: Future<Output = Result<String, MigrateError>>,
    {
        if let Some(root_id) = self.threads.get(key).await {
            tracing::debug!(key, %root_id, "posting threaded reply");
            let reply_root = root_id.clone();
            let message_id = self
                .executor
                .run(self.message_tier, move || post_reply(reply_root.clone()))
                .await?;
            return Ok(ThreadPost {
                root_id,
                message_id,
                posted_root: false,
            });
        }

        tracing::debug!(key, "posting thread root");
        let posted_id = self.executor.run(self.message_tier, post_root).await?;
        let root_id = self.threads.record(key, posted_id.clone()).await;
        Ok(ThreadPost {
            root_id,
            message_id: posted_id,
            posted_root: true,
        })
    }

    /// Upload a message's attachments, strictly one at a time.
    ///
    /// For attachment *i*, Allocate, Transfer and Finalize complete in that
    /// order before Allocate begins for attachment *i + 1*. Every phase call
    /// goes through the executor under the upload tier. Attachments of
    /// different messages carry no mutual ordering; callers may run their
    /// `upload_attachments` calls concurrently.
    pub async fn upload_attachments<P>(
        &self,
        attachments: &[AttachmentRef],
        phases: &P,
    ) -> Result<Vec<UploadSession>, MigrateError>
    where
        P: UploadPhases,
    {
        let mut sessions = Vec::with_capacity(attachments.len());

        for attachment in attachments {
            let slot = self
                .executor
                .run(self.upload_tier, || phases.allocate(attachment))
                .await?;
            let mut session = UploadSession::allocated(attachment.clone(), &slot);

            self.executor
                .run(self.upload_tier, || phases.transfer(attachment, &slot))
                .await?;
            session.mark_transferred();

            let remote_id = self
                .executor
                .run(self.upload_tier, || phases.finalize(attachment, &slot))
                .await?;
            session.mark_finalized(remote_id);

            tracing::debug!(
                attachment = %session.attachment.id,
                handle = session.remote_handle.as_deref().unwrap_or(""),
                "attachment finalized"
            );
            sessions.push(session);
        }

        Ok(sessions)
    }
}
