// ABOUTME: Defines the Presenter trait - the outward-message seam.
// ABOUTME: Implementations own container and message lifecycle on the host
// ABOUTME: messaging platform.

use async_trait::async_trait;

use crate::error::PresenterError;
use crate::model::Listing;

/// Outward-message operations for mirrored listings.
///
/// Containers group messages by area (one container per area per tenant);
/// messages mirror individual listings. Every operation may fail
/// independently; the engine logs and counts failures without aborting the
/// batch.
#[async_trait]
pub trait Presenter: Send + Sync {
    /// Create a container for an area under the tenant's root container.
    async fn create_container(&self, root_id: &str, area: &str)
    -> Result<String, PresenterError>;

    /// Check whether a previously recorded container still exists.
    ///
    /// Returns the (possibly refreshed) id, or `None` if the container is
    /// gone and must be recreated.
    async fn resolve_container(&self, container_id: &str)
    -> Result<Option<String>, PresenterError>;

    /// Post a new message for a listing. Returns the new message id.
    async fn post_message(
        &self,
        container_id: &str,
        listing: &Listing,
    ) -> Result<String, PresenterError>;

    /// Edit an existing message to reflect the listing's current fields.
    async fn edit_message(
        &self,
        container_id: &str,
        message_id: &str,
        listing: &Listing,
    ) -> Result<(), PresenterError>;

    /// Delete the message for a listing that is no longer live.
    async fn delete_message(
        &self,
        container_id: &str,
        message_id: &str,
    ) -> Result<(), PresenterError>;
}
