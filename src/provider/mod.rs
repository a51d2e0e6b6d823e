// ABOUTME: Defines the ListingProvider trait - the source-of-truth seam.
// ABOUTME: Implementations fetch fresh listings for a (region, sub-area) pair.

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::model::Listing;

/// Source of truth for plot listings.
///
/// One fetch covers a single (region, sub-area) pair. A fetch may fail
/// transiently; the engine skips that sub-area for the cycle and continues
/// with the others.
#[async_trait]
pub trait ListingProvider: Send + Sync {
    /// Fetch the current listings for a sub-area.
    async fn fetch(&self, region: &str, sub_area: &str) -> Result<Vec<Listing>, ProviderError>;
}
