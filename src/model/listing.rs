// ABOUTME: Listing value type, its stable identity key, and content hashing.
// ABOUTME: The hash covers only mutable display fields, never identity fields.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Lottery/availability phase of a listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LotteryPhase {
    #[default]
    None,
    Preparation,
    Running,
    Results,
}

/// The stable identity tuple of a listing, independent of its mutable fields.
///
/// Two listings describe the same slot iff their keys are equal. The wire
/// form is the `:`-joined string `region:subArea:area:ward:plot`, which is
/// also how keys appear as JSON map keys in the persisted document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListingKey {
    pub region: String,
    pub sub_area: String,
    pub area: String,
    pub ward: u32,
    pub plot: u32,
}

impl fmt::Display for ListingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.region, self.sub_area, self.area, self.ward, self.plot
        )
    }
}

/// Error returned when a wire-form listing key cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed listing key '{0}'")]
pub struct ParseListingKeyError(pub String);

impl FromStr for ListingKey {
    type Err = ParseListingKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let [region, sub_area, area, ward, plot] = parts.as_slice() else {
            return Err(ParseListingKeyError(s.to_string()));
        };
        let ward = ward
            .parse()
            .map_err(|_| ParseListingKeyError(s.to_string()))?;
        let plot = plot
            .parse()
            .map_err(|_| ParseListingKeyError(s.to_string()))?;
        Ok(ListingKey {
            region: region.to_string(),
            sub_area: sub_area.to_string(),
            area: area.to_string(),
            ward,
            plot,
        })
    }
}

impl Serialize for ListingKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ListingKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl Visitor<'_> for KeyVisitor {
            type Value = ListingKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 'region:subArea:area:ward:plot' listing key")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ListingKey, E> {
                v.parse().map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(KeyVisitor)
    }
}

/// One externally sourced plot listing, as fetched for a reconciliation cycle.
///
/// Identity fields (`region`, `sub_area`, `area`, `ward`, `plot`) form the
/// [`ListingKey`]; the remaining fields are mutable between cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub region: String,
    pub sub_area: String,
    pub area: String,
    pub ward: u32,
    pub plot: u32,
    #[serde(default)]
    pub price: Option<u64>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub exclusive: Option<bool>,
    #[serde(default)]
    pub phase: LotteryPhase,
    #[serde(default)]
    pub phase_ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub entrants: Option<u32>,
}

impl Listing {
    /// The stable identity key of this listing.
    pub fn key(&self) -> ListingKey {
        ListingKey {
            region: self.region.clone(),
            sub_area: self.sub_area.clone(),
            area: self.area.clone(),
            ward: self.ward,
            plot: self.plot,
        }
    }

    /// Stable digest over the mutable display fields.
    ///
    /// Covers price, size, phase-end, and entrant count. Identity fields are
    /// excluded: for a stable key they cannot change, and hash equality is
    /// the sole "needs update" trigger.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();

        if let Some(price) = self.price {
            hasher.update(price.to_string().as_bytes());
        }
        hasher.update(b"|");

        if let Some(size) = &self.size {
            hasher.update(size.as_bytes());
        }
        hasher.update(b"|");

        if let Some(ends) = &self.phase_ends_at {
            hasher.update(ends.timestamp().to_string().as_bytes());
        }
        hasher.update(b"|");

        if let Some(entrants) = self.entrants {
            hasher.update(entrants.to_string().as_bytes());
        }

        format!("{:x}", hasher.finalize())
    }

    /// True iff the listing's phase has ended as of `now`.
    pub fn phase_ended(&self, now: DateTime<Utc>) -> bool {
        matches!(self.phase_ends_at, Some(ends) if ends <= now)
    }
}
