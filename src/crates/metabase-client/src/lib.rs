//! # metabase-client - Read-only card lookups against a Metabase instance
//!
//! - [`MetabaseClient`] - authenticated, paced, retrying HTTP client
//! - [`CardLookup`] - the seam batch jobs depend on
//! - [`CardListing`] - card and collection listings for catalog discovery
//! - [`Card`] - card payload with SQL extraction and activity scoring

pub mod card;
pub mod client;
pub mod collection;
pub mod config;
pub mod error;

pub use card::{Activity, Card, ACTIVITY_WINDOW_DAYS};
pub use client::{CardListing, CardLookup, CurrentUser, MetabaseClient};
pub use collection::{Collection, CollectionNames, ROOT_COLLECTION, UNKNOWN_COLLECTION};
pub use config::MetabaseConfig;
pub use error::{MetabaseError, Result};
