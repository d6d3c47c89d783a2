//! Collections and the id-to-name lookup built from them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Name shown for cards outside any collection.
pub const ROOT_COLLECTION: &str = "Root Collection";

/// Name shown for a collection id the listing did not include.
pub const UNKNOWN_COLLECTION: &str = "Unknown Collection";

/// A collection as returned by `GET /api/collection`.
///
/// The root collection and personal collections may carry non-numeric ids
/// such as `"root"`, so the id is kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub id: Value,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub archived: bool,
}

impl Collection {
    pub fn numeric_id(&self) -> Option<u64> {
        self.id.as_u64()
    }
}

/// Collection names by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionNames {
    names: BTreeMap<u64, String>,
}

impl CollectionNames {
    pub fn from_collections<I>(collections: I) -> Self
    where
        I: IntoIterator<Item = Collection>,
    {
        let names = collections
            .into_iter()
            .filter_map(|c| {
                let id = c.numeric_id()?;
                Some((id, c.name.unwrap_or_else(|| UNKNOWN_COLLECTION.to_string())))
            })
            .collect();
        Self { names }
    }

    /// `None` and `0` are the root collection.
    pub fn name_of(&self, id: Option<u64>) -> &str {
        match id {
            None | Some(0) => ROOT_COLLECTION,
            Some(id) => self
                .names
                .get(&id)
                .map(String::as_str)
                .unwrap_or(UNKNOWN_COLLECTION),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
