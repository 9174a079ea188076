//! Secondary index specifications and the collation policy.
//!
//! Indexes are always ascending and compound in the order the fields are given. A
//! case-insensitive index carries the fixed [`Collation::case_insensitive`] policy so that
//! queries run with the same collation can use it.

use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// How much of a character difference a collation considers significant.
///
/// The numeric values match the store's strength levels.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollationStrength {
    /// Base letters only: ignores case and diacritics.
    Primary,
    /// Base letters and diacritics: ignores case.
    Secondary,
    /// Base letters, diacritics and case.
    Tertiary,
}

impl CollationStrength {
    pub fn level(&self) -> u32 {
        match self {
            CollationStrength::Primary => 1,
            CollationStrength::Secondary => 2,
            CollationStrength::Tertiary => 3,
        }
    }

    pub fn from_level(level: u32) -> Option<Self> {
        match level {
            1 => Some(CollationStrength::Primary),
            2 => Some(CollationStrength::Secondary),
            3 => Some(CollationStrength::Tertiary),
            _ => None,
        }
    }
}

/// A string comparison policy.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Collation {
    /// Locale whose rules apply, e.g. `"en"`.
    pub locale: String,
    /// Which differences are significant.
    pub strength: CollationStrength,
}

impl Collation {
    pub const CASE_INSENSITIVE_LOCALE: &'static str = "en";

    /// The collation used for every case-insensitive index and query:
    /// locale `en`, primary strength.
    pub fn case_insensitive() -> Self {
        Self {
            locale: Self::CASE_INSENSITIVE_LOCALE.to_string(),
            strength: CollationStrength::Primary,
        }
    }

    /// Picks the case-insensitive policy when `case_insensitive` is set, or the store
    /// default otherwise.
    pub fn for_flag(case_insensitive: bool) -> Option<Self> {
        case_insensitive.then(Self::case_insensitive)
    }
}

/// A validated request for an ascending compound index.
///
/// # Example
///
/// ```ignore
/// use doccol::index::IndexSpec;
///
/// let spec = IndexSpec::new(["name", "city"], true)?;
/// assert_eq!(spec.name(), "name_1_city_1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    fields: Vec<String>,
    case_insensitive: bool,
}

impl IndexSpec {
    /// Creates an index spec over `fields` in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::IndexCreation`] if the list is empty, a field name is
    /// empty, starts with `$`, contains a NUL byte, or appears twice.
    pub fn new<I, S>(fields: I, case_insensitive: bool) -> DocumentStoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(Into::into)
            .collect::<Vec<String>>();

        if fields.is_empty() {
            return Err(DocumentStoreError::IndexCreation(
                "an index needs at least one field".into(),
            ));
        }

        for (position, field) in fields.iter().enumerate() {
            validate_field_name(field)?;

            if fields[..position].contains(field) {
                return Err(DocumentStoreError::IndexCreation(format!(
                    "field {field:?} appears more than once"
                )));
            }
        }

        Ok(Self { fields, case_insensitive })
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    /// The key document, `{ field: 1, ... }` in field order.
    pub fn keys(&self) -> Document {
        self.fields
            .iter()
            .map(|field| (field.clone(), Bson::Int32(1)))
            .collect()
    }

    /// The collation the index is built with, if any.
    pub fn collation(&self) -> Option<Collation> {
        Collation::for_flag(self.case_insensitive)
    }

    /// The store's conventional index name, e.g. `name_1_city_1`.
    pub fn name(&self) -> String {
        self.fields
            .iter()
            .map(|field| format!("{field}_1"))
            .collect::<Vec<_>>()
            .join("_")
    }
}

fn validate_field_name(field: &str) -> DocumentStoreResult<()> {
    let problem = if field.is_empty() {
        Some("field names must not be empty")
    } else if field.starts_with('$') {
        Some("field names must not start with '$'")
    } else if field.contains('\0') {
        Some("field names must not contain NUL")
    } else if field.split('.').any(str::is_empty) {
        Some("dotted paths must not have empty segments")
    } else {
        None
    };

    match problem {
        Some(problem) => Err(DocumentStoreError::IndexCreation(format!("{problem}: {field:?}"))),
        None => Ok(()),
    }
}

/// An existing index as reported by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDescription {
    /// The index name.
    pub name: String,
    /// Key document in key order.
    pub keys: Document,
    /// The collation the index was built with, if not the default.
    pub collation: Option<Collation>,
}

impl IndexDescription {
    /// Describes the implicit primary-key index every collection has.
    pub fn primary() -> Self {
        Self {
            name: "_id_".to_string(),
            keys: doc! { "_id": 1 },
            collation: None,
        }
    }

    /// Field names covered by this index, in key order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

impl From<&IndexSpec> for IndexDescription {
    fn from(spec: &IndexSpec) -> Self {
        Self {
            name: spec.name(),
            keys: spec.keys(),
            collation: spec.collation(),
        }
    }
}
