//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for the identifiers handed out by the two stores.
//! The stores share no identity space, so an event id and a page id are
//! distinct types even though both are opaque strings on the wire.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Create a new ", $label)]
            ///
            /// # Errors
            /// Returns error if the id is empty or only whitespace
            pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
                let id = id.into();
                let trimmed = id.trim();
                if trimmed.is_empty() {
                    return Err(DomainError::InvalidId(format!(
                        "{} cannot be empty",
                        $label
                    )));
                }
                Ok(Self(trimmed.to_string()))
            }

            /// Get the inner string reference
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = DomainError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

opaque_id!(
    /// Identifier of a calendar (the source collection of a pair)
    CalendarId,
    "calendar id"
);

opaque_id!(
    /// Identifier of a database (the target collection of a pair)
    DatabaseId,
    "database id"
);

opaque_id!(
    /// Identifier of a single calendar event
    EventId,
    "event id"
);

opaque_id!(
    /// Identifier of a single database record (page)
    PageId,
    "page id"
);
