//! Request verbs.
//!
//! The verb set is closed: every request kind is one of the eight variants
//! below, and each variant doubles as the name of the event fired through
//! the listener registry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of request made against a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verb {
    /// Read a single resource.
    Get,
    /// Read a collection of resources.
    GetCollection,
    /// Create a single resource.
    Post,
    /// Create several resources at once.
    PostCollection,
    /// Replace a single resource.
    Put,
    /// Replace several resources at once.
    PutCollection,
    /// Remove a single resource.
    Delete,
    /// Remove several resources at once.
    DeleteCollection,
}

impl Verb {
    /// Every verb, in declaration order.
    pub const ALL: [Verb; 8] = [
        Verb::Get,
        Verb::GetCollection,
        Verb::Post,
        Verb::PostCollection,
        Verb::Put,
        Verb::PutCollection,
        Verb::Delete,
        Verb::DeleteCollection,
    ];

    /// Returns the event name for this verb.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::GetCollection => "GET_COLLECTION",
            Verb::Post => "POST",
            Verb::PostCollection => "POST_COLLECTION",
            Verb::Put => "PUT",
            Verb::PutCollection => "PUT_COLLECTION",
            Verb::Delete => "DELETE",
            Verb::DeleteCollection => "DELETE_COLLECTION",
        }
    }

    /// Whether the verb targets a collection rather than a single resource.
    #[must_use]
    pub fn is_collection(self) -> bool {
        matches!(
            self,
            Verb::GetCollection
                | Verb::PostCollection
                | Verb::PutCollection
                | Verb::DeleteCollection
        )
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known verb.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown verb: {0}")]
pub struct UnknownVerb(pub String);

impl FromStr for Verb {
    type Err = UnknownVerb;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Verb::ALL
            .into_iter()
            .find(|verb| verb.as_str() == s)
            .ok_or_else(|| UnknownVerb(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn event_names_are_upper_snake_case() {
        let names: Vec<&str> = Verb::ALL.iter().map(|v| v.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "GET",
                "GET_COLLECTION",
                "POST",
                "POST_COLLECTION",
                "PUT",
                "PUT_COLLECTION",
                "DELETE",
                "DELETE_COLLECTION",
            ]
        );
    }

    #[test]
    fn collection_variants() {
        let collections: Vec<Verb> = Verb::ALL.into_iter().filter(|v| v.is_collection()).collect();
        assert_eq!(
            collections,
            vec![
                Verb::GetCollection,
                Verb::PostCollection,
                Verb::PutCollection,
                Verb::DeleteCollection
            ]
        );
    }

    #[test]
    fn parse_rejects_unknown_and_lowercase() {
        assert_eq!("PATCH".parse::<Verb>(), Err(UnknownVerb("PATCH".to_string())));
        assert!("get".parse::<Verb>().is_err());
    }

    #[test]
    fn serde_uses_event_names() {
        let json = serde_json::to_string(&Verb::DeleteCollection).unwrap();
        assert_eq!(json, "\"DELETE_COLLECTION\"");
        let back: Verb = serde_json::from_str("\"PUT\"").unwrap();
        assert_eq!(back, Verb::Put);
    }

    proptest! {
        #[test]
        fn display_parse_round_trip(index in 0usize..8) {
            let verb = Verb::ALL[index];
            prop_assert_eq!(verb.to_string().parse::<Verb>(), Ok(verb));
        }
    }
}
