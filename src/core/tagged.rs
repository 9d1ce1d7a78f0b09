//! Tagged JSON Encoding
//!
//! Snapshots are plain JSON, but non-primitive values carry an explicit
//! `_type` tag so the receiving side can rebuild them without a schema:
//!
//! ```text
//! {"_type": "Vector2", "x": 1.0, "y": 2.0}
//! {"_type": "set",     "value": [1, 2, 3]}
//! {"_type": "tuple",   "value": [4, -2]}
//! ```
//!
//! Use the [`set`] and [`tuple`] modules with `#[serde(with = "...")]`.

use serde::{Serialize, Deserialize};

/// Tag for 2D vectors.
pub const VECTOR2_TAG: &str = "Vector2";
/// Tag for sets.
pub const SET_TAG: &str = "set";
/// Tag for tuples.
pub const TUPLE_TAG: &str = "tuple";

#[derive(Serialize)]
struct TaggedSeqRef<'a, T> {
    #[serde(rename = "_type")]
    kind: &'a str,
    value: T,
}

#[derive(Deserialize)]
struct TaggedSeq<T> {
    #[serde(rename = "_type")]
    kind: String,
    value: T,
}

fn check_tag<E: serde::de::Error>(expected: &str, found: &str) -> Result<(), E> {
    if expected == found {
        Ok(())
    } else {
        Err(E::custom(format!("expected _type {expected}, found {found}")))
    }
}

/// `BTreeSet<T>` as `{"_type": "set", "value": [...]}`.
pub mod set {
    use std::collections::BTreeSet;
    use serde::{Serialize, Deserialize, Serializer, Deserializer};

    use super::{TaggedSeqRef, TaggedSeq, SET_TAG, check_tag};

    /// Serialize a set with its tag.
    pub fn serialize<S, T>(value: &BTreeSet<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        let items: Vec<&T> = value.iter().collect();
        TaggedSeqRef { kind: SET_TAG, value: items }.serialize(serializer)
    }

    /// Deserialize a tagged set.
    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<BTreeSet<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Ord,
    {
        let tagged: TaggedSeq<Vec<T>> = TaggedSeq::deserialize(deserializer)?;
        check_tag::<D::Error>(SET_TAG, &tagged.kind)?;
        Ok(tagged.value.into_iter().collect())
    }
}

/// `(A, B)` as `{"_type": "tuple", "value": [a, b]}`.
pub mod tuple {
    use serde::{Serialize, Deserialize, Serializer, Deserializer};

    use super::{TaggedSeqRef, TaggedSeq, TUPLE_TAG, check_tag};

    /// Serialize a pair with its tag.
    pub fn serialize<S, A, B>(value: &(A, B), serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        A: Serialize,
        B: Serialize,
    {
        TaggedSeqRef { kind: TUPLE_TAG, value: (&value.0, &value.1) }.serialize(serializer)
    }

    /// Deserialize a tagged pair.
    pub fn deserialize<'de, D, A, B>(deserializer: D) -> Result<(A, B), D::Error>
    where
        D: Deserializer<'de>,
        A: Deserialize<'de>,
        B: Deserialize<'de>,
    {
        let tagged: TaggedSeq<(A, B)> = TaggedSeq::deserialize(deserializer)?;
        check_tag::<D::Error>(TUPLE_TAG, &tagged.kind)?;
        Ok(tagged.value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use serde::{Serialize, Deserialize};
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "super::set")]
        ids: BTreeSet<u64>,
        #[serde(with = "super::tuple")]
        cell: (i64, i64),
    }

    #[test]
    fn test_set_and_tuple_tags() {
        let holder = Holder { ids: [3, 1, 2].into_iter().collect(), cell: (4, -2) };
        let value = serde_json::to_value(&holder).unwrap();
        assert_eq!(
            value,
            json!({
                "ids": {"_type": "set", "value": [1, 2, 3]},
                "cell": {"_type": "tuple", "value": [4, -2]},
            })
        );
        let back: Holder = serde_json::from_value(value).unwrap();
        assert_eq!(back, holder);
    }

    #[test]
    fn test_mismatched_tag_is_rejected() {
        let value = json!({
            "ids": {"_type": "tuple", "value": [1]},
            "cell": {"_type": "tuple", "value": [0, 0]},
        });
        assert!(serde_json::from_value::<Holder>(value).is_err());
    }
}
