//! Serde helpers for the index artifacts.
//!
//! JSON objects in the artifacts carry meaning in their key order (ranking
//! ties, chapter order), so they are read into ordered `Vec`s rather than
//! hash maps.

use serde::de::{self, Deserialize, Deserializer, MapAccess, Visitor};
use std::fmt::{Formatter, Result as FmtResult};
use std::marker::PhantomData;

/// Deserialize a JSON object into `(key, value)` pairs in document order.
pub(crate) fn ordered_map<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct OrderedVisitor<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
        type Value = Vec<(String, V)>;

        fn expecting(&self, f: &mut Formatter) -> FmtResult {
            f.write_str("a JSON object")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((key, value)) = access.next_entry::<String, V>()? {
                entries.push((key, value));
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(OrderedVisitor(PhantomData))
}

/// A label that the artifacts write either as a string or as a number
/// (page numbers, section numbers).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Label(pub String);

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LabelVisitor;

        impl Visitor<'_> for LabelVisitor {
            type Value = Label;

            fn expecting(&self, f: &mut Formatter) -> FmtResult {
                f.write_str("a string or a number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Label, E> {
                Ok(Label(v.to_string()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Label, E> {
                Ok(Label(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Label, E> {
                Ok(Label(v.to_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Label, E> {
                Ok(Label(v.to_string()))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Label, E> {
                Ok(Label::default())
            }
        }

        deserializer.deserialize_any(LabelVisitor)
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.0
    }
}
