use std::fmt;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

/// An abstract stored as word -> positions, the way OpenAlex ships it.
///
/// Entries keep the key order of the source JSON object so that words sharing
/// a position reconstruct in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvertedIndex(pub Vec<(String, Vec<usize>)>);

impl InvertedIndex {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Rebuild the plaintext abstract: words ordered by position, single spaces.
    pub fn reconstruct(&self) -> String {
        reconstruct_abstract(self.0.iter().map(|(w, p)| (w.as_str(), p.as_slice())))
    }
}

/// Invert a word -> positions mapping back into text.
pub fn reconstruct_abstract<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a [usize])>,
{
    let mut placed: Vec<(usize, &str)> = entries
        .into_iter()
        .flat_map(|(word, positions)| positions.iter().map(move |&pos| (pos, word)))
        .collect();
    // stable: ties keep iteration order
    placed.sort_by_key(|&(pos, _)| pos);
    placed
        .into_iter()
        .map(|(_, word)| word)
        .collect::<Vec<_>>()
        .join(" ")
}

impl<'de> Deserialize<'de> for InvertedIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IndexVisitor;

        impl<'de> Visitor<'de> for IndexVisitor {
            type Value = InvertedIndex;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of words to position lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((word, positions)) = map.next_entry::<String, Vec<usize>>()? {
                    entries.push((word, positions));
                }
                Ok(InvertedIndex(entries))
            }
        }

        deserializer.deserialize_map(IndexVisitor)
    }
}
