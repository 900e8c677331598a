//! Wire Messages
//!
//! The closed set of request and response bodies exchanged over the bus.
//! Every request names its own reply queue (`routing_key`) and carries an
//! opaque correlation identifier (`message_id`) that is copied verbatim into
//! the response. Field validation happens here, at the channel boundary, so
//! handler bodies never guess at missing keys.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::chat::ChatTurn;

/// Free-form chat request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AskRequest {
    /// Correlation identifier, echoed in the response.
    pub message_id: String,
    /// Queue the response must be published to.
    pub routing_key: String,
    /// The new user message.
    pub query: String,
    /// Preceding conversation, oldest first. Supplied in full on every call;
    /// the backend reads only a bounded suffix.
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

/// Answer-ranking request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreRequest {
    /// Correlation identifier, echoed in the response.
    pub message_id: String,
    /// Queue the response must be published to.
    pub routing_key: String,
    /// Question the candidate answers respond to.
    pub query: String,
    /// Candidate answers to rank. An empty list is valid and yields an
    /// empty ranking without an engine call.
    #[serde(default)]
    pub responses: Vec<String>,
}

/// Opinion-synthesis request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpinionRequest {
    /// Correlation identifier, echoed in the response.
    pub message_id: String,
    /// Queue the response must be published to.
    pub routing_key: String,
    /// Question under discussion.
    pub query: String,
    /// Respondent nickname mapped to that respondent's answer. An empty
    /// mapping is valid and yields a fixed fallback opinion.
    #[serde(default)]
    pub options: OptionMap,
}

/// Response to an [`AskRequest`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AskResponse {
    /// Correlation identifier copied from the request.
    pub message_id: String,
    /// Generated reply text.
    pub response: String,
}

/// Response to a [`ScoreRequest`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreResponse {
    /// Correlation identifier copied from the request.
    pub message_id: String,
    /// Candidate indices ordered best to worst.
    pub sorted_answer_indexes: Vec<usize>,
}

/// Response to an [`OpinionRequest`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpinionResponse {
    /// Correlation identifier copied from the request.
    pub message_id: String,
    /// Synthesized opinion text.
    pub opinion: String,
}

/// Nickname-to-answer mapping with wire insertion order preserved.
///
/// Ranked answer indices refer to the order in which pairs appear on the
/// wire, so the usual hash-map deserialization (which forgets order) would
/// silently corrupt discussion handling.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptionMap(Vec<(String, String)>);

impl OptionMap {
    /// Number of options.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the mapping is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The `(nickname, answer)` pair at `index`, in wire order.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<(&str, &str)> {
        self.0
            .get(index)
            .map(|(nick, answer)| (nick.as_str(), answer.as_str()))
    }

    /// The answers, in wire order.
    #[must_use]
    pub fn answers(&self) -> Vec<String> {
        self.0.iter().map(|(_, answer)| answer.clone()).collect()
    }
}

impl FromIterator<(String, String)> for OptionMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for OptionMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (nick, answer) in &self.0 {
            map.serialize_entry(nick, answer)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for OptionMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OptionMapVisitor;

        impl<'de> Visitor<'de> for OptionMapVisitor {
            type Value = OptionMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of nickname to answer strings")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry::<String, String>()? {
                    entries.push(entry);
                }
                Ok(OptionMap(entries))
            }
        }

        deserializer.deserialize_map(OptionMapVisitor)
    }
}
