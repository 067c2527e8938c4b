// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! OPC UA identifier value types: `NodeId`, `ExpandedNodeId`, `QualifiedName`,
//! `LocalizedText`.
//!
//! These are pure values. Ordering is total so ids can key ordered maps:
//! `NodeId` orders by `(namespace, identifier type, value)`.
use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when parsing the text form of an identifier fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    /// The text does not follow the `ns=<idx>;<type>=<value>` grammar.
    #[error("malformed node id: {0}")]
    MalformedNodeId(String),
    /// A GUID identifier is not 32 hex digits.
    #[error("malformed guid: {0}")]
    MalformedGuid(String),
    /// A qualified name carries an unparsable namespace prefix.
    #[error("malformed qualified name: {0}")]
    MalformedQualifiedName(String),
}

/// Kind of identifier carried by a [`NodeId`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum IdentifierType {
    /// 32-bit unsigned integer.
    Numeric,
    /// Free-form string.
    String,
    /// 16-byte GUID.
    Guid,
    /// Opaque byte string.
    Opaque,
}

/// 16-byte GUID in OPC UA field order.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Guid(pub [u8; 16]);

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{}-{}-{}-{}-{}",
            hex::encode(&b[0..4]),
            hex::encode(&b[4..6]),
            hex::encode(&b[6..8]),
            hex::encode(&b[8..10]),
            hex::encode(&b[10..16])
        )
    }
}

impl FromStr for Guid {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.chars().filter(|c| *c != '-').collect();
        let bytes = hex::decode(&digits).map_err(|_| IdParseError::MalformedGuid(s.into()))?;
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| IdParseError::MalformedGuid(s.into()))?;
        Ok(Self(arr))
    }
}

/// Identifier value of a [`NodeId`].
///
/// Variant order doubles as the identifier-type order used by `Ord`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Identifier {
    /// Numeric identifier (`i=`).
    Numeric(u32),
    /// String identifier (`s=`).
    String(String),
    /// GUID identifier (`g=`).
    Guid(Guid),
    /// Opaque identifier (`b=`, rendered as hex).
    Opaque(Vec<u8>),
}

impl Identifier {
    /// Returns the identifier kind.
    pub fn kind(&self) -> IdentifierType {
        match self {
            Self::Numeric(_) => IdentifierType::Numeric,
            Self::String(_) => IdentifierType::String,
            Self::Guid(_) => IdentifierType::Guid,
            Self::Opaque(_) => IdentifierType::Opaque,
        }
    }
}

/// Identity of a node within one server's address space.
///
/// Equality is structural. The identifier is stable for the node's lifetime;
/// only `namespace` is rewritten when the namespace table is reordered.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct NodeId {
    /// Index into the namespace table.
    pub namespace: u16,
    /// Identifier value within that namespace.
    pub identifier: Identifier,
}

impl NodeId {
    /// Numeric id in namespace zero (usable in `const` tables).
    pub const fn ns0(value: u32) -> Self {
        Self {
            namespace: 0,
            identifier: Identifier::Numeric(value),
        }
    }

    /// Numeric id.
    pub const fn numeric(namespace: u16, value: u32) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(value),
        }
    }

    /// String id.
    pub fn string(namespace: u16, value: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(value.into()),
        }
    }

    /// GUID id.
    pub const fn guid(namespace: u16, value: Guid) -> Self {
        Self {
            namespace,
            identifier: Identifier::Guid(value),
        }
    }

    /// Opaque id.
    pub fn opaque(namespace: u16, value: impl Into<Vec<u8>>) -> Self {
        Self {
            namespace,
            identifier: Identifier::Opaque(value.into()),
        }
    }

    /// The null node id (`i=0`).
    pub const fn null() -> Self {
        Self::ns0(0)
    }

    /// Returns `true` for the null node id.
    pub fn is_null(&self) -> bool {
        self.namespace == 0 && self.identifier == Identifier::Numeric(0)
    }

    /// Returns the identifier kind.
    pub fn identifier_type(&self) -> IdentifierType {
        self.identifier.kind()
    }

    /// Returns a copy of this id moved into `namespace`.
    pub fn with_namespace(&self, namespace: u16) -> Self {
        Self {
            namespace,
            identifier: self.identifier.clone(),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace != 0 {
            write!(f, "ns={};", self.namespace)?;
        }
        match &self.identifier {
            Identifier::Numeric(v) => write!(f, "i={v}"),
            Identifier::String(v) => write!(f, "s={v}"),
            Identifier::Guid(v) => write!(f, "g={v}"),
            Identifier::Opaque(v) => write!(f, "b={}", hex::encode(v)),
        }
    }
}

impl FromStr for NodeId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || IdParseError::MalformedNodeId(s.into());
        let trimmed = s.trim();
        let (namespace, rest) = match trimmed.strip_prefix("ns=") {
            Some(tail) => {
                let (idx, rest) = tail.split_once(';').ok_or_else(malformed)?;
                (idx.parse::<u16>().map_err(|_| malformed())?, rest)
            }
            None => (0, trimmed),
        };
        let (kind, value) = rest.split_once('=').ok_or_else(malformed)?;
        let identifier = match kind {
            "i" => Identifier::Numeric(value.parse().map_err(|_| malformed())?),
            "s" => Identifier::String(value.to_owned()),
            "g" => Identifier::Guid(value.parse()?),
            "b" => Identifier::Opaque(hex::decode(value).map_err(|_| malformed())?),
            _ => return Err(malformed()),
        };
        Ok(Self {
            namespace,
            identifier,
        })
    }
}

/// A [`NodeId`] that may name its namespace by URI and live on another server.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct ExpandedNodeId {
    /// Underlying node id; its namespace index is ignored when a URI is set.
    pub node_id: NodeId,
    /// Namespace URI overriding `node_id.namespace` when present.
    pub namespace_uri: Option<String>,
    /// Server index; zero is the local server.
    pub server_index: u32,
}

impl ExpandedNodeId {
    /// Wraps a local node id.
    pub fn local(node_id: NodeId) -> Self {
        Self {
            node_id,
            namespace_uri: None,
            server_index: 0,
        }
    }

    /// Returns `true` when the id refers to the local server.
    pub fn is_local(&self) -> bool {
        self.server_index == 0
    }
}

impl From<NodeId> for ExpandedNodeId {
    fn from(node_id: NodeId) -> Self {
        Self::local(node_id)
    }
}

impl fmt::Display for ExpandedNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.server_index != 0 {
            write!(f, "svr={};", self.server_index)?;
        }
        match &self.namespace_uri {
            Some(uri) => write!(f, "nsu={uri};{}", self.node_id.with_namespace(0)),
            None => write!(f, "{}", self.node_id),
        }
    }
}

/// Browse name: a name qualified by a namespace index.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Namespace index of the name.
    pub namespace_index: u16,
    /// Unqualified name.
    pub name: String,
}

impl QualifiedName {
    /// Builds a qualified name.
    pub fn new(namespace_index: u16, name: impl Into<String>) -> Self {
        Self {
            namespace_index,
            name: name.into(),
        }
    }

    /// Splits `"<ns>:<name>"` into its parts; a bare `"<name>"` yields `None`.
    ///
    /// A prefix that is not a valid `u16` is treated as part of the name, so
    /// `"urn:x"` stays a bare name.
    pub fn split_term(term: &str) -> (Option<u16>, &str) {
        match term.split_once(':') {
            Some((prefix, name)) => match prefix.parse::<u16>() {
                Ok(idx) => (Some(idx), name),
                Err(_) => (None, term),
            },
            None => (None, term),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_index == 0 {
            f.write_str(&self.name)
        } else {
            write!(f, "{}:{}", self.namespace_index, self.name)
        }
    }
}

impl FromStr for QualifiedName {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (idx, name) = Self::split_term(s);
        if name.is_empty() {
            return Err(IdParseError::MalformedQualifiedName(s.into()));
        }
        Ok(Self::new(idx.unwrap_or(0), name))
    }
}

/// Text with an optional locale (`"en;Pump"` in text form).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize)]
pub struct LocalizedText {
    /// Locale id such as `en` or `de-DE`.
    pub locale: Option<String>,
    /// The text.
    pub text: String,
}

impl LocalizedText {
    /// Builds text with a locale.
    pub fn new(locale: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            locale: Some(locale.into()),
            text: text.into(),
        }
    }

    /// Builds text without a locale.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            locale: None,
            text: text.into(),
        }
    }
}

impl fmt::Display for LocalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.locale {
            Some(locale) => write!(f, "{locale};{}", self.text),
            None => f.write_str(&self.text),
        }
    }
}

impl FromStr for LocalizedText {
    type Err = core::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.split_once(';') {
            Some((locale, text)) if !locale.is_empty() && !locale.contains(' ') => {
                Self::new(locale, text)
            }
            Some(("", text)) => Self::plain(text),
            _ => Self::plain(s),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn node_id_text_form_round_trips() {
        for text in [
            "i=85",
            "ns=2;i=5001",
            "ns=1;s=Pump.Speed",
            "ns=3;g=72962b91-fa75-4ae6-8d28-b404dc7daf63",
            "ns=4;b=deadbeef",
        ] {
            let id: NodeId = text.parse().unwrap();
            assert_eq!(id.to_string(), text);
        }
    }

    #[test]
    fn node_id_rejects_garbage() {
        assert!("ns=x;i=1".parse::<NodeId>().is_err());
        assert!("q=1".parse::<NodeId>().is_err());
        assert!("ns=1;i=notanumber".parse::<NodeId>().is_err());
        assert!("ns=1;g=1234".parse::<NodeId>().is_err());
    }

    #[test]
    fn ordering_is_namespace_then_type_then_value() {
        let mut ids = vec![
            NodeId::string(1, "a"),
            NodeId::numeric(2, 1),
            NodeId::numeric(1, 9),
            NodeId::numeric(1, 3),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                NodeId::numeric(1, 3),
                NodeId::numeric(1, 9),
                NodeId::string(1, "a"),
                NodeId::numeric(2, 1),
            ]
        );
    }

    #[test]
    fn qualified_name_terms() {
        assert_eq!(QualifiedName::split_term("1:Foo"), (Some(1), "Foo"));
        assert_eq!(QualifiedName::split_term("Foo"), (None, "Foo"));
        assert_eq!(QualifiedName::split_term("urn:x"), (None, "urn:x"));
        let q: QualifiedName = "Foo".parse().unwrap();
        assert_eq!(q, QualifiedName::new(0, "Foo"));
        assert!("2:".parse::<QualifiedName>().is_err());
    }

    #[test]
    fn localized_text_parses_locale_prefix() {
        let t: LocalizedText = "en;Pump".parse().unwrap();
        assert_eq!(t, LocalizedText::new("en", "Pump"));
        let t: LocalizedText = "Pump speed; rpm".parse().unwrap();
        assert_eq!(t, LocalizedText::plain("Pump speed; rpm"));
    }

    #[test]
    fn expanded_node_id_prefers_uri_in_text_form() {
        let id = ExpandedNodeId {
            node_id: NodeId::numeric(3, 7),
            namespace_uri: Some("urn:demo".into()),
            server_index: 0,
        };
        assert_eq!(id.to_string(), "nsu=urn:demo;i=7");
        assert!(id.is_local());
    }
}
