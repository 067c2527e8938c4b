// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error types for graph queries and mutations.
//!
//! Every [`GraphError`] maps onto exactly one [`ErrorKind`] so hosts can branch
//! on the coarse category without matching every variant.
use thiserror::Error;

use crate::ident::NodeId;

/// Coarse error category shared by every query and mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An identifier resolved to nothing.
    NotFound,
    /// A namespace, node, or reference with the same identity already exists.
    AlreadyExists,
    /// The target is in a state that forbids the operation (locked, stale).
    InvalidState,
    /// The mutation would close a hierarchical cycle.
    CycleDetected,
    /// A creation request or import batch is malformed.
    ValidationFailed,
    /// Another mutation is in flight, or a required pass has not run yet.
    Busy,
}

/// One problem found while validating external input.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ValidationIssue {
    /// What the issue is about (a NodeId, namespace URI, or reference triple).
    pub subject: String,
    /// Human-readable description.
    pub message: String,
}

impl ValidationIssue {
    /// Builds an issue from any displayable subject.
    pub fn new(subject: impl ToString, message: impl Into<String>) -> Self {
        Self {
            subject: subject.to_string(),
            message: message.into(),
        }
    }
}

impl core::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.subject, self.message)
    }
}

/// Error returned by address-space queries and mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// No node with this id exists.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),
    /// No namespace with this URI exists.
    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),
    /// No namespace occupies this index.
    #[error("namespace index not found: {0}")]
    NamespaceIndexNotFound(u16),
    /// No reference matches the given triple.
    #[error("reference not found: {from} -[{reference_type}]-> {to}")]
    ReferenceNotFound {
        /// Source node.
        from: NodeId,
        /// Target node.
        to: NodeId,
        /// Reference type.
        reference_type: NodeId,
    },
    /// A search found no node with the requested browse name.
    #[error("no node named {term} below {parent}")]
    BrowseNameNotFound {
        /// Subtree root of the search.
        parent: NodeId,
        /// The search term as supplied.
        term: String,
    },
    /// A named method argument or structure field does not exist.
    #[error("{owner} has no member named {name}")]
    MemberNotFound {
        /// Method or data type node.
        owner: NodeId,
        /// Requested member name.
        name: String,
    },
    /// A node with this id already exists.
    #[error("node already exists: {0}")]
    NodeExists(NodeId),
    /// A namespace with this URI already exists.
    #[error("namespace already exists: {0}")]
    NamespaceExists(String),
    /// An identical (source, target, type) reference already exists.
    #[error("duplicate reference: {from} -[{reference_type}]-> {to}")]
    DuplicateReference {
        /// Source node.
        from: NodeId,
        /// Target node.
        to: NodeId,
        /// Reference type.
        reference_type: NodeId,
    },
    /// A method argument or structure field with this name already exists.
    #[error("{owner} already has a member named {name}")]
    MemberExists {
        /// Method or data type node.
        owner: NodeId,
        /// Conflicting member name.
        name: String,
    },
    /// The namespace is locked against edits.
    #[error("namespace is locked: {0}")]
    NamespaceLocked(String),
    /// Namespace zero only changes through `update_namespace_zero`.
    #[error("namespace zero is immutable")]
    NamespaceZeroImmutable,
    /// The namespace still holds nodes and cannot be removed.
    #[error("namespace still contains {count} nodes: {uri}")]
    NamespaceNotEmpty {
        /// Namespace URI.
        uri: String,
        /// Remaining node count.
        count: usize,
    },
    /// A type, data type, or reference type is still in use and cannot be
    /// deleted.
    #[error("{node} is still used by {used_by}")]
    InUse {
        /// Node that would be deleted.
        node: NodeId,
        /// What still depends on it.
        used_by: String,
    },
    /// The type-reference classification of this node is stale.
    #[error("type references of {0} are stale; run set_references first")]
    StaleClassification(NodeId),
    /// The lock state could not be read because a writer panicked.
    #[error("address space lock poisoned")]
    Poisoned,
    /// The mutation would make a node its own hierarchical ancestor.
    #[error("hierarchical cycle: {child} is an ancestor of {parent}")]
    CycleDetected {
        /// Prospective parent.
        parent: NodeId,
        /// Prospective child.
        child: NodeId,
    },
    /// A creation request or argument is malformed.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The attribute does not apply to this node class, or is read-only.
    #[error("attribute {attribute} not supported on {node}")]
    AttributeNotSupported {
        /// Node being read or written.
        node: NodeId,
        /// Attribute name.
        attribute: &'static str,
    },
    /// An import batch failed validation; nothing was applied.
    #[error("import rejected with {} issue(s)", .0.len())]
    ImportRejected(Vec<ValidationIssue>),
    /// A snapshot could not be encoded.
    #[error("snapshot encoding failed: {0}")]
    Encode(String),
    /// Another mutation currently holds the address space.
    #[error("another mutation is in flight")]
    WriterBusy,
    /// The namespace has uncommitted edits in the open transaction.
    #[error("namespace has in-flight mutations: {0}")]
    NamespaceBusy(String),
    /// `set_references` has never run on this address space.
    #[error("reference classification has not run yet")]
    ClassificationPending,
}

impl GraphError {
    /// Returns the coarse category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NodeNotFound(_)
            | Self::NamespaceNotFound(_)
            | Self::NamespaceIndexNotFound(_)
            | Self::ReferenceNotFound { .. }
            | Self::BrowseNameNotFound { .. }
            | Self::MemberNotFound { .. } => ErrorKind::NotFound,
            Self::NodeExists(_)
            | Self::NamespaceExists(_)
            | Self::DuplicateReference { .. }
            | Self::MemberExists { .. } => ErrorKind::AlreadyExists,
            Self::NamespaceLocked(_)
            | Self::NamespaceZeroImmutable
            | Self::NamespaceNotEmpty { .. }
            | Self::InUse { .. }
            | Self::StaleClassification(_)
            | Self::Poisoned => ErrorKind::InvalidState,
            Self::CycleDetected { .. } => ErrorKind::CycleDetected,
            Self::Validation(_)
            | Self::AttributeNotSupported { .. }
            | Self::ImportRejected(_)
            | Self::Encode(_) => ErrorKind::ValidationFailed,
            Self::WriterBusy | Self::NamespaceBusy(_) | Self::ClassificationPending => {
                ErrorKind::Busy
            }
        }
    }

    /// Shorthand for [`GraphError::Validation`].
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
