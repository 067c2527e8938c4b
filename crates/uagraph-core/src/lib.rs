// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! uagraph-core: in-memory OPC UA information-model graph engine.
//!
//! An [`AddressSpace`] holds typed nodes connected by typed, directed
//! references across versioned namespaces. Mutations validate fully before
//! they change anything; cascading operations (delete, move, reorder, import)
//! are all-or-nothing. [`Model`] adds single-writer/multi-reader locking,
//! staged transactions, and a change feed for observers.
//!
//! No operation here performs I/O. Encoding nodesets and talking to servers
//! belong to the host; it hands decoded data in through [`ImportBatch`] and
//! [`AddressSpace::reconcile`], and takes data out through [`ModelSnapshot`].
#![forbid(unsafe_code)]

mod attributes;
mod classify;
mod error;
mod graph;
mod ident;
mod import;
mod methods;
mod model;
mod namespace;
mod notify;
mod query;
mod reconcile;
mod record;
mod settings;
mod snapshot;
mod space;
/// Well-known namespace-zero identifiers and browse names.
pub mod standard;

// Re-exports for stable public API
/// Attribute ids, read values, and writes.
pub use attributes::{AttributeId, AttributeUpdate, AttributeValue};
/// Type-hierarchy classification of nodes.
pub use classify::SpecialNodeClasses;
/// Errors and their coarse categories.
pub use error::{ErrorKind, GraphError, ValidationIssue};
/// Identifier value types.
pub use ident::{
    ExpandedNodeId, Guid, IdParseError, Identifier, IdentifierType, LocalizedText, NodeId,
    QualifiedName,
};
/// Batch import of decoded model fragments.
pub use import::{issues_by_subject, ImportBatch, ImportNamespace, ImportReference, ImportReport};
/// Method argument editing.
pub use methods::ArgumentKind;
/// Locked model handle and transactions.
pub use model::{Model, Transaction};
/// Namespace table and dependency reports.
pub use namespace::{
    DependencyReport, Namespace, NamespaceAttribute, NamespaceDependencies, NamespaceTable,
    ProjectNode,
};
/// Change notification.
pub use notify::{ChangeFeed, NamespaceChange, NamespaceChangeType, Subscription};
/// Derived node view.
pub use query::OpcNode;
/// Online/offline comparison.
pub use reconcile::{Discrepancy, OnlineBrowse, OnlineRead, OnlineReference, ReconcileReport};
/// Node and reference records.
pub use record::{
    DataTypeDefinition, EnumField, MappingState, MethodArgument, ModellingRule, NodeClass,
    NodeRecord, OpcReference, ReferenceId, ReferenceKey, ReferenceRecord, StructureField, Value,
};
/// Engine settings.
pub use settings::ModelSettings;
/// Export snapshots.
pub use snapshot::{ExportOptions, ModelSnapshot, SnapshotDigest};
/// The address space and node creation parameters.
pub use space::{AddNodeParams, AddressSpace, DeleteReport, NodeClassSpec};
