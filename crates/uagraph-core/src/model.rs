// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared model handle: single writer, many readers.
//!
//! [`Model`] wraps an [`AddressSpace`] in an `RwLock`. Every mutation runs to
//! completion under the write lock, so readers see either the state before or
//! after it, never an intermediate one. Change events are published before
//! the lock is released, so subscribers see them in commit order; publishing
//! only queues on channels and never waits on a subscriber.
use std::ops::{Deref, DerefMut};
use std::sync::{RwLock, RwLockWriteGuard, TryLockError};

use tracing::{debug, instrument};

use crate::error::GraphError;
use crate::ident::NodeId;
use crate::import::{ImportBatch, ImportReport};
use crate::namespace::DependencyReport;
use crate::notify::{ChangeFeed, Subscription};
use crate::query::OpcNode;
use crate::reconcile::{OnlineBrowse, OnlineRead, ReconcileReport};
use crate::record::{NodeRecord, OpcReference};
use crate::settings::ModelSettings;
use crate::snapshot::{ExportOptions, ModelSnapshot};
use crate::space::{AddNodeParams, AddressSpace, DeleteReport};

/// Thread-safe handle around one address space and its change feed.
#[derive(Debug, Default)]
pub struct Model {
    space: RwLock<AddressSpace>,
    feed: ChangeFeed,
}

/// A private copy of the address space for multi-step edits.
///
/// Dereferences to [`AddressSpace`]; every mutation on it is invisible to
/// other threads until [`Model::transaction`] commits.
#[derive(Debug)]
pub struct Transaction {
    space: AddressSpace,
    base_generation: u64,
}

impl Transaction {
    /// Generation of the committed space this transaction started from.
    pub fn base_generation(&self) -> u64 {
        self.base_generation
    }

    /// Locks `uri`, refusing while this transaction holds uncommitted edits
    /// to nodes of that namespace.
    pub fn lock_namespace(&mut self, uri: &str) -> Result<(), GraphError> {
        let index = self.space.namespaces.require(uri)?;
        let busy = self
            .space
            .touched
            .iter()
            .any(|(id, &generation)| id.namespace == index && generation > self.base_generation);
        if busy {
            return Err(GraphError::NamespaceBusy(uri.to_owned()));
        }
        self.space.lock_namespace(uri)
    }
}

impl Deref for Transaction {
    type Target = AddressSpace;

    fn deref(&self) -> &AddressSpace {
        &self.space
    }
}

impl DerefMut for Transaction {
    fn deref_mut(&mut self) -> &mut AddressSpace {
        &mut self.space
    }
}

impl Model {
    /// Model with a fresh address space.
    pub fn new() -> Self {
        Self::default()
    }

    /// Model with a fresh address space using `settings`.
    pub fn with_settings(settings: ModelSettings) -> Self {
        Self::from_space(AddressSpace::with_settings(settings))
    }

    /// Wraps an existing address space.
    pub fn from_space(space: AddressSpace) -> Self {
        Self {
            space: RwLock::new(space),
            feed: ChangeFeed::new(),
        }
    }

    /// Consumes the handle and returns the address space.
    pub fn into_space(self) -> Result<AddressSpace, GraphError> {
        self.space.into_inner().map_err(|_| GraphError::Poisoned)
    }

    /// The change feed.
    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    /// Shorthand for `feed().subscribe()`.
    pub fn subscribe(&self) -> Subscription {
        self.feed.subscribe()
    }

    /// Runs a query under the read lock.
    pub fn read<T>(&self, f: impl FnOnce(&AddressSpace) -> T) -> Result<T, GraphError> {
        let guard = self.space.read().map_err(|_| GraphError::Poisoned)?;
        Ok(f(&guard))
    }

    /// Runs a mutation under the write lock, waiting for other writers.
    ///
    /// `f` may chain several edits; if it fails, every edit it made is
    /// rolled back. Costs one clone of the space (O(total nodes)).
    pub fn write<T>(
        &self,
        f: impl FnOnce(&mut AddressSpace) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        let guard = self.lock(true)?;
        self.commit(guard, f)
    }

    /// Like [`Model::write`] but fails with `WriterBusy` instead of waiting.
    pub fn try_write<T>(
        &self,
        f: impl FnOnce(&mut AddressSpace) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        let guard = self.lock(false)?;
        self.commit(guard, f)
    }

    /// Stages `f` on a private copy and swaps it in only if `f` succeeds.
    ///
    /// Holds the write lock for the whole call and costs one clone of the
    /// space (O(total nodes)).
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&mut Transaction) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        let guard = self.lock(true)?;
        self.run_transaction(guard, f)
    }

    /// Like [`Model::transaction`] but fails with `WriterBusy` instead of waiting.
    pub fn try_transaction<T>(
        &self,
        f: impl FnOnce(&mut Transaction) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        let guard = self.lock(false)?;
        self.run_transaction(guard, f)
    }

    fn lock(&self, wait: bool) -> Result<RwLockWriteGuard<'_, AddressSpace>, GraphError> {
        if wait {
            return self.space.write().map_err(|_| GraphError::Poisoned);
        }
        match self.space.try_write() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::WouldBlock) => Err(GraphError::WriterBusy),
            Err(TryLockError::Poisoned(_)) => Err(GraphError::Poisoned),
        }
    }

    fn commit<T>(
        &self,
        mut guard: RwLockWriteGuard<'_, AddressSpace>,
        f: impl FnOnce(&mut AddressSpace) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        let backup = guard.clone();
        match f(&mut guard) {
            Ok(value) => {
                self.publish(&mut guard);
                Ok(value)
            }
            Err(err) => {
                debug!(%err, "write rolled back");
                *guard = backup;
                Err(err)
            }
        }
    }

    /// Runs one `AddressSpace` operation. Each of those is already
    /// all-or-nothing, so no backup is taken.
    fn apply<T>(
        &self,
        f: impl FnOnce(&mut AddressSpace) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        let mut guard = self.lock(true)?;
        let result = f(&mut guard);
        if result.is_ok() {
            self.publish(&mut guard);
        } else {
            guard.take_journal();
        }
        result
    }

    fn run_transaction<T>(
        &self,
        mut guard: RwLockWriteGuard<'_, AddressSpace>,
        f: impl FnOnce(&mut Transaction) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        let mut tx = Transaction {
            base_generation: guard.generation,
            space: guard.clone(),
        };
        let value = f(&mut tx).inspect_err(|err| debug!(%err, "transaction rolled back"))?;
        *guard = tx.space;
        self.publish(&mut guard);
        Ok(value)
    }

    /// Drains the journal onto the feed, stamped with the committed
    /// generation. Called with the write lock held.
    fn publish(&self, space: &mut AddressSpace) {
        let generation = space.generation;
        for mut event in space.take_journal() {
            event.generation = generation;
            self.feed.publish(event);
        }
    }

    /// See [`AddressSpace::create_namespace`].
    #[instrument(skip(self))]
    pub fn create_namespace(&self, uri: &str, version: &str) -> Result<u16, GraphError> {
        self.apply(|s| s.create_namespace(uri, version))
    }

    /// See [`AddressSpace::create_implicit_namespace`].
    #[instrument(skip(self))]
    pub fn create_implicit_namespace(&self, uri: &str) -> Result<u16, GraphError> {
        self.apply(|s| s.create_implicit_namespace(uri))
    }

    /// See [`AddressSpace::lock_namespace`].
    #[instrument(skip(self))]
    pub fn lock_namespace(&self, uri: &str) -> Result<(), GraphError> {
        self.apply(|s| s.lock_namespace(uri))
    }

    /// See [`AddressSpace::unlock_namespace`].
    #[instrument(skip(self))]
    pub fn unlock_namespace(&self, uri: &str) -> Result<(), GraphError> {
        self.apply(|s| s.unlock_namespace(uri))
    }

    /// See [`AddressSpace::reorder_namespaces`].
    #[instrument(skip(self))]
    pub fn reorder_namespaces(&self, order: &[String]) -> Result<(), GraphError> {
        self.apply(|s| s.reorder_namespaces(order))
    }

    /// See [`AddressSpace::remove_namespace`].
    #[instrument(skip(self))]
    pub fn remove_namespace(&self, uri: &str) -> Result<(), GraphError> {
        self.apply(|s| s.remove_namespace(uri))
    }

    /// See [`AddressSpace::create_node`].
    #[instrument(skip(self))]
    pub fn create_node(&self, parent: &NodeId, params: AddNodeParams) -> Result<NodeId, GraphError> {
        self.apply(|s| s.create_node(parent, params))
    }

    /// See [`AddressSpace::delete_node`].
    #[instrument(skip(self))]
    pub fn delete_node(&self, id: &NodeId) -> Result<DeleteReport, GraphError> {
        self.apply(|s| s.delete_node(id))
    }

    /// See [`AddressSpace::move_node`].
    #[instrument(skip(self))]
    pub fn move_node(&self, node: &NodeId, from: &NodeId, to: &NodeId) -> Result<(), GraphError> {
        self.apply(|s| s.move_node(node, from, to))
    }

    /// See [`AddressSpace::add_reference`].
    #[instrument(skip(self))]
    pub fn add_reference(
        &self,
        source: &NodeId,
        target: &NodeId,
        reference_type: &NodeId,
        is_forward: bool,
    ) -> Result<OpcReference, GraphError> {
        self.apply(|s| s.add_reference(source, target, reference_type, is_forward))
    }

    /// See [`AddressSpace::remove_reference`].
    #[instrument(skip(self))]
    pub fn remove_reference(
        &self,
        source: &NodeId,
        target: &NodeId,
        reference_type: &NodeId,
    ) -> Result<DeleteReport, GraphError> {
        self.apply(|s| s.remove_reference(source, target, reference_type))
    }

    /// See [`AddressSpace::set_references`].
    #[instrument(skip(self))]
    pub fn set_references(&self) -> Result<(), GraphError> {
        self.apply(|s| {
            s.set_references();
            Ok(())
        })
    }

    /// See [`AddressSpace::activate_type_reference`].
    #[instrument(skip(self))]
    pub fn activate_type_reference(
        &self,
        source: &NodeId,
        browse_name: &str,
        reference_type: Option<&NodeId>,
    ) -> Result<bool, GraphError> {
        self.apply(|s| s.activate_type_reference(source, browse_name, reference_type))
    }

    /// See [`AddressSpace::import`].
    #[instrument(skip(self, batch), fields(nodes = batch.nodes.len()))]
    pub fn import(&self, batch: ImportBatch) -> Result<ImportReport, GraphError> {
        self.apply(|s| s.import(batch))
    }

    /// See [`AddressSpace::update_namespace_zero`].
    #[instrument(skip(self, batch), fields(nodes = batch.nodes.len()))]
    pub fn update_namespace_zero(&self, batch: ImportBatch) -> Result<ImportReport, GraphError> {
        self.apply(|s| s.update_namespace_zero(batch))
    }

    /// Takes an export snapshot under the read lock.
    #[instrument(skip(self))]
    pub fn snapshot(&self, options: &ExportOptions) -> Result<ModelSnapshot, GraphError> {
        self.read(|s| s.snapshot(options))?
    }

    /// See [`AddressSpace::reconcile`].
    #[instrument(skip(self, reads, browses), fields(reads = reads.len(), browses = browses.len()))]
    pub fn reconcile(
        &self,
        server_namespaces: &[String],
        reads: &[OnlineRead],
        browses: &[OnlineBrowse],
    ) -> Result<ReconcileReport, GraphError> {
        self.read(|s| s.reconcile(server_namespaces, reads, browses))
    }

    /// Copy of one node record.
    pub fn node(&self, id: &NodeId) -> Result<NodeRecord, GraphError> {
        self.read(|s| s.node(id).cloned())?
    }

    /// See [`AddressSpace::opc_node`].
    pub fn opc_node(&self, id: &NodeId) -> Result<OpcNode, GraphError> {
        self.read(|s| s.opc_node(id))?
    }

    /// See [`AddressSpace::children`].
    pub fn children(&self, id: &NodeId) -> Result<Vec<NodeId>, GraphError> {
        self.read(|s| s.children(id))?
    }

    /// See [`AddressSpace::search_node`].
    #[instrument(skip(self))]
    pub fn search_node(&self, parent: &NodeId, term: &str) -> Result<NodeId, GraphError> {
        self.read(|s| s.search_node(parent, term))?
    }

    /// See [`AddressSpace::is_descendant_from`].
    pub fn is_descendant_from(&self, child: &NodeId, ancestor: &NodeId) -> Result<bool, GraphError> {
        self.read(|s| s.is_descendant_from(child, ancestor))?
    }

    /// See [`AddressSpace::active_type_references`].
    pub fn active_type_references(&self, id: &NodeId) -> Result<Vec<OpcReference>, GraphError> {
        self.read(|s| s.active_type_references(id))?
    }

    /// See [`AddressSpace::check_dependencies`].
    pub fn check_dependencies(&self) -> Result<DependencyReport, GraphError> {
        self.read(AddressSpace::check_dependencies)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::notify::NamespaceChangeType;
    use crate::standard::ids;

    #[test]
    fn failed_writes_publish_nothing() {
        let model = Model::new();
        let sub = model.subscribe();
        assert!(model.lock_namespace("urn:missing").is_err());
        assert!(sub.try_next().is_none());
        model.create_namespace("urn:a", "1").unwrap();
        let event = sub.try_next().unwrap();
        assert_eq!(event.change_type, NamespaceChangeType::Added);
    }

    #[test]
    fn try_write_reports_busy_while_a_writer_holds_the_lock() {
        let model = Model::new();
        let guard = model.lock(true).unwrap();
        assert_eq!(model.try_write(|_| Ok(())), Err(GraphError::WriterBusy));
        drop(guard);
        assert_eq!(model.try_write(|_| Ok(())), Ok(()));
    }

    #[test]
    fn transaction_locking_a_touched_namespace_is_busy() {
        let model = Model::new();
        let ns = model.create_namespace("urn:a", "1").unwrap();
        let err = model
            .transaction(|tx| {
                tx.create_node(&ids::OBJECTS_FOLDER, AddNodeParams::object("Pump", ns))?;
                tx.lock_namespace("urn:a")
            })
            .unwrap_err();
        assert_eq!(err, GraphError::NamespaceBusy("urn:a".into()));
        assert_eq!(model.read(|s| s.count_nodes("urn:a")).unwrap(), Ok(0));

        model.transaction(|tx| tx.lock_namespace("urn:a")).unwrap();
        assert!(model.read(|s| !s.writable(ns)).unwrap());
    }
}
