//! Bundles of elements moving between nodes
//!
//! An [`UncommittedBundle`] is produced by an evaluator and only becomes
//! visible to consumers once the evaluation context commits it.

use chrono::{DateTime, Utc};
use conduit_core::{KeyedWorkItem, Result as CoreResult, StructuralKey, WindowedValue};
use std::sync::Arc;

/// Mutable bundle under construction
#[derive(Debug, Clone)]
pub struct UncommittedBundle {
    pcollection: Option<String>,
    key: Option<StructuralKey>,
    elements: Vec<WindowedValue>,
}

impl UncommittedBundle {
    fn new(pcollection: Option<String>, key: Option<StructuralKey>) -> Self {
        Self {
            pcollection,
            key,
            elements: Vec::new(),
        }
    }

    /// Target pcollection; `None` for root bundles
    pub fn pcollection(&self) -> Option<&str> {
        self.pcollection.as_deref()
    }

    pub fn key(&self) -> Option<&StructuralKey> {
        self.key.as_ref()
    }

    pub fn add(&mut self, element: WindowedValue) -> &mut Self {
        self.elements.push(element);
        self
    }

    pub fn extend(&mut self, elements: impl IntoIterator<Item = WindowedValue>) -> &mut Self {
        self.elements.extend(elements);
        self
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Freeze the bundle
    pub fn commit(self, now: DateTime<Utc>) -> CommittedBundle {
        CommittedBundle {
            inner: Arc::new(CommittedInner {
                pcollection: self.pcollection,
                key: self.key,
                elements: self.elements,
                committed_at: now,
            }),
        }
    }
}

#[derive(Debug)]
struct CommittedInner {
    pcollection: Option<String>,
    key: Option<StructuralKey>,
    elements: Vec<WindowedValue>,
    committed_at: DateTime<Utc>,
}

/// Immutable bundle; cheap to clone and share between consumers
#[derive(Debug, Clone)]
pub struct CommittedBundle {
    inner: Arc<CommittedInner>,
}

impl CommittedBundle {
    pub fn pcollection(&self) -> Option<&str> {
        self.inner.pcollection.as_deref()
    }

    pub fn key(&self) -> Option<&StructuralKey> {
        self.inner.key.as_ref()
    }

    pub fn elements(&self) -> &[WindowedValue] {
        &self.inner.elements
    }

    pub fn len(&self) -> usize {
        self.inner.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.elements.is_empty()
    }

    pub fn committed_at(&self) -> DateTime<Utc> {
        self.inner.committed_at
    }

    /// View a keyed bundle as the work item it carries.
    ///
    /// Returns `Ok(None)` for unkeyed bundles.
    pub fn keyed_work_item(&self) -> CoreResult<Option<KeyedWorkItem>> {
        match &self.inner.key {
            None => Ok(None),
            Some(key) => Ok(Some(KeyedWorkItem {
                key: key.value()?,
                elements: self.inner.elements.clone(),
            })),
        }
    }
}

/// Creates the bundles evaluators write into
pub trait BundleFactory: Send + Sync {
    /// Bundle handed to a root node before anything else runs
    fn create_root_bundle(&self) -> UncommittedBundle;

    fn create_bundle(&self, pcollection: &str) -> UncommittedBundle;

    fn create_keyed_bundle(&self, key: StructuralKey, pcollection: &str) -> UncommittedBundle;
}

/// Bundle factory backed by plain element lists
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmutableListBundleFactory;

impl ImmutableListBundleFactory {
    pub fn create() -> Self {
        Self
    }
}

impl BundleFactory for ImmutableListBundleFactory {
    fn create_root_bundle(&self) -> UncommittedBundle {
        UncommittedBundle::new(None, None)
    }

    fn create_bundle(&self, pcollection: &str) -> UncommittedBundle {
        UncommittedBundle::new(Some(pcollection.to_string()), None)
    }

    fn create_keyed_bundle(&self, key: StructuralKey, pcollection: &str) -> UncommittedBundle {
        UncommittedBundle::new(Some(pcollection.to_string()), Some(key))
    }
}
