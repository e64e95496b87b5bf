// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use alloc::collections::btree_map::{BTreeMap, Entry};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use log::debug;
use spin::mutex::SpinMutex;

use crate::configfs::{GroupOperations, ItemOperations};
use crate::item::OverlayItem;
use crate::tree::OverlayTree;
use crate::{Error, Result};

/// The group in which overlay items are created, one per name.
pub struct OverlayGroup<T: OverlayTree> {
    tree: Arc<T>,
    read_limit: usize,
    items: SpinMutex<BTreeMap<String, Arc<OverlayItem<T>>>>,
}

impl<T: OverlayTree> OverlayGroup<T> {
    /// Creates an empty group whose items attach overlays to `tree`.
    #[must_use]
    pub fn new(tree: Arc<T>, read_limit: usize) -> Self {
        Self {
            tree,
            read_limit,
            items: SpinMutex::new(BTreeMap::new()),
        }
    }

    /// Creates an unapplied item called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the name cannot be copied, or
    /// [`Error::AlreadyExists`] if an item with that name exists.
    pub fn create(&self, name: &str) -> Result<Arc<OverlayItem<T>>> {
        let key = try_copy(name)?;
        let item_name = try_copy(name)?;

        let mut items = self.items.lock();
        let Entry::Vacant(entry) = items.entry(key) else {
            return Err(Error::AlreadyExists);
        };
        let item = Arc::new(OverlayItem::new(item_name, self.tree.clone(), self.read_limit));
        entry.insert(item.clone());
        debug!("overlay {name}: created");
        Ok(item)
    }

    /// Releases the group's reference to the item called `name`. The item is
    /// torn down once every other reference is gone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no such item exists.
    pub fn remove(&self, name: &str) -> Result<()> {
        let item = self.items.lock().remove(name).ok_or(Error::NotFound)?;
        debug!("overlay {name}: dropped from group");
        drop(item);
        Ok(())
    }

    /// Returns the item called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<OverlayItem<T>>> {
        self.items.lock().get(name).cloned()
    }

    /// Returns the names of all items, in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.items.lock().keys().cloned().collect()
    }
}

fn try_copy(name: &str) -> Result<String> {
    let mut copy = String::new();
    copy.try_reserve_exact(name.len())
        .map_err(|_| Error::OutOfMemory)?;
    copy.push_str(name);
    Ok(copy)
}

impl<T: OverlayTree> fmt::Debug for OverlayGroup<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayGroup")
            .field("items", &self.names())
            .finish_non_exhaustive()
    }
}

impl<T: OverlayTree + 'static> GroupOperations for OverlayGroup<T> {
    fn make_item(&self, name: &str) -> Result<Arc<dyn ItemOperations>> {
        let item: Arc<dyn ItemOperations> = self.create(name)?;
        Ok(item)
    }

    fn drop_item(&self, name: &str) -> Result<()> {
        self.remove(name)
    }
}
