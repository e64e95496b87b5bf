// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The dispatch host: a tree of groups and items addressed by slash-separated
//! paths, in the manner of configfs.
//!
//! Groups decide whether items may be created in them ([`GroupOperations`]);
//! items expose named attributes that can be read and written
//! ([`ItemOperations`]). [`Configfs`] is an in-memory host that routes
//! `mkdir`, `rmdir`, `read`, `write` and `list` requests to them.

use alloc::collections::btree_map::{BTreeMap, Entry};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use spin::mutex::SpinMutex;

use crate::{Error, Result};

/// How an attribute's content is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    /// Short text, read and written in full.
    Text,
    /// Opaque bytes, read and written as a single unit.
    Binary,
}

/// A named attribute of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute {
    /// File name of the attribute.
    pub name: &'static str,
    /// Whether the attribute is text or binary.
    pub kind: AttributeKind,
}

/// Operations of an item directory.
pub trait ItemOperations: Send + Sync {
    /// Returns the name of the item.
    fn name(&self) -> &str;

    /// Returns the attributes of the item.
    fn attributes(&self) -> &'static [Attribute];

    /// Reads `attribute` into `page` and returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the attribute is unknown or does
    /// not fit in `page`.
    fn show(&self, attribute: &str, page: &mut [u8]) -> Result<usize>;

    /// Writes `data` to `attribute` and returns the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the attribute is unknown, or the
    /// error of the write itself.
    fn store(&self, attribute: &str, data: &[u8]) -> Result<usize>;
}

/// Operations of a group directory.
///
/// Both operations default to [`Error::PermissionDenied`], so a group that
/// implements neither accepts no `mkdir` or `rmdir`.
pub trait GroupOperations: Send + Sync {
    /// Creates an item called `name` in this group.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] unless the group creates items.
    fn make_item(&self, name: &str) -> Result<Arc<dyn ItemOperations>> {
        let _ = name;
        Err(Error::PermissionDenied)
    }

    /// Releases the group's reference to the item called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] unless the group creates items.
    fn drop_item(&self, name: &str) -> Result<()> {
        let _ = name;
        Err(Error::PermissionDenied)
    }
}

/// Registers subsystems and their default groups with a dispatch host.
pub trait Registrar {
    /// Registers a root namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if the name is taken.
    fn register_subsystem(&self, name: &str, subsystem: Arc<dyn GroupOperations>) -> Result<()>;

    /// Unregisters a root namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if it is not registered, or [`Error::Busy`]
    /// if groups are still registered under it.
    fn unregister_subsystem(&self, name: &str) -> Result<()>;

    /// Registers a default group under the group at `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `parent` does not exist or
    /// [`Error::AlreadyExists`] if the name is taken.
    fn register_group(&self, parent: &str, name: &str, group: Arc<dyn GroupOperations>)
    -> Result<()>;

    /// Unregisters a default group, dropping every item still in it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the group does not exist.
    fn unregister_group(&self, parent: &str, name: &str) -> Result<()>;
}

impl<R: Registrar + ?Sized> Registrar for &R {
    fn register_subsystem(&self, name: &str, subsystem: Arc<dyn GroupOperations>) -> Result<()> {
        (**self).register_subsystem(name, subsystem)
    }

    fn unregister_subsystem(&self, name: &str) -> Result<()> {
        (**self).unregister_subsystem(name)
    }

    fn register_group(
        &self,
        parent: &str,
        name: &str,
        group: Arc<dyn GroupOperations>,
    ) -> Result<()> {
        (**self).register_group(parent, name, group)
    }

    fn unregister_group(&self, parent: &str, name: &str) -> Result<()> {
        (**self).unregister_group(parent, name)
    }
}

struct GroupNode {
    ops: Arc<dyn GroupOperations>,
    groups: BTreeMap<String, GroupNode>,
    items: BTreeMap<String, Arc<dyn ItemOperations>>,
}

impl GroupNode {
    fn new(ops: Arc<dyn GroupOperations>) -> Self {
        Self {
            ops,
            groups: BTreeMap::new(),
            items: BTreeMap::new(),
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.groups.contains_key(name) || self.items.contains_key(name)
    }

    /// Asks each group to drop its items, and moves the host's references to
    /// them into `out`.
    fn release_items(&mut self, out: &mut Vec<Arc<dyn ItemOperations>>) {
        for (name, item) in core::mem::take(&mut self.items) {
            if let Err(e) = self.ops.drop_item(&name) {
                log::warn!("failed to drop item {name}: {e}");
            }
            out.push(item);
        }
        for group in self.groups.values_mut() {
            group.release_items(out);
        }
    }
}

/// An in-memory dispatch host.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use dtoverlay::configfs::{Configfs, GroupOperations, Registrar};
/// use dtoverlay::Error;
///
/// struct ReadOnly;
/// impl GroupOperations for ReadOnly {}
///
/// let configfs = Configfs::new();
/// configfs.register_subsystem("device-tree", Arc::new(ReadOnly)).unwrap();
/// assert_eq!(configfs.mkdir("device-tree/foo"), Err(Error::PermissionDenied));
/// ```
pub struct Configfs {
    root: SpinMutex<BTreeMap<String, GroupNode>>,
}

impl Configfs {
    /// Creates a host with no subsystems.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            root: SpinMutex::new(BTreeMap::new()),
        }
    }

    /// Creates an item at `path`, asking the parent group to make it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the parent group does not exist,
    /// [`Error::AlreadyExists`] if the name is taken, or the group's error.
    pub fn mkdir(&self, path: &str) -> Result<()> {
        let (parent, name) = split_last(path)?;
        let mut root = self.root.lock();
        let group = find_group(&mut root, parent)?;
        if group.contains(name) {
            return Err(Error::AlreadyExists);
        }
        let item = group.ops.make_item(name)?;
        group.items.insert(String::from(name), item);
        Ok(())
    }

    /// Removes the item at `path`.
    ///
    /// The item itself is torn down once its last reference is dropped, which
    /// happens after the host has released its own lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if `path` is a default group, [`Error::NotFound`]
    /// if nothing exists there, or the group's error.
    pub fn rmdir(&self, path: &str) -> Result<()> {
        let (parent, name) = split_last(path)?;
        let removed = {
            let mut root = self.root.lock();
            if parent.is_empty() && root.contains_key(name) {
                return Err(Error::Busy);
            }
            let group = find_group(&mut root, parent)?;
            if group.groups.contains_key(name) {
                return Err(Error::Busy);
            }
            if !group.items.contains_key(name) {
                return Err(Error::NotFound);
            }
            group.ops.drop_item(name)?;
            group.items.remove(name)
        };
        drop(removed);
        Ok(())
    }

    /// Reads an attribute of the item at `path` into `page`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no item exists there, or the item's
    /// error.
    pub fn read(&self, path: &str, page: &mut [u8]) -> Result<usize> {
        let (item, attribute) = self.item_attribute(path)?;
        item.show(attribute, page)
    }

    /// Writes `data` to an attribute of the item at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no item exists there, or the item's
    /// error.
    pub fn write(&self, path: &str, data: &[u8]) -> Result<usize> {
        let (item, attribute) = self.item_attribute(path)?;
        item.store(attribute, data)
    }

    /// Lists the entries of the directory at `path`: subgroups and items of a
    /// group, or attributes of an item. An empty path lists the subsystems.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if nothing exists at `path`.
    pub fn list(&self, path: &str) -> Result<Vec<String>> {
        let mut root = self.root.lock();
        let path = path.trim_matches('/');
        if path.is_empty() {
            return Ok(root.keys().cloned().collect());
        }
        if let Ok(group) = find_group(&mut root, path) {
            return Ok(group
                .groups
                .keys()
                .chain(group.items.keys())
                .cloned()
                .collect());
        }
        let (parent, name) = split_last(path)?;
        let group = find_group(&mut root, parent)?;
        let item = group.items.get(name).ok_or(Error::NotFound)?;
        Ok(item
            .attributes()
            .iter()
            .map(|attribute| String::from(attribute.name))
            .collect())
    }

    fn item_attribute<'p>(&self, path: &'p str) -> Result<(Arc<dyn ItemOperations>, &'p str)> {
        let (item_path, attribute) = split_last(path)?;
        let (parent, name) = split_last(item_path)?;
        let mut root = self.root.lock();
        let group = find_group(&mut root, parent)?;
        let item = group.items.get(name).ok_or(Error::NotFound)?;
        Ok((item.clone(), attribute))
    }
}

impl Default for Configfs {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Configfs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configfs")
            .field("subsystems", &self.root.lock().keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Registrar for Configfs {
    fn register_subsystem(&self, name: &str, subsystem: Arc<dyn GroupOperations>) -> Result<()> {
        match self.root.lock().entry(String::from(name)) {
            Entry::Occupied(_) => Err(Error::AlreadyExists),
            Entry::Vacant(entry) => {
                entry.insert(GroupNode::new(subsystem));
                Ok(())
            }
        }
    }

    fn unregister_subsystem(&self, name: &str) -> Result<()> {
        let removed = {
            let mut root = self.root.lock();
            let subsystem = root.get(name).ok_or(Error::NotFound)?;
            if !subsystem.groups.is_empty() {
                return Err(Error::Busy);
            }
            root.remove(name)
        };
        drop(removed);
        Ok(())
    }

    fn register_group(
        &self,
        parent: &str,
        name: &str,
        group: Arc<dyn GroupOperations>,
    ) -> Result<()> {
        let mut root = self.root.lock();
        let parent = find_group(&mut root, parent)?;
        if parent.contains(name) {
            return Err(Error::AlreadyExists);
        }
        parent.groups.insert(String::from(name), GroupNode::new(group));
        Ok(())
    }

    fn unregister_group(&self, parent: &str, name: &str) -> Result<()> {
        let mut items = Vec::new();
        let removed = {
            let mut root = self.root.lock();
            let parent = find_group(&mut root, parent)?;
            let mut group = parent.groups.remove(name).ok_or(Error::NotFound)?;
            group.release_items(&mut items);
            group
        };
        drop(items);
        drop(removed);
        Ok(())
    }
}

/// Splits `path` into its parent and last component.
fn split_last(path: &str) -> Result<(&str, &str)> {
    let path = path.trim_matches('/');
    let (parent, name) = path.rsplit_once('/').unwrap_or(("", path));
    if name.is_empty() {
        return Err(Error::NotFound);
    }
    Ok((parent, name))
}

fn find_group<'a>(
    root: &'a mut BTreeMap<String, GroupNode>,
    path: &str,
) -> Result<&'a mut GroupNode> {
    let mut components = path.split('/').filter(|c| !c.is_empty());
    let first = components.next().ok_or(Error::NotFound)?;
    let mut group = root.get_mut(first).ok_or(Error::NotFound)?;
    for component in components {
        group = group.groups.get_mut(component).ok_or(Error::NotFound)?;
    }
    Ok(group)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Empty;
    impl GroupOperations for Empty {}

    #[test]
    fn split_paths() {
        assert_eq!(split_last("a/b/c"), Ok(("a/b", "c")));
        assert_eq!(split_last("/a/"), Ok(("", "a")));
        assert_eq!(split_last(""), Err(Error::NotFound));
    }

    #[test]
    fn default_groups_cannot_be_removed() {
        let configfs = Configfs::new();
        configfs.register_subsystem("root", Arc::new(Empty)).unwrap();
        configfs.register_group("root", "child", Arc::new(Empty)).unwrap();

        assert_eq!(configfs.rmdir("root/child"), Err(Error::Busy));
        assert_eq!(configfs.rmdir("root"), Err(Error::Busy));
        assert_eq!(configfs.unregister_subsystem("root"), Err(Error::Busy));
        assert_eq!(configfs.list(""), Ok(alloc::vec![String::from("root")]));
        assert_eq!(configfs.list("root"), Ok(alloc::vec![String::from("child")]));
    }

    #[test]
    fn duplicates_and_unknown_paths() {
        let configfs = Configfs::new();
        configfs.register_subsystem("root", Arc::new(Empty)).unwrap();

        assert_eq!(
            configfs.register_subsystem("root", Arc::new(Empty)),
            Err(Error::AlreadyExists)
        );
        assert_eq!(
            configfs.register_group("missing", "child", Arc::new(Empty)),
            Err(Error::NotFound)
        );
        assert_eq!(configfs.mkdir("missing/item"), Err(Error::NotFound));
        assert_eq!(configfs.mkdir("root/item"), Err(Error::PermissionDenied));
        assert_eq!(configfs.read("root/item/status", &mut [0; 4]), Err(Error::NotFound));
        assert_eq!(configfs.unregister_group("root", "child"), Err(Error::NotFound));
    }
}
