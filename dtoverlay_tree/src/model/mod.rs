// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A read-write, in-memory representation of a device tree.
//!
//! This module provides the [`DeviceTree`], [`DeviceTreeNode`], and
//! [`DeviceTreeProperty`] structs, which hold both the live system tree and
//! decoded overlays. A [`DeviceTree`] can be serialized back to a flattened
//! device tree blob.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{self, Display};

use crate::error::FdtError;
use crate::fdt::Fdt;
use crate::writer;
mod node;
pub mod overlay;
mod property;
pub use node::{DeviceTreeNode, DeviceTreeNodeBuilder};
pub use property::DeviceTreeProperty;

/// A mutable, in-memory representation of a device tree.
///
/// # Examples
///
/// ```
/// # use dtoverlay_tree::model::{DeviceTree, DeviceTreeNode};
/// let root = DeviceTreeNode::new("");
/// let mut tree = DeviceTree::new(root);
/// tree.root_mut().add_child(DeviceTreeNode::new("child"));
/// assert!(tree.find_node("/child").is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTree {
    pub(crate) root: DeviceTreeNode,
}

impl DeviceTree {
    /// Creates a new `DeviceTree` with the given root node.
    #[must_use]
    pub fn new(root: DeviceTreeNode) -> Self {
        Self { root }
    }

    /// Creates a new `DeviceTree` from a `Fdt`.
    ///
    /// # Errors
    ///
    /// Returns an error if any node or property of the `Fdt` is malformed.
    pub fn from_fdt(fdt: &Fdt<'_>) -> Result<Self, FdtError> {
        let root = DeviceTreeNode::try_from(fdt.root()?)?;
        Ok(DeviceTree { root })
    }

    /// Serializes the `DeviceTree` to a flattened device tree blob.
    ///
    /// # Panics
    ///
    /// This may panic if any of the lengths written to the DTB (block sizes,
    /// property value length, etc.) exceed [`u32::MAX`].
    #[must_use]
    pub fn to_dtb(&self) -> Vec<u8> {
        writer::to_bytes(self)
    }

    /// Returns a reference to the root node of the device tree.
    #[must_use]
    pub fn root(&self) -> &DeviceTreeNode {
        &self.root
    }

    /// Returns a mutable reference to the root node of the device tree.
    pub fn root_mut(&mut self) -> &mut DeviceTreeNode {
        &mut self.root
    }

    /// Finds a node by its absolute path.
    #[must_use]
    pub fn find_node(&self, path: &str) -> Option<&DeviceTreeNode> {
        if !path.starts_with('/') {
            return None;
        }
        let mut current_node = &self.root;
        for component in path.split('/').filter(|s| !s.is_empty()) {
            current_node = current_node.child(component)?;
        }
        Some(current_node)
    }

    /// Finds a node by its absolute path and returns a mutable reference to
    /// it.
    ///
    /// # Performance
    ///
    /// Child lookup is a constant-time operation, so this is linear in the
    /// number of path segments.
    pub fn find_node_mut(&mut self, path: &str) -> Option<&mut DeviceTreeNode> {
        if !path.starts_with('/') {
            return None;
        }
        let mut current_node = &mut self.root;
        for component in path.split('/').filter(|s| !s.is_empty()) {
            current_node = current_node.child_mut(component)?;
        }
        Some(current_node)
    }

    /// Returns the largest phandle used anywhere in the tree, or 0 if there
    /// are none.
    #[must_use]
    pub fn max_phandle(&self) -> u32 {
        let mut max = 0;
        self.root.for_each_node(&mut |node| {
            if let Some(phandle) = node.phandle() {
                max = max.max(phandle);
            }
        });
        max
    }

    /// Returns the absolute path of the node carrying the given phandle.
    #[must_use]
    pub fn path_of_phandle(&self, phandle: u32) -> Option<String> {
        let mut found = None;
        self.root.walk_paths(&mut String::new(), &mut |path, node| {
            if found.is_none() && node.phandle() == Some(phandle) {
                found = Some(String::from(path));
            }
        });
        found
    }
}

impl Display for DeviceTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dtb = self.to_dtb();
        Fdt::new(&dtb).map_err(|_| fmt::Error)?.fmt(f)
    }
}

/// Joins a parent path and a child name into an absolute path.
pub(crate) fn join_path(parent: &str, child: &str) -> String {
    let mut path = String::from(parent.trim_end_matches('/'));
    path.push('/');
    path.push_str(child);
    path
}
