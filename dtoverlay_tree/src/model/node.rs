// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use super::property::DeviceTreeProperty;
use crate::{error::FdtError, fdt::FdtNode};
use alloc::{
    borrow::ToOwned,
    string::{String, ToString},
    vec::Vec,
};
use indexmap::IndexMap;
use twox_hash::xxhash64;

const HASH_SEED: u64 = 0xdead_cafe;

type NameMap<V> = IndexMap<String, V, xxhash64::State>;

fn name_map<V>(capacity: usize) -> NameMap<V> {
    IndexMap::with_capacity_and_hasher(capacity, xxhash64::State::with_seed(HASH_SEED))
}

/// A mutable, in-memory representation of a device tree node.
///
/// Children and properties are stored in [`IndexMap`]s, which provide O(1)
/// lookups by name while preserving insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTreeNode {
    name: String,
    properties: NameMap<DeviceTreeProperty>,
    children: NameMap<DeviceTreeNode>,
}

impl Default for DeviceTreeNode {
    fn default() -> Self {
        Self {
            name: String::new(),
            properties: name_map(0),
            children: name_map(0),
        }
    }
}

impl DeviceTreeNode {
    /// Creates a new [`DeviceTreeNode`] with the given name.
    ///
    /// # Examples
    ///
    /// ```
    /// # use dtoverlay_tree::model::DeviceTreeNode;
    /// let node = DeviceTreeNode::new("my-node");
    /// assert_eq!(node.name(), "my-node");
    /// ```
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Creates a new [`DeviceTreeNodeBuilder`] with the given name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> DeviceTreeNodeBuilder {
        DeviceTreeNodeBuilder::new(name)
    }

    /// Returns the name of this node.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the phandle of this node, taken from its `phandle` property or,
    /// failing that, the legacy `linux,phandle` property.
    ///
    /// # Examples
    ///
    /// ```
    /// # use dtoverlay_tree::model::{DeviceTreeNode, DeviceTreeProperty};
    /// let node = DeviceTreeNode::builder("intc")
    ///     .property(DeviceTreeProperty::new("phandle", 7u32.to_be_bytes()))
    ///     .build();
    /// assert_eq!(node.phandle(), Some(7));
    /// ```
    #[must_use]
    pub fn phandle(&self) -> Option<u32> {
        self.property("phandle")
            .or_else(|| self.property("linux,phandle"))
            .and_then(DeviceTreeProperty::as_u32)
    }

    /// Returns an iterator over the properties of this node.
    pub fn properties(&self) -> impl Iterator<Item = &DeviceTreeProperty> {
        self.properties.values()
    }

    /// Returns a mutable iterator over the properties of this node.
    pub fn properties_mut(&mut self) -> impl Iterator<Item = &mut DeviceTreeProperty> {
        self.properties.values_mut()
    }

    /// Finds a property by its name and returns a reference to it.
    ///
    /// # Performance
    ///
    /// This is a constant-time operation.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&DeviceTreeProperty> {
        self.properties.get(name)
    }

    /// Finds a property by its name and returns a mutable reference to it.
    #[must_use]
    pub fn property_mut(&mut self, name: &str) -> Option<&mut DeviceTreeProperty> {
        self.properties.get_mut(name)
    }

    /// Adds a property to this node, returning the property it replaced.
    ///
    /// # Examples
    ///
    /// ```
    /// # use dtoverlay_tree::model::{DeviceTreeNode, DeviceTreeProperty};
    /// let mut node = DeviceTreeNode::new("my-node");
    /// assert!(node.add_property(DeviceTreeProperty::new("status", "okay\0")).is_none());
    /// let old = node.add_property(DeviceTreeProperty::new("status", "disabled\0"));
    /// assert_eq!(old.unwrap().as_str(), Some("okay"));
    /// ```
    pub fn add_property(&mut self, property: DeviceTreeProperty) -> Option<DeviceTreeProperty> {
        self.properties.insert(property.name().to_owned(), property)
    }

    /// Removes a property from this node by its name.
    ///
    /// # Performance
    ///
    /// This is a linear-time operation, as it needs to shift elements after
    /// the removed property.
    pub fn remove_property(&mut self, name: &str) -> Option<DeviceTreeProperty> {
        self.properties.shift_remove(name)
    }

    /// Returns an iterator over the children of this node.
    pub fn children(&self) -> impl Iterator<Item = &DeviceTreeNode> {
        self.children.values()
    }

    /// Returns a mutable iterator over the children of this node.
    pub fn children_mut(&mut self) -> impl Iterator<Item = &mut DeviceTreeNode> {
        self.children.values_mut()
    }

    /// Finds a child by its name and returns a reference to it.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&DeviceTreeNode> {
        self.children.get(name)
    }

    /// Finds a child by its name and returns a mutable reference to it.
    #[must_use]
    pub fn child_mut(&mut self, name: &str) -> Option<&mut DeviceTreeNode> {
        self.children.get_mut(name)
    }

    /// Adds a child to this node, replacing any child with the same name.
    pub fn add_child(&mut self, child: DeviceTreeNode) {
        self.children.insert(child.name().to_owned(), child);
    }

    /// Removes a child from this node by its name.
    ///
    /// # Performance
    ///
    /// This is a linear-time operation, as it needs to shift elements after
    /// the removed child.
    pub fn remove_child(&mut self, name: &str) -> Option<DeviceTreeNode> {
        self.children.shift_remove(name)
    }

    /// Consumes the node, returning its properties and children in order.
    pub(crate) fn into_parts(self) -> (Vec<DeviceTreeProperty>, Vec<DeviceTreeNode>) {
        (
            self.properties.into_values().collect(),
            self.children.into_values().collect(),
        )
    }

    /// Calls `f` on this node and every node below it, parents first.
    pub(crate) fn for_each_node<F>(&self, f: &mut F)
    where
        F: FnMut(&DeviceTreeNode),
    {
        f(self);
        for child in self.children() {
            child.for_each_node(f);
        }
    }

    /// Calls `f` on this node and every node below it, parents first.
    pub(crate) fn for_each_node_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut DeviceTreeNode),
    {
        f(self);
        for child in self.children_mut() {
            child.for_each_node_mut(f);
        }
    }

    /// Like [`Self::for_each_node`], but also passes the absolute path of
    /// each node. `prefix` is the path of this node's parent.
    pub(crate) fn walk_paths<F>(&self, prefix: &mut String, f: &mut F)
    where
        F: FnMut(&str, &DeviceTreeNode),
    {
        let len = prefix.len();
        if self.name.is_empty() {
            prefix.push('/');
        } else {
            if !prefix.ends_with('/') {
                prefix.push('/');
            }
            prefix.push_str(&self.name);
        }
        f(prefix, self);
        for child in self.children() {
            child.walk_paths(prefix, f);
        }
        prefix.truncate(len);
    }
}

impl<'a> TryFrom<FdtNode<'a>> for DeviceTreeNode {
    type Error = FdtError;

    fn try_from(node: FdtNode<'a>) -> Result<Self, Self::Error> {
        let mut properties = name_map(0);
        for property in node.properties() {
            let property = DeviceTreeProperty::from(property?);
            properties.insert(property.name().to_owned(), property);
        }

        let mut children = name_map(0);
        for child in node.children() {
            let child = DeviceTreeNode::try_from(child?)?;
            children.insert(child.name().to_owned(), child);
        }

        Ok(DeviceTreeNode {
            name: node.name()?.to_string(),
            properties,
            children,
        })
    }
}

/// A builder for creating [`DeviceTreeNode`]s.
#[derive(Debug, Default)]
pub struct DeviceTreeNodeBuilder {
    node: DeviceTreeNode,
}

impl DeviceTreeNodeBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            node: DeviceTreeNode::new(name),
        }
    }

    /// Adds a property to the node.
    #[must_use]
    pub fn property(mut self, property: DeviceTreeProperty) -> Self {
        self.node.add_property(property);
        self
    }

    /// Adds a child to the node.
    #[must_use]
    pub fn child(mut self, child: DeviceTreeNode) -> Self {
        self.node.add_child(child);
        self
    }

    /// Builds the `DeviceTreeNode`.
    #[must_use]
    pub fn build(self) -> DeviceTreeNode {
        self.node
    }
}
