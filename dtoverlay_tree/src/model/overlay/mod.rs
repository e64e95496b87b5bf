// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Device tree overlays: resolution, reversible application and removal.
//!
//! An overlay goes through two stages before it can touch a live tree:
//!
//! 1. A [`DetachedOverlay`] is a decoded overlay that is not connected to any
//!    tree. Its phandles are still numbered from 1.
//! 2. [`DetachedOverlay::resolve`] turns it into a [`ResolvedOverlay`] whose
//!    phandle references are valid for one particular base tree.
//!
//! [`DeviceTree::apply_overlay`] consumes the resolved overlay and returns a
//! [`Changeset`], which [`DeviceTree::revert`] undoes.

use alloc::borrow::ToOwned;
use alloc::string::String;
use alloc::vec::Vec;

use crate::fdt::Fdt;
use crate::model::{DeviceTree, DeviceTreeNode, DeviceTreeProperty, join_path};

mod error;
mod resolve;

pub use error::{OverlayError, OverlayErrorKind};

const OVERLAY_NODE: &str = "__overlay__";
const SYMBOLS_NODE: &str = "__symbols__";
const FIXUPS_NODE: &str = "__fixups__";
const LOCAL_FIXUPS_NODE: &str = "__local_fixups__";

/// A decoded overlay that is not yet connected to any tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedOverlay {
    tree: DeviceTree,
}

impl DetachedOverlay {
    /// Wraps an overlay tree.
    #[must_use]
    pub fn new(tree: DeviceTree) -> Self {
        Self { tree }
    }

    /// Decodes an overlay from a flattened device tree blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob is empty or malformed.
    pub fn from_dtb(dtb: &[u8]) -> crate::Result<Self> {
        let fdt = Fdt::new(dtb)?;
        Ok(Self::new(DeviceTree::from_fdt(&fdt)?))
    }

    /// Returns the overlay tree.
    #[must_use]
    pub fn tree(&self) -> &DeviceTree {
        &self.tree
    }
}

/// An overlay whose phandle references have been resolved against a base
/// tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOverlay {
    tree: DeviceTree,
    /// The overlay as decoded, kept so that it can be resolved again if the
    /// base tree changes before it is applied.
    pub(crate) source: DetachedOverlay,
    /// Generation of the live tree this overlay was resolved against.
    pub(crate) stamp: u64,
}

impl ResolvedOverlay {
    /// Returns the resolved overlay tree.
    #[must_use]
    pub fn tree(&self) -> &DeviceTree {
        &self.tree
    }
}

/// A single mutation performed while applying an overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// An empty node was added at `path`.
    AddNode {
        /// Absolute path of the new node.
        path: String,
    },
    /// A property was created or overwritten.
    SetProperty {
        /// Absolute path of the node holding the property.
        node: String,
        /// Name of the property.
        name: String,
        /// The value the property had before, if any.
        previous: Option<DeviceTreeProperty>,
    },
}

impl Change {
    fn path(&self) -> &str {
        match self {
            Self::AddNode { path } => path,
            Self::SetProperty { node, .. } => node,
        }
    }

    /// Whether `self` and `other` touch the same property or overlapping
    /// subtrees.
    fn conflicts_with(&self, other: &Change) -> bool {
        match (self, other) {
            (
                Self::SetProperty {
                    node: a, name: x, ..
                },
                Self::SetProperty {
                    node: b, name: y, ..
                },
            ) => a == b && x == y,
            (Self::AddNode { path }, other) | (other, Self::AddNode { path }) => {
                is_at_or_under(other.path(), path)
                    || matches!(other, Self::AddNode { path: p } if is_at_or_under(path, p))
            }
        }
    }
}

/// The ordered record of mutations performed by applying an overlay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    entries: Vec<Change>,
    targets: Vec<String>,
}

impl Changeset {
    /// Returns the recorded mutations, in application order.
    #[must_use]
    pub fn changes(&self) -> &[Change] {
        &self.entries
    }

    /// Returns the absolute paths of the nodes targeted by the overlay's
    /// fragments.
    #[must_use]
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Returns whether any mutation of `later` touches what this changeset
    /// touched.
    #[must_use]
    pub fn overlaps(&self, later: &Changeset) -> bool {
        self.entries
            .iter()
            .any(|a| later.entries.iter().any(|b| a.conflicts_with(b)))
    }

    fn push(&mut self, change: Change) {
        self.entries.push(change);
    }
}

impl DeviceTree {
    /// Applies a resolved overlay to this device tree.
    ///
    /// All fragment targets are looked up before anything is modified. If a
    /// later step fails, the mutations already performed are reverted and
    /// the tree is left as it was.
    ///
    /// # Errors
    ///
    /// Returns an error if the overlay has no fragments, a fragment has no
    /// valid target, or its target does not exist.
    pub fn apply_overlay(&mut self, overlay: ResolvedOverlay) -> Result<Changeset, OverlayError> {
        let mut changeset = Changeset::default();
        match self.apply_fragments(overlay.tree, &mut changeset) {
            Ok(()) => Ok(changeset),
            Err(e) => {
                self.revert(changeset);
                Err(e)
            }
        }
    }

    /// Undoes every mutation recorded in `changeset`, last first.
    pub fn revert(&mut self, changeset: Changeset) {
        for change in changeset.entries.into_iter().rev() {
            match change {
                Change::AddNode { path } => {
                    let Some((parent, name)) = path.rsplit_once('/') else {
                        continue;
                    };
                    let parent = if parent.is_empty() { "/" } else { parent };
                    if let Some(parent) = self.find_node_mut(parent) {
                        parent.remove_child(name);
                    }
                }
                Change::SetProperty {
                    node,
                    name,
                    previous,
                } => {
                    let Some(node) = self.find_node_mut(&node) else {
                        continue;
                    };
                    match previous {
                        Some(previous) => {
                            node.add_property(previous);
                        }
                        None => {
                            node.remove_property(&name);
                        }
                    }
                }
            }
        }
    }

    fn apply_fragments(
        &mut self,
        overlay: DeviceTree,
        changeset: &mut Changeset,
    ) -> Result<(), OverlayError> {
        let (_, children) = overlay.root.into_parts();

        let mut symbols = None;
        let mut fragments = Vec::new();
        for fragment in children {
            match fragment.name() {
                FIXUPS_NODE | LOCAL_FIXUPS_NODE => continue,
                SYMBOLS_NODE => {
                    symbols = Some(fragment);
                    continue;
                }
                _ => {}
            }
            if fragment.child(OVERLAY_NODE).is_none() {
                continue;
            }
            let target = self.fragment_target(&fragment)?;
            fragments.push((fragment, target));
        }
        if fragments.is_empty() {
            return Err(OverlayError::new(OverlayErrorKind::NoFragments, "/"));
        }

        let mut prefixes = Vec::with_capacity(fragments.len());
        for (mut fragment, target) in fragments {
            if let Some(content) = fragment.remove_child(OVERLAY_NODE) {
                self.merge_node(&target, content, changeset)?;
            }
            changeset.targets.push(target.clone());
            prefixes.push((fragment.name().to_owned(), target));
        }

        if let Some(symbols) = symbols {
            self.merge_symbols(symbols, &prefixes, changeset)?;
        }
        Ok(())
    }

    /// Finds the target of a fragment, `target` taking precedence over
    /// `target-path`.
    fn fragment_target(&self, fragment: &DeviceTreeNode) -> Result<String, OverlayError> {
        let name = fragment.name();
        if let Some(target) = fragment.property("target") {
            let phandle = target
                .as_u32()
                .ok_or_else(|| OverlayError::new(OverlayErrorKind::CorruptedPhandle, name))?;
            return self
                .path_of_phandle(phandle)
                .ok_or_else(|| OverlayError::new(OverlayErrorKind::TargetNodeNotFound, name));
        }

        let path = fragment
            .property("target-path")
            .ok_or_else(|| OverlayError::new(OverlayErrorKind::MissingTarget, name))?
            .as_str()
            .filter(|path| path.starts_with('/'))
            .ok_or_else(|| OverlayError::new(OverlayErrorKind::TargetPathInvalid, name))?;
        if self.find_node(path).is_none() {
            return Err(OverlayError::new(OverlayErrorKind::TargetNodeNotFound, name));
        }
        Ok(path.to_owned())
    }

    /// Merges `source` into the existing node at `path`.
    fn merge_node(
        &mut self,
        path: &str,
        source: DeviceTreeNode,
        changeset: &mut Changeset,
    ) -> Result<(), OverlayError> {
        let not_found = || OverlayError::new(OverlayErrorKind::TargetNodeNotFound, path);
        let (properties, children) = source.into_parts();

        let node = self.find_node_mut(path).ok_or_else(not_found)?;
        for property in properties {
            if property.name() == "name" {
                continue;
            }
            let name = property.name().to_owned();
            let previous = node.add_property(property);
            changeset.push(Change::SetProperty {
                node: path.to_owned(),
                name,
                previous,
            });
        }

        for child in children {
            let child_path = join_path(path, child.name());
            let node = self.find_node_mut(path).ok_or_else(not_found)?;
            if node.child(child.name()).is_none() {
                node.add_child(DeviceTreeNode::new(child.name()));
                changeset.push(Change::AddNode {
                    path: child_path.clone(),
                });
            }
            self.merge_node(&child_path, child, changeset)?;
        }
        Ok(())
    }

    /// Copies the overlay's labels into `/__symbols__`, rewriting each
    /// `/<fragment>/__overlay__` prefix to the fragment's target path.
    fn merge_symbols(
        &mut self,
        symbols: DeviceTreeNode,
        prefixes: &[(String, String)],
        changeset: &mut Changeset,
    ) -> Result<(), OverlayError> {
        let mut rewritten = Vec::new();
        for symbol in symbols.properties() {
            let invalid = || OverlayError::new(OverlayErrorKind::InvalidSymbol, symbol.name());
            let path = symbol.as_str().ok_or_else(invalid)?;
            let path = prefixes
                .iter()
                .find_map(|(fragment, target)| rebase_symbol(path, fragment, target))
                .ok_or_else(invalid)?;
            let mut value = path.into_bytes();
            value.push(0);
            rewritten.push(DeviceTreeProperty::new(symbol.name(), value));
        }
        if rewritten.is_empty() {
            return Ok(());
        }

        let symbols_path = join_path("/", SYMBOLS_NODE);
        if self.root.child(SYMBOLS_NODE).is_none() {
            self.root.add_child(DeviceTreeNode::new(SYMBOLS_NODE));
            changeset.push(Change::AddNode {
                path: symbols_path.clone(),
            });
        }
        let mut node = DeviceTreeNode::new(SYMBOLS_NODE);
        for property in rewritten {
            node.add_property(property);
        }
        self.merge_node(&symbols_path, node, changeset)
    }
}

/// Rewrites `/<fragment>/__overlay__<rest>` to `<target><rest>`.
fn rebase_symbol(path: &str, fragment: &str, target: &str) -> Option<String> {
    let rest = path
        .strip_prefix('/')?
        .strip_prefix(fragment)?
        .strip_prefix('/')?
        .strip_prefix(OVERLAY_NODE)?;
    if !rest.is_empty() && !rest.starts_with('/') {
        return None;
    }
    let mut rebased = String::from(target.trim_end_matches('/'));
    rebased.push_str(rest);
    if rebased.is_empty() {
        rebased.push('/');
    }
    Some(rebased)
}

fn is_at_or_under(path: &str, base: &str) -> bool {
    match path.strip_prefix(base) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || base.ends_with('/'),
        None => false,
    }
}
