// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Phandle resolution of a detached overlay against a base tree.

use alloc::borrow::ToOwned;
use alloc::string::String;

use super::error::{OverlayError, OverlayErrorKind};
use super::{DetachedOverlay, ResolvedOverlay};
use crate::model::{DeviceTree, DeviceTreeNode};

const PHANDLE_PROPERTIES: [&str; 2] = ["phandle", "linux,phandle"];

impl DetachedOverlay {
    /// Resolves the phandle references of this overlay against `base`.
    ///
    /// Phandles defined by the overlay are shifted above the largest phandle
    /// of `base`, and every reference recorded in `__local_fixups__` is
    /// shifted with them. References to labels of `base`, recorded in
    /// `__fixups__`, are looked up through the `/__symbols__` node of `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if a phandle is corrupted, a label is unknown, or a
    /// fixup entry is malformed. The overlay is consumed either way.
    pub fn resolve(self, base: &DeviceTree) -> Result<ResolvedOverlay, OverlayError> {
        let source = self.clone();
        let mut tree = self.tree;
        let delta = base.max_phandle();

        shift_local_phandles(&mut tree, delta)?;
        if let Some(local_fixups) = tree.root().child("__local_fixups__").cloned() {
            shift_local_references(&local_fixups, tree.root_mut(), delta, "/")?;
        }
        if let Some(fixups) = tree.root().child("__fixups__").cloned() {
            resolve_external_references(&fixups, &mut tree, base)?;
        }

        Ok(ResolvedOverlay {
            tree,
            source,
            stamp: 0,
        })
    }
}

fn shift_local_phandles(tree: &mut DeviceTree, delta: u32) -> Result<(), OverlayError> {
    let mut result = Ok(());
    tree.root_mut().for_each_node_mut(&mut |node| {
        if result.is_err() {
            return;
        }
        let name = node.name().to_owned();
        for property in PHANDLE_PROPERTIES {
            let Some(prop) = node.property_mut(property) else {
                continue;
            };
            let Some(phandle) = prop.as_u32() else {
                result = Err(OverlayError::new(OverlayErrorKind::CorruptedPhandle, name));
                return;
            };
            if phandle == 0 || phandle == u32::MAX {
                continue;
            }
            let Some(shifted) = phandle.checked_add(delta).filter(|p| *p != u32::MAX) else {
                result = Err(OverlayError::new(OverlayErrorKind::PhandleOverflow, name));
                return;
            };
            prop.set_value(shifted.to_be_bytes());
        }
    });
    result
}

/// Walks `local` (a node of `__local_fixups__`) in step with the matching
/// overlay node and shifts every cell it lists by `delta`.
fn shift_local_references(
    local: &DeviceTreeNode,
    node: &mut DeviceTreeNode,
    delta: u32,
    path: &str,
) -> Result<(), OverlayError> {
    let invalid = || OverlayError::new(OverlayErrorKind::InvalidFixup, path);

    for fixup in local.properties() {
        if fixup.name() == "name" {
            continue;
        }
        if !fixup.value().len().is_multiple_of(4) {
            return Err(invalid());
        }
        let prop = node.property_mut(fixup.name()).ok_or_else(invalid)?;
        for offset in fixup.value().chunks_exact(4) {
            let offset = u32::from_be_bytes([offset[0], offset[1], offset[2], offset[3]]) as usize;
            let cell = prop.cell_at(offset).ok_or_else(invalid)?;
            let shifted = cell.checked_add(delta).ok_or_else(|| {
                OverlayError::new(OverlayErrorKind::PhandleOverflow, path)
            })?;
            prop.set_cell_at(offset, shifted);
        }
    }

    for local_child in local.children() {
        let child_path = crate::model::join_path(path, local_child.name());
        let child = node
            .child_mut(local_child.name())
            .ok_or_else(|| OverlayError::new(OverlayErrorKind::InvalidFixup, &*child_path))?;
        shift_local_references(local_child, child, delta, &child_path)?;
    }
    Ok(())
}

/// Patches the phandles of `base` labels into the overlay, as listed by the
/// overlay's `__fixups__` node.
///
/// Each property of `__fixups__` is named after a label and holds a list of
/// `"<node path>:<property>:<byte offset>"` strings.
fn resolve_external_references(
    fixups: &DeviceTreeNode,
    tree: &mut DeviceTree,
    base: &DeviceTree,
) -> Result<(), OverlayError> {
    if fixups.properties().next().is_none() {
        return Ok(());
    }
    let symbols = base
        .find_node("/__symbols__")
        .ok_or_else(|| OverlayError::new(OverlayErrorKind::SymbolsNotFound, "/__symbols__"))?;

    for fixup in fixups.properties() {
        let label = fixup.name();
        let not_found = || OverlayError::new(OverlayErrorKind::SymbolNotFound, label);
        let target_path = symbols
            .property(label)
            .and_then(|p| p.as_str())
            .ok_or_else(not_found)?;
        let phandle = base
            .find_node(target_path)
            .and_then(DeviceTreeNode::phandle)
            .ok_or_else(not_found)?;

        for entry in fixup.as_str_list() {
            apply_fixup(tree, entry, phandle)?;
        }
    }
    Ok(())
}

fn apply_fixup(tree: &mut DeviceTree, entry: &str, phandle: u32) -> Result<(), OverlayError> {
    let invalid = || OverlayError::new(OverlayErrorKind::InvalidFixup, String::from(entry));

    let mut parts = entry.splitn(3, ':');
    let (Some(path), Some(property), Some(offset)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };
    let offset: usize = offset.parse().map_err(|_| invalid())?;

    let prop = tree
        .find_node_mut(path)
        .and_then(|node| node.property_mut(property))
        .ok_or_else(invalid)?;
    if prop.set_cell_at(offset, phandle) {
        Ok(())
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeviceTreeProperty;
    use alloc::vec;
    use alloc::vec::Vec;

    fn cells(values: &[u32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    fn base() -> DeviceTree {
        DeviceTree::new(
            DeviceTreeNode::builder("")
                .child(
                    DeviceTreeNode::builder("intc")
                        .property(DeviceTreeProperty::new("phandle", cells(&[3])))
                        .build(),
                )
                .child(
                    DeviceTreeNode::builder("__symbols__")
                        .property(DeviceTreeProperty::new("intc", "/intc\0"))
                        .build(),
                )
                .build(),
        )
    }

    #[test]
    fn local_phandles_are_shifted() {
        let overlay = DeviceTree::new(
            DeviceTreeNode::builder("")
                .child(
                    DeviceTreeNode::builder("fragment@0")
                        .child(
                            DeviceTreeNode::builder("__overlay__")
                                .child(
                                    DeviceTreeNode::builder("clk")
                                        .property(DeviceTreeProperty::new("phandle", cells(&[1])))
                                        .build(),
                                )
                                .child(
                                    DeviceTreeNode::builder("dev")
                                        .property(DeviceTreeProperty::new("clocks", cells(&[1, 9])))
                                        .build(),
                                )
                                .build(),
                        )
                        .build(),
                )
                .child(
                    DeviceTreeNode::builder("__local_fixups__")
                        .child(
                            DeviceTreeNode::builder("fragment@0")
                                .child(
                                    DeviceTreeNode::builder("__overlay__")
                                        .child(
                                            DeviceTreeNode::builder("dev")
                                                .property(DeviceTreeProperty::new(
                                                    "clocks",
                                                    cells(&[0]),
                                                ))
                                                .build(),
                                        )
                                        .build(),
                                )
                                .build(),
                        )
                        .build(),
                )
                .build(),
        );

        let resolved = DetachedOverlay::new(overlay).resolve(&base()).unwrap();
        let tree = resolved.tree();
        let clk = tree.find_node("/fragment@0/__overlay__/clk").unwrap();
        assert_eq!(clk.phandle(), Some(4));
        let dev = tree.find_node("/fragment@0/__overlay__/dev").unwrap();
        assert_eq!(dev.property("clocks").unwrap().value(), cells(&[4, 9]));
    }

    #[test]
    fn external_references_use_symbols() {
        let overlay = DeviceTree::new(
            DeviceTreeNode::builder("")
                .child(
                    DeviceTreeNode::builder("fragment@0")
                        .child(
                            DeviceTreeNode::builder("__overlay__")
                                .property(DeviceTreeProperty::new(
                                    "interrupt-parent",
                                    cells(&[0xffff_ffff]),
                                ))
                                .build(),
                        )
                        .build(),
                )
                .child(
                    DeviceTreeNode::builder("__fixups__")
                        .property(DeviceTreeProperty::new(
                            "intc",
                            "/fragment@0/__overlay__:interrupt-parent:0\0",
                        ))
                        .build(),
                )
                .build(),
        );

        let resolved = DetachedOverlay::new(overlay).resolve(&base()).unwrap();
        let node = resolved.tree().find_node("/fragment@0/__overlay__").unwrap();
        assert_eq!(node.property("interrupt-parent").unwrap().as_u32(), Some(3));
    }

    #[test]
    fn unknown_label_fails() {
        let overlay = DeviceTree::new(
            DeviceTreeNode::builder("")
                .child(
                    DeviceTreeNode::builder("__fixups__")
                        .property(DeviceTreeProperty::new("gpio0", "/x:y:0\0"))
                        .build(),
                )
                .build(),
        );

        let err = DetachedOverlay::new(overlay).resolve(&base()).unwrap_err();
        assert_eq!(err.kind, OverlayErrorKind::SymbolNotFound);
        assert_eq!(err.context(), "gpio0");
    }

    #[test]
    fn fixup_offset_out_of_range_fails() {
        let overlay = DeviceTree::new(
            DeviceTreeNode::builder("")
                .child(
                    DeviceTreeNode::builder("dev")
                        .property(DeviceTreeProperty::new("interrupt-parent", cells(&[0])))
                        .build(),
                )
                .child(
                    DeviceTreeNode::builder("__fixups__")
                        .property(DeviceTreeProperty::new("intc", "/dev:interrupt-parent:4\0"))
                        .build(),
                )
                .build(),
        );

        let err = DetachedOverlay::new(overlay).resolve(&base()).unwrap_err();
        assert_eq!(err.kind, OverlayErrorKind::InvalidFixup);
    }

    #[test]
    fn fixups_without_base_symbols_fail() {
        let overlay = DeviceTree::new(
            DeviceTreeNode::builder("")
                .child(
                    DeviceTreeNode::builder("__fixups__")
                        .property(DeviceTreeProperty::new("intc", "/dev:prop:0\0"))
                        .build(),
                )
                .build(),
        );
        let base = DeviceTree::new(DeviceTreeNode::new(""));

        let err = DetachedOverlay::new(overlay).resolve(&base).unwrap_err();
        assert_eq!(err.kind, OverlayErrorKind::SymbolsNotFound);
    }

    #[test]
    fn corrupted_phandle_fails() {
        let overlay = DeviceTree::new(
            DeviceTreeNode::builder("")
                .child(
                    DeviceTreeNode::builder("bad")
                        .property(DeviceTreeProperty::new("phandle", vec![1, 2]))
                        .build(),
                )
                .build(),
        );

        let err = DetachedOverlay::new(overlay).resolve(&base()).unwrap_err();
        assert_eq!(err.kind, OverlayErrorKind::CorruptedPhandle);
        assert_eq!(err.context(), "bad");
    }
}
