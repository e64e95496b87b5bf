// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

#![allow(dead_code)]

use std::sync::Mutex;

use dtoverlay::{Error, OverlayTree, Result};
use dtoverlay_tree::model::{DeviceTree, DeviceTreeNode, DeviceTreeProperty};

/// The stage at which [`MockTree`] should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Unflatten,
    Resolve,
    Apply,
    Remove,
}

#[derive(Debug, Default)]
struct MockState {
    fail: Option<(Stage, Error)>,
    attached: Vec<u32>,
    last_applied: Vec<u8>,
    next_handle: u32,
    applies: usize,
    removes: usize,
}

/// An [`OverlayTree`] that accepts any non-empty blob and records attach and
/// detach calls.
#[derive(Debug, Default)]
pub struct MockTree {
    state: Mutex<MockState>,
}

impl MockTree {
    /// Makes every call at `stage` fail with `error` until cleared.
    pub fn fail_at(&self, stage: Stage, error: Error) {
        self.state.lock().unwrap().fail = Some((stage, error));
    }

    pub fn clear_failure(&self) {
        self.state.lock().unwrap().fail = None;
    }

    /// Blobs currently attached, in attach order.
    pub fn attached(&self) -> Vec<u32> {
        self.state.lock().unwrap().attached.clone()
    }

    /// The blob of the most recent successful apply.
    pub fn last_applied(&self) -> Vec<u8> {
        self.state.lock().unwrap().last_applied.clone()
    }

    pub fn applies(&self) -> usize {
        self.state.lock().unwrap().applies
    }

    pub fn removes(&self) -> usize {
        self.state.lock().unwrap().removes
    }

    fn check(&self, stage: Stage) -> Result<()> {
        match self.state.lock().unwrap().fail {
            Some((failing, error)) if failing == stage => Err(error),
            _ => Ok(()),
        }
    }
}

impl OverlayTree for MockTree {
    type Decoded = Vec<u8>;
    type Resolved = Vec<u8>;
    type Handle = u32;

    fn unflatten(&self, blob: &[u8]) -> Result<Vec<u8>> {
        self.check(Stage::Unflatten)?;
        if blob.is_empty() {
            return Err(Error::Decode);
        }
        Ok(blob.to_vec())
    }

    fn resolve(&self, decoded: Vec<u8>) -> Result<Vec<u8>> {
        self.check(Stage::Resolve)?;
        Ok(decoded)
    }

    fn apply(&self, resolved: Vec<u8>) -> Result<u32> {
        self.check(Stage::Apply)?;
        let mut state = self.state.lock().unwrap();
        state.next_handle += 1;
        let handle = state.next_handle;
        state.attached.push(handle);
        state.last_applied = resolved;
        state.applies += 1;
        Ok(handle)
    }

    fn remove(&self, handle: u32) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.removes += 1;
        if let Some((Stage::Remove, error)) = state.fail {
            return Err(error);
        }
        state.attached.retain(|&attached| attached != handle);
        Ok(())
    }
}

pub fn str_prop(name: &str, value: &str) -> DeviceTreeProperty {
    DeviceTreeProperty::new(name, format!("{value}\0"))
}

/// A base tree with an `/soc` bus carrying a labelled interrupt controller.
pub fn base_tree() -> DeviceTree {
    DeviceTree::new(
        DeviceTreeNode::builder("")
            .child(
                DeviceTreeNode::builder("soc")
                    .child(
                        DeviceTreeNode::builder("intc@1000")
                            .property(DeviceTreeProperty::new("phandle", 1u32.to_be_bytes()))
                            .build(),
                    )
                    .build(),
            )
            .child(
                DeviceTreeNode::builder("__symbols__")
                    .property(str_prop("intc", "/soc/intc@1000"))
                    .build(),
            )
            .build(),
    )
}

/// An overlay blob adding a node called `node` under `target`.
pub fn overlay_blob(target: &str, node: &str) -> Vec<u8> {
    DeviceTree::new(
        DeviceTreeNode::builder("")
            .child(
                DeviceTreeNode::builder("fragment@0")
                    .property(str_prop("target-path", target))
                    .child(
                        DeviceTreeNode::builder("__overlay__")
                            .child(
                                DeviceTreeNode::builder(node)
                                    .property(str_prop("status", "okay"))
                                    .build(),
                            )
                            .build(),
                    )
                    .build(),
            )
            .build(),
    )
    .to_dtb()
}

/// An overlay blob whose node refers to the `intc` label of the base tree.
pub fn overlay_blob_with_fixup(node: &str) -> Vec<u8> {
    let fixup = format!("/fragment@0/__overlay__/{node}:interrupt-parent:0");
    DeviceTree::new(
        DeviceTreeNode::builder("")
            .child(
                DeviceTreeNode::builder("fragment@0")
                    .property(str_prop("target-path", "/soc"))
                    .child(
                        DeviceTreeNode::builder("__overlay__")
                            .child(
                                DeviceTreeNode::builder(node)
                                    .property(DeviceTreeProperty::new(
                                        "interrupt-parent",
                                        0xffff_ffffu32.to_be_bytes(),
                                    ))
                                    .build(),
                            )
                            .build(),
                    )
                    .build(),
            )
            .child(
                DeviceTreeNode::builder("__fixups__")
                    .property(str_prop("intc", &fixup))
                    .build(),
            )
            .build(),
    )
    .to_dtb()
}

/// Reads an attribute through a page-sized buffer.
pub fn read_attribute(configfs: &dtoverlay::configfs::Configfs, path: &str) -> Result<Vec<u8>> {
    let mut page = vec![0; dtoverlay::PAGE_SIZE];
    let len = configfs.read(path, &mut page)?;
    page.truncate(len);
    Ok(page)
}
