// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Flattened Device Tree (FDT) decoding and runtime overlay application.
//!
//! This library provides the tree-side primitives needed to load device tree
//! overlays into a running system:
//!
//! - A read-only, zero-copy decoder for FDT blobs that rejects malformed
//!   input with an error instead of panicking. Overlay blobs come from user
//!   space and are never trusted.
//! - A read-write, in-memory model of a device tree that can be serialized
//!   back to an FDT blob.
//! - Phandle resolution for overlays (`__fixups__` and `__local_fixups__`).
//! - Reversible overlay application: every mutation is recorded in a
//!   changeset that can be undone later.
//! - A [`LiveTree`](live::LiveTree) that owns the running device tree,
//!   serializes overlay application and removal, and notifies listeners.
//!
//! # Examples
//!
//! ```
//! use dtoverlay_tree::live::LiveTree;
//! use dtoverlay_tree::model::{DeviceTree, DeviceTreeNode, DeviceTreeProperty};
//!
//! let base = DeviceTree::new(
//!     DeviceTreeNode::builder("")
//!         .child(DeviceTreeNode::new("soc"))
//!         .build(),
//! );
//! let live = LiveTree::new(base);
//!
//! let overlay = DeviceTree::new(
//!     DeviceTreeNode::builder("")
//!         .child(
//!             DeviceTreeNode::builder("fragment@0")
//!                 .property(DeviceTreeProperty::new("target-path", "/soc\0"))
//!                 .child(
//!                     DeviceTreeNode::builder("__overlay__")
//!                         .child(DeviceTreeNode::new("uart@1000"))
//!                         .build(),
//!                 )
//!                 .build(),
//!         )
//!         .build(),
//! );
//!
//! let detached = LiveTree::unflatten(&overlay.to_dtb()).unwrap();
//! let resolved = live.resolve(detached).unwrap();
//! let id = live.apply(resolved).unwrap();
//! assert!(live.with_tree(|tree| tree.find_node("/soc/uart@1000").is_some()));
//!
//! live.remove(id).unwrap();
//! assert!(live.with_tree(|tree| tree.find_node("/soc/uart@1000").is_none()));
//! ```

#![no_std]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod error;
pub mod fdt;
#[cfg(feature = "write")]
#[cfg_attr(docsrs, doc(cfg(feature = "write")))]
pub mod live;
#[cfg(feature = "write")]
#[cfg_attr(docsrs, doc(cfg(feature = "write")))]
pub mod model;
#[cfg(feature = "write")]
mod writer;

pub use error::{FdtError, FdtErrorKind};

/// A result type specialized for FDT decoding.
pub type Result<T> = core::result::Result<T, FdtError>;
