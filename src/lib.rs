// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A configfs-style interface for loading device tree overlays at runtime.
//!
//! Under a root namespace (`device-tree`) sits a single group (`overlays`).
//! Creating a directory in that group creates an [`OverlayItem`] with two
//! attributes:
//!
//! - `dtbo`: the overlay blob. It can only be written while the overlay is
//!   not applied.
//! - `status`: writing a non-zero integer decodes, resolves and applies the
//!   blob; writing `0` removes it again. Reads return `"1\n"` or `"0\n"`.
//!
//! Removing the directory, or unloading the [`OverlayModule`], removes the
//! overlay from the live tree.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use dtoverlay::configfs::Configfs;
//! use dtoverlay::{Config, OverlayModule};
//! use dtoverlay_tree::live::LiveTree;
//! use dtoverlay_tree::model::{DeviceTree, DeviceTreeNode, DeviceTreeProperty};
//!
//! let base = DeviceTree::new(
//!     DeviceTreeNode::builder("")
//!         .child(DeviceTreeNode::new("soc"))
//!         .build(),
//! );
//! let tree = Arc::new(LiveTree::new(base));
//! let configfs = Configfs::new();
//! let module = OverlayModule::init(&configfs, tree.clone(), Config::default()).unwrap();
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
//! configfs.mkdir("device-tree/overlays/uart").unwrap();
//! configfs.write("device-tree/overlays/uart/dtbo", &overlay.to_dtb()).unwrap();
//! configfs.write("device-tree/overlays/uart/status", b"1\n").unwrap();
//! assert!(tree.with_tree(|t| t.find_node("/soc/uart@1000").is_some()));
//!
//! module.exit();
//! assert!(tree.with_tree(|t| t.find_node("/soc/uart@1000").is_none()));
//! ```

#![no_std]

extern crate alloc;

pub mod blob;
pub mod config;
pub mod configfs;
pub mod device_tree;
pub mod error;
pub mod group;
pub mod item;
pub mod logger;
pub mod module;
pub mod subsystem;
pub mod tree;

pub use config::{Config, PAGE_SIZE};
pub use error::{Error, Result};
pub use group::OverlayGroup;
pub use item::OverlayItem;
pub use module::OverlayModule;
pub use subsystem::RootSubsystem;
pub use tree::OverlayTree;
