// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use alloc::sync::Arc;
use core::fmt;

use crate::configfs::GroupOperations;
use crate::group::OverlayGroup;
use crate::tree::OverlayTree;

/// The root namespace. It holds the overlay group and nothing else; no items
/// can be created directly in it.
pub struct RootSubsystem<T: OverlayTree> {
    group_name: &'static str,
    group: Arc<OverlayGroup<T>>,
}

impl<T: OverlayTree> RootSubsystem<T> {
    /// Creates a root namespace holding `group` under `group_name`.
    #[must_use]
    pub fn new(group_name: &'static str, group: Arc<OverlayGroup<T>>) -> Self {
        Self { group_name, group }
    }

    /// Returns the name of the overlay group.
    #[must_use]
    pub fn group_name(&self) -> &'static str {
        self.group_name
    }

    /// Returns the overlay group.
    #[must_use]
    pub fn group(&self) -> &Arc<OverlayGroup<T>> {
        &self.group
    }
}

impl<T: OverlayTree> fmt::Debug for RootSubsystem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootSubsystem")
            .field("group_name", &self.group_name)
            .field("group", &self.group)
            .finish()
    }
}

impl<T: OverlayTree> GroupOperations for RootSubsystem<T> {}
