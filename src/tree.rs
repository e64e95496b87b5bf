// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::Result;

/// The operations an overlay item needs from the live device tree.
///
/// Each stage consumes the output of the previous one, so an overlay can
/// only be applied once it has been decoded and resolved, and the item never
/// owns the tree it attached.
pub trait OverlayTree: Send + Sync {
    /// A decoded overlay, not reachable from the live tree.
    type Decoded;
    /// A decoded overlay whose cross-references match the live tree.
    type Resolved;
    /// Identifies an attached overlay for later removal.
    type Handle: Send;

    /// Decodes a blob into a detached overlay.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`](crate::Error::Decode) if the blob is empty or
    /// malformed.
    fn unflatten(&self, blob: &[u8]) -> Result<Self::Decoded>;

    /// Resolves the phandle references of a decoded overlay.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resolve`](crate::Error::Resolve) if a reference cannot
    /// be resolved.
    fn resolve(&self, decoded: Self::Decoded) -> Result<Self::Resolved>;

    /// Attaches a resolved overlay to the live tree.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Attach`](crate::Error::Attach) if the tree refuses it.
    fn apply(&self, resolved: Self::Resolved) -> Result<Self::Handle>;

    /// Detaches a previously attached overlay.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Attach`](crate::Error::Attach) if the tree refuses to
    /// detach it.
    fn remove(&self, handle: Self::Handle) -> Result<()>;
}
