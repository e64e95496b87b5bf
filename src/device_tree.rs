// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! [`OverlayTree`] for the [`LiveTree`] of `dtoverlay_tree`.

use dtoverlay_tree::live::{LiveTree, OverlayId};
use dtoverlay_tree::model::overlay::{
    DetachedOverlay, OverlayError, OverlayErrorKind, ResolvedOverlay,
};
use log::error;

use crate::error::errno::{EBUSY, EINVAL, ENODEV, ENOENT};
use crate::tree::OverlayTree;
use crate::{Error, Result};

impl OverlayTree for LiveTree {
    type Decoded = DetachedOverlay;
    type Resolved = ResolvedOverlay;
    type Handle = OverlayId;

    fn unflatten(&self, blob: &[u8]) -> Result<DetachedOverlay> {
        DetachedOverlay::from_dtb(blob).map_err(|e| {
            error!("invalid overlay blob: {e}");
            Error::Decode
        })
    }

    fn resolve(&self, decoded: DetachedOverlay) -> Result<ResolvedOverlay> {
        LiveTree::resolve(self, decoded).map_err(|e| {
            error!("unresolved overlay reference: {e}");
            Error::Resolve
        })
    }

    fn apply(&self, resolved: ResolvedOverlay) -> Result<OverlayId> {
        LiveTree::apply(self, resolved).map_err(|e| {
            error!("overlay rejected by the live tree: {e}");
            Error::Attach(errno_of(&e))
        })
    }

    fn remove(&self, handle: OverlayId) -> Result<()> {
        LiveTree::remove(self, handle).map_err(|e| {
            error!("overlay {handle} could not be removed: {e}");
            Error::Attach(errno_of(&e))
        })
    }
}

/// Returns the negative errno reported for a live tree error.
fn errno_of(error: &OverlayError) -> i32 {
    -match error.kind {
        OverlayErrorKind::TargetNodeNotFound => ENODEV,
        OverlayErrorKind::Busy => EBUSY,
        OverlayErrorKind::UnknownOverlay => ENOENT,
        _ => EINVAL,
    }
}
