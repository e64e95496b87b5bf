// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The running system's device tree and the stack of overlays applied to it.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use spin::mutex::SpinMutex;

use crate::fdt::Fdt;
use crate::model::DeviceTree;
use crate::model::overlay::{
    Changeset, DetachedOverlay, OverlayError, OverlayErrorKind, ResolvedOverlay,
};

/// Identifies an overlay applied to a [`LiveTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OverlayId(u32);

impl OverlayId {
    /// Returns the numeric value of the identifier.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receives notifications when overlays change the live tree, so that
/// devices under the affected nodes can be bound or unbound.
///
/// Listeners are called without the live tree lock held and may query the
/// tree.
pub trait ReconfigListener: Send + Sync {
    /// Called after the overlay `id` was applied on the given target nodes.
    fn overlay_applied(&self, id: OverlayId, targets: &[String]);

    /// Called after the overlay `id` was removed from the given target nodes.
    fn overlay_removed(&self, id: OverlayId, targets: &[String]);
}

struct LiveState {
    tree: DeviceTree,
    applied: Vec<(OverlayId, Changeset)>,
    next_id: u32,
    /// Bumped on every apply and removal. Overlays resolved at an earlier
    /// generation are resolved again before being applied.
    generation: u64,
}

/// The live device tree.
///
/// Overlay application and removal are serialized behind a single lock.
pub struct LiveTree {
    state: SpinMutex<LiveState>,
    listeners: SpinMutex<Vec<Arc<dyn ReconfigListener>>>,
}

impl LiveTree {
    /// Creates a live tree from a base device tree.
    #[must_use]
    pub fn new(tree: DeviceTree) -> Self {
        Self {
            state: SpinMutex::new(LiveState {
                tree,
                applied: Vec::new(),
                next_id: 1,
                generation: 0,
            }),
            listeners: SpinMutex::new(Vec::new()),
        }
    }

    /// Creates a live tree from a flattened device tree blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob is malformed.
    pub fn from_dtb(dtb: &[u8]) -> crate::Result<Self> {
        let fdt = Fdt::new(dtb)?;
        Ok(Self::new(DeviceTree::from_fdt(&fdt)?))
    }

    /// Decodes an overlay blob into a detached tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob is empty or malformed.
    pub fn unflatten(dtb: &[u8]) -> crate::Result<DetachedOverlay> {
        DetachedOverlay::from_dtb(dtb)
    }

    /// Resolves the phandle references of `overlay` against the current tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the overlay references something the live tree
    /// does not provide.
    pub fn resolve(&self, overlay: DetachedOverlay) -> Result<ResolvedOverlay, OverlayError> {
        let state = self.state.lock();
        let mut resolved = overlay.resolve(&state.tree)?;
        resolved.stamp = state.generation;
        Ok(resolved)
    }

    /// Applies a resolved overlay and returns its identifier.
    ///
    /// If another overlay was applied or removed since `overlay` was
    /// resolved, it is resolved again against the current tree first, while
    /// the lock is still held.
    ///
    /// # Errors
    ///
    /// Returns the error of resolving again, or of
    /// [`DeviceTree::apply_overlay`]. The tree is unchanged on error.
    pub fn apply(&self, overlay: ResolvedOverlay) -> Result<OverlayId, OverlayError> {
        let (id, targets) = {
            let mut state = self.state.lock();
            let overlay = if overlay.stamp == state.generation {
                overlay
            } else {
                log::debug!("resolving overlay again at generation {}", state.generation);
                overlay.source.resolve(&state.tree)?
            };
            let changeset = state.tree.apply_overlay(overlay)?;
            let id = OverlayId(state.next_id);
            state.next_id = state.next_id.wrapping_add(1);
            state.generation += 1;
            let targets = changeset.targets().to_vec();
            state.applied.push((id, changeset));
            (id, targets)
        };

        log::debug!("overlay {id} applied to {targets:?}");
        for listener in self.listeners() {
            listener.overlay_applied(id, &targets);
        }
        Ok(id)
    }

    /// Removes a previously applied overlay.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayErrorKind::UnknownOverlay`] if `id` is not applied, or
    /// [`OverlayErrorKind::Busy`] if an overlay applied later modifies
    /// something this one touched. The tree is unchanged on error.
    pub fn remove(&self, id: OverlayId) -> Result<(), OverlayError> {
        let targets = {
            let mut state = self.state.lock();
            let position = state
                .applied
                .iter()
                .position(|(applied, _)| *applied == id)
                .ok_or_else(|| OverlayError::new(OverlayErrorKind::UnknownOverlay, "/"))?;
            let (_, changeset) = &state.applied[position];
            if state.applied[position + 1..]
                .iter()
                .any(|(_, later)| changeset.overlaps(later))
            {
                return Err(OverlayError::new(OverlayErrorKind::Busy, "/"));
            }

            let (_, changeset) = state.applied.remove(position);
            let targets = changeset.targets().to_vec();
            state.tree.revert(changeset);
            state.generation += 1;
            targets
        };

        log::debug!("overlay {id} removed from {targets:?}");
        for listener in self.listeners() {
            listener.overlay_removed(id, &targets);
        }
        Ok(())
    }

    /// Registers a listener for overlay application and removal.
    pub fn add_listener(&self, listener: Arc<dyn ReconfigListener>) {
        self.listeners.lock().push(listener);
    }

    /// Runs `f` with shared access to the current tree.
    pub fn with_tree<R>(&self, f: impl FnOnce(&DeviceTree) -> R) -> R {
        f(&self.state.lock().tree)
    }

    /// Returns the identifiers of the applied overlays, oldest first.
    #[must_use]
    pub fn applied(&self) -> Vec<OverlayId> {
        self.state.lock().applied.iter().map(|(id, _)| *id).collect()
    }

    /// Serializes the current tree to a flattened device tree blob.
    #[must_use]
    pub fn to_dtb(&self) -> Vec<u8> {
        self.state.lock().tree.to_dtb()
    }

    fn listeners(&self) -> Vec<Arc<dyn ReconfigListener>> {
        self.listeners.lock().clone()
    }
}

impl fmt::Debug for LiveTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LiveTree")
            .field("tree", &state.tree)
            .field("applied", &state.applied.len())
            .field("generation", &state.generation)
            .finish_non_exhaustive()
    }
}
