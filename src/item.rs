// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A single overlay: a staged blob and whether it is applied.

use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;

use log::{debug, error, warn};
use spin::mutex::SpinMutex;

use crate::blob::BlobBuffer;
use crate::configfs::{Attribute, AttributeKind, ItemOperations};
use crate::tree::OverlayTree;
use crate::{Error, Result};

/// Name of the binary attribute holding the overlay blob.
pub const DTBO: &str = "dtbo";
/// Name of the text attribute controlling whether the overlay is applied.
pub const STATUS: &str = "status";

static ATTRIBUTES: [Attribute; 2] = [
    Attribute {
        name: DTBO,
        kind: AttributeKind::Binary,
    },
    Attribute {
        name: STATUS,
        kind: AttributeKind::Text,
    },
];

struct ItemState<H> {
    blob: BlobBuffer,
    /// Handle of the attached overlay, `None` while unapplied.
    applied: Option<H>,
}

/// An overlay item.
///
/// The blob can only be replaced while the overlay is not applied. Dropping
/// an applied item detaches its overlay first.
pub struct OverlayItem<T: OverlayTree> {
    name: String,
    tree: Arc<T>,
    read_limit: usize,
    state: SpinMutex<ItemState<T::Handle>>,
}

impl<T: OverlayTree> OverlayItem<T> {
    /// Creates an unapplied item with an empty blob.
    #[must_use]
    pub fn new(name: String, tree: Arc<T>, read_limit: usize) -> Self {
        Self {
            name,
            tree,
            read_limit,
            state: SpinMutex::new(ItemState {
                blob: BlobBuffer::new(),
                applied: None,
            }),
        }
    }

    /// Returns the name of the item.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether the overlay is attached to the live tree.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.state.lock().applied.is_some()
    }

    /// Stages a new blob and returns the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] while the overlay is applied, or
    /// [`Error::OutOfMemory`] if the copy cannot be allocated, in which case
    /// the staged blob is left empty.
    pub fn store_blob(&self, data: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        if state.applied.is_some() {
            return Err(Error::PermissionDenied);
        }
        state.blob.replace(data)?;
        debug!("overlay {}: staged {} byte blob", self.name, data.len());
        Ok(data.len())
    }

    /// Copies the staged blob into `page`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the blob exceeds the read limit
    /// or `page`.
    pub fn show_blob(&self, page: &mut [u8]) -> Result<usize> {
        self.state.lock().blob.read(page, self.read_limit)
    }

    /// Applies or releases the overlay according to `data`.
    ///
    /// `"0"` releases an applied overlay; any other unsigned integer applies
    /// an unapplied one. Writes that match the current state do nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] if `data` is not an unsigned
    /// integer, or the error of [`Self::apply`].
    pub fn store_status(&self, data: &[u8]) -> Result<usize> {
        let status = parse_status(data).ok_or(Error::PermissionDenied)?;

        let mut state = self.state.lock();
        if status == 0 {
            self.release_locked(&mut state);
        } else if state.applied.is_none() {
            self.apply_locked(&mut state)?;
        }
        Ok(data.len())
    }

    /// Writes `"1\n"` or `"0\n"` to `page`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `page` is shorter than two bytes.
    pub fn show_status(&self, page: &mut [u8]) -> Result<usize> {
        let status = if self.is_applied() { b"1\n" } else { b"0\n" };
        let dest = page.get_mut(..status.len()).ok_or(Error::InvalidArgument)?;
        dest.copy_from_slice(status);
        Ok(status.len())
    }

    /// Decodes, resolves and attaches the staged blob. Does nothing if the
    /// overlay is already applied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`], [`Error::Resolve`] or [`Error::Attach`]
    /// from the failing stage. The item stays unapplied.
    pub fn apply(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.applied.is_some() {
            return Ok(());
        }
        self.apply_locked(&mut state)
    }

    /// Detaches the overlay. Does nothing if it is not applied.
    pub fn release(&self) {
        self.release_locked(&mut self.state.lock());
    }

    fn apply_locked(&self, state: &mut ItemState<T::Handle>) -> Result<()> {
        let decoded = self.tree.unflatten(state.blob.as_bytes()).inspect_err(|e| {
            error!("overlay {}: failed to unflatten blob: {e}", self.name);
        })?;
        let resolved = self.tree.resolve(decoded).inspect_err(|e| {
            error!("overlay {}: failed to resolve: {e}", self.name);
        })?;
        let handle = self.tree.apply(resolved).inspect_err(|e| {
            error!("overlay {}: failed to apply: {e}", self.name);
        })?;
        state.applied = Some(handle);
        debug!("overlay {}: applied", self.name);
        Ok(())
    }

    fn release_locked(&self, state: &mut ItemState<T::Handle>) {
        let Some(handle) = state.applied.take() else {
            return;
        };
        // TODO: keep the handle when removal fails with EBUSY so that a later
        // status write can retry it.
        match self.tree.remove(handle) {
            Ok(()) => debug!("overlay {}: removed", self.name),
            Err(e) => warn!("overlay {}: failed to remove: {e}", self.name),
        }
    }
}

impl<T: OverlayTree> Drop for OverlayItem<T> {
    fn drop(&mut self) {
        let Self { name, tree, state, .. } = self;
        let state = state.get_mut();
        if let Some(handle) = state.applied.take() {
            if let Err(e) = tree.remove(handle) {
                warn!("overlay {name}: failed to remove on release: {e}");
            }
        }
        debug!("overlay {name}: released");
    }
}

impl<T: OverlayTree> fmt::Debug for OverlayItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("OverlayItem")
            .field("name", &self.name)
            .field("blob_len", &state.blob.len())
            .field("applied", &state.applied.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: OverlayTree> ItemOperations for OverlayItem<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn attributes(&self) -> &'static [Attribute] {
        &ATTRIBUTES
    }

    fn show(&self, attribute: &str, page: &mut [u8]) -> Result<usize> {
        match attribute {
            DTBO => self.show_blob(page),
            STATUS => self.show_status(page),
            _ => Err(Error::InvalidArgument),
        }
    }

    fn store(&self, attribute: &str, data: &[u8]) -> Result<usize> {
        match attribute {
            DTBO => self.store_blob(data),
            STATUS => self.store_status(data),
            _ => Err(Error::InvalidArgument),
        }
    }
}

/// Parses an unsigned base-10 integer: an optional `+`, at least one digit
/// and at most one trailing newline.
fn parse_status(data: &[u8]) -> Option<u64> {
    let data = data.strip_suffix(b"\n").unwrap_or(data);
    let digits = data.strip_prefix(b"+").unwrap_or(data);
    if digits.is_empty() {
        return None;
    }
    digits.iter().try_fold(0u64, |value, &digit| {
        if !digit.is_ascii_digit() {
            return None;
        }
        value.checked_mul(10)?.checked_add(u64::from(digit - b'0'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing() {
        assert_eq!(parse_status(b"0"), Some(0));
        assert_eq!(parse_status(b"1\n"), Some(1));
        assert_eq!(parse_status(b"+42"), Some(42));
        assert_eq!(parse_status(b"18446744073709551615"), Some(u64::MAX));

        assert_eq!(parse_status(b""), None);
        assert_eq!(parse_status(b"\n"), None);
        assert_eq!(parse_status(b"+"), None);
        assert_eq!(parse_status(b"-1"), None);
        assert_eq!(parse_status(b"1\n\n"), None);
        assert_eq!(parse_status(b" 1"), None);
        assert_eq!(parse_status(b"0x1"), None);
        assert_eq!(parse_status(b"yes"), None);
        assert_eq!(parse_status(b"18446744073709551616"), None);
    }
}
