// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use alloc::collections::TryReserveError;
use alloc::vec::Vec;

use crate::{Error, Result};

/// The staged overlay blob of an item, written and read as a single unit.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BlobBuffer {
    data: Vec<u8>,
}

impl BlobBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Replaces the content with a copy of `bytes`.
    ///
    /// The previous content is released only once the copy exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfMemory`] if the copy cannot be allocated. The
    /// buffer is left empty in that case.
    pub fn replace(&mut self, bytes: &[u8]) -> Result<()> {
        self.install(copy_of(bytes))
    }

    fn install(&mut self, copy: core::result::Result<Vec<u8>, TryReserveError>) -> Result<()> {
        match copy {
            Ok(copy) => {
                self.data = copy;
                Ok(())
            }
            Err(_) => {
                self.data = Vec::new();
                Err(Error::OutOfMemory)
            }
        }
    }

    /// Copies the whole blob into `dest` and returns its length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the blob is longer than `limit`
    /// or than `dest`.
    pub fn read(&self, dest: &mut [u8], limit: usize) -> Result<usize> {
        let len = self.data.len();
        if len > limit || len > dest.len() {
            return Err(Error::InvalidArgument);
        }
        dest[..len].copy_from_slice(&self.data);
        Ok(len)
    }

    /// Returns the staged blob.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the length of the staged blob.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns whether no blob is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn copy_of(bytes: &[u8]) -> core::result::Result<Vec<u8>, TryReserveError> {
    let mut copy = Vec::new();
    copy.try_reserve_exact(bytes.len())?;
    copy.extend_from_slice(bytes);
    Ok(copy)
}
