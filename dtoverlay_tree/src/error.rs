// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error types for decoding flattened device tree blobs.

use core::fmt;

/// An error that can occur when decoding a device tree blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct FdtError {
    offset: usize,
    /// The type of the error that has occurred.
    pub kind: FdtErrorKind,
}

impl FdtError {
    pub(crate) fn new(kind: FdtErrorKind, offset: usize) -> Self {
        Self { offset, kind }
    }

    /// Returns the byte offset into the blob at which the error was detected.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// The kind of an error that can occur when decoding a device tree blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FdtErrorKind {
    /// The magic number of the device tree is invalid.
    InvalidMagic,
    /// The Device Tree version is not supported by this library.
    UnsupportedVersion(u32),
    /// The blob, or one of its blocks, is shorter than the header claims.
    InvalidLength,
    /// An invalid token was encountered.
    BadToken(u32),
    /// An invalid string was encountered.
    InvalidString,
    /// The structure block nests deeper than the decoder allows.
    TooDeep,
}

impl fmt::Display for FdtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.kind, self.offset)
    }
}

impl fmt::Display for FdtErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMagic => write!(f, "invalid FDT magic number"),
            Self::UnsupportedVersion(version) => {
                write!(f, "the FDT version {version} is not supported")
            }
            Self::InvalidLength => write!(f, "invalid FDT length"),
            Self::BadToken(token) => write!(f, "bad FDT token: 0x{token:x}"),
            Self::InvalidString => write!(f, "invalid string in FDT"),
            Self::TooDeep => write!(f, "FDT nodes are nested too deeply"),
        }
    }
}

impl core::error::Error for FdtError {}
