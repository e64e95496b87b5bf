// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Errors raised while resolving, applying or removing an overlay.

use alloc::string::String;
use core::fmt;

/// An error that can occur when resolving, applying or removing an overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct OverlayError {
    context: String,
    /// The type of the error that has occurred.
    pub kind: OverlayErrorKind,
}

impl OverlayError {
    pub(crate) fn new(kind: OverlayErrorKind, context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            kind,
        }
    }

    /// Returns the fragment, node path or label the error refers to.
    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }
}

/// The kind of an error that can occur when resolving, applying or removing
/// an overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OverlayErrorKind {
    /// A fragment has neither a `target` nor a `target-path` property.
    MissingTarget,
    /// A `target-path` is not a valid absolute path string.
    TargetPathInvalid,
    /// The node a fragment targets does not exist in the live tree.
    TargetNodeNotFound,
    /// A phandle property is not a single 32-bit cell.
    CorruptedPhandle,
    /// Renumbering a local phandle overflowed.
    PhandleOverflow,
    /// The overlay references labels but the live tree has no `__symbols__`.
    SymbolsNotFound,
    /// A label referenced from `__fixups__` is unknown to the live tree.
    SymbolNotFound,
    /// A `__fixups__` or `__local_fixups__` entry is malformed or points
    /// outside the overlay.
    InvalidFixup,
    /// A `__symbols__` entry of the overlay does not point into a fragment.
    InvalidSymbol,
    /// The overlay contains no fragment with an `__overlay__` node.
    NoFragments,
    /// No overlay with the given identifier is applied.
    UnknownOverlay,
    /// A later overlay modifies nodes this overlay touched.
    Busy,
}

impl fmt::Display for OverlayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (`{}`)", self.kind, self.context)
    }
}

impl fmt::Display for OverlayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTarget => write!(f, "fragment has no target"),
            Self::TargetPathInvalid => write!(f, "target-path property is not a valid path"),
            Self::TargetNodeNotFound => write!(f, "target node not found"),
            Self::CorruptedPhandle => write!(f, "phandle property is corrupted"),
            Self::PhandleOverflow => write!(f, "phandle renumbering overflowed"),
            Self::SymbolsNotFound => write!(f, "live tree has no __symbols__ node"),
            Self::SymbolNotFound => write!(f, "symbol not found"),
            Self::InvalidFixup => write!(f, "invalid fixup"),
            Self::InvalidSymbol => write!(f, "invalid overlay symbol"),
            Self::NoFragments => write!(f, "overlay has no fragments"),
            Self::UnknownOverlay => write!(f, "overlay is not applied"),
            Self::Busy => write!(f, "overlay is not the topmost on a node it modifies"),
        }
    }
}

impl core::error::Error for OverlayError {}
