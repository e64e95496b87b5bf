// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Error type shared by every overlay operation.

use core::fmt;

/// Positive errno values reported through [`Error::errno`].
pub mod errno {
    /// Operation not permitted.
    pub const EPERM: i32 = 1;
    /// No such file or directory.
    pub const ENOENT: i32 = 2;
    /// Out of memory.
    pub const ENOMEM: i32 = 12;
    /// Device or resource busy.
    pub const EBUSY: i32 = 16;
    /// File exists.
    pub const EEXIST: i32 = 17;
    /// No such device.
    pub const ENODEV: i32 = 19;
    /// Invalid argument.
    pub const EINVAL: i32 = 22;
}

/// An error returned by an overlay item, group or the dispatch host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A buffer or name could not be allocated.
    OutOfMemory,
    /// A read did not fit the destination or the read limit, or an attribute
    /// is unknown.
    InvalidArgument,
    /// The operation is not allowed in the current state.
    PermissionDenied,
    /// No item, group or subsystem exists at the given path.
    NotFound,
    /// The name is already taken.
    AlreadyExists,
    /// A registered default group cannot be removed.
    Busy,
    /// The blob could not be decoded into a tree.
    Decode,
    /// The overlay references something the live tree does not provide.
    Resolve,
    /// The live tree refused to attach or detach the overlay. Carries the
    /// negative errno reported by the tree.
    Attach(i32),
}

impl Error {
    /// Returns the negative errno matching this error.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::OutOfMemory => -errno::ENOMEM,
            Self::InvalidArgument | Self::Decode | Self::Resolve => -errno::EINVAL,
            Self::PermissionDenied => -errno::EPERM,
            Self::NotFound => -errno::ENOENT,
            Self::AlreadyExists => -errno::EEXIST,
            Self::Busy => -errno::EBUSY,
            Self::Attach(errno) => errno,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::PermissionDenied => write!(f, "operation not permitted"),
            Self::NotFound => write!(f, "no such item"),
            Self::AlreadyExists => write!(f, "name already exists"),
            Self::Busy => write!(f, "resource busy"),
            Self::Decode => write!(f, "failed to unflatten overlay blob"),
            Self::Resolve => write!(f, "failed to resolve overlay phandles"),
            Self::Attach(errno) => write!(f, "failed to attach overlay ({errno})"),
        }
    }
}

impl core::error::Error for Error {}

/// A result type specialized for overlay operations.
pub type Result<T> = core::result::Result<T, Error>;
