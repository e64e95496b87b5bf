// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

/// Size of a page; the largest blob a read returns by default.
pub const PAGE_SIZE: usize = 4096;

/// Names and limits of the overlay interface.
///
/// # Examples
///
/// ```
/// use dtoverlay::Config;
///
/// let config = Config::new().with_group("dtbo").with_read_limit(2 * dtoverlay::PAGE_SIZE);
/// assert_eq!(config.subsystem, "device-tree");
/// assert_eq!(config.group, "dtbo");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Name of the root namespace.
    pub subsystem: &'static str,
    /// Name of the group under the root namespace in which overlay items are
    /// created.
    pub group: &'static str,
    /// Largest blob, in bytes, a read of the `dtbo` attribute returns.
    pub read_limit: usize,
}

impl Config {
    /// Returns the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            subsystem: "device-tree",
            group: "overlays",
            read_limit: PAGE_SIZE,
        }
    }

    /// Sets the name of the root namespace.
    #[must_use]
    pub const fn with_subsystem(mut self, subsystem: &'static str) -> Self {
        self.subsystem = subsystem;
        self
    }

    /// Sets the name of the overlay group.
    #[must_use]
    pub const fn with_group(mut self, group: &'static str) -> Self {
        self.group = group;
        self
    }

    /// Sets the blob read limit.
    #[must_use]
    pub const fn with_read_limit(mut self, read_limit: usize) -> Self {
        self.read_limit = read_limit;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
