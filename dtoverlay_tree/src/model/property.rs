// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use crate::fdt::FdtProperty;
use alloc::{
    string::{String, ToString},
    vec::Vec,
};

/// A mutable, in-memory representation of a device tree property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTreeProperty {
    name: String,
    value: Vec<u8>,
}

impl DeviceTreeProperty {
    /// Creates a new `DeviceTreeProperty` with the given name and value.
    ///
    /// # Examples
    ///
    /// ```
    /// # use dtoverlay_tree::model::DeviceTreeProperty;
    /// let prop = DeviceTreeProperty::new("my-prop", vec![1, 2, 3, 4]);
    /// assert_eq!(prop.name(), "my-prop");
    /// assert_eq!(prop.value(), &[1, 2, 3, 4]);
    /// ```
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Returns the name of this property.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value of this property.
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Sets the value of this property.
    pub fn set_value(&mut self, value: impl Into<Vec<u8>>) {
        self.value = value.into();
    }

    /// Returns the value of this property as a `u32`, or `None` if it is not
    /// exactly four bytes long.
    #[must_use]
    pub fn as_u32(&self) -> Option<u32> {
        self.value
            .as_slice()
            .try_into()
            .ok()
            .map(u32::from_be_bytes)
    }

    /// Returns the value of this property as a string, without the trailing
    /// NUL terminator.
    ///
    /// # Examples
    ///
    /// ```
    /// # use dtoverlay_tree::model::DeviceTreeProperty;
    /// let prop = DeviceTreeProperty::new("my-prop", "hello\0");
    /// assert_eq!(prop.as_str(), Some("hello"));
    /// ```
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.value)
            .ok()
            .map(|s| s.trim_end_matches('\0'))
    }

    /// Returns an iterator over the NUL-separated strings of this property.
    ///
    /// # Examples
    ///
    /// ```
    /// # use dtoverlay_tree::model::DeviceTreeProperty;
    /// let prop = DeviceTreeProperty::new("compatible", "vendor,uart\0ns16550\0");
    /// let list: Vec<_> = prop.as_str_list().collect();
    /// assert_eq!(list, ["vendor,uart", "ns16550"]);
    /// ```
    pub fn as_str_list(&self) -> impl Iterator<Item = &str> {
        self.value
            .split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .filter_map(|s| core::str::from_utf8(s).ok())
    }

    /// Reads the big-endian `u32` cell at byte `offset` of the value.
    #[must_use]
    pub fn cell_at(&self, offset: usize) -> Option<u32> {
        let bytes = self.value.get(offset..offset.checked_add(4)?)?;
        bytes.try_into().ok().map(u32::from_be_bytes)
    }

    /// Overwrites the big-endian `u32` cell at byte `offset` of the value.
    ///
    /// Returns `false`, leaving the value untouched, if the cell does not fit.
    pub fn set_cell_at(&mut self, offset: usize, cell: u32) -> bool {
        let Some(end) = offset.checked_add(4) else {
            return false;
        };
        match self.value.get_mut(offset..end) {
            Some(bytes) => {
                bytes.copy_from_slice(&cell.to_be_bytes());
                true
            }
            None => false,
        }
    }
}

impl<'a> From<FdtProperty<'a>> for DeviceTreeProperty {
    fn from(prop: FdtProperty<'a>) -> Self {
        DeviceTreeProperty {
            name: prop.name().to_string(),
            value: prop.value().to_vec(),
        }
    }
}
