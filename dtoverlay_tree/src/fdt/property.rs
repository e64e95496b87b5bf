// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A read-only API for inspecting a device tree property.

use core::ffi::CStr;
use core::fmt;

use zerocopy::{FromBytes, big_endian};

use super::{FDT_TAGSIZE, Fdt, FdtToken};
use crate::error::{FdtError, FdtErrorKind};

/// A property of a device tree node.
#[derive(Debug, PartialEq)]
pub struct FdtProperty<'a> {
    name: &'a str,
    value: &'a [u8],
    value_offset: usize,
}

impl<'a> FdtProperty<'a> {
    /// Returns the name of this property.
    #[must_use]
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Returns the value of this property.
    #[must_use]
    pub fn value(&self) -> &'a [u8] {
        self.value
    }

    /// Returns the value of this property as a `u32`.
    ///
    /// # Errors
    ///
    /// Returns an [`FdtErrorKind::InvalidLength`] if the property's value is
    /// not 4 bytes long.
    pub fn as_u32(&self) -> crate::Result<u32> {
        big_endian::U32::ref_from_bytes(self.value)
            .map(|val| val.get())
            .map_err(|_e| FdtError::new(FdtErrorKind::InvalidLength, self.value_offset))
    }

    /// Returns the value of this property as a string.
    ///
    /// # Errors
    ///
    /// Returns an [`FdtErrorKind::InvalidString`] if the property's value is
    /// not a null-terminated string or contains invalid UTF-8.
    pub fn as_str(&self) -> crate::Result<&'a str> {
        let cstr = CStr::from_bytes_with_nul(self.value)
            .map_err(|_| FdtError::new(FdtErrorKind::InvalidString, self.value_offset))?;
        cstr.to_str()
            .map_err(|_| FdtError::new(FdtErrorKind::InvalidString, self.value_offset))
    }

    /// Returns an iterator over the strings in this property.
    pub fn as_str_list(&self) -> impl Iterator<Item = &'a str> + use<'a> {
        FdtStringListIterator { value: self.value }
    }

    pub(crate) fn fmt(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        write!(f, "{:indent$}{}", "", self.name, indent = indent)?;

        if self.value.is_empty() {
            writeln!(f, ";")?;
            return Ok(());
        }

        let is_printable = self
            .value
            .iter()
            .all(|&ch| ch.is_ascii_graphic() || ch == b' ' || ch == 0);
        let has_empty = self.value.windows(2).any(|window| window == [0, 0]);
        if is_printable && self.value.ends_with(&[0]) && !has_empty && self.value[0] != 0 {
            let mut strings = self.as_str_list();
            if let Some(first) = strings.next() {
                write!(f, " = \"{first}\"")?;
                for s in strings {
                    write!(f, ", \"{s}\"")?;
                }
                writeln!(f, ";")?;
                return Ok(());
            }
        }

        if self.value.len().is_multiple_of(4) {
            write!(f, " = <")?;
            for (i, chunk) in self.value.chunks_exact(4).enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                let val = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                write!(f, "0x{val:02x}")?;
            }
            writeln!(f, ">;")?;
        } else {
            write!(f, " = [")?;
            for (i, byte) in self.value.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{byte:02x}")?;
            }
            writeln!(f, "];")?;
        }

        Ok(())
    }
}

/// An iterator over the properties of a device tree node.
pub(crate) enum FdtPropIter<'a> {
    Start { fdt: &'a Fdt<'a>, offset: usize },
    Running { fdt: &'a Fdt<'a>, offset: usize },
    Done,
}

impl<'a> Iterator for FdtPropIter<'a> {
    type Item = crate::Result<FdtProperty<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Start { fdt, offset } => {
                let fdt = *fdt;
                match fdt.node_body_offset(*offset) {
                    Ok(offset) => {
                        *self = Self::Running { fdt, offset };
                        self.next()
                    }
                    Err(e) => {
                        *self = Self::Done;
                        Some(Err(e))
                    }
                }
            }
            Self::Running { fdt, offset } => {
                let fdt = *fdt;
                match Self::try_next(fdt, offset) {
                    Ok(Some(prop)) => Some(Ok(prop)),
                    Ok(None) => {
                        *self = Self::Done;
                        None
                    }
                    Err(e) => {
                        *self = Self::Done;
                        Some(Err(e))
                    }
                }
            }
            Self::Done => None,
        }
    }
}

impl<'a> FdtPropIter<'a> {
    fn try_next(fdt: &'a Fdt<'a>, offset: &mut usize) -> crate::Result<Option<FdtProperty<'a>>> {
        loop {
            match fdt.read_token(*offset)? {
                FdtToken::Prop => {
                    let (len, nameoff) = fdt.read_prop_header(*offset)?;
                    let value_offset = *offset + 3 * FDT_TAGSIZE;
                    let value = fdt.bytes(value_offset, len)?;
                    let name = fdt.string(nameoff)?;
                    *offset = Fdt::align_tag_offset(value_offset + len);
                    return Ok(Some(FdtProperty {
                        name,
                        value,
                        value_offset,
                    }));
                }
                FdtToken::Nop => *offset += FDT_TAGSIZE,
                _ => return Ok(None),
            }
        }
    }
}

struct FdtStringListIterator<'a> {
    value: &'a [u8],
}

impl<'a> Iterator for FdtStringListIterator<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.value.is_empty() {
            return None;
        }
        let cstr = CStr::from_bytes_until_nul(self.value).ok()?;
        let s = cstr.to_str().ok()?;
        self.value = &self.value[s.len() + 1..];
        Some(s)
    }
}
