// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A read-only API for inspecting a device tree node.

use super::{FDT_TAGSIZE, Fdt, FdtToken};
use crate::error::{FdtError, FdtErrorKind};
use crate::fdt::property::{FdtPropIter, FdtProperty};
use core::fmt;

/// A node in a flattened device tree.
#[derive(Clone, Copy)]
pub struct FdtNode<'a> {
    pub(crate) fdt: &'a Fdt<'a>,
    pub(crate) offset: usize,
}

impl fmt::Debug for FdtNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FdtNode")
            .field("name", &self.name())
            .field("offset", &self.offset)
            .finish()
    }
}

impl<'a> FdtNode<'a> {
    /// Returns the name of this node.
    ///
    /// The root node's name is the empty string.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not a NUL-terminated UTF-8 string.
    pub fn name(&self) -> crate::Result<&'a str> {
        let name_offset = self.offset + FDT_TAGSIZE;
        self.fdt.string_at_offset(name_offset, None)
    }

    /// Returns a property by its name.
    ///
    /// # Performance
    ///
    /// This method iterates through all properties of the node. If you need
    /// to call this often, consider converting to a
    /// [`DeviceTreeNode`](crate::model::DeviceTreeNode) first.
    ///
    /// # Errors
    ///
    /// Returns an error if a property before the matching one is malformed.
    pub fn property(&self, name: &str) -> crate::Result<Option<FdtProperty<'a>>> {
        for property in self.properties() {
            let property = property?;
            if property.name() == name {
                return Ok(Some(property));
            }
        }
        Ok(None)
    }

    /// Returns an iterator over the properties of this node.
    pub fn properties(&self) -> impl Iterator<Item = crate::Result<FdtProperty<'a>>> + use<'a> {
        FdtPropIter::Start {
            fdt: self.fdt,
            offset: self.offset,
        }
    }

    /// Returns a child node by its name.
    ///
    /// # Errors
    ///
    /// Returns an error if a child before the matching one is malformed.
    pub fn child(&self, name: &str) -> crate::Result<Option<FdtNode<'a>>> {
        for child in self.children() {
            let child = child?;
            if child.name()? == name {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    /// Returns an iterator over the children of this node.
    ///
    /// The iterator yields at most one error and then stops.
    pub fn children(&self) -> impl Iterator<Item = crate::Result<FdtNode<'a>>> + use<'a> {
        FdtChildIter::Start {
            fdt: self.fdt,
            offset: self.offset,
        }
    }

    pub(crate) fn fmt_recursive(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let name = self.name().map_err(|_| fmt::Error)?;
        if name.is_empty() {
            writeln!(f, "{:indent$}/ {{", "", indent = indent)?;
        } else {
            writeln!(f, "{:indent$}{} {{", "", name, indent = indent)?;
        }

        let mut separate = false;
        for prop in self.properties() {
            separate = true;
            match prop {
                Ok(prop) => prop.fmt(f, indent + 4)?,
                Err(_e) => {
                    writeln!(f, "<Error reading property>")?;
                }
            }
        }

        for child in self.children() {
            if separate {
                writeln!(f)?;
            }
            separate = true;
            match child {
                Ok(child) => child.fmt_recursive(f, indent + 4)?,
                Err(_e) => {
                    writeln!(f, "<Error reading child node>")?;
                }
            }
        }

        writeln!(f, "{:indent$}}};", "", indent = indent)
    }
}

/// An iterator over the children of a device tree node.
enum FdtChildIter<'a> {
    Start { fdt: &'a Fdt<'a>, offset: usize },
    Running { fdt: &'a Fdt<'a>, offset: usize },
    Done,
}

impl<'a> Iterator for FdtChildIter<'a> {
    type Item = crate::Result<FdtNode<'a>>;

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
                    Ok(Some(node)) => Some(Ok(node)),
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

impl<'a> FdtChildIter<'a> {
    fn try_next(fdt: &'a Fdt<'a>, offset: &mut usize) -> crate::Result<Option<FdtNode<'a>>> {
        loop {
            match fdt.read_token(*offset)? {
                FdtToken::BeginNode => {
                    let node_offset = *offset;
                    *offset = fdt.next_sibling_offset(node_offset)?;
                    return Ok(Some(FdtNode {
                        fdt,
                        offset: node_offset,
                    }));
                }
                FdtToken::EndNode => return Ok(None),
                FdtToken::Prop => *offset = fdt.next_property_offset(*offset)?,
                FdtToken::Nop => *offset += FDT_TAGSIZE,
                FdtToken::End => {
                    return Err(FdtError::new(
                        FdtErrorKind::BadToken(super::FDT_END),
                        *offset,
                    ));
                }
            }
        }
    }
}
