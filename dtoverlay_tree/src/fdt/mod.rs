// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A read-only API for decoding a [Flattened Device Tree (FDT)].
//!
//! This module provides the [`Fdt`] struct, which is the entry point for
//! decoding an FDT blob. It performs no memory allocation and provides a
//! zero-copy view of the FDT data.
//!
//! Overlay blobs are handed to this decoder straight from user space, so no
//! access here may index past the end of the blob: every read is checked and
//! malformed input produces an [`FdtError`] instead of a panic. Nesting depth
//! is bounded by [`MAX_DEPTH`].
//!
//! [Flattened Device Tree (FDT)]: https://devicetree-specification.readthedocs.io/en/latest/chapter5-flattened-format.html

use crate::error::{FdtError, FdtErrorKind};
mod node;
mod property;
use core::ffi::CStr;
use core::fmt;

use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;
use zerocopy::byteorder::big_endian;

pub use node::FdtNode;
pub use property::FdtProperty;

/// Version of the FDT specification supported by this library.
const FDT_VERSION: u32 = 17;
/// Maximum nesting depth of nodes accepted by the decoder.
pub const MAX_DEPTH: usize = 64;
pub(crate) const FDT_TAGSIZE: usize = size_of::<u32>();
pub(crate) const FDT_MAGIC: u32 = 0xd00d_feed;
pub(crate) const FDT_BEGIN_NODE: u32 = 0x1;
pub(crate) const FDT_END_NODE: u32 = 0x2;
pub(crate) const FDT_PROP: u32 = 0x3;
pub(crate) const FDT_NOP: u32 = 0x4;
pub(crate) const FDT_END: u32 = 0x9;

#[repr(C, packed)]
#[derive(Debug, Copy, Clone, FromBytes, IntoBytes, Unaligned, Immutable, KnownLayout)]
pub(crate) struct FdtHeader {
    /// Magic number of the device tree.
    pub(crate) magic: big_endian::U32,
    /// Total size of the device tree.
    pub(crate) totalsize: big_endian::U32,
    /// Offset of the device tree structure.
    pub(crate) off_dt_struct: big_endian::U32,
    /// Offset of the device tree strings.
    pub(crate) off_dt_strings: big_endian::U32,
    /// Offset of the memory reservation map.
    pub(crate) off_mem_rsvmap: big_endian::U32,
    /// Version of the device tree.
    pub(crate) version: big_endian::U32,
    /// Last compatible version of the device tree.
    pub(crate) last_comp_version: big_endian::U32,
    /// Physical ID of the boot CPU.
    pub(crate) boot_cpuid_phys: big_endian::U32,
    /// Size of the device tree strings.
    pub(crate) size_dt_strings: big_endian::U32,
    /// Size of the device tree structure.
    pub(crate) size_dt_struct: big_endian::U32,
}

impl FdtHeader {
    pub(crate) fn magic(&self) -> u32 {
        self.magic.get()
    }

    pub(crate) fn totalsize(&self) -> u32 {
        self.totalsize.get()
    }

    pub(crate) fn off_dt_struct(&self) -> u32 {
        self.off_dt_struct.get()
    }

    pub(crate) fn off_dt_strings(&self) -> u32 {
        self.off_dt_strings.get()
    }

    pub(crate) fn version(&self) -> u32 {
        self.version.get()
    }

    pub(crate) fn last_comp_version(&self) -> u32 {
        self.last_comp_version.get()
    }

    pub(crate) fn size_dt_strings(&self) -> u32 {
        self.size_dt_strings.get()
    }

    pub(crate) fn size_dt_struct(&self) -> u32 {
        self.size_dt_struct.get()
    }
}

/// A flattened device tree.
pub struct Fdt<'a> {
    pub(crate) data: &'a [u8],
    header: FdtHeader,
}

impl fmt::Debug for Fdt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fdt")
            .field("totalsize", &self.header.totalsize())
            .field("version", &self.header.version())
            .finish_non_exhaustive()
    }
}

/// A token in the device tree structure.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum FdtToken {
    BeginNode,
    EndNode,
    Prop,
    Nop,
    End,
}

impl TryFrom<u32> for FdtToken {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            FDT_BEGIN_NODE => Ok(FdtToken::BeginNode),
            FDT_END_NODE => Ok(FdtToken::EndNode),
            FDT_PROP => Ok(FdtToken::Prop),
            FDT_NOP => Ok(FdtToken::Nop),
            FDT_END => Ok(FdtToken::End),
            _ => Err(value),
        }
    }
}

impl<'a> Fdt<'a> {
    /// Creates a new `Fdt` from the given byte slice.
    ///
    /// The slice may be longer than the `totalsize` recorded in the header;
    /// trailing bytes are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the header is invalid: bad magic number,
    /// unsupported version, or blocks that do not fit inside the blob.
    ///
    /// # Examples
    ///
    /// ```
    /// # use dtoverlay_tree::fdt::Fdt;
    /// # use dtoverlay_tree::model::{DeviceTree, DeviceTreeNode};
    /// let dtb = DeviceTree::new(DeviceTreeNode::new("")).to_dtb();
    /// let fdt = Fdt::new(&dtb).unwrap();
    /// assert_eq!(fdt.total_size(), dtb.len());
    /// ```
    pub fn new(data: &'a [u8]) -> crate::Result<Self> {
        let (header, _) = FdtHeader::read_from_prefix(data)
            .map_err(|_| FdtError::new(FdtErrorKind::InvalidLength, 0))?;

        if header.magic() != FDT_MAGIC {
            return Err(FdtError::new(FdtErrorKind::InvalidMagic, 0));
        }
        if !(header.last_comp_version()..=header.version()).contains(&FDT_VERSION) {
            return Err(FdtError::new(
                FdtErrorKind::UnsupportedVersion(header.version()),
                20,
            ));
        }

        let totalsize = header.totalsize() as usize;
        if totalsize < size_of::<FdtHeader>() || totalsize > data.len() {
            return Err(FdtError::new(FdtErrorKind::InvalidLength, 4));
        }
        Self::check_block(header.off_dt_struct(), header.size_dt_struct(), totalsize, 8)?;
        Self::check_block(
            header.off_dt_strings(),
            header.size_dt_strings(),
            totalsize,
            12,
        )?;

        Ok(Fdt {
            data: &data[..totalsize],
            header,
        })
    }

    fn check_block(offset: u32, size: u32, totalsize: usize, field: usize) -> crate::Result<()> {
        let end = (offset as usize).checked_add(size as usize);
        match end {
            Some(end) if end <= totalsize && offset as usize >= size_of::<FdtHeader>() => Ok(()),
            _ => Err(FdtError::new(FdtErrorKind::InvalidLength, field)),
        }
    }

    /// Returns the total size of the blob in bytes, as recorded in the header.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.data.len()
    }

    /// Returns the header of the device tree.
    pub(crate) fn header(&self) -> &FdtHeader {
        &self.header
    }

    /// Returns the root node of the device tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the structure block does not start with a node.
    pub fn root(&self) -> crate::Result<FdtNode<'_>> {
        let mut offset = self.header().off_dt_struct() as usize;
        loop {
            match self.read_token(offset)? {
                FdtToken::Nop => offset += FDT_TAGSIZE,
                FdtToken::BeginNode => return Ok(FdtNode { fdt: self, offset }),
                _ => {
                    return Err(FdtError::new(
                        FdtErrorKind::BadToken(FDT_BEGIN_NODE),
                        offset,
                    ));
                }
            }
        }
    }

    /// Finds a node by its path.
    ///
    /// # Performance
    ///
    /// This method traverses the device tree and its performance is linear in
    /// the number of nodes in the path. If you need to call this often,
    /// consider using [`DeviceTree::from_fdt`](crate::model::DeviceTree::from_fdt)
    /// first.
    pub fn find_node(&self, path: &str) -> Option<crate::Result<FdtNode<'_>>> {
        if !path.starts_with('/') {
            return None;
        }
        let mut current_node = match self.root() {
            Ok(node) => node,
            Err(e) => return Some(Err(e)),
        };
        for component in path.split('/').filter(|s| !s.is_empty()) {
            match current_node.child(component) {
                Ok(Some(node)) => current_node = node,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
        Some(Ok(current_node))
    }

    fn read_u32(&self, offset: usize) -> crate::Result<u32> {
        self.data
            .get(offset..)
            .and_then(|rest| big_endian::U32::ref_from_prefix(rest).ok())
            .map(|(val, _)| val.get())
            .ok_or_else(|| FdtError::new(FdtErrorKind::InvalidLength, offset))
    }

    pub(crate) fn read_token(&self, offset: usize) -> crate::Result<FdtToken> {
        let val = self.read_u32(offset)?;
        FdtToken::try_from(val).map_err(|t| FdtError::new(FdtErrorKind::BadToken(t), offset))
    }

    /// Returns the value length and name offset of the property whose
    /// `FDT_PROP` token is at `offset`.
    pub(crate) fn read_prop_header(&self, offset: usize) -> crate::Result<(usize, usize)> {
        let len = self.read_u32(offset + FDT_TAGSIZE)? as usize;
        let nameoff = self.read_u32(offset + 2 * FDT_TAGSIZE)? as usize;
        Ok((len, nameoff))
    }

    /// Returns `len` bytes of the blob starting at `offset`.
    pub(crate) fn bytes(&self, offset: usize, len: usize) -> crate::Result<&'a [u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| FdtError::new(FdtErrorKind::InvalidLength, offset))
    }

    /// Return a string from the string block.
    pub(crate) fn string(&self, string_block_offset: usize) -> crate::Result<&'a str> {
        let header = self.header();
        let strings_start = header.off_dt_strings() as usize;
        let strings_end = strings_start + header.size_dt_strings() as usize;
        let string_start = strings_start.saturating_add(string_block_offset);

        if string_start >= strings_end {
            return Err(FdtError::new(FdtErrorKind::InvalidLength, string_start));
        }

        self.string_at_offset(string_start, Some(strings_end))
    }

    /// Return a NUL-terminated string from a given offset.
    pub(crate) fn string_at_offset(
        &self,
        offset: usize,
        end: Option<usize>,
    ) -> crate::Result<&'a str> {
        let slice = match end {
            Some(end) => self.data.get(offset..end),
            None => self.data.get(offset..),
        }
        .ok_or_else(|| FdtError::new(FdtErrorKind::InvalidString, offset))?;

        match CStr::from_bytes_until_nul(slice).map(CStr::to_str) {
            Ok(Ok(val)) => Ok(val),
            _ => Err(FdtError::new(FdtErrorKind::InvalidString, offset)),
        }
    }

    pub(crate) fn find_string_end(&self, start: usize) -> crate::Result<usize> {
        let rest = self
            .data
            .get(start..)
            .ok_or_else(|| FdtError::new(FdtErrorKind::InvalidString, start))?;
        rest.iter()
            .position(|&b| b == 0)
            .map(|nul| start + nul + 1)
            .ok_or_else(|| FdtError::new(FdtErrorKind::InvalidString, start))
    }

    /// Returns the offset of the first token after the name of the node
    /// starting at `offset`.
    pub(crate) fn node_body_offset(&self, offset: usize) -> crate::Result<usize> {
        let name_end = self.find_string_end(offset + FDT_TAGSIZE)?;
        Ok(Self::align_tag_offset(name_end))
    }

    /// Returns the offset just past the node starting at `offset`.
    pub(crate) fn next_sibling_offset(&self, offset: usize) -> crate::Result<usize> {
        self.skip_node(offset, 0)
    }

    fn skip_node(&self, offset: usize, depth: usize) -> crate::Result<usize> {
        if depth >= MAX_DEPTH {
            return Err(FdtError::new(FdtErrorKind::TooDeep, offset));
        }
        let mut offset = self.node_body_offset(offset)?;

        loop {
            match self.read_token(offset)? {
                FdtToken::Prop => offset = self.next_property_offset(offset)?,
                FdtToken::Nop => offset += FDT_TAGSIZE,
                FdtToken::BeginNode => offset = self.skip_node(offset, depth + 1)?,
                FdtToken::EndNode => return Ok(offset + FDT_TAGSIZE),
                FdtToken::End => {
                    return Err(FdtError::new(FdtErrorKind::BadToken(FDT_END), offset));
                }
            }
        }
    }

    /// Returns the offset of the token following the property whose
    /// `FDT_PROP` token is at `offset`.
    pub(crate) fn next_property_offset(&self, offset: usize) -> crate::Result<usize> {
        let (len, _) = self.read_prop_header(offset)?;
        let value_offset = offset + 3 * FDT_TAGSIZE;
        // Make sure the value really is inside the blob.
        self.bytes(value_offset, len)?;
        Ok(Self::align_tag_offset(value_offset + len))
    }

    pub(crate) fn align_tag_offset(offset: usize) -> usize {
        offset.next_multiple_of(FDT_TAGSIZE)
    }
}

impl fmt::Display for Fdt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "/dts-v1/;")?;
        writeln!(f)?;
        let root = self.root().map_err(|_| fmt::Error)?;
        root.fmt_recursive(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FdtErrorKind;
    use alloc::vec::Vec;

    const FDT_HEADER_OK: &[u8] = &[
        0xd0, 0x0d, 0xfe, 0xed, // magic
        0x00, 0x00, 0x00, 0x48, // totalsize = 72
        0x00, 0x00, 0x00, 0x38, // off_dt_struct = 56
        0x00, 0x00, 0x00, 0x48, // off_dt_strings = 72
        0x00, 0x00, 0x00, 0x28, // off_mem_rsvmap = 40
        0x00, 0x00, 0x00, 0x11, // version = 17
        0x00, 0x00, 0x00, 0x10, // last_comp_version = 16
        0x00, 0x00, 0x00, 0x00, // boot_cpuid_phys = 0
        0x00, 0x00, 0x00, 0x00, // size_dt_strings = 0
        0x00, 0x00, 0x00, 0x10, // size_dt_struct = 16
        0x00, 0x00, 0x00, 0x00, // memory reservation
        0x00, 0x00, 0x00, 0x00, // ...
        0x00, 0x00, 0x00, 0x00, // ...
        0x00, 0x00, 0x00, 0x00, // ...
        0x00, 0x00, 0x00, 0x01, // FDT_BEGIN_NODE
        0x00, 0x00, 0x00, 0x00, // "" (root name)
        0x00, 0x00, 0x00, 0x02, // FDT_END_NODE
        0x00, 0x00, 0x00, 0x09, // FDT_END
    ];

    #[test]
    fn header_is_parsed_correctly() {
        let fdt = Fdt::new(FDT_HEADER_OK).unwrap();
        let header = fdt.header();

        assert_eq!(header.totalsize(), 72);
        assert_eq!(header.off_dt_struct(), 56);
        assert_eq!(header.off_dt_strings(), 72);
        assert_eq!(header.version(), 17);
        assert_eq!(header.last_comp_version(), 16);
        assert_eq!(header.size_dt_strings(), 0);
        assert_eq!(header.size_dt_struct(), 16);
        assert_eq!(fdt.root().unwrap().name().unwrap(), "");
    }

    #[test]
    fn invalid_magic() {
        let mut header = FDT_HEADER_OK.to_vec();
        header[0] = 0x00;
        let result = Fdt::new(&header);
        assert!(matches!(result, Err(e) if matches!(e.kind, FdtErrorKind::InvalidMagic)));
    }

    #[test]
    fn invalid_length() {
        let header = &FDT_HEADER_OK[..10];
        let result = Fdt::new(header);
        assert!(matches!(result, Err(e) if matches!(e.kind, FdtErrorKind::InvalidLength)));
    }

    #[test]
    fn truncated_blob() {
        let header = &FDT_HEADER_OK[..60];
        let result = Fdt::new(header);
        assert!(matches!(result, Err(e) if matches!(e.kind, FdtErrorKind::InvalidLength)));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut blob = FDT_HEADER_OK.to_vec();
        blob.extend_from_slice(&[0xff; 8]);
        let fdt = Fdt::new(&blob).unwrap();
        assert_eq!(fdt.total_size(), FDT_HEADER_OK.len());
    }

    #[test]
    fn struct_block_outside_blob() {
        let mut header = FDT_HEADER_OK.to_vec();
        header[39] = 0xff; // size_dt_struct = 255
        let result = Fdt::new(&header);
        assert!(matches!(result, Err(e) if matches!(e.kind, FdtErrorKind::InvalidLength)));
    }

    #[test]
    fn unsupported_version() {
        let mut header = FDT_HEADER_OK.to_vec();
        header[23] = 0x10;
        let result = Fdt::new(&header);
        assert!(matches!(result, Err(e) if matches!(e.kind, FdtErrorKind::UnsupportedVersion(16))));
    }

    #[test]
    fn missing_end_node_is_an_error() {
        let mut blob = FDT_HEADER_OK.to_vec();
        // Replace FDT_END_NODE with FDT_END.
        blob[67] = 0x09;
        let fdt = Fdt::new(&blob).unwrap();
        let root = fdt.root().unwrap();
        assert!(fdt.next_sibling_offset(root.offset).is_err());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let mut structure = Vec::new();
        for _ in 0..=MAX_DEPTH {
            structure.extend_from_slice(&FDT_BEGIN_NODE.to_be_bytes());
            structure.extend_from_slice(&[b'n', 0, 0, 0]);
        }
        for _ in 0..=MAX_DEPTH {
            structure.extend_from_slice(&FDT_END_NODE.to_be_bytes());
        }
        structure.extend_from_slice(&FDT_END.to_be_bytes());

        let mut blob = FDT_HEADER_OK[..56].to_vec();
        let total = u32::try_from(blob.len() + structure.len()).unwrap();
        blob[4..8].copy_from_slice(&total.to_be_bytes());
        blob[12..16].copy_from_slice(&total.to_be_bytes());
        blob[36..40].copy_from_slice(&u32::try_from(structure.len()).unwrap().to_be_bytes());
        blob.extend_from_slice(&structure);

        let fdt = Fdt::new(&blob).unwrap();
        let root = fdt.root().unwrap();
        let err = fdt.next_sibling_offset(root.offset).unwrap_err();
        assert_eq!(err.kind, FdtErrorKind::TooDeep);
    }
}
