// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use alloc::borrow::ToOwned;
use alloc::collections::btree_map::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use zerocopy::IntoBytes;

use crate::fdt::{FDT_BEGIN_NODE, FDT_END, FDT_END_NODE, FDT_MAGIC, FDT_PROP, Fdt, FdtHeader};
use crate::model::{DeviceTree, DeviceTreeNode, DeviceTreeProperty};

// https://devicetree-specification.readthedocs.io/en/latest/chapter5-flattened-format.html#header
const LAST_VERSION: u32 = 17;
const LAST_COMP_VERSION: u32 = 16;

/// Size of the empty memory reservation block: a single terminating entry.
const MEM_RSVMAP_SIZE: usize = 2 * size_of::<u64>();

fn to_u32(value: usize, what: &str) -> u32 {
    u32::try_from(value).unwrap_or_else(|_| panic!("{what} exceeds u32"))
}

pub(crate) fn to_bytes(tree: &DeviceTree) -> Vec<u8> {
    let (struct_block, strings_block) = write_root(tree.root());

    let off_mem_rsvmap = size_of::<FdtHeader>();
    let off_dt_struct = off_mem_rsvmap + MEM_RSVMAP_SIZE;
    let off_dt_strings = off_dt_struct + struct_block.len();
    let totalsize = off_dt_strings + strings_block.len();

    let header = FdtHeader {
        magic: FDT_MAGIC.into(),
        totalsize: to_u32(totalsize, "totalsize").into(),
        off_dt_struct: to_u32(off_dt_struct, "off_dt_struct").into(),
        off_dt_strings: to_u32(off_dt_strings, "off_dt_strings").into(),
        off_mem_rsvmap: to_u32(off_mem_rsvmap, "off_mem_rsvmap").into(),
        version: LAST_VERSION.into(),
        last_comp_version: LAST_COMP_VERSION.into(),
        boot_cpuid_phys: 0u32.into(),
        size_dt_strings: to_u32(strings_block.len(), "size_dt_strings").into(),
        size_dt_struct: to_u32(struct_block.len(), "size_dt_struct").into(),
    };

    let mut dtb = Vec::with_capacity(totalsize);
    dtb.extend_from_slice(header.as_bytes());
    dtb.resize(off_dt_struct, 0);
    dtb.extend_from_slice(&struct_block);
    dtb.extend_from_slice(&strings_block);
    dtb
}

fn write_root(root_node: &DeviceTreeNode) -> (Vec<u8>, Vec<u8>) {
    let mut writer = BlockWriter::default();
    writer.write_node(root_node);
    writer.struct_block.extend_from_slice(&FDT_END.to_be_bytes());
    (writer.struct_block, writer.strings_block)
}

#[derive(Default)]
struct BlockWriter {
    struct_block: Vec<u8>,
    strings_block: Vec<u8>,
    string_map: BTreeMap<String, u32>,
}

impl BlockWriter {
    fn write_node(&mut self, node: &DeviceTreeNode) {
        self.struct_block
            .extend_from_slice(&FDT_BEGIN_NODE.to_be_bytes());
        self.struct_block.extend_from_slice(node.name().as_bytes());
        self.struct_block.push(0);
        self.align();

        for prop in node.properties() {
            self.write_prop(prop);
        }

        for child in node.children() {
            self.write_node(child);
        }

        self.struct_block
            .extend_from_slice(&FDT_END_NODE.to_be_bytes());
    }

    fn write_prop(&mut self, prop: &DeviceTreeProperty) {
        let name_offset = self.string_offset(prop.name());

        self.struct_block.extend_from_slice(&FDT_PROP.to_be_bytes());
        self.struct_block
            .extend_from_slice(&to_u32(prop.value().len(), "property value length").to_be_bytes());
        self.struct_block
            .extend_from_slice(&name_offset.to_be_bytes());
        self.struct_block.extend_from_slice(prop.value());
        self.align();
    }

    fn string_offset(&mut self, name: &str) -> u32 {
        if let Some(offset) = self.string_map.get(name) {
            return *offset;
        }
        let offset = to_u32(self.strings_block.len(), "string block length");
        self.strings_block.extend_from_slice(name.as_bytes());
        self.strings_block.push(0);
        self.string_map.insert(name.to_owned(), offset);
        offset
    }

    fn align(&mut self) {
        let new_len = Fdt::align_tag_offset(self.struct_block.len());
        self.struct_block.resize(new_len, 0);
    }
}
