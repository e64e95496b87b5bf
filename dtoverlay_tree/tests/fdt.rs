// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

#![cfg(feature = "write")]

use dtoverlay_tree::FdtErrorKind;
use dtoverlay_tree::fdt::Fdt;
use dtoverlay_tree::model::{DeviceTree, DeviceTreeNode, DeviceTreeProperty};

fn cells(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

fn sample_tree() -> DeviceTree {
    DeviceTree::new(
        DeviceTreeNode::builder("")
            .property(DeviceTreeProperty::new("compatible", "vendor,board\0"))
            .child(
                DeviceTreeNode::builder("uart@1000")
                    .property(DeviceTreeProperty::new("reg", cells(&[0x1000, 0x100])))
                    .property(DeviceTreeProperty::new("status", "okay\0"))
                    .property(DeviceTreeProperty::new(
                        "clock-names",
                        "baud\0apb\0",
                    ))
                    .child(DeviceTreeNode::new("serial"))
                    .build(),
            )
            .child(
                DeviceTreeNode::builder("empty")
                    .property(DeviceTreeProperty::new("interrupt-controller", ""))
                    .build(),
            )
            .build(),
    )
}

#[test]
fn read_child_nodes() {
    let dtb = sample_tree().to_dtb();
    let fdt = Fdt::new(&dtb).unwrap();
    let root = fdt.root().unwrap();
    let mut children = root.children();

    let child1 = children.next().unwrap().unwrap();
    assert_eq!(child1.name().unwrap(), "uart@1000");

    let child2 = children.next().unwrap().unwrap();
    assert_eq!(child2.name().unwrap(), "empty");

    assert!(children.next().is_none());
}

#[test]
fn read_prop_values() {
    let dtb = sample_tree().to_dtb();
    let fdt = Fdt::new(&dtb).unwrap();
    let node = fdt.find_node("/uart@1000").unwrap().unwrap();
    let mut props = node.properties();

    let prop = props.next().unwrap().unwrap();
    assert_eq!(prop.name(), "reg");
    assert_eq!(prop.value(), cells(&[0x1000, 0x100]));
    assert_eq!(prop.as_u32().unwrap_err().kind, FdtErrorKind::InvalidLength);

    let prop = props.next().unwrap().unwrap();
    assert_eq!(prop.name(), "status");
    assert_eq!(prop.as_str().unwrap(), "okay");

    let prop = props.next().unwrap().unwrap();
    assert_eq!(prop.name(), "clock-names");
    let names: Vec<_> = prop.as_str_list().collect();
    assert_eq!(names, ["baud", "apb"]);

    assert!(props.next().is_none());
}

#[test]
fn get_property_and_child_by_name() {
    let dtb = sample_tree().to_dtb();
    let fdt = Fdt::new(&dtb).unwrap();
    let root = fdt.root().unwrap();

    let uart = root.child("uart@1000").unwrap().unwrap();
    assert_eq!(
        uart.property("status").unwrap().unwrap().as_str().unwrap(),
        "okay"
    );
    assert!(uart.property("non-existent-prop").unwrap().is_none());
    assert!(uart.child("serial").unwrap().is_some());
    assert!(root.child("non-existent-child").unwrap().is_none());
}

#[test]
fn find_node_by_path() {
    let dtb = sample_tree().to_dtb();
    let fdt = Fdt::new(&dtb).unwrap();

    let root = fdt.find_node("/").unwrap().unwrap();
    assert_eq!(root.name().unwrap(), "");

    let serial = fdt.find_node("/uart@1000/serial").unwrap().unwrap();
    assert_eq!(serial.name().unwrap(), "serial");

    assert!(fdt.find_node("/uart@1000/missing").is_none());
    assert!(fdt.find_node("/x").is_none());
    assert!(fdt.find_node("").is_none());
}

#[test]
fn pretty_print() {
    let dtb = sample_tree().to_dtb();
    let fdt = Fdt::new(&dtb).unwrap();

    assert_eq!(
        fdt.to_string(),
        r#"/dts-v1/;

/ {
    compatible = "vendor,board";

    uart@1000 {
        reg = <0x1000 0x100>;
        status = "okay";
        clock-names = "baud", "apb";

        serial {
        };
    };

    empty {
        interrupt-controller;
    };
};
"#
    );
}

#[test]
fn round_trip() {
    let tree = sample_tree();
    let dtb = tree.to_dtb();

    let fdt = Fdt::new(&dtb).unwrap();
    let decoded = DeviceTree::from_fdt(&fdt).unwrap();
    assert_eq!(decoded, tree);
    assert_eq!(decoded.to_dtb(), dtb);
}

#[test]
fn empty_blob_is_rejected() {
    let err = Fdt::new(&[]).unwrap_err();
    assert_eq!(err.kind, FdtErrorKind::InvalidLength);
}

#[test]
fn truncated_blob_is_rejected() {
    let dtb = sample_tree().to_dtb();
    for len in [4, 39, 40, dtb.len() - 1] {
        assert!(Fdt::new(&dtb[..len]).is_err(), "length {len} was accepted");
    }
}

#[test]
fn corrupted_blobs_never_panic() {
    let dtb = sample_tree().to_dtb();
    for index in 0..dtb.len() {
        for byte in [0x00, 0x01, 0x03, 0x09, 0x7f, 0xff] {
            let mut corrupted = dtb.clone();
            corrupted[index] = byte;
            if let Ok(fdt) = Fdt::new(&corrupted) {
                let _ = DeviceTree::from_fdt(&fdt);
            }
        }
    }
}

#[test]
fn unterminated_property_name_is_rejected() {
    let tree = DeviceTree::new(
        DeviceTreeNode::builder("")
            .property(DeviceTreeProperty::new("name", ""))
            .build(),
    );
    let mut dtb = tree.to_dtb();
    // The strings block is the tail of the blob: drop its NUL terminator.
    let last = dtb.len() - 1;
    dtb[last] = b'x';

    let fdt = Fdt::new(&dtb).unwrap();
    assert!(DeviceTree::from_fdt(&fdt).is_err());
}
