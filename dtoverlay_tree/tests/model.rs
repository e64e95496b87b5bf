// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

#![cfg(feature = "write")]

use dtoverlay_tree::model::{DeviceTree, DeviceTreeNode, DeviceTreeProperty};

#[test]
fn tree_creation() {
    let tree = DeviceTree::new(
        DeviceTreeNode::builder("")
            .property(DeviceTreeProperty::new("compatible", "test\0"))
            .property(DeviceTreeProperty::new("prop-u32", 1u32.to_be_bytes()))
            .child(
                DeviceTreeNode::builder("child-a")
                    .property(DeviceTreeProperty::new("child-prop", "a\0"))
                    .build(),
            )
            .child(
                DeviceTreeNode::builder("child-b")
                    .property(DeviceTreeProperty::new("child-prop", "b\0"))
                    .build(),
            )
            .build(),
    );

    let root = tree.root();
    assert_eq!(root.name(), "");
    assert_eq!(root.properties().count(), 2);
    assert_eq!(root.children().count(), 2);
    assert_eq!(root.property("prop-u32").unwrap().as_u32(), Some(1));

    let child_a = root.child("child-a").unwrap();
    assert_eq!(child_a.property("child-prop").unwrap().as_str(), Some("a"));

    let child_b = root.child("child-b").unwrap();
    assert_eq!(child_b.property("child-prop").unwrap().as_str(), Some("b"));
}

#[test]
fn tree_modification() {
    let mut tree = DeviceTree::new(DeviceTreeNode::builder("").build());

    tree.root_mut().add_child(DeviceTreeNode::new("child"));
    assert_eq!(tree.root().children().count(), 1);

    let child = tree.root_mut().child_mut("child").unwrap();
    assert!(
        child
            .add_property(DeviceTreeProperty::new("prop", "value\0"))
            .is_none()
    );
    assert_eq!(child.properties().count(), 1);

    let prop = tree.find_node_mut("/child").unwrap().property_mut("prop").unwrap();
    prop.set_value("new-value\0".as_bytes());
    let child = tree.find_node("/child").unwrap();
    assert_eq!(child.property("prop").unwrap().as_str(), Some("new-value"));

    let child = tree.root_mut().child_mut("child").unwrap();
    assert!(child.remove_property("prop").is_some());
    assert_eq!(child.properties().count(), 0);

    assert!(tree.root_mut().remove_child("child").is_some());
    assert_eq!(tree.root().children().count(), 0);
}

#[test]
fn find_node_mut() {
    let mut tree = DeviceTree::new(
        DeviceTreeNode::builder("")
            .child(
                DeviceTreeNode::builder("child-a")
                    .child(DeviceTreeNode::builder("child-a-a").build())
                    .build(),
            )
            .child(DeviceTreeNode::builder("child-b").build())
            .build(),
    );

    let child_a_a = tree.find_node_mut("/child-a/child-a-a").unwrap();
    child_a_a.add_property(DeviceTreeProperty::new("prop", "value\0"));

    let child_a_a = tree.find_node("/child-a/child-a-a").unwrap();
    assert_eq!(child_a_a.property("prop").unwrap().as_str(), Some("value"));

    assert!(tree.find_node_mut("/child-a/child-c").is_none());
    assert!(tree.find_node_mut("child-a").is_none());
}

#[test]
fn phandle_lookups() {
    let tree = DeviceTree::new(
        DeviceTreeNode::builder("")
            .child(
                DeviceTreeNode::builder("soc")
                    .property(DeviceTreeProperty::new("phandle", 2u32.to_be_bytes()))
                    .child(
                        DeviceTreeNode::builder("gpio@0")
                            .property(DeviceTreeProperty::new(
                                "linux,phandle",
                                7u32.to_be_bytes(),
                            ))
                            .build(),
                    )
                    .build(),
            )
            .build(),
    );

    assert_eq!(tree.max_phandle(), 7);
    assert_eq!(tree.path_of_phandle(2).as_deref(), Some("/soc"));
    assert_eq!(tree.path_of_phandle(7).as_deref(), Some("/soc/gpio@0"));
    assert_eq!(tree.path_of_phandle(3), None);
    assert_eq!(DeviceTree::new(DeviceTreeNode::new("")).max_phandle(), 0);
}

#[test]
fn property_cells() {
    let mut prop = DeviceTreeProperty::new("clocks", vec![0u8, 0, 0, 1, 0, 0, 0, 2]);
    assert_eq!(prop.cell_at(4), Some(2));
    assert_eq!(prop.cell_at(5), None);
    assert_eq!(prop.cell_at(usize::MAX), None);

    assert!(prop.set_cell_at(0, 9));
    assert_eq!(prop.value(), [0, 0, 0, 9, 0, 0, 0, 2]);
    assert!(!prop.set_cell_at(8, 1));
    assert_eq!(prop.value(), [0, 0, 0, 9, 0, 0, 0, 2]);
}

#[test]
fn device_tree_format() {
    let tree = DeviceTree::new(
        DeviceTreeNode::builder("")
            .child(
                DeviceTreeNode::builder("child-a")
                    .child(DeviceTreeNode::builder("child-a-a").build())
                    .build(),
            )
            .child(DeviceTreeNode::builder("child-b").build())
            .build(),
    );

    let fds = tree.to_string();

    assert_eq!(
        fds,
        r#"/dts-v1/;

/ {
    child-a {
        child-a-a {
        };
    };

    child-b {
    };
};
"#
    );
}
