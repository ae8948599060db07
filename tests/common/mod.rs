//! Shared fixture for the integration tests
//!
//! Builds a small arithmetic provenance graph:
//!
//! ```text
//!   x(1) ──x──┐                 ┌──retrieved──> folder(5)
//!   y(2) ──y──┼──> add calc(4) ─┤
//!   wf(7) ─CALL┘                └──sum──> sum(6)
//!   structure(3) ──structure──> wf(7)
//! ```

#![allow(dead_code)]

use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use wfquery::{
    GraphStore, Link, LinkType, Node, OpenStore, Repository, RestApi, ServiceConfig, SqliteStore,
    User,
};

pub const X: i64 = 1;
pub const Y: i64 = 2;
pub const STRUCTURE: i64 = 3;
pub const CALC: i64 = 4;
pub const FOLDER: i64 = 5;
pub const SUM: i64 = 6;
pub const WORKFLOW: i64 = 7;
pub const NODE_COUNT: usize = 7;

pub const EMAIL: &str = "ada@example.com";

/// UUID `a000000<id>-...`: starts with a letter so digit ids only match keys
pub fn fixture_uuid(id: i64) -> Uuid {
    Uuid::from_u128((0xa000_0000_u128 + id as u128) << 96 | 0x4000_8000_0000_0000_0000)
}

/// Everything a test needs to address the fixture nodes
pub struct Fixture {
    pub api: RestApi,
    pub calc_uuid: Uuid,
}

fn int(id: i64, value: i64) -> Node {
    Node::new(id, "data.int.Int.")
        .with_attribute("value", json!(value))
        .with_user(1)
}

fn silicon() -> Node {
    Node::new(STRUCTURE, "data.structure.StructureData.")
        .with_label("bulk Si")
        .with_attribute("cell", json!([[0.0, 2.7, 2.7], [2.7, 0.0, 2.7], [2.7, 2.7, 0.0]]))
        .with_attribute("kinds", json!([{"name": "Si", "symbols": ["Si"], "weights": [1.0]}]))
        .with_attribute(
            "sites",
            json!([
                {"kind_name": "Si", "position": [0.0, 0.0, 0.0]},
                {"kind_name": "Si", "position": [1.35, 1.35, 1.35]}
            ]),
        )
        .with_user(1)
}

fn add_calculation() -> Node {
    let inputs = Repository::new()
        .with_object("inputs/aiida.in", "&control")
        .and_then(|repo| repo.with_object("_aiidasubmit.sh", "#!/bin/bash"))
        .unwrap();
    Node::new(CALC, "process.calculation.calcjob.CalcJobNode.")
        .with_process_type("aiida.calculations:arithmetic.add")
        .with_label("add")
        .with_attribute("process_state", json!("finished"))
        .with_attribute("exit_status", json!(0))
        .with_attribute("resources", json!({"num_machines": 1}))
        .with_extra("project", json!("fixture"))
        .with_repository(inputs)
        .with_user(1)
}

fn workflow() -> Node {
    Node::new(WORKFLOW, "process.workflow.workchain.WorkChainNode.")
        .with_process_type("aiida.workflows:arithmetic.multiply_add")
        .with_attribute("process_state", json!("running"))
        .with_user(1)
}

fn retrieved_folder() -> Node {
    Node::new(FOLDER, "data.folder.FolderData.")
        .with_repository(Repository::new().with_object("aiida.out", "5").unwrap())
        .with_user(1)
}

pub fn fixture_store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().unwrap();
    store.save_user(&User::new(1, EMAIL)).unwrap();
    for node in [
        int(X, 2),
        int(Y, 3),
        silicon(),
        add_calculation(),
        retrieved_folder(),
        int(SUM, 5),
        workflow(),
    ] {
        let uuid = fixture_uuid(node.id.get());
        store.save_node(&node.with_uuid(uuid)).unwrap();
    }
    for link in [
        Link::new(X, CALC, "x", LinkType::InputCalc),
        Link::new(Y, CALC, "y", LinkType::InputCalc),
        Link::new(WORKFLOW, CALC, "CALL", LinkType::CallCalc),
        Link::new(CALC, FOLDER, "retrieved", LinkType::Create),
        Link::new(CALC, SUM, "sum", LinkType::Create),
        Link::new(STRUCTURE, WORKFLOW, "structure", LinkType::InputWork),
    ] {
        store.save_link(&link).unwrap();
    }
    store.save_comment(wfquery::NodeId::new(CALC), 1, "sum checked").unwrap();
    store
}

pub fn fixture_with(config: ServiceConfig) -> Fixture {
    let api = RestApi::new(Arc::new(fixture_store()), config).unwrap();
    let calc_uuid = api.get_tree(&CALC.to_string(), Some(0), Some(0)).unwrap().nodes[0].uuid;
    Fixture { api, calc_uuid }
}

pub fn fixture() -> Fixture {
    fixture_with(ServiceConfig::default())
}
