//! End-to-end requests against the fixture provenance graph

mod common;

use common::*;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use wfquery::{
    ContentArgs, ContentSelector, Dump, ErrorKind, Filter, FilterSet, GraphStore, NodeRequest,
    OpenStore,
    Resource, RestApi, ResultType, ServiceConfig, SqliteStore,
};

fn ids(rows: &Value) -> Vec<i64> {
    rows.as_array()
        .unwrap()
        .iter()
        .map(|row| row["id"].as_i64().unwrap())
        .collect()
}

fn labels(rows: &Value) -> BTreeSet<String> {
    rows.as_array()
        .unwrap()
        .iter()
        .map(|row| row["link_label"].as_str().unwrap().to_string())
        .collect()
}

fn content(id: i64, selector: ContentSelector, args: ContentArgs) -> NodeRequest {
    NodeRequest {
        id: Some(id.to_string()),
        content: selector,
        content_args: args,
        ..Default::default()
    }
}

// === Listings ===

#[test]
fn test_resource_restricts_node_types() {
    let f = fixture();
    let envelope = f
        .api
        .get_nodes(&NodeRequest { resource: Resource::CalcJobs, ..Default::default() })
        .unwrap();
    assert_eq!(envelope.resource_type, "calcjobs");
    assert_eq!(envelope.total_count, 1);
    let row = &envelope.data["calcjobs"][0];
    assert_eq!(row["id"], json!(CALC));
    assert_eq!(row["user_email"], json!(EMAIL));

    let envelope = f
        .api
        .get_nodes(&NodeRequest { resource: Resource::Data, ..Default::default() })
        .unwrap();
    assert_eq!(ids(&envelope.data["data"]), vec![X, Y, STRUCTURE, FOLDER, SUM]);

    let envelope = f
        .api
        .get_nodes(&NodeRequest { resource: Resource::Processes, ..Default::default() })
        .unwrap();
    assert_eq!(ids(&envelope.data["processes"]), vec![CALC, WORKFLOW]);
}

#[test]
fn test_filters_orders_and_projections() {
    let f = fixture();
    let request = NodeRequest {
        filters: FilterSet::new().with("node_type", Filter::Eq(json!("data.int.Int."))),
        orders: vec!["-id".into()],
        projections: vec!["id".into(), "label".into()],
        ..Default::default()
    };
    let envelope = f.api.get_nodes(&request).unwrap();
    assert_eq!(envelope.total_count, 3);
    assert_eq!(ids(&envelope.data["nodes"]), vec![SUM, Y, X]);
    let first = envelope.data["nodes"][0].as_object().unwrap();
    assert_eq!(first.keys().map(String::as_str).collect::<Vec<_>>(), vec!["id", "label"]);

    let bad = NodeRequest { orders: vec!["colour".into()], ..Default::default() };
    assert_eq!(f.api.get_nodes(&bad).unwrap_err().kind(), ErrorKind::Validation);
}

#[test]
fn test_full_type_filter() {
    let f = fixture();
    let request = NodeRequest {
        full_type: Some("process.calculation.calcjob.CalcJobNode.|aiida.calculations:arithmetic.add".into()),
        ..Default::default()
    };
    let envelope = f.api.get_nodes(&request).unwrap();
    assert_eq!(ids(&envelope.data["nodes"]), vec![CALC]);

    let request = NodeRequest { full_type: Some("data.%|".into()), ..Default::default() };
    assert_eq!(f.api.get_nodes(&request).unwrap().total_count, 5);

    let request = NodeRequest { full_type: Some("%|%".into()), ..Default::default() };
    assert_eq!(f.api.get_nodes(&request).unwrap().total_count, NODE_COUNT);

    let request = NodeRequest { full_type: Some("data.int.Int.".into()), ..Default::default() };
    assert_eq!(f.api.get_nodes(&request).unwrap_err().kind(), ErrorKind::InvalidFullType);
}

// === Pagination ===

#[test]
fn test_pages_partition_the_result_set() {
    let f = fixture();
    let mut seen = Vec::new();
    for page in 1..=3 {
        let envelope = f
            .api
            .get_nodes(&NodeRequest { page: Some(page), perpage: Some(3), ..Default::default() })
            .unwrap();
        assert_eq!(envelope.total_count, NODE_COUNT);
        let links = envelope.rel_pages.unwrap();
        assert_eq!((links.first, links.last), (1, 3));
        assert_eq!(links.prev, (page > 1).then(|| page - 1));
        assert_eq!(links.next, (page < 3).then(|| page + 1));
        seen.extend(ids(&envelope.data["nodes"]));
    }
    assert_eq!(seen, (1..=NODE_COUNT as i64).collect::<Vec<_>>());

    let past_end = NodeRequest { page: Some(4), perpage: Some(3), ..Default::default() };
    assert_eq!(f.api.get_nodes(&past_end).unwrap_err().kind(), ErrorKind::Validation);
}

#[test]
fn test_page_uses_configured_default_size() {
    let config = ServiceConfig { perpage_default: 2, limit_default: 4, ..Default::default() };
    let f = fixture_with(config);
    let envelope = f
        .api
        .get_nodes(&NodeRequest { page: Some(4), ..Default::default() })
        .unwrap();
    assert_eq!(ids(&envelope.data["nodes"]), vec![WORKFLOW]);
    let header = envelope.link_header("/api/v4").unwrap();
    assert!(header.contains("</api/v4/nodes/page/1>; rel=\"first\""));
    assert!(header.contains("</api/v4/nodes/page/3>; rel=\"prev\""));
    assert!(!header.contains("rel=\"next\""));

    let unpaged = f.api.get_nodes(&NodeRequest::default()).unwrap();
    assert_eq!(unpaged.data["nodes"].as_array().unwrap().len(), 4);
    assert!(unpaged.rel_pages.is_none());
}

// === Relational results ===

#[test]
fn test_incoming_and_outgoing() {
    let f = fixture();
    let incoming = f
        .api
        .get_nodes(&NodeRequest {
            id: Some(CALC.to_string()),
            result: ResultType::Incoming,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(incoming.total_count, 3);
    let rows = &incoming.data["incoming"];
    assert_eq!(ids(rows), vec![X, Y, WORKFLOW]);
    assert_eq!(labels(rows), ["CALL", "x", "y"].iter().map(|s| s.to_string()).collect());
    assert_eq!(rows[0]["link_type"], json!("input_calc"));

    let outgoing = f
        .api
        .get_nodes(&NodeRequest {
            id: Some(CALC.to_string()),
            result: ResultType::Outgoing,
            filters: FilterSet::new().with("node_type", Filter::Eq(json!("data.int.Int."))),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(ids(&outgoing.data["outgoing"]), vec![SUM]);
    assert_eq!(outgoing.data["outgoing"][0]["link_label"], json!("sum"));
}

#[test]
fn test_relational_results_need_a_node() {
    let f = fixture();
    let request = NodeRequest { result: ResultType::Incoming, ..Default::default() };
    assert_eq!(f.api.get_nodes(&request).unwrap_err().kind(), ErrorKind::Validation);

    let request = NodeRequest {
        id: Some(CALC.to_string()),
        result: ResultType::Outgoing,
        content: ContentSelector::Attributes,
        ..Default::default()
    };
    assert_eq!(f.api.get_nodes(&request).unwrap_err().kind(), ErrorKind::Validation);
}

// === Content ===

#[test]
fn test_attribute_selection() {
    let f = fixture();
    let args = ContentArgs {
        include: Some(vec!["process_state".into(), "exit_status".into()]),
        ..Default::default()
    };
    let envelope = f.api.get_nodes(&content(CALC, ContentSelector::Attributes, args)).unwrap();
    assert_eq!(envelope.total_count, 1);
    assert_eq!(
        envelope.data["attributes"],
        json!({"process_state": "finished", "exit_status": 0})
    );

    let args = ContentArgs { exclude: Some(vec!["project".into()]), ..Default::default() };
    let envelope = f.api.get_nodes(&content(CALC, ContentSelector::Extras, args)).unwrap();
    assert_eq!(envelope.data["extras"], json!({}));

    let both = ContentArgs {
        include: Some(vec!["a".into()]),
        exclude: Some(vec!["b".into()]),
        ..Default::default()
    };
    let err = f.api.get_nodes(&content(CALC, ContentSelector::Attributes, both)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_content_by_uuid_prefix() {
    let f = fixture();
    let prefix = f.calc_uuid.to_string()[..8].to_string();
    let envelope = f
        .api
        .get_nodes(&NodeRequest {
            id: Some(prefix.clone()),
            content: ContentSelector::Comments,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(envelope.id.as_deref(), Some(prefix.as_str()));
    assert_eq!(envelope.data["comments"][0]["message"], json!("sum checked"));
}

#[test]
fn test_all_digit_uuid_prefix() {
    let store = fixture_store();
    for (id, uuid) in [
        (8, "12345678-1111-4111-8111-111111111111"),
        (9, "40000000-2222-4222-8222-222222222222"),
    ] {
        let node = wfquery::Node::new(id, "data.int.Int.")
            .with_uuid(uuid.parse().unwrap())
            .with_attribute("value", json!(id));
        store.save_node(&node).unwrap();
    }
    let api = RestApi::new(std::sync::Arc::new(store), ServiceConfig::default()).unwrap();

    let request = NodeRequest {
        id: Some("12345678".into()),
        content: ContentSelector::Attributes,
        ..Default::default()
    };
    let envelope = api.get_nodes(&request).unwrap();
    assert_eq!(envelope.data["attributes"], json!({"value": 8}));
    assert_eq!(api.get_tree("12345678", None, None).unwrap().nodes[0].id, 8);

    // "4" is both the calculation key and a prefix of node 9
    let err = api.get_tree(&CALC.to_string(), None, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NonUniqueResult);
}

#[test]
fn test_structure_derived_properties_and_download() {
    let f = fixture();
    let envelope = f
        .api
        .get_nodes(&content(STRUCTURE, ContentSelector::DerivedProperties, ContentArgs::default()))
        .unwrap();
    assert_eq!(envelope.data["derived_properties"]["formula"], json!("Si2"));
    assert_eq!(envelope.data["derived_properties"]["dimensionality"]["dim"], json!(3));

    let args = ContentArgs { format: Some("xyz".into()), ..Default::default() };
    let envelope = f.api.get_nodes(&content(STRUCTURE, ContentSelector::Download, args)).unwrap();
    let download = &envelope.data["download"];
    assert!(download["filename"].as_str().unwrap().ends_with("_structure.xyz"));
    assert!(download["data"].as_str().unwrap().starts_with("2\n"));

    let args = ContentArgs { format: Some("pdb".into()), ..Default::default() };
    let err = f.api.get_nodes(&content(STRUCTURE, ContentSelector::Download, args)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = f
        .api
        .get_nodes(&content(X, ContentSelector::Download, ContentArgs::default()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FeatureNotAvailable);
}

#[test]
fn test_repository_views() {
    let f = fixture();
    let envelope = f
        .api
        .get_nodes(&content(CALC, ContentSelector::RepoList, ContentArgs::default()))
        .unwrap();
    let names: BTreeSet<&str> = envelope.data["repo_list"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["_aiidasubmit.sh", "inputs"].into_iter().collect());

    let args = ContentArgs { path: Some("inputs/aiida.in".into()), ..Default::default() };
    let envelope = f.api.get_nodes(&content(CALC, ContentSelector::RepoContents, args)).unwrap();
    assert_eq!(envelope.data["repo_contents"], json!("&control"));

    let args = ContentArgs { path: Some("inputs".into()), ..Default::default() };
    let err = f.api.get_nodes(&content(CALC, ContentSelector::RepoContents, args)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_retrieved_files() {
    let f = fixture();
    let outputs = f
        .api
        .get_nodes(&content(CALC, ContentSelector::RetrievedOutputs, ContentArgs::default()))
        .unwrap();
    assert_eq!(outputs.data["retrieved_outputs"], json!([{"name": "aiida.out", "type": "FILE"}]));

    let args = ContentArgs { path: Some("inputs".into()), ..Default::default() };
    let inputs = f.api.get_nodes(&content(CALC, ContentSelector::RetrievedInputs, args)).unwrap();
    assert_eq!(inputs.data["retrieved_inputs"], json!([{"name": "aiida.in", "type": "FILE"}]));
}

#[test]
fn test_content_for_a_missing_node() {
    let f = fixture();
    let err = f
        .api
        .get_nodes(&content(99, ContentSelector::Attributes, ContentArgs::default()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// === Provenance tree ===

#[test]
fn test_io_tree() {
    let f = fixture();
    let tree = f.api.get_tree(&CALC.to_string(), None, None).unwrap();
    let root = &tree.nodes[0];
    assert_eq!(root.id, CALC);
    assert_eq!(root.description, "Finished [0]");
    assert_eq!(root.incoming.iter().map(|e| e.id).collect::<Vec<_>>(), vec![X, Y, WORKFLOW]);
    assert_eq!(root.outgoing.iter().map(|e| e.id).collect::<Vec<_>>(), vec![FOLDER, SUM]);
    assert_eq!(root.incoming[2].description, "Running");
    assert!(!tree.metadata[0].is_truncated());

    let tree = f.api.get_tree(&CALC.to_string(), Some(1), Some(5)).unwrap();
    let metadata = tree.metadata[0];
    assert_eq!(metadata.total_no_of_incomings, 3);
    assert_eq!(metadata.sent_no_of_incomings, 1);
    assert_eq!(metadata.sent_no_of_outgoings, 2);
    assert!(metadata.is_truncated());
}

// === Node-level endpoints ===

#[test]
fn test_full_types_tree() {
    let f = fixture();
    let root = f.api.full_types().unwrap();
    assert_eq!(root.full_type(), Some("%|%"));

    let int = root.get("data.int.Int").unwrap();
    assert_eq!(int.full_type(), Some("data.int.Int.|"));
    assert!(int.is_leaf());

    let add = root.get("process.calculation.calcjob.ArithmeticAddCalculation").unwrap();
    assert_eq!(add.label(), Some("ArithmeticAddCalculation"));
    assert_eq!(
        add.full_type(),
        Some("process.calculation.calcjob.CalcJobNode.|aiida.calculations:arithmetic.add")
    );

    let data = root.get("data").unwrap();
    assert!(!data.is_leaf());
    assert_eq!(data.full_type(), Some("data.%|%"));
}

#[test]
fn test_types_statistics_and_formats() {
    let f = fixture();
    let types = f.api.types(Resource::Nodes).unwrap();
    assert_eq!(types["data"].len(), 3);
    assert_eq!(
        types["process"],
        vec![
            "process.calculation.calcjob.CalcJobNode.".to_string(),
            "process.workflow.workchain.WorkChainNode.".to_string()
        ]
    );

    let processes = f.api.types(Resource::Processes).unwrap();
    assert_eq!(processes.keys().collect::<Vec<_>>(), vec!["process"]);
    assert_eq!(processes["process"].len(), 2);
    let structures = f.api.types(Resource::Structures).unwrap();
    assert_eq!(structures["data"], vec!["data.structure.StructureData.".to_string()]);
    assert_eq!(structures.len(), 1);

    let stats = f.api.statistics(None).unwrap();
    assert_eq!(stats.total, NODE_COUNT as u64);
    assert_eq!(stats.types["data.int.Int."], 3);
    assert_eq!(f.api.statistics(Some(2)).unwrap().total, 0);

    let formats = f.api.download_formats();
    assert_eq!(formats["StructureData"], vec!["cif", "xyz"]);
}

// === File-backed store ===

#[test]
fn test_dump_into_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("provenance.db");
    let dump = r#"{
        "users": [{"id": 1, "email": "grace@example.com"}],
        "nodes": [
            {"id": 1, "uuid": "0b3c3f0e-3b1a-4f7e-9a55-8f8d2c1e4a10", "node_type": "data.int.Int.",
             "ctime": "2024-03-01T10:00:00Z", "mtime": "2024-03-01T10:00:00Z", "user_id": 1}
        ]
    }"#;

    {
        let store = SqliteStore::open(&db_path).unwrap();
        Dump::from_json(dump).unwrap().load_into(&store).unwrap();
    }

    let store = SqliteStore::open(&db_path).unwrap();
    let api = RestApi::new(std::sync::Arc::new(store), ServiceConfig::default()).unwrap();
    let envelope = api
        .get_nodes(&NodeRequest { id: Some("0b3c3f0e".into()), ..Default::default() })
        .unwrap();
    assert_eq!(envelope.total_count, 1);
    assert_eq!(envelope.data["nodes"][0]["user_email"], json!("grace@example.com"));
}
