use flock::{Flock, FlockErr, NodeId, NodeKind};

const HIERARCHY: &str = r#"{
    "nodes": [
        { "idx": 0, "children": [1, 2] },
        { "idx": 1, "children": [3, 4] },
        { "idx": 2 },
        { "idx": 3 },
        { "idx": 4 }
    ]
}"#;

#[test]
fn loads_a_hierarchy_from_json() {
    let flock = Flock::from_json_str(HIERARCHY).unwrap();

    assert_eq!(flock.leader().idx, NodeId(0));
    assert_eq!(flock.kind(NodeId(1)), Some(NodeKind::Aggregator));
    assert_eq!(flock.kind(NodeId(2)), Some(NodeKind::Worker));

    let workers: Vec<_> = flock.workers().map(|w| w.idx).collect();
    assert_eq!(workers, [NodeId(2), NodeId(3), NodeId(4)]);

    let children: Vec<_> = flock.children(NodeId(0)).map(|c| c.idx).collect();
    assert_eq!(children, [NodeId(1), NodeId(2)]);
}

#[test]
fn json_round_trip_keeps_the_shape() {
    let flock = Flock::two_tier(2, 2);
    let json = flock.to_json_string().unwrap();
    let back = Flock::from_json_str(&json).unwrap();

    assert_eq!(back.len(), flock.len());
    for node in flock.nodes() {
        assert_eq!(back.get(node.idx), Some(node));
    }
}

#[test]
fn malformed_json_is_reported() {
    let res = Flock::from_json_str("{ \"nodes\": [ { \"children\": [] } ] }");
    assert!(matches!(res, Err(FlockErr::Json(_))));
}

#[test]
fn missing_file_is_an_io_error() {
    let res = Flock::from_json_file("/definitely/not/here/flock.json");
    assert!(matches!(res, Err(FlockErr::Io(_))));
}
