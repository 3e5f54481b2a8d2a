use geostore::{
    ingest::{Member, MemberKind, ReferenceIndexer, RelationRecord, WayRecord},
    remap::IdRemapper,
    IndexerOptions, Reference, RemapOptions,
};

fn relation(id: u64, members: &[(MemberKind, u64)]) -> RelationRecord {
    RelationRecord {
        id,
        members: members
            .iter()
            .map(|&(kind, id)| Member {
                kind,
                id,
                role: String::new(),
            })
            .collect(),
    }
}

#[test]
fn remapped_records_index_by_dense_ids() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut remapper = IdRemapper::open(
        RemapOptions::from(dir.path().join("remap"))
            .clear_contents(true)
            .max_items_in_memory(3)
            .page_size(64),
    )
    .expect("open remapper");
    let mut indexer = ReferenceIndexer::open(
        IndexerOptions::from(dir.path().join("refs"))
            .clear_contents(true)
            .page_size(64),
    )
    .expect("open indexer");

    let mut ways = vec![
        WayRecord {
            id: 4_000_000_000,
            node_refs: vec![9_000_000_001, 9_000_000_002, 9_000_000_003],
        },
        WayRecord {
            id: 4_000_000_007,
            node_refs: vec![9_000_000_003, 9_000_000_004],
        },
    ];
    for way in &mut ways {
        remapper.remap_way(way).expect("remap way");
        indexer.index_way(way).expect("index way");
    }
    assert_eq!(ways[1].id, 2);
    assert_eq!(ways[1].node_refs, vec![3, 4]);

    let mut multipolygon = relation(
        7_000_000_000,
        &[
            (MemberKind::Way, 4_000_000_000),
            (MemberKind::Way, 4_000_000_007),
            (MemberKind::Node, 9_000_000_001),
        ],
    );
    remapper
        .remap_relation(&mut multipolygon)
        .expect("remap relation");
    indexer.index_relation(&multipolygon).expect("index relation");

    let nodes = indexer.nodes();
    assert_eq!(
        nodes.references(1).expect("refs"),
        vec![Reference::Way(1), Reference::Relation(1)]
    );
    assert_eq!(
        nodes.references(3).expect("refs"),
        vec![Reference::Way(1), Reference::Way(2)]
    );
    assert_eq!(nodes.references(4).expect("refs"), vec![Reference::Way(2)]);
    assert!(!nodes.is_referenced(5).expect("query"));
    assert!(indexer.ways().is_referenced(2).expect("query"));
    assert!(!indexer.relations().is_referenced(1).expect("query"));

    let counts = remapper.remapped_counts();
    assert_eq!((counts.nodes, counts.ways, counts.relations), (4, 2, 1));
    remapper.close().expect("close remapper");
    indexer.finish().expect("finish indexer");
}
