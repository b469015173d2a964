//! Graph store scenarios spanning several operations

use massing_common::{point, IdAllocator, Point};
use massing_graph::{DeleteMode, Graph, GraphDelta, GraphError, GraphKind};

fn apply_all(graph: &mut Graph, deltas: &[GraphDelta]) {
    for delta in deltas {
        graph.apply_delta(delta).unwrap();
    }
}

fn unit_box(ids: &mut IdAllocator) -> Graph {
    let mut graph = Graph::new(1, GraphKind::Volume, 1e-6);
    let p = |x: f64, y: f64, z: f64| -> Point { point(x, y, z) };
    let sides = [
        [p(0., 0., 0.), p(1., 0., 0.), p(1., 1., 0.), p(0., 1., 0.)],
        [p(0., 0., 1.), p(1., 0., 1.), p(1., 1., 1.), p(0., 1., 1.)],
        [p(0., 0., 0.), p(1., 0., 0.), p(1., 0., 1.), p(0., 0., 1.)],
        [p(1., 0., 0.), p(1., 1., 0.), p(1., 1., 1.), p(1., 0., 1.)],
        [p(1., 1., 0.), p(0., 1., 0.), p(0., 1., 1.), p(1., 1., 1.)],
        [p(0., 1., 0.), p(0., 0., 0.), p(0., 0., 1.), p(0., 1., 1.)],
    ];
    for side in sides {
        let (deltas, _) = graph.deltas_for_face_addition(ids, &side, None).unwrap();
        apply_all(&mut graph, &deltas);
    }
    graph
}

#[test]
fn test_box_topology() {
    let mut ids = IdAllocator::new(0).unwrap();
    let graph = unit_box(&mut ids);

    assert_eq!(graph.counts(), (8, 12, 6));
    for edge in graph.edges().values() {
        assert_eq!(edge.face_ids.len(), 2, "edge {} should bound two faces", edge.id);
    }
    graph.validate().unwrap();
}

#[test]
fn test_delete_corner_vertex_and_restore() {
    let mut ids = IdAllocator::new(0).unwrap();
    let mut graph = unit_box(&mut ids);
    let before = graph.clone();
    let corner = graph.find_vertex_by_position(&point(0.0, 0.0, 0.0)).unwrap();

    let deltas = graph
        .deltas_for_delete_objects(&mut ids, &[corner], DeleteMode::Pure)
        .unwrap();
    apply_all(&mut graph, &deltas);

    // Three edges and the three faces around the corner go
    assert_eq!(graph.counts(), (7, 9, 3));
    graph.validate().unwrap();

    for delta in deltas.iter().rev() {
        graph.apply_delta(&delta.make_inverse()).unwrap();
    }
    assert_eq!(graph, before);
}

#[test]
fn test_failed_delta_leaves_graph_untouched() {
    let mut ids = IdAllocator::new(0).unwrap();
    let mut graph = unit_box(&mut ids);
    let before = graph.clone();

    let mut delta = graph.delta_for_delete_all();
    let some_face = *delta.face_deletions.keys().next().unwrap();
    delta.face_deletions.remove(&some_face);

    assert!(matches!(
        graph.apply_delta(&delta),
        Err(GraphError::StillReferenced(_))
    ));
    assert_eq!(graph, before);
}

#[test]
fn test_find_adjacent() {
    let mut ids = IdAllocator::new(0).unwrap();
    let graph = unit_box(&mut ids);
    let corner = graph.find_vertex_by_position(&point(1.0, 1.0, 1.0)).unwrap();

    assert_eq!(graph.adjacent_edges(corner).len(), 3);
    assert_eq!(graph.adjacent_vertices(corner).len(), 3);
    assert_eq!(graph.faces_of_vertex(corner).len(), 3);
}
