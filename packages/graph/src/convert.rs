//! # Delete → move conversion
//!
//! Folding one graph's contents into another (group explode, group merge,
//! grouping a selection) deletes elements in the source graph and recreates
//! them in the target. The target already has its own geometry, so the new
//! elements are derived from positions rather than copied id for id:
//! coincident vertices and edges merge, and edges split where they run
//! through existing vertices.
//!
//! Every recreated edge and face names the deleted element as its parent,
//! and the returned [`IdRemap`] maps each deleted id to its replacements.

use crate::delta::GraphDelta;
use crate::errors::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::record::{FaceRecord, GraphRecord};
use massing_common::{IdAllocator, IdRemap, Point};
use tracing::debug;

pub fn convert_graph_delete_to_move(
    deletions: &[GraphDelta],
    source: &Graph,
    target: &Graph,
    ids: &mut IdAllocator,
    offset: Point,
) -> GraphResult<(Vec<GraphDelta>, IdRemap)> {
    let mut record = GraphRecord::new(source.id(), source.kind());

    for delta in deletions {
        if delta.graph_id != source.id() {
            return Err(GraphError::WrongGraph {
                expected: source.id(),
                got: delta.graph_id,
            });
        }

        for (id, position) in &delta.vertex_deletions {
            record.vertices.insert(*id, *position);
        }
        for (id, deleted) in &delta.edge_deletions {
            let &[start, end] = deleted.vertices.as_slice() else {
                return Err(GraphError::DegenerateEdge(*id));
            };
            record.edges.insert(*id, [start, end]);
        }
        for (id, deleted) in &delta.face_deletions {
            record.faces.insert(
                *id,
                FaceRecord {
                    vertices: deleted.vertices.clone(),
                    containing: deleted.containing,
                },
            );
        }
    }

    // Surviving vertices still anchor deleted edges and faces
    let referenced: Vec<_> = record
        .edges
        .values()
        .flat_map(|pair| pair.iter().copied())
        .chain(record.faces.values().flat_map(|f| f.vertices.iter().copied()))
        .collect();
    for vertex_id in referenced {
        if !record.vertices.contains_key(&vertex_id) {
            record
                .vertices
                .insert(vertex_id, source.vertex_position(vertex_id)?);
        }
    }
    for face in record.faces.values_mut() {
        if face.containing.is_some_and(|c| !deletions.iter().any(|d| d.face_deletions.contains_key(&c))) {
            face.containing = None;
        }
    }

    debug!(
        source = source.id(),
        target = target.id(),
        elements = record.element_count(),
        "converting graph deletions into additions"
    );

    target.deltas_for_paste(ids, &record, offset, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphKind;
    use massing_common::point;

    fn apply_all(graph: &mut Graph, deltas: &[GraphDelta]) {
        for delta in deltas {
            graph.apply_delta(delta).unwrap();
        }
    }

    #[test]
    fn test_move_square_into_empty_graph() {
        let mut ids = IdAllocator::new(0).unwrap();
        let mut source = Graph::new(1, GraphKind::Volume, 1e-6);
        let target = Graph::new(2, GraphKind::Volume, 1e-6);

        let corners = [
            point(0.0, 0.0, 0.0),
            point(1.0, 0.0, 0.0),
            point(1.0, 1.0, 0.0),
            point(0.0, 1.0, 0.0),
        ];
        let (deltas, face) = source.deltas_for_face_addition(&mut ids, &corners, None).unwrap();
        apply_all(&mut source, &deltas);

        let deletion = source.delta_for_delete_all();
        let (moves, remap) =
            convert_graph_delete_to_move(&[deletion.clone()], &source, &target, &mut ids, Point::zeros())
                .unwrap();

        let mut target = target;
        apply_all(&mut target, &moves);
        assert_eq!(target.counts(), (4, 4, 1));

        let new_face = remap.get(face).unwrap();
        assert!(target.find_face(new_face).is_some());
        assert!(moves.iter().any(|d| d.successors().get(&face) == Some(&vec![new_face])));
        for id in deletion.removed_ids() {
            assert!(!remap.get_all(id).is_empty(), "element {} was not remapped", id);
        }
    }

    #[test]
    fn test_move_merges_with_existing_geometry() {
        let mut ids = IdAllocator::new(0).unwrap();
        let mut source = Graph::new(1, GraphKind::Volume, 1e-6);
        let mut target = Graph::new(2, GraphKind::Volume, 1e-6);

        let (deltas, edges) = source
            .deltas_for_edge_addition(&mut ids, point(0.0, 0.0, 0.0), point(2.0, 0.0, 0.0))
            .unwrap();
        apply_all(&mut source, &deltas);

        let (deltas, _) = target
            .delta_for_vertex_addition(&mut ids, point(1.0, 0.0, 0.0))
            .unwrap();
        apply_all(&mut target, &deltas);

        let deletion = source.delta_for_delete_all();
        let (moves, remap) =
            convert_graph_delete_to_move(&[deletion], &source, &target, &mut ids, Point::zeros()).unwrap();
        apply_all(&mut target, &moves);

        assert_eq!(remap.get_all(edges[0]).len(), 2);
        assert_eq!(target.counts(), (3, 2, 0));
        target.validate().unwrap();
    }
}
