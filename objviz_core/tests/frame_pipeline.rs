//! End-to-end frame scenarios through the public API.

use objviz_core::{
    DisplayConfig, EvictionPolicy, FrameAssembler, FrameHeader, JsonLinesSink, MarkerCategory,
    MarkerId, MemorySink, ObjectLabel, ObjectListMessage, PerceivedObject, Pose, PredictedPath,
    Shape, SkipReason, Stamp, Twist,
};
use std::collections::HashSet;
use uuid::Uuid;

fn header(sec: i32) -> FrameHeader {
    FrameHeader::new("map", Stamp::new(sec, 0))
}

/// The `u1` object: a box classified CAR, two hypotheses, one of them empty.
fn u1() -> PerceivedObject {
    let path_a = PredictedPath::new(
        vec![
            Pose::from_xyz_yaw(1.0, 0.0, 0.0, 0.0),
            Pose::from_xyz_yaw(2.0, 0.0, 0.0, 0.0),
            Pose::from_xyz_yaw(3.0, 0.0, 0.0, 0.0),
        ],
        0.5,
        0.8,
    );
    let path_b = PredictedPath::new(Vec::new(), 0.5, 0.5);

    PerceivedObject::new(
        Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef),
        Shape::bounding_box(4.5, 1.9, 1.6),
        Pose::from_xyz_yaw(0.0, 0.0, 0.0, 0.0),
    )
    .with_classification(ObjectLabel::Car, 0.9)
    .with_twist(Twist::linear(8.0, 0.0, 0.0))
    .with_path(path_a)
    .with_path(path_b)
}

fn assembler() -> FrameAssembler<MemorySink> {
    FrameAssembler::with_config(DisplayConfig::default(), MemorySink::new()).unwrap()
}

fn moving(n: u128, x: f64) -> PerceivedObject {
    PerceivedObject::new(Uuid::from_u128(n), Shape::cylinder(0.6, 1.8), Pose::from_xyz_yaw(x, 2.0, 0.0, 0.0))
        .with_classification(ObjectLabel::Pedestrian, 0.7)
        .with_twist(Twist::linear(1.2, 0.0, 0.0))
}

#[test]
fn test_u1_frame_contents() {
    let mut asm = assembler();
    let report = asm.process(&ObjectListMessage::new(header(1), vec![u1()])).unwrap();
    let batch = asm.sink().last_batch().unwrap();

    let categories: Vec<MarkerCategory> = batch.primitives.iter().map(|p| p.category()).collect();
    assert_eq!(
        categories,
        vec![
            MarkerCategory::Shape,
            MarkerCategory::Label,
            MarkerCategory::IdentityTag,
            MarkerCategory::VelocityText,
            MarkerCategory::VelocityVector,
            MarkerCategory::Trajectory,
            MarkerCategory::Trajectory,
            MarkerCategory::TrajectoryConfidence,
        ]
    );

    let ids: HashSet<MarkerId> = batch.ids().collect();
    assert_eq!(ids.len(), batch.len());

    // Trajectory ordinals 0 and 1, confidence ordinal 0 for path A only
    let alloc = asm.allocator();
    let trajectories: Vec<_> = batch
        .of_category(MarkerCategory::Trajectory)
        .map(|p| alloc.decode(p.id).unwrap().path_index)
        .collect();
    assert_eq!(trajectories, vec![0, 1]);

    let confidence: Vec<_> = batch.of_category(MarkerCategory::TrajectoryConfidence).collect();
    assert_eq!(confidence.len(), 1);
    assert_eq!(alloc.decode(confidence[0].id).unwrap().path_index, 0);
    assert_eq!(confidence[0].body.payload.text(), Some("0.800"));

    assert_eq!(batch.of_category(MarkerCategory::Label).next().unwrap().body.payload.text(), Some("CAR"));
    assert_eq!(report.skipped_for(SkipReason::EmptyPath), 1);
    // no covariance was supplied
    assert_eq!(report.skipped_for(SkipReason::DegenerateCovariance), 1);
}

#[test]
fn test_repeat_frame_keeps_ids_and_replaces_batch() {
    let mut asm = assembler();
    asm.process(&ObjectListMessage::new(header(1), vec![u1()])).unwrap();
    let first = asm.sink().last_batch().unwrap().clone();

    asm.process(&ObjectListMessage::new(header(2), vec![u1()])).unwrap();
    let second = asm.sink().last_batch().unwrap();

    let first_ids: Vec<MarkerId> = first.ids().collect();
    let second_ids: Vec<MarkerId> = second.ids().collect();
    assert_eq!(first_ids, second_ids);

    // nothing from the first submission survives in the second
    assert!(second.primitives.iter().all(|p| p.header.stamp == Stamp::new(2, 0)));
    assert_eq!(asm.sink().scene("tracks").unwrap().len(), second.len());
}

#[test]
fn test_vanished_object_leaves_no_ghosts() {
    let mut asm = assembler();
    let message = ObjectListMessage::new(header(1), vec![u1(), moving(7, 10.0)]);
    asm.process(&message).unwrap();
    assert_eq!(asm.registry().len(), 2);

    asm.process(&ObjectListMessage::new(header(2), vec![moving(7, 11.2)])).unwrap();
    let scene = asm.sink().scene("tracks").unwrap();
    assert!(scene.values().all(|p| p.object_id == Uuid::from_u128(7)));
    assert_eq!(asm.registry().len(), 1);
}

#[test]
fn test_surviving_objects_keep_handles_under_churn() {
    let mut asm = assembler();
    let steady = Uuid::from_u128(100);

    let mut steady_handle = None;
    for frame in 0..20u128 {
        // a rotating cast of transient objects around one steady one
        let mut objects = vec![moving(100, frame as f64)];
        objects.extend((0..(frame % 4)).map(|k| moving(1_000 + frame * 10 + k, -5.0)));
        asm.process(&ObjectListMessage::new(header(frame as i32), objects)).unwrap();

        let handle = asm.registry().handle_of(&steady).unwrap();
        assert_eq!(*steady_handle.get_or_insert(handle), handle);
    }
    // recycling keeps the handle space bounded by the largest frame
    assert!(asm.registry().len() <= 4);
}

#[test]
fn test_recycled_handle_reused_by_newcomer() {
    let mut asm = assembler();
    asm.process(&ObjectListMessage::new(header(1), vec![moving(1, 0.0), moving(2, 5.0)]))
        .unwrap();
    let gone = asm.registry().handle_of(&Uuid::from_u128(1)).unwrap();

    asm.process(&ObjectListMessage::new(header(2), vec![moving(2, 5.0), moving(3, 9.0)]))
        .unwrap();
    assert_eq!(asm.registry().handle_of(&Uuid::from_u128(3)), Some(gone));

    let ids: HashSet<MarkerId> = asm.sink().last_batch().unwrap().ids().collect();
    assert_eq!(ids.len(), asm.sink().last_batch().unwrap().len());
}

#[test]
fn test_retain_policy_never_reuses_handles() {
    let config = DisplayConfig {
        eviction: EvictionPolicy::Retain,
        ..Default::default()
    };
    let mut asm = FrameAssembler::with_config(config, MemorySink::new()).unwrap();
    asm.process(&ObjectListMessage::new(header(1), vec![moving(1, 0.0)])).unwrap();
    let first = asm.registry().handle_of(&Uuid::from_u128(1)).unwrap();

    asm.process(&ObjectListMessage::new(header(2), vec![moving(2, 0.0)])).unwrap();
    assert_ne!(asm.registry().handle_of(&Uuid::from_u128(2)), Some(first));
    assert_eq!(asm.registry().handle_of(&Uuid::from_u128(1)), Some(first));
}

#[test]
fn test_empty_message_clears_namespace() {
    let mut asm = assembler();
    asm.process(&ObjectListMessage::new(header(1), vec![u1()])).unwrap();
    let report = asm.process(&ObjectListMessage::new(header(2), Vec::new())).unwrap();

    assert_eq!(report.emitted, 0);
    assert!(asm.sink().scene("tracks").unwrap().is_empty());
}

#[test]
fn test_custom_namespace_is_stamped() {
    let config = DisplayConfig::from_json_str(r#"{ "namespace": "perception/objects" }"#).unwrap();
    let mut asm = FrameAssembler::with_config(config, MemorySink::new()).unwrap();
    asm.process(&ObjectListMessage::new(header(1), vec![u1()])).unwrap();

    assert!(asm.sink().scene("tracks").is_none());
    let scene = asm.sink().scene("perception/objects").unwrap();
    assert!(scene.values().all(|p| p.namespace == "perception/objects"));
}

#[test]
fn test_json_lines_export() {
    let mut asm = FrameAssembler::with_config(DisplayConfig::default(), JsonLinesSink::new(Vec::new())).unwrap();
    for sec in 1..=3 {
        asm.process(&ObjectListMessage::new(header(sec), vec![u1()])).unwrap();
    }

    let out = String::from_utf8(asm.into_sink().into_inner()).unwrap();
    let frames: Vec<serde_json::Value> = out
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[2]["frame"], 3);
    assert_eq!(frames[2]["namespace"], "tracks");
    assert_eq!(frames[2]["primitives"].as_array().unwrap().len(), 8);
}
