//! Integration tests for bridge sessions against the in-process fake engine.

mod common;

use std::sync::atomic::Ordering;

use autumn_bridge::{
    Array, Bridge, BridgeError, CallOptions, CallOutput, DeletePolicy, ErrorPolicy, StubPolicy,
    Value,
};
use common::{leftover_files, test_env, FakeEngine};

fn open_bridge() -> (tempfile::TempDir, Bridge<FakeEngine>) {
    let (temp, config) = test_env();
    let engine = FakeEngine::with_standard_routines(temp.path());
    let bridge = Bridge::with_engine(engine, config).unwrap();
    (temp, bridge)
}

#[test]
fn test_scalar_round_trip() {
    let (temp, mut bridge) = open_bridge();
    let out = bridge
        .call("add1", &[Value::Int(4)], &CallOptions::new())
        .unwrap();
    assert_eq!(out, CallOutput::Single(Some(Value::Float(5.0))));
    assert!(leftover_files(&temp).is_empty());
}

#[test]
fn test_vector_routine() {
    let (_temp, mut bridge) = open_bridge();
    let out = bridge
        .call(
            "sortAscending",
            &[Value::from(vec![3, 1, 2])],
            &CallOptions::new().with_result_count(1),
        )
        .unwrap()
        .into_single()
        .unwrap();
    let sorted = out.as_array().unwrap();
    assert_eq!(sorted.shape(), &[3]);
    assert_eq!(sorted.to_f64_vec(), vec![1.0, 2.0, 3.0]);
}

#[test]
fn test_missing_routine_strict() {
    let (temp, mut bridge) = open_bridge();
    let err = bridge
        .call("doesNotExist", &[Value::Int(1)], &CallOptions::new())
        .unwrap_err();
    assert!(matches!(err, BridgeError::RemoteEvaluation { .. }));
    assert!(leftover_files(&temp).is_empty());
}

#[test]
fn test_missing_routine_lenient() {
    let (temp, mut bridge) = open_bridge();
    let options = CallOptions::new().with_error_policy(ErrorPolicy::Lenient);
    let out = bridge
        .call("doesNotExist", &[Value::Int(1)], &options)
        .unwrap();
    assert_eq!(out, CallOutput::Single(None));
    assert!(leftover_files(&temp).is_empty());

    let out = bridge
        .call("fails", &[], &options.clone().with_result_count(2))
        .unwrap();
    assert_eq!(out, CallOutput::Tuple(vec![None, None]));
}

#[test]
fn test_session_default_policy_is_used() {
    let (temp, config) = test_env();
    let engine = FakeEngine::with_standard_routines(temp.path());
    let mut bridge =
        Bridge::with_engine(engine, config.with_error_policy(ErrorPolicy::Lenient)).unwrap();
    let out = bridge.call("fails", &[], &CallOptions::new()).unwrap();
    assert!(out.is_failure());

    // An explicit policy on the call wins.
    let strict = CallOptions::new().with_error_policy(ErrorPolicy::Strict);
    assert!(bridge.call("fails", &[], &strict).is_err());
}

#[test]
fn test_result_arity() {
    let (_temp, mut bridge) = open_bridge();

    let none = bridge
        .call("add1", &[Value::Int(1)], &CallOptions::new().with_result_count(0))
        .unwrap();
    assert_eq!(none, CallOutput::Tuple(Vec::new()));
    let log = bridge.engine().command_log();
    assert!(log.iter().any(|c| c.starts_with("add1(")));
    assert!(!log.iter().any(|c| c.starts_with("save")));

    let two = bridge
        .call(
            "swap",
            &[Value::Float(1.0), Value::from("b")],
            &CallOptions::new().with_result_count(2),
        )
        .unwrap();
    assert_eq!(
        two,
        CallOutput::Tuple(vec![Some(Value::from("b")), Some(Value::Float(1.0))])
    );
}

#[test]
fn test_too_many_results_requested() {
    let (temp, mut bridge) = open_bridge();
    let err = bridge
        .call("add1", &[Value::Int(1)], &CallOptions::new().with_result_count(2))
        .unwrap_err();
    assert!(matches!(err, BridgeError::RemoteEvaluation { .. }));
    assert!(leftover_files(&temp).is_empty());
}

#[test]
fn test_encoding_error_skips_invocation() {
    let (temp, mut bridge) = open_bridge();
    let ragged = Value::Sequence(vec![Value::from(vec![1, 2]), Value::from(vec![3])]);
    let err = bridge
        .call("add1", &[ragged], &CallOptions::new())
        .unwrap_err();
    assert!(matches!(err, BridgeError::Encoding { .. }));

    let log = bridge.engine().command_log();
    assert!(log.iter().all(|c| !c.starts_with("AutumnBridge_")));
    assert!(leftover_files(&temp).is_empty());
}

#[test]
fn test_named_token_keeps_stub() {
    let (temp, mut bridge) = open_bridge();
    let options = CallOptions::new().with_token("B42");
    bridge.call("add1", &[Value::Int(1)], &options).unwrap();
    assert_eq!(leftover_files(&temp), vec!["AutumnBridge_test_B42.m"]);

    bridge.delete_stub("B42").unwrap();
    assert!(leftover_files(&temp).is_empty());
}

#[test]
fn test_delete_policy_overrides() {
    let (temp, mut bridge) = open_bridge();
    let delete = CallOptions::new()
        .with_token("B1")
        .with_delete(DeletePolicy::Delete);
    bridge.call("add1", &[Value::Int(1)], &delete).unwrap();
    assert!(leftover_files(&temp).is_empty());

    let keep = CallOptions::new().with_delete(false);
    bridge.call("add1", &[Value::Int(1)], &keep).unwrap();
    let files = leftover_files(&temp);
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("AutumnBridge_test_B") && files[0].ends_with(".m"));
}

#[test]
fn test_auto_stub_installs_once() {
    let (temp, mut bridge) = open_bridge();
    let options = CallOptions::new().with_token("B7");
    let out = bridge.call("add1", &[Value::Int(1)], &options).unwrap();
    assert_eq!(out.into_single(), Some(Value::Float(2.0)));

    // Mark the installed stub; a reinstall would drop the marker.
    let stub = temp.path().join("AutumnBridge_test_B7.m");
    let marked = format!("{}% marker\n", std::fs::read_to_string(&stub).unwrap());
    std::fs::write(&stub, &marked).unwrap();

    let out = bridge.call("add1", &[Value::Int(2)], &options).unwrap();
    assert_eq!(out.into_single(), Some(Value::Float(3.0)));
    assert_eq!(std::fs::read_to_string(&stub).unwrap(), marked);

    // Forcing installation rewrites it.
    let forced = options.clone().with_new_stub(StubPolicy::Install);
    bridge.call("add1", &[Value::Int(2)], &forced).unwrap();
    assert!(!std::fs::read_to_string(&stub).unwrap().contains("marker"));
}

#[test]
fn test_reuse_without_stub_fails() {
    let (temp, mut bridge) = open_bridge();
    let options = CallOptions::new()
        .with_token("B9")
        .with_new_stub(false);
    let err = bridge.call("add1", &[Value::Int(1)], &options).unwrap_err();
    assert!(matches!(err, BridgeError::RemoteEvaluation { .. }));
    assert!(leftover_files(&temp).is_empty());
}

#[test]
fn test_build_stub_ahead_of_time() {
    let (temp, mut bridge) = open_bridge();
    let path = bridge.build_stub("swap", "B5", 2, 2).unwrap();
    assert!(path.is_file());

    let options = CallOptions::new()
        .with_token("B5")
        .with_new_stub(StubPolicy::Reuse)
        .with_result_count(2);
    let out = bridge
        .call("swap", &[Value::Float(1.0), Value::Float(2.0)], &options)
        .unwrap();
    assert_eq!(
        out.into_vec(),
        vec![Some(Value::Float(2.0)), Some(Value::Float(1.0))]
    );
    assert_eq!(leftover_files(&temp), vec!["AutumnBridge_test_B5.m"]);
}

#[test]
fn test_result_missing_from_payload() {
    // The kept stub only saves one result; asking for two leaves the second
    // out of the output payload.
    let (temp, mut bridge) = open_bridge();
    bridge.build_stub("add1", "B4", 1, 1).unwrap();
    let options = CallOptions::new()
        .with_token("B4")
        .with_new_stub(StubPolicy::Reuse)
        .with_result_count(2);

    let err = bridge
        .call("add1", &[Value::Int(1)], &options)
        .unwrap_err();
    match err {
        BridgeError::MissingResult { name, .. } => assert_eq!(name, "OutB41"),
        other => panic!("expected a missing result, got {other}"),
    }
    assert_eq!(leftover_files(&temp), vec!["AutumnBridge_test_B4.m"]);

    let lenient = options
        .clone()
        .with_error_policy(ErrorPolicy::Lenient)
        .with_delete(true);
    let out = bridge.call("add1", &[Value::Int(1)], &lenient).unwrap();
    assert_eq!(out, CallOutput::Tuple(vec![None, None]));
    assert!(leftover_files(&temp).is_empty());
}

#[test]
fn test_workspace_set_get_contains() {
    let (temp, mut bridge) = open_bridge();
    bridge.set("x", vec![1, 2, 3]).unwrap();
    assert_eq!(
        bridge.get("x").unwrap(),
        Value::Array(Array::vector(vec![1.0, 2.0, 3.0]))
    );
    assert!(bridge.contains("x").unwrap());
    assert!(!bridge.contains("y").unwrap());
    assert!(matches!(
        bridge.get("y"),
        Err(BridgeError::KeyNotFound(ref name)) if name == "y"
    ));
    assert!(leftover_files(&temp).is_empty());
}

#[test]
fn test_set_text_and_scalar() {
    let (_temp, mut bridge) = open_bridge();
    bridge.set("label", "hello").unwrap();
    bridge.set("n", 7).unwrap();
    assert_eq!(bridge.get("label").unwrap(), Value::from("hello"));
    assert_eq!(bridge.get("n").unwrap(), Value::Float(7.0));
}

#[test]
fn test_invalid_variable_names() {
    let (_temp, mut bridge) = open_bridge();
    assert!(matches!(
        bridge.set("1x", 1.0),
        Err(BridgeError::Validation { .. })
    ));
    assert!(matches!(
        bridge.get("a b"),
        Err(BridgeError::Validation { .. })
    ));
}

#[test]
fn test_list_and_iterate_names() {
    let (temp, mut bridge) = open_bridge();
    assert!(bridge.list_names().unwrap().is_empty());

    bridge.set("b", 2.0).unwrap();
    bridge.set("a", 1.0).unwrap();
    assert_eq!(bridge.list_names().unwrap(), vec!["a", "b"]);

    let snapshot = bridge.iter_names().unwrap();
    bridge.set("c", 3.0).unwrap();
    assert_eq!(snapshot.collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(bridge.iter_names().unwrap().count(), 3);

    // Temporary outputs never stay behind in the workspace.
    assert_eq!(bridge.engine().workspace.len(), 3);
    assert!(leftover_files(&temp).is_empty());
}

#[test]
fn test_shape_of() {
    let (_temp, mut bridge) = open_bridge();
    let m = Array::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
    bridge.set("m", m).unwrap();
    assert_eq!(bridge.shape_of("m").unwrap(), vec![2, 3]);
    bridge.set("s", 1.5).unwrap();
    assert_eq!(bridge.shape_of("s").unwrap(), vec![1, 1]);
    assert!(matches!(
        bridge.shape_of("nope"),
        Err(BridgeError::KeyNotFound(_))
    ));
}

#[test]
fn test_eval_with_payload() {
    let (temp, mut bridge) = open_bridge();
    bridge.set("v", vec![3.0, 1.0, 2.0]).unwrap();
    let out = bridge.eval_with_payload("sortAscending(v)", 1).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].to_f64_vec().unwrap(), vec![1.0, 2.0, 3.0]);
    assert_eq!(bridge.engine().workspace.len(), 1);
    assert!(leftover_files(&temp).is_empty());

    let err = bridge.eval_with_payload("nothing(v)", 1).unwrap_err();
    assert!(matches!(err, BridgeError::RemoteEvaluation { .. }));
    assert!(leftover_files(&temp).is_empty());
}

#[test]
fn test_raw_eval_policies() {
    let (_temp, mut bridge) = open_bridge();
    let found = bridge.raw_eval("exist('x')", 1).unwrap();
    assert_eq!(found[0].as_f64(), Some(0.0));

    assert!(bridge.raw_eval("bogusCommand", 0).is_err());
    let none = bridge
        .raw_eval_with("bogusCommand", 0, ErrorPolicy::Lenient)
        .unwrap();
    assert!(none.is_empty());
    bridge.show().unwrap();
}

#[test]
fn test_session_changes_into_work_dir() {
    let (temp, bridge) = open_bridge();
    let log = bridge.engine().command_log();
    assert_eq!(log[0], format!("cd('{}')", temp.path().display()));
}

#[test]
fn test_owned_session_quits_engine() {
    let (temp, config) = test_env();
    let engine = FakeEngine::new(temp.path());
    let quit = engine.quit.clone();
    let bridge = Bridge::with_engine(engine, config).unwrap();
    assert!(bridge.is_owned());
    drop(bridge);
    assert!(quit.load(Ordering::SeqCst));
}

#[test]
fn test_attached_session_leaves_engine_running() {
    let (temp, config) = test_env();
    let engine = FakeEngine::new(temp.path());
    let quit = engine.quit.clone();
    let bridge = Bridge::attach(engine, config).unwrap();
    assert!(!bridge.is_owned());
    bridge.close().unwrap();
    assert!(!quit.load(Ordering::SeqCst));
}

#[test]
fn test_sessions_do_not_collide() {
    let (temp, config) = test_env();
    let first = FakeEngine::with_standard_routines(temp.path());
    let second = FakeEngine::with_standard_routines(temp.path());
    let mut a = Bridge::with_engine(first, config.clone().with_instance_id("one")).unwrap();
    let mut b = Bridge::with_engine(second, config.with_instance_id("two")).unwrap();

    let options = CallOptions::new().with_token("B1");
    a.call("add1", &[Value::Int(1)], &options).unwrap();
    b.call("add1", &[Value::Int(10)], &options).unwrap();
    assert_eq!(
        leftover_files(&temp),
        vec!["AutumnBridge_one_B1.m", "AutumnBridge_two_B1.m"]
    );
}
