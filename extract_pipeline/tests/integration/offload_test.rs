//! # Offload Tests
//!
//! Awaitable and deferred-callable steps: bounded in-flight work, completion
//! ordering, failure propagation, and scope release through the managed
//! iterator.

use std::time::Duration;

use extract_pipeline::infrastructure::config::ExtractConfig;
use extract_pipeline::infrastructure::runtime::{LoadScope, ManagedPipeIterator, PipeIterator};
use extract_pipeline_domain::entities::{Pipe, PipeStep};
use extract_pipeline_domain::ExtractError;
use serde_json::json;

fn config() -> ExtractConfig {
    ExtractConfig { futures_poll_interval: 0.001, ..ExtractConfig::default() }
}

#[test]
fn test_async_offload_respects_parallelism_cap() {
    let pipe = Pipe::from_data("squares", PipeStep::items(vec![json!(1), json!(2), json!(3)]))
        .unwrap();
    pipe.append_step(PipeStep::async_map(|v| async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let n = v.as_i64().unwrap();
        Ok(json!(n * n))
    }))
    .unwrap();

    let config = ExtractConfig { max_parallel_items: 2, workers: 2, ..config() };
    let mut iterator = PipeIterator::from_pipe(&pipe, &config).unwrap();

    let mut values = Vec::new();
    loop {
        assert!(iterator.in_flight_futures() <= 2, "parallelism cap exceeded");
        match iterator.next() {
            Some(result) => values.push(result.unwrap().item.as_i64().unwrap()),
            None => break,
        }
    }
    values.sort();
    assert_eq!(values, vec![1, 4, 9]);
}

#[test]
fn test_blocking_offload_resolves_on_thread_pool() {
    let pipe = Pipe::from_data(
        "blocking",
        PipeStep::items(vec![json!(1), json!(2), json!(3), json!(4)]),
    )
    .unwrap();
    pipe.append_step(PipeStep::blocking_map(|v| {
        std::thread::sleep(Duration::from_millis(5));
        Ok(json!(v.as_i64().unwrap() * 100))
    }))
    .unwrap();

    let config = ExtractConfig { max_parallel_items: 3, workers: 2, ..config() };
    let mut values: Vec<i64> = PipeIterator::from_pipe(&pipe, &config)
        .unwrap()
        .map(|r| r.unwrap().item.as_i64().unwrap())
        .collect();
    values.sort();
    assert_eq!(values, vec![100, 200, 300, 400]);
}

#[test]
fn test_future_results_rejoin_in_completion_order() {
    // the slowest item is submitted first; faster ones overtake it
    let pipe = Pipe::from_data("race", PipeStep::items(vec![json!(50), json!(1)])).unwrap();
    pipe.append_step(PipeStep::async_map(|v| async move {
        let delay = v.as_i64().unwrap() as u64;
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(v)
    }))
    .unwrap();

    let values: Vec<i64> = PipeIterator::from_pipe(&pipe, &config())
        .unwrap()
        .map(|r| r.unwrap().item.as_i64().unwrap())
        .collect();
    assert_eq!(values, vec![1, 50]);
}

#[test]
fn test_failed_future_surfaces_on_driver() {
    let pipe = Pipe::from_data("failing", PipeStep::items(vec![json!(1), json!(2)])).unwrap();
    pipe.append_step(PipeStep::async_map(|v| async move {
        if v == json!(2) {
            Err(ExtractError::ProcessingFailed("async boom".to_string()))
        } else {
            Ok(v)
        }
    }))
    .unwrap();

    let results: Vec<_> = PipeIterator::from_pipe(&pipe, &config()).unwrap().collect();
    assert!(results.iter().any(|r| matches!(
        r,
        Err(ExtractError::ProcessingFailed(msg)) if msg.contains("async boom")
    )));
}

#[test]
fn test_panicking_blocking_step_surfaces_as_error() {
    let pipe = Pipe::from_data("panicking", PipeStep::items(vec![json!(1)])).unwrap();
    pipe.append_step(PipeStep::blocking_map(|_v| panic!("worker blew up"))).unwrap();

    let mut iterator = PipeIterator::from_pipe(&pipe, &config()).unwrap();
    let err = iterator.next().unwrap().unwrap_err();
    match err {
        ExtractError::ProcessingFailed(msg) => assert!(msg.contains("worker blew up")),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_managed_iterator_releases_scope_on_failure() {
    let pipe = Pipe::from_data("failing", PipeStep::items(vec![json!(1), json!(2), json!(3)]))
        .unwrap();
    pipe.append_step(PipeStep::transform(|v, _meta| {
        if v == json!(2) {
            Err(ExtractError::ProcessingFailed("boom at 2".to_string()))
        } else {
            Ok(Some(extract_pipeline_domain::value_objects::StepPayload::Data(v)))
        }
    }))
    .unwrap();

    let scope = LoadScope::new("load-7");
    let inner = PipeIterator::from_pipe(&pipe, &config()).unwrap();
    let mut managed = ManagedPipeIterator::new(inner);
    managed.set_scope(Box::new(scope.clone()));
    assert!(scope.is_entered());

    let mut saw_error = false;
    for result in managed.by_ref() {
        if result.is_err() {
            saw_error = true;
            break;
        }
    }
    assert!(saw_error);
    assert!(scope.is_released());
    assert!(scope.failure().unwrap().contains("boom at 2"));
    // the dispatcher was closed with the failure
    assert_eq!(managed.in_flight_futures(), 0);
    assert!(managed.next().is_none());
}

#[test]
fn test_managed_iterator_releases_scope_on_exhaustion() {
    let pipe = Pipe::from_data("ok", PipeStep::items(vec![json!(1)])).unwrap();
    let scope = LoadScope::new("load-8");
    let inner = PipeIterator::from_pipe(&pipe, &config()).unwrap();
    let mut managed = ManagedPipeIterator::new(inner);
    managed.set_scope(Box::new(scope.clone()));

    let values: Vec<_> = managed.by_ref().map(|r| r.unwrap().item).collect();
    assert_eq!(values, vec![json!(1)]);
    assert!(scope.is_released());
    assert!(scope.failure().is_none());
}

#[test]
fn test_close_is_idempotent_and_terminal() {
    let pipe = Pipe::from_data("numbers", PipeStep::items(vec![json!(1), json!(2)])).unwrap();
    let mut iterator = PipeIterator::from_pipe(&pipe, &config()).unwrap();
    assert_eq!(iterator.next().unwrap().unwrap().item, json!(1));

    iterator.close();
    iterator.close();
    assert!(iterator.next().is_none());
    assert_eq!(iterator.in_flight_futures(), 0);
    assert_eq!(iterator.live_sources(), 0);
}
