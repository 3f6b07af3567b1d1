//! # Pipe Dispatch Tests
//!
//! End-to-end behavior of the driving iterator over linear pipes: mapping,
//! filtering via `None`, iterator expansion, transformer flattening, and meta
//! propagation.

use extract_pipeline::infrastructure::config::ExtractConfig;
use extract_pipeline::infrastructure::runtime::PipeIterator;
use extract_pipeline_domain::entities::{Pipe, PipeStep};
use extract_pipeline_domain::value_objects::{meta_from, DataItem, StepPayload};
use extract_pipeline_domain::ExtractError;
use serde_json::json;

fn config() -> ExtractConfig {
    ExtractConfig { futures_poll_interval: 0.001, ..ExtractConfig::default() }
}

fn collect_values(iterator: PipeIterator) -> Vec<DataItem> {
    iterator.map(|r| r.expect("iteration failed").item).collect()
}

#[test]
fn test_linear_pipe() {
    let pipe = Pipe::from_data("numbers", PipeStep::items(vec![json!(1), json!(2), json!(3)]))
        .unwrap();
    pipe.append_step(PipeStep::map(|v| json!(v.as_i64().unwrap() * 10))).unwrap();

    let values = collect_values(PipeIterator::from_pipe(&pipe, &config()).unwrap());
    assert_eq!(values, vec![json!(10), json!(20), json!(30)]);
}

#[test]
fn test_filter_via_none() {
    let pipe = Pipe::from_data(
        "numbers",
        PipeStep::items(vec![json!(1), json!(2), json!(3), json!(4)]),
    )
    .unwrap();
    pipe.append_step(PipeStep::filter_map(|v| {
        if v.as_i64().unwrap() % 2 == 0 {
            Some(v)
        } else {
            None
        }
    }))
    .unwrap();

    let values = collect_values(PipeIterator::from_pipe(&pipe, &config()).unwrap());
    assert_eq!(values, vec![json!(2), json!(4)]);
}

#[test]
fn test_expand_via_iterator() {
    let pipe = Pipe::from_data(
        "nested",
        PipeStep::items(vec![json!([1, 2]), json!([3])]),
    )
    .unwrap();
    pipe.append_step(PipeStep::flat_map(|v| v.as_array().unwrap().clone())).unwrap();

    let values = collect_values(PipeIterator::from_pipe(&pipe, &config()).unwrap());
    // the nested iterator drains before the parent source continues
    assert_eq!(values, vec![json!(1), json!(2), json!(3)]);
}

#[test]
fn test_transformer_pipe_is_flattened() {
    let parent =
        Pipe::from_data("parent", PipeStep::items(vec![json!(1), json!(2), json!(3)])).unwrap();
    let child = Pipe::with_parent("child", &parent);
    child.append_step(PipeStep::map(|v| json!(v.as_i64().unwrap() * 10))).unwrap();

    let iterator = PipeIterator::from_pipe(&child, &config()).unwrap();
    let mut names = Vec::new();
    let mut values = Vec::new();
    for item in iterator {
        let item = item.unwrap();
        names.push(item.pipe_name());
        values.push(item.item);
    }
    assert_eq!(values, vec![json!(10), json!(20), json!(30)]);
    assert!(names.iter().all(|n| n == "child"));
}

#[test]
fn test_pipe_can_be_iterated_twice() {
    let pipe = Pipe::from_data("numbers", PipeStep::items(vec![json!(1), json!(2)])).unwrap();
    pipe.append_step(PipeStep::map(|v| v)).unwrap();

    let first = collect_values(PipeIterator::from_pipe(&pipe, &config()).unwrap());
    let second = collect_values(PipeIterator::from_pipe(&pipe, &config()).unwrap());
    assert_eq!(first, second);
}

#[test]
fn test_producer_head_is_called_lazily() {
    let pipe = Pipe::from_data(
        "produced",
        PipeStep::producer(|| vec![json!("a"), json!("b")].into_iter()),
    )
    .unwrap();

    let values = collect_values(PipeIterator::from_pipe(&pipe, &config()).unwrap());
    assert_eq!(values, vec![json!("a"), json!("b")]);

    // the factory produces a fresh iterator per run
    let again = collect_values(PipeIterator::from_pipe(&pipe, &config()).unwrap());
    assert_eq!(again, vec![json!("a"), json!("b")]);
}

#[test]
fn test_unbound_producer_fails_iteration_start() {
    let pipe = Pipe::from_data("unbound", PipeStep::unbound(["api_key"])).unwrap();
    let err = PipeIterator::from_pipe(&pipe, &config()).unwrap_err();
    assert!(matches!(err, ExtractError::ParametrizedResourceUnbound(..)));
}

#[test]
fn test_meta_replacement_flows_downstream() {
    let pipe = Pipe::from_data("tagged", PipeStep::items(vec![json!(1), json!(2)])).unwrap();
    pipe.append_step(PipeStep::transform(|v, _meta| {
        Ok(Some(StepPayload::WithMeta(v, Some(meta_from(json!("tag"))))))
    }))
    .unwrap();
    pipe.append_step(PipeStep::transform(|v, meta| {
        let seen = meta.as_deref().cloned().unwrap_or(json!(null));
        Ok(Some(StepPayload::Data(json!({"value": v, "meta": seen}))))
    }))
    .unwrap();

    let items: Vec<_> = PipeIterator::from_pipe(&pipe, &config())
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(items.len(), 2);
    for item in &items {
        assert_eq!(item.item["meta"], json!("tag"));
        assert_eq!(item.meta.as_deref(), Some(&json!("tag")));
    }
}

#[test]
fn test_yielded_step_index_is_final_step() {
    let pipe = Pipe::from_data("numbers", PipeStep::items(vec![json!(1)])).unwrap();
    pipe.append_step(PipeStep::map(|v| v)).unwrap();
    pipe.append_step(PipeStep::map(|v| v)).unwrap();

    let items: Vec<_> = PipeIterator::from_pipe(&pipe, &config())
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].step, 2);
}

#[test]
fn test_transform_error_terminates_iteration() {
    let pipe = Pipe::from_data("numbers", PipeStep::items(vec![json!(1), json!(2), json!(3)]))
        .unwrap();
    pipe.append_step(PipeStep::transform(|v, _meta| {
        if v == json!(2) {
            Err(ExtractError::ProcessingFailed("refusing 2".to_string()))
        } else {
            Ok(Some(StepPayload::Data(v)))
        }
    }))
    .unwrap();

    let mut iterator = PipeIterator::from_pipe(&pipe, &config()).unwrap();
    assert_eq!(iterator.next().unwrap().unwrap().item, json!(1));
    let err = iterator.next().unwrap().unwrap_err();
    assert!(matches!(err, ExtractError::ProcessingFailed(_)));
}
