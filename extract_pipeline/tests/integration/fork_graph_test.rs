//! # Fork Graph Tests
//!
//! Fan-out assembly from pipe sets: forking parents into children, yielding
//! parents at their tails, and identity-preserving cloning of shared
//! ancestry.

use extract_pipeline::infrastructure::config::ExtractConfig;
use extract_pipeline::infrastructure::runtime::PipeIterator;
use extract_pipeline_domain::entities::{Pipe, PipeStep};
use serde_json::json;

fn config() -> ExtractConfig {
    ExtractConfig { futures_poll_interval: 0.001, ..ExtractConfig::default() }
}

fn fan_out() -> (Pipe, Pipe, Pipe) {
    let parent = Pipe::from_data("parent", PipeStep::items(vec![json!(1), json!(2)])).unwrap();
    let c1 = Pipe::with_parent("c1", &parent);
    c1.append_step(PipeStep::map(|v| json!(v.as_i64().unwrap() + 10))).unwrap();
    let c2 = Pipe::with_parent("c2", &parent);
    c2.append_step(PipeStep::map(|v| json!(v.as_i64().unwrap() + 20))).unwrap();
    (parent, c1, c2)
}

fn collect_tagged(iterator: PipeIterator) -> Vec<(String, i64)> {
    let mut out: Vec<(String, i64)> = iterator
        .map(|r| {
            let item = r.expect("iteration failed");
            (item.pipe_name(), item.item.as_i64().expect("integer item"))
        })
        .collect();
    out.sort();
    out
}

#[test]
fn test_fork_with_yielded_parent() {
    let (parent, c1, c2) = fan_out();
    let iterator =
        PipeIterator::from_pipes(&[parent, c1, c2], true, &config()).unwrap();
    let tagged = collect_tagged(iterator);
    assert_eq!(
        tagged,
        vec![
            ("c1".to_string(), 11),
            ("c1".to_string(), 12),
            ("c2".to_string(), 21),
            ("c2".to_string(), 22),
            ("parent".to_string(), 1),
            ("parent".to_string(), 2),
        ]
    );
}

#[test]
fn test_fork_without_yielded_parent() {
    let (parent, c1, c2) = fan_out();
    let iterator =
        PipeIterator::from_pipes(&[parent, c1, c2], false, &config()).unwrap();
    let tagged = collect_tagged(iterator);
    assert_eq!(
        tagged,
        vec![
            ("c1".to_string(), 11),
            ("c1".to_string(), 12),
            ("c2".to_string(), 21),
            ("c2".to_string(), 22),
        ]
    );
}

#[test]
fn test_children_only_input_still_feeds_from_parent() {
    let (_parent, c1, c2) = fan_out();
    // the parent is not part of the input set, so it feeds but never yields
    let iterator = PipeIterator::from_pipes(&[c1, c2], true, &config()).unwrap();
    let tagged = collect_tagged(iterator);
    assert_eq!(
        tagged,
        vec![
            ("c1".to_string(), 11),
            ("c1".to_string(), 12),
            ("c2".to_string(), 21),
            ("c2".to_string(), 22),
        ]
    );
}

#[test]
fn test_copy_on_fork_keeps_items_independent() {
    let (parent, c1, c2) = fan_out();
    let config = ExtractConfig { copy_on_fork: true, ..config() };
    let iterator = PipeIterator::from_pipes(&[parent, c1, c2], true, &config).unwrap();
    let tagged = collect_tagged(iterator);
    assert_eq!(tagged.len(), 6);
}

#[test]
fn test_graph_can_be_iterated_twice() {
    let (parent, c1, c2) = fan_out();
    let pipes = [parent, c1, c2];
    let first = collect_tagged(PipeIterator::from_pipes(&pipes, true, &config()).unwrap());
    // assembly mutates only clones, so the same pipes assemble again
    let second = collect_tagged(PipeIterator::from_pipes(&pipes, true, &config()).unwrap());
    assert_eq!(first, second);
    // the user's parent pipe still has its original single step
    assert_eq!(pipes[0].len(), 1);
}

#[test]
fn test_deep_transformer_chain() {
    let root = Pipe::from_data("root", PipeStep::items(vec![json!(1), json!(2)])).unwrap();
    let mid = Pipe::with_parent("mid", &root);
    mid.append_step(PipeStep::map(|v| json!(v.as_i64().unwrap() * 10))).unwrap();
    let leaf = Pipe::with_parent("leaf", &mid);
    leaf.append_step(PipeStep::map(|v| json!(v.as_i64().unwrap() + 1))).unwrap();

    let iterator = PipeIterator::from_pipes(&[leaf], true, &config()).unwrap();
    let tagged = collect_tagged(iterator);
    assert_eq!(tagged, vec![("leaf".to_string(), 11), ("leaf".to_string(), 21)]);
}

#[test]
fn test_yield_parents_includes_middle_of_chain() {
    let root = Pipe::from_data("root", PipeStep::items(vec![json!(1)])).unwrap();
    let mid = Pipe::with_parent("mid", &root);
    mid.append_step(PipeStep::map(|v| json!(v.as_i64().unwrap() * 10))).unwrap();
    let leaf = Pipe::with_parent("leaf", &mid);
    leaf.append_step(PipeStep::map(|v| json!(v.as_i64().unwrap() + 1))).unwrap();

    let iterator = PipeIterator::from_pipes(&[mid.clone(), leaf], true, &config()).unwrap();
    let tagged = collect_tagged(iterator);
    assert_eq!(tagged, vec![("leaf".to_string(), 11), ("mid".to_string(), 10)]);
}
