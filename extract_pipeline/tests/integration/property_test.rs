//! # Property Tests
//!
//! Invariants that must hold for arbitrary inputs: item accounting through
//! the driver and gen-index stability under step-list mutation.

use proptest::prelude::*;

use extract_pipeline::infrastructure::config::ExtractConfig;
use extract_pipeline::infrastructure::runtime::PipeIterator;
use extract_pipeline_domain::entities::{Pipe, PipeStep};
use serde_json::json;

fn config() -> ExtractConfig {
    ExtractConfig { futures_poll_interval: 0.001, ..ExtractConfig::default() }
}

proptest! {
    /// Yielded items = produced items minus those dropped by a `None`
    /// transform.
    #[test]
    fn prop_yield_count_accounts_for_drops(values in prop::collection::vec(-1000i64..1000, 0..40)) {
        let expected: Vec<i64> = values.iter().filter(|v| **v % 2 == 0).map(|v| v * 3).collect();

        let pipe = Pipe::from_data(
            "prop",
            PipeStep::items(values.iter().map(|v| json!(v)).collect::<Vec<_>>()),
        ).unwrap();
        pipe.append_step(PipeStep::filter_map(|v| {
            if v.as_i64().unwrap() % 2 == 0 { Some(v) } else { None }
        })).unwrap();
        pipe.append_step(PipeStep::map(|v| json!(v.as_i64().unwrap() * 3))).unwrap();

        let yielded: Vec<i64> = PipeIterator::from_pipe(&pipe, &config())
            .unwrap()
            .map(|r| r.unwrap().item.as_i64().unwrap())
            .collect();
        prop_assert_eq!(yielded, expected);
    }

    /// Any sequence of valid appends/inserts/removes keeps the gen index
    /// pointing at a step, and the head element it points at is the step the
    /// pipe was seeded with.
    #[test]
    fn prop_gen_index_stays_valid(ops in prop::collection::vec((0u8..3, 0usize..8), 0..24)) {
        let parent = Pipe::from_data("parent", PipeStep::items(vec![json!(0)])).unwrap();
        let pipe = Pipe::with_parent("prop", &parent);
        pipe.append_step(PipeStep::map(|v| v)).unwrap();
        let gen_cell = pipe.gen_step().unwrap();

        for (op, index) in ops {
            let len = pipe.len();
            match op {
                0 => pipe.append_step(PipeStep::map(|v| v)).unwrap(),
                1 => {
                    let index = index % (len + 1);
                    pipe.insert_step(PipeStep::map(|v| v), index).unwrap();
                }
                _ => {
                    let index = index % len;
                    let gen_before = pipe.gen_index();
                    // removing the generator is refused, everything else works
                    let result = pipe.remove_step(index);
                    prop_assert_eq!(result.is_err(), index == gen_before);
                }
            }
            let gen_idx = pipe.gen_index();
            prop_assert!(gen_idx < pipe.len());
            let current = pipe.gen_step().unwrap();
            prop_assert!(std::rc::Rc::ptr_eq(&current, &gen_cell));
        }
    }
}
