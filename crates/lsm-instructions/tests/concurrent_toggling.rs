//! Enable flags toggled from another thread while the schedule is walked.

use lsm_hardware::DeviceRegistry;
use lsm_instructions::{InstructionContext, InstructionList, OperatorPrompt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

fn prompts(n: usize) -> InstructionList {
    let mut list = InstructionList::new();
    for i in 0..n {
        list.append(OperatorPrompt::new(format!("prompt {i}"), "continue"));
    }
    list
}

#[test]
fn toggling_while_iterating_keeps_order() {
    let list = prompts(16);
    let registry = DeviceRegistry::new();
    let ctx = InstructionContext::new(&registry, 0);
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| {
            let mut enabled = false;
            while !done.load(Ordering::Acquire) {
                for name in ["prompt 3", "prompt 7", "prompt 11"] {
                    list.set_enabled_by_name(name, enabled).unwrap();
                }
                enabled = !enabled;
            }
        });

        for _ in 0..200 {
            let positions: Vec<_> = list
                .ordered_enabled()
                .map(|e| list.position(e.id()).unwrap())
                .collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]));
            assert!(positions.contains(&0));
            assert!(positions.contains(&15));

            for entry in list.ordered_enabled() {
                entry.execute(&ctx).unwrap();
            }
        }
        done.store(true, Ordering::Release);
    });
}

#[test]
fn toggles_between_cycles_are_seen_next_cycle() {
    let list = prompts(4);
    assert_eq!(list.ordered_enabled().count(), 4);

    thread::scope(|s| {
        s.spawn(|| list.set_enabled_by_name("prompt 1", false).unwrap())
            .join()
            .unwrap();
    });

    let names: Vec<_> = list.ordered_enabled().map(|e| e.name().to_string()).collect();
    assert_eq!(names, vec!["prompt 0", "prompt 2", "prompt 3"]);
}
