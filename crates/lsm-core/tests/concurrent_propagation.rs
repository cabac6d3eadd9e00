//! Propagation under concurrent writers.

use lsm_core::Variable;
use std::thread;

#[test]
fn concurrent_writers_on_shared_downstream_do_not_deadlock() {
    // Two upstream variables feeding the same downstream chain from two threads.
    let camera_a = Variable::new("camera_a.exposure", 0.0f64);
    let camera_b = Variable::new("camera_b.exposure", 0.0f64);
    let sheet = Variable::new("sheet.effective_exposure", 0.0f64);
    let readout = Variable::new("sheet.readout", 0.0f64);

    camera_a.subscribe(&sheet).unwrap();
    camera_b.subscribe(&sheet).unwrap();
    sheet.subscribe_with(&readout, |s| s * 2.0).unwrap();

    let handles: Vec<_> = [camera_a.clone(), camera_b.clone()]
        .into_iter()
        .map(|camera| {
            thread::spawn(move || {
                for i in 0..500 {
                    camera.set(f64::from(i) * 1e-3).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // The last committed sheet value and its derived readout stay consistent.
    assert!((readout.get() - sheet.get() * 2.0).abs() < 1e-12);
    assert!((sheet.get() - 0.499).abs() < 1e-12);
}

#[test]
fn ui_thread_observes_propagated_values() {
    let exposure = Variable::new("exposure", 0.01f64);
    let effective = Variable::new("effective_exposure", 0.0f64);
    exposure.subscribe(&effective).unwrap();

    let rx = effective.watch();
    let writer = {
        let exposure = exposure.clone();
        thread::spawn(move || exposure.set(0.25).unwrap())
    };
    writer.join().unwrap();

    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow(), 0.25);
}

#[test]
fn racing_opposite_subscriptions_leave_one_link() {
    use lsm_core::InstrumentError;
    use std::sync::{Arc, Barrier};

    for _ in 0..100 {
        let a = Variable::new("a", 0i32);
        let b = Variable::new("b", 0i32);
        let barrier = Arc::new(Barrier::new(2));

        let forward = {
            let (a, b, barrier) = (a.clone(), b.clone(), barrier.clone());
            thread::spawn(move || {
                barrier.wait();
                a.subscribe(&b)
            })
        };
        let backward = {
            let (a, b, barrier) = (a.clone(), b.clone(), barrier.clone());
            thread::spawn(move || {
                barrier.wait();
                b.subscribe(&a)
            })
        };

        let results = [forward.join().unwrap(), backward.join().unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(InstrumentError::PropagationCycle { .. }))));
        assert_eq!(a.link_count() + b.link_count(), 1);
    }
}
