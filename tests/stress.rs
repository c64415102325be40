extern crate deferred;
extern crate env_logger;
extern crate num_cpus;
extern crate rand;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use rand::Rng;

use deferred::{reason, Next, Promise};

#[test]
fn test_wide_fan_out() {
    let _ = env_logger::try_init();

    let count = num_cpus::get() * 16;
    let mut rng = rand::thread_rng();

    let promises: Vec<Promise<usize>> = (0..count)
        .map(|i| {
            let delay = Duration::from_millis(rng.gen_range(0..20));
            Promise::new(move |settlement| {
                thread::sleep(delay);
                settlement.resolve(i).map_err(reason)
            })
            .then(|v| Ok(Next::Value(v + 1)))
        })
        .collect();

    let values = Promise::all(promises).wait().unwrap();
    assert_eq!(values, (1..count + 1).collect::<Vec<_>>());
}

#[test]
fn test_long_chain() {
    let _ = env_logger::try_init();

    let (head, settlement) = Promise::deferred();
    let mut tail = head.clone();
    for _ in 0..10_000 {
        tail = tail.then(|v: u64| Ok(Next::Value(v + 1)));
    }

    settlement.resolve(0).unwrap();
    assert_eq!(tail.wait().unwrap(), 10_000);
}

#[test]
fn test_concurrent_settle_race() {
    let _ = env_logger::try_init();

    for _ in 0..100 {
        let (p, settlement) = Promise::<usize>::deferred();
        let mut settlers = Vec::new();

        for i in 0..num_cpus::get().max(2) {
            let settlement = settlement.clone();
            settlers.push(thread::spawn(move || settlement.resolve(i).is_ok()));
        }

        let winners = settlers.into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(p.wait().is_ok());
    }
}

#[test]
fn test_register_while_settling() {
    let _ = env_logger::try_init();

    let registrars = num_cpus::get().max(2);
    const PER_THREAD: usize = 2_000;

    for _ in 0..10 {
        let (p, settlement) = Promise::<usize>::deferred();
        let runs: Arc<Vec<AtomicUsize>> = Arc::new((0..registrars * PER_THREAD).map(|_| AtomicUsize::new(0)).collect());
        let start = Arc::new(Barrier::new(registrars + 1));

        let threads: Vec<_> = (0..registrars)
            .map(|t| {
                let p = p.clone();
                let runs = runs.clone();
                let start = start.clone();
                thread::spawn(move || {
                    start.wait();
                    (0..PER_THREAD)
                        .map(|i| {
                            let runs = runs.clone();
                            p.then(move |v| {
                                runs[t * PER_THREAD + i].fetch_add(1, Ordering::SeqCst);
                                Ok(Next::Value(v))
                            })
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        start.wait();
        thread::sleep(Duration::from_micros(rand::thread_rng().gen_range(0..500)));
        settlement.resolve(42).unwrap();

        for handle in threads {
            for link in handle.join().unwrap() {
                assert_eq!(link.wait_timeout(Duration::from_secs(10)).unwrap(), 42);
            }
        }
        assert!(runs.iter().all(|n| n.load(Ordering::SeqCst) == 1));
    }
}

#[test]
fn test_cancel_and_drop_long_chains() {
    let _ = env_logger::try_init();

    let (head, _settlement) = Promise::<u64>::deferred();
    let mut tail = head.clone();
    for _ in 0..200_000 {
        tail = tail.then(|v| Ok(Next::Value(v + 1)));
    }
    assert!(head.cancel(true));
    assert!(tail.is_cancelled());

    let (head, settlement) = Promise::<u64>::deferred();
    let mut tail = head.clone();
    for _ in 0..200_000 {
        tail = tail.then(|v| Ok(Next::Value(v + 1)));
    }
    drop(head);
    drop(settlement);
    assert!(tail.is_pending());
}
