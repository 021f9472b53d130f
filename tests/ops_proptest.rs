use std::sync::{
    atomic::{AtomicUsize, Ordering::Relaxed},
    Arc,
};

use proptest::prelude::*;
use rwarc::{with_mut, Strong, Weak};

struct Tally
{
    hits: Arc<AtomicUsize>,
    value: u64,
}

impl Drop for Tally
{
    fn drop(&mut self) { self.hits.fetch_add(1, Relaxed); }
}

fn fresh(hits: &Arc<AtomicUsize>) -> Strong<Tally>
{
    Strong::new(Tally {
        hits: hits.clone(),
        value: 0,
    })
}

// Random interleavings of clone/drop/assign/downgrade/upgrade over a few
// allocations: each payload's destructor must run exactly once, and only
// after its last owner is gone.
proptest! {
    #[test]
    fn prop_each_payload_destroyed_exactly_once(
        ops in proptest::collection::vec((0u8..6, any::<u16>(), any::<u16>()), 1..200),
    ) {
        let counters: Vec<Arc<AtomicUsize>> =
            (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let mut strongs: Vec<Strong<Tally>> = counters.iter().map(fresh).collect();
        let mut weaks: Vec<Weak<Tally>> = Vec::new();

        for (op, a, b) in ops {
            let a = a as usize;
            let b = b as usize;
            match op {
                // clone an owner
                0 => {
                    if !strongs.is_empty() {
                        let s = strongs[a % strongs.len()].clone();
                        prop_assert!(!s.is_empty());
                        strongs.push(s);
                    }
                }
                // drop an owner
                1 => {
                    if !strongs.is_empty() {
                        strongs.swap_remove(a % strongs.len());
                    }
                }
                // reseat one owner onto another's block
                2 => {
                    if !strongs.is_empty() {
                        let src = strongs[b % strongs.len()].clone();
                        let i = a % strongs.len();
                        strongs[i].assign(&src);
                        prop_assert!(strongs[i].ptr_eq(&src));
                    }
                }
                // derive an observer
                3 => {
                    if !strongs.is_empty() {
                        weaks.push(strongs[a % strongs.len()].downgrade());
                    }
                }
                // try to promote an observer
                4 => {
                    if !weaks.is_empty() {
                        let up = weaks[a % weaks.len()].upgrade();
                        if !up.is_empty() {
                            strongs.push(up);
                        }
                    }
                }
                // drop an observer
                5 => {
                    if !weaks.is_empty() {
                        weaks.swap_remove(a % weaks.len());
                    }
                }
                _ => unreachable!(),
            }

            for s in &strongs {
                prop_assert!(s.strong_count() >= 1);
            }
        }

        // every surviving owner still reaches a live, writable payload
        for s in &strongs {
            with_mut(s, |p| p.value += 1).unwrap();
        }

        strongs.clear();
        for c in &counters {
            prop_assert_eq!(c.load(Relaxed), 1);
        }
        for w in &weaks {
            prop_assert!(w.upgrade().is_empty());
        }
    }
}
