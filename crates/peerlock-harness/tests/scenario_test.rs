//! Scenario tests for the mutual-exclusion protocol.
//!
//! Each test scripts a small cluster through the in-memory world and checks
//! the outcome with an oracle. Mutual exclusion is additionally checked by
//! the runner after every step.

use std::time::Duration;

use peerlock_core::{LamportClock, NodeState};
use peerlock_harness::{Scenario, Step, World};

#[test]
fn uncontended_request_is_granted_by_everyone() {
    Scenario::new("uncontended")
        .node(1)
        .node(2)
        .node(3)
        .step(Step::Acquire(1))
        .step(Step::Expect(1, NodeState::Wanted))
        .step(Step::DeliverAll)
        .step(Step::Expect(1, NodeState::Held))
        .oracle(Box::new(|world| {
            if !world.unbacked_entries().is_empty() {
                return Err("node 1 entered without every grant".into());
            }
            let coordinator = world.coordinator(1).ok_or("node 1 missing")?;
            if coordinator.members().any_granted() {
                return Err("grants outlived the WANTED phase".into());
            }
            for id in [2, 3] {
                if world.coordinator(id).is_some_and(|c| !c.pending().is_empty()) {
                    return Err(format!("released node {id} deferred a request"));
                }
            }
            Ok(())
        }))
        .run()
        .expect("scenario should succeed");
}

#[test]
fn equal_timestamps_resolve_by_lowest_id() {
    Scenario::new("tie-break")
        .seed(7)
        .node_with_clock(1, LamportClock::starting_at(99))
        .node_with_clock(2, LamportClock::starting_at(99))
        .step(Step::Acquire(1))
        .step(Step::Acquire(2))
        .step(Step::DeliverShuffled)
        .step(Step::Expect(1, NodeState::Held))
        .step(Step::Expect(2, NodeState::Wanted))
        .step(Step::Release(1))
        .step(Step::DeliverAll)
        .step(Step::Expect(2, NodeState::Held))
        .oracle(Box::new(|world| {
            let first = world.coordinator(1).ok_or("node 1 missing")?;
            if !first.pending().is_empty() {
                return Err("node 1 kept a deferred request after release".into());
            }
            if world.max_held_observed() != 1 {
                return Err(format!("max held was {}", world.max_held_observed()));
            }
            Ok(())
        }))
        .run()
        .expect("scenario should succeed");
}

#[test]
fn silent_peer_is_evicted_and_stops_blocking() {
    Scenario::new("eviction")
        .node(1)
        .node(2)
        .node(3)
        .step(Step::Crash(2))
        .step(Step::Acquire(1))
        .step(Step::DeliverAll)
        .step(Step::Expect(1, NodeState::Wanted))
        .step(Step::Advance(Duration::from_secs(9)))
        .step(Step::Expect(1, NodeState::Wanted))
        .step(Step::Advance(Duration::from_secs(1)))
        .step(Step::Expect(1, NodeState::Held))
        .oracle(Box::new(|world| {
            let coordinator = world.coordinator(1).ok_or("node 1 missing")?;
            if coordinator.members().contains(2) {
                return Err("crashed node still listed".into());
            }
            if !coordinator.members().contains(3) {
                return Err("live node was evicted".into());
            }
            Ok(())
        }))
        .run()
        .expect("scenario should succeed");
}

#[test]
fn holder_crash_hands_over_after_timeout() {
    Scenario::new("holder crash")
        .node(1)
        .node(2)
        .node(3)
        .step(Step::Acquire(2))
        .step(Step::DeliverAll)
        .step(Step::Expect(2, NodeState::Held))
        .step(Step::Acquire(1))
        .step(Step::Acquire(3))
        .step(Step::DeliverAll)
        .step(Step::Expect(1, NodeState::Wanted))
        .step(Step::Expect(3, NodeState::Wanted))
        .step(Step::Crash(2))
        .step(Step::Advance(Duration::from_secs(10)))
        // Both stamped the same timestamp after observing node 2's request.
        .step(Step::Expect(1, NodeState::Held))
        .step(Step::Expect(3, NodeState::Wanted))
        .step(Step::Release(1))
        .step(Step::DeliverAll)
        .step(Step::Expect(3, NodeState::Held))
        .oracle(Box::new(|world| {
            if world.held_nodes() != vec![3] {
                return Err(format!("expected only node 3 HELD, got {:?}", world.held_nodes()));
            }
            Ok(())
        }))
        .run()
        .expect("scenario should succeed");
}

#[test]
fn holder_defers_until_release() {
    Scenario::new("defer while held")
        .node(1)
        .node(2)
        .step(Step::Acquire(1))
        .step(Step::DeliverAll)
        .step(Step::Acquire(2))
        .step(Step::DeliverAll)
        .step(Step::Advance(Duration::from_secs(5)))
        .step(Step::Expect(1, NodeState::Held))
        .step(Step::Expect(2, NodeState::Wanted))
        .step(Step::Release(1))
        .step(Step::DeliverAll)
        .oracle(Box::new(|world| match world.state(2) {
            Some(NodeState::Held) => Ok(()),
            other => Err(format!("node 2 is {other:?}")),
        }))
        .run()
        .expect("scenario should succeed");
}

#[test]
fn contention_under_reordering_serves_everyone_once() {
    for seed in 0..32 {
        let mut world = World::new(seed);
        for id in 1..=4 {
            world.add_node(id);
        }
        world.connect_all();

        for id in 1..=4 {
            world.acquire(id).unwrap();
        }

        let mut served = Vec::new();
        for _ in 0..4 {
            world.deliver_all_shuffled();
            let held = world.held_nodes();
            assert_eq!(held.len(), 1, "seed {seed}: held {held:?}");
            served.push(held[0]);
            world.release(held[0]).unwrap();
        }
        world.deliver_all_shuffled();

        served.sort_unstable();
        assert_eq!(served, vec![1, 2, 3, 4], "seed {seed}");
        assert_eq!(world.max_held_observed(), 1, "seed {seed}");
        assert!(world.held_nodes().is_empty());
    }
}

#[test]
fn joins_converge_under_reordering() {
    for seed in 0..16 {
        let mut world = World::new(seed);
        for id in 1..=5 {
            world.add_node(id);
        }
        // Everyone knows only node 1, or the node before it.
        for id in 2..=5 {
            let seed_node = if id % 2 == 0 { 1 } else { id - 1 };
            world.join(id, &[seed_node]);
        }
        world.deliver_all_shuffled();

        assert!(world.membership_converged(), "seed {seed}");
    }
}

#[test]
fn late_joiner_is_asked_by_waiting_node() {
    let mut world = World::new(11);
    world.add_node(1);
    world.add_node(2);
    world.connect_all();

    world.acquire(2).unwrap();
    world.deliver_all();
    world.acquire(1).unwrap();
    world.deliver_all();
    assert_eq!(world.state(1), Some(NodeState::Wanted));

    world.add_node(3);
    world.join(3, &[2]);
    world.deliver_all();
    assert!(world.membership_converged());

    // Node 3 granted node 1's request when it learned about it.
    let waiting = world.coordinator(1).unwrap();
    assert!(waiting.members().get(3).unwrap().granted);
    assert_eq!(world.state(1), Some(NodeState::Wanted));

    world.release(2).unwrap();
    world.deliver_all();
    assert_eq!(world.held_nodes(), vec![1]);
}

#[test]
fn repeated_joins_do_not_duplicate_members() {
    let mut world = World::new(5);
    for id in 1..=3 {
        world.add_node(id);
    }
    world.connect_all();
    world.join(3, &[1, 2]);
    world.join(2, &[1]);
    world.deliver_all();

    for id in 1..=3 {
        assert_eq!(world.coordinator(id).unwrap().members().len(), 2);
    }
}
