use super::*;
use crate::error::{Result, SupervisorError};
use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::io;
use std::rc::Rc;

/// Hands out increasing fake pids and remembers the slots it was asked for
#[derive(Clone, Default)]
struct FakeLauncher {
    launched: Rc<RefCell<Vec<u32>>>,
    next_pid: Rc<RefCell<u32>>,
    failing: Rc<RefCell<bool>>,
    exited: Rc<RefCell<Vec<u32>>>,
}

impl WorkerLauncher for FakeLauncher {
    fn launch(&mut self, slot: u32) -> Result<u32> {
        if *self.failing.borrow() {
            return Err(SupervisorError::Spawn {
                program: "fake".into(),
                source: io::Error::new(io::ErrorKind::Other, "no more processes"),
            });
        }
        self.launched.borrow_mut().push(slot);
        let mut next_pid = self.next_pid.borrow_mut();
        *next_pid += 1;
        Ok(1000 + *next_pid)
    }

    fn reap(&mut self) -> Vec<u32> {
        self.exited.borrow_mut().drain(..).collect()
    }
}

#[derive(Clone, Default)]
struct FakeChecker {
    dead: Rc<RefCell<HashSet<u32>>>,
}

impl ProcessChecker for FakeChecker {
    fn is_alive(&self, pid: u32) -> bool {
        !self.dead.borrow().contains(&pid)
    }
}

fn config(max_workers: u32, initial_worker_burst: u32) -> Config {
    Config {
        listener_poll_interval: Duration::from_secs(3),
        worker_spawn_stagger: Duration::from_secs(10),
        max_workers,
        initial_worker_burst,
        ..Config::default()
    }
}

/// Probe answers are taken from the front of the queue; an empty queue means "no work"
fn scripted(answers: &Rc<RefCell<VecDeque<bool>>>) -> Box<dyn Listener> {
    let answers = answers.clone();
    Box::new(move || answers.borrow_mut().pop_front().unwrap_or(false))
}

fn dispatcher(
    cfg: &Config,
    answers: &Rc<RefCell<VecDeque<bool>>>,
) -> (Dispatcher<FakeLauncher, FakeChecker>, FakeLauncher, FakeChecker) {
    let launcher = FakeLauncher::default();
    let checker = FakeChecker::default();
    let d = Dispatcher::new(cfg, scripted(answers), launcher.clone(), checker.clone());
    (d, launcher, checker)
}

fn answers(seq: &[bool]) -> Rc<RefCell<VecDeque<bool>>> {
    Rc::new(RefCell::new(seq.iter().copied().collect()))
}

#[test]
fn initial_burst_spawns_exactly_burst_workers() {
    let probe = answers(&[true]);
    let (mut d, launcher, _) = dispatcher(&config(5, 3), &probe);

    let pause = d.tick();

    assert_eq!(d.state(), State::Dispatching);
    assert_eq!(d.pool().len(), 3);
    assert_eq!(*launcher.launched.borrow(), vec![1, 2, 3]);
    assert_eq!(pause, Duration::from_secs(10));
    assert_eq!(d.session().map(|s| s.worker_count), Some(3));
}

#[test]
fn burst_of_one_spawns_a_single_worker() {
    let probe = answers(&[true]);
    let (mut d, launcher, _) = dispatcher(&config(5, 1), &probe);
    d.tick();
    assert_eq!(*launcher.launched.borrow(), vec![1]);
}

#[test]
fn pool_grows_one_worker_per_tick_up_to_max() {
    let probe = answers(&[true; 8]);
    let (mut d, launcher, _) = dispatcher(&config(3, 1), &probe);

    let mut sizes = Vec::new();
    for _ in 0..8 {
        d.tick();
        sizes.push(d.pool().len());
    }

    assert_eq!(sizes, vec![1, 2, 3, 3, 3, 3, 3, 3]);
    assert_eq!(*launcher.launched.borrow(), vec![1, 2, 3]);
}

#[test]
fn pool_never_exceeds_max_workers() {
    // deterministic pseudo random probe sequences
    for seed in 1u64..50 {
        let mut state = seed;
        let seq: Vec<bool> = (0..60)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (state >> 33) % 4 != 0
            })
            .collect();
        let max_workers = (seed % 4 + 1) as u32;
        let burst = (seed % 6 + 1) as u32;
        let probe = answers(&seq);
        let (mut d, _, checker) = dispatcher(&config(max_workers, burst), &probe);

        for step in 0..seq.len() {
            // kill a worker now and then to exercise respawns
            if step % 7 == 0 {
                if let Some(slot) = d.pool().slots().next() {
                    checker.dead.borrow_mut().insert(slot.pid);
                }
            }
            d.tick();
            assert!(d.pool().len() <= max_workers as usize, "seed {seed} step {step}");
        }
    }
}

#[test]
fn no_work_after_dispatching_clears_pool_and_goes_idle() {
    let probe = answers(&[true, true, false]);
    let (mut d, _, _) = dispatcher(&config(5, 2), &probe);

    d.tick();
    d.tick();
    assert_eq!(d.pool().len(), 3);

    let pause = d.tick();
    assert_eq!(d.state(), State::Idle);
    assert!(d.pool().is_empty());
    assert!(d.session().is_none());
    assert_eq!(pause, Duration::from_secs(3));
}

#[test]
fn idle_without_work_does_nothing() {
    let probe = answers(&[false, false]);
    let (mut d, launcher, _) = dispatcher(&config(5, 3), &probe);

    assert_eq!(d.tick(), Duration::from_secs(3));
    assert_eq!(d.tick(), Duration::from_secs(3));
    assert_eq!(d.state(), State::Idle);
    assert!(launcher.launched.borrow().is_empty());
}

#[test]
fn new_session_restarts_slot_numbering() {
    let probe = answers(&[true, true, false, true]);
    let (mut d, launcher, _) = dispatcher(&config(5, 1), &probe);
    for _ in 0..4 {
        d.tick();
    }
    assert_eq!(*launcher.launched.borrow(), vec![1, 2, 1]);
    assert_eq!(d.pool().len(), 1);
}

#[test]
fn reaped_worker_counts_as_dead_even_if_its_pid_was_reused() {
    let probe = answers(&[true; 3]);
    let (mut d, launcher, _checker) = dispatcher(&config(2, 2), &probe);

    d.tick();
    let before: Vec<WorkerSlot> = d.pool().slots().collect();
    assert_eq!(before.len(), 2);

    // the checker keeps reporting the pid as alive, as it would after reuse
    launcher.exited.borrow_mut().push(before[0].pid);
    d.tick();

    let after: Vec<WorkerSlot> = d.pool().slots().collect();
    assert_eq!(after[0].id, before[0].id);
    assert_ne!(after[0].pid, before[0].pid);
    assert_eq!(after[1], before[1]);

    // the replacement is not mistaken for the reaped worker
    d.tick();
    assert_eq!(d.pool().slots().collect::<Vec<_>>(), after);
}

#[test]
fn dead_worker_is_respawned_into_the_same_slot() {
    let probe = answers(&[true; 4]);
    let (mut d, launcher, checker) = dispatcher(&config(3, 3), &probe);

    d.tick();
    assert!(d.pool().is_saturated());
    let before: Vec<WorkerSlot> = d.pool().slots().collect();

    let victim = before[1];
    checker.dead.borrow_mut().insert(victim.pid);
    d.tick();

    assert_eq!(launcher.launched.borrow().last(), Some(&victim.id));
    let after: Vec<WorkerSlot> = d.pool().slots().collect();
    assert_eq!(after.len(), 3);
    assert_eq!(after[0], before[0]);
    assert_eq!(after[2], before[2]);
    assert_eq!(after[1].id, victim.id);
    assert_ne!(after[1].pid, victim.pid);

    // healthy pool: nothing else happens
    let launches = launcher.launched.borrow().len();
    d.tick();
    assert_eq!(launcher.launched.borrow().len(), launches);
}

#[test]
fn health_check_only_runs_on_a_saturated_pool() {
    let probe = answers(&[true; 3]);
    let (mut d, launcher, checker) = dispatcher(&config(3, 1), &probe);

    d.tick();
    let first = d.pool().get(1).unwrap();
    checker.dead.borrow_mut().insert(first.pid);

    // the pool still has room, so it grows instead of respawning
    d.tick();
    assert_eq!(*launcher.launched.borrow(), vec![1, 2]);
    assert_eq!(d.pool().get(1), Some(first));

    d.tick();
    assert_eq!(*launcher.launched.borrow(), vec![1, 2, 3]);
}

#[test]
fn disabled_health_check_leaves_dead_workers_alone() {
    let probe = answers(&[true; 3]);
    let mut cfg = config(2, 2);
    cfg.health_check_enabled = false;
    let (mut d, launcher, checker) = dispatcher(&cfg, &probe);

    d.tick();
    for slot in d.pool().slots() {
        checker.dead.borrow_mut().insert(slot.pid);
    }
    d.tick();
    d.tick();
    assert_eq!(*launcher.launched.borrow(), vec![1, 2]);
}

#[test]
fn failed_spawn_is_not_tracked_and_retried() {
    let probe = answers(&[true, true]);
    let (mut d, launcher, _) = dispatcher(&config(3, 1), &probe);

    *launcher.failing.borrow_mut() = true;
    d.tick();
    assert_eq!(d.state(), State::Dispatching);
    assert!(d.pool().is_empty());

    *launcher.failing.borrow_mut() = false;
    d.tick();
    assert_eq!(*launcher.launched.borrow(), vec![1]);
}
