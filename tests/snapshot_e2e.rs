use serde::{Deserialize, Serialize};

use servpool::{
    AnyPool, AnySnapshot, DetailedPool, EventQueue, Pool, PoolConfig, PoolError, PoolKey, ResourceId,
    ResourceRole, Scheduler, ServicePool, ServiceRecord, StateError, TimerProgress, WorkUnit,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Call {
    talk: f64,
    wrap: f64,
    begins: u32,
}

impl Call {
    fn new(talk: f64, wrap: f64) -> Self {
        Self { talk, wrap, begins: 0 }
    }
}

impl WorkUnit for Call {
    fn category(&self) -> usize {
        0
    }

    fn default_contact_time(&self, _pool: PoolKey) -> Option<f64> {
        Some(self.talk)
    }

    fn default_after_contact_time(&self, _pool: PoolKey) -> Option<f64> {
        Some(self.wrap)
    }

    fn begin_service(&mut self, _pool: PoolKey, _record: &ServiceRecord) {
        self.begins += 1;
    }
}

fn retaining(name: &str, capacity: usize) -> PoolConfig {
    PoolConfig::named(name, capacity).retaining_timers()
}

/// Completion times of every service still in flight in `pool`.
fn completion_times(queue: &mut EventQueue, pool: &mut dyn ServicePool<Call>) -> Vec<(f64, Call)> {
    let mut done = Vec::new();
    queue.run(|q, wakeup| {
        if let Some(TimerProgress::Finished(timer)) = pool.handle(q, wakeup).unwrap() {
            done.push((q.now(), timer.into_unit()));
        }
    });
    done
}

fn loaded_pool(queue: &mut EventQueue) -> Pool<Call> {
    let mut pool = Pool::new(PoolKey(0), &retaining("voice", 3)).unwrap();
    pool.serve(queue, Call::new(10.0, 4.0)).unwrap();
    pool.serve(queue, Call::new(2.0, 6.0)).unwrap();
    queue.run_until(5.0, |q, wakeup| {
        pool.handle(q, wakeup).unwrap();
    });
    pool
}

#[test]
fn aggregate_restore_reproduces_counters_and_fire_times() {
    let mut q = EventQueue::new();
    let mut original = loaded_pool(&mut q);
    let snapshot = original.snapshot(&q).unwrap();
    assert_eq!(snapshot.sim_time, 5.0);
    assert_eq!(snapshot.busy(), 2);

    let mut q2 = EventQueue::starting_at(5.0);
    let mut restored = Pool::new(PoolKey(4), &retaining("replica", 1)).unwrap();
    restored.restore(&mut q2, &snapshot).unwrap();
    assert_eq!(
        (restored.capacity(), restored.free(), restored.busy(), restored.ghost(), restored.idle()),
        (original.capacity(), original.free(), original.busy(), original.ghost(), original.idle())
    );
    assert_eq!(restored.in_flight().unwrap().len(), 2);

    let expected = completion_times(&mut q, &mut original);
    let actual = completion_times(&mut q2, &mut restored);
    let times = |v: &[(f64, Call)]| v.iter().map(|(t, _)| *t).collect::<Vec<_>>();
    assert_eq!(times(&expected), [8.0, 14.0]);
    assert_eq!(times(&actual), times(&expected));

    // The begin-service side effect ran once more on each restored copy.
    assert!(expected.iter().all(|(_, c)| c.begins == 1));
    assert!(actual.iter().all(|(_, c)| c.begins == 2));
    assert_eq!(restored.free(), 3);
}

#[test]
fn snapshot_is_independent_of_the_source() {
    let mut q = EventQueue::new();
    let mut original = loaded_pool(&mut q);
    let snapshot = original.snapshot(&q).unwrap();

    original.init(&mut q).unwrap();
    assert_eq!(original.busy(), 0);
    assert_eq!(snapshot.timers.len(), 2);
    assert!(snapshot.timers.iter().all(|t| t.pool().is_none() && t.event().is_none()));
}

#[test]
fn capture_requires_retention() {
    let q = EventQueue::new();
    let pool: Pool<Call> = Pool::new(PoolKey(0), &PoolConfig::named("voice", 1)).unwrap();
    let err = pool.snapshot(&q).unwrap_err();
    assert!(matches!(err, PoolError::State(StateError::RetentionDisabled { .. })));

    let detailed: DetailedPool<Call> = DetailedPool::new(PoolKey(1), &PoolConfig::named("chat", 1)).unwrap();
    assert!(detailed.snapshot(&q).unwrap_err().is_state());
}

#[test]
fn restoring_the_wrong_kind_is_illegal() {
    let mut q = EventQueue::new();
    let aggregate: AnyPool<Call> = Pool::new(PoolKey(0), &retaining("voice", 2)).unwrap().into();
    let mut detailed: AnyPool<Call> = DetailedPool::new(PoolKey(1), &retaining("chat", 2)).unwrap().into();

    let snapshot = aggregate.snapshot(&q).unwrap();
    assert_eq!(snapshot.kind(), "aggregate");
    let err = detailed.restore(&mut q, &snapshot).unwrap_err();
    assert!(matches!(
        err,
        PoolError::State(StateError::SnapshotMismatch {
            expected: "detailed",
            actual: "aggregate"
        })
    ));
    assert_eq!(detailed.capacity(), 2);
}

#[test]
fn inconsistent_snapshot_is_rejected_before_any_change() {
    let mut q = EventQueue::new();
    let original = loaded_pool(&mut q);
    let mut snapshot = original.snapshot(&q).unwrap();
    snapshot.free += 1;

    let mut target = Pool::new(PoolKey(2), &retaining("target", 2)).unwrap();
    target.serve(&mut q, Call::new(50.0, 0.0)).unwrap();
    assert!(target.restore(&mut q, &snapshot).unwrap_err().is_validation());
    assert_eq!(target.busy(), 1);
    assert_eq!(target.generation(), 0);
}

fn loaded_detailed(queue: &mut EventQueue) -> DetailedPool<Call> {
    let mut pool = DetailedPool::new(PoolKey(0), &retaining("chat", 3)).unwrap();
    pool.resource_mut(ResourceId(1)).unwrap().set_id(501).unwrap();
    pool.serve(queue, Call::new(10.0, 4.0)).unwrap();
    pool.serve(queue, Call::new(2.0, 6.0)).unwrap();
    pool.set_available(queue, ResourceId(2), false).unwrap();
    queue.run_until(5.0, |q, wakeup| {
        pool.handle(q, wakeup).unwrap();
    });
    pool
}

/// Attached resources only; detached ones are not part of a capture.
fn roles(pool: &DetailedPool<Call>) -> Vec<(ResourceId, ResourceRole, bool, Option<u32>)> {
    pool.resources()
        .filter(|r| r.role() != ResourceRole::Unattached)
        .map(|r| (r.handle(), r.role(), r.is_available(), r.id()))
        .collect()
}

#[test]
fn detailed_restore_reproduces_resources() {
    let mut q = EventQueue::new();
    let mut original = loaded_detailed(&mut q);
    let snapshot = original.snapshot(&q).unwrap();
    assert_eq!(snapshot.idle.len(), 1);
    assert_eq!(snapshot.busy.len(), 2);

    let mut q2 = EventQueue::starting_at(5.0);
    let mut restored = DetailedPool::new(PoolKey(0), &retaining("replica", 0)).unwrap();
    restored.restore(&mut q2, &snapshot).unwrap();

    assert_eq!(roles(&restored), roles(&original));
    assert_eq!(restored.idle_resources(), original.idle_resources());
    assert_eq!(restored.busy_resources(), original.busy_resources());
    assert_eq!(
        (restored.capacity(), restored.free(), restored.busy(), restored.ghost()),
        (original.capacity(), original.free(), original.busy(), original.ghost())
    );
    for id in restored.busy_resources() {
        let timer = restored.resource(*id).and_then(|r| r.timer()).unwrap();
        assert_eq!(restored.timer(timer).and_then(|t| t.resource()), Some(*id));
    }

    let expected = completion_times(&mut q, &mut original);
    let actual = completion_times(&mut q2, &mut restored);
    let times = |v: &[(f64, Call)]| v.iter().map(|(t, _)| *t).collect::<Vec<_>>();
    assert_eq!(times(&actual), times(&expected));
    assert_eq!(restored.idle_resources(), original.idle_resources());
}

#[test]
fn detailed_restore_keeps_ghosts() {
    let mut q = EventQueue::new();
    let mut original = loaded_detailed(&mut q);
    original.set_capacity(&mut q, 1).unwrap();
    assert_eq!(original.ghost(), 1);
    let snapshot = original.snapshot(&q).unwrap();
    assert_eq!(snapshot.ghosts, original.ghost_resources());

    let mut q2 = EventQueue::starting_at(5.0);
    let mut restored = DetailedPool::new(PoolKey(0), &retaining("replica", 2)).unwrap();
    restored.restore(&mut q2, &snapshot).unwrap();
    assert_eq!(restored.ghost_resources(), original.ghost_resources());
    assert_eq!(roles(&restored), roles(&original));

    completion_times(&mut q, &mut original);
    completion_times(&mut q2, &mut restored);
    assert_eq!(roles(&restored), roles(&original));
    assert_eq!((restored.capacity(), restored.ghost()), (1, 0));
}

#[test]
fn snapshot_survives_json() {
    let mut q = EventQueue::new();
    let original = loaded_pool(&mut q);
    let snapshot = AnySnapshot::Aggregate(original.snapshot(&q).unwrap());

    let json = serde_json::to_string(&snapshot).unwrap();
    let decoded: AnySnapshot<Call> = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded.base().id, snapshot.base().id);

    let mut q2 = EventQueue::starting_at(5.0);
    let mut restored: AnyPool<Call> = Pool::new(PoolKey(0), &retaining("replica", 0)).unwrap().into();
    restored.restore(&mut q2, &decoded).unwrap();
    assert_eq!((restored.capacity(), restored.busy()), (3, 2));
}
