use std::cell::RefCell;
use std::rc::Rc;

use servpool::{
    ConstantDuration, DetailedPool, EventQueue, PoolConfig, PoolKey, PoolListener, Resource, ResourceId,
    ResourceListener, ResourceRole, Scheduler, ServicePool, ServiceTimer, TimerProgress, WorkUnit,
};

#[derive(Debug, Clone)]
struct Chat {
    category: usize,
    talk: f64,
    wrap: f64,
}

impl Chat {
    fn new(talk: f64, wrap: f64) -> Self {
        Self { category: 0, talk, wrap }
    }
}

impl WorkUnit for Chat {
    fn category(&self) -> usize {
        self.category
    }

    fn default_contact_time(&self, _pool: PoolKey) -> Option<f64> {
        Some(self.talk)
    }

    fn default_after_contact_time(&self, _pool: PoolKey) -> Option<f64> {
        Some(self.wrap)
    }
}

fn pool(capacity: usize) -> DetailedPool<Chat> {
    DetailedPool::new(PoolKey(3), &PoolConfig::named("chat", capacity)).unwrap()
}

fn advance(q: &mut EventQueue, p: &mut DetailedPool<Chat>, until: f64) {
    q.run_until(until, |q, wakeup| {
        p.handle(q, wakeup).unwrap();
    });
}

fn role(p: &DetailedPool<Chat>, id: ResourceId) -> ResourceRole {
    p.resource(id).map(Resource::role).unwrap()
}

fn assert_balanced(p: &DetailedPool<Chat>) {
    assert_eq!(p.capacity() + p.ghost(), p.busy() + p.idle());
    assert_eq!(p.idle(), p.idle_resources().len());
    assert_eq!(p.busy(), p.busy_resources().len());
    assert!(p.free() <= p.capacity());
}

#[derive(Default)]
struct Changes(RefCell<usize>);

impl PoolListener<Chat> for Changes {
    fn pool_changed(&self, _pool: &mut dyn ServicePool<Chat>, _sched: &mut dyn Scheduler) {
        *self.0.borrow_mut() += 1;
    }
}

#[test]
fn ghosts_finish_their_work_and_leave() {
    let mut q = EventQueue::new();
    let mut p = pool(2);
    let changes = Rc::new(Changes::default());
    p.add_listener(changes.clone()).unwrap();

    p.serve(&mut q, Chat::new(5.0, 0.0)).unwrap();
    p.serve(&mut q, Chat::new(8.0, 0.0)).unwrap();
    p.set_capacity(&mut q, 0).unwrap();
    assert_eq!(*changes.0.borrow(), 1);
    assert_eq!(p.capacity(), 0);
    assert_eq!(p.ghost(), 2);
    assert_eq!(p.ghost_resources(), &[ResourceId(0), ResourceId(1)]);
    assert_eq!(role(&p, ResourceId(0)), ResourceRole::Ghost);
    assert_balanced(&p);

    advance(&mut q, &mut p, 5.0);
    assert_eq!(p.ghost(), 1);
    assert_eq!(role(&p, ResourceId(0)), ResourceRole::Unattached);
    assert!(p.idle_resources().is_empty());
    assert_balanced(&p);

    advance(&mut q, &mut p, 8.0);
    assert_eq!(p.ghost(), 0);
    assert_eq!(p.busy(), 0);
    assert_eq!((p.capacity(), p.free()), (0, 0));
    assert_balanced(&p);
}

#[test]
fn finished_ghost_reports_was_ghost() {
    let mut q = EventQueue::new();
    let mut p = pool(1);
    let id = p.serve(&mut q, Chat::new(2.0, 1.0)).unwrap().id();
    p.set_capacity(&mut q, 0).unwrap();

    let mut finished = Vec::new();
    q.run(|q, wakeup| {
        if let Some(TimerProgress::Finished(t)) = p.handle(q, wakeup).unwrap() {
            finished.push(t);
        }
    });
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].id(), id);
    assert!(finished[0].was_ghost());
}

#[test]
fn eviction_removes_the_oldest_admission() {
    let mut q = EventQueue::new();
    let mut p = pool(0);
    let a = p.new_resource();
    let b = p.new_resource();
    let c = p.new_resource();
    p.add_resource(&mut q, a).unwrap();
    advance(&mut q, &mut p, 1.0);
    p.add_resource(&mut q, b).unwrap();
    advance(&mut q, &mut p, 2.0);
    p.add_resource(&mut q, c).unwrap();
    assert_eq!(p.resource(b).and_then(Resource::first_assigned_at), Some(1.0));

    p.set_capacity(&mut q, 2).unwrap();
    assert_eq!(p.idle_resources(), &[b, c]);
    assert_eq!(role(&p, a), ResourceRole::Unattached);
}

#[test]
fn eviction_prefers_idle_then_oldest_busy() {
    let mut q = EventQueue::new();
    let mut p = pool(3);
    p.serve_with(&mut q, Chat::new(10.0, 0.0), ResourceId(0)).unwrap();

    // r1 and r2 tie on admission time; collection order decides.
    p.set_capacity(&mut q, 2).unwrap();
    assert_eq!(p.idle_resources(), &[ResourceId(2)]);

    p.set_capacity(&mut q, 0).unwrap();
    assert!(p.idle_resources().is_empty());
    assert_eq!(p.ghost_resources(), &[ResourceId(0)]);
    assert_balanced(&p);
}

#[test]
fn readmitted_resource_keeps_first_admission() {
    let mut q = EventQueue::new();
    let mut p = pool(1);
    let r = ResourceId(0);
    advance(&mut q, &mut p, 4.0);
    assert!(p.remove_resource(&mut q, r).unwrap());
    assert!(p.add_resource(&mut q, r).unwrap());
    let resource = p.resource(r).unwrap();
    assert_eq!(resource.first_assigned_at(), Some(0.0));
    assert_eq!(resource.last_assigned_at(), Some(4.0));
    assert_eq!(resource.idle_since(), 4.0);
}

#[test]
fn selection_prefers_longest_idle() {
    let mut q = EventQueue::new();
    let mut p = pool(2);
    p.serve(&mut q, Chat::new(1.0, 0.0)).unwrap();
    p.serve(&mut q, Chat::new(3.0, 0.0)).unwrap();
    advance(&mut q, &mut p, 10.0);

    let (a, b) = (ResourceId(0), ResourceId(1));
    assert_eq!(p.resource(a).map(Resource::idle_since), Some(1.0));
    assert_eq!(p.resource(b).map(Resource::idle_since), Some(3.0));
    assert_eq!(p.select_server(), Some(a));

    p.set_available(&mut q, a, false).unwrap();
    assert_eq!(p.select_server(), Some(b));
    assert_eq!(p.free(), 1);
    p.set_available(&mut q, b, false).unwrap();
    assert_eq!(p.select_server(), None);
    assert!(p.serve(&mut q, Chat::new(1.0, 0.0)).unwrap_err().is_state());
}

#[test]
fn unavailable_resource_returns_idle_but_not_free() {
    let mut q = EventQueue::new();
    let mut p = pool(1);
    let r = ResourceId(0);
    p.serve(&mut q, Chat::new(2.0, 0.0)).unwrap();
    p.set_available(&mut q, r, false).unwrap();
    assert_eq!(p.free(), 0);

    advance(&mut q, &mut p, 5.0);
    assert_eq!(role(&p, r), ResourceRole::Idle);
    assert_eq!(p.free(), 0);
    p.set_available(&mut q, r, true).unwrap();
    assert_eq!(p.free(), 1);
}

#[test]
fn increasing_capacity_reactivates_ghosts_first() {
    let mut q = EventQueue::new();
    let mut p = pool(2);
    p.serve(&mut q, Chat::new(5.0, 0.0)).unwrap();
    p.serve(&mut q, Chat::new(5.0, 0.0)).unwrap();
    p.set_capacity(&mut q, 0).unwrap();

    p.set_capacity(&mut q, 1).unwrap();
    assert_eq!(p.ghost_resources(), &[ResourceId(1)]);
    assert_eq!(role(&p, ResourceId(0)), ResourceRole::Busy);
    assert_eq!(p.resources().count(), 2);
    assert_balanced(&p);

    advance(&mut q, &mut p, 5.0);
    assert_eq!(p.idle_resources(), &[ResourceId(0)]);
    assert_eq!(role(&p, ResourceId(1)), ResourceRole::Unattached);
    assert_eq!((p.capacity(), p.free(), p.ghost()), (1, 1, 0));

    // The departed ghost is detached, so growing again re-admits it.
    p.set_capacity(&mut q, 2).unwrap();
    assert_eq!(p.resources().count(), 2);
    assert_eq!(p.idle_resources(), &[ResourceId(0), ResourceId(1)]);
    assert_eq!(p.resource(ResourceId(1)).and_then(Resource::first_assigned_at), Some(0.0));
    assert_eq!(p.resource(ResourceId(1)).and_then(Resource::last_assigned_at), Some(5.0));

    p.set_capacity(&mut q, 3).unwrap();
    assert_eq!(p.resources().count(), 3);
}

#[test]
fn replications_reuse_detached_resources() {
    let mut q = EventQueue::new();
    let mut p = pool(3);
    for _ in 0..100 {
        p.set_capacity(&mut q, 1).unwrap();
        p.init(&mut q).unwrap();
    }
    assert_eq!(p.capacity(), 3);
    assert_eq!(p.resources().count(), 3);
    assert_balanced(&p);
}

#[test]
fn growth_readmits_detached_resources_in_handle_order() {
    let mut q = EventQueue::new();
    let mut p = pool(3);
    p.remove_resource(&mut q, ResourceId(2)).unwrap();
    p.remove_resource(&mut q, ResourceId(0)).unwrap();

    p.set_capacity(&mut q, 2).unwrap();
    assert_eq!(p.idle_resources(), &[ResourceId(1), ResourceId(0)]);
    p.set_capacity(&mut q, 4).unwrap();
    assert_eq!(p.idle_resources(), &[ResourceId(1), ResourceId(0), ResourceId(2), ResourceId(3)]);
}

#[test]
fn per_category_override_applies_only_to_its_category() {
    let mut q = EventQueue::new();
    let mut p = pool(2);
    let r = ResourceId(1);
    p.resource_mut(r)
        .unwrap()
        .set_contact_time_override(1, Some(Box::new(ConstantDuration::new(0.5).unwrap())));

    let email = Chat {
        category: 1,
        talk: 6.0,
        wrap: 0.0,
    };
    let fast = p.serve_with(&mut q, email, r).unwrap().id();
    assert_eq!(p.timer(fast).map(|t| t.record().scheduled_contact.duration), Some(0.5));
    assert_eq!(p.busy_for(1), 1);

    advance(&mut q, &mut p, 1.0);
    let normal = p.serve_with(&mut q, Chat::new(6.0, 0.0), r).unwrap().id();
    assert_eq!(p.timer(normal).map(|t| t.record().scheduled_contact.duration), Some(6.0));
}

#[derive(Default)]
struct Trace(RefCell<Vec<String>>);

impl ResourceListener<Chat> for Trace {
    fn resource_changed(&self, resource: &Resource<Chat>) {
        self.0.borrow_mut().push(format!("changed:{:?}", resource.role()));
    }

    fn begin_service(&self, resource: &Resource<Chat>, _timer: &ServiceTimer<Chat>) {
        self.0.borrow_mut().push(format!("begin:{:?}", resource.role()));
    }

    fn end_contact(&self, _resource: &Resource<Chat>, _timer: &ServiceTimer<Chat>) {
        self.0.borrow_mut().push("end_contact".to_string());
    }

    fn end_service(&self, resource: &Resource<Chat>, timer: &ServiceTimer<Chat>) {
        self.0.borrow_mut().push(format!("end_service:{:?}:{}", resource.role(), timer.was_ghost()));
    }

    fn init(&self, _resource: &Resource<Chat>) {
        self.0.borrow_mut().push("init".to_string());
    }
}

#[test]
fn resource_listeners_follow_the_service() {
    let mut q = EventQueue::new();
    let mut p = pool(1);
    let r = ResourceId(0);
    let trace = Rc::new(Trace::default());
    p.add_resource_listener(r, trace.clone()).unwrap();

    p.serve(&mut q, Chat::new(1.0, 1.0)).unwrap();
    advance(&mut q, &mut p, 5.0);
    p.set_available(&mut q, r, false).unwrap();
    p.init(&mut q).unwrap();

    assert_eq!(
        trace.0.borrow().as_slice(),
        [
            "begin:Busy",
            "end_contact",
            "end_service:Idle:false",
            "changed:Idle",
            "init",
        ]
    );
}

#[test]
fn identifier_is_write_once() {
    let mut p = pool(1);
    let resource = p.resource_mut(ResourceId(0)).unwrap();
    resource.set_id(42).unwrap();
    assert!(resource.set_id(43).unwrap_err().is_state());
    assert_eq!(p.resource(ResourceId(0)).and_then(Resource::id), Some(42));
}

#[test]
fn init_returns_busy_resources_to_idle() {
    let mut q = EventQueue::starting_at(2.0);
    let mut p = pool(3);
    p.serve(&mut q, Chat::new(5.0, 5.0)).unwrap();
    p.serve(&mut q, Chat::new(5.0, 5.0)).unwrap();
    p.init(&mut q).unwrap();

    assert_eq!((p.capacity(), p.free(), p.busy(), p.ghost()), (3, 3, 0, 0));
    assert_eq!(p.idle_resources(), &[ResourceId(2), ResourceId(0), ResourceId(1)]);
    assert!(p.resources().all(|r| r.idle_since() == 2.0 && !r.is_busy()));
    assert_balanced(&p);
}

#[test]
fn availability_of_detached_resource_is_not_a_pool_change() {
    let mut q = EventQueue::new();
    let mut p = pool(2);
    let r = ResourceId(1);
    p.remove_resource(&mut q, r).unwrap();

    let changes = Rc::new(Changes::default());
    let trace = Rc::new(Trace::default());
    p.add_listener(changes.clone()).unwrap();
    p.add_resource_listener(r, trace.clone()).unwrap();

    p.set_available(&mut q, r, false).unwrap();
    assert_eq!(*changes.0.borrow(), 0);
    assert_eq!(trace.0.borrow().as_slice(), ["changed:Unattached"]);
    assert_eq!((p.capacity(), p.free()), (1, 1));

    p.add_resource(&mut q, r).unwrap();
    assert_eq!(*changes.0.borrow(), 1);
    assert_eq!(p.free(), 1);
    p.set_available(&mut q, r, true).unwrap();
    assert_eq!(*changes.0.borrow(), 2);
    assert_eq!(p.free(), 2);
}
