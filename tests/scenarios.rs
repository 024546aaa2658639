//! Crate-level integration tests exercising sequences that cross module boundaries: a world's
//! entity lifecycle observed through its location table, a resource manager's refcount and
//! frame-delayed destruction, a service locator driving a fixed-step physics coupling through a
//! real scheduled system, and the registration-order guarantee for per-frame service updates.

use std::sync::Arc;

use novaforge_core::prelude::*;
use novaforge_core::physics::{
    ApplyCreatedBodyEventsSystem, Body, DrainCreateIntentsSystem, PhysicsEvent, ShapeDesc, ShapeKind,
    SENTINEL_BODY_ID,
};

#[derive(Debug, Clone, Copy)]
struct Transform3(f32, f32, f32);

#[derive(Debug, Clone, Copy)]
struct BodyRef(u32);

#[test]
fn entity_lifecycle_swap_pop_updates_location_table() {
    let world = World::new(EngineConfig::default());

    let a = world.spawn((Transform3(0.0, 0.0, 0.0), BodyRef(1)));
    let b = world.spawn((Transform3(1.0, 0.0, 0.0), BodyRef(2)));
    let c = world.spawn((Transform3(2.0, 0.0, 0.0), BodyRef(3)));

    assert_eq!(world.entity_count(), 3);
    assert_eq!(world.archetype_count(), 1);

    world.despawn(b).unwrap();

    assert_eq!(world.entity_count(), 2);
    assert!(world.is_alive(a));
    assert!(!world.is_alive(b));
    assert!(world.is_alive(c));

    // c was the last row and should have been moved into b's vacated slot.
    let c_location = world.get_entity_location(c).unwrap();
    assert_eq!(c_location.row, 1);
}

#[test]
fn resource_add_share_release_and_deferred_destroy_across_frames() {
    struct Texture;
    struct TextureFactory;
    impl ResourceFactory for TextureFactory {
        type Desc = String;
        type Key = String;
        type Data = Texture;

        fn key_for(desc: &Self::Desc) -> Self::Key {
            desc.clone()
        }

        fn create(&self, desc: &Self::Desc) -> Result<Self::Data> {
            let _ = desc;
            Ok(Texture)
        }

        fn destroy(&self, _data: Self::Data) {}
    }

    let manager = ResourceManager::new(TextureFactory);

    let (h1, created1) = manager.add("brick.png".to_string()).unwrap();
    assert!(created1);
    let (h2, created2) = manager.add("brick.png".to_string()).unwrap();
    assert!(!created2);
    assert_eq!(h1, h2);

    manager.release(h1, 10);
    manager.release(h1, 12);

    manager.process_deferred_deletes(10);
    assert!(manager.is_valid(h1));

    manager.process_deferred_deletes(12);
    assert!(!manager.is_valid(h1));
}

#[test]
fn physics_create_intent_round_trips_through_a_scheduled_system_pair() {
    let world = World::new(EngineConfig::default());
    let coupling = Arc::new(PhysicsCoupling::new(1.0 / 60.0, 1));
    let services = ServiceLocator::new();

    let entity = world.spawn((Transform3(0.0, 0.0, 0.0),));
    world.insert_sparse(entity, Body { body_id: SENTINEL_BODY_ID });
    coupling.enqueue_create_intent(novaforge_core::physics::CreateIntent {
        entity,
        shape: ShapeDesc { kind: ShapeKind::Sphere, half_extents: Default::default() },
        owner_chunk_key: 0,
    });

    // Frame F: drain the intent, which issues a CreateBody command on the physics ring.
    let mut schedule =
        Schedule::new().with_system(Box::new(DrainCreateIntentsSystem::new(coupling.clone())));
    let executor_ctx = SystemContext { world: &world, services: &services, delta_time: 1.0 / 60.0 };
    schedule.get_system_mut("DrainCreateIntentsSystem").unwrap().update(&executor_ctx).unwrap();

    let command = coupling.pop_command();
    assert!(matches!(
        command,
        Some(novaforge_core::physics::PhysicsCommand::CreateBody { entity: e, .. }) if e == entity
    ));

    // The physics backend applies the command and reports back a real body id.
    coupling.push_event(PhysicsEvent::CreatedBody { entity, body_id: 42 });

    // Frame F+1: the writeback system sees the sentinel and stores the real id.
    let mut writeback_schedule =
        Schedule::new().with_system(Box::new(ApplyCreatedBodyEventsSystem::new(coupling.clone())));
    writeback_schedule.get_system_mut("ApplyCreatedBodyEventsSystem").unwrap().update(&executor_ctx).unwrap();

    let body = world.with_sparse::<Body, _>(entity, |b| b.copied()).unwrap();
    assert_eq!(body.body_id, 42);

    // Frame F+2: a stale duplicate CreatedBody event for the same entity must not overwrite it.
    coupling.push_event(PhysicsEvent::CreatedBody { entity, body_id: 99 });
    writeback_schedule.get_system_mut("ApplyCreatedBodyEventsSystem").unwrap().update(&executor_ctx).unwrap();
    let body_after = world.with_sparse::<Body, _>(entity, |b| b.copied()).unwrap();
    assert_eq!(body_after.body_id, 42);
}

#[test]
fn service_update_order_is_registration_order_with_pre_update_before_any_update() {
    let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let locator = ServiceLocator::new();

    struct Input(Arc<parking_lot::Mutex<Vec<&'static str>>>);
    struct Physics(Arc<parking_lot::Mutex<Vec<&'static str>>>);
    struct Audio(Arc<parking_lot::Mutex<Vec<&'static str>>>);
    struct Camera(Arc<parking_lot::Mutex<Vec<&'static str>>>);
    impl UpdateService for Input {
        fn update(&self, _dt: f64) {
            self.0.lock().push("input");
        }
    }
    impl UpdateService for Physics {
        fn update(&self, _dt: f64) {
            self.0.lock().push("physics");
        }
    }
    impl UpdateService for Audio {
        fn update(&self, _dt: f64) {
            self.0.lock().push("audio");
        }
    }
    impl UpdateService for Camera {
        fn update(&self, _dt: f64) {
            self.0.lock().push("camera");
        }
    }

    locator.register_updatable(Input(log.clone())).unwrap();
    locator.register_updatable(Physics(log.clone())).unwrap();
    locator.register_updatable(Audio(log.clone())).unwrap();
    locator.register_updatable(Camera(log.clone())).unwrap();

    locator.update_all(1.0 / 60.0);

    assert_eq!(*log.lock(), vec!["input", "physics", "audio", "camera"]);
}
