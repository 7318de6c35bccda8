use super::*;
use crate::{
    collision::{BodyType, ShapeDef},
    keys::BodyKey,
    math::Vec2,
    task::SerialScheduler,
};

use rand::{rngs::StdRng, Rng, SeedableRng};

const DT: f64 = 1.0 / 60.0;

fn serial_world(config: WorldConfig) -> World {
    World::with_scheduler(config, Box::new(SerialScheduler)).unwrap()
}

fn dynamic_circle(world: &mut World, x: f64, y: f64, radius: f64) -> BodyKey {
    let body = world.create_body(BodyDef::new_dynamic(Vec2::new(x, y)));
    world.create_shape(body, ShapeDef::circle(radius)).unwrap();
    body
}

fn static_rect(world: &mut World, x: f64, y: f64, width: f64, height: f64) -> BodyKey {
    let body = world.create_body(BodyDef::new_static(Vec2::new(x, y)));
    world.create_shape(body, ShapeDef::rect(width, height)).unwrap();
    body
}

/// Every island as a sorted list of body slots, sorted.
fn island_membership(world: &World) -> Vec<Vec<u32>> {
    let mut islands: Vec<Vec<u32>> = world
        .islands()
        .map(|(key, _)| {
            let mut slots: Vec<u32> = world
                .island_bodies(key)
                .unwrap()
                .iter()
                .map(|b| b.slot())
                .collect();
            slots.sort_unstable();
            slots
        })
        .collect();
    islands.sort();
    islands
}

/// Bodies connected by a touching contact or a joint must share an island.
fn assert_constraints_share_islands(world: &World) {
    let is_dynamic = |b: BodyKey| world.body_type(b).unwrap() == BodyType::Dynamic;
    let check = |a: BodyKey, b: BodyKey| {
        if is_dynamic(a) && is_dynamic(b) {
            assert_eq!(world.body_island(a).unwrap(), world.body_island(b).unwrap());
        }
    };
    for (_, contact) in world.contacts().filter(|(_, c)| c.is_touching()) {
        check(contact.body_a(), contact.body_b());
    }
    for (key, _) in world.bodies() {
        for joint in world.body_joints(key).unwrap() {
            let joint = world.joint(joint).unwrap();
            check(joint.body_a(), joint.body_b());
        }
    }
}

//
// scenarios
//

#[test]
fn static_proxies_do_no_pair_work() {
    let mut world = serial_world(WorldConfig::default());
    static_rect(&mut world, 0.0, 0.0, 1.0, 1.0);
    static_rect(&mut world, 3.0, 0.0, 1.0, 1.0);
    static_rect(&mut world, 6.0, 0.0, 1.0, 1.0);
    assert_eq!(world.broad_phase().move_count(), 0);

    world.update_pairs();
    assert_eq!(world.broad_phase().move_count(), 0);
    assert_eq!(world.contact_count(), 0);
    assert_eq!(world.island_count(), 0);
}

#[test]
fn overlapping_dynamic_circles_get_one_dynamic_color() {
    let mut world = serial_world(WorldConfig::default());
    let a = dynamic_circle(&mut world, 0.0, 0.0, 0.5);
    let b = dynamic_circle(&mut world, 0.8, 0.0, 0.5);

    world.update_pairs();
    assert_eq!(world.contact_count(), 1);
    assert_eq!(world.broad_phase().move_count(), 0);

    world.collide();
    let (contact_key, contact) = world.contacts().next().unwrap();
    assert!(contact.is_touching());
    let color = world.contact_color(contact_key).unwrap();
    assert!(color < DYNAMIC_COLOR_COUNT);
    let body_set = world.constraint_graph().color(color).body_set();
    assert!(body_set.get(a.slot() as usize));
    assert!(body_set.get(b.slot() as usize));

    // touching joins the islands
    assert_eq!(world.island_count(), 1);
    assert_eq!(world.body_island(a).unwrap(), world.body_island(b).unwrap());
    world.validate();
}

#[test]
fn static_contacts_use_distinct_top_colors() {
    let mut world = serial_world(WorldConfig::default());
    let ground = static_rect(&mut world, 0.0, 0.0, 10.0, 1.0);
    let ball = dynamic_circle(&mut world, 0.0, 0.9, 0.5);
    let wall = static_rect(&mut world, 0.6, 0.9, 0.5, 0.5);

    world.step(DT);
    assert_eq!(world.contact_count(), 2);

    let mut colors: Vec<usize> = world
        .contacts()
        .map(|(key, _)| world.contact_color(key).unwrap())
        .collect();
    colors.sort_unstable();
    assert_eq!(colors, vec![OVERFLOW_INDEX - 2, OVERFLOW_INDEX - 1]);

    for color in colors {
        let body_set = world.constraint_graph().color(color).body_set();
        assert!(body_set.get(ball.slot() as usize));
        assert!(!body_set.get(ground.slot() as usize));
        assert!(!body_set.get(wall.slot() as usize));
        assert_eq!(body_set.count_ones(), 1);
    }
    world.validate();
}

#[test]
fn joining_and_separating_islands_with_a_joint() {
    let mut world = serial_world(WorldConfig::default());
    let bodies: Vec<BodyKey> = (0..4)
        .map(|i| world.create_body(BodyDef::new_dynamic(Vec2::new(i as f64 * 10.0, 0.0))))
        .collect();
    world.create_joint(JointDef::new(bodies[0], bodies[1])).unwrap();
    world.create_joint(JointDef::new(bodies[2], bodies[3])).unwrap();
    assert_eq!(world.island_count(), 2);

    let bridge = world.create_joint(JointDef::new(bodies[1], bodies[2])).unwrap();
    assert_eq!(world.island_count(), 1);
    let island = world.body_island(bodies[0]).unwrap().unwrap();
    assert_eq!(world.island(island).unwrap().body_count(), 4);
    assert_eq!(world.island(island).unwrap().joint_count(), 3);

    world.destroy_joint(bridge).unwrap();
    // removal is lazy
    assert_eq!(world.island_count(), 1);
    assert_eq!(world.island(island).unwrap().constraint_remove_count(), 1);

    world.split_island(island).unwrap();
    assert_eq!(world.island_count(), 2);
    assert!(world.island(island).is_err());
    let membership = island_membership(&world);
    let mut expected = vec![
        vec![bodies[0].slot(), bodies[1].slot()],
        vec![bodies[2].slot(), bodies[3].slot()],
    ];
    for island in &mut expected {
        island.sort_unstable();
    }
    expected.sort();
    assert_eq!(membership, expected);
    for (_, island) in world.islands() {
        assert_eq!(island.joint_count(), 1);
        assert_eq!(island.constraint_remove_count(), 0);
    }
    world.validate();
}

//
// islands
//

#[test]
fn merge_order_does_not_change_membership() {
    let build = |bridges: [(usize, usize); 2]| {
        let mut world = serial_world(WorldConfig::default());
        let bodies: Vec<BodyKey> = (0..7)
            .map(|i| world.create_body(BodyDef::new_dynamic(Vec2::new(i as f64 * 10.0, 0.0))))
            .collect();
        for (a, b) in [(0, 1), (2, 3), (3, 4), (5, 6)] {
            world.create_joint(JointDef::new(bodies[a], bodies[b])).unwrap();
        }
        for (a, b) in bridges {
            world.create_joint(JointDef::new(bodies[a], bodies[b])).unwrap();
        }
        world.validate();
        island_membership(&world)
    };

    let forward = build([(1, 2), (4, 5)]);
    let backward = build([(4, 5), (1, 2)]);
    assert_eq!(forward, backward);
    assert_eq!(forward.len(), 1);
    assert_eq!(forward[0].len(), 7);
}

#[test]
fn bigger_island_survives_a_merge() {
    let mut world = serial_world(WorldConfig::default());
    let bodies: Vec<BodyKey> = (0..4)
        .map(|i| world.create_body(BodyDef::new_dynamic(Vec2::new(i as f64 * 10.0, 0.0))))
        .collect();
    world.create_joint(JointDef::new(bodies[1], bodies[2])).unwrap();
    world.create_joint(JointDef::new(bodies[2], bodies[3])).unwrap();
    let big = world.body_island(bodies[1]).unwrap();

    world.create_joint(JointDef::new(bodies[0], bodies[1])).unwrap();
    assert_eq!(world.body_island(bodies[0]).unwrap(), big);
    assert_eq!(world.island_count(), 1);
}

#[test]
fn lost_contact_splits_island() {
    let mut world = serial_world(WorldConfig::default());
    let a = dynamic_circle(&mut world, 0.0, 0.0, 0.5);
    let b = dynamic_circle(&mut world, 0.9, 0.0, 0.5);
    let c = dynamic_circle(&mut world, 1.8, 0.0, 0.5);

    world.step(DT);
    assert_eq!(world.contact_count(), 2);
    assert_eq!(world.island_count(), 1);
    let island = world.body_island(a).unwrap().unwrap();
    assert_eq!(world.island(island).unwrap().contact_count(), 2);

    world.set_position(c, Vec2::new(10.0, 0.0)).unwrap();
    world.step(DT);
    assert_eq!(world.contact_count(), 1);
    assert_eq!(world.island(island).unwrap().body_count(), 3);
    assert_eq!(world.island(island).unwrap().constraint_remove_count(), 1);

    world.split_island(island).unwrap();
    assert_eq!(world.island_count(), 2);
    assert_eq!(world.body_island(a).unwrap(), world.body_island(b).unwrap());
    assert_ne!(world.body_island(a).unwrap(), world.body_island(c).unwrap());
    for (_, island) in world.islands() {
        assert!(island.body_count() > 0);
    }
    world.validate();
}

#[test]
fn split_without_removals_does_nothing() {
    let mut world = serial_world(WorldConfig::default());
    let a = world.create_body(BodyDef::new_dynamic(Vec2::zero()));
    let b = world.create_body(BodyDef::new_dynamic(Vec2::zero()));
    world.create_joint(JointDef::new(a, b)).unwrap();
    let island = world.body_island(a).unwrap().unwrap();

    world.split_island(island).unwrap();
    assert_eq!(world.body_island(a).unwrap(), Some(island));
    assert_eq!(world.island_count(), 1);
}

#[test]
fn destroying_bodies_empties_islands() {
    let mut world = serial_world(WorldConfig::default());
    let a = dynamic_circle(&mut world, 0.0, 0.0, 0.5);
    let b = dynamic_circle(&mut world, 0.9, 0.0, 0.5);
    world.step(DT);
    assert_eq!(world.island_count(), 1);

    world.destroy_body(a).unwrap();
    assert_eq!(world.contact_count(), 0);
    assert_eq!(world.island_count(), 1);
    world.validate();

    world.destroy_body(b).unwrap();
    assert_eq!(world.island_count(), 0);
    assert_eq!(world.body_count(), 0);
    assert_eq!(world.broad_phase().pair_count(), 0);
    assert_eq!(world.destroy_body(b), Err(WorldError::InvalidBody(b)));
    world.validate();
}

//
// constraint graph
//

#[test]
fn crowded_body_overflows() {
    let mut world = serial_world(WorldConfig::default());
    let center = dynamic_circle(&mut world, 0.0, 0.0, 1.0);
    let count = 24;
    for i in 0..count {
        let angle = i as f64 * std::f64::consts::TAU / count as f64;
        dynamic_circle(&mut world, 1.05 * angle.cos(), 1.05 * angle.sin(), 0.1);
    }
    world.step(DT);

    let graph = world.constraint_graph();
    assert_eq!(graph.contact_count(), count);
    assert_eq!(graph.overflow().contact_sims().len(), count - DYNAMIC_COLOR_COUNT);
    for color in &graph.colors()[..DYNAMIC_COLOR_COUNT] {
        assert_eq!(color.contact_sims().len(), 1);
        assert!(color.body_set().get(center.slot() as usize));
    }
    assert!(graph.overflow().body_set().is_empty());
    world.validate();
}

#[test]
fn colors_never_share_a_dynamic_body() {
    let mut world = serial_world(WorldConfig::default());
    static_rect(&mut world, 0.0, -0.5, 20.0, 1.0);
    for row in 0..8 {
        for col in 0..8 {
            dynamic_circle(&mut world, col as f64 * 0.9 - 3.0, row as f64 * 0.9 + 0.45, 0.5);
        }
    }
    world.step(DT);
    assert!(world.constraint_graph().contact_count() > 0);

    for (color_idx, color) in world.constraint_graph().colors()[..OVERFLOW_INDEX]
        .iter()
        .enumerate()
    {
        let mut seen = std::collections::HashSet::new();
        for sim in color.contact_sims() {
            for body in [sim.body_a, sim.body_b] {
                if world.body_type(body).unwrap() == BodyType::Dynamic {
                    assert!(seen.insert(body), "body {body:?} twice in color {color_idx}");
                }
            }
        }
    }
    // every touching contact is colored
    for (key, contact) in world.contacts() {
        assert_eq!(contact.is_touching(), world.contact_color(key).is_some());
    }
}

//
// joints
//

#[test]
fn joint_errors() {
    let mut world = serial_world(WorldConfig::default());
    let ground = static_rect(&mut world, 0.0, 0.0, 1.0, 1.0);
    let wall = static_rect(&mut world, 5.0, 0.0, 1.0, 1.0);
    let ball = world.create_body(BodyDef::new_dynamic(Vec2::zero()));

    assert_eq!(
        world.create_joint(JointDef::new(ball, ball)).unwrap_err(),
        WorldError::SelfJoint
    );
    assert_eq!(
        world.create_joint(JointDef::new(ground, wall)).unwrap_err(),
        WorldError::NoDynamicBody
    );

    let gone = world.create_body(BodyDef::new_dynamic(Vec2::zero()));
    world.destroy_body(gone).unwrap();
    assert_eq!(
        world.create_joint(JointDef::new(ball, gone)).unwrap_err(),
        WorldError::InvalidBody(gone)
    );

    let joint = world.create_joint(JointDef::new(ground, ball)).unwrap();
    assert!(world.joint(joint).unwrap().color_index().unwrap() > 0);
    world.destroy_joint(joint).unwrap();
    assert_eq!(
        world.destroy_joint(joint),
        Err(WorldError::InvalidJoint(joint))
    );
    world.validate();
}

#[test]
fn joints_can_disable_collision() {
    let mut world = serial_world(WorldConfig::default());
    let a = dynamic_circle(&mut world, 0.0, 0.0, 0.5);
    let b = dynamic_circle(&mut world, 0.8, 0.0, 0.5);
    world.step(DT);
    assert_eq!(world.contact_count(), 1);

    let joint = world.create_joint(JointDef::new(a, b)).unwrap();
    assert_eq!(world.contact_count(), 0);

    // moving the bodies searches for pairs again
    world.set_position(b, Vec2::new(0.7, 0.0)).unwrap();
    world.step(DT);
    assert_eq!(world.contact_count(), 0);

    world.destroy_joint(joint).unwrap();
    world.set_position(b, Vec2::new(0.8, 0.0)).unwrap();
    world.step(DT);
    assert_eq!(world.contact_count(), 1);

    world
        .create_joint(JointDef::new(a, b).with_collide_connected(true))
        .unwrap();
    assert_eq!(world.contact_count(), 1);
    world.validate();
}

#[test]
fn shapes_on_the_same_body_never_collide() {
    let mut world = serial_world(WorldConfig::default());
    let body = dynamic_circle(&mut world, 0.0, 0.0, 0.5);
    world
        .create_shape(body, ShapeDef::circle(0.5).with_offset(Vec2::new(0.3, 0.0)))
        .unwrap();
    world.step(DT);
    assert_eq!(world.contact_count(), 0);

    // a second body overlapping both shapes gets a contact with each
    dynamic_circle(&mut world, 0.2, 0.3, 0.5);
    world.step(DT);
    assert_eq!(world.contact_count(), 2);
    assert!(world.contacts().all(|(_, c)| c.body_a() != c.body_b()));
}

#[test]
fn sensors_make_no_contacts() {
    let mut world = serial_world(WorldConfig::default());
    let sensor_body = world.create_body(BodyDef::new_dynamic(Vec2::zero()));
    world
        .create_shape(sensor_body, ShapeDef::circle(0.5).sensor())
        .unwrap();
    dynamic_circle(&mut world, 0.5, 0.0, 0.5);
    static_rect(&mut world, 0.0, -0.6, 4.0, 1.0);
    world.step(DT);
    // only the solid circle and the ground
    assert_eq!(world.contact_count(), 1);
    let (_, contact) = world.contacts().next().unwrap();
    assert!(contact.body_a() != sensor_body && contact.body_b() != sensor_body);
}

#[test]
fn custom_filter_rejects_pairs() {
    let mut world = serial_world(WorldConfig::default());
    world.set_custom_filter(Some(Box::new(|_, _| false)));
    let a = world.create_body(BodyDef::new_dynamic(Vec2::zero()));
    world
        .create_shape(a, ShapeDef::circle(0.5).with_custom_filtering())
        .unwrap();
    dynamic_circle(&mut world, 0.5, 0.0, 0.5);
    let c = dynamic_circle(&mut world, 0.0, 0.5, 0.5);

    world.step(DT);
    // only the pair without custom filtering survives
    assert_eq!(world.contact_count(), 1);
    let (_, contact) = world.contacts().next().unwrap();
    assert!(contact.body_a() != a && contact.body_b() != a);
    assert!(contact.body_a() == c || contact.body_b() == c);
}

//
// sleep
//

#[test]
fn resting_island_sleeps_and_wakes() {
    let mut world = serial_world(WorldConfig::default());
    static_rect(&mut world, 0.0, 0.0, 10.0, 1.0);
    let ball = dynamic_circle(&mut world, 0.0, 0.9, 0.5);

    world.step(DT);
    let (contact_key, _) = world.contacts().next().unwrap();
    assert!(world.contact_color(contact_key).is_some());

    for _ in 0..40 {
        world.step(DT);
    }
    assert!(!world.is_awake(ball).unwrap());
    assert!(world.body_set(ball).unwrap().is_sleeping());
    assert_eq!(world.sleeping_set_count(), 1);
    assert_eq!(world.awake_island_count(), 0);
    assert_eq!(world.constraint_graph().contact_count(), 0);
    let contact = world.contact(contact_key).unwrap();
    assert!(contact.is_touching());
    assert_eq!(contact.color_index(), None);
    assert_eq!(contact.set_index(), world.body_set(ball).unwrap());

    world
        .set_linear_velocity(ball, Vec2::new(0.0, 1.0))
        .unwrap();
    assert!(world.is_awake(ball).unwrap());
    assert_eq!(world.sleeping_set_count(), 0);
    assert_eq!(world.awake_island_count(), 1);
    assert!(world.contact_color(contact_key).unwrap() > 0);
    assert_eq!(world.body(ball).unwrap().sleep_time(), 0.0);
    world.validate();
}

#[test]
fn sleep_can_be_disabled() {
    let mut world = serial_world(WorldConfig {
        enable_sleep: false,
        ..Default::default()
    });
    let ball = world.create_body(BodyDef::new_dynamic(Vec2::zero()));
    for _ in 0..60 {
        world.step(DT);
    }
    assert!(world.is_awake(ball).unwrap());

    // per body
    let mut world = serial_world(WorldConfig::default());
    let ball = world.create_body(BodyDef::new_dynamic(Vec2::zero()));
    let restless = world.create_body(BodyDef::new_dynamic(Vec2::new(5.0, 0.0)).with_sleep(false));
    for _ in 0..60 {
        world.step(DT);
    }
    assert!(!world.is_awake(ball).unwrap());
    assert!(world.is_awake(restless).unwrap());
}

#[test]
fn destroying_a_joint_wakes_its_bodies() {
    let mut world = serial_world(WorldConfig::default());
    let a = world.create_body(BodyDef::new_dynamic(Vec2::zero()));
    let b = world.create_body(BodyDef::new_dynamic(Vec2::new(3.0, 0.0)));
    let joint = world.create_joint(JointDef::new(a, b)).unwrap();
    for _ in 0..40 {
        world.step(DT);
    }
    assert!(!world.is_awake(a).unwrap());

    world.destroy_joint(joint).unwrap();
    assert!(world.is_awake(a).unwrap());
    assert!(world.is_awake(b).unwrap());
    assert_eq!(world.sleeping_set_count(), 0);
    world.validate();
}

#[test]
fn pending_split_happens_before_sleep() {
    let mut world = serial_world(WorldConfig::default());
    let bodies: Vec<BodyKey> = (0..4)
        .map(|i| world.create_body(BodyDef::new_dynamic(Vec2::new(i as f64 * 10.0, 0.0))))
        .collect();
    world.create_joint(JointDef::new(bodies[0], bodies[1])).unwrap();
    world.create_joint(JointDef::new(bodies[2], bodies[3])).unwrap();
    let bridge = world.create_joint(JointDef::new(bodies[1], bodies[2])).unwrap();
    world.destroy_joint(bridge).unwrap();

    for _ in 0..40 {
        world.step(DT);
    }
    assert_eq!(world.island_count(), 2);
    assert_eq!(world.sleeping_set_count(), 2);
    assert_eq!(world.awake_island_count(), 0);

    // waking one half leaves the other asleep
    world.wake_body(bodies[0]).unwrap();
    assert!(world.is_awake(bodies[1]).unwrap());
    assert!(!world.is_awake(bodies[2]).unwrap());
    world.validate();
}

#[test]
fn moving_kinematic_body_keeps_touching_bodies_awake() {
    let run = |velocity: Vec2| {
        let mut world = serial_world(WorldConfig::default());
        let platform =
            world.create_body(BodyDef::new_kinematic(Vec2::zero()).with_velocity(velocity));
        world
            .create_shape(platform, ShapeDef::rect(100.0, 1.0))
            .unwrap();
        let ball = dynamic_circle(&mut world, 0.0, 0.9, 0.5);
        for _ in 0..60 {
            world.step(DT);
        }
        // kinematic bodies never own islands or sleep
        assert!(world.is_awake(platform).unwrap());
        assert_eq!(world.body_island(platform).unwrap(), None);
        world.is_awake(ball).unwrap()
    };
    assert!(run(Vec2::new(0.1, 0.0)));
    assert!(!run(Vec2::zero()));
}

#[test]
fn kinematic_body_starting_to_move_wakes_sleeping_bodies() {
    let mut world = serial_world(WorldConfig::default());
    let platform = world.create_body(BodyDef::new_kinematic(Vec2::zero()));
    world.create_shape(platform, ShapeDef::rect(2.0, 1.0)).unwrap();
    let ball = dynamic_circle(&mut world, 0.0, 0.9, 0.5);
    for _ in 0..60 {
        world.step(DT);
    }
    assert!(!world.is_awake(ball).unwrap());
    let (contact_key, _) = world.contacts().next().unwrap();
    assert!(world.contact(contact_key).unwrap().is_touching());

    world.set_linear_velocity(platform, Vec2::new(5.0, 0.0)).unwrap();
    world.step(DT);
    assert!(world.is_awake(ball).unwrap());
    assert_eq!(world.sleeping_set_count(), 0);
    assert_eq!(world.contact(contact_key).unwrap().set_index(), SetIndex::AWAKE);

    // the platform slides out from under the ball
    for _ in 0..120 {
        world.step(DT);
    }
    assert!(world.position(platform).unwrap().x > 9.0);
    assert!(world.contacts().all(|(_, c)| !c.is_touching()));
    world.validate();
}

#[test]
fn waking_restores_disabled_contacts() {
    let mut world = serial_world(WorldConfig::default());
    let ball = world.create_body(BodyDef::new_dynamic(Vec2::zero()));
    world.create_shape(ball, ShapeDef::circle(0.5)).unwrap();
    // bounds overlap through the margin but the shapes don't touch
    static_rect(&mut world, 0.0, 0.63, 1.0, 0.1);

    world.step(DT);
    let (contact_key, contact) = world.contacts().next().unwrap();
    assert!(!contact.is_touching());
    assert_eq!(contact.set_index(), SetIndex::AWAKE);

    for _ in 0..40 {
        world.step(DT);
    }
    assert!(!world.is_awake(ball).unwrap());
    assert_eq!(world.contact(contact_key).unwrap().set_index(), SetIndex::DISABLED);

    world.wake_body(ball).unwrap();
    assert_eq!(world.contact(contact_key).unwrap().set_index(), SetIndex::AWAKE);
    world.validate();
}

//
// randomized
//

#[test]
fn random_operations_keep_invariants() {
    let mut rng = StdRng::seed_from_u64(0x0ddba11);
    let mut world = serial_world(WorldConfig {
        time_to_sleep: 0.1,
        body_capacity: 4,
        ..Default::default()
    });
    let ground = static_rect(&mut world, 0.0, -1.0, 40.0, 1.0);
    let mut bodies: Vec<BodyKey> = Vec::new();
    let mut joints: Vec<JointKey> = Vec::new();

    let random_pos =
        |rng: &mut StdRng| Vec2::new(rng.gen_range(-5.0..5.0), rng.gen_range(-0.5..5.0));
    let random_vel = |rng: &mut StdRng| {
        if rng.gen_bool(0.5) {
            Vec2::zero()
        } else {
            Vec2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0))
        }
    };

    for _ in 0..400 {
        for _ in 0..rng.gen_range(0..3) {
            match rng.gen_range(0..10) {
                0..=3 if bodies.len() < 60 => {
                    let pos = random_pos(&mut rng);
                    let vel = random_vel(&mut rng);
                    let def = if rng.gen_bool(0.1) {
                        BodyDef::new_kinematic(pos)
                    } else {
                        BodyDef::new_dynamic(pos)
                    };
                    let body = world.create_body(def.with_velocity(vel));
                    let shape = if rng.gen_bool(0.5) {
                        ShapeDef::circle(rng.gen_range(0.2..0.8))
                    } else {
                        ShapeDef::rect(rng.gen_range(0.2..1.5), rng.gen_range(0.2..1.5))
                    };
                    world.create_shape(body, shape).unwrap();
                    bodies.push(body);
                }
                4 if !bodies.is_empty() => {
                    let body = bodies.swap_remove(rng.gen_range(0..bodies.len()));
                    world.destroy_body(body).unwrap();
                    joints.retain(|j| world.joint(*j).is_ok());
                }
                5 if bodies.len() >= 2 => {
                    let a = bodies[rng.gen_range(0..bodies.len())];
                    let b = if rng.gen_bool(0.2) {
                        ground
                    } else {
                        bodies[rng.gen_range(0..bodies.len())]
                    };
                    let def = JointDef::new(a, b).with_collide_connected(rng.gen_bool(0.5));
                    if let Ok(joint) = world.create_joint(def) {
                        joints.push(joint);
                    }
                }
                6 if !joints.is_empty() => {
                    let joint = joints.swap_remove(rng.gen_range(0..joints.len()));
                    world.destroy_joint(joint).unwrap();
                }
                7 if !bodies.is_empty() => {
                    let body = bodies[rng.gen_range(0..bodies.len())];
                    let vel = random_vel(&mut rng);
                    world.set_linear_velocity(body, vel).unwrap();
                }
                8 if !bodies.is_empty() => {
                    let body = bodies[rng.gen_range(0..bodies.len())];
                    let pos = random_pos(&mut rng);
                    world.set_position(body, pos).unwrap();
                }
                9 if world.island_count() > 0 => {
                    let nth = rng.gen_range(0..world.island_count());
                    let (island, _) = world.islands().nth(nth).unwrap();
                    world.split_island(island).unwrap();
                }
                _ => {}
            }
            world.validate();
        }

        world.step(DT);
        assert_constraints_share_islands(&world);
    }
    assert!(world.body_count() > 1);
}

//
// determinism
//

#[cfg(feature = "parallel")]
#[test]
fn thread_count_does_not_change_results() {
    use crate::task::{RayonScheduler, TaskScheduler};

    let run = |scheduler: Box<dyn TaskScheduler>| {
        let config = WorldConfig {
            min_range_per_task: 1,
            pair_pool_factor: 1,
            ..Default::default()
        };
        let mut world = World::with_scheduler(config, scheduler).unwrap();
        static_rect(&mut world, 0.0, -0.5, 40.0, 1.0);
        for i in 0..300 {
            let (row, col) = (i / 20, i % 20);
            let body = world.create_body(
                BodyDef::new_dynamic(Vec2::new(col as f64 * 0.95 - 9.5, row as f64 * 0.95 + 0.45))
                    .with_velocity(Vec2::new(((i * 7) % 5) as f64 * 0.2 - 0.4, 0.0)),
            );
            world.create_shape(body, ShapeDef::circle(0.5)).unwrap();
        }

        let mut history = Vec::new();
        for _ in 0..20 {
            world.step(DT);
            history.push(
                world
                    .contacts()
                    .map(|(key, c)| (key, c.shape_a(), c.shape_b(), c.color_index()))
                    .collect::<Vec<_>>(),
            );
        }
        history
    };

    let serial = run(Box::new(SerialScheduler));
    let parallel = run(Box::new(RayonScheduler::with_threads(4).unwrap()));
    assert!(!serial.last().unwrap().is_empty());
    assert_eq!(serial, parallel);
}
