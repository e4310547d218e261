//! # pulse_demo — headless runtime demo
//!
//! Exercises the full public API of `pulse_ecs` without any rendering:
//! registers `Position`/`Velocity` component kinds, spawns a few moving
//! entities, installs a 60 Hz movement system and a 1 Hz census system,
//! and drives the world with a fixed-step loop against a manual clock so
//! the run is deterministic.

use std::rc::Rc;

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pulse_ecs::{Entity, Kind, ManualClock, Signature, System, World};

/// Value template for the `Position` kind.
#[derive(Debug, Default, Serialize)]
struct Position {
    x: f64,
    y: f64,
}

/// Value template for the `Velocity` kind.
#[derive(Debug, Default, Serialize)]
struct Velocity {
    x: f64,
    y: f64,
}

const FRAME_MS: f64 = 16.0;
const FRAMES: u32 = 125; // two simulated seconds

fn spawn_mover(world: &World, position: &Kind, velocity: &Kind, x: f64, vx: f64) -> Result<Entity> {
    let entity = Entity::new();
    position.add(&entity, json!({ "x": x, "y": 0.0 }))?;
    velocity.add(&entity, json!({ "x": vx, "y": 0.0 }))?;
    world.add_entity(&entity);
    Ok(entity)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pulse_demo=info".parse()?))
        .init();

    info!("pulse demo starting");

    let clock = Rc::new(ManualClock::new());
    let world = World::with_clock(clock.clone());

    let position = Kind::register::<Position>()?;
    let velocity = Kind::register::<Velocity>()?;

    // Integrates velocity into position, capped at 60 Hz.
    let movement = System::new(Signature::of([position.id(), velocity.id()]), 60.0)?.on_update({
        let position = position.clone();
        let velocity = velocity.clone();
        move |_, _, elapsed, entity| {
            let pos = position.one_from(entity).expect("matched entity has Position");
            let vel = velocity.one_from(entity).expect("matched entity has Velocity");
            let dt = elapsed / 1000.0;
            pos.set("x", pos.number("x").unwrap_or(0.0) + vel.number("x").unwrap_or(0.0) * dt);
            pos.set("y", pos.number("y").unwrap_or(0.0) + vel.number("y").unwrap_or(0.0) * dt);
        }
    });

    // Logs a once-a-second census of every live entity.
    let census = System::new(Signature::all(), 1.0)?
        .on_enter(|_, entity| info!(entity = entity.id().0, "entity entered census"))
        .on_exit(|_, entity| info!(entity = entity.id().0, "entity left census"))
        .on_after_update_all(|world, game_time, updated| {
            info!(
                game_time_ms = game_time,
                entities = updated.len(),
                total = world.entity_count(),
                "census"
            );
        })
        .on_update(|_, _, _, _| {});

    census.listen_to(
        "spawn-wave",
        |_, payload, matches| {
            let visible = matches.map(|e| e.id().0);
            info!(
                count = payload["count"].as_u64().unwrap_or(0),
                visible = visible.len(),
                "spawn wave requested"
            );
        },
        false,
    );

    world.add_system(&movement);
    world.add_system(&census);

    let player = spawn_mover(&world, &position, &velocity, 0.0, 150.0)?;
    let drone = spawn_mover(&world, &position, &velocity, 50.0, -25.0)?;

    for frame in 0..FRAMES {
        clock.advance(FRAME_MS);
        world.update();

        if frame == 60 {
            // Halfway through, broadcast an event and retire the drone.
            world.trigger("spawn-wave", &json!({ "count": 3 }));
            drone.set_active(false);
        }
    }

    let final_pos = position
        .one_from(&player)
        .expect("player kept its Position");
    info!(
        x = final_pos.number("x").unwrap_or(0.0),
        y = final_pos.number("y").unwrap_or(0.0),
        game_time_ms = world.game_time(),
        "player final position"
    );

    world.destroy();
    info!("pulse demo shut down");
    Ok(())
}
