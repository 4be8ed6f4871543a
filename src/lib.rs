// Copyright 2017 Matthew Plant. This file is part of Impel.
//
// Impel is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Impel is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Impel. If not, see <http://www.gnu.org/licenses/>.

//! A 3D particle and rigid body physics engine intended for use in video
//! games.
//!
//! # Overview
//!
//! Impel simulates two kinds of object, each driven by its own world:
//!
//! - `ParticleWorld` moves point masses (`Particle`). Particles are held
//!   together by springs and by links such as `ParticleRod`, which act
//!   through contacts.
//! - `World` moves `RigidBody`s, which also rotate. Contacts come from the
//!   collision primitives in `PrimitiveContacts` and from `Joint`s.
//!
//! Both worlds step the same way. Forces come from generators registered
//! against individual objects in a force registry. Contacts come from
//! contact generators and are resolved iteratively, worst first:
//!
//! ```
//! use impel::{Gravity, Particle, ParticleWorld, GroundContacts};
//! use impel::cgmath::Vector3;
//!
//! let mut world = ParticleWorld::new(16, 0);
//! let ball = world.add_particle(Particle::new(Vector3::new(0.0, 5.0, 0.0), 1.0));
//! let gravity = world
//!     .registry_mut()
//!     .add_generator(Gravity::new(Vector3::new(0.0, -10.0, 0.0)).into());
//! world.registry_mut().add(ball, gravity).unwrap();
//! world.add_contact_generator(GroundContacts::new());
//!
//! for _ in 0..100 {
//!     world.start_frame();
//!     world.run_physics(1.0 / 60.0);
//! }
//! assert!(world.particle(ball).unwrap().position.y >= -0.1);
//! ```
//!
//! Objects live in generational pools and are referred to by `Handle`s, so
//! removing an object never leaves a dangling reference behind: stale
//! handles are simply ignored by generators and rejected by the API.

pub extern crate cgmath;

mod math;
pub use math::*;

mod pool;
pub use pool::*;

mod error;
pub use error::*;

mod config;
pub use config::*;

mod particle;
pub use particle::*;

mod body;
pub use body::*;

#[macro_use]
mod force;
pub use force::*;

mod particle_force;
pub use particle_force::*;

mod body_force;
pub use body_force::*;

mod explosion;
pub use explosion::*;

mod particle_contact;
pub use particle_contact::*;

mod particle_link;
pub use particle_link::*;

mod particle_world;
pub use particle_world::*;

mod contact;
pub use contact::*;

mod collision;
pub use collision::*;

mod joint;
pub use joint::*;

mod world;
pub use world::*;
