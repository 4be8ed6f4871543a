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

use serde::{Deserialize, Serialize};

use crate::error::PhysicsError;
use crate::math::Real;

/// Parameters shared by the particle and rigid body worlds.
///
/// Every field has a default, so a TOML document only needs to name the
/// values it changes:
///
/// ```
/// let config = impel::WorldConfig::from_toml_str("max_contacts = 64").unwrap();
/// assert_eq!(config.max_contacts, 64);
/// assert_eq!(config.iterations, 0);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Capacity of the contact buffer. Contacts beyond this are dropped for
    /// the step in which they occur.
    pub max_contacts: usize,
    /// Fixed resolver iteration count. Zero means the count is derived from
    /// the number of contacts every step.
    pub iterations: usize,
    /// Multiple of the contact count used as the particle resolver's
    /// iteration budget in auto mode.
    pub particle_iteration_factor: usize,
    /// Multiple of the contact count used as the rigid body resolver's
    /// iteration budget in auto mode.
    pub body_iteration_factor: usize,
    /// Closing velocities smaller than this are considered resolved.
    pub velocity_epsilon: Real,
    /// Penetrations smaller than this are considered resolved.
    pub position_epsilon: Real,
    /// Motion below which a sleep-capable body is put to sleep.
    pub sleep_epsilon: Real,
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig {
            max_contacts: 256,
            iterations: 0,
            particle_iteration_factor: 2,
            body_iteration_factor: 4,
            velocity_epsilon: 0.01,
            position_epsilon: 0.01,
            sleep_epsilon: 0.3,
        }
    }
}

impl WorldConfig {
    /// A default configuration with the given contact capacity and fixed
    /// iteration count (zero for auto).
    pub fn new(max_contacts: usize, iterations: usize) -> Self {
        WorldConfig {
            max_contacts,
            iterations,
            ..WorldConfig::default()
        }
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, PhysicsError> {
        let config: WorldConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is in range.
    pub fn validate(&self) -> Result<(), PhysicsError> {
        if self.iterations == 0 {
            if self.particle_iteration_factor == 0 {
                return Err(PhysicsError::InvalidConfig {
                    reason: "particle_iteration_factor must be positive in auto mode",
                });
            }
            if self.body_iteration_factor == 0 {
                return Err(PhysicsError::InvalidConfig {
                    reason: "body_iteration_factor must be positive in auto mode",
                });
            }
        }
        if !(self.velocity_epsilon >= 0.0) || !(self.position_epsilon >= 0.0) {
            return Err(PhysicsError::InvalidConfig {
                reason: "resolver epsilons must be non-negative",
            });
        }
        if !(self.sleep_epsilon >= 0.0) {
            return Err(PhysicsError::InvalidConfig {
                reason: "sleep_epsilon must be non-negative",
            });
        }
        Ok(())
    }

    /// Iterations the particle resolver gets for `num_contacts` contacts.
    pub fn particle_iterations(&self, num_contacts: usize) -> usize {
        if self.iterations == 0 {
            num_contacts * self.particle_iteration_factor
        } else {
            self.iterations
        }
    }

    /// Iterations the rigid body resolver gets for `num_contacts` contacts.
    pub fn body_iterations(&self, num_contacts: usize) -> usize {
        if self.iterations == 0 {
            num_contacts * self.body_iteration_factor
        } else {
            self.iterations
        }
    }
}
