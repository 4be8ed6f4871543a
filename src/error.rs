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

use thiserror::Error;

/// Errors reported for host-side misuse of the API.
///
/// The simulation step itself never fails: contact overflow, degenerate
/// contacts and resolver non-convergence are all handled in place.
#[derive(Debug, Error)]
pub enum PhysicsError {
    /// A handle refers to an item that has been removed.
    #[error("handle {index}v{generation} does not refer to a live item")]
    StaleHandle { index: usize, generation: u32 },

    /// A configuration value is out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: &'static str },

    /// A configuration document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Config(#[from] toml::de::Error),
}
