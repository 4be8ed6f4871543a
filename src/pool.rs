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

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::mem;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::error::PhysicsError;

/// A stable reference to an item stored in a `Pool<T>`.
///
/// Handles carry the generation of the slot they were issued for, so a
/// handle to a removed item never silently aliases whatever reuses its slot.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Handle<T> {
    index: u32,
    generation: u32,
    #[serde(skip)]
    marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(index: usize, generation: u32) -> Self {
        Handle {
            index: index as u32,
            generation,
            marker: PhantomData,
        }
    }

    /// The slot this handle points at.
    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

// Manual impls so that `Handle<T>` is Copy/Eq regardless of `T`.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.index, self.generation)
    }
}

/// Internal storage type used by Pool.
#[derive(Clone)]
enum PoolEntry<T> {
    Free {
        next_free: Option<usize>,
        generation: u32,
    },
    Occupied {
        item: T,
        generation: u32,
    },
}

/// Growable array type that allows items to be removed and inserted without
/// changing the handles of other entries.
#[derive(Clone)]
pub struct Pool<T> {
    len: usize,
    free_list: Option<usize>,
    entries: Vec<PoolEntry<T>>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Pool::new()
    }
}

impl<T> Pool<T> {
    /// Create an empty Pool.
    pub fn new() -> Self {
        Pool {
            len: 0,
            free_list: None,
            entries: Vec::new(),
        }
    }

    /// Create an empty Pool large enough to fit cap items.
    pub fn with_capacity(cap: usize) -> Self {
        Pool {
            len: 0,
            free_list: None,
            entries: Vec::with_capacity(cap),
        }
    }

    /// Determines if the Pool is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Push a new item to the Pool. Attempts to use spots left empty from
    /// removed items before performing a heap allocation.
    pub fn push(&mut self, item: T) -> Handle<T> {
        self.len += 1;
        if let Some(free_item) = self.free_list {
            let (next_free, generation) = match self.entries[free_item] {
                PoolEntry::Free { next_free, generation } => (next_free, generation),
                PoolEntry::Occupied { .. } => unreachable!(),
            };
            self.free_list = next_free;
            self.entries[free_item] = PoolEntry::Occupied { item, generation };
            Handle::new(free_item, generation)
        } else {
            let i = self.entries.len();
            self.entries.push(PoolEntry::Occupied { item, generation: 0 });
            Handle::new(i, 0)
        }
    }

    /// Removes the item a handle points to and adds its slot to the free
    /// list. The slot's generation is bumped so the handle goes stale.
    pub fn remove(&mut self, handle: Handle<T>) -> Result<T, PhysicsError> {
        if !self.contains(handle) {
            return Err(PhysicsError::StaleHandle {
                index: handle.index(),
                generation: handle.generation(),
            });
        }
        let i = handle.index();
        let new_entry = PoolEntry::Free {
            next_free: self.free_list,
            generation: handle.generation.wrapping_add(1),
        };
        self.free_list = Some(i);
        self.len -= 1;
        match mem::replace(&mut self.entries[i], new_entry) {
            PoolEntry::Occupied { item, .. } => Ok(item),
            PoolEntry::Free { .. } => unreachable!(),
        }
    }

    /// Returns true if the handle points at a live item.
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        match self.entries.get(handle.index()) {
            Some(&PoolEntry::Occupied { ref item, generation }) if generation == handle.generation => Some(item),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        match self.entries.get_mut(handle.index()) {
            Some(&mut PoolEntry::Occupied { ref mut item, generation }) if generation == handle.generation => Some(item),
            _ => None,
        }
    }

    /// Borrows two distinct live items mutably at once.
    pub fn get_pair_mut(&mut self, a: Handle<T>, b: Handle<T>) -> Option<(&mut T, &mut T)> {
        if a.index == b.index || !self.contains(a) || !self.contains(b) {
            return None;
        }
        let (lo, hi, swapped) = if a.index() < b.index() {
            (a.index(), b.index(), false)
        } else {
            (b.index(), a.index(), true)
        };
        let (head, tail) = self.entries.split_at_mut(hi);
        let first = match head[lo] {
            PoolEntry::Occupied { ref mut item, .. } => item,
            PoolEntry::Free { .. } => unreachable!(),
        };
        let second = match tail[0] {
            PoolEntry::Occupied { ref mut item, .. } => item,
            PoolEntry::Free { .. } => unreachable!(),
        };
        if swapped {
            Some((second, first))
        } else {
            Some((first, second))
        }
    }

    /// Returns the handle the next pushed item will receive.
    pub fn next_handle(&self) -> Handle<T> {
        match self.free_list {
            Some(free) => match self.entries[free] {
                PoolEntry::Free { generation, .. } => Handle::new(free, generation),
                PoolEntry::Occupied { .. } => unreachable!(),
            },
            None => Handle::new(self.entries.len(), 0),
        }
    }

    /// Iterates over live items in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().filter_map(|entry| match entry {
            PoolEntry::Occupied { item, .. } => Some(item),
            PoolEntry::Free { .. } => None,
        })
    }

    /// Iterates mutably over live items in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut().filter_map(|entry| match entry {
            PoolEntry::Occupied { item, .. } => Some(item),
            PoolEntry::Free { .. } => None,
        })
    }

    /// Iterates over handles and live items in slot order.
    pub fn handles(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.entries.iter().enumerate().filter_map(|(i, entry)| match entry {
            PoolEntry::Occupied { item, generation } => Some((Handle::new(i, *generation), item)),
            PoolEntry::Free { .. } => None,
        })
    }
}

impl<T> Index<Handle<T>> for Pool<T> {
    type Output = T;

    fn index(&self, handle: Handle<T>) -> &T {
        match self.get(handle) {
            Some(item) => item,
            None => panic!("handle {:?} is not occupied", handle),
        }
    }
}

impl<T> IndexMut<Handle<T>> for Pool<T> {
    fn index_mut(&mut self, handle: Handle<T>) -> &mut T {
        match self.get_mut(handle) {
            Some(item) => item,
            None => panic!("handle {:?} is not occupied", handle),
        }
    }
}
