// Copyright 2015-2020 Parity Technologies (UK) Ltd.
// This file is part of Parity.

// Parity is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Parity is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Parity.  If not, see <http://www.gnu.org/licenses/>.

//! Embeddable in-memory key-value store with durability.
//!
//! Keys are byte strings up to 250 bytes, values opaque byte strings
//! with a content-type tag. The index is a chained hash table that
//! doubles when full. Durability comes from two artifacts in the store
//! directory: an append-only log of mutation commands replayed on open,
//! and a binary dump snapshot installed by atomic rename, optionally
//! written by a forked child.
//!
//! The core is single-threaded and assumes exclusive access; a
//! directory lock keeps other processes out.

mod aol;
mod db;
mod display;
mod dump;
mod error;
mod hash;
mod index;
mod options;

pub use db::Store;
pub use error::{Error, Result};
pub use index::{PutOutcome, DEFAULT_CONTENT_TYPE, KEY_MAX};
pub use options::{Features, Options, DEFAULT_INDEX_BITS};
