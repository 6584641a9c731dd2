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

use crate::error::{Error, Result};

/// Default for `Options::index_bits`: 65536 slots.
pub const DEFAULT_INDEX_BITS: u8 = 16;

/// Bitset of optional store behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features(u32);

impl Features {
	/// Log every mutation to `<name>.aol` and replay it on open.
	pub const APPEND_ONLY: Features = Features(0b1);

	pub fn empty() -> Features {
		Features(0)
	}

	pub fn contains(self, other: Features) -> bool {
		self.0 & other.0 == other.0
	}

	pub fn insert(&mut self, other: Features) {
		self.0 |= other.0;
	}

	pub fn remove(&mut self, other: Features) {
		self.0 &= !other.0;
	}
}

impl std::ops::BitOr for Features {
	type Output = Features;

	fn bitor(self, rhs: Features) -> Features {
		Features(self.0 | rhs.0)
	}
}

impl Default for Features {
	fn default() -> Features {
		Features::empty()
	}
}

/// Store options. `path` is the directory that holds all store files,
/// `name` the file name stem shared by the dump, log and lock files.
#[derive(Debug, Clone)]
pub struct Options {
	pub path: std::path::PathBuf,
	pub name: String,
	pub features: Features,
	/// The index starts with `1 << index_bits` slots. Stable across
	/// open/close cycles; only the in-memory layout depends on it.
	pub index_bits: u8,
	/// `sync_data` the append-only log after each command. Off by default;
	/// commands are still flushed to the OS after each mutation.
	pub sync_writes: bool,
}

impl Options {
	pub fn with_store<P: Into<std::path::PathBuf>, S: Into<String>>(path: P, name: S) -> Options {
		Options {
			path: path.into(),
			name: name.into(),
			features: Features::empty(),
			index_bits: DEFAULT_INDEX_BITS,
			sync_writes: false,
		}
	}

	pub(crate) fn validate(&self) -> Result<()> {
		if self.name.is_empty() {
			return Err(Error::InvalidConfiguration("Store name is empty".into()));
		}
		if self.name.contains(std::path::is_separator) {
			return Err(Error::InvalidConfiguration(
				format!("Store name {:?} contains a path separator", self.name),
			));
		}
		if self.index_bits == 0 || self.index_bits > 32 {
			return Err(Error::InvalidConfiguration(
				format!("index_bits must be in 1..=32, got {}", self.index_bits),
			));
		}
		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::{Features, Options};

	#[test]
	fn feature_bitset() {
		let mut features = Features::empty();
		assert!(!features.contains(Features::APPEND_ONLY));
		features.insert(Features::APPEND_ONLY);
		assert!(features.contains(Features::APPEND_ONLY));
		features.remove(Features::APPEND_ONLY);
		assert!(!features.contains(Features::APPEND_ONLY));
	}

	#[test]
	fn validation() {
		assert!(Options::with_store("/tmp", "store").validate().is_ok());
		assert!(Options::with_store("/tmp", "").validate().is_err());
		assert!(Options::with_store("/tmp", "a/b").validate().is_err());
		let mut options = Options::with_store("/tmp", "store");
		options.index_bits = 0;
		assert!(options.validate().is_err());
		options.index_bits = 33;
		assert!(options.validate().is_err());
	}
}
