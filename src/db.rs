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

use fs2::FileExt;
use crate::{
	aol::{AolCommand, AolReader, AolWriter},
	display::hex,
	dump,
	error::{Error, Result},
	index::{canonical_key, Index, PutOutcome, Record, DEFAULT_CONTENT_TYPE},
	options::{Features, Options},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
	/// Replaying the log or loading a dump; mutations are not logged.
	Startup,
	Ready,
}

/// The store façade. Owns the index and the log handle; assumes
/// exclusive access (enforced across processes by a directory lock,
/// within a process by `&mut self` on every mutation).
///
/// All store files live in one directory and share a name stem:
/// `<name>.dump`, `<name>.dump-tmp`, `<name>.aol` and `<name>.lock`.
pub struct Store {
	index: Index,
	features: Features,
	state: State,
	aol: Option<AolWriter>,
	aol_path: std::path::PathBuf,
	dump_path: std::path::PathBuf,
	dump_tmp_path: std::path::PathBuf,
	sync_writes: bool,
	created_at: std::time::Instant,
	_lock: std::fs::File,
}

impl Store {
	pub fn open(options: &Options) -> Result<Store> {
		options.validate()?;
		create_dir(&options.path)?;
		let lock = lock_dir(&options.path, &options.name)?;

		let dump_path = options.path.join(format!("{}.dump", options.name));
		let dump_tmp_path = options.path.join(format!("{}.dump-tmp", options.name));
		let aol_path = options.path.join(format!("{}.aol", options.name));

		// A save that died mid-write leaves its temp file behind.
		if dump_tmp_path.exists() {
			log::warn!(target: "oleg-db", "Removing stale temp dump {:?}", dump_tmp_path);
			std::fs::remove_file(&dump_tmp_path)?;
		}

		let mut store = Store {
			index: Index::with_bits(options.index_bits),
			features: options.features,
			state: State::Startup,
			aol: None,
			aol_path,
			dump_path,
			dump_tmp_path,
			sync_writes: options.sync_writes,
			created_at: std::time::Instant::now(),
			_lock: lock,
		};

		if store.features.contains(Features::APPEND_ONLY) {
			if store.aol_path.exists() {
				store.replay()?;
			}
			store.aol = Some(AolWriter::open(&store.aol_path, store.sync_writes)?);
		}
		store.state = State::Ready;
		log::info!(
			target: "oleg-db",
			"Opened store {:?} with {} records",
			store.dump_path,
			store.index.record_count(),
		);
		Ok(store)
	}

	fn replay(&mut self) -> Result<()> {
		let mut reader = AolReader::open(&self.aol_path)?;
		let mut commands = 0u64;
		loop {
			match reader.next() {
				Ok(Some(AolCommand::Put { key, value, content_type })) => {
					self.index.put(&key, &value, &content_type);
					commands += 1;
				}
				Ok(Some(AolCommand::Delete { key })) => {
					self.index.remove(&key);
					commands += 1;
				}
				Ok(None) => break,
				Err(Error::Corruption(e)) => {
					// The tail was torn mid-write. Everything before it
					// is good; the log is left as is.
					log::warn!(
						target: "oleg-db",
						"Log truncated after {} commands, dropping the tail: {}",
						commands,
						e,
					);
					break;
				}
				Err(e) => return Err(e),
			}
		}
		log::debug!(
			target: "oleg-db",
			"Replayed {} log commands into {} records",
			commands,
			self.index.record_count(),
		);
		Ok(())
	}

	fn log_mutations(&self) -> bool {
		self.state == State::Ready && self.features.contains(Features::APPEND_ONLY)
	}

	/// Bind `key` to `value` with the default content-type.
	pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<PutOutcome> {
		self.put_with_content_type(key, value, DEFAULT_CONTENT_TYPE)
	}

	pub fn put_with_content_type(
		&mut self,
		key: &[u8],
		value: &[u8],
		content_type: &[u8],
	) -> Result<PutOutcome> {
		let content_type = if content_type.is_empty() {
			DEFAULT_CONTENT_TYPE
		} else {
			content_type
		};
		let (padded, key_len) = canonical_key(key);
		let canonical = &padded[..key_len as usize];
		let outcome = self.index.put(canonical, value, content_type);
		log::trace!(target: "oleg-db", "Put {}: {} bytes", hex(canonical), value.len());
		if self.log_mutations() {
			if let Some(writer) = self.aol.as_mut() {
				writer.append_put(canonical, value, content_type)?;
			}
		}
		Ok(outcome)
	}

	pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
		self.index.get(key).map(Record::value)
	}

	pub fn content_type(&self, key: &[u8]) -> Option<&[u8]> {
		self.index.content_type(key)
	}

	/// Unbind `key`. `Ok(false)` when the key was not bound.
	pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
		match self.index.remove(key) {
			Some(record) => {
				log::trace!(target: "oleg-db", "Delete {}", hex(record.key()));
				if self.log_mutations() {
					if let Some(writer) = self.aol.as_mut() {
						writer.append_delete(record.key())?;
					}
				}
				Ok(true)
			}
			None => Ok(false),
		}
	}

	/// Expiration is not implemented; the request is accepted and
	/// discarded.
	pub fn set_expire(&mut self, _key: &[u8], _expire_at: std::time::SystemTime) -> Result<()> {
		Ok(())
	}

	/// Snapshot the index to `<name>.dump`. The previous dump stays in
	/// place unless the whole write succeeds.
	pub fn save(&self) -> Result<()> {
		dump::write(&self.index, &self.dump_tmp_path, &self.dump_path)
	}

	/// Snapshot in a forked child. The child sees the index as of the
	/// fork through copy-on-write and exits with 0 on success, 1 on
	/// failure; mutations made meanwhile land in the next snapshot.
	#[cfg(unix)]
	pub fn background_save(&self) -> Result<()> {
		match unsafe { libc::fork() } {
			-1 => Err(std::io::Error::last_os_error().into()),
			0 => {
				let code = match self.save() {
					Ok(()) => 0,
					Err(e) => {
						log::warn!(target: "oleg-db", "Background save failed: {}", e);
						1
					}
				};
				unsafe { libc::_exit(code) }
			}
			pid => {
				log::debug!(target: "oleg-db", "Background save started in child {}", pid);
				Ok(())
			}
		}
	}

	#[cfg(not(unix))]
	pub fn background_save(&self) -> Result<()> {
		self.save()
	}

	/// Rebind every record of the dump at `path` into the index with the
	/// default content-type (the dump does not persist content-types).
	pub fn load(&mut self, path: &std::path::Path) -> Result<()> {
		// A restore is not a user mutation; don't re-log it.
		let previous = self.state;
		self.state = State::Startup;
		let result = dump::load(path, |key, value| {
			self.index.put(key, value, DEFAULT_CONTENT_TYPE);
			Ok(())
		});
		self.state = previous;
		let count = result?;
		log::info!(target: "oleg-db", "Loaded {} records from {:?}", count, path);
		Ok(())
	}

	/// Free every record and close the log. Reports `Corruption` if the
	/// number of freed records disagrees with the index counter.
	pub fn close(mut self) -> Result<()> {
		let expected = self.index.record_count();
		let freed = self.index.clear();
		self.aol = None;
		if freed != expected {
			return Err(Error::Corruption(format!(
				"Freed {} records on close, index counted {}",
				freed,
				expected,
			)));
		}
		Ok(())
	}

	pub fn close_save(self) -> Result<()> {
		self.save()?;
		self.close()
	}

	/// Seconds since the store was opened.
	pub fn uptime(&self) -> u64 {
		self.created_at.elapsed().as_secs()
	}

	pub fn record_count(&self) -> u64 {
		self.index.record_count()
	}

	/// Current index capacity. Always a power of two; doubles when the
	/// record count reaches it.
	pub fn slot_count(&self) -> usize {
		self.index.slot_count()
	}

	/// Number of inserts that landed in a non-empty slot over the life
	/// of the store.
	pub fn collisions(&self) -> u64 {
		self.index.collisions()
	}

	pub fn enable(&mut self, features: Features) -> Result<()> {
		self.features.insert(features);
		if self.features.contains(Features::APPEND_ONLY) && self.aol.is_none() {
			self.aol = Some(AolWriter::open(&self.aol_path, self.sync_writes)?);
		}
		Ok(())
	}

	pub fn disable(&mut self, features: Features) {
		self.features.remove(features);
		if !self.features.contains(Features::APPEND_ONLY) {
			self.aol = None;
		}
	}

	pub fn is_enabled(&self, features: Features) -> bool {
		self.features.contains(features)
	}
}

#[cfg(unix)]
fn create_dir(path: &std::path::Path) -> Result<()> {
	use std::os::unix::fs::DirBuilderExt;
	if !path.is_dir() {
		std::fs::DirBuilder::new()
			.recursive(true)
			.mode(0o755)
			.create(path)?;
	}
	Ok(())
}

#[cfg(not(unix))]
fn create_dir(path: &std::path::Path) -> Result<()> {
	std::fs::create_dir_all(path)?;
	Ok(())
}

fn lock_dir(path: &std::path::Path, name: &str) -> Result<std::fs::File> {
	let lock_path = path.join(format!("{}.lock", name));
	let file = std::fs::OpenOptions::new()
		.create(true)
		.read(true)
		.write(true)
		.open(&lock_path)?;
	file.try_lock_exclusive().map_err(Error::Locked)?;
	Ok(file)
}
