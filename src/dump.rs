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

// On-disk layout for the dump snapshot, version 0001.
//
// Header:
// [SIG: 4][VERSION: 4][RCRD_CNT: 8]
// SIG - 'O' 'L' 'E' 'G'.
// VERSION - four ASCII digits, zero-padded.
// RCRD_CNT - 64-bit record count.
//
// Record (RCRD_CNT times):
// [KEY: 250][DATA_SIZE: 8][DATA: DATA_SIZE]
// KEY - NUL-padded to KEY_MAX bytes.
//
// Integers are little-endian, fields tightly packed. Records are written
// in bucket-array order, chain order; readers must not rely on order.
// Content-type is not persisted in this version; readers bind the
// default on load.
//
// The writer targets a temp file that is renamed over the live dump on
// success and unlinked on any failure, so a crashed or failed save never
// touches the previous snapshot.

use std::convert::TryInto;
use std::io::{BufWriter, Write};
use crate::error::{Error, Result};
use crate::index::{Index, KEY_MAX};

pub const DUMP_SIG: [u8; 4] = *b"OLEG";
pub const DUMP_VERSION: [u8; 4] = *b"0001";

const HEADER_SIZE: usize = 4 + 4 + 8;

/// Serialize `index` to `tmp_path`, then install it at `live_path` by
/// rename. The index is not mutated; the artifact is a pure function of
/// its state.
pub fn write(index: &Index, tmp_path: &std::path::Path, live_path: &std::path::Path) -> Result<()> {
	let tmp = TmpFile::create(tmp_path)?;
	{
		let mut out = BufWriter::new(&tmp.file);
		out.write_all(&DUMP_SIG)?;
		out.write_all(&DUMP_VERSION)?;
		out.write_all(&index.record_count().to_le_bytes())?;
		for record in index.iter() {
			out.write_all(record.padded_key())?;
			out.write_all(&(record.value().len() as u64).to_le_bytes())?;
			out.write_all(record.value())?;
		}
		out.flush()?;
	}
	tmp.file.sync_data()?;
	tmp.commit(live_path)?;
	log::debug!(
		target: "oleg-db",
		"Dumped {} records to {:?}",
		index.record_count(),
		live_path,
	);
	Ok(())
}

/// Parse the dump at `path`, handing each `(key, value)` to `apply` and
/// returning the record count. Keys come back with NUL padding trimmed.
pub fn load<F>(path: &std::path::Path, mut apply: F) -> Result<u64>
where
	F: FnMut(&[u8], &[u8]) -> Result<()>,
{
	let file = std::fs::File::open(path)?;
	if file.metadata()?.len() < HEADER_SIZE as u64 {
		return Err(Error::Corruption("Dump header cut short".into()));
	}
	let map = unsafe { memmap2::Mmap::map(&file)? };
	let data: &[u8] = &map;

	if data[0..4] != DUMP_SIG {
		return Err(Error::BadMagic);
	}
	if data[4..8] != DUMP_VERSION {
		return Err(Error::BadVersion);
	}
	let count = u64::from_le_bytes(data[8..16].try_into().unwrap());

	let mut offset = HEADER_SIZE;
	for read in 0..count {
		if data.len() - offset < KEY_MAX + 8 {
			return Err(Error::Corruption(
				format!("Dump cut short at record {} of {}", read, count),
			));
		}
		let raw_key = &data[offset..offset + KEY_MAX];
		let key_len = raw_key.iter().rposition(|b| *b != 0).map_or(0, |at| at + 1);
		offset += KEY_MAX;
		let data_size = u64::from_le_bytes(
			data[offset..offset + 8].try_into().unwrap(),
		) as usize;
		offset += 8;
		if data.len() - offset < data_size {
			return Err(Error::Corruption(
				format!("Dump value length past end of file at record {}", read),
			));
		}
		apply(&raw_key[..key_len], &data[offset..offset + data_size])?;
		offset += data_size;
	}
	Ok(count)
}

/// Temp dump file. Unlinked on drop unless committed.
struct TmpFile {
	path: std::path::PathBuf,
	file: std::fs::File,
	armed: bool,
}

impl TmpFile {
	fn create(path: &std::path::Path) -> Result<TmpFile> {
		let file = std::fs::File::create(path)?;
		Ok(TmpFile {
			path: path.into(),
			file,
			armed: true,
		})
	}

	fn commit(mut self, live_path: &std::path::Path) -> Result<()> {
		std::fs::rename(&self.path, live_path)?;
		self.armed = false;
		Ok(())
	}
}

impl Drop for TmpFile {
	fn drop(&mut self) {
		if self.armed {
			if let Err(e) = std::fs::remove_file(&self.path) {
				log::warn!(target: "oleg-db", "Failed to remove temp dump {:?}: {}", self.path, e);
			}
		}
	}
}
