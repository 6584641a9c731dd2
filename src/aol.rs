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

// On-disk layout for the append-only log.
//
// One frame per mutation command, appended in commit order:
//
// PUT:
// [CMD: 1][KEY_LEN: 4][KEY][CT_LEN: 4][CT][VAL_LEN: 8][VALUE][CRC: 4]
//
// DELETE:
// [CMD: 1][KEY_LEN: 4][KEY][CRC: 4]
//
// CMD - 1 for PUT, 2 for DELETE.
// Lengths are little-endian. KEY is the canonical (truncated) key.
// CRC - CRC-32 over everything from CMD to the end of the payload. The
// checksum terminates the frame: a torn tail fails the length or CRC
// check and replay treats it as end-of-log.

use std::io::{BufReader, BufWriter, Read, Write};
use crate::error::{Error, Result};
use crate::index::KEY_MAX;

const CMD_PUT: u8 = 1;
const CMD_DELETE: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AolCommand {
	Put {
		key: Vec<u8>,
		value: Vec<u8>,
		content_type: Vec<u8>,
	},
	Delete {
		key: Vec<u8>,
	},
}

pub struct AolWriter {
	file: BufWriter<std::fs::File>,
	sync: bool,
}

impl AolWriter {
	/// Open the log for appending, creating it if missing.
	pub fn open(path: &std::path::Path, sync: bool) -> Result<AolWriter> {
		let file = std::fs::OpenOptions::new()
			.create(true)
			.append(true)
			.open(path)?;
		Ok(AolWriter {
			file: BufWriter::new(file),
			sync,
		})
	}

	pub fn append_put(&mut self, key: &[u8], value: &[u8], content_type: &[u8]) -> Result<()> {
		let mut frame = Vec::with_capacity(
			1 + 4 + key.len() + 4 + content_type.len() + 8 + value.len(),
		);
		frame.push(CMD_PUT);
		frame.extend_from_slice(&(key.len() as u32).to_le_bytes());
		frame.extend_from_slice(key);
		frame.extend_from_slice(&(content_type.len() as u32).to_le_bytes());
		frame.extend_from_slice(content_type);
		frame.extend_from_slice(&(value.len() as u64).to_le_bytes());
		frame.extend_from_slice(value);
		self.append_frame(&frame)
	}

	pub fn append_delete(&mut self, key: &[u8]) -> Result<()> {
		let mut frame = Vec::with_capacity(1 + 4 + key.len());
		frame.push(CMD_DELETE);
		frame.extend_from_slice(&(key.len() as u32).to_le_bytes());
		frame.extend_from_slice(key);
		self.append_frame(&frame)
	}

	fn append_frame(&mut self, frame: &[u8]) -> Result<()> {
		let mut crc = crc32fast::Hasher::new();
		crc.update(frame);
		self.file.write_all(frame)?;
		self.file.write_all(&crc.finalize().to_le_bytes())?;
		self.file.flush()?;
		if self.sync {
			self.file.get_ref().sync_data()?;
		}
		Ok(())
	}
}

pub struct AolReader {
	file: BufReader<std::fs::File>,
	remaining: u64,
}

impl AolReader {
	pub fn open(path: &std::path::Path) -> Result<AolReader> {
		let file = std::fs::File::open(path)?;
		let remaining = file.metadata()?.len();
		Ok(AolReader {
			file: BufReader::new(file),
			remaining,
		})
	}

	/// Next command, or `None` at a clean end of log. A frame cut short
	/// or failing its checksum is reported as `Corruption`; replay treats
	/// that as end-of-log.
	pub fn next(&mut self) -> Result<Option<AolCommand>> {
		if self.remaining == 0 {
			return Ok(None);
		}
		let mut crc = crc32fast::Hasher::new();
		let mut cmd = [0u8; 1];
		self.read(&mut cmd, &mut crc)?;
		let command = match cmd[0] {
			CMD_PUT => {
				let key_len = self.read_u32(&mut crc)? as u64;
				if key_len as usize > KEY_MAX {
					return Err(Error::Corruption(format!("Log key length {} out of range", key_len)));
				}
				let key = self.read_blob(key_len, &mut crc)?;
				let ct_len = self.read_u32(&mut crc)? as u64;
				let content_type = self.read_blob(ct_len, &mut crc)?;
				let val_len = self.read_u64(&mut crc)?;
				let value = self.read_blob(val_len, &mut crc)?;
				AolCommand::Put {
					key,
					value,
					content_type,
				}
			}
			CMD_DELETE => {
				let key_len = self.read_u32(&mut crc)? as u64;
				if key_len as usize > KEY_MAX {
					return Err(Error::Corruption(format!("Log key length {} out of range", key_len)));
				}
				let key = self.read_blob(key_len, &mut crc)?;
				AolCommand::Delete { key }
			}
			cmd => {
				return Err(Error::Corruption(format!("Bad log command type {}", cmd)));
			}
		};

		let expected = crc.finalize();
		let mut stored = [0u8; 4];
		self.read_raw(&mut stored)?;
		let stored = u32::from_le_bytes(stored);
		if stored != expected {
			return Err(Error::Corruption(format!(
				"Log command checksum mismatch: stored {:#x}, computed {:#x}",
				stored,
				expected,
			)));
		}
		Ok(Some(command))
	}

	fn read(&mut self, buf: &mut [u8], crc: &mut crc32fast::Hasher) -> Result<()> {
		self.read_raw(buf)?;
		crc.update(buf);
		Ok(())
	}

	fn read_raw(&mut self, buf: &mut [u8]) -> Result<()> {
		if buf.len() as u64 > self.remaining {
			return Err(Error::Corruption("Log command cut short".into()));
		}
		self.file.read_exact(buf)?;
		self.remaining -= buf.len() as u64;
		Ok(())
	}

	fn read_u32(&mut self, crc: &mut crc32fast::Hasher) -> Result<u32> {
		let mut buf = [0u8; 4];
		self.read(&mut buf, crc)?;
		Ok(u32::from_le_bytes(buf))
	}

	fn read_u64(&mut self, crc: &mut crc32fast::Hasher) -> Result<u64> {
		let mut buf = [0u8; 8];
		self.read(&mut buf, crc)?;
		Ok(u64::from_le_bytes(buf))
	}

	fn read_blob(&mut self, len: u64, crc: &mut crc32fast::Hasher) -> Result<Vec<u8>> {
		// Bound the allocation before trusting the length.
		if len > self.remaining {
			return Err(Error::Corruption("Log length field past end of log".into()));
		}
		let mut buf = vec![0u8; len as usize];
		self.read(&mut buf, crc)?;
		Ok(buf)
	}
}

#[cfg(test)]
mod test {
	use super::{AolCommand, AolReader, AolWriter};
	use crate::error::Error;
	use std::io::Write;

	struct TempDir(std::path::PathBuf);

	impl TempDir {
		fn new(name: &'static str) -> TempDir {
			env_logger::try_init().ok();
			let mut path = std::env::temp_dir();
			path.push("oleg-db-test");
			path.push("aol");
			path.push(name);

			if path.exists() {
				std::fs::remove_dir_all(&path).unwrap();
			}
			std::fs::create_dir_all(&path).unwrap();
			TempDir(path)
		}

		fn file(&self) -> std::path::PathBuf {
			self.0.join("store.aol")
		}
	}

	impl Drop for TempDir {
		fn drop(&mut self) {
			if self.0.exists() {
				std::fs::remove_dir_all(&self.0).unwrap();
			}
		}
	}

	fn value(size: usize) -> Vec<u8> {
		use rand::RngCore;
		let mut result = vec![0u8; size];
		rand::thread_rng().fill_bytes(&mut result);
		result
	}

	#[test]
	fn round_trip() {
		let dir = TempDir::new("round_trip");
		let val = value(300);
		{
			let mut writer = AolWriter::open(&dir.file(), false).unwrap();
			writer.append_put(b"a", b"1", b"text/plain").unwrap();
			writer.append_delete(b"a").unwrap();
			writer.append_put(b"b", &val, b"application/octet-stream").unwrap();
		}

		let mut reader = AolReader::open(&dir.file()).unwrap();
		assert_eq!(
			reader.next().unwrap().unwrap(),
			AolCommand::Put {
				key: b"a".to_vec(),
				value: b"1".to_vec(),
				content_type: b"text/plain".to_vec(),
			},
		);
		assert_eq!(
			reader.next().unwrap().unwrap(),
			AolCommand::Delete { key: b"a".to_vec() },
		);
		assert_eq!(
			reader.next().unwrap().unwrap(),
			AolCommand::Put {
				key: b"b".to_vec(),
				value: val,
				content_type: b"application/octet-stream".to_vec(),
			},
		);
		assert!(reader.next().unwrap().is_none());
	}

	#[test]
	fn empty_values_round_trip() {
		let dir = TempDir::new("empty_values_round_trip");
		{
			let mut writer = AolWriter::open(&dir.file(), false).unwrap();
			writer.append_put(b"", b"", b"application/octet-stream").unwrap();
		}
		let mut reader = AolReader::open(&dir.file()).unwrap();
		assert_eq!(
			reader.next().unwrap().unwrap(),
			AolCommand::Put {
				key: Vec::new(),
				value: Vec::new(),
				content_type: b"application/octet-stream".to_vec(),
			},
		);
		assert!(reader.next().unwrap().is_none());
	}

	#[test]
	fn empty_log() {
		let dir = TempDir::new("empty_log");
		std::fs::File::create(dir.file()).unwrap();
		let mut reader = AolReader::open(&dir.file()).unwrap();
		assert!(reader.next().unwrap().is_none());
	}

	#[test]
	fn torn_tail_detected() {
		let dir = TempDir::new("torn_tail_detected");
		{
			let mut writer = AolWriter::open(&dir.file(), false).unwrap();
			writer.append_put(b"a", b"1", b"text/plain").unwrap();
			writer.append_put(b"b", b"2", b"text/plain").unwrap();
		}
		// A torn third command: type byte and a partial length.
		let mut file = std::fs::OpenOptions::new().append(true).open(dir.file()).unwrap();
		file.write_all(&[1, 5, 0]).unwrap();
		drop(file);

		let mut reader = AolReader::open(&dir.file()).unwrap();
		assert!(reader.next().unwrap().is_some());
		assert!(reader.next().unwrap().is_some());
		match reader.next() {
			Err(Error::Corruption(_)) => (),
			other => panic!("Expected corruption, got {:?}", other.map(|_| ())),
		}
	}

	#[test]
	fn flipped_byte_fails_checksum() {
		let dir = TempDir::new("flipped_byte_fails_checksum");
		{
			let mut writer = AolWriter::open(&dir.file(), false).unwrap();
			writer.append_put(b"key", b"value", b"text/plain").unwrap();
		}
		let mut bytes = std::fs::read(dir.file()).unwrap();
		let at = bytes.len() / 2;
		bytes[at] ^= 0xff;
		std::fs::write(dir.file(), &bytes).unwrap();

		let mut reader = AolReader::open(&dir.file()).unwrap();
		match reader.next() {
			Err(Error::Corruption(_)) => (),
			other => panic!("Expected corruption, got {:?}", other.map(|_| ())),
		}
	}

	#[test]
	fn oversized_length_field_detected() {
		let dir = TempDir::new("oversized_length_field_detected");
		// A delete frame claiming a key far past the end of the file.
		let mut frame = vec![2u8];
		frame.extend_from_slice(&100u32.to_le_bytes());
		frame.extend_from_slice(b"short");
		std::fs::write(dir.file(), &frame).unwrap();

		let mut reader = AolReader::open(&dir.file()).unwrap();
		match reader.next() {
			Err(Error::Corruption(_)) => (),
			other => panic!("Expected corruption, got {:?}", other.map(|_| ())),
		}
	}
}
