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

// MurmurHash3, x86 32-bit variant. Used to assign keys to index slots.
// The seed is fixed: slot assignment must be identical for every process
// generation that replays the same log or dump.

use std::convert::TryInto;

pub const SEED: u32 = 0x4f4c_4547;

const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;

/// 32-bit fingerprint of `key` under the store seed.
pub fn key_hash(key: &[u8]) -> u32 {
	murmur3_x86_32(key, SEED)
}

fn murmur3_x86_32(data: &[u8], seed: u32) -> u32 {
	let mut h = seed;
	let mut chunks = data.chunks_exact(4);
	for chunk in &mut chunks {
		let k = u32::from_le_bytes(chunk.try_into().unwrap());
		h ^= mix(k);
		h = h.rotate_left(13);
		h = h.wrapping_mul(5).wrapping_add(0xe654_6b64);
	}

	let tail = chunks.remainder();
	if !tail.is_empty() {
		let mut k = 0u32;
		for (i, b) in tail.iter().enumerate() {
			k |= (*b as u32) << (8 * i);
		}
		h ^= mix(k);
	}

	h ^= data.len() as u32;
	fmix32(h)
}

#[inline]
fn mix(mut k: u32) -> u32 {
	k = k.wrapping_mul(C1);
	k = k.rotate_left(15);
	k.wrapping_mul(C2)
}

#[inline]
fn fmix32(mut h: u32) -> u32 {
	h ^= h >> 16;
	h = h.wrapping_mul(0x85eb_ca6b);
	h ^= h >> 13;
	h = h.wrapping_mul(0xc2b2_ae35);
	h ^= h >> 16;
	h
}

#[cfg(test)]
mod test {
	use super::murmur3_x86_32;

	#[test]
	fn reference_vectors() {
		// Published MurmurHash3 x86/32 verification values.
		assert_eq!(murmur3_x86_32(b"", 0), 0);
		assert_eq!(murmur3_x86_32(b"", 1), 0x514e_28b7);
		assert_eq!(murmur3_x86_32(b"", 0xffff_ffff), 0x81f1_6f39);
		assert_eq!(murmur3_x86_32(&[0, 0, 0, 0], 0), 0x2362_f9de);
		assert_eq!(murmur3_x86_32(b"Hello, world!", 0x9747_b28c), 0x2488_4cba);
		assert_eq!(
			murmur3_x86_32(b"The quick brown fox jumps over the lazy dog", 0x9747_b28c),
			0x2fa8_26cd,
		);
	}

	#[test]
	fn tail_lengths() {
		// Distinct results for every unaligned tail size.
		let hashes: Vec<u32> = (1..=4).map(|n| murmur3_x86_32(&b"abcd"[..n], 0)).collect();
		for (i, a) in hashes.iter().enumerate() {
			for b in &hashes[i + 1..] {
				assert_ne!(a, b);
			}
		}
	}

	#[test]
	fn seed_changes_hash() {
		assert_ne!(murmur3_x86_32(b"key", 1), murmur3_x86_32(b"key", 2));
	}
}
