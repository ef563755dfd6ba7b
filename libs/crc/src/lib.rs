// This file is part of Reliquary.
//
// Reliquary is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Reliquary is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Reliquary.  If not, see <http://www.gnu.org/licenses/>.

// IEEE 802.3 CRC32 plus the forger: CRC32 over GF(2) is affine, so a
// 4-byte window anywhere in a buffer can be solved exactly to force any
// final value. The backward pass runs the table recurrence in reverse
// from the tail; the solve recovers the four table indices pinned by the
// required state and picks the bytes that realize them.

use anyhow::{ensure, Result};
use once_cell::sync::Lazy;

const POLYNOMIAL: u32 = 0xEDB8_8320;

static FORWARD: Lazy<[u32; 256]> = Lazy::new(|| {
    let mut table = [0u32; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let mut crc = i as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLYNOMIAL
            } else {
                crc >> 1
            };
        }
        *entry = crc;
    }
    table
});

// The high bytes of FORWARD are a permutation of 0..=255; this inverts it.
static INVERSE: Lazy<[u8; 256]> = Lazy::new(|| {
    let mut table = [0u8; 256];
    for (i, entry) in FORWARD.iter().enumerate() {
        table[(entry >> 24) as usize] = i as u8;
    }
    table
});

#[inline]
fn step(state: u32, byte: u8) -> u32 {
    (state >> 8) ^ FORWARD[((state ^ byte as u32) & 0xFF) as usize]
}

#[inline]
fn unstep(state: u32, byte: u8) -> u32 {
    let index = INVERSE[(state >> 24) as usize] as u32;
    ((state ^ FORWARD[index as usize]) << 8) | (index ^ byte as u32)
}

/// Chainable CRC32. `crc32(0, b)` is the standard one-shot value; feeding
/// a previous result back as the seed continues the stream, so CRCing
/// split buffers in order equals CRCing their concatenation.
pub fn crc32(seed: u32, bytes: &[u8]) -> u32 {
    let mut state = !seed;
    for &b in bytes {
        state = step(state, b);
    }
    !state
}

/// Rewrite the four bytes at `offset` so that `crc32(0, buf)` equals
/// `desired`. The solved bytes depend only on the buffer contents, the
/// offset and the target, never on host byte order.
pub fn crc_spoof_modify(
    buf: &mut [u8],
    offset: usize,
    desired: u32,
    print_progress: bool,
) -> Result<()> {
    ensure!(
        offset + 4 <= buf.len(),
        "spoof slot at {} escapes buffer of {} bytes",
        offset,
        buf.len()
    );

    // Forward state over everything before the slot.
    let mut forward = 0xFFFF_FFFFu32;
    for &b in &buf[..offset] {
        forward = step(forward, b);
    }

    // Required state at the end of the slot, found by running the tail
    // backwards from the target.
    let tail = &buf[offset + 4..];
    let mut backward = !desired;
    for (done, &b) in tail.iter().rev().enumerate() {
        backward = unstep(backward, b);
        if print_progress && done % (1 << 22) == 0 {
            print!("\rsolving checksum: {:3}%", done * 100 / tail.len().max(1));
        }
    }
    if print_progress {
        println!("\rsolving checksum: 100%");
    }

    // The four table indices between the two states are forced, high byte
    // by high byte; each chosen byte then realizes its index.
    let mut indices = [0u32; 4];
    let mut state = backward;
    for k in (0..4).rev() {
        let index = INVERSE[(state >> 24) as usize] as u32;
        indices[k] = index;
        state = (state ^ FORWARD[index as usize]) << 8;
    }
    let mut state = forward;
    for (k, &index) in indices.iter().enumerate() {
        buf[offset + k] = ((state ^ index) & 0xFF) as u8;
        state = (state >> 8) ^ FORWARD[index as usize];
    }
    debug_assert_eq!(state, backward);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Deterministic filler so the suite never touches a real RNG.
    struct Lcg(u64);

    impl Lcg {
        fn next_byte(&mut self) -> u8 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (self.0 >> 33) as u8
        }

        fn fill(&mut self, len: usize) -> Vec<u8> {
            (0..len).map(|_| self.next_byte()).collect()
        }
    }

    #[test]
    fn matches_the_check_value() {
        // The canonical IEEE 802.3 check string.
        assert_eq!(crc32(0, b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(0, b""), 0);
    }

    #[test]
    fn chaining_equals_concatenation() {
        let mut lcg = Lcg(7);
        let whole = lcg.fill(3000);
        let split = crc32(crc32(crc32(0, &whole[..5]), &whole[5..1777]), &whole[1777..]);
        assert_eq!(split, crc32(0, &whole));
    }

    #[test]
    fn spoof_forces_any_target() -> Result<()> {
        let mut lcg = Lcg(99);
        for (len, offset, desired) in [
            (4usize, 0usize, 0xDEAD_BEEFu32),
            (64, 0, 0x1234_5678),
            (64, 60, 0x0000_0000),
            (1021, 500, 0xFFFF_FFFF),
            (4096, 2048, 0x0BAD_F00D),
        ] {
            let mut buf = lcg.fill(len);
            crc_spoof_modify(&mut buf, offset, desired, false)?;
            assert_eq!(crc32(0, &buf), desired, "len {} offset {}", len, offset);
        }
        Ok(())
    }

    #[test]
    fn respoofing_restores_the_original_crc() -> Result<()> {
        let mut lcg = Lcg(3);
        let mut buf = lcg.fill(512);
        let original = crc32(0, &buf);
        crc_spoof_modify(&mut buf, 100, 0x5EED_CAFE, false)?;
        assert_eq!(crc32(0, &buf), 0x5EED_CAFE);
        crc_spoof_modify(&mut buf, 100, original, false)?;
        assert_eq!(crc32(0, &buf), original);
        Ok(())
    }

    #[test]
    fn slot_must_fit() {
        let mut buf = vec![0u8; 7];
        assert!(crc_spoof_modify(&mut buf, 4, 0, false).is_err());
        assert!(crc_spoof_modify(&mut buf, 3, 0, false).is_ok());
    }
}
