//! 7-bit variable-length integer primitives.
//!
//! Each byte carries 7 payload bits, least-significant group first; the high
//! bit marks continuation. Signed values are zigzag-mapped first so small
//! negative ids (the `-1` sentinel in particular) stay one byte.

use girder_core::{Error, Result};
use std::io::{Read, Write};

/// Maximum encoded length of a u64 varint.
pub const MAX_VARINT_LEN: usize = 10;

/// Write a u64 as a 7-bit varint.
pub fn write_u64<W: Write>(out: &mut W, mut value: u64) -> Result<()> {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.write_all(&[byte])?;
            return Ok(());
        }
        out.write_all(&[byte | 0x80])?;
    }
}

/// Write a u32 as a 7-bit varint.
pub fn write_u32<W: Write>(out: &mut W, value: u32) -> Result<()> {
    write_u64(out, u64::from(value))
}

/// Write an i32 as a zigzag-mapped varint.
pub fn write_i32<W: Write>(out: &mut W, value: i32) -> Result<()> {
    write_u32(out, ((value << 1) ^ (value >> 31)) as u32)
}

/// Write an i64 as a zigzag-mapped varint.
pub fn write_i64<W: Write>(out: &mut W, value: i64) -> Result<()> {
    write_u64(out, ((value << 1) ^ (value >> 63)) as u64)
}

/// Read a u64 varint. More than ten bytes (or overflow) is corruption.
pub fn read_u64<R: Read>(input: &mut R, context: &str) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for _ in 0..MAX_VARINT_LEN {
        let byte = read_byte(input, context)?;
        value |= u64::from(byte & 0x7f)
            .checked_shl(shift)
            .ok_or_else(|| Error::Corruption(format!("varint overflow in {context}")))?;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
    Err(Error::Corruption(format!("varint too long in {context}")))
}

/// Read a u32 varint.
pub fn read_u32<R: Read>(input: &mut R, context: &str) -> Result<u32> {
    let value = read_u64(input, context)?;
    u32::try_from(value)
        .map_err(|_| Error::Corruption(format!("varint exceeds u32 range in {context}")))
}

/// Read a zigzag-mapped i32.
pub fn read_i32<R: Read>(input: &mut R, context: &str) -> Result<i32> {
    let value = read_u32(input, context)?;
    Ok((value >> 1) as i32 ^ -((value & 1) as i32))
}

/// Read a zigzag-mapped i64.
pub fn read_i64<R: Read>(input: &mut R, context: &str) -> Result<i64> {
    let value = read_u64(input, context)?;
    Ok((value >> 1) as i64 ^ -((value & 1) as i64))
}

fn read_byte<R: Read>(input: &mut R, context: &str) -> Result<u8> {
    let mut buf = [0u8; 1];
    match input.read_exact(&mut buf) {
        Ok(()) => Ok(buf[0]),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(Error::unexpected_eof(context))
        }
        Err(e) => Err(e.into()),
    }
}
