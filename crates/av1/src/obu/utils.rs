use std::io;

use bytes_util::BitReader;

/// Read a little-endian variable-length integer.
/// AV1-Spec-2 - 4.10.5
///
/// Per the spec, conforming bitstreams produce values `<= (1 << 32) - 1`.
/// This function rejects values exceeding that limit.
pub fn read_leb128<T: io::Read>(reader: &mut BitReader<T>) -> io::Result<u64> {
    let mut result = 0;
    for i in 0..8 {
        let byte = reader.read_bits(8)?;
        result |= (byte & 0x7f) << (i * 7);
        if byte & 0x80 == 0 {
            break;
        }
    }
    if result > u32::MAX as u64 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "LEB128 value exceeds u32::MAX",
        ));
    }
    Ok(result)
}

/// Write a little-endian variable-length integer.
/// AV1-Spec-2 - 4.10.5
///
/// Returns the number of bytes written (1-8).
pub fn write_leb128<W: io::Write>(writer: &mut W, mut value: u64) -> io::Result<usize> {
    let mut bytes_written = 0;
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        writer.write_all(&[byte])?;
        bytes_written += 1;
        if value == 0 {
            break;
        }
    }
    Ok(bytes_written)
}

/// Returns the number of bytes needed to encode `value` as LEB128.
pub fn leb128_size(mut value: u64) -> usize {
    let mut size = 1;
    while value >= 0x80 {
        value >>= 7;
        size += 1;
    }
    size
}

/// Read a variable-length unsigned integer.
/// AV1-Spec-2 - 4.10.3
pub fn read_uvlc<T: io::Read>(reader: &mut BitReader<T>) -> io::Result<u64> {
    let mut leading_zeros = 0;
    while !reader.read_bit()? {
        leading_zeros += 1;
    }

    if leading_zeros >= 32 {
        return Ok((1 << 32) - 1);
    }

    let value = reader.read_bits(leading_zeros)?;
    Ok(value + (1 << leading_zeros) - 1)
}
