//! Binary format of the aggregation states
//!
//! - var uint: LEB128, 7 bits per byte, low groups first. A `u64` takes at most
//!   10 bytes
//!
//! - binary: fixed width little-endian bytes of the primitive types
//!
//! - string binary: var uint length followed by the raw bytes

use std::io::{ErrorKind, Read, Write};

use data_block::arena::{Arena, ArenaError};
use data_block::types::PrimitiveType;
use snafu::{ResultExt, Snafu, ensure};

/// Max number of bytes of a var uint
pub const MAX_VAR_UINT_SIZE: usize = 10;

/// Max length of the string that can be read from the input, 1GiB
pub const MAX_STRING_SIZE: u64 = 0x4000_0000;

/// Strings with length larger than it are not read into the arena directly
pub const DIRECT_READ_SIZE: u64 = 4096;

/// Max width of the primitive types
const MAX_BINARY_WIDTH: usize = 16;

#[allow(missing_docs)]
/// Error returned by reading/writing the binary format
#[derive(Debug, Snafu)]
pub enum IoError {
    #[snafu(display("Unexpected end of the input, failed to read `{expected}` bytes"))]
    UnexpectedEof { expected: usize },
    #[snafu(display("Var uint in the input has more than {MAX_VAR_UINT_SIZE} bytes or overflows u64"))]
    VarUIntOverflow,
    #[snafu(display("Too large string size: `{len}`, the maximum is `{max}`"))]
    StringTooLarge { len: u64, max: u64 },
    #[snafu(display("Failed to read/write the binary format"))]
    Io { source: std::io::Error },
    #[snafu(display("Failed to allocate the string in the arena"))]
    Arena { source: ArenaError },
}

type Result<T> = std::result::Result<T, IoError>;

#[inline]
fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => UnexpectedEofSnafu {
            expected: buf.len(),
        }
        .fail(),
        Err(e) => Err(e).context(IoSnafu),
    }
}

/// Write the var uint to the writer
pub fn write_var_uint<W: Write>(mut value: u64, writer: &mut W) -> Result<()> {
    let mut buf = [0_u8; MAX_VAR_UINT_SIZE];
    let mut len = 0;
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf[len] = byte;
            len += 1;
            break;
        }
        buf[len] = byte | 0x80;
        len += 1;
    }
    writer.write_all(&buf[..len]).context(IoSnafu)
}

/// Read the var uint from the reader
pub fn read_var_uint<R: Read>(reader: &mut R) -> Result<u64> {
    let mut value = 0_u64;
    for i in 0..MAX_VAR_UINT_SIZE {
        let mut byte = [0_u8];
        read_exact(reader, &mut byte)?;
        let byte = byte[0];
        if i == MAX_VAR_UINT_SIZE - 1 {
            // Only the lowest bit of the last group fits into u64
            ensure!(byte <= 1, VarUIntOverflowSnafu);
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    unreachable!("The last byte of the var uint is checked in the loop")
}

/// Write the primitive value as little-endian bytes
pub fn write_binary<T: PrimitiveType, W: Write>(value: T, writer: &mut W) -> Result<()> {
    let mut buf = [0_u8; MAX_BINARY_WIDTH];
    value.write_le(&mut buf);
    writer.write_all(&buf[..T::WIDTH]).context(IoSnafu)
}

/// Read the primitive value from the little-endian bytes
pub fn read_binary<T: PrimitiveType, R: Read>(reader: &mut R) -> Result<T> {
    let mut buf = [0_u8; MAX_BINARY_WIDTH];
    read_exact(reader, &mut buf[..T::WIDTH])?;
    Ok(T::read_le(&buf))
}

/// Write the bytes with var uint length prefix
pub fn write_string_binary<W: Write>(bytes: &[u8], writer: &mut W) -> Result<()> {
    write_var_uint(bytes.len() as u64, writer)?;
    writer.write_all(bytes).context(IoSnafu)
}

/// Read the bytes with var uint length prefix into the arena. The returned bytes
/// are the most recent allocation of the arena. If reading fails, the arena does
/// not hold the partial bytes
///
/// Strings that are not larger than [`DIRECT_READ_SIZE`] are read into the arena
/// directly. Larger strings are read into a scratch buffer that grows with the
/// bytes actually read, such that a corrupted length can not make the arena
/// allocate memory the input does not have
pub fn read_string_binary_into<'a, R: Read>(reader: &mut R, arena: &'a Arena) -> Result<&'a [u8]> {
    let len = read_var_uint(reader)?;
    ensure!(
        len <= MAX_STRING_SIZE,
        StringTooLargeSnafu {
            len,
            max: MAX_STRING_SIZE
        }
    );

    if len <= DIRECT_READ_SIZE {
        let buf = arena.alloc_zeroed(len as usize).context(ArenaSnafu)?;
        if let Err(e) = read_exact(reader, buf) {
            // SAFETY: buf is the most recent allocation and it is not used anymore
            unsafe { arena.rollback(buf) };
            return Err(e);
        }
        return Ok(buf);
    }

    let mut scratch = Vec::with_capacity(DIRECT_READ_SIZE as usize);
    reader
        .take(len)
        .read_to_end(&mut scratch)
        .context(IoSnafu)?;
    ensure!(
        scratch.len() as u64 == len,
        UnexpectedEofSnafu {
            expected: len as usize
        }
    );
    arena.insert(&scratch).context(ArenaSnafu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    fn var_uint_bytes(value: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        write_var_uint(value, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_var_uint_encoding() {
        assert_eq!(var_uint_bytes(0), [0x00]);
        assert_eq!(var_uint_bytes(127), [0x7f]);
        assert_eq!(var_uint_bytes(128), [0x80, 0x01]);
        assert_eq!(var_uint_bytes(300), [0xac, 0x02]);
        assert_eq!(
            var_uint_bytes(u64::MAX),
            [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01]
        );

        for value in [0, 1, 127, 128, 16383, 16384, 0xFF_FFFF, u64::MAX] {
            let bytes = var_uint_bytes(value);
            assert_eq!(read_var_uint(&mut bytes.as_slice()).unwrap(), value);
        }
    }

    #[test]
    fn test_read_invalid_var_uint() {
        let err = read_var_uint(&mut [0x80_u8].as_slice()).unwrap_err();
        expect!["Unexpected end of the input, failed to read `1` bytes"]
            .assert_eq(&err.to_string());

        let err = read_var_uint(&mut [0xff_u8; 10].as_slice()).unwrap_err();
        expect!["Var uint in the input has more than 10 bytes or overflows u64"]
            .assert_eq(&err.to_string());
    }

    #[test]
    fn test_binary() {
        let mut buf = Vec::new();
        write_binary(-2_i32, &mut buf).unwrap();
        write_binary(1.5_f64, &mut buf).unwrap();
        assert_eq!(buf[..4], [0xfe, 0xff, 0xff, 0xff]);

        let mut reader = buf.as_slice();
        assert_eq!(read_binary::<i32, _>(&mut reader).unwrap(), -2);
        assert_eq!(read_binary::<f64, _>(&mut reader).unwrap(), 1.5);
        assert!(matches!(
            read_binary::<u16, _>(&mut reader),
            Err(IoError::UnexpectedEof { expected: 2 })
        ));
    }

    #[test]
    fn test_string_binary() {
        let arena = Arena::new();
        let mut buf = Vec::new();
        write_string_binary(b"hello", &mut buf).unwrap();
        write_string_binary(b"", &mut buf).unwrap();
        assert_eq!(buf, b"\x05hello\x00");

        let mut reader = buf.as_slice();
        assert_eq!(read_string_binary_into(&mut reader, &arena).unwrap(), b"hello");
        assert_eq!(read_string_binary_into(&mut reader, &arena).unwrap(), b"");
        assert_eq!(arena.used_bytes(), 5);
    }

    #[test]
    fn test_truncated_string_is_rolled_back() {
        let arena = Arena::new();
        let err = read_string_binary_into(&mut b"\x05hel".as_slice(), &arena).unwrap_err();
        expect!["Unexpected end of the input, failed to read `5` bytes"]
            .assert_eq(&err.to_string());
        assert_eq!(arena.used_bytes(), 0);
    }

    #[test]
    fn test_large_string_binary() {
        let arena = Arena::new();
        let value = vec![7_u8; DIRECT_READ_SIZE as usize + 1];
        let mut buf = Vec::new();
        write_string_binary(&value, &mut buf).unwrap();
        assert_eq!(read_string_binary_into(&mut buf.as_slice(), &arena).unwrap(), value);
        assert_eq!(arena.used_bytes(), value.len());
    }

    #[test]
    fn test_truncated_huge_string_does_not_allocate() {
        let arena = Arena::new();
        let mut buf = Vec::new();
        write_var_uint(MAX_STRING_SIZE, &mut buf).unwrap();
        buf.extend_from_slice(b"ab");

        let err = read_string_binary_into(&mut buf.as_slice(), &arena).unwrap_err();
        expect!["Unexpected end of the input, failed to read `1073741824` bytes"]
            .assert_eq(&err.to_string());
        assert_eq!(arena.used_bytes(), 0);
        assert!(arena.allocated_bytes() < 1024 * 1024);
    }

    #[test]
    fn test_string_too_large() {
        let arena = Arena::new();
        let mut buf = Vec::new();
        write_var_uint(MAX_STRING_SIZE + 1, &mut buf).unwrap();
        let err = read_string_binary_into(&mut buf.as_slice(), &arena).unwrap_err();
        expect!["Too large string size: `1073741825`, the maximum is `1073741824`"]
            .assert_eq(&err.to_string());
    }

    #[test]
    fn test_string_out_of_memory() {
        let arena = Arena::with_allocation_limit(0);
        let err = read_string_binary_into(&mut b"\x03abc".as_slice(), &arena).unwrap_err();
        assert!(matches!(err, IoError::Arena { .. }));
    }
}
