//! [`StringArray`] is the [`BytesArray`] of the utf8 `str`

use snafu::ResultExt;

use super::binary::{BytesArray, BytesValue};
use super::{InvalidUtf8Snafu, Result};
use crate::private::Sealed;
use crate::types::{LogicalType, PhysicalType};

/// Array of the variable length utf8 strings
pub type StringArray = BytesArray<str>;

impl Sealed for str {}

impl BytesValue for str {
    const PHYSICAL_TYPE: PhysicalType = PhysicalType::String;
    const LOGICAL_TYPE: LogicalType = LogicalType::VarChar;
    const ARRAY_NAME: &'static str = "StringArray";

    #[inline]
    fn as_bytes(&self) -> &[u8] {
        self.as_bytes()
    }

    #[inline]
    fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        std::str::from_utf8(bytes).context(InvalidUtf8Snafu)
    }

    #[inline]
    unsafe fn from_bytes_unchecked(bytes: &[u8]) -> &Self {
        unsafe { std::str::from_utf8_unchecked(bytes) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::array::{Array, ArenaSerde, PlainArray};
    use expect_test::expect;

    #[test]
    fn test_string_array() {
        let array = StringArray::from_iter([Some("curvature"), None, Some("数据")]);
        expect![[r#"StringArray { logical_type: VarChar, len: 3, data: [Some("curvature"), None, Some("数据")] }"#]]
            .assert_eq(&format!("{array:?}"));
        assert_eq!(array.get(2), Some("数据"));
        assert_eq!(array.data_at(0), b"curvature");
    }

    #[test]
    fn test_insert_invalid_utf8() {
        let mut array = StringArray::default();
        let err = array.insert_data(&[0xff, 0xfe]).unwrap_err();
        expect!["Data inserted into the StringArray is not valid utf8"].assert_eq(&err.to_string());
        assert!(array.is_empty());
    }

    #[test]
    fn test_arena_serde() {
        let arena = Arena::new();
        let array = StringArray::from_iter([Some(""), Some("ok")]);
        let mut dest = StringArray::default();
        for index in 0..array.len() {
            let bytes = array.serialize_value_into_arena(index, &arena).unwrap();
            assert_eq!(dest.deserialize_and_insert_from_arena(bytes).unwrap(), bytes.len());
        }
        assert_eq!(dest.iter().collect::<Vec<_>>(), [Some(""), Some("ok")]);
        assert_eq!(arena.used_bytes(), 8 + 10);
    }
}
