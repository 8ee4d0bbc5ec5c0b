use serde::de::{Error as DeError, Visitor};
use serde::{Deserializer, Serializer};

/// Serialises a node id as a plain string.
/// 將節點識別碼序列化為純字串。
pub fn serialize<S>(id: &str, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(id)
}

/// Deserialises a node id from either a JSON string or an integer.
/// Older analyzer revisions key patches numerically; the canonical
/// in-memory form is always the decimal string.
/// 從 JSON 字串或整數還原節點識別碼；舊版分析器以數字作為索引鍵，
/// 記憶體內一律正規化為十進位字串。
pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct IdVisitor;

    impl<'de> Visitor<'de> for IdVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer node id")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            Ok(v.to_string())
        }

        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            Ok(v)
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            Ok(v.to_string())
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            Ok(v.to_string())
        }

        fn visit_u128<E>(self, v: u128) -> Result<Self::Value, E>
        where
            E: DeError,
        {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(IdVisitor)
}
