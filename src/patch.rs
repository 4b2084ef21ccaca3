use serde::{Deserialize, Deserializer};

/// Keeps an explicit JSON `null` apart from a missing key for nullable columns:
/// missing → `None`, `null` → `Some(None)`, value → `Some(Some(v))`.
/// Pair with `#[serde(default, deserialize_with = "nullable")]`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
