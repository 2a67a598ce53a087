use serde::{Deserialize, Deserializer};

/// Deserialize a tri-state patch field: absent → `None` (via `#[serde(default)]`),
/// `null` → `Some(None)`, value → `Some(Some(v))`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
