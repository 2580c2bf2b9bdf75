//! Deserialization helpers for records written by other clients, which emit
//! `null` for empty maps and lists and mix strings with numbers.

use serde::{Deserialize, Deserializer};

/// Treat an explicit `null` the same as a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
  One(String),
  Many(Vec<String>),
}

/// Accept either a `;`-separated string or a list of strings.
pub(crate) fn delimited_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
  D: Deserializer<'de>,
{
  let raw = Option::<OneOrMany>::deserialize(deserializer)?;
  let items = match raw {
    None => Vec::new(),
    Some(OneOrMany::One(s)) => s.split(';').map(str::to_string).collect(),
    Some(OneOrMany::Many(v)) => v,
  };
  Ok(
    items
      .into_iter()
      .map(|s| s.trim().to_string())
      .filter(|s| !s.is_empty())
      .collect(),
  )
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
  Number(u64),
  Text(String),
}

/// Accept a non-negative integer given either as a number or as a string.
pub(crate) fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
  D: Deserializer<'de>,
{
  match Option::<NumberOrText>::deserialize(deserializer)? {
    None => Ok(None),
    Some(NumberOrText::Number(n)) => Ok(Some(n)),
    Some(NumberOrText::Text(s)) if s.trim().is_empty() => Ok(None),
    Some(NumberOrText::Text(s)) => s
      .trim()
      .parse::<u64>()
      .map(Some)
      .map_err(serde::de::Error::custom),
  }
}
