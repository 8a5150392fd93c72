//! Snapshot Entries
//!
//! The server serializes the state of every Resource Cell into an ordered
//! list of `{ key, state, payload }` entries embedded in the document. The
//! client feeds the list to the store before any data function runs, and
//! each entry is consumed at most once.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Serialized state of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotState {
    Pending,
    Ready,
    Errored,
}

/// One serialized cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// String form of the cell key.
    pub key: String,
    pub state: SnapshotState,
    /// The value for `ready`, the `ResourceError` for `errored`, null for `pending`.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl SnapshotEntry {
    /// Entry for a cell holding a value.
    pub fn ready(key: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            state: SnapshotState::Ready,
            payload,
        }
    }

    /// Entry for a cell holding an error.
    pub fn errored(key: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            state: SnapshotState::Errored,
            payload,
        }
    }

    /// Entry for a cell that never settled.
    pub fn pending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            state: SnapshotState::Pending,
            payload: serde_json::Value::Null,
        }
    }
}

/// Ordered list of snapshot entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    pub fn new(entries: Vec<SnapshotEntry>) -> Self {
        Self { entries }
    }

    /// Entries in cell creation order.
    pub fn entries(&self) -> &[SnapshotEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<SnapshotEntry> {
        self.entries
    }

    /// Entry for `key`, if captured.
    pub fn get(&self, key: &str) -> Option<&SnapshotEntry> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no cell was captured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize as a JSON array of entries.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the output of [`Snapshot::to_json`].
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Render as a JSON script element for the initial document.
    ///
    /// `<`, `>` and `&` are escaped so payload text can never close the
    /// element early.
    pub fn to_script_tag(&self, id: &str) -> Result<String> {
        let json = self.to_json()?;
        let body = json
            .replace('&', "\\u0026")
            .replace('<', "\\u003c")
            .replace('>', "\\u003e");
        Ok(format!(
            r#"<script id="{}" type="application/json">{}</script>"#,
            id, body
        ))
    }

    /// Parse the text content of the script element written by
    /// [`Snapshot::to_script_tag`].
    pub fn from_script_body(body: &str) -> Result<Self> {
        Self::from_json(body.trim())
    }
}

impl FromIterator<SnapshotEntry> for Snapshot {
    fn from_iter<I: IntoIterator<Item = SnapshotEntry>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for Snapshot {
    type Item = SnapshotEntry;
    type IntoIter = std::vec::IntoIter<SnapshotEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_layout() {
        let snapshot = Snapshot::new(vec![
            SnapshotEntry::ready("a:x", json!({"name": "Harry"})),
            SnapshotEntry::pending("a:y"),
        ]);
        assert_eq!(
            snapshot.to_json().unwrap(),
            concat!(
                r#"[{"key":"a:x","state":"ready","payload":{"name":"Harry"}},"#,
                r#"{"key":"a:y","state":"pending","payload":null}]"#,
            )
        );
    }

    #[test]
    fn script_tag_escapes_markup() {
        let snapshot = Snapshot::new(vec![SnapshotEntry::ready(
            "a:x",
            json!("</script><script>alert(1)</script>"),
        )]);
        let tag = snapshot.to_script_tag("__route_data").unwrap();

        assert!(tag.starts_with(r#"<script id="__route_data" type="application/json">"#));
        assert_eq!(tag.matches("</script>").count(), 1);

        let body = tag
            .trim_start_matches(r#"<script id="__route_data" type="application/json">"#)
            .trim_end_matches("</script>");
        assert_eq!(Snapshot::from_script_body(body).unwrap(), snapshot);
    }

    #[test]
    fn missing_payload_defaults_to_null() {
        let snapshot = Snapshot::from_json(r#"[{"key":"k:d","state":"pending"}]"#).unwrap();
        assert_eq!(snapshot.get("k:d").unwrap().payload, serde_json::Value::Null);
    }
}
