//! ANS-104 tags: an ordered sequence of name/value byte strings.
//!
//! Wire form inside the `tags(numTagsBytes)` section of the envelope is a
//! length-prefixed list: for each tag, a little-endian `u32` name length,
//! the name bytes, a little-endian `u32` value length, then the value bytes.

use serde::{Deserialize, Serialize};

use crate::ans104::EnvelopeError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn decode_list(buf: &[u8], expected_count: u64) -> Result<Vec<Tag>, EnvelopeError> {
        let mut tags = Vec::with_capacity(expected_count as usize);
        let mut cursor = 0usize;
        while cursor < buf.len() {
            let name = read_length_prefixed(buf, &mut cursor)?;
            let value = read_length_prefixed(buf, &mut cursor)?;
            tags.push(Tag {
                name: String::from_utf8_lossy(&name).into_owned(),
                value: String::from_utf8_lossy(&value).into_owned(),
            });
        }
        if cursor != buf.len() {
            return Err(EnvelopeError::TagsUnderrun);
        }
        if tags.len() as u64 != expected_count {
            return Err(EnvelopeError::TagsOverrun {
                declared: expected_count,
            });
        }
        Ok(tags)
    }

    pub fn encode_list(tags: &[Tag]) -> Vec<u8> {
        let mut buf = Vec::new();
        for tag in tags {
            write_length_prefixed(&mut buf, tag.name.as_bytes());
            write_length_prefixed(&mut buf, tag.value.as_bytes());
        }
        buf
    }

    /// The tag's value, if the tag's name matches (case-sensitive, as ANS-104 requires).
    pub fn find<'a>(tags: &'a [Tag], name: &str) -> Option<&'a str> {
        tags.iter()
            .find(|tag| tag.name == name)
            .map(|tag| tag.value.as_str())
    }
}

fn read_length_prefixed(buf: &[u8], cursor: &mut usize) -> Result<Vec<u8>, EnvelopeError> {
    if *cursor + 4 > buf.len() {
        return Err(EnvelopeError::TagsUnderrun);
    }
    let len = u32::from_le_bytes(buf[*cursor..*cursor + 4].try_into().unwrap()) as usize;
    *cursor += 4;
    if *cursor + len > buf.len() {
        return Err(EnvelopeError::TagsUnderrun);
    }
    let value = buf[*cursor..*cursor + len].to_vec();
    *cursor += len;
    Ok(value)
}

fn write_length_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_tags() {
        let tags = vec![
            Tag::new("Content-Type", "text/plain"),
            Tag::new("App-Name", "permaweb-gateway"),
        ];
        let encoded = Tag::encode_list(&tags);
        let decoded = Tag::decode_list(&encoded, tags.len() as u64).unwrap();
        assert_eq!(tags, decoded);
    }

    #[test]
    fn find_looks_up_by_name() {
        let tags = vec![Tag::new("Content-Type", "application/json")];
        assert_eq!(Tag::find(&tags, "Content-Type"), Some("application/json"));
        assert_eq!(Tag::find(&tags, "Missing"), None);
    }
}
