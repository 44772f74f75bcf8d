//! Inline annotation grammar.
//!
//! A message carries annotations as sigil-prefixed tokens:
//!
//! ```text
//! #key=value                    value runs to the next sigil, trimmed
//! #key='quoted value'           may contain the sigil and '='
//! #%type[:valueType]/key=value  typed user property
//! ```
//!
//! Parsing never fails. Tokens that do not match the grammar are skipped and
//! scanning resumes after their sigil.

use indexmap::IndexMap;
use logtrack_activity::{DataType, Property, PropertyValue};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::TrackError;

/// Annotation keys with a fixed meaning, matched case-insensitively.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::EnumString,
    strum::Display,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ReservedKey {
    /// Begin an activity
    Beg,
    /// End the current activity
    End,
    /// Application (source) name
    App,
    /// User
    Usr,
    /// Correlator
    Cid,
    Tag,
    /// Location
    Loc,
    /// Operation name
    Opn,
    /// Operation type
    Opt,
    /// Resource
    Rsn,
    /// Message data
    Msg,
    /// Severity
    Sev,
    /// Completion code
    Ccd,
    /// Reason code
    Rcd,
    /// Exception message
    Exc,
    /// Elapsed time, microseconds
    Elt,
    /// Message age, microseconds
    Age,
    /// Start time, microseconds since epoch
    Stt,
    /// End time, microseconds since epoch
    Ent,
}

impl ReservedKey {
    /// Keys whose presence matters even with an empty value.
    pub fn is_control(self) -> bool {
        matches!(self, ReservedKey::Beg | ReservedKey::End)
    }
}

/// One decoded token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAnnotation {
    pub key: String,
    pub value: String,
    pub data_type: Option<DataType>,
    pub value_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttrKey {
    Reserved(ReservedKey),
    /// Unrecognized key, case preserved
    User(String),
}

impl fmt::Display for AttrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrKey::Reserved(key) => write!(f, "{key}"),
            AttrKey::User(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Attribute {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
}

impl Attribute {
    /// Coerce to a typed property. Untyped attributes are strings.
    pub fn to_property(&self, name: &str) -> Result<Property, TrackError> {
        let data_type = self.data_type.unwrap_or(DataType::String);
        let value = PropertyValue::parse(data_type, &self.value)
            .map_err(|_| TrackError::invalid_value(name, &self.value, data_type))?;
        let property = Property::new(name, value);
        Ok(match &self.value_type {
            Some(value_type) => property.with_value_type(value_type.clone()),
            None => property,
        })
    }
}

/// Attributes of a single record: ambient context first, then message
/// annotations. The last occurrence of a key wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeMap {
    entries: IndexMap<AttrKey, Attribute>,
}

impl AttributeMap {
    pub fn parse(message: &str, sigil: char) -> Self {
        let mut attrs = Self::default();
        for annotation in tokenize(message, sigil) {
            attrs.insert(annotation);
        }
        attrs
    }

    /// Parse `message` on top of ambient context pairs. Context keys may use
    /// the typed `%type/key` form too.
    pub fn parse_with_context<I, K, V>(message: &str, sigil: char, context: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut attrs = Self::default();
        for (key, value) in context {
            if let Some(annotation) = decode_key(key.as_ref(), value.as_ref().trim()) {
                attrs.insert(annotation);
            }
        }
        for annotation in tokenize(message, sigil) {
            attrs.insert(annotation);
        }
        attrs
    }

    pub fn insert(&mut self, annotation: ParsedAnnotation) {
        let key = match annotation.data_type {
            Some(_) => AttrKey::User(annotation.key),
            None => match ReservedKey::from_str(&annotation.key) {
                Ok(reserved) => AttrKey::Reserved(reserved),
                Err(_) => AttrKey::User(annotation.key),
            },
        };

        let keep_empty = matches!(key, AttrKey::Reserved(k) if k.is_control());
        if annotation.value.is_empty() && !keep_empty {
            return;
        }

        self.entries.shift_remove(&key);
        self.entries.insert(
            key,
            Attribute {
                value: annotation.value,
                data_type: annotation.data_type,
                value_type: annotation.value_type,
            },
        );
    }

    pub fn get(&self, key: ReservedKey) -> Option<&str> {
        self.entries
            .get(&AttrKey::Reserved(key))
            .map(|attr| attr.value.as_str())
    }

    pub fn contains(&self, key: ReservedKey) -> bool {
        self.entries.contains_key(&AttrKey::Reserved(key))
    }

    pub fn user(&self, name: &str) -> Option<&Attribute> {
        self.entries.get(&AttrKey::User(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AttrKey, &Attribute)> {
        self.entries.iter()
    }

    /// Unrecognized attributes, in order of their last occurrence.
    pub fn user_attributes(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.entries.iter().filter_map(|(key, attr)| match key {
            AttrKey::User(name) => Some((name.as_str(), attr)),
            AttrKey::Reserved(_) => None,
        })
    }

    /// Typed properties for every unrecognized attribute.
    pub fn user_properties(&self) -> Result<Vec<Property>, TrackError> {
        self.user_attributes()
            .map(|(name, attr)| attr.to_property(name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for AttributeMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, attr) in &self.entries {
            map.serialize_entry(&key.to_string(), attr)?;
        }
        map.end()
    }
}

/// Split a message into annotations, in order of appearance.
pub fn tokenize(message: &str, sigil: char) -> Vec<ParsedAnnotation> {
    let mut annotations = Vec::new();
    let mut rest = message;
    while let Some(pos) = rest.find(sigil) {
        let token = &rest[pos + sigil.len_utf8()..];
        let (annotation, consumed) = parse_token(token, sigil);
        annotations.extend(annotation);
        rest = &token[consumed..];
    }
    annotations
}

/// Decode the token following a sigil. Returns the annotation (if well formed)
/// and how many bytes of `token` it consumed.
fn parse_token(token: &str, sigil: char) -> (Option<ParsedAnnotation>, usize) {
    let mut eq = None;
    for (i, c) in token.char_indices() {
        if c == '=' {
            eq = Some(i);
            break;
        }
        if c == sigil || c == '\'' || c.is_whitespace() {
            return (None, 0);
        }
    }
    let Some(eq) = eq else {
        return (None, 0);
    };

    let raw_key = &token[..eq];
    let after = &token[eq + 1..];

    let (value, consumed) = if let Some(quoted) = after.strip_prefix('\'') {
        match quoted.find('\'') {
            Some(close) => (&quoted[..close], eq + 1 + 1 + close + 1),
            // unterminated: drop the token, keep scanning inside it
            None => return (None, eq + 2),
        }
    } else {
        let end = after.find(sigil).unwrap_or(after.len());
        (after[..end].trim(), eq + 1 + end)
    };

    (decode_key(raw_key, value), consumed)
}

/// Split a raw key into name, data type and value type.
fn decode_key(raw_key: &str, value: &str) -> Option<ParsedAnnotation> {
    let Some(typed) = raw_key.strip_prefix('%') else {
        if raw_key.is_empty() {
            return None;
        }
        return Some(ParsedAnnotation {
            key: raw_key.to_string(),
            value: value.to_string(),
            data_type: None,
            value_type: None,
        });
    };

    let (type_spec, key) = typed.split_once('/')?;
    if key.is_empty() {
        return None;
    }
    let (data_type, value_type) = match type_spec.split_once(':') {
        Some((data_type, value_type)) => (data_type, Some(value_type)),
        None => (type_spec, None),
    };
    let data_type = DataType::from_str(data_type).ok()?;

    Some(ParsedAnnotation {
        key: key.to_string(),
        value: value.to_string(),
        data_type: Some(data_type),
        value_type: value_type
            .filter(|value_type| !value_type.is_empty())
            .map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn parse(message: &str) -> AttributeMap {
        AttributeMap::parse(message, '#')
    }

    #[test]
    fn test_plain_tokens() {
        let attrs = parse("saved #opn=save #rsn= order.json  #rcd=0");
        assert_eq!(attrs.get(ReservedKey::Opn), Some("save"));
        assert_eq!(attrs.get(ReservedKey::Rsn), Some("order.json"));
        assert_eq!(attrs.get(ReservedKey::Rcd), Some("0"));
        assert_eq!(attrs.len(), 3);
    }

    #[test]
    fn test_reserved_keys_ignore_case() {
        let attrs = parse("#OPN=save #Cid=abc");
        assert_eq!(attrs.get(ReservedKey::Opn), Some("save"));
        assert_eq!(attrs.get(ReservedKey::Cid), Some("abc"));
    }

    #[test]
    fn test_user_keys_keep_case() {
        let attrs = parse("#OrderNo=7");
        assert_eq!(attrs.user("OrderNo").map(|a| a.value.as_str()), Some("7"));
        assert!(attrs.user("orderno").is_none());
    }

    #[test]
    fn test_quoted_value() {
        let attrs = parse("#msg='total = 5 #items' #opn=sum");
        assert_eq!(attrs.get(ReservedKey::Msg), Some("total = 5 #items"));
        assert_eq!(attrs.get(ReservedKey::Opn), Some("sum"));
    }

    #[test]
    fn test_unterminated_quote_is_dropped() {
        let attrs = parse("#msg='never closed #opn=save");
        assert_eq!(attrs.get(ReservedKey::Msg), None);
        assert_eq!(attrs.get(ReservedKey::Opn), Some("save"));
    }

    #[test]
    fn test_malformed_tokens_are_skipped() {
        let attrs = parse("C# is fun #no value #=x #tag=ok # #");
        assert_eq!(attrs.get(ReservedKey::Tag), Some("ok"));
        assert_eq!(attrs.len(), 1);
    }

    #[test]
    fn test_empty_values_are_dropped_except_control_keys() {
        let attrs = parse("#rsn= #end= #beg=");
        assert!(!attrs.contains(ReservedKey::Rsn));
        assert_eq!(attrs.get(ReservedKey::End), Some(""));
        assert_eq!(attrs.get(ReservedKey::Beg), Some(""));
    }

    #[test]
    fn test_last_occurrence_wins() {
        let attrs = parse("#tag=a #TAG=b");
        assert_eq!(attrs.get(ReservedKey::Tag), Some("b"));
        assert_eq!(attrs.len(), 1);
    }

    #[test]
    fn test_typed_annotations() {
        let attrs = parse("#%l/orderNo=12345 #%d:currency/amount=9.5 #%x/bad=1 #%s/=1");
        assert_eq!(
            attrs.user("orderNo"),
            Some(&Attribute {
                value: "12345".to_string(),
                data_type: Some(DataType::Long),
                value_type: None,
            })
        );
        assert_eq!(
            attrs.user("amount"),
            Some(&Attribute {
                value: "9.5".to_string(),
                data_type: Some(DataType::Double),
                value_type: Some("currency".to_string()),
            })
        );
        assert_eq!(attrs.len(), 2);
    }

    #[test]
    fn test_typed_reserved_name_stays_a_property() {
        let attrs = parse("#%i/rcd=5");
        assert!(!attrs.contains(ReservedKey::Rcd));
        assert!(attrs.user("rcd").is_some());
    }

    #[test]
    fn test_message_overrides_context() {
        let attrs = AttributeMap::parse_with_context(
            "#usr=bob",
            '#',
            [("usr", "alice"), ("cid", "req-1"), ("%i/retries", "3")],
        );
        assert_eq!(attrs.get(ReservedKey::Usr), Some("bob"));
        assert_eq!(attrs.get(ReservedKey::Cid), Some("req-1"));
        assert_eq!(
            attrs.user("retries").and_then(|a| a.data_type),
            Some(DataType::Integer)
        );
    }

    #[test]
    fn test_custom_sigil() {
        let attrs = AttributeMap::parse("@opn=save #rsn=x @tag=t", '@');
        assert_eq!(attrs.get(ReservedKey::Opn), Some("save #rsn=x"));
        assert_eq!(attrs.get(ReservedKey::Tag), Some("t"));
    }

    #[test]
    fn test_user_properties() {
        let attrs = parse("#%l/orderNo=12345 #note=hello");
        let properties = attrs.user_properties().unwrap();
        assert_eq!(
            properties,
            vec![
                Property::new("orderNo", PropertyValue::Long(12345)),
                Property::new("note", PropertyValue::String("hello".to_string())),
            ]
        );

        let bad = parse("#%i/count=many").user_properties().unwrap_err();
        assert!(matches!(bad, TrackError::InvalidValue { ref key, .. } if key == "count"));
    }

    #[test]
    fn test_serializes_as_object() {
        let json = serde_json::to_string(&parse("#opn=save #%l/n=1")).unwrap();
        assert_eq!(
            json,
            r#"{"opn":{"value":"save"},"n":{"value":"1","data_type":"long"}}"#
        );
    }

    proptest! {
        #[test]
        fn quoted_values_are_preserved(value in "[a-zA-Z0-9 =#.,:/-]{1,40}") {
            let message = format!("before #msg='{value}' after");
            let attrs = AttributeMap::parse(&message, '#');
            prop_assert_eq!(attrs.get(ReservedKey::Msg), Some(value.as_str()));
        }

        #[test]
        fn parse_never_panics(message in "\\PC{0,80}") {
            let _ = AttributeMap::parse(&message, '#');
        }
    }
}
