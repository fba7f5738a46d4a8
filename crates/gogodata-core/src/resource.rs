//! Resource selectors.
//!
//! Selector format: `type1[name1].type2[name2]...typeN`
//!
//! Examples:
//! - `interactiveFrame` - a bare leaf resource
//! - `dataContext[Sensors].item` - items of a data context
//! - `dataContext[Sensors].collection[readings].caseCount`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Characters that cannot appear in a resource name.
const RESERVED: [char; 3] = ['[', ']', '.'];

/// One `type[name]` or bare `type` clause of a selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    kind: String,
    name: Option<String>,
}

impl Segment {
    /// A bare segment such as `item` or `interactiveFrame`.
    pub fn bare(kind: impl Into<String>) -> Result<Self, ResourceError> {
        let kind = kind.into();
        validate_kind(&kind)?;
        Ok(Self { kind, name: None })
    }

    /// A named segment such as `dataContext[Sensors]`.
    pub fn named(kind: impl Into<String>, name: impl Into<String>) -> Result<Self, ResourceError> {
        let kind = kind.into();
        let name = name.into();
        validate_kind(&kind)?;
        validate_name(&name)?;
        Ok(Self {
            kind,
            name: Some(name),
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}[{}]", self.kind, name),
            None => f.write_str(&self.kind),
        }
    }
}

/// A resource address in the host's document tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceSelector {
    segments: Vec<Segment>,
}

impl ResourceSelector {
    /// Start a selector with a bare leaf, e.g. `interactiveFrame`.
    pub fn leaf(kind: impl Into<String>) -> Result<Self, ResourceError> {
        Ok(Self {
            segments: vec![Segment::bare(kind)?],
        })
    }

    /// Start a selector with a named segment, e.g. `dataContext[abc]`.
    pub fn named(kind: impl Into<String>, name: impl Into<String>) -> Result<Self, ResourceError> {
        Ok(Self {
            segments: vec![Segment::named(kind, name)?],
        })
    }

    /// Shorthand for `dataContext[name]`.
    pub fn data_context(name: impl Into<String>) -> Result<Self, ResourceError> {
        Self::named("dataContext", name)
    }

    /// Append a named segment.
    pub fn child(mut self, kind: impl Into<String>, name: impl Into<String>) -> Result<Self, ResourceError> {
        self.segments.push(Segment::named(kind, name)?);
        Ok(self)
    }

    /// Append a bare segment.
    pub fn then(mut self, kind: impl Into<String>) -> Result<Self, ResourceError> {
        self.segments.push(Segment::bare(kind)?);
        Ok(self)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The kind of the last segment.
    pub fn leaf_kind(&self) -> &str {
        self.segments.last().map(Segment::kind).unwrap_or_default()
    }

    /// Flatten into a [`ParsedResource`].
    pub fn parsed(&self) -> ParsedResource {
        let mut parsed = ParsedResource::default();
        for segment in &self.segments {
            if let Some(name) = &segment.name {
                parsed.names.insert(segment.kind.clone(), name.clone());
            }
            parsed.kind = segment.kind.clone();
        }
        parsed
    }
}

impl fmt::Display for ResourceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for ResourceSelector {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ResourceError::Empty);
        }

        let segments = s
            .split('.')
            .map(|clause| match clause.split_once('[') {
                Some((kind, rest)) => {
                    let name = rest
                        .strip_suffix(']')
                        .ok_or_else(|| ResourceError::Malformed(clause.to_string()))?;
                    Segment::named(kind, name)
                }
                None => Segment::bare(clause),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { segments })
    }
}

impl TryFrom<String> for ResourceSelector {
    type Error = ResourceError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<&str> for ResourceSelector {
    type Error = ResourceError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ResourceSelector> for String {
    fn from(selector: ResourceSelector) -> Self {
        selector.to_string()
    }
}

/// A selector flattened into resource-type → resource-name pairs.
///
/// `dataContext[abc].collection[def].case` becomes
/// `{dataContext: "abc", collection: "def"}` with kind `case`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResource {
    /// The terminal resource kind.
    pub kind: String,
    /// Named segments keyed by resource type.
    pub names: BTreeMap<String, String>,
}

impl ParsedResource {
    pub fn get(&self, resource_type: &str) -> Option<&str> {
        self.names.get(resource_type).map(String::as_str)
    }
}

/// Leniently parse any selector string the host might send.
///
/// Segments that do not contain a `type[name]` clause are taken verbatim as
/// the terminal kind. Names are cut at the first `]`, so names containing
/// `.` or `]` are not recoverable here; use [`ResourceSelector`] to build
/// selectors.
pub fn parse_resource_selector(selector: &str) -> ParsedResource {
    let mut parsed = ParsedResource::default();
    for clause in selector.split('.') {
        match match_bracket(clause) {
            Some((kind, name)) => {
                parsed.names.insert(kind.to_string(), name.to_string());
                parsed.kind = kind.to_string();
            }
            None => parsed.kind = clause.to_string(),
        }
    }
    parsed
}

/// Find the first `word[name]` clause inside a segment.
fn match_bracket(clause: &str) -> Option<(&str, &str)> {
    let mut search_from = 0;
    while let Some(offset) = clause[search_from..].find('[') {
        let open = search_from + offset;
        let kind_start = clause[..open]
            .char_indices()
            .rev()
            .take_while(|(_, c)| is_kind_char(*c))
            .last()
            .map(|(i, _)| i);
        if let Some(kind_start) = kind_start {
            let rest = &clause[open + 1..];
            if let Some(close) = rest.find(']') {
                if close > 0 {
                    return Some((&clause[kind_start..open], &rest[..close]));
                }
            }
        }
        search_from = open + 1;
    }
    None
}

fn is_kind_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn validate_kind(kind: &str) -> Result<(), ResourceError> {
    if kind.is_empty() {
        return Err(ResourceError::EmptyKind);
    }
    if !kind.chars().all(is_kind_char) {
        return Err(ResourceError::InvalidKind(kind.to_string()));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), ResourceError> {
    if name.is_empty() {
        return Err(ResourceError::EmptyName);
    }
    if let Some(c) = name.chars().find(|c| RESERVED.contains(c)) {
        return Err(ResourceError::ReservedCharacter {
            name: name.to_string(),
            character: c,
        });
    }
    Ok(())
}

/// Error building or parsing a resource selector.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    #[error("resource selector cannot be empty")]
    Empty,
    #[error("resource type cannot be empty")]
    EmptyKind,
    #[error("resource type may only contain [A-Za-z0-9_-], got: {0}")]
    InvalidKind(String),
    #[error("resource name cannot be empty")]
    EmptyName,
    #[error("resource name {name:?} contains reserved character {character:?}")]
    ReservedCharacter { name: String, character: char },
    #[error("malformed resource clause: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_chain_with_leaf() {
        let parsed = parse_resource_selector("dataContext[abc].collection[def].case");
        assert_eq!(parsed.kind, "case");
        assert_eq!(parsed.get("dataContext"), Some("abc"));
        assert_eq!(parsed.get("collection"), Some("def"));
        assert_eq!(parsed.names.len(), 2);
    }

    #[test]
    fn parse_bare_leaf() {
        let parsed = parse_resource_selector("foo");
        assert_eq!(parsed.kind, "foo");
        assert!(parsed.names.is_empty());
    }

    #[test]
    fn parse_named_leaf_sets_type() {
        let parsed = parse_resource_selector("dataContextChangeNotice[Sensors]");
        assert_eq!(parsed.kind, "dataContextChangeNotice");
        assert_eq!(parsed.get("dataContextChangeNotice"), Some("Sensors"));
    }

    #[test]
    fn parse_wildcard_search() {
        let parsed = parse_resource_selector("dataContext[ctx].itemSearch[*]");
        assert_eq!(parsed.kind, "itemSearch");
        assert_eq!(parsed.get("itemSearch"), Some("*"));
    }

    #[test]
    fn parse_empty_brackets_is_bare() {
        let parsed = parse_resource_selector("a[].b");
        assert_eq!(parsed.kind, "b");
        assert!(parsed.names.is_empty());
    }

    #[test]
    fn build_item_selector() {
        let selector = ResourceSelector::data_context("GoGoBoard")
            .and_then(|s| s.then("item"))
            .unwrap();
        assert_eq!(selector.to_string(), "dataContext[GoGoBoard].item");
        assert_eq!(selector.leaf_kind(), "item");
    }

    #[test]
    fn builder_rejects_reserved_characters() {
        for name in ["a.b", "a[b", "a]b"] {
            let err = ResourceSelector::data_context(name).unwrap_err();
            assert!(matches!(err, ResourceError::ReservedCharacter { .. }), "{name}");
        }
    }

    #[test]
    fn strict_parse_rejects_unterminated_clause() {
        let err = "dataContext[abc".parse::<ResourceSelector>().unwrap_err();
        assert!(matches!(err, ResourceError::Malformed(_)));
    }

    #[test]
    fn strict_parse_matches_lenient_parse() {
        let text = "dataContext[abc].collection[def].attributeLocation[x]";
        let selector: ResourceSelector = text.parse().unwrap();
        assert_eq!(selector.to_string(), text);
        assert_eq!(selector.parsed(), parse_resource_selector(text));
    }

    #[test]
    fn serde_uses_wire_string() {
        let selector = ResourceSelector::leaf("interactiveFrame").unwrap();
        let json = serde_json::to_string(&selector).unwrap();
        assert_eq!(json, "\"interactiveFrame\"");
        let back: ResourceSelector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, selector);
    }
}
