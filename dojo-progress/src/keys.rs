//! Store key formats
//!
//! Current keys are scoped by course: `<ns>:<course>:<item>:status` and
//! `<ns>:<course>:<item>:code`. Legacy keys were global per item:
//! `sol_<item>_status` and `sol_<item>_code`. Legacy keys are only ever read
//! (and then deleted), never written.

const LEGACY_PREFIX: &str = "sol_";
const STATUS_SUFFIX: &str = "status";
const CODE_SUFFIX: &str = "code";

/// Which record a key holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Status,
    Code,
}

impl KeyKind {
    fn suffix(self) -> &'static str {
        match self {
            KeyKind::Status => STATUS_SUFFIX,
            KeyKind::Code => CODE_SUFFIX,
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            STATUS_SUFFIX => Some(KeyKind::Status),
            CODE_SUFFIX => Some(KeyKind::Code),
            _ => None,
        }
    }
}

/// A key decomposed into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    pub kind: KeyKind,
    /// `None` for legacy keys, which had no course scope
    pub course_id: Option<String>,
    pub item_id: String,
}

impl ParsedKey {
    pub fn is_legacy(&self) -> bool {
        self.course_id.is_none()
    }
}

/// Builds and parses keys for one namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyScheme {
    namespace: String,
}

impl KeyScheme {
    pub const DEFAULT_NAMESPACE: &'static str = "dojo";

    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn key(&self, kind: KeyKind, course_id: &str, item_id: &str) -> String {
        format!(
            "{}:{}:{}:{}",
            self.namespace,
            course_id,
            item_id,
            kind.suffix()
        )
    }

    pub fn legacy_key(&self, kind: KeyKind, item_id: &str) -> String {
        format!("{}{}_{}", LEGACY_PREFIX, item_id, kind.suffix())
    }

    pub fn status_key(&self, course_id: &str, item_id: &str) -> String {
        self.key(KeyKind::Status, course_id, item_id)
    }

    pub fn code_key(&self, course_id: &str, item_id: &str) -> String {
        self.key(KeyKind::Code, course_id, item_id)
    }

    /// Recognizes current keys of this namespace and legacy keys
    ///
    /// Returns `None` for anything else, including current keys that belong
    /// to another namespace.
    pub fn parse(&self, key: &str) -> Option<ParsedKey> {
        self.parse_current(key).or_else(|| Self::parse_legacy(key))
    }

    fn parse_current(&self, key: &str) -> Option<ParsedKey> {
        let rest = key
            .strip_prefix(self.namespace.as_str())?
            .strip_prefix(':')?;
        let (scoped, suffix) = rest.rsplit_once(':')?;
        let kind = KeyKind::from_suffix(suffix)?;
        let (course_id, item_id) = scoped.split_once(':')?;

        if course_id.is_empty() || item_id.is_empty() {
            return None;
        }

        Some(ParsedKey {
            kind,
            course_id: Some(course_id.to_string()),
            item_id: item_id.to_string(),
        })
    }

    fn parse_legacy(key: &str) -> Option<ParsedKey> {
        let rest = key.strip_prefix(LEGACY_PREFIX)?;
        let (item_id, suffix) = rest.rsplit_once('_')?;
        let kind = KeyKind::from_suffix(suffix)?;

        if item_id.is_empty() {
            return None;
        }

        Some(ParsedKey {
            kind,
            course_id: None,
            item_id: item_id.to_string(),
        })
    }
}

impl Default for KeyScheme {
    fn default() -> Self {
        Self::new(Self::DEFAULT_NAMESPACE)
    }
}
