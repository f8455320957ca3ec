//! Leaf matchers and boolean expression trees evaluated against request
//! attributes.
//!
//! Matchers are built once by the policy compiler and are read-only
//! afterwards. Evaluation never fails: a missing attribute, a non-numeric
//! value for a range or an unparsable address simply does not match.

use std::net::IpAddr;

use regex::{Regex, RegexBuilder};

use crate::authz::types::Attributes;

// ─── Leaf matchers ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum MatchKind {
    Exact(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
    /// Anchored at both ends at build time.
    Regex(Regex),
    /// `start` inclusive, `end` exclusive; `None` is unbounded.
    Range { start: i64, end: Option<i64> },
    Present,
    Cidr(CidrRange),
}

#[derive(Debug, Clone)]
pub struct Matcher {
    pub kind: MatchKind,
    pub invert: bool,
}

impl Matcher {
    pub fn new(kind: MatchKind) -> Self {
        Self {
            kind,
            invert: false,
        }
    }

    pub fn exact(value: impl Into<String>) -> Self {
        Self::new(MatchKind::Exact(value.into()))
    }

    pub fn prefix(value: impl Into<String>) -> Self {
        Self::new(MatchKind::Prefix(value.into()))
    }

    pub fn suffix(value: impl Into<String>) -> Self {
        Self::new(MatchKind::Suffix(value.into()))
    }

    pub fn contains(value: impl Into<String>) -> Self {
        Self::new(MatchKind::Contains(value.into()))
    }

    pub fn present() -> Self {
        Self::new(MatchKind::Present)
    }

    pub fn range(start: i64, end: Option<i64>) -> Self {
        Self::new(MatchKind::Range { start, end })
    }

    pub fn cidr(range: CidrRange) -> Self {
        Self::new(MatchKind::Cidr(range))
    }

    /// Compile a full-string regex matcher.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Self::regex_with_limit(pattern, None)
    }

    /// Compile a full-string regex matcher, bounding the compiled program
    /// size when `size_limit` is set.
    pub fn regex_with_limit(pattern: &str, size_limit: Option<usize>) -> Result<Self, regex::Error> {
        let anchored = format!("^(?:{pattern})$");
        let mut builder = RegexBuilder::new(&anchored);
        if let Some(limit) = size_limit {
            builder.size_limit(limit);
        }
        Ok(Self::new(MatchKind::Regex(builder.build()?)))
    }

    pub fn inverted(mut self) -> Self {
        self.invert = !self.invert;
        self
    }

    /// Test one attribute value; `None` means the key is absent.
    pub fn matches(&self, value: Option<&str>) -> bool {
        let Some(value) = value else {
            // Absence only satisfies an inverted presence check.
            return matches!(self.kind, MatchKind::Present) && self.invert;
        };

        let hit = match &self.kind {
            MatchKind::Exact(expected) => value == expected,
            MatchKind::Prefix(prefix) => value.starts_with(prefix.as_str()),
            MatchKind::Suffix(suffix) => value.ends_with(suffix.as_str()),
            MatchKind::Contains(needle) => value.contains(needle.as_str()),
            MatchKind::Regex(re) => re.is_match(value),
            MatchKind::Range { start, end } => match value.trim().parse::<i64>() {
                Ok(n) => n >= *start && end.map_or(true, |end| n < end),
                Err(_) => return false,
            },
            MatchKind::Present => true,
            MatchKind::Cidr(range) => match value.trim().parse::<IpAddr>() {
                Ok(ip) => range.contains(ip),
                Err(_) => return false,
            },
        };

        hit != self.invert
    }
}

// ─── CIDR ranges ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrRange {
    addr: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Returns `None` when the prefix length exceeds the address width.
    pub fn new(addr: IpAddr, prefix_len: u8) -> Option<Self> {
        let width = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix_len > width {
            return None;
        }
        Some(Self { addr, prefix_len })
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX
                    .checked_shl(32 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for CidrRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

// ─── Expressions ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Expression {
    /// Test the attribute stored under `key`.
    Leaf { key: String, matcher: Matcher },
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),
    Any,
}

impl Expression {
    pub fn leaf(key: impl Into<String>, matcher: Matcher) -> Self {
        Expression::Leaf {
            key: key.into(),
            matcher,
        }
    }

    pub fn negate(inner: Expression) -> Self {
        Expression::Not(Box::new(inner))
    }

    /// Evaluate left to right, short-circuiting `And`/`Or`.
    pub fn evaluate<A: Attributes + ?Sized>(&self, attrs: &A) -> bool {
        match self {
            Expression::Leaf { key, matcher } => matcher.matches(attrs.get(key)),
            Expression::And(children) => children.iter().all(|c| c.evaluate(attrs)),
            Expression::Or(children) => children.iter().any(|c| c.evaluate(attrs)),
            Expression::Not(inner) => !inner.evaluate(attrs),
            Expression::Any => true,
        }
    }

    /// Nesting depth of the tree; a leaf or `Any` has depth 1.
    pub fn depth(&self) -> usize {
        match self {
            Expression::Leaf { .. } | Expression::Any => 1,
            Expression::And(children) | Expression::Or(children) => {
                1 + children.iter().map(Expression::depth).max().unwrap_or(0)
            }
            Expression::Not(inner) => 1 + inner.depth(),
        }
    }
}
