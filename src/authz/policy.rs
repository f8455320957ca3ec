use serde_json::{Map, Value};
use std::net::IpAddr;

use crate::authz::errors::AuthzError;
use crate::authz::loader::CompileOptions;
use crate::authz::matcher::{CidrRange, Expression, Matcher};
use crate::authz::types::{
    Policy, DESTINATION_IP, DESTINATION_PORT, PATH, SOURCE_IP, SOURCE_PRINCIPAL,
};

/// Deepest rule nesting accepted from a document. Evaluation recurses once
/// per level, so this also bounds evaluation stack use.
pub const MAX_RULE_DEPTH: usize = 32;

/// Match kinds a `header` rule may carry, at most one per rule.
const HEADER_MATCH_KINDS: [&str; 8] = [
    "exact_match",
    "prefix_match",
    "suffix_match",
    "contains_match",
    "safe_regex_match",
    "range_match",
    "present_match",
    "string_match",
];

/// Which side of a policy a rule list describes. The two sides share leaf
/// kinds but spell their combinators differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleSide {
    Permissions,
    Principals,
}

impl RuleSide {
    fn field(self) -> &'static str {
        match self {
            RuleSide::Permissions => "permissions",
            RuleSide::Principals => "principals",
        }
    }

    /// (and, or, not, list field) keys for this side.
    fn combinators(self) -> (&'static str, &'static str, &'static str, &'static str) {
        match self {
            RuleSide::Permissions => ("and_rules", "or_rules", "not_rule", "rules"),
            RuleSide::Principals => ("and_ids", "or_ids", "not_id", "ids"),
        }
    }
}

/// Compile the `{ name, permissions, principals }` entry found at
/// `policies[index]`.
pub fn compile_policy(
    entry: &Value,
    index: usize,
    options: &CompileOptions,
) -> Result<Policy, AuthzError> {
    let fields = entry.as_object().ok_or_else(|| {
        AuthzError::InvalidDocument(format!(
            "policies[{index}]: policy entry must be an object, got `{entry}`"
        ))
    })?;

    let name = match fields.get("name") {
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        _ => {
            return Err(AuthzError::InvalidDocument(format!(
                "policies[{index}]: every policy entry needs a non-empty string `name`"
            )))
        }
    };

    let compiler = RuleCompiler {
        policy: &name,
        options,
    };
    let permissions = compiler.compile_side(RuleSide::Permissions, fields)?;
    let principals = compiler.compile_side(RuleSide::Principals, fields)?;

    Ok(Policy {
        name,
        permissions,
        principals,
    })
}

struct RuleCompiler<'a> {
    policy: &'a str,
    options: &'a CompileOptions,
}

impl RuleCompiler<'_> {
    /// A side is a non-empty list of rules, any of which may match.
    fn compile_side(
        &self,
        side: RuleSide,
        fields: &Map<String, Value>,
    ) -> Result<Expression, AuthzError> {
        let path = side.field();
        let rules = match fields.get(path) {
            Some(Value::Array(rules)) if !rules.is_empty() => rules,
            Some(Value::Array(_)) | None => {
                return Err(self.invalid(path, "at least one rule is required"));
            }
            Some(other) => {
                return Err(
                    self.invalid(path, format!("expected a list of rules, got `{other}`"))
                );
            }
        };
        self.compile_any_of(side, rules, path, 1)
    }

    fn compile_any_of(
        &self,
        side: RuleSide,
        rules: &[Value],
        path: &str,
        depth: usize,
    ) -> Result<Expression, AuthzError> {
        let mut compiled = rules
            .iter()
            .enumerate()
            .map(|(i, rule)| self.compile_rule(side, rule, &format!("{path}[{i}]"), depth))
            .collect::<Result<Vec<_>, _>>()?;
        if compiled.len() == 1 {
            return Ok(compiled.remove(0));
        }
        Ok(Expression::Or(compiled))
    }

    fn compile_rule(
        &self,
        side: RuleSide,
        rule: &Value,
        path: &str,
        depth: usize,
    ) -> Result<Expression, AuthzError> {
        if depth > MAX_RULE_DEPTH {
            return Err(self.invalid(
                path,
                format!("rules are nested deeper than {MAX_RULE_DEPTH} levels"),
            ));
        }

        let (kind, body) = single_entry(rule).ok_or_else(|| {
            self.invalid(path, "a rule must be an object with exactly one rule kind")
        })?;
        let path = format!("{path}.{kind}");
        let (and_key, or_key, not_key, list_key) = side.combinators();

        match kind {
            "any" => match body {
                Value::Bool(true) => Ok(Expression::Any),
                _ => Err(self.invalid(&path, "`any` must be `true`")),
            },
            k if k == and_key || k == or_key => {
                let list_path = format!("{path}.{list_key}");
                let children = match body.get(list_key) {
                    Some(Value::Array(children)) => children,
                    _ => return Err(self.invalid(&list_path, "expected a list of rules")),
                };
                let children = children
                    .iter()
                    .enumerate()
                    .map(|(i, child)| {
                        self.compile_rule(side, child, &format!("{list_path}[{i}]"), depth + 1)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if k == and_key {
                    Ok(Expression::And(children))
                } else {
                    Ok(Expression::Or(children))
                }
            }
            k if k == not_key => Ok(Expression::negate(self.compile_rule(
                side,
                body,
                &path,
                depth + 1,
            )?)),
            "header" => self.compile_header(body, &path),
            "url_path" if side == RuleSide::Permissions => {
                let matcher = match body.get("path") {
                    Some(spec) => self.compile_string_matcher(spec, &format!("{path}.path"))?,
                    None => return Err(self.invalid(&path, "missing `path` string matcher")),
                };
                Ok(Expression::leaf(PATH, matcher))
            }
            "destination_port" if side == RuleSide::Permissions => {
                let port = parse_integer(body)
                    .filter(|p| (0..=i64::from(u16::MAX)).contains(p))
                    .ok_or_else(|| AuthzError::InvalidRange {
                        policy: self.policy.to_string(),
                        path: path.clone(),
                        message: format!("`{body}` is not a port number"),
                    })?;
                Ok(Expression::leaf(
                    DESTINATION_PORT,
                    Matcher::range(port, Some(port + 1)),
                ))
            }
            "destination_ip" if side == RuleSide::Permissions => {
                Ok(Expression::leaf(DESTINATION_IP, self.compile_cidr(body, &path)?))
            }
            "authenticated" if side == RuleSide::Principals => {
                // Without a principal name any authenticated peer matches.
                let matcher = match body.get("principal_name") {
                    Some(spec) => {
                        self.compile_string_matcher(spec, &format!("{path}.principal_name"))?
                    }
                    None => Matcher::present(),
                };
                Ok(Expression::leaf(SOURCE_PRINCIPAL, matcher))
            }
            "source_ip" | "direct_remote_ip" | "remote_ip" if side == RuleSide::Principals => {
                Ok(Expression::leaf(SOURCE_IP, self.compile_cidr(body, &path)?))
            }
            other => Err(AuthzError::UnknownRuleKind {
                policy: self.policy.to_string(),
                path,
                kind: other.to_string(),
            }),
        }
    }

    /// `{ name, <match kind>, invert_match }` against one header. A rule
    /// with only a `name` tests presence.
    fn compile_header(&self, body: &Value, path: &str) -> Result<Expression, AuthzError> {
        let fields = body
            .as_object()
            .ok_or_else(|| self.invalid(path, "header rule must be an object"))?;
        let name = match fields.get("name") {
            Some(Value::String(name)) if !name.is_empty() => name,
            _ => return Err(self.invalid(path, "header rule needs a non-empty `name`")),
        };

        let mut kinds = Vec::new();
        for (key, value) in fields {
            match key.as_str() {
                "name" | "invert_match" => {}
                k if HEADER_MATCH_KINDS.contains(&k) => kinds.push((k, value)),
                other => {
                    return Err(AuthzError::UnknownRuleKind {
                        policy: self.policy.to_string(),
                        path: format!("{path}.{other}"),
                        kind: other.to_string(),
                    })
                }
            }
        }
        if kinds.len() > 1 {
            let names: Vec<&str> = kinds.iter().map(|(k, _)| *k).collect();
            return Err(self.invalid(
                path,
                format!("header rule has more than one match kind: {}", names.join(", ")),
            ));
        }

        let mut matcher = match kinds.first() {
            None => Matcher::present(),
            Some(&(kind, v)) => {
                let kind_path = format!("{path}.{kind}");
                match kind {
                    "exact_match" => Matcher::exact(self.string_value(v, &kind_path)?),
                    "prefix_match" => Matcher::prefix(self.string_value(v, &kind_path)?),
                    "suffix_match" => Matcher::suffix(self.string_value(v, &kind_path)?),
                    "contains_match" => Matcher::contains(self.string_value(v, &kind_path)?),
                    "safe_regex_match" => self.compile_regex(v, &kind_path)?,
                    "range_match" => self.compile_range(v, &kind_path)?,
                    "present_match" => match v {
                        Value::Bool(true) => Matcher::present(),
                        Value::Bool(false) => Matcher::present().inverted(),
                        _ => {
                            return Err(
                                self.invalid(&kind_path, "`present_match` must be a boolean")
                            )
                        }
                    },
                    _ => self.compile_string_matcher(v, &kind_path)?,
                }
            }
        };

        match fields.get("invert_match") {
            None | Some(Value::Bool(false)) => {}
            Some(Value::Bool(true)) => matcher = matcher.inverted(),
            Some(_) => return Err(self.invalid(path, "`invert_match` must be a boolean")),
        }

        Ok(Expression::leaf(name.clone(), matcher))
    }

    /// `{ exact | prefix | suffix | contains | safe_regex }`
    fn compile_string_matcher(&self, spec: &Value, path: &str) -> Result<Matcher, AuthzError> {
        let (kind, body) = single_entry(spec)
            .ok_or_else(|| self.invalid(path, "a string matcher has exactly one match kind"))?;
        let path = format!("{path}.{kind}");
        match kind {
            "exact" => Ok(Matcher::exact(self.string_value(body, &path)?)),
            "prefix" => Ok(Matcher::prefix(self.string_value(body, &path)?)),
            "suffix" => Ok(Matcher::suffix(self.string_value(body, &path)?)),
            "contains" => Ok(Matcher::contains(self.string_value(body, &path)?)),
            "safe_regex" => self.compile_regex(body, &path),
            other => Err(AuthzError::UnknownRuleKind {
                policy: self.policy.to_string(),
                path,
                kind: other.to_string(),
            }),
        }
    }

    /// `{ "regex": "..." }` or a bare pattern string.
    fn compile_regex(&self, spec: &Value, path: &str) -> Result<Matcher, AuthzError> {
        let pattern = match spec {
            Value::String(p) => p.as_str(),
            Value::Object(fields) => match fields.get("regex") {
                Some(Value::String(p)) => p.as_str(),
                _ => return Err(self.invalid(path, "missing string `regex`")),
            },
            _ => return Err(self.invalid(path, "expected a regex")),
        };
        Matcher::regex_with_limit(pattern, self.options.regex_size_limit).map_err(|source| {
            AuthzError::InvalidRegex {
                policy: self.policy.to_string(),
                path: path.to_string(),
                source,
            }
        })
    }

    /// `{ "start": n, "end": m }`, end optional.
    fn compile_range(&self, spec: &Value, path: &str) -> Result<Matcher, AuthzError> {
        let range_err = |message: String| AuthzError::InvalidRange {
            policy: self.policy.to_string(),
            path: path.to_string(),
            message,
        };

        let start = match spec.get("start") {
            None => i64::MIN,
            Some(v) => parse_integer(v)
                .ok_or_else(|| range_err(format!("start `{v}` is not an integer")))?,
        };
        let end = match spec.get("end") {
            None | Some(Value::Null) => None,
            Some(v) => Some(
                parse_integer(v)
                    .ok_or_else(|| range_err(format!("end `{v}` is not an integer")))?,
            ),
        };
        if let Some(end) = end {
            if start >= end {
                return Err(range_err(format!("start {start} must be below end {end}")));
            }
        }
        Ok(Matcher::range(start, end))
    }

    /// `{ "address_prefix": "10.0.0.0", "prefix_len": 8 }`
    fn compile_cidr(&self, spec: &Value, path: &str) -> Result<Matcher, AuthzError> {
        let cidr_err = |message: String| AuthzError::InvalidCidr {
            policy: self.policy.to_string(),
            path: path.to_string(),
            message,
        };

        let addr: IpAddr = match spec.get("address_prefix") {
            Some(Value::String(a)) => a
                .parse()
                .map_err(|_| cidr_err(format!("`{a}` is not an IP address")))?,
            _ => return Err(cidr_err("missing string `address_prefix`".into())),
        };
        let prefix_len = match spec.get("prefix_len") {
            None => match addr {
                IpAddr::V4(_) => 32,
                IpAddr::V6(_) => 128,
            },
            Some(v) => parse_integer(v)
                .and_then(|n| u8::try_from(n).ok())
                .ok_or_else(|| cidr_err(format!("prefix length `{v}` is not valid")))?,
        };
        let range = CidrRange::new(addr, prefix_len)
            .ok_or_else(|| cidr_err(format!("prefix length {prefix_len} is too long for {addr}")))?;

        Ok(Matcher::cidr(range))
    }

    fn string_value(&self, value: &Value, path: &str) -> Result<String, AuthzError> {
        match value {
            Value::String(s) => Ok(s.clone()),
            other => Err(self.invalid(path, format!("expected a string, got `{other}`"))),
        }
    }

    fn invalid(&self, path: &str, message: impl Into<String>) -> AuthzError {
        AuthzError::InvalidPolicy {
            policy: self.policy.to_string(),
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// The only `(key, value)` of a one-field object.
fn single_entry(value: &Value) -> Option<(&str, &Value)> {
    let fields = value.as_object()?;
    if fields.len() != 1 {
        return None;
    }
    fields.iter().next().map(|(k, v)| (k.as_str(), v))
}

/// Integers arrive as JSON numbers or, from protobuf JSON, as strings.
fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
