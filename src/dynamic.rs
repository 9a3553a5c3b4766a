//! Dynamic Property Paths
//!
//! Translates user path strings such as `"a.b[0]"` into safe left-to-right
//! bracket-index chains, and classifies bound values as static or dynamically
//! resolved per invocation.
//!
//! # Tokenization
//!
//! A path is recursively split on `.` and on bracketed index operators
//! (`[true]`, `[false]`, `[null]`, `[<digits>]`, `['…']`, `["…"]`). A fully
//! quoted path collapses to a single literal token. The resulting token
//! sequence renders uniformly as quoted bracket indices:
//! `"position.x"` → `["position"]["x"]`, `"list[3].value"` →
//! `["list"]["3"]["value"]`.
//!
//! # Strict rejection
//!
//! Unlike the permissive behavior this module descends from, malformed input
//! is rejected rather than silently producing nonsense indices: empty paths,
//! empty segments (leading/trailing/doubled `.`) and stray quote or bracket
//! characters all yield [`WispError::InvalidPath`].

use std::fmt::Write as _;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::codegen::{Expr, Place};
use crate::errors::{Result, WispError};
use crate::value::Value;

// ─── Path Tokens ─────────────────────────────────────────────────────────────

/// One step of a resolved property path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathToken {
    /// A literal string key (`a`, `'quoted'`, `["key"]`).
    Key(String),
    /// A bracketed integer index (`[3]`).
    Index(u64),
    /// A bracketed boolean key (`[true]` / `[false]`).
    Bool(bool),
    /// The bracketed `[null]` key.
    Null,
}

/// Token sequences are short; four inline steps cover realistic paths.
pub type PathTokens = SmallVec<[PathToken; 4]>;

impl PathToken {
    /// The raw text of the token, as it appears inside a rendered index.
    fn raw_text(&self) -> String {
        match self {
            PathToken::Key(k) => k.clone(),
            PathToken::Index(i) => i.to_string(),
            PathToken::Bool(b) => b.to_string(),
            PathToken::Null => "null".to_owned(),
        }
    }

    /// Resolves this step against a base value, degrading to `Null` on any
    /// missing or mistyped step.
    #[must_use]
    pub fn resolve_in(&self, base: &Value) -> Value {
        match self {
            PathToken::Index(i) => base.get_index(*i as usize),
            other => base.get_key(&other.raw_text()),
        }
    }
}

// ─── Tokenizer ───────────────────────────────────────────────────────────────

fn invalid(path: &str, reason: &'static str) -> WispError {
    WispError::InvalidPath {
        path: path.to_owned(),
        reason,
    }
}

/// Splits a path string into its token sequence.
pub fn tokens(path: &str) -> Result<PathTokens> {
    if path.is_empty() {
        return Err(invalid(path, "empty path"));
    }
    let mut out = PathTokens::new();
    split_parts(path, path, &mut out)?;
    Ok(out)
}

/// Renders a path as a chain of quoted bracket indices.
///
/// Backslashes and double quotes inside keys are escaped. Integer and boolean
/// steps render quoted exactly like the one-segment literal case.
pub fn accessor(path: &str) -> Result<String> {
    let toks = tokens(path)?;
    let mut out = String::with_capacity(path.len() + toks.len() * 4);
    for tok in &toks {
        out.push_str("[\"");
        escape_into(&tok.raw_text(), &mut out);
        out.push_str("\"]");
    }
    Ok(out)
}

fn escape_into(raw: &str, out: &mut String) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
}

// Recursive splitter. `full` is the original input, kept for error reporting.
fn split_parts(full: &str, s: &str, out: &mut PathTokens) -> Result<()> {
    if s.is_empty() {
        return Ok(());
    }

    // (a) the entire fragment is a matching quoted literal
    let bytes = s.as_bytes();
    if s.len() > 1 {
        let (first, last) = (bytes[0], bytes[s.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            out.push(PathToken::Key(s[1..s.len() - 1].to_owned()));
            return Ok(());
        }
    }

    // (b) first valid bracketed index operator, if any
    if let Some((start, end, token)) = find_bracket(s) {
        split_parts(full, &s[..start], out)?;
        out.push(token);
        split_parts(full, &s[end..], out)?;
        return Ok(());
    }

    // Stray structural characters with no valid bracket token left.
    if s.contains('[') || s.contains(']') {
        return Err(invalid(full, "malformed bracket index"));
    }

    // (c) split on `.` and resolve each segment
    if s.contains('.') {
        for segment in s.split('.') {
            if segment.is_empty() {
                return Err(invalid(full, "empty path segment"));
            }
            split_parts(full, segment, out)?;
        }
        return Ok(());
    }

    // (d) a segment with no further structure is one literal key
    if s.contains('"') || s.contains('\'') {
        return Err(invalid(full, "unterminated quote"));
    }
    out.push(PathToken::Key(s.to_owned()));
    Ok(())
}

/// Finds the first bracket operator whose content is a valid index token.
/// Returns the byte range of the whole `[...]` and the parsed token.
fn find_bracket(s: &str) -> Option<(usize, usize, PathToken)> {
    for (pos, _) in s.match_indices('[') {
        if let Some((end, token)) = parse_bracket_at(s, pos) {
            return Some((pos, end, token));
        }
    }
    None
}

/// Tries to parse a bracket operator starting at byte `pos` (which holds
/// `[`). Returns the end byte offset (past `]`) and the token.
fn parse_bracket_at(s: &str, pos: usize) -> Option<(usize, PathToken)> {
    let rest = &s[pos + 1..];
    let first = rest.as_bytes().first()?;

    if *first == b'\'' || *first == b'"' {
        // quoted string index; the closing quote must be followed by `]`
        let quote = *first as char;
        let inner_len = rest[1..].find(quote)?;
        let after_quote = 1 + inner_len + 1;
        if rest.as_bytes().get(after_quote) != Some(&b']') {
            return None;
        }
        let token = PathToken::Key(rest[1..1 + inner_len].to_owned());
        return Some((pos + 1 + after_quote + 1, token));
    }

    let close = rest.find(']')?;
    let content = &rest[..close];
    let token = match content {
        "true" => PathToken::Bool(true),
        "false" => PathToken::Bool(false),
        "null" => PathToken::Null,
        digits if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            PathToken::Index(digits.parse().ok()?)
        }
        _ => return None,
    };
    Some((pos + 1 + close + 1, token))
}

// ─── Path Accessors ──────────────────────────────────────────────────────────

/// A parsed path: the original string plus its token sequence, ready to be
/// lowered into a per-invocation lookup expression.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathAccessor {
    raw: String,
    tokens: PathTokens,
}

impl PathAccessor {
    /// Parses a path string, applying the strict-reject policy.
    pub fn parse(path: &str) -> Result<Self> {
        Ok(Self {
            raw: path.to_owned(),
            tokens: tokens(path)?,
        })
    }

    /// The original path string.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The resolved token sequence.
    #[must_use]
    pub fn tokens(&self) -> &[PathToken] {
        &self.tokens
    }

    /// The rendered bracket-index chain, e.g. `["a"]["b"]["c"]`.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for tok in &self.tokens {
            let _ = write!(out, "[\"");
            escape_into(&tok.raw_text(), &mut out);
            let _ = write!(out, "\"]");
        }
        out
    }

    /// Walks the path from a base value, degrading to `Null` on misses.
    #[must_use]
    pub fn resolve(&self, base: &Value) -> Value {
        let mut current = base.clone();
        for tok in &self.tokens {
            current = tok.resolve_in(&current);
        }
        current
    }
}

// ─── Dynamic Values ──────────────────────────────────────────────────────────

/// Signature of a raw dynamic callable: `(context, props) -> value`.
pub type DynamicFn = dyn Fn(&Value, &Value) -> Value;

/// A bound command parameter, classified as static or dynamically resolved.
///
/// Static values bypass per-invocation resolution entirely; every other
/// variant is lowered into a lookup or call evaluated on each invocation.
#[derive(Clone)]
pub enum DynamicValue {
    /// Fixed at command construction; no per-invocation work.
    Static(Value),
    /// Looked up on the per-draw props object.
    Prop(PathAccessor),
    /// Looked up on the shared frame context.
    Context(PathAccessor),
    /// Looked up on the command's own receiver object.
    This(PathAccessor),
    /// An unmarked callable invoked with `(context, props)`.
    Func(Rc<DynamicFn>),
}

impl DynamicValue {
    /// A props lookup through the given path.
    pub fn prop(path: &str) -> Result<Self> {
        Ok(DynamicValue::Prop(PathAccessor::parse(path)?))
    }

    /// A frame-context lookup through the given path.
    pub fn context(path: &str) -> Result<Self> {
        Ok(DynamicValue::Context(PathAccessor::parse(path)?))
    }

    /// A receiver lookup through the given path.
    pub fn this(path: &str) -> Result<Self> {
        Ok(DynamicValue::This(PathAccessor::parse(path)?))
    }

    /// Wraps a raw callable resolved on every invocation.
    pub fn func(f: impl Fn(&Value, &Value) -> Value + 'static) -> Self {
        DynamicValue::Func(Rc::new(f))
    }

    /// Whether this value requires per-invocation resolution.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        !matches!(self, DynamicValue::Static(_))
    }

    /// Lowers this value into the expression evaluated per invocation,
    /// given the places holding the frame context, the draw props and the
    /// command receiver.
    #[must_use]
    pub fn lower(&self, context: Place, props: Place, this: Place) -> Expr {
        match self {
            DynamicValue::Static(v) => Expr::Lit(v.clone()),
            DynamicValue::Prop(path) => {
                Expr::Path(Box::new(Expr::Place(props)), path.clone())
            }
            DynamicValue::Context(path) => {
                Expr::Path(Box::new(Expr::Place(context)), path.clone())
            }
            DynamicValue::This(path) => {
                Expr::Path(Box::new(Expr::Place(this)), path.clone())
            }
            DynamicValue::Func(f) => {
                let f = Rc::clone(f);
                let native = Value::native(move |args| {
                    let ctx = args.first().cloned().unwrap_or(Value::Null);
                    let props = args.get(1).cloned().unwrap_or(Value::Null);
                    f(&ctx, &props)
                });
                Expr::Call(
                    Box::new(Expr::Lit(native)),
                    vec![Expr::Place(context), Expr::Place(props)],
                )
            }
        }
    }
}

impl From<Value> for DynamicValue {
    fn from(v: Value) -> Self {
        DynamicValue::Static(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_path_tokens() {
        let toks = tokens("a.b.c").unwrap();
        assert_eq!(
            toks.as_slice(),
            &[
                PathToken::Key("a".into()),
                PathToken::Key("b".into()),
                PathToken::Key("c".into()),
            ]
        );
    }

    #[test]
    fn bracket_tokens_are_typed() {
        let toks = tokens("list[3].value").unwrap();
        assert_eq!(
            toks.as_slice(),
            &[
                PathToken::Key("list".into()),
                PathToken::Index(3),
                PathToken::Key("value".into()),
            ]
        );
        assert_eq!(
            tokens("flags[true]").unwrap().as_slice(),
            &[PathToken::Key("flags".into()), PathToken::Bool(true)]
        );
    }

    #[test]
    fn quoted_bracket_can_contain_structure() {
        let toks = tokens("a['b.c']").unwrap();
        assert_eq!(
            toks.as_slice(),
            &[PathToken::Key("a".into()), PathToken::Key("b.c".into())]
        );
    }

    #[test]
    fn strict_reject() {
        assert!(tokens("").is_err());
        assert!(tokens(".x").is_err());
        assert!(tokens("x.").is_err());
        assert!(tokens("a..b").is_err());
        assert!(tokens("a[b]").is_err());
        assert!(tokens("a['x").is_err());
    }
}
