//! Binding expression parser.
//!
//! Splits text such as `"Hello [[user.name]], {{count}} left"` into literal
//! and expression parts. The grammar inside the brackets is:
//!
//! ```text
//! expr   := '!'? source ('::' event)?
//! source := path | method '(' (arg (',' arg)*)? ')'
//! arg    := path ('.*')? | number | 'single' | "double"
//! ```
//!
//! `::event` only applies to two-way (`{{..}}`) bindings. Inside arguments
//! `\,` escapes a comma and a backslash escapes the next character.

use memchr::memmem;
use tempera_carton::{CompactString, SmallVec};
use tempera_relief::{
    BindingExpression, BindingMode, BindingParseError, BindingPart, MethodArg, MethodSignature,
    Trigger, Value,
};

/// Split `text` into binding parts.
///
/// Returns `Ok(None)` when the text has no bindings at all.
pub fn parse_bindings(text: &str) -> Result<Option<Vec<BindingPart>>, BindingParseError> {
    let mut parts = Vec::new();
    let mut last_index = 0;

    while let Some((open, mode)) = find_open(text, last_index) {
        let closer: &[u8] = match mode {
            BindingMode::OneWay => b"]]",
            BindingMode::TwoWay => b"}}",
        };
        let Some(rel_close) = memmem::find(&text.as_bytes()[open + 2..], closer) else {
            break;
        };
        let close = open + 2 + rel_close;

        if open > last_index {
            parts.push(BindingPart::Literal(text[last_index..open].into()));
        }
        let compound_index = parts.len();
        let expression = parse_expression(&text[open + 2..close], mode, compound_index)?;
        parts.push(BindingPart::Expression(expression));
        last_index = close + 2;
    }

    if parts.is_empty() {
        return Ok(None);
    }
    if last_index < text.len() {
        parts.push(BindingPart::Literal(text[last_index..].into()));
    }
    Ok(Some(parts))
}

/// Earliest `[[` or `{{` at or after `from`.
fn find_open(text: &str, from: usize) -> Option<(usize, BindingMode)> {
    let bytes = &text.as_bytes()[from..];
    let one_way = memmem::find(bytes, b"[[");
    let two_way = memmem::find(bytes, b"{{");
    let pos = match (one_way, two_way) {
        (Some(a), Some(b)) => a.min(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    Some((from + pos, BindingMode::from_open_bracket(bytes[pos])))
}

/// Parse the text between the brackets.
pub fn parse_expression(
    inner: &str,
    mode: BindingMode,
    compound_index: usize,
) -> Result<BindingExpression, BindingParseError> {
    let mut source = inner.trim();
    let negate = source.starts_with('!');
    if negate {
        source = source[1..].trim_start();
    }
    if source.is_empty() {
        return Err(BindingParseError::EmptyExpression);
    }

    let mut custom_event = None;
    if mode == BindingMode::TwoWay {
        if let Some(colon) = source.find("::").filter(|&c| c > 0) {
            custom_event = Some(CompactString::from(source[colon + 2..].trim()));
            source = source[..colon].trim_end();
        }
    }

    let signature = parse_method(source)?;
    let dependencies = match &signature {
        Some(_) if mode == BindingMode::TwoWay => {
            return Err(BindingParseError::TwoWayMethod(source.into()));
        }
        Some(sig) => sig.dependencies().cloned().collect(),
        None => {
            if !is_path_like(source) {
                return Err(BindingParseError::InvalidArgument(source.into()));
            }
            // A bare reference also fires for changes below it.
            let mut trigger = Trigger::from_dependency(source);
            trigger.wildcard = true;
            vec![trigger]
        }
    };

    Ok(BindingExpression {
        source: source.into(),
        mode,
        negate,
        signature,
        dependencies,
        custom_event,
        compound_index,
    })
}

/// Parse `name(args)`. Returns `Ok(None)` for anything without parentheses.
pub fn parse_method(expression: &str) -> Result<Option<MethodSignature>, BindingParseError> {
    let expression = expression.trim();
    let Some(open) = expression.find('(') else {
        return Ok(None);
    };
    let method_name = expression[..open].trim();
    if !expression.ends_with(')') || !is_identifier(method_name) {
        return Err(BindingParseError::MalformedMethod(expression.into()));
    }

    let inner = &expression[open + 1..expression.len() - 1];
    let args = if inner.trim().is_empty() {
        Vec::new()
    } else {
        split_args(inner)
            .iter()
            .map(|raw| parse_arg(raw))
            .collect::<Result<Vec<_>, _>>()?
    };
    let is_static = args.iter().all(|a| matches!(a, MethodArg::Literal(_)));

    Ok(Some(MethodSignature {
        method_name: method_name.into(),
        args,
        is_static,
    }))
}

/// Split on commas that are not escaped with a backslash.
fn split_args(inner: &str) -> SmallVec<[&str; 4]> {
    let bytes = inner.as_bytes();
    let mut out = SmallVec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b',' => {
                out.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    out.push(&inner[start..]);
    out
}

/// Parse one method argument.
pub fn parse_arg(raw: &str) -> Result<MethodArg, BindingParseError> {
    let arg = unescape(raw.trim());
    let bytes = arg.as_bytes();
    let Some(&first) = bytes.first() else {
        return Err(BindingParseError::InvalidArgument(raw.into()));
    };
    let lead = if first == b'-' || first == b'+' {
        bytes.get(1).copied().unwrap_or(first)
    } else {
        first
    };

    match lead {
        b'\'' | b'"' => {
            if bytes.len() < 2 || bytes[bytes.len() - 1] != lead {
                return Err(BindingParseError::UnterminatedString(raw.into()));
            }
            Ok(MethodArg::Literal(Value::from(&arg[1..arg.len() - 1])))
        }
        b'0'..=b'9' | b'.' => arg
            .parse::<f64>()
            .map(|n| MethodArg::Literal(Value::Number(n)))
            .map_err(|_| BindingParseError::InvalidArgument(raw.into())),
        _ if is_path_like(&arg) => Ok(MethodArg::Property(Trigger::from_dependency(&arg))),
        _ => Err(BindingParseError::InvalidArgument(raw.into())),
    }
}

fn unescape(arg: &str) -> CompactString {
    if !arg.contains('\\') {
        return arg.into();
    }
    let mut out = CompactString::with_capacity(arg.len());
    let mut chars = arg.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

#[inline]
fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'$'
}

fn is_identifier(name: &str) -> bool {
    let bytes = name.as_bytes();
    !bytes.is_empty()
        && is_ident_start(bytes[0])
        && bytes[1..]
            .iter()
            .all(|&c| c.is_ascii_alphanumeric() || c == b'_' || c == b'$')
}

/// `[a-zA-Z_$][\w.:$\-*]*`
fn is_path_like(source: &str) -> bool {
    let bytes = source.as_bytes();
    !bytes.is_empty()
        && is_ident_start(bytes[0])
        && bytes[1..].iter().all(|&c| {
            c.is_ascii_alphanumeric() || matches!(c, b'_' | b'.' | b':' | b'$' | b'-' | b'*')
        })
}
