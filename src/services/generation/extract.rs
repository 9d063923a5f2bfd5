use serde_json::Value;

use crate::error::ParseError;

/// Top-level JSON shape expected inside generated text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Object,
    Array,
}

impl Shape {
    fn delimiters(self) -> (u8, u8) {
        match self {
            Shape::Object => (b'{', b'}'),
            Shape::Array => (b'[', b']'),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Shape::Object => "object",
            Shape::Array => "array",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            Shape::Object => value.is_object(),
            Shape::Array => value.is_array(),
        }
    }
}

fn parse_as(candidate: &str, shape: Shape) -> Option<Value> {
    serde_json::from_str::<Value>(candidate)
        .ok()
        .filter(|value| shape.matches(value))
}

/// Balanced spans to try before giving up on the scan
const MAX_SPAN_ATTEMPTS: usize = 32;

/// Every balanced `open..=close` span as `(start, end)` byte indices, in text
/// order, found in a single pass.
///
/// Delimiters inside JSON strings are skipped. String tracking only runs
/// inside a span and stops at a line break, since JSON strings cannot hold
/// one. Stray closers are ignored.
fn balanced_spans(bytes: &[u8], open: u8, close: u8) -> Vec<(usize, usize)> {
    let mut stack: Vec<usize> = Vec::new();
    let mut spans = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (index, &byte) in bytes.iter().enumerate() {
        if in_string {
            match byte {
                b'\n' => {
                    in_string = false;
                    escaped = false;
                }
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match byte {
            b'"' if !stack.is_empty() => in_string = true,
            b if b == open => stack.push(index),
            b if b == close => {
                if let Some(start) = stack.pop() {
                    spans.push((start, index));
                }
            }
            _ => {}
        }
    }

    spans.sort_unstable_by_key(|&(start, _)| start);
    spans
}

/// Pulls a JSON value of the given shape out of free text.
///
/// Tries, in order: the greedy span from the first opener to the last closer,
/// the first balanced spans in text order, then the whole body.
pub fn extract_json(text: &str, shape: Shape) -> Result<Value, ParseError> {
    let body = text.trim();
    if body.is_empty() {
        return Err(ParseError::EmptyText);
    }

    let (open, close) = shape.delimiters();
    let bytes = body.as_bytes();

    if let (Some(first), Some(last)) = (
        bytes.iter().position(|&b| b == open),
        bytes.iter().rposition(|&b| b == close),
    ) {
        if first < last {
            if let Some(value) = parse_as(&body[first..=last], shape) {
                return Ok(value);
            }
        }
    }

    for (start, end) in balanced_spans(bytes, open, close)
        .into_iter()
        .take(MAX_SPAN_ATTEMPTS)
    {
        if let Some(value) = parse_as(&body[start..=end], shape) {
            return Ok(value);
        }
    }

    match serde_json::from_str::<Value>(body) {
        Ok(value) if shape.matches(&value) => Ok(value),
        Ok(_) => Err(ParseError::Shape(format!("expected a JSON {}", shape.name()))),
        Err(_) => Err(ParseError::NoJson(shape.name())),
    }
}

/// Splits the last top-level JSON array off chat text.
///
/// Returns the remaining prose (trimmed) and the array, if one parsed.
pub fn strip_trailing_array(text: &str) -> (String, Option<Vec<Value>>) {
    let bytes = text.as_bytes();
    let mut last: Option<(usize, usize, Vec<Value>)> = None;

    // Outermost spans only: once a span is tried, the ones nested in it are skipped
    let mut cursor = 0;
    for (start, end) in balanced_spans(bytes, b'[', b']') {
        if start < cursor {
            continue;
        }
        if let Ok(Value::Array(items)) = serde_json::from_str(&text[start..=end]) {
            last = Some((start, end, items));
        }
        cursor = end + 1;
    }

    match last {
        Some((start, end, items)) => {
            let mut prose = String::with_capacity(text.len());
            prose.push_str(&text[..start]);
            prose.push_str(&text[end + 1..]);
            (prose.trim().to_string(), Some(items))
        }
        None => (text.trim().to_string(), None),
    }
}
