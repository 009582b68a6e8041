//! Assertion recovery from embedded Postman script text.
//!
//! Scripts are free-form JavaScript; full parsing is out of the question
//! and not needed. An explicit character scanner strips comments (honoring
//! string literals) and picks out `pm.test("...")` / `postman.test("...")`
//! calls. The scanner never fails: malformed or unterminated script text
//! degrades to whatever was recovered, because assertion names are a
//! debugging aid, not semantics-critical.

/// Strips `//` and `/* */` comments from script text.
///
/// Comment-like sequences inside string literals (including template
/// literals) are preserved. An unterminated block comment swallows the rest
/// of the input.
pub fn strip_comments(source: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Normal,
        LineComment,
        BlockComment,
        InString(char),
    }

    let mut out = String::with_capacity(source.len());
    let mut state = State::Normal;
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            State::Normal => match c {
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    state = State::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = State::BlockComment;
                }
                '"' | '\'' | '`' => {
                    state = State::InString(c);
                    out.push(c);
                }
                _ => out.push(c),
            },
            State::LineComment => {
                if c == '\n' {
                    out.push(c);
                    state = State::Normal;
                }
            }
            State::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Normal;
                }
            }
            State::InString(quote) => {
                out.push(c);
                if c == '\\' {
                    // Escaped character, even a quote, never closes the string
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if c == quote {
                    state = State::Normal;
                }
            }
        }
    }

    out
}

/// Extracts assertion names from `pm.test("...")` / `postman.test("...")`
/// calls, in source order.
///
/// Tolerates arbitrary whitespace between tokens. The quoted literal is
/// unescaped: `\"` yields `"`, `\\` yields `\`; a literal never terminated
/// by its closing quote still yields the captured prefix.
pub fn extract_assertion_names(script: &str) -> Vec<String> {
    let stripped = strip_comments(script);
    let chars: Vec<char> = stripped.chars().collect();

    let mut names = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        match match_test_call(&chars, i) {
            Some((name, next)) => {
                names.push(name);
                i = next;
            }
            None => i += 1,
        }
    }
    names
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn skip_whitespace(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

fn match_keyword(chars: &[char], i: usize, keyword: &str) -> Option<usize> {
    let end = i + keyword.len();
    if end > chars.len() {
        return None;
    }
    if chars[i..end].iter().collect::<String>() != keyword {
        return None;
    }
    // Reject matches inside a longer identifier
    if end < chars.len() && is_ident_char(chars[end]) {
        return None;
    }
    Some(end)
}

/// Tries to match a full test call starting at `i`; returns the extracted
/// name and the index to resume scanning from.
fn match_test_call(chars: &[char], i: usize) -> Option<(String, usize)> {
    // "pm"/"postman" must start an identifier, not continue one
    if i > 0 && is_ident_char(chars[i - 1]) {
        return None;
    }

    let after_object = match_keyword(chars, i, "pm").or_else(|| match_keyword(chars, i, "postman"))?;

    let mut pos = skip_whitespace(chars, after_object);
    if chars.get(pos) != Some(&'.') {
        return None;
    }
    pos = skip_whitespace(chars, pos + 1);

    pos = match_keyword(chars, pos, "test")?;
    pos = skip_whitespace(chars, pos);
    if chars.get(pos) != Some(&'(') {
        return None;
    }
    pos = skip_whitespace(chars, pos + 1);

    let quote = match chars.get(pos) {
        Some(&q @ ('"' | '\'')) => q,
        _ => return None,
    };
    pos += 1;

    let mut name = String::new();
    while pos < chars.len() {
        let c = chars[pos];
        if c == '\\' {
            // Unescape: the escaped character is captured verbatim
            if let Some(&escaped) = chars.get(pos + 1) {
                name.push(escaped);
                pos += 2;
            } else {
                pos += 1;
            }
            continue;
        }
        if c == quote {
            return Some((name, pos + 1));
        }
        name.push(c);
        pos += 1;
    }

    // Unterminated literal: yield what was captured rather than failing
    Some((name, pos))
}
