//! Text encoding for the sequence-valued columns (`accountKeys`, `programIds`)
//! of the persisted normalized table.
//!
//! Encoded form is a bracketed list literal with single-quoted items, e.g.
//! `['A', 'B']`. Decoding also accepts double quotes, a trailing comma and
//! bare `None` items (skipped).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("expected '[' at offset {0}")]
    MissingOpenBracket(usize),
    #[error("expected ']' at end of list")]
    MissingCloseBracket,
    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),
    #[error("unsupported escape '\\{escape}' at offset {offset}")]
    BadEscape { escape: char, offset: usize },
    #[error("unexpected {found:?} at offset {offset}")]
    UnexpectedToken { found: char, offset: usize },
    #[error("trailing characters after list at offset {0}")]
    TrailingCharacters(usize),
}

pub fn encode_list(items: &[String]) -> String {
    let mut out = String::with_capacity(2 + items.iter().map(|s| s.len() + 4).sum::<usize>());
    out.push('[');
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('\'');
        for c in item.chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '\'' => out.push_str("\\'"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                other => out.push(other),
            }
        }
        out.push('\'');
    }
    out.push(']');
    out
}

pub fn decode_list(text: &str) -> Result<Vec<String>, CodecError> {
    let mut cursor = Cursor::new(text);
    cursor.skip_whitespace();
    if !cursor.eat('[') {
        return Err(CodecError::MissingOpenBracket(cursor.offset()));
    }

    let mut items = Vec::new();
    loop {
        cursor.skip_whitespace();
        match cursor.peek() {
            None => return Err(CodecError::MissingCloseBracket),
            Some(']') => {
                cursor.bump();
                break;
            }
            Some(q @ ('\'' | '"')) => items.push(cursor.quoted(q)?),
            Some('N') if cursor.rest().starts_with("None") => {
                cursor.advance("None".len());
            }
            Some(found) => {
                return Err(CodecError::UnexpectedToken {
                    found,
                    offset: cursor.offset(),
                })
            }
        }

        cursor.skip_whitespace();
        match cursor.peek() {
            Some(',') => cursor.bump(),
            Some(']') => {
                cursor.bump();
                break;
            }
            None => return Err(CodecError::MissingCloseBracket),
            Some(found) => {
                return Err(CodecError::UnexpectedToken {
                    found,
                    offset: cursor.offset(),
                })
            }
        }
    }

    cursor.skip_whitespace();
    if cursor.peek().is_some() {
        return Err(CodecError::TrailingCharacters(cursor.offset()));
    }
    Ok(items)
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn offset(&self) -> usize {
        self.pos
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn advance(&mut self, bytes: usize) {
        self.pos += bytes;
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn quoted(&mut self, quote: char) -> Result<String, CodecError> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(CodecError::UnterminatedString(start));
            };
            self.bump();
            if c == quote {
                return Ok(out);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }
            let escape_at = self.pos;
            let Some(escape) = self.peek() else {
                return Err(CodecError::UnterminatedString(start));
            };
            self.bump();
            out.push(match escape {
                '\\' => '\\',
                '\'' => '\'',
                '"' => '"',
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                other => {
                    return Err(CodecError::BadEscape {
                        escape: other,
                        offset: escape_at,
                    })
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_encode_matches_list_literal_form() {
        assert_eq!(encode_list(&[]), "[]");
        assert_eq!(encode_list(&owned(&["A", "B"])), "['A', 'B']");
    }

    #[test]
    fn test_round_trip_with_awkward_characters() {
        let items = owned(&["it's", "back\\slash", "tab\there", "quote\"d", "", "ünï"]);
        assert_eq!(decode_list(&encode_list(&items)).unwrap(), items);
    }

    #[test]
    fn test_decode_accepts_double_quotes_and_whitespace() {
        let decoded = decode_list(r#"  [ "A" ,'B',  ]  "#).unwrap();
        assert_eq!(decoded, owned(&["A", "B"]));
    }

    #[test]
    fn test_decode_skips_none_items() {
        let decoded = decode_list("[None, 'P1', None]").unwrap();
        assert_eq!(decoded, owned(&["P1"]));
    }

    #[test]
    fn test_decode_rejects_malformed_input() {
        assert_eq!(decode_list(""), Err(CodecError::MissingOpenBracket(0)));
        assert_eq!(decode_list("['A'"), Err(CodecError::MissingCloseBracket));
        assert_eq!(decode_list("['A"), Err(CodecError::UnterminatedString(1)));
        assert!(matches!(
            decode_list("['A' 'B']"),
            Err(CodecError::UnexpectedToken { found: '\'', .. })
        ));
        assert!(matches!(
            decode_list("[A]"),
            Err(CodecError::UnexpectedToken { found: 'A', .. })
        ));
        assert!(matches!(
            decode_list(r"['\x']"),
            Err(CodecError::BadEscape { escape: 'x', .. })
        ));
        assert_eq!(decode_list("['A'] x"), Err(CodecError::TrailingCharacters(6)));
    }
}
