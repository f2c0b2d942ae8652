//! Tolerant tokenizer for authentication header values.
//!
//! Splits the comma-separated `key=value` lists used by challenge and
//! `Authentication-Info` headers, accepting quoted values containing
//! commas, and (in challenge mode) bare scheme tokens separated from
//! their parameters by a space or comma.

/// Delimiter that terminated a bare scheme token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sep {
    Space,
    Comma,
    End,
}

/// One tokenized element of a header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    /// A bare token with no `=value`; only emitted in challenge mode.
    Scheme { name: &'a str, sep: Sep },
    /// A `key=value` pair. The value retains any surrounding quotes.
    Param { key: &'a str, value: &'a str },
}

/// Tokenizer error: an `=` was seen before any key byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Malformed;

/// Cursor over a header value.
///
/// States are the classic BEFORE_EQ / AFTER_EQ / AFTER_EQ_QUOTED
/// tokenizer; a double quote inside a value suppresses comma splitting
/// until the closing quote.
pub(crate) struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    challenge_mode: bool,
}

impl<'a> Tokenizer<'a> {
    /// Tokenizer for a challenge header (`WWW-Authenticate` and friends):
    /// bare scheme tokens are emitted in addition to `key=value` pairs.
    pub(crate) fn challenge(input: &'a str) -> Self {
        Tokenizer {
            input,
            pos: 0,
            challenge_mode: true,
        }
    }

    /// Tokenizer for a parameter-only header (`Authentication-Info`).
    pub(crate) fn params(input: &'a str) -> Self {
        Tokenizer {
            input,
            pos: 0,
            challenge_mode: false,
        }
    }

    /// Next token, `Ok(None)` at end of input.
    pub(crate) fn next_token(&mut self) -> Result<Option<Token<'a>>, Malformed> {
        let bytes = self.input.as_bytes();
        if self.pos >= bytes.len() {
            return Ok(None);
        }

        let mut key_start: Option<usize> = None;
        let mut eq_pos: Option<usize> = None;
        let mut quoted = false;

        let mut i = self.pos;
        while i < bytes.len() {
            let b = bytes[i];
            match eq_pos {
                None => {
                    if b == b'=' {
                        if key_start.is_none() {
                            self.pos = bytes.len();
                            return Err(Malformed);
                        }
                        eq_pos = Some(i);
                    } else if (b == b' ' || b == b',') && self.challenge_mode && key_start.is_some()
                    {
                        let start = key_start.unwrap_or(i);
                        let sep = if b == b' ' { Sep::Space } else { Sep::Comma };
                        self.pos = i + 1;
                        return Ok(Some(Token::Scheme {
                            name: &self.input[start..i],
                            sep,
                        }));
                    } else if key_start.is_none() && !matches!(b, b' ' | b'\r' | b'\n' | b'\t') {
                        key_start = Some(i);
                    }
                }
                Some(eq) if !quoted => {
                    if b == b',' {
                        let start = key_start.unwrap_or(eq);
                        self.pos = i + 1;
                        return Ok(Some(Token::Param {
                            key: &self.input[start..eq],
                            value: &self.input[eq + 1..i],
                        }));
                    } else if b == b'"' {
                        quoted = true;
                    }
                }
                Some(_) => {
                    if b == b'"' {
                        quoted = false;
                    }
                }
            }
            i += 1;
        }

        self.pos = bytes.len();
        match (eq_pos, key_start) {
            (Some(eq), Some(start)) => Ok(Some(Token::Param {
                key: &self.input[start..eq],
                value: &self.input[eq + 1..],
            })),
            (None, Some(start)) if self.challenge_mode => Ok(Some(Token::Scheme {
                name: &self.input[start..],
                sep: Sep::End,
            })),
            _ => Ok(None),
        }
    }

    /// Consume the remaining input up to (and past) the next comma and
    /// return it with surrounding spaces and tabs trimmed.
    ///
    /// Used for unquoted base64 tokens that do not fit the `key=value`
    /// grammar, e.g. `Negotiate YII...=`.
    pub(crate) fn take_until_comma(&mut self) -> &'a str {
        let bytes = self.input.as_bytes();
        let start = self.pos;
        let raw = match bytes[start..].iter().position(|&b| b == b',') {
            Some(rel) => {
                self.pos = start + rel + 1;
                &self.input[start..start + rel]
            }
            None => {
                self.pos = bytes.len();
                &self.input[start..]
            }
        };
        raw.trim_matches(|c| c == ' ' || c == '\t')
    }
}

/// Strip any leading and trailing occurrences of the given quote
/// characters from a value.
pub(crate) fn shave<'a>(value: &'a str, quotes: &[char]) -> &'a str {
    value.trim_matches(|c| quotes.contains(&c))
}
