//! Whitespace tokenisation with the positional helpers the dialect
//! recognisers share.

/// A listing line split into whitespace-delimited tokens, with access to
/// the raw tail of the line for file names containing spaces.
pub(crate) struct Line<'a> {
    text: &'a str,
    tokens: Vec<(usize, usize)>,
}

impl<'a> Line<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        let mut tokens = Vec::new();
        let bytes = text.as_bytes();
        let mut start = None;
        for (i, &b) in bytes.iter().enumerate() {
            if b == b' ' || b == b'\t' {
                if let Some(s) = start.take() {
                    tokens.push((s, i));
                }
            } else if start.is_none() {
                start = Some(i);
            }
        }
        if let Some(s) = start {
            tokens.push((s, bytes.len()));
        }
        Self { text, tokens }
    }

    pub(crate) fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub(crate) fn token(&self, index: usize) -> Option<&'a str> {
        self.tokens
            .get(index)
            .map(|&(start, end)| &self.text[start..end])
    }

    /// Everything from the start of token `index` to the end of the line,
    /// trailing whitespace trimmed. Used for file names with spaces.
    pub(crate) fn rest(&self, index: usize) -> Option<&'a str> {
        self.tokens
            .get(index)
            .map(|&(start, _)| self.text[start..].trim_end())
    }

    pub(crate) fn raw(&self) -> &'a str {
        self.text
    }
}

pub(crate) fn is_numeric(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// True when the token ends in digits (e.g. a group name glued to a
/// size column).
pub(crate) fn is_right_numeric(token: &str) -> bool {
    token
        .bytes()
        .last()
        .is_some_and(|b| b.is_ascii_digit())
}

pub(crate) fn is_left_numeric(token: &str) -> bool {
    token
        .bytes()
        .next()
        .is_some_and(|b| b.is_ascii_digit())
}

pub(crate) fn number(token: &str) -> Option<i64> {
    is_numeric(token).then(|| token.parse().ok())?
}

/// Size columns with grouping dots, fractional parts and binary
/// suffixes, optionally in fixed-size blocks (VMS).
pub(crate) fn complex_size(token: &str, blocksize: Option<i64>) -> Option<i64> {
    if let Some(plain) = number(token) {
        return Some(plain * blocksize.unwrap_or(1));
    }

    let mut chars: Vec<char> = token.chars().collect();
    let mut suffix = None;
    if let Some(&last) = chars.last() {
        if last == 'B' || last == 'b' {
            chars.pop();
            if let Some(&prev) = chars.last() {
                if !prev.is_ascii_digit() {
                    suffix = Some(prev.to_ascii_lowercase());
                    chars.pop();
                }
            }
        } else if !last.is_ascii_digit() {
            suffix = Some(last.to_ascii_lowercase());
            chars.pop();
        }
    }
    if chars.is_empty() {
        return None;
    }

    let mut size: i64 = 0;
    let mut decimals_after_dot = 0i32;
    let mut seen_dot = false;
    for c in chars {
        if let Some(d) = c.to_digit(10) {
            size = size.checked_mul(10)?.checked_add(i64::from(d))?;
            if seen_dot {
                decimals_after_dot += 1;
            }
        } else if c == '.' {
            if seen_dot {
                return None;
            }
            seen_dot = true;
        } else {
            return None;
        }
    }

    match suffix {
        Some('k') => size = size.checked_mul(1024)?,
        Some('m') => size = size.checked_mul(1024 * 1024)?,
        Some('g') => size = size.checked_mul(1024 * 1024 * 1024)?,
        Some('t') => size = size.checked_mul(1024i64.pow(4))?,
        Some(_) => return None,
        None => {
            if let Some(block) = blocksize {
                size = size.checked_mul(block)?;
            }
        }
    }
    for _ in 0..decimals_after_dot {
        size /= 10;
    }
    Some(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenisation_keeps_the_raw_tail() {
        let line = Line::new("  a  b   name with spaces  ");
        assert_eq!(line.token_count(), 5);
        assert_eq!(line.token(0), Some("a"));
        assert_eq!(line.rest(2), Some("name with spaces"));
        assert_eq!(line.token(9), None);
    }

    #[test]
    fn complex_sizes_cover_suffixes_blocks_and_fractions() {
        assert_eq!(complex_size("1234", None), Some(1234));
        assert_eq!(complex_size("12", Some(512)), Some(6144));
        assert_eq!(complex_size("1k", None), Some(1024));
        assert_eq!(complex_size("1.5M", None), Some(1_572_864));
        assert_eq!(complex_size("2GB", None), Some(2_147_483_648));
        assert_eq!(complex_size("x", None), None);
        assert_eq!(complex_size("1..2", None), None);
    }

    #[test]
    fn numeric_predicates() {
        assert!(is_numeric("042"));
        assert!(!is_numeric("4a"));
        assert!(is_right_numeric("staff42"));
        assert!(is_left_numeric("42staff"));
    }
}
