//! Tokenizer (spec.md §6 "Source syntax (token level)").
//!
//! The compiler treats this as an external lazy token stream with one slot
//! of pushback; spec.md itself places tokenizing out of the core's design
//! scope but fully specifies the grammar, so it lives here rather than in
//! the host driver — without it the compiler has nothing to consume.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Number,
    String,
    Word,
    Special,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
    pub col: u32,
}

const SPECIALS: &[char] = &['{', '}', '(', ')', '[', ']'];

pub struct Tokenizer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    col: u32,
    pushback: Option<Token>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Tokenizer {
            chars: source.chars().peekable(),
            line: 1,
            col: 1,
            pushback: None,
        }
    }

    /// Un-reads `token`, so the next call to [`Tokenizer::next`] returns it
    /// again instead of continuing to lex. Only one token of pushback is
    /// supported, matching the compiler's single-token lookahead needs
    /// (e.g. checking whether `if` is immediately followed by `else`).
    pub fn push_back(&mut self, token: Token) {
        debug_assert!(self.pushback.is_none(), "only one token of pushback");
        self.pushback = Some(token);
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => {
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    if ahead.peek() == Some(&'/') {
                        while let Some(c) = self.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.bump();
                        }
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
    }

    /// Reads the next token, total over the input (EOF is a token kind, not
    /// an `Option::None`).
    pub fn next(&mut self) -> Result<Token, (String, u32, u32)> {
        if let Some(tok) = self.pushback.take() {
            return Ok(tok);
        }
        self.skip_trivia();
        let (line, col) = (self.line, self.col);
        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                text: String::new(),
                line,
                col,
            });
        };

        if SPECIALS.contains(&c) {
            self.bump();
            return Ok(Token {
                kind: TokenKind::Special,
                text: c.to_string(),
                line,
                col,
            });
        }

        if c == '"' {
            return self.read_string(line, col);
        }

        if c.is_ascii_digit() || (c == '-' && self.looks_like_number()) {
            return self.read_number(line, col);
        }

        self.read_word(line, col)
    }

    fn looks_like_number(&self) -> bool {
        let mut ahead = self.chars.clone();
        ahead.next();
        matches!(ahead.peek(), Some(c) if c.is_ascii_digit())
    }

    fn read_string(&mut self, line: u32, col: u32) -> Result<Token, (String, u32, u32)> {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(("unterminated string literal".into(), line, col)),
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    Some(other) => {
                        return Err((format!("invalid escape \\{other}"), self.line, self.col))
                    }
                    None => return Err(("unterminated string literal".into(), line, col)),
                },
                Some(c) => text.push(c),
            }
        }
        Ok(Token {
            kind: TokenKind::String,
            text,
            line,
            col,
        })
    }

    fn read_number(&mut self, line: u32, col: u32) -> Result<Token, (String, u32, u32)> {
        let mut text = String::new();
        if self.peek() == Some('-') {
            text.push(self.bump().unwrap());
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            text.push(self.bump().unwrap());
        }
        if self.peek() == Some('.') {
            let mut ahead = self.chars.clone();
            ahead.next();
            if matches!(ahead.peek(), Some(c) if c.is_ascii_digit()) {
                text.push(self.bump().unwrap());
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    text.push(self.bump().unwrap());
                }
            }
        }
        Ok(Token {
            kind: TokenKind::Number,
            text,
            line,
            col,
        })
    }

    fn read_word(&mut self, line: u32, col: u32) -> Result<Token, (String, u32, u32)> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || SPECIALS.contains(&c) || c == '"' {
                break;
            }
            text.push(self.bump().unwrap());
        }
        Ok(Token {
            kind: TokenKind::Word,
            text,
            line,
            col,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        let mut t = Tokenizer::new(src);
        let mut out = Vec::new();
        loop {
            let tok = t.next().unwrap();
            if tok.kind == TokenKind::Eof {
                out.push(tok);
                break;
            }
            out.push(tok);
        }
        out
    }

    #[test]
    fn lexes_arithmetic_line() {
        let toks = lex("5 3 +");
        let kinds: Vec<_> = toks.iter().map(|t| (t.kind, t.text.clone())).collect();
        assert_eq!(
            kinds,
            vec![
                (TokenKind::Number, "5".into()),
                (TokenKind::Number, "3".into()),
                (TokenKind::Word, "+".into()),
                (TokenKind::Eof, "".into()),
            ]
        );
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let toks = lex("// comment\n\n5 // trailing\n");
        assert_eq!(toks[0].kind, TokenKind::Number);
        assert_eq!(toks[0].text, "5");
    }

    #[test]
    fn lexes_string_with_escapes() {
        let toks = lex("\"a\\nb\"");
        assert_eq!(toks[0].kind, TokenKind::String);
        assert_eq!(toks[0].text, "a\nb");
    }

    #[test]
    fn lexes_brackets_as_special_tokens() {
        let toks = lex("( 1 2 )");
        assert_eq!(toks[0].kind, TokenKind::Special);
        assert_eq!(toks[0].text, "(");
        assert_eq!(toks[3].kind, TokenKind::Special);
        assert_eq!(toks[3].text, ")");
    }

    #[test]
    fn reports_line_and_column() {
        let toks = lex("1\n2");
        assert_eq!(toks[0].line, 1);
        assert_eq!(toks[1].line, 2);
        assert_eq!(toks[1].col, 1);
    }

    #[test]
    fn push_back_replays_same_token() {
        let mut t = Tokenizer::new("5 3 +");
        let first = t.next().unwrap();
        let second = t.next().unwrap();
        t.push_back(second.clone());
        let replayed = t.next().unwrap();
        assert_eq!(replayed, second);
        let third = t.next().unwrap();
        assert_eq!(third.text, "+");
        let _ = first;
    }

    #[test]
    fn negative_number_vs_word() {
        let toks = lex("-5 -x");
        assert_eq!(toks[0].kind, TokenKind::Number);
        assert_eq!(toks[0].text, "-5");
        assert_eq!(toks[1].kind, TokenKind::Word);
        assert_eq!(toks[1].text, "-x");
    }
}
