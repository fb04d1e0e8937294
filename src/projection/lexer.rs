//! Character-level lexer shared by the projection and filter parsers

/// Lexer errors carry the position they occurred at
pub type LexResult<T> = std::result::Result<T, String>;

pub struct Lexer<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    pub fn source(&self) -> &str {
        self.source
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move back to an earlier position
    pub fn rewind(&mut self, position: usize) {
        self.pos = position.min(self.pos);
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    pub fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    pub fn next_char(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    pub fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    /// Consume `c` if it is next
    pub fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume `s` if the input continues with it
    pub fn eat_str(&mut self, s: &str) -> bool {
        let n = s.chars().count();
        let matches = s
            .chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c));
        if matches {
            self.pos += n;
        }
        matches
    }

    /// Consume a keyword such as `AND` only when followed by a word boundary
    pub fn eat_keyword(&mut self, keyword: &str) -> bool {
        let n = keyword.chars().count();
        let matches = keyword
            .chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c));
        let boundary = self
            .peek_at(n)
            .map_or(true, |c| c.is_whitespace() || c == '(');
        if matches && boundary {
            self.pos += n;
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, c: char) -> LexResult<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(&format!("expected [{c}]")))
        }
    }

    pub fn error(&self, message: &str) -> String {
        match self.peek() {
            Some(c) => format!("{message} at position {} near [{c}] in [{}]", self.pos, self.source),
            None => format!("{message} at end of [{}]", self.source),
        }
    }

    /// A quoted string; the opening quote must be next
    pub fn quoted(&mut self) -> LexResult<String> {
        let Some(quote) = self.peek().filter(|c| *c == '\'' || *c == '"') else {
            return Err(self.error("expected a quoted string"));
        };
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.next_char() {
                None => return Err(self.error("unterminated string")),
                Some('\\') => match self.next_char() {
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated escape")),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
            }
        }
    }

    /// An identifier segment: letters, digits, `_`, `-`, `@`, `/`-free
    pub fn name(&mut self) -> Option<String> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '@' || (c == '-' && self.pos > start))
        {
            self.pos += 1;
        }
        (self.pos > start).then(|| self.chars[start..self.pos].iter().collect())
    }

    /// An unquoted word ending at whitespace or any of `stops`; quotes may be embedded
    pub fn word(&mut self, stops: &[char]) -> LexResult<String> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || stops.contains(&c) {
                break;
            }
            if c == '\'' || c == '"' {
                out.push_str(&self.quoted()?);
                continue;
            }
            out.push(c);
            self.pos += 1;
        }
        Ok(out)
    }

    /// Everything up to (not including) the first unquoted `stop`
    pub fn until(&mut self, stops: &[char]) -> LexResult<String> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if stops.contains(&c) {
                break;
            }
            if c == '\'' || c == '"' {
                out.push_str(&self.quoted()?);
                continue;
            }
            out.push(c);
            self.pos += 1;
        }
        Ok(out)
    }
}
