use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

use once_cell::sync::OnceCell;
use strum_macros::{Display, EnumString};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
pub enum TokenType {
    // Single-character tokens.
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Star,

    // One or two character tokens.
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals.
    Identifier,
    String,
    Number,

    // Keywords.
    And,
    Class,
    Else,
    False,
    For,
    Func,
    If,
    Let,
    None,
    Or,
    Print,
    Return,
    Super,
    This,
    True,
    While,

    Error,
    Eof,
}

static KEYWORDS: phf::Map<&'static str, TokenType> = phf::phf_map! {
    "and" => TokenType::And,
    "class" => TokenType::Class,
    "else" => TokenType::Else,
    "false" => TokenType::False,
    "for" => TokenType::For,
    "func" => TokenType::Func,
    "if" => TokenType::If,
    "let" => TokenType::Let,
    "none" => TokenType::None,
    "or" => TokenType::Or,
    "print" => TokenType::Print,
    "return" => TokenType::Return,
    "super" => TokenType::Super,
    "this" => TokenType::This,
    "true" => TokenType::True,
    "while" => TokenType::While,
};

#[derive(Debug)]
struct TrieNode {
    children: HashMap<char, TrieNode>,
    token_type: Option<TokenType>,
    is_end: bool,
}

impl TrieNode {
    fn new() -> Self {
        TrieNode {
            children: HashMap::new(),
            token_type: None,
            is_end: false,
        }
    }
}

static TRIE_ROOT: OnceCell<TrieNode> = OnceCell::new();

#[derive(Debug, Clone)]
pub struct Token<'a> {
    pub token_type: TokenType,
    pub value: &'a str,
    pub line: usize,
}

pub struct Scanner<'a> {
    source: &'a str,
    chars: Peekable<Chars<'a>>,
    start: usize,
    current: usize,
    line: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Box<Scanner<'a>> {
        TRIE_ROOT.get_or_init(|| {
            let mut root = TrieNode::new();
            for (keyword, token) in KEYWORDS.entries() {
                let mut current_node = &mut root;
                for c in keyword.chars() {
                    current_node = current_node.children.entry(c).or_insert(TrieNode::new());
                }
                current_node.token_type = Some(*token);
                current_node.is_end = true;
            }
            root
        });

        let chars = source.chars().peekable();
        Box::new(Scanner {
            source,
            chars,
            start: 0,
            current: 0,
            line: 1,
        })
    }

    pub fn scan_token(&mut self) -> Token<'a> {
        self.skip_whitespace();
        self.start = self.current;

        if self.is_end() {
            return self.make_token(TokenType::Eof);
        }

        let c = self.advance();

        if Self::is_alpha(c) {
            return self.make_identifier_token();
        }

        if Self::is_digit(c) {
            return self.make_number_token();
        }

        match c {
            '(' => self.make_token(TokenType::LeftParen),
            ')' => self.make_token(TokenType::RightParen),
            '{' => self.make_token(TokenType::LeftBrace),
            '}' => self.make_token(TokenType::RightBrace),
            ';' => self.make_token(TokenType::Semicolon),
            ',' => self.make_token(TokenType::Comma),
            '.' => self.make_token(TokenType::Dot),
            '-' => self.make_token(TokenType::Minus),
            '+' => self.make_token(TokenType::Plus),
            '/' => self.make_token(TokenType::Slash),
            '*' => self.make_token(TokenType::Star),
            '"' => self.make_string_token(),
            '!' => {
                if self.match_char('=') {
                    self.make_token(TokenType::BangEqual)
                } else {
                    self.make_token(TokenType::Bang)
                }
            }
            '=' => {
                if self.match_char('=') {
                    self.make_token(TokenType::EqualEqual)
                } else {
                    self.make_token(TokenType::Equal)
                }
            }
            '<' => {
                if self.match_char('=') {
                    self.make_token(TokenType::LessEqual)
                } else {
                    self.make_token(TokenType::Less)
                }
            }
            '>' => {
                if self.match_char('=') {
                    self.make_token(TokenType::GreaterEqual)
                } else {
                    self.make_token(TokenType::Greater)
                }
            }
            _ => self.error_token("Unexpected character."),
        }
    }

    fn is_digit(ch: char) -> bool {
        ch.is_ascii_digit()
    }

    fn is_alpha(ch: char) -> bool {
        ch.is_ascii_alphabetic() || ch == '_'
    }

    fn make_identifier_token(&mut self) -> Token<'a> {
        loop {
            match self.peek() {
                Some(c) if Self::is_alpha(*c) || Self::is_digit(*c) => self.advance(),
                _ => break,
            };
        }
        let token_type = self.identifier_type();
        self.make_token(token_type)
    }

    fn identifier_type(&self) -> TokenType {
        let trie_root = TRIE_ROOT.get().expect("keyword trie not initialized");
        let mut current_node = trie_root;
        for ch in self.source[self.start..self.current].chars() {
            match current_node.children.get(&ch) {
                Some(child) => current_node = child,
                None => return TokenType::Identifier,
            }
        }
        if current_node.is_end {
            current_node.token_type.unwrap_or(TokenType::Identifier)
        } else {
            TokenType::Identifier
        }
    }

    fn make_number_token(&mut self) -> Token<'a> {
        loop {
            match self.peek() {
                Some(c) if Self::is_digit(*c) => self.advance(),
                _ => break,
            };
        }

        // A '.' only belongs to the number when a digit follows it.
        if let Some('.') = self.peek() {
            if let Some(next) = self.peek_next() {
                if Self::is_digit(next) {
                    self.advance();
                    while let Some(ch) = self.peek() {
                        if Self::is_digit(*ch) {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
            }
        }

        self.make_token(TokenType::Number)
    }

    fn make_string_token(&mut self) -> Token<'a> {
        loop {
            match self.peek() {
                Some('"') => break,
                Some('\n') => {
                    self.line += 1;
                    self.advance();
                }
                Some(_) => {
                    self.advance();
                }
                None => return self.error_token("Unterminated string."),
            }
        }

        // The closing quote.
        self.advance();
        self.make_token(TokenType::String)
    }

    fn skip_whitespace(&mut self) {
        loop {
            // Cache the lookahead before peeking so the comment check does
            // not overlap the peek borrow.
            let next_char = self.peek_next();
            match (self.peek(), next_char) {
                (Some('\n'), _) => {
                    self.line += 1;
                    self.advance();
                }
                (Some(' '), _) | (Some('\r'), _) | (Some('\t'), _) => {
                    self.advance();
                }
                (Some('/'), Some('/')) => {
                    while let Some(ch) = self.peek() {
                        if *ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => return,
            }
        }
    }

    fn peek(&mut self) -> Option<&char> {
        self.chars.peek()
    }

    fn peek_next(&self) -> Option<char> {
        if self.is_end() {
            return None;
        }

        let mut iter = self.chars.clone();
        iter.next();
        iter.next()
    }

    fn is_end(&self) -> bool {
        self.current >= self.source.len()
    }

    fn make_token(&self, token_type: TokenType) -> Token<'a> {
        Token {
            token_type,
            value: &self.source[self.start..self.current],
            line: self.line,
        }
    }

    fn error_token(&self, reason: &'static str) -> Token<'a> {
        Token {
            token_type: TokenType::Error,
            value: reason,
            line: self.line,
        }
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_end() {
            return false;
        }

        if let Some(&next_char) = self.chars.peek() {
            if next_char == expected {
                self.advance();
                return true;
            }
        }
        false
    }

    fn advance(&mut self) -> char {
        if let Some(next_char) = self.chars.next() {
            self.current += next_char.len_utf8();
            next_char
        } else {
            '\0'
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Scanner, TokenType};

    fn token_types(source: &str) -> Vec<TokenType> {
        let mut scanner = Scanner::new(source);
        let mut types = vec![];
        loop {
            let token = scanner.scan_token();
            let token_type = token.token_type;
            types.push(token_type);
            if token_type == TokenType::Eof || token_type == TokenType::Error {
                break;
            }
        }
        types
    }

    #[test]
    fn keywords_and_identifiers() {
        let mut scanner = Scanner::new("this is for if func  func1 forfor let none");
        let expected = [
            (TokenType::This, "this"),
            (TokenType::Identifier, "is"),
            (TokenType::For, "for"),
            (TokenType::If, "if"),
            (TokenType::Func, "func"),
            (TokenType::Identifier, "func1"),
            (TokenType::Identifier, "forfor"),
            (TokenType::Let, "let"),
            (TokenType::None, "none"),
            (TokenType::Eof, ""),
        ];
        for (token_type, value) in expected {
            let token = scanner.scan_token();
            assert_eq!(token.token_type, token_type);
            assert_eq!(token.value, value);
        }
    }

    #[test]
    fn operators_single_and_double() {
        assert_eq!(
            token_types("= == ! != < <= > >= + - * / ."),
            vec![
                TokenType::Equal,
                TokenType::EqualEqual,
                TokenType::Bang,
                TokenType::BangEqual,
                TokenType::Less,
                TokenType::LessEqual,
                TokenType::Greater,
                TokenType::GreaterEqual,
                TokenType::Plus,
                TokenType::Minus,
                TokenType::Star,
                TokenType::Slash,
                TokenType::Dot,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn numbers_with_and_without_fraction() {
        let mut scanner = Scanner::new("12 3.75 8.");
        let token = scanner.scan_token();
        assert_eq!(token.token_type, TokenType::Number);
        assert_eq!(token.value, "12");

        let token = scanner.scan_token();
        assert_eq!(token.token_type, TokenType::Number);
        assert_eq!(token.value, "3.75");

        // A trailing dot is not part of the number.
        let token = scanner.scan_token();
        assert_eq!(token.token_type, TokenType::Number);
        assert_eq!(token.value, "8");
        assert_eq!(scanner.scan_token().token_type, TokenType::Dot);
    }

    #[test]
    fn string_literals_may_span_lines() {
        let mut scanner = Scanner::new("\"first\nsecond\" end");
        let token = scanner.scan_token();
        assert_eq!(token.token_type, TokenType::String);
        assert_eq!(token.value, "\"first\nsecond\"");

        let token = scanner.scan_token();
        assert_eq!(token.token_type, TokenType::Identifier);
        assert_eq!(token.line, 2);
    }

    #[test]
    fn unterminated_string_is_an_error_token() {
        let mut scanner = Scanner::new("\"never closed");
        let token = scanner.scan_token();
        assert_eq!(token.token_type, TokenType::Error);
        assert_eq!(token.value, "Unterminated string.");
    }

    #[test]
    fn unexpected_character_is_an_error_token() {
        let mut scanner = Scanner::new("let a = 1 % 2;");
        let types = token_types("let a = 1 % 2;");
        assert!(types.contains(&TokenType::Error));
        // Independent scanner keeps the well-formed prefix intact.
        assert_eq!(scanner.scan_token().token_type, TokenType::Let);
    }

    #[test]
    fn comments_and_whitespace_track_lines() {
        let source = "// leading comment\nlet a = 1;\n// trailing\nprint a;";
        let mut scanner = Scanner::new(source);
        let token = scanner.scan_token();
        assert_eq!(token.token_type, TokenType::Let);
        assert_eq!(token.line, 2);

        for _ in 0..4 {
            scanner.scan_token();
        }
        let token = scanner.scan_token();
        assert_eq!(token.token_type, TokenType::Print);
        assert_eq!(token.line, 4);
    }
}
