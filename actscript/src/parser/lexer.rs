use std::iter::Peekable;
use std::str::CharIndices;

use crate::ir::token::{EOF_TEXT, Token, TokenKind};
use crate::span::Span;

/// Маркер ссылки на ресурс: @name
pub const RESOURCE_SIGIL: char = '@';
/// Маркер ссылки на переменную: &name
pub const VARIABLE_SIGIL: char = '&';
/// Комментарий до конца строки: # ...
pub const COMMENT_MARKER: char = '#';

const DURATION_UNITS: [char; 4] = ['d', 'h', 'm', 's'];

/// Посимвольный сканер. Каждый вызов `scan` отдает ровно один токен;
/// после конца ввода всегда возвращается `TokenKind::Eof`.
pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            line: 0,
            column: 0,
        }
    }

    pub fn scan(&mut self) -> Token {
        let column = self.column;
        let Some((start, ch)) = self.bump() else {
            let end = self.source.len();
            return Token::new(TokenKind::Eof, EOF_TEXT, Span::new(self.line, column, end, end));
        };

        let (kind, text) = match ch {
            ' ' | '\t' | '\r' => {
                let mut text = String::from(ch);
                text.push_str(&self.take_while(is_whitespace));
                (TokenKind::Whitespace, text)
            }
            RESOURCE_SIGIL => (TokenKind::Resource, self.take_while(is_ident_char)),
            VARIABLE_SIGIL => (TokenKind::Variable, self.take_while(is_ident_char)),
            'a'..='z' | 'A'..='Z' => {
                let mut text = String::from(ch);
                text.push_str(&self.take_while(is_ident_char));
                (TokenKind::Identifier, text)
            }
            '0'..='9' => self.scan_number(ch),
            '\'' => (TokenKind::Text, self.scan_text()),
            COMMENT_MARKER => (TokenKind::Comment, self.take_while(|c| c != '\n')),
            '\n' => (TokenKind::Newline, String::from(ch)),
            '(' => (TokenKind::LParen, String::from(ch)),
            ')' => (TokenKind::RParen, String::from(ch)),
            ',' => (TokenKind::Comma, String::from(ch)),
            ':' => (TokenKind::Colon, String::from(ch)),
            '=' => (TokenKind::Equals, String::from(ch)),
            '+' | '-' | '*' | '/' | '%' | '<' | '>' => (TokenKind::Operator, String::from(ch)),
            _ => (TokenKind::Illegal, String::from(ch)),
        };

        let token = Token::new(kind, text, Span::new(self.line, column, start, self.offset()));
        if kind == TokenKind::Newline {
            self.line += 1;
            self.column = 0;
        }
        token
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if next.is_some() {
            self.column += 1;
        }
        next
    }

    fn offset(&mut self) -> usize {
        self.chars.peek().map(|&(pos, _)| pos).unwrap_or(self.source.len())
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        while let Some(&(_, ch)) = self.chars.peek() {
            if !pred(ch) {
                break;
            }
            self.bump();
            text.push(ch);
        }
        text
    }

    // Цифры, максимум одна точка и единицы d/h/m/s (каждая не больше раза).
    // Повторная единица завершает литерал: `1d2d` -> `1d2` + `d`.
    fn scan_number(&mut self, first: char) -> (TokenKind, String) {
        let mut text = String::from(first);
        let mut seen_dot = false;
        let mut seen_units = [false; 4];

        while let Some(&(_, ch)) = self.chars.peek() {
            match ch {
                '0'..='9' => {}
                '.' if !seen_dot => seen_dot = true,
                _ => match DURATION_UNITS.iter().position(|&unit| unit == ch) {
                    Some(idx) if !seen_units[idx] => seen_units[idx] = true,
                    _ => break,
                },
            }
            self.bump();
            text.push(ch);
        }

        if seen_units.iter().any(|&seen| seen) {
            (TokenKind::Duration, text)
        } else {
            (TokenKind::Number, text)
        }
    }

    fn scan_text(&mut self) -> String {
        let text = self.take_while(|c| c != '\'');
        // closing quote, if any
        self.bump();
        text
    }
}

fn is_whitespace(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\r')
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// Весь поток токенов, включая завершающий `Eof`.
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.scan();
        let done = token.is(TokenKind::Eof);
        tokens.push(token);
        if done {
            return tokens;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn first(input: &str) -> (TokenKind, String) {
        let token = Lexer::new(input).scan();
        (token.kind, token.text)
    }

    fn kinds(input: &str) -> Vec<(TokenKind, String)> {
        tokenize(input).into_iter().map(|t| (t.kind, t.text)).collect()
    }

    #[test]
    fn scans_single_tokens() {
        let cases = [
            ("", TokenKind::Eof, EOF_TEXT),
            (" ", TokenKind::Whitespace, " "),
            ("\t", TokenKind::Whitespace, "\t"),
            ("\r", TokenKind::Whitespace, "\r"),
            ("\n", TokenKind::Newline, "\n"),
            (":", TokenKind::Colon, ":"),
            (",", TokenKind::Comma, ","),
            ("(", TokenKind::LParen, "("),
            (")", TokenKind::RParen, ")"),
            ("=", TokenKind::Equals, "="),
            ("&test", TokenKind::Variable, "test"),
            ("@test", TokenKind::Resource, "test"),
            ("test", TokenKind::Identifier, "test"),
            ("'text'", TokenKind::Text, "text"),
            ("1", TokenKind::Number, "1"),
            ("1.2", TokenKind::Number, "1.2"),
            ("1d", TokenKind::Duration, "1d"),
            ("1h", TokenKind::Duration, "1h"),
            ("1m", TokenKind::Duration, "1m"),
            ("1s", TokenKind::Duration, "1s"),
            ("1d2h3m4s", TokenKind::Duration, "1d2h3m4s"),
            ("4s3m", TokenKind::Duration, "4s3m"),
            ("-", TokenKind::Operator, "-"),
            ("%", TokenKind::Operator, "%"),
            ("# note", TokenKind::Comment, " note"),
            ("$", TokenKind::Illegal, "$"),
        ];

        for (input, kind, text) in cases {
            assert_eq!(first(input), (kind, text.to_string()), "scanning {input:?}");
        }
    }

    #[test]
    fn repeated_unit_ends_duration() {
        assert_eq!(
            kinds("1d2d"),
            vec![
                (TokenKind::Duration, "1d2".to_string()),
                (TokenKind::Identifier, "d".to_string()),
                (TokenKind::Eof, EOF_TEXT.to_string()),
            ]
        );
    }

    #[test]
    fn second_dot_ends_number() {
        let tokens = kinds("1.2.3");
        assert_eq!(tokens[0], (TokenKind::Number, "1.2".to_string()));
        assert_eq!(tokens[1], (TokenKind::Illegal, ".".to_string()));
    }

    #[test]
    fn whitespace_run_stops_at_newline() {
        assert_eq!(
            kinds(" \t\n  "),
            vec![
                (TokenKind::Whitespace, " \t".to_string()),
                (TokenKind::Newline, "\n".to_string()),
                (TokenKind::Whitespace, "  ".to_string()),
                (TokenKind::Eof, EOF_TEXT.to_string()),
            ]
        );
    }

    #[test]
    fn unterminated_text_runs_to_end() {
        assert_eq!(first("'open"), (TokenKind::Text, "open".to_string()));
    }

    #[test]
    fn comment_does_not_swallow_newline() {
        let tokens = kinds("# hi\nclear");
        assert_eq!(tokens[0].0, TokenKind::Comment);
        assert_eq!(tokens[1].0, TokenKind::Newline);
        assert_eq!(tokens[2], (TokenKind::Identifier, "clear".to_string()));
    }

    #[test]
    fn tracks_line_and_column() {
        let tokens = tokenize("say(text='hi')\n  clear()");
        let positions: Vec<_> = tokens.iter().map(|t| (t.kind, t.line(), t.column())).collect();
        assert_eq!(
            positions,
            vec![
                (TokenKind::Identifier, 0, 0),
                (TokenKind::LParen, 0, 3),
                (TokenKind::Identifier, 0, 4),
                (TokenKind::Equals, 0, 8),
                (TokenKind::Text, 0, 9),
                (TokenKind::RParen, 0, 13),
                (TokenKind::Newline, 0, 14),
                (TokenKind::Whitespace, 1, 0),
                (TokenKind::Identifier, 1, 2),
                (TokenKind::LParen, 1, 7),
                (TokenKind::RParen, 1, 8),
                (TokenKind::Eof, 1, 9),
            ]
        );
    }

    #[test]
    fn byte_span_covers_lexeme() {
        let tokens = tokenize("ab @res");
        assert_eq!((tokens[2].span.start, tokens[2].span.end), (3, 7));
    }

    #[test]
    fn eof_is_idempotent() {
        let mut lexer = Lexer::new("x");
        assert_eq!(lexer.scan().kind, TokenKind::Identifier);
        for _ in 0..3 {
            let token = lexer.scan();
            assert_eq!(token.kind, TokenKind::Eof);
            assert_eq!(token.column(), 1);
        }
    }
}
