use tracing::{trace, warn};

use crate::error::ParseError;
use crate::ir::ast::{self, Node, NodeKind};
use crate::ir::token::{Token, TokenKind};
use crate::runtime::script::Script;

use super::lexer::Lexer;

/// Итог разбора: ошибки, готовые верхнеуровневые узлы и полный поток токенов
/// (включая пробелы и комментарии).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParseResult {
    pub errors: Vec<ParseError>,
    pub nodes: Vec<Node>,
    pub tokens: Vec<Token>,
}

impl ParseResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Канонический исходник программы.
    pub fn render(&self) -> String {
        ast::render_program(&self.nodes)
    }

    /// Программа без ошибок либо первая ошибка.
    pub fn into_result(self) -> Result<Vec<Node>, ParseError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(self.nodes),
        }
    }

    pub fn to_script(&self) -> Script {
        Script::new(self.nodes.clone())
    }
}

/// Рекурсивный спуск с одним токеном возврата (`unscan`).
///
/// Парсер одноразовый: повторный `parse` отдает закешированный результат.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    result: Option<ParseResult>,
    tokens: Vec<Token>,
    last: Option<Token>,
    pushed_back: bool,
    eof_seen: bool,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            lexer: Lexer::new(source),
            result: None,
            tokens: Vec::new(),
            last: None,
            pushed_back: false,
            eof_seen: false,
        }
    }

    pub fn parse(&mut self) -> &ParseResult {
        let result = match self.result.take() {
            Some(result) => result,
            None => self.parse_program(),
        };
        self.result.insert(result)
    }

    fn parse_program(&mut self) -> ParseResult {
        let mut nodes = Vec::new();
        let mut errors = Vec::new();

        // только пробелы и комментарии до конца ввода
        let mut token = self.next_token();
        if token.is(TokenKind::Eof) {
            errors.push(ParseError::Empty);
        }
        while !token.is(TokenKind::Eof) {
            if !token.is(TokenKind::Newline) {
                self.unscan();
                match self.parse_item() {
                    Ok(node) => nodes.push(node),
                    Err(err) => {
                        warn!(error = %err, "parse failed");
                        errors.push(err);
                        break;
                    }
                }
            }
            token = self.next_token();
        }

        ParseResult { errors, nodes, tokens: std::mem::take(&mut self.tokens) }
    }

    fn parse_item(&mut self) -> Result<Node, ParseError> {
        let token = self.next_token();
        match token.kind {
            TokenKind::Identifier => {
                self.unscan();
                self.parse_function()
            }
            _ => Err(self.fail(&token, ParseError::unexpected(&token, &[]))),
        }
    }

    fn parse_function(&mut self) -> Result<Node, ParseError> {
        let token = self.next_token();
        if !token.is(TokenKind::Identifier) {
            return Err(self.fail(&token, ParseError::unexpected(&token, &[])));
        }

        trace!(name = %token.text, "parsing function");
        let mut node = Node::new(NodeKind::Function, token);
        self.expect(TokenKind::LParen)?;

        let mut token = self.next_token();
        if !token.is(TokenKind::RParen) {
            loop {
                if !token.is(TokenKind::Identifier) {
                    let expected: &[TokenKind] = if node.args.is_empty() {
                        &[TokenKind::RParen, TokenKind::Identifier]
                    } else {
                        &[TokenKind::Identifier]
                    };
                    return Err(self.fail(&token, ParseError::unexpected(&token, expected)));
                }
                self.unscan();
                node.args.push(self.parse_argument()?);

                token = self.next_token();
                match token.kind {
                    TokenKind::Comma => token = self.next_token(),
                    TokenKind::RParen => break,
                    _ => {
                        let expected = [TokenKind::Comma, TokenKind::RParen];
                        return Err(self.fail(&token, ParseError::unexpected(&token, &expected)));
                    }
                }
            }
        }

        let token = self.next_token();
        if !token.is(TokenKind::Colon) {
            self.unscan();
            return Ok(node);
        }

        self.expect(TokenKind::Newline)?;
        node.children = self.parse_block()?;
        Ok(node)
    }

    // Отступ первой строки блока задает отступ всего блока. Блок идет, пока
    // строки начинаются ровно с того же пробельного токена.
    fn parse_block(&mut self) -> Result<Vec<Node>, ParseError> {
        let token = self.scan();
        if !token.is(TokenKind::Whitespace) {
            return Err(ParseError::unexpected(&token, &[TokenKind::Whitespace]));
        }

        let indent = token.text;
        trace!(indent = indent.len(), "parsing block");
        let mut children = Vec::new();
        loop {
            let token = self.next_token();
            if !token.is(TokenKind::Newline) {
                self.unscan();
                children.push(self.parse_item()?);
            }

            let mut token = self.scan();
            while token.is(TokenKind::Newline) {
                token = self.scan();
            }
            if !(token.is(TokenKind::Whitespace) && token.text == indent) {
                self.unscan();
                return Ok(children);
            }
        }
    }

    fn parse_argument(&mut self) -> Result<Node, ParseError> {
        let token = self.next_token();
        if !token.is(TokenKind::Identifier) {
            return Err(self.fail(&token, ParseError::unexpected(&token, &[TokenKind::Identifier])));
        }

        trace!(name = %token.text, "parsing function argument");
        let node = Node::new(NodeKind::Argument, token);
        self.expect(TokenKind::Equals)?;

        let token = self.next_token();
        let kind = match token.kind {
            TokenKind::Number | TokenKind::Text | TokenKind::Duration => NodeKind::Constant,
            TokenKind::Resource => NodeKind::Resource,
            TokenKind::Variable => NodeKind::Variable,
            _ => return Err(self.fail(&token, ParseError::invalid_argument(&token))),
        };
        Ok(node.with_child(Node::new(kind, token)))
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token, ParseError> {
        let token = self.next_token();
        if token.is(expected) {
            Ok(token)
        } else {
            Err(self.fail(&token, ParseError::unexpected(&token, &[expected])))
        }
    }

    // Остаток строки уходит в трассу токенов, но не порождает новых ошибок.
    fn fail(&mut self, token: &Token, err: ParseError) -> ParseError {
        if !matches!(token.kind, TokenKind::Newline | TokenKind::Eof) {
            self.clear_to_newline();
        }
        err
    }

    fn clear_to_newline(&mut self) {
        trace!("clearing to newline");
        loop {
            let token = self.next_token();
            if token.is(TokenKind::Newline) || token.is(TokenKind::Eof) {
                break;
            }
        }
        self.unscan();
    }

    // Вспомогательные методы

    fn scan(&mut self) -> Token {
        if self.pushed_back {
            if let Some(token) = &self.last {
                self.pushed_back = false;
                return token.clone();
            }
        }

        let token = self.lexer.scan();
        if !(token.is(TokenKind::Eof) && self.eof_seen) {
            self.eof_seen |= token.is(TokenKind::Eof);
            self.tokens.push(token.clone());
        }
        self.last = Some(token.clone());
        token
    }

    /// Следующий значимый токен: пробелы и комментарии пропускаются.
    fn next_token(&mut self) -> Token {
        let mut token = self.scan();
        while token.kind.is_trivia() {
            token = self.scan();
        }
        trace!(token = %token, "scanned");
        token
    }

    fn unscan(&mut self) {
        self.pushed_back = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_to_strings(input: &str) -> Vec<String> {
        let mut parser = Parser::new(input);
        let result = parser.parse();
        assert!(result.is_ok(), "unexpected errors parsing {input:?}: {:?}", result.errors);
        result.nodes.iter().map(Node::to_string).collect()
    }

    fn first_error(input: &str) -> ParseError {
        let mut parser = Parser::new(input);
        let result = parser.parse();
        assert_eq!(result.errors.len(), 1, "expected one error parsing {input:?}");
        result.errors[0].clone()
    }

    #[test]
    fn empty_input() {
        let mut parser = Parser::new("");
        let result = parser.parse();
        assert_eq!(result.errors, vec![ParseError::Empty]);
        assert_eq!(result.errors[0].to_string(), "Nothing to parse");
        assert!(result.nodes.is_empty());
    }

    #[test]
    fn comment_without_newline_is_empty() {
        assert_eq!(first_error("  # nothing here"), ParseError::Empty);
    }

    #[test]
    fn blank_lines_are_a_program_without_nodes() {
        for input in ["\n\n", "# note\n", "  \n# a\n\n"] {
            let mut parser = Parser::new(input);
            let result = parser.parse();
            assert!(result.is_ok(), "unexpected errors parsing {input:?}: {:?}", result.errors);
            assert!(result.nodes.is_empty());

            let mut script = result.to_script();
            assert_eq!(script.start(), Ok(crate::runtime::ScriptState::Finished));
        }
    }

    #[test]
    fn block_must_start_on_next_line() {
        let err = first_error("a():\n\n  b()");
        assert_eq!(err.expected(), &[TokenKind::Whitespace]);
        assert_eq!(err.position(), Some((1, 0)));
    }

    #[test]
    fn double_parsing_returns_cached_result() {
        let mut parser = Parser::new("clear()");
        let first = parser.parse().clone();
        let second = parser.parse();
        assert_eq!(&first, second);
        assert_eq!(second.nodes[0].to_string(), "[NodeFunction]clear()");
    }

    #[test]
    fn parses_programs() {
        let cases = [
            ("clear()", vec!["[NodeFunction]clear()"]),
            (
                "say(text='hello')",
                vec!["[NodeFunction]say([NodeArgument]text()->([NodeConstant]hello()))"],
            ),
            (
                "say(text='hello') # test\nsay(text='world')",
                vec![
                    "[NodeFunction]say([NodeArgument]text()->([NodeConstant]hello()))",
                    "[NodeFunction]say([NodeArgument]text()->([NodeConstant]world()))",
                ],
            ),
            (
                "show(resource=@hello)",
                vec!["[NodeFunction]show([NodeArgument]resource()->([NodeResource]hello()))"],
            ),
            (
                "set(variable=&count, value=1)",
                vec![
                    "[NodeFunction]set([NodeArgument]variable()->([NodeVariable]count()),\
                     [NodeArgument]value()->([NodeConstant]1()))",
                ],
            ),
            (
                "waitForTime(duration=5m)",
                vec!["[NodeFunction]waitForTime([NodeArgument]duration()->([NodeConstant]5m()))"],
            ),
            ("waitForInput():\n  clear()", vec!["[NodeFunction]waitForInput()->([NodeFunction]clear())"]),
            (
                "waitForInput():\n  #clear()\n  say(text=@hello)",
                vec![
                    "[NodeFunction]waitForInput()->([NodeFunction]say([NodeArgument]text()->([NodeResource]hello())))",
                ],
            ),
            ("\n\nclear()\n\n", vec!["[NodeFunction]clear()"]),
        ];

        for (input, expected) in cases {
            assert_eq!(parse_to_strings(input), expected, "parsing {input:?}");
        }
    }

    #[test]
    fn block_keeps_children_in_order() {
        let mut parser = Parser::new("waitForInput():\n  clear()\n  say(text=@hello)");
        let result = parser.parse();
        assert!(result.is_ok());
        assert_eq!(result.nodes.len(), 1);

        let node = &result.nodes[0];
        assert_eq!(node.text(), "waitForInput");
        let names: Vec<_> = node.children.iter().map(Node::text).collect();
        assert_eq!(names, vec!["clear", "say"]);

        let value = node.children[1].args[0].value().unwrap();
        assert_eq!(value.kind, NodeKind::Resource);
    }

    #[test]
    fn dedent_ends_block() {
        let nodes = parse_to_strings("wait():\n  clear()\n\n  say(text='a')\nsay(text='b')");
        assert_eq!(nodes.len(), 2);
        assert!(nodes[0].ends_with("->([NodeFunction]clear(),[NodeFunction]say([NodeArgument]text()->([NodeConstant]a())))"));
        assert_eq!(nodes[1], "[NodeFunction]say([NodeArgument]text()->([NodeConstant]b()))");
    }

    #[test]
    fn nested_blocks() {
        let nodes = parse_to_strings("a():\n  b():\n    c()\n  d()\ne()");
        assert_eq!(
            nodes,
            vec![
                "[NodeFunction]a()->([NodeFunction]b()->([NodeFunction]c()),[NodeFunction]d())",
                "[NodeFunction]e()",
            ]
        );
    }

    #[test]
    fn different_indent_string_ends_block() {
        // таб и пробелы - разные отступы
        let nodes = parse_to_strings("a():\n\tb()\n  c()");
        assert_eq!(nodes, vec!["[NodeFunction]a()->([NodeFunction]b())", "[NodeFunction]c()"]);
    }

    #[test]
    fn reports_errors() {
        let cases = [
            ("clear", "Unexpected token '<EOF>', expected TokenOpenBracket at line 0, pos 5"),
            (
                "clear(",
                "Unexpected token '<EOF>', expected TokenCloseBracket or TokenIdentifier at line 0, pos 6",
            ),
            ("clear--", "Unexpected token '-', expected TokenOpenBracket at line 0, pos 5"),
            ("say(text)", "Unexpected token ')', expected TokenEquals at line 0, pos 8"),
            (
                "say(text=clear)",
                "Unable to parse function arg, found 'clear' [TokenIdentifier] at line 0, pos 9",
            ),
            (
                "say(a=1 b=2)",
                "Unexpected token 'b', expected TokenComma or TokenCloseBracket at line 0, pos 8",
            ),
            ("say(a=1,)", "Unexpected token ')', expected TokenIdentifier at line 0, pos 8"),
            ("wait(): clear()", "Unexpected token 'clear', expected TokenNewLine at line 0, pos 8"),
            ("wait():\nclear()", "Unexpected token 'clear', expected TokenWhitespace at line 1, pos 0"),
            ("'text'", "Unexpected token 'text' at line 0, pos 0"),
        ];

        for (input, expected) in cases {
            assert_eq!(first_error(input).to_string(), expected, "parsing {input:?}");
        }
    }

    #[test]
    fn error_keeps_completed_nodes_and_trace() {
        let mut parser = Parser::new("clear()\nsay(text=) trailing\nclear()");
        let result = parser.parse();

        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].position(), Some((1, 9)));
        assert_eq!(result.nodes.len(), 1);

        // хвост строки попал в трассу, следующая строка - нет
        let last = result.tokens.last().unwrap();
        assert_eq!(last.kind, TokenKind::Newline);
        assert!(result.tokens.iter().any(|t| t.text == "trailing"));
        assert_eq!(result.tokens.iter().filter(|t| t.text == "clear").count(), 1);
    }

    #[test]
    fn trace_includes_trivia_and_single_eof() {
        let mut parser = Parser::new("clear() # done");
        let result = parser.parse();
        let kinds: Vec<_> = result.tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Identifier,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Whitespace,
                TokenKind::Comment,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn renders_canonical_source() {
        let input = "say(text='hi',  who=@me)   # greet\n\nwait(for=5m):\n    clear()\n    set(variable=&x, value=1.5)";
        let mut parser = Parser::new(input);
        assert_eq!(
            parser.parse().render(),
            "say(text='hi', who=@me)\nwait(for=5m):\n  clear()\n  set(variable=&x, value=1.5)"
        );
    }
}
