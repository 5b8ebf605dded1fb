use std::fmt;

use serde::{Deserialize, Serialize};

use super::token::{Token, TokenKind};

/// Отступ одного уровня блока при рендеринге.
pub const INDENT: &str = "  ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Узел не подходит для своего места в дереве
    #[serde(rename = "NodeInvalid")]
    Invalid,
    /// Вызов функции, пример: say(text='hello')
    #[serde(rename = "NodeFunction")]
    Function,
    /// Именованный аргумент функции
    #[serde(rename = "NodeArgument")]
    Argument,
    /// Константа: 'text', 1.5, 5m
    #[serde(rename = "NodeConstant")]
    Constant,
    /// Ссылка на ресурс: @name
    #[serde(rename = "NodeResource")]
    Resource,
    /// Ссылка на переменную: &name
    #[serde(rename = "NodeVariable")]
    Variable,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Invalid => "NodeInvalid",
            Self::Function => "NodeFunction",
            Self::Argument => "NodeArgument",
            Self::Constant => "NodeConstant",
            Self::Resource => "NodeResource",
            Self::Variable => "NodeVariable",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub token: Option<Token>,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(kind: NodeKind, token: Token) -> Self {
        Self { token: Some(token), kind, args: Vec::new(), children: Vec::new() }
    }

    pub fn with_arg(mut self, arg: Node) -> Self {
        self.args.push(arg);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Имя функции/аргумента или значение константы.
    pub fn text(&self) -> &str {
        self.token.as_ref().map(|t| t.text.as_str()).unwrap_or("")
    }

    /// Значение аргумента - единственный ребенок узла Argument.
    pub fn value(&self) -> Option<&Node> {
        match self.kind {
            NodeKind::Argument => self.children.first(),
            _ => None,
        }
    }

    /// Каноническая форма исходника: без комментариев, пустых строк и лишних пробелов.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        match self.kind {
            NodeKind::Function => {
                out.push_str(&INDENT.repeat(depth));
                out.push_str(self.text());
                out.push('(');
                let args: Vec<String> = self.args.iter().map(Node::render_inline).collect();
                out.push_str(&args.join(", "));
                out.push(')');
                if !self.children.is_empty() {
                    out.push(':');
                    for child in &self.children {
                        out.push('\n');
                        child.render_into(out, depth + 1);
                    }
                }
            }
            _ => out.push_str(&self.render_inline()),
        }
    }

    fn render_inline(&self) -> String {
        match self.kind {
            NodeKind::Argument => match self.value() {
                Some(value) => format!("{}={}", self.text(), value.render_inline()),
                None => format!("{}=", self.text()),
            },
            NodeKind::Constant => match &self.token {
                Some(token) if token.is(TokenKind::Text) => format!("'{}'", token.text),
                _ => self.text().to_string(),
            },
            NodeKind::Resource => format!("@{}", self.text()),
            NodeKind::Variable => format!("&{}", self.text()),
            NodeKind::Function | NodeKind::Invalid => self.text().to_string(),
        }
    }
}

/// Отладочная форма: `[NodeFunction]say([NodeArgument]text(...))->(...)`.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        let Some(token) = &self.token else {
            return Ok(());
        };

        write!(f, "{}(", token.text)?;
        for (pos, arg) in self.args.iter().enumerate() {
            if pos > 0 {
                f.write_str(",")?;
            }
            write!(f, "{arg}")?;
        }
        f.write_str(")")?;

        if !self.children.is_empty() {
            f.write_str("->(")?;
            for (pos, child) in self.children.iter().enumerate() {
                if pos > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{child}")?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// Рендеринг целой программы, по одному верхнеуровневому вызову на строку.
pub fn render_program(nodes: &[Node]) -> String {
    nodes.iter().map(Node::render).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Span;

    fn make_node(kind: NodeKind, token_kind: TokenKind, text: &str) -> Node {
        Node::new(kind, Token::new(token_kind, text, Span::default()))
    }

    #[test]
    fn basic_display() {
        let node = make_node(NodeKind::Function, TokenKind::Identifier, "test");
        assert_eq!(node.to_string(), "[NodeFunction]test()");
    }

    #[test]
    fn display_with_args() {
        let node = make_node(NodeKind::Function, TokenKind::Identifier, "test")
            .with_arg(make_node(NodeKind::Argument, TokenKind::Identifier, "first"))
            .with_arg(make_node(NodeKind::Argument, TokenKind::Identifier, "second"));
        assert_eq!(
            node.to_string(),
            "[NodeFunction]test([NodeArgument]first(),[NodeArgument]second())"
        );
    }

    #[test]
    fn display_with_children() {
        let node = make_node(NodeKind::Function, TokenKind::Identifier, "test")
            .with_child(make_node(NodeKind::Function, TokenKind::Identifier, "first"))
            .with_child(make_node(NodeKind::Function, TokenKind::Identifier, "second"));
        assert_eq!(
            node.to_string(),
            "[NodeFunction]test()->([NodeFunction]first(),[NodeFunction]second())"
        );
    }

    #[test]
    fn tokenless_node_shows_only_kind() {
        let node = Node { token: None, kind: NodeKind::Invalid, args: vec![], children: vec![] };
        assert_eq!(node.to_string(), "[NodeInvalid]");
    }

    #[test]
    fn renders_nested_blocks() {
        let say = make_node(NodeKind::Function, TokenKind::Identifier, "say").with_arg(
            make_node(NodeKind::Argument, TokenKind::Identifier, "text")
                .with_child(make_node(NodeKind::Constant, TokenKind::Text, "hi")),
        );
        let wait = make_node(NodeKind::Function, TokenKind::Identifier, "wait").with_child(say);
        assert_eq!(wait.render(), "wait():\n  say(text='hi')");
    }

    #[test]
    fn json_omits_empty_lists() {
        let node = make_node(NodeKind::Function, TokenKind::Identifier, "clear");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "NodeFunction");
        assert_eq!(json["token"]["value"], "clear");
        assert!(json.get("args").is_none());
        assert!(json.get("children").is_none());
    }
}
