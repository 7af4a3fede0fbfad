//! Boolean query language.
//!
//! ```text
//! exp := t (("and" | "or") exp)?
//! t   := "not" exp | "(" exp ")" | word
//! ```
//!
//! Both binary operators are right-recursive, so `a and b or c` is `And(a, Or(b, c))`, and
//! `not` applies to the whole expression that follows it.

use crate::error::{Error, Result};
use crate::tokenizer::{fold, tokenize};
use std::fmt;

/// Parse tree of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Word(String),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Not(Box<Node>),
}

impl Node {
    pub fn word(term: impl Into<String>) -> Self {
        Node::Word(term.into())
    }

    pub fn and(left: Node, right: Node) -> Self {
        Node::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Node, right: Node) -> Self {
        Node::Or(Box::new(left), Box::new(right))
    }

    pub fn not(operand: Node) -> Self {
        Node::Not(Box::new(operand))
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Word(term) => write!(f, "{term}"),
            Node::And(l, r) => write!(f, "({l} and {r})"),
            Node::Or(l, r) => write!(f, "({l} or {r})"),
            Node::Not(x) => write!(f, "(not {x})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    And,
    Or,
    Not,
    Open,
    Close,
    /// A search word as typed, with the terms it normalizes to.
    Word { text: String, terms: Vec<String> },
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::And => f.write_str("and"),
            Token::Or => f.write_str("or"),
            Token::Not => f.write_str("not"),
            Token::Open => f.write_str("("),
            Token::Close => f.write_str(")"),
            Token::Word { text, .. } => f.write_str(text),
        }
    }
}

/// Split a query into tokens. Parentheses are tokens of their own even when glued to a word;
/// every other whitespace-separated chunk is a reserved word or one search word.
pub fn lex(query: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    for chunk in query.split_whitespace() {
        let mut rest = chunk;
        while !rest.is_empty() {
            let split = rest.find(['(', ')']).unwrap_or(rest.len());
            let (word, tail) = rest.split_at(split);
            if !word.is_empty() {
                tokens.push(word_token(word));
            }
            match tail.chars().next() {
                Some('(') => tokens.push(Token::Open),
                Some(')') => tokens.push(Token::Close),
                _ => {}
            }
            rest = tail.get(1..).unwrap_or("");
        }
    }
    tokens
}

fn word_token(word: &str) -> Token {
    match fold(word).as_str() {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        _ => Token::Word { text: word.to_string(), terms: tokenize(word) },
    }
}

/// Operand for one search word: all of its terms must match. A word without any term
/// matches nothing, since no shard posts the empty term.
fn word_node(mut terms: Vec<String>) -> Node {
    let Some(last) = terms.pop() else {
        return Node::Word(String::new());
    };
    terms
        .into_iter()
        .rev()
        .fold(Node::Word(last), |right, term| Node::and(Node::Word(term), right))
}

/// Forward-only cursor over the token stream.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn exp(&mut self) -> Result<Node> {
        let left = self.term()?;
        match self.peek() {
            Some(Token::And) => {
                self.advance();
                Ok(Node::and(left, self.exp()?))
            }
            Some(Token::Or) => {
                self.advance();
                Ok(Node::or(left, self.exp()?))
            }
            _ => Ok(left),
        }
    }

    fn term(&mut self) -> Result<Node> {
        let at = self.pos;
        match self.advance() {
            Some(Token::Word { terms, .. }) => Ok(word_node(terms)),
            Some(Token::Not) => Ok(Node::not(self.exp()?)),
            Some(Token::Open) => {
                let inner = self.exp()?;
                match self.advance() {
                    Some(Token::Close) => Ok(inner),
                    Some(other) => {
                        Err(Error::syntax(self.pos - 1, format!("expected `)`, found `{other}`")))
                    }
                    None => Err(Error::syntax(self.pos, "expected `)`, found end of query")),
                }
            }
            Some(other) => Err(Error::syntax(at, format!("expected a term, found `{other}`"))),
            None => Err(Error::syntax(at, "expected a term, found end of query")),
        }
    }
}

/// Compile a query string into its parse tree.
pub fn parse(query: &str) -> Result<Node> {
    let mut parser = Parser { tokens: lex(query), pos: 0 };
    let root = parser.exp()?;
    match parser.peek() {
        None => Ok(root),
        Some(extra) => {
            let message = format!("unexpected `{extra}` after a complete query");
            Err(Error::syntax(parser.pos, message))
        }
    }
}

/// A query ready to be evaluated against any number of shards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledQuery {
    pub text: String,
    pub root: Node,
}

impl CompiledQuery {
    pub fn compile(text: &str) -> Result<Self> {
        Ok(Self { text: text.to_string(), root: parse(text)? })
    }
}
