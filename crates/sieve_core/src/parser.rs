//! Textual label selector parsing.
//!
//! Accepts the Kubernetes selector syntax:
//! `env=prod,tier in (web,api),!legacy,priority>5`.
//! Requirements are returned in the order they appear.

use crate::selector::{Operator, Requirement};
use crate::{SieveError, SieveResult};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Ident(String),
    Bang,
    Eq,
    DoubleEq,
    NotEq,
    Gt,
    Lt,
    Open,
    Close,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(value) => format!("'{value}'"),
            Token::Bang => "'!'".to_string(),
            Token::Eq => "'='".to_string(),
            Token::DoubleEq => "'=='".to_string(),
            Token::NotEq => "'!='".to_string(),
            Token::Gt => "'>'".to_string(),
            Token::Lt => "'<'".to_string(),
            Token::Open => "'('".to_string(),
            Token::Close => "')'".to_string(),
            Token::Comma => "','".to_string(),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/')
}

fn tokenize(input: &str) -> SieveResult<Vec<(usize, Token)>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some((pos, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '(' => Token::Open,
            ')' => Token::Close,
            ',' => Token::Comma,
            '>' => Token::Gt,
            '<' => Token::Lt,
            '=' => {
                if chars.next_if(|(_, next)| *next == '=').is_some() {
                    Token::DoubleEq
                } else {
                    Token::Eq
                }
            }
            '!' => {
                if chars.next_if(|(_, next)| *next == '=').is_some() {
                    Token::NotEq
                } else {
                    Token::Bang
                }
            }
            c if is_ident_char(c) => {
                let mut ident = String::from(c);
                while let Some((_, next)) = chars.next_if(|(_, next)| is_ident_char(*next)) {
                    ident.push(next);
                }
                Token::Ident(ident)
            }
            other => {
                return Err(SieveError::parse(pos, format!("unexpected character '{other}'")));
            }
        };
        tokens.push((pos, token));
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    cursor: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|(_, token)| token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.cursor)
            .map(|(pos, _)| *pos)
            .unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).map(|(_, token)| token.clone());
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn unexpected(&self, expected: &str) -> SieveError {
        let found = self
            .peek()
            .map(Token::describe)
            .unwrap_or_else(|| "end of selector".to_string());
        SieveError::parse(self.position(), format!("expected {expected}, found {found}"))
    }

    fn ident(&mut self, expected: &str) -> SieveResult<String> {
        if let Some(Token::Ident(value)) = self.peek() {
            let value = value.clone();
            self.cursor += 1;
            return Ok(value);
        }
        Err(self.unexpected(expected))
    }

    fn at_boundary(&self) -> bool {
        matches!(self.peek(), None | Some(Token::Comma))
    }

    fn requirement(&mut self) -> SieveResult<Requirement> {
        if self.peek() == Some(&Token::Bang) {
            self.next();
            let key = self.ident("label key")?;
            return Requirement::does_not_exist(key);
        }
        let key = self.ident("label key")?;
        if self.at_boundary() {
            return Requirement::exists(key);
        }
        let operator = match self.peek() {
            Some(Token::Eq) => Operator::Equals,
            Some(Token::DoubleEq) => Operator::DoubleEquals,
            Some(Token::NotEq) => Operator::NotEquals,
            Some(Token::Gt) => Operator::GreaterThan,
            Some(Token::Lt) => Operator::LessThan,
            Some(Token::Ident(word)) if word == "in" => Operator::In,
            Some(Token::Ident(word)) if word == "notin" => Operator::NotIn,
            Some(Token::Ident(word)) => return Err(SieveError::unsupported_operator(word.clone())),
            _ => return Err(self.unexpected("operator")),
        };
        self.next();
        match operator {
            Operator::In | Operator::NotIn => {
                let values = self.value_set()?;
                Requirement::new(key, operator, values)
            }
            Operator::Equals | Operator::DoubleEquals | Operator::NotEquals
                if self.at_boundary() =>
            {
                Requirement::new(key, operator, [String::new()])
            }
            _ => {
                let value = self.ident("value")?;
                Requirement::new(key, operator, [value])
            }
        }
    }

    /// `( v1, v2 )`. A member left blank, as in `(a,)`, is the empty value.
    fn value_set(&mut self) -> SieveResult<Vec<String>> {
        if self.peek() != Some(&Token::Open) {
            return Err(self.unexpected("'('"));
        }
        self.next();
        if self.peek() == Some(&Token::Close) {
            return Err(self.unexpected("value"));
        }
        let mut values = Vec::new();
        loop {
            match self.peek().cloned() {
                Some(Token::Ident(value)) => {
                    self.next();
                    values.push(value);
                }
                Some(Token::Comma | Token::Close) => values.push(String::new()),
                _ => return Err(self.unexpected("value")),
            }
            match self.peek() {
                Some(Token::Comma) => {
                    self.next();
                }
                Some(Token::Close) => {
                    self.next();
                    break;
                }
                _ => return Err(self.unexpected("',' or ')'")),
            }
        }
        Ok(values)
    }
}

/// Parses a selector expression. An empty or all-whitespace expression
/// selects everything and yields no requirements.
pub fn parse_selector(input: &str) -> SieveResult<Vec<Requirement>> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        cursor: 0,
        end: input.len(),
    };
    let mut requirements = Vec::new();
    if parser.peek().is_none() {
        return Ok(requirements);
    }
    loop {
        requirements.push(parser.requirement()?);
        match parser.next() {
            None => break,
            Some(Token::Comma) => {}
            Some(_) => {
                parser.cursor -= 1;
                return Err(parser.unexpected("','"));
            }
        }
    }
    Ok(requirements)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(input: &str) -> Vec<(String, Operator, Vec<String>)> {
        parse_selector(input)
            .unwrap()
            .into_iter()
            .map(|req| {
                (
                    req.key().to_string(),
                    req.operator(),
                    req.values().iter().cloned().collect(),
                )
            })
            .collect()
    }

    #[test]
    fn empty_selector_has_no_requirements() {
        assert!(parse_selector("").unwrap().is_empty());
        assert!(parse_selector("   ").unwrap().is_empty());
    }

    #[test]
    fn parses_every_operator() {
        let parsed = ops("env=prod, team==core,zone!=eu, tier in (web, api), \
             stage notin (dev),!legacy, managed, priority>5, retries<3");
        assert_eq!(
            parsed,
            vec![
                ("env".into(), Operator::Equals, vec!["prod".into()]),
                ("team".into(), Operator::DoubleEquals, vec!["core".into()]),
                ("zone".into(), Operator::NotEquals, vec!["eu".into()]),
                ("tier".into(), Operator::In, vec!["api".into(), "web".into()]),
                ("stage".into(), Operator::NotIn, vec!["dev".into()]),
                ("legacy".into(), Operator::DoesNotExist, vec![]),
                ("managed".into(), Operator::Exists, vec![]),
                ("priority".into(), Operator::GreaterThan, vec!["5".into()]),
                ("retries".into(), Operator::LessThan, vec!["3".into()]),
            ]
        );
    }

    #[test]
    fn prefixed_keys_and_empty_values() {
        let parsed = ops("workflows.example.com/completed=true,note=");
        assert_eq!(parsed[0].0, "workflows.example.com/completed");
        assert_eq!(parsed[1].2, vec![String::new()]);
    }

    #[test]
    fn non_numeric_comparison_operand_still_parses() {
        let parsed = ops("priority>five");
        assert_eq!(parsed[0].2, vec!["five".to_string()]);
    }

    #[test]
    fn negative_comparison_operands_parse() {
        let parsed = ops("priority>-2,retries<-10");
        assert_eq!(parsed[0].1, Operator::GreaterThan);
        assert_eq!(parsed[0].2, vec!["-2".to_string()]);
        assert_eq!(parsed[1].2, vec!["-10".to_string()]);
    }

    #[test]
    fn blank_set_members_are_empty_values() {
        let parsed = ops("tier in (web,)");
        assert_eq!(parsed[0].2, vec![String::new(), "web".to_string()]);
        let parsed = ops("tier notin (, api)");
        assert_eq!(parsed[0].2, vec![String::new(), "api".to_string()]);
    }

    #[test]
    fn unknown_word_operator_is_unsupported() {
        let err = parse_selector("env like prod").unwrap_err();
        assert!(matches!(err, SieveError::UnsupportedOperator { .. }));
    }

    #[test]
    fn syntax_errors_report_position() {
        let err = parse_selector("env=prod,").unwrap_err();
        assert!(matches!(err, SieveError::Parse { position: 9, .. }));
        let err = parse_selector("env=prod;team=a").unwrap_err();
        assert!(matches!(err, SieveError::Parse { position: 8, .. }));
        let err = parse_selector("tier in web").unwrap_err();
        assert!(matches!(err, SieveError::Parse { position: 8, .. }));
        let err = parse_selector("tier in (web").unwrap_err();
        assert!(matches!(err, SieveError::Parse { .. }));
        let err = parse_selector("tier in ()").unwrap_err();
        assert!(matches!(err, SieveError::Parse { .. }));
    }

    #[test]
    fn invalid_label_text_is_rejected() {
        let err = parse_selector("env=pr'od").unwrap_err();
        assert!(matches!(err, SieveError::Parse { .. }));
        let err = parse_selector("-env=prod").unwrap_err();
        assert!(matches!(err, SieveError::InvalidRequirement { .. }));
    }
}
