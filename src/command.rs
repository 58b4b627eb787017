//! The closed command grammar the model is allowed to speak.
//!
//! Replies are parsed into [`Command`] before anything touches the device.
//! The grammar covers the four built-ins plus `page.<action>(...)` calls;
//! everything else is rejected at parse time with the same error kinds the
//! executor reports, so a bad reply feeds back into the prompt history the
//! usual way.

use thiserror::Error;

use crate::page::AttrValue;

/// Remote-control keys accepted by `press(...)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Down,
    Up,
    Right,
    Left,
    Ok,
    Back,
}

impl Key {
    pub fn from_name(name: &str) -> Option<Key> {
        match name {
            "KEY_DOWN" => Some(Key::Down),
            "KEY_UP" => Some(Key::Up),
            "KEY_RIGHT" => Some(Key::Right),
            "KEY_LEFT" => Some(Key::Left),
            "KEY_OK" => Some(Key::Ok),
            "KEY_BACK" => Some(Key::Back),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Key::Down => "KEY_DOWN",
            Key::Up => "KEY_UP",
            Key::Right => "KEY_RIGHT",
            Key::Left => "KEY_LEFT",
            Key::Ok => "KEY_OK",
            Key::Back => "KEY_BACK",
        }
    }
}

/// One parsed command, ready for validation against the current page.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Press(Key),
    LaunchApp { name: String },
    ReadAttribute { name: String },
    AssertEquals { attribute: String, expected: AttrValue },
    Invoke { action: String, args: Vec<AttrValue> },
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid syntax: {0}")]
    Syntax(String),
    #[error("name '{0}' is not defined")]
    UndefinedName(String),
}

/// Map well-known app aliases to their canonical display names.
pub fn canonical_app_name(name: &str) -> String {
    // Accept different capitalization, with & without spaces.
    match name.to_lowercase().replace(' ', "").as_str() {
        "btsport" => "BT Sport".to_owned(),
        "youtube" => "YouTube".to_owned(),
        _ => name.to_owned(),
    }
}

pub fn parse(input: &str) -> Result<Command, ParseError> {
    let line = input.trim();
    if line.is_empty() {
        return Err(ParseError::Syntax("empty command".to_owned()));
    }
    let tokens = tokenize(line)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
    };
    let command = parser.command()?;
    parser.expect_end()?;
    Ok(command)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    LParen,
    RParen,
    Comma,
    Dot,
    EqEq,
}

fn syntax(message: impl Into<String>) -> ParseError {
    ParseError::Syntax(message.into())
}

fn is_literal_keyword(name: &str) -> bool {
    matches!(name, "True" | "False" | "None")
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::EqEq);
                } else {
                    return Err(syntax("assignment is not allowed"));
                }
            }
            '\'' | '"' => tokens.push(read_string(&mut chars)?),
            c if c.is_ascii_digit() || c == '-' => tokens.push(read_number(&mut chars)?),
            c if c.is_ascii_alphabetic() || c == '_' => tokens.push(read_ident(&mut chars)),
            other => return Err(syntax(format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

fn read_string(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<Token, ParseError> {
    let quote = match chars.next() {
        Some(q) => q,
        None => return Err(syntax("expected a string literal")),
    };
    let mut out = String::new();
    loop {
        match chars.next() {
            None => return Err(syntax("unterminated string literal")),
            Some(c) if c == quote => return Ok(Token::Str(out)),
            Some('\\') => match chars.next() {
                None => return Err(syntax("unterminated string literal")),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(c @ ('\\' | '\'' | '"')) => out.push(c),
                Some(c) => {
                    out.push('\\');
                    out.push(c);
                }
            },
            Some(c) => out.push(c),
        }
    }
}

fn read_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<Token, ParseError> {
    let mut text = String::new();
    if chars.peek() == Some(&'-') {
        text.push('-');
        chars.next();
    }
    let mut is_float = false;
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            text.push(c);
            chars.next();
        } else if c == '.' && !is_float {
            is_float = true;
            text.push(c);
            chars.next();
        } else {
            break;
        }
    }
    if text == "-" || text.is_empty() {
        return Err(syntax("expected a number"));
    }
    if is_float {
        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|_| syntax(format!("bad number literal '{text}'")))
    } else {
        text.parse::<i64>()
            .map(Token::Int)
            .map_err(|_| syntax(format!("bad number literal '{text}'")))
    }
}

fn read_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Token {
    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '_' {
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    Token::Ident(name)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ParseError> {
        match self.bump() {
            Some(token) if *token == expected => Ok(()),
            _ => Err(syntax(format!("expected {what}"))),
        }
    }

    fn expect_end(&self) -> Result<(), ParseError> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(syntax("unexpected trailing input"))
        }
    }

    fn command(&mut self) -> Result<Command, ParseError> {
        let head = match self.bump() {
            Some(Token::Ident(name)) => name.as_str(),
            _ => return Err(syntax("expected a command")),
        };
        match head {
            "assert" => self.assertion(),
            "press" => {
                let key_name = self.single_string_arg("press")?;
                let key = Key::from_name(&key_name)
                    .ok_or_else(|| syntax(format!("unknown key name '{key_name}'")))?;
                Ok(Command::Press(key))
            }
            "launch_app" => {
                let name = self.single_string_arg("launch_app")?;
                Ok(Command::LaunchApp { name })
            }
            "print" => self.print_command(),
            "page" => self.page_call(),
            "True" | "False" | "None" => Err(syntax(format!("'{head}' is not a command"))),
            other => Err(ParseError::UndefinedName(other.to_owned())),
        }
    }

    /// `assert page.<attr> == <literal>`
    fn assertion(&mut self) -> Result<Command, ParseError> {
        match self.bump() {
            Some(Token::Ident(name)) if name == "page" => {}
            Some(Token::Ident(name)) if !is_literal_keyword(name) => {
                return Err(ParseError::UndefinedName(name.clone()));
            }
            _ => return Err(syntax("assert expects a page attribute")),
        }
        self.expect(Token::Dot, "'.' after 'page'")?;
        let attribute = self.ident("an attribute name")?;
        self.expect(Token::EqEq, "'==' in assertion")?;
        let expected = self.literal()?;
        Ok(Command::AssertEquals {
            attribute,
            expected,
        })
    }

    /// `print(page.<attr>)`
    fn print_command(&mut self) -> Result<Command, ParseError> {
        self.expect(Token::LParen, "'(' after 'print'")?;
        match self.bump() {
            Some(Token::Ident(name)) if name == "page" => {}
            Some(Token::Ident(name)) if !is_literal_keyword(name) => {
                return Err(ParseError::UndefinedName(name.clone()));
            }
            _ => return Err(syntax("print expects a page attribute")),
        }
        self.expect(Token::Dot, "'.' after 'page'")?;
        let name = self.ident("an attribute name")?;
        self.expect(Token::RParen, "')' after the attribute")?;
        Ok(Command::ReadAttribute { name })
    }

    /// `page.<action>(<literal>, ...)`
    fn page_call(&mut self) -> Result<Command, ParseError> {
        self.expect(Token::Dot, "'.' after 'page'")?;
        let action = self.ident("an action name")?;
        self.expect(Token::LParen, "'(' to call the action")?;
        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.literal()?);
                match self.bump() {
                    Some(Token::Comma) => {
                        if self.peek() == Some(&Token::RParen) {
                            self.bump();
                            break;
                        }
                    }
                    Some(Token::RParen) => break,
                    _ => return Err(syntax("expected ',' or ')' in argument list")),
                }
            }
        } else {
            self.bump();
        }
        Ok(Command::Invoke { action, args })
    }

    fn single_string_arg(&mut self, callee: &str) -> Result<String, ParseError> {
        self.expect(Token::LParen, &format!("'(' after '{callee}'"))?;
        let value = match self.literal()? {
            AttrValue::Str(s) => s,
            _ => return Err(syntax(format!("{callee}() expects a string literal"))),
        };
        self.expect(Token::RParen, &format!("')' after the {callee}() argument"))?;
        Ok(value)
    }

    fn ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.bump() {
            Some(Token::Ident(name)) => Ok(name.clone()),
            _ => Err(syntax(format!("expected {what}"))),
        }
    }

    fn literal(&mut self) -> Result<AttrValue, ParseError> {
        match self.bump() {
            Some(Token::Str(s)) => Ok(AttrValue::Str(s.clone())),
            Some(Token::Int(n)) => Ok(AttrValue::Int(*n)),
            Some(Token::Float(x)) => Ok(AttrValue::Float(*x)),
            Some(Token::Ident(name)) => match name.as_str() {
                "True" => Ok(AttrValue::Bool(true)),
                "False" => Ok(AttrValue::Bool(false)),
                "None" => Ok(AttrValue::Null),
                other => Err(ParseError::UndefinedName(other.to_owned())),
            },
            _ => Err(syntax("expected a literal value")),
        }
    }
}
