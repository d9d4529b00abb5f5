use super::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Num(f64),
    Str(String),
    True,
    False,
    Assign,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Plus,
    Minus,
    Star,
    Slash,
    Newline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub tok: Token,
    pub line: usize,
}

/// Tokenize a script. `;` counts as a statement separator like a newline, and
/// newlines inside parentheses or brackets are ignored so calls may wrap.
pub fn lex(src: &str) -> Result<Vec<Spanned>, ScriptError> {
    let mut out: Vec<Spanned> = vec![];
    let mut chars = src.chars().peekable();
    let mut line = 1usize;
    let mut depth = 0usize;

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' => {
                chars.next();
            }
            '#' => {
                while let Some(&c2) = chars.peek() {
                    if c2 == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '\n' | ';' => {
                chars.next();
                let sep_line = line;
                if c == '\n' {
                    line += 1;
                }
                let after_value = !matches!(
                    out.last().map(|s| &s.tok),
                    None | Some(Token::Newline)
                );
                if depth == 0 && after_value {
                    out.push(Spanned { tok: Token::Newline, line: sep_line });
                }
            }
            '=' => {
                chars.next();
                out.push(Spanned { tok: Token::Assign, line });
            }
            '.' => {
                chars.next();
                out.push(Spanned { tok: Token::Dot, line });
            }
            ',' => {
                chars.next();
                out.push(Spanned { tok: Token::Comma, line });
            }
            '(' => {
                chars.next();
                depth += 1;
                out.push(Spanned { tok: Token::LParen, line });
            }
            ')' => {
                chars.next();
                depth = depth.saturating_sub(1);
                out.push(Spanned { tok: Token::RParen, line });
            }
            '[' => {
                chars.next();
                depth += 1;
                out.push(Spanned { tok: Token::LBracket, line });
            }
            ']' => {
                chars.next();
                depth = depth.saturating_sub(1);
                out.push(Spanned { tok: Token::RBracket, line });
            }
            '+' => {
                chars.next();
                out.push(Spanned { tok: Token::Plus, line });
            }
            '-' => {
                chars.next();
                out.push(Spanned { tok: Token::Minus, line });
            }
            '*' => {
                chars.next();
                out.push(Spanned { tok: Token::Star, line });
            }
            '/' => {
                chars.next();
                out.push(Spanned { tok: Token::Slash, line });
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                while let Some(c2) = chars.next() {
                    match c2 {
                        '\\' => match chars.next() {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(other) => s.push(other),
                            None => break,
                        },
                        '\n' => {
                            return Err(ScriptError::Syntax {
                                line,
                                message: "string literal hits end of line".into(),
                            })
                        }
                        c2 if c2 == quote => {
                            closed = true;
                            break;
                        }
                        c2 => s.push(c2),
                    }
                }
                if !closed {
                    return Err(ScriptError::Syntax {
                        line,
                        message: "unterminated string literal".into(),
                    });
                }
                out.push(Spanned { tok: Token::Str(s), line });
            }
            c if c.is_ascii_digit() => {
                let mut text = String::new();
                while let Some(&c2) = chars.peek() {
                    if c2.is_ascii_digit() || c2 == '.' || c2 == '_' {
                        if c2 != '_' {
                            text.push(c2);
                        }
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n: f64 = text.parse().map_err(|_| ScriptError::Syntax {
                    line,
                    message: format!("bad number literal '{}'", text),
                })?;
                out.push(Spanned { tok: Token::Num(n), line });
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&c2) = chars.peek() {
                    if c2.is_ascii_alphanumeric() || c2 == '_' {
                        name.push(c2);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let tok = match name.as_str() {
                    "true" | "True" => Token::True,
                    "false" | "False" => Token::False,
                    _ => Token::Ident(name),
                };
                out.push(Spanned { tok, line });
            }
            other => {
                return Err(ScriptError::Syntax {
                    line,
                    message: format!("unexpected character '{}'", other),
                })
            }
        }
    }
    Ok(out)
}
