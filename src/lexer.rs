//! 过滤 DSL 的词法分析器

use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    /// 输入字符串中的当前位置（字节索引）
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, position: 0 }
    }

    /// 返回当前位置的字符，不推进位置
    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    /// 返回下一个位置的字符，不推进位置
    fn peek_next(&self) -> Option<char> {
        self.input[self.position..].chars().nth(1)
    }

    /// 推进位置一个字符并返回该字符
    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn skip_digits(&mut self) -> usize {
        let mut count = 0;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                self.bump();
                count += 1;
            } else {
                break;
            }
        }
        count
    }

    /// 读取数字或日期字面量，`start` 处可能是负号
    ///
    /// 四位数字后紧跟 `-数字` 时按日期读取（`2024-01-31`）
    fn read_number(&mut self, start: usize) -> Token<'a> {
        let digits = self.skip_digits();
        let unsigned = !self.input[start..].starts_with('-');

        if unsigned
            && digits == 4
            && self.peek() == Some('-')
            && self.peek_next().is_some_and(|c| c.is_ascii_digit())
        {
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() || c == '-' {
                    self.bump();
                } else {
                    break;
                }
            }
            return Token {
                kind: TokenKind::Date(&self.input[start..self.position]),
                span: Span::new(start, self.position),
            };
        }

        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.bump(); // 消费 '.'
            self.skip_digits();
        }

        let value_str = &self.input[start..self.position];
        let value = value_str.parse::<f64>().unwrap_or(0.0); // 只包含数字、负号和小数点
        Token {
            kind: TokenKind::Number(value),
            span: Span::new(start, self.position),
        }
    }

    /// 读取双引号包围的字符串字面量
    /// 注意：开始的引号已经被调用者消费；缺少结束引号时返回 Illegal
    fn read_string(&mut self, start: usize) -> Token<'a> {
        let content_start = self.position;
        while let Some(c) = self.peek() {
            if c == '"' {
                break;
            }
            self.bump();
        }
        let content_end = self.position;
        if self.bump().is_none() {
            return Token {
                kind: TokenKind::Illegal,
                span: Span::new(start, self.position),
            };
        }

        Token {
            kind: TokenKind::String(&self.input[content_start..content_end]),
            span: Span::new(start, self.position),
        }
    }

    /// 读取标识符或关键字
    /// 标识符可以包含字母、数字、下划线和 `/`（导航属性路径）
    fn read_identifier(&mut self, start: usize) -> Token<'a> {
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '/' {
                self.bump();
            } else {
                break;
            }
        }
        let literal = &self.input[start..self.position];

        // 检查子句关键字 "Filter:" 和 "Search:"
        if self.peek() == Some(':') {
            if literal.eq_ignore_ascii_case("Filter") {
                self.bump(); // 消费 ':'
                return Token { kind: TokenKind::Filter, span: Span::new(start, self.position) };
            }
            if literal.eq_ignore_ascii_case("Search") {
                self.bump(); // 消费 ':'
                return Token { kind: TokenKind::Search, span: Span::new(start, self.position) };
            }
        }

        let kind = match_keyword(literal);
        Token { kind, span: Span::new(start, self.position) }
    }

    fn single(&mut self, kind: TokenKind<'a>, start: usize) -> Token<'a> {
        Token { kind, span: Span::new(start, self.position) }
    }

    /// 单字符运算符后可选的 `=`，例如 `>` 与 `>=`
    fn with_optional_eq(&mut self, start: usize, plain: TokenKind<'a>, with_eq: TokenKind<'a>) -> Token<'a> {
        if self.peek() == Some('=') {
            self.bump();
            self.single(with_eq, start)
        } else {
            self.single(plain, start)
        }
    }
}

fn match_keyword(s: &str) -> TokenKind<'_> {
    match s.to_ascii_lowercase().as_str() {
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "in" => TokenKind::In,
        "bt" => TokenKind::Bt,
        "contains" => TokenKind::Contains,
        "startswith" => TokenKind::StartsWith,
        "endswith" => TokenKind::EndsWith,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        _ => TokenKind::Identifier(s),
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        let start = self.position;

        let c = self.bump()?; // 到达输入末尾

        let token = match c {
            '=' => self.single(TokenKind::Eq, start),
            '(' => self.single(TokenKind::LParen, start),
            ')' => self.single(TokenKind::RParen, start),
            '[' => self.single(TokenKind::LBracket, start),
            ']' => self.single(TokenKind::RBracket, start),
            ';' => self.single(TokenKind::Semicolon, start),
            ',' => self.single(TokenKind::Comma, start),
            '<' => self.with_optional_eq(start, TokenKind::Lt, TokenKind::Lte),
            '>' => self.with_optional_eq(start, TokenKind::Gt, TokenKind::Gte),
            '!' => self.with_optional_eq(start, TokenKind::Illegal, TokenKind::NotEq),
            '-' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.read_number(start),
            '"' => self.read_string(start),
            c if c.is_ascii_digit() => self.read_number(start),
            c if c.is_alphabetic() || c == '_' => self.read_identifier(start),
            _ => self.single(TokenKind::Illegal, start),
        };
        Some(token)
    }
}
