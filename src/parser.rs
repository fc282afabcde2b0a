//! 过滤 DSL 的语法分析器
//!
//! ## 解析流程图
//!
//! ```text
//! parse()
//!   ├─ "Filter:" → parse_field_filters()
//!   │                └─ parse_field_filter()
//!   │                     ├─ 解析字段名 (Identifier)
//!   │                     ├─ 期望 '['
//!   │                     ├─ parse_or_expression(field)
//!   │                     └─ 期望 ']'
//!   │
//!   └─ "Search:" → parse_search()   (一个字符串)
//!
//! parse_or_expression(field)
//!   └─ parse_and_expression(field)
//!        └─ parse_primary_expression(field)
//!             ├─ "(" → 嵌套分组 (递归调用 parse_or_expression)
//!             ├─ "IN" → IN (值列表)，展开为 EQ 条件的 OR 分组
//!             ├─ "BT" → BT (下限, 上限)
//!             ├─ 运算符 → 比较 + 字面值
//!             └─ 其他 → 默认相等比较 + 字面值
//! ```
//!
//! ## 语法优先级（从高到低）
//!
//! 1. **括号分组** `(expression)`
//! 2. **比较操作** `=`, `!=`, `>`, `<`, `>=`, `<=`, `CONTAINS`, `STARTSWITH`, `ENDSWITH`, `BT`, `IN`
//! 3. **AND操作**
//! 4. **OR操作**
//!
//! `A OR B OR C` 解析为一个三元 OR 分组，而不是嵌套的二元分组。
//!
//! ## 解析示例
//!
//! ```text
//! Filter: status["Active" OR "Closed"]; name[CONTAINS "Acme"]
//! Filter: amount[BT(100, 500)]; created[>=2024-01-01]; Search: "acme"
//! Filter: region[IN ("EMEA", "APJ")]
//! ```

use crate::condition::{Condition, Group, Leaf, Operator, Scalar};
use crate::token::{Span, Token, TokenKind};
use chrono::NaiveDate;
use thiserror::Error;

/// 解析结果：过滤栏条件（按出现顺序）和可选的搜索文本
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterQuery {
    pub filters: Vec<Condition>,
    pub search: Option<String>,
}

/// 括号嵌套的最大深度
const MAX_DEPTH: usize = 64;

pub struct Parser<'a> {
    tokens: &'a [Token<'a>],
    position: usize,
    depth: usize,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub span: Option<Span>,
}

impl ParseError {
    fn new(message: String, span: Option<Span>) -> Self {
        Self { message, span }
    }

    fn at_position(message: String, span: Span) -> Self {
        Self { message, span: Some(span) }
    }
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token<'a>]) -> Self {
        Self {
            tokens,
            position: 0,
            depth: 0,
        }
    }

    /// 返回当前 token，不推进位置
    fn peek(&self) -> Option<&'a Token<'a>> {
        self.tokens.get(self.position)
    }

    /// 返回当前 token 并推进位置
    fn advance(&mut self) -> Option<&'a Token<'a>> {
        let token = self.tokens.get(self.position)?;
        self.position += 1;
        Some(token)
    }

    /// 期望特定类型的 token 并推进，否则返回错误
    fn expect(&mut self, expected: TokenKind) -> Result<&'a Token<'a>, ParseError> {
        match self.peek() {
            Some(token) if std::mem::discriminant(&token.kind) == std::mem::discriminant(&expected) => {
                self.position += 1;
                Ok(token)
            }
            Some(token) => Err(ParseError::at_position(
                format!("Expected {:?}, found {:?}", expected, token.kind),
                token.span,
            )),
            None => Err(ParseError::new(
                format!("Expected {:?}, but reached end of input", expected),
                None,
            )),
        }
    }

    /// 检查当前 token 是否匹配给定类型
    fn match_token(&self, kind: &TokenKind) -> bool {
        self.peek()
            .is_some_and(|token| std::mem::discriminant(&token.kind) == std::mem::discriminant(kind))
    }

    /// 检查当前 token 是否为子句关键字
    fn at_clause_start(&self) -> bool {
        self.peek()
            .is_some_and(|token| matches!(token.kind, TokenKind::Filter | TokenKind::Search))
    }

    pub fn parse(&mut self) -> Result<FilterQuery, ParseError> {
        let mut query = FilterQuery::default();

        while let Some(token) = self.peek() {
            match &token.kind {
                TokenKind::Filter => {
                    self.advance(); // 消费 "Filter:"
                    self.parse_field_filters(&mut query.filters)?;
                }
                TokenKind::Search => {
                    if query.search.is_some() {
                        return Err(ParseError::at_position(
                            "Search clause given more than once".to_string(),
                            token.span,
                        ));
                    }
                    self.advance(); // 消费 "Search:"
                    query.search = Some(self.parse_search()?);
                }
                TokenKind::Semicolon => {
                    self.advance(); // 子句之间多余的分号
                }
                _ => {
                    return Err(ParseError::at_position(
                        format!("Unexpected token: {:?}", token.kind),
                        token.span,
                    ));
                }
            }
        }

        Ok(query)
    }

    /// 解析字段过滤条件，直到遇到下一个子句或输入结束
    fn parse_field_filters(&mut self, filters: &mut Vec<Condition>) -> Result<(), ParseError> {
        loop {
            filters.push(self.parse_field_filter()?);

            let Some(token) = self.peek() else {
                return Ok(()); // 输入结束
            };
            match &token.kind {
                TokenKind::Semicolon => {
                    self.advance(); // 消费分号
                    if self.peek().is_none() || self.at_clause_start() {
                        return Ok(());
                    }
                }
                TokenKind::Filter | TokenKind::Search => return Ok(()),
                _ => {
                    return Err(ParseError::at_position(
                        format!("Expected semicolon or next clause, found {:?}", token.kind),
                        token.span,
                    ));
                }
            }
        }
    }

    fn parse_search(&mut self) -> Result<String, ParseError> {
        let token = self.expect(TokenKind::String(""))?;
        match &token.kind {
            TokenKind::String(text) => Ok(text.to_string()),
            _ => Err(ParseError::at_position("Expected search text".to_string(), token.span)),
        }
    }

    fn parse_field_filter(&mut self) -> Result<Condition, ParseError> {
        let field_token = self.expect(TokenKind::Identifier(""))?;
        let TokenKind::Identifier(field) = &field_token.kind else {
            return Err(ParseError::at_position(
                "Expected field identifier".to_string(),
                field_token.span,
            ));
        };

        self.expect(TokenKind::LBracket)?;
        let condition = self.parse_or_expression(field)?;
        self.expect(TokenKind::RBracket)?;

        Ok(condition)
    }

    /// 解析OR表达式 (最低优先级)
    ///
    /// 语法: `and_expr (OR and_expr)*`
    fn parse_or_expression(&mut self, field: &str) -> Result<Condition, ParseError> {
        let mut items = vec![self.parse_and_expression(field)?];

        while self.match_token(&TokenKind::Or) {
            self.advance(); // 消费 OR
            items.push(self.parse_and_expression(field)?);
        }

        Ok(collect_group(items, Group::any))
    }

    /// 解析AND表达式
    ///
    /// 语法: `primary (AND primary)*`
    /// 示例: `>5 AND <=10`
    fn parse_and_expression(&mut self, field: &str) -> Result<Condition, ParseError> {
        let mut items = vec![self.parse_primary_expression(field)?];

        while self.match_token(&TokenKind::And) {
            self.advance(); // 消费 AND
            items.push(self.parse_primary_expression(field)?);
        }

        Ok(collect_group(items, Group::all))
    }

    /// 解析基础表达式 (最高优先级)
    ///
    /// - `(condition)` - 分组表达式
    /// - `IN (value1, value2, ...)` - 展开为 OR 分组
    /// - `BT (low, high)` - 闭区间
    /// - `op value` - 带运算符的比较 (如 `>5`, `CONTAINS "a"`)
    /// - `value` - 默认相等比较 (如 `"Open"` 等价于 `="Open"`)
    fn parse_primary_expression(&mut self, field: &str) -> Result<Condition, ParseError> {
        let Some(token) = self.peek() else {
            return Err(ParseError::new("Unexpected end of input".to_string(), None));
        };

        match &token.kind {
            TokenKind::LParen => {
                if self.depth >= MAX_DEPTH {
                    return Err(ParseError::at_position(
                        format!("Parentheses nested deeper than {}", MAX_DEPTH),
                        token.span,
                    ));
                }
                self.advance(); // 消费 (
                self.depth += 1;
                let expr = self.parse_or_expression(field);
                self.depth -= 1;
                let expr = expr?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::In => {
                self.advance(); // 消费 IN
                self.expect(TokenKind::LParen)?;
                let mut values = Vec::new();

                if self.match_token(&TokenKind::RParen) {
                    return Err(ParseError::at_position(
                        "IN list must not be empty".to_string(),
                        token.span,
                    ));
                }
                loop {
                    values.push(self.parse_literal()?);
                    if self.match_token(&TokenKind::RParen) {
                        break;
                    }
                    self.expect(TokenKind::Comma)?;
                }
                self.expect(TokenKind::RParen)?;

                let leaves = values
                    .into_iter()
                    .map(|value| Condition::Leaf(Leaf::new(field, Operator::Eq, value)))
                    .collect();
                Ok(collect_group(leaves, Group::any))
            }
            TokenKind::Bt => {
                self.advance(); // 消费 BT
                self.expect(TokenKind::LParen)?;
                let low = self.parse_literal()?;
                self.expect(TokenKind::Comma)?;
                let high = self.parse_literal()?;
                self.expect(TokenKind::RParen)?;
                Ok(Condition::Leaf(Leaf::between(field, low, high)))
            }
            kind => {
                let operator = match kind {
                    TokenKind::Eq => Some(Operator::Eq),
                    TokenKind::NotEq => Some(Operator::Ne),
                    TokenKind::Gt => Some(Operator::Gt),
                    TokenKind::Lt => Some(Operator::Lt),
                    TokenKind::Gte => Some(Operator::Ge),
                    TokenKind::Lte => Some(Operator::Le),
                    TokenKind::Contains => Some(Operator::Contains),
                    TokenKind::StartsWith => Some(Operator::StartsWith),
                    TokenKind::EndsWith => Some(Operator::EndsWith),
                    _ => None,
                };
                // 如果没有指定运算符，默认为相等比较
                if operator.is_some() {
                    self.advance();
                }
                let value = self.parse_literal()?;
                Ok(Condition::Leaf(Leaf::new(field, operator.unwrap_or(Operator::Eq), value)))
            }
        }
    }

    fn parse_literal(&mut self) -> Result<Scalar, ParseError> {
        let Some(token) = self.advance() else {
            return Err(ParseError::new("Expected literal value".to_string(), None));
        };

        match &token.kind {
            TokenKind::String(s) => Ok(Scalar::String(s.to_string())),
            TokenKind::Number(n) => Ok(Scalar::Number(*n)),
            TokenKind::True => Ok(Scalar::Boolean(true)),
            TokenKind::False => Ok(Scalar::Boolean(false)),
            TokenKind::Date(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .map(Scalar::Date)
                .map_err(|e| ParseError::at_position(format!("Invalid date '{}': {}", text, e), token.span)),
            // 不带引号的字符串
            TokenKind::Identifier(s) => Ok(Scalar::String(s.to_string())),
            _ => Err(ParseError::at_position(
                format!("Expected literal value, found {:?}", token.kind),
                token.span,
            )),
        }
    }
}

/// 单个元素直接返回，多个元素组成分组
fn collect_group(mut items: Vec<Condition>, group: fn(Vec<Condition>) -> Group) -> Condition {
    if items.len() == 1 {
        if let Some(item) = items.pop() {
            return item;
        }
    }
    Condition::Group(group(items))
}
