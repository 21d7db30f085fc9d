//! Evaluation of the formulas that compute the rows of a TVA declaration.
//!
//! A rule such as `%EVAL(%COD(01)+%ACC(44566-44571))` is evaluated in two
//! passes:
//!
//! 1. function tokens are replaced by the amount they resolve to:
//!    `%COD(code)` by the amount of the declaration row carrying that code,
//!    `%ACC(from-to)` by the net (debit - credit) balance of the account range
//!    over the declaration period;
//! 2. the resulting arithmetic is folded strictly left to right, with no
//!    operator precedence: `2+3*4` is `20`. Parenthesized groups are folded
//!    first and used as a single operand.
//!
//! Amounts are written and read back with the dossier separators, so that
//! `1 234,50` is a valid operand for a French dossier.

use chrono::NaiveDate;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

use crate::amount::{amount_from_str, amount_to_str, AmountFormat};
use crate::entry::BalanceSource;
use crate::error::EvalError;
use crate::tva_record::RecordDetail;

static FUNCTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%([A-Z]+)\(\s*([^()]*?)\s*\)").expect("valid function regex"));

static OPERATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-+*/()]").expect("valid operator regex"));

static EVAL_PREFIX: &str = "%EVAL(";

const MAX_DEPTH: usize = 64;

/// Everything a rule may refer to while being evaluated.
pub struct EvalContext<'a> {
    /// Rows of the declaration, searched by `%COD()`.
    pub rows: &'a [RecordDetail],
    /// Declaration period, bounding `%ACC()` balances.
    pub begin: NaiveDate,
    pub end: NaiveDate,
    pub balances: &'a dyn BalanceSource,
    pub format: &'a AmountFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    fn from_token(token: &str) -> Option<Operator> {
        match token {
            "+" => Some(Operator::Add),
            "-" => Some(Operator::Sub),
            "*" => Some(Operator::Mul),
            "/" => Some(Operator::Div),
            _ => None,
        }
    }

    fn apply(&self, lhs: Decimal, rhs: Decimal) -> Result<Decimal, EvalError> {
        match self {
            Operator::Add => lhs.checked_add(rhs).ok_or(EvalError::Overflow),
            Operator::Sub => lhs.checked_sub(rhs).ok_or(EvalError::Overflow),
            Operator::Mul => lhs.checked_mul(rhs).ok_or(EvalError::Overflow),
            Operator::Div => {
                if rhs.is_zero() {
                    return Err(EvalError::DivisionByZero);
                }
                lhs.checked_div(rhs).ok_or(EvalError::Overflow)
            }
        }
    }
}

/**
 * Replace each `%COD()` and `%ACC()` token of the rule by its amount.
 *
 * Other `%NAME(...)` tokens are kept as they are. A `%COD()` which matches no
 * amount-carrying row is replaced by nothing.
 */
pub fn substitute(rule: &str, ctx: &EvalContext) -> Result<String, EvalError> {
    let mut substituted = String::with_capacity(rule.len());
    let mut last = 0;

    for caps in FUNCTION_RE.captures_iter(rule) {
        let (whole, name, arg) = match (caps.get(0), caps.get(1), caps.get(2)) {
            (Some(whole), Some(name), Some(arg)) => (whole, name, arg),
            _ => continue,
        };
        substituted.push_str(&rule[last..whole.start()]);
        match name.as_str() {
            "COD" => substituted.push_str(&resolve_code(arg.as_str(), ctx)),
            "ACC" => substituted.push_str(&resolve_accounts(arg.as_str(), ctx)?),
            _ => substituted.push_str(whole.as_str()),
        }
        last = whole.end();
    }
    substituted.push_str(&rule[last..]);

    Ok(substituted)
}

fn resolve_code(code: &str, ctx: &EvalContext) -> String {
    let found = ctx
        .rows
        .iter()
        .find(|row| row.has_amount && row.code.as_deref() == Some(code));

    match found {
        Some(row) => amount_to_str(&row.amount, ctx.format),
        None => {
            warn!("%COD({}): no row with this code carries an amount", code);
            String::new()
        }
    }
}

fn resolve_accounts(range: &str, ctx: &EvalContext) -> Result<String, EvalError> {
    let (from, to) = match range.split_once('-') {
        Some((from, to)) if !to.trim().is_empty() => (from.trim(), to.trim()),
        Some((from, _)) => (from.trim(), from.trim()),
        None => (range.trim(), range.trim()),
    };
    // An empty bound would match every account
    if from.is_empty() || to.is_empty() {
        return Err(EvalError::EmptyAccountRange(range.to_string()));
    }

    let balances = ctx
        .balances
        .balance_rough_validated(from, to, ctx.begin, ctx.end)
        .map_err(|e| EvalError::Balance(e.to_string()))?;

    let total = balances
        .iter()
        .try_fold(Decimal::ZERO, |total, balance| {
            total.checked_add(balance.net())
        })
        .ok_or(EvalError::Overflow)?;

    debug!(
        "%ACC({}-{}) from {} to {}: {} account(s), net {}",
        from,
        to,
        ctx.begin,
        ctx.end,
        balances.len(),
        total
    );
    Ok(amount_to_str(&total, ctx.format))
}

/// Split on operators and parentheses, keeping them as tokens of their own.
fn tokenize(expr: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut last = 0;

    for found in OPERATOR_RE.find_iter(expr) {
        tokens.push(&expr[last..found.start()]);
        tokens.push(found.as_str());
        last = found.end();
    }
    tokens.push(&expr[last..]);

    tokens
        .into_iter()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect()
}

struct Folder<'t> {
    tokens: Vec<&'t str>,
    pos: usize,
    format: &'t AmountFormat,
}

impl<'t> Folder<'t> {
    fn new(expr: &'t str, format: &'t AmountFormat) -> Folder<'t> {
        Folder {
            tokens: tokenize(expr),
            pos: 0,
            format,
        }
    }

    fn next_token(&mut self) -> Option<&'t str> {
        let token = self.tokens.get(self.pos).copied();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn remaining(&self) -> Option<String> {
        if self.pos < self.tokens.len() {
            Some(self.tokens[self.pos..].concat())
        } else {
            None
        }
    }

    /// Fold one group level; tells whether a `)` closed it.
    fn fold_group(&mut self, depth: usize) -> Result<(Decimal, bool), EvalError> {
        let mut total = Decimal::ZERO;
        let mut pending = Operator::Add;
        let mut expect_operator = true;
        let mut first = true;

        while let Some(token) = self.next_token() {
            if token == ")" {
                if !expect_operator {
                    debug!("Ignoring dangling {:?} at end of group", pending);
                }
                return Ok((total, true));
            }

            if expect_operator {
                match Operator::from_token(token) {
                    Some(op) => {
                        pending = op;
                        expect_operator = false;
                        first = false;
                        continue;
                    }
                    // A level may start with its first operand
                    None if first => pending = Operator::Add,
                    None => {
                        return Err(EvalError::Malformed {
                            expected: "an operator",
                            found: token.to_string(),
                        })
                    }
                }
            }

            first = false;
            let operand = self.operand(token, depth)?;
            total = pending.apply(total, operand)?;
            expect_operator = true;
        }

        if !expect_operator {
            debug!("Ignoring dangling {:?} at end of expression", pending);
        }
        Ok((total, false))
    }

    fn operand(&mut self, token: &'t str, depth: usize) -> Result<Decimal, EvalError> {
        if depth >= MAX_DEPTH {
            return Err(EvalError::TooDeep);
        }

        match token {
            "(" => match self.fold_group(depth + 1)? {
                (value, true) => Ok(value),
                (_, false) => Err(EvalError::UnclosedParenthesis),
            },
            // Sign of a substituted negative amount, e.g. `100+-30,00`
            "-" | "+" => {
                let next = self.next_token().ok_or_else(|| EvalError::Malformed {
                    expected: "an operand",
                    found: String::from("end of expression"),
                })?;
                let value = self.operand(next, depth + 1)?;
                Ok(if token == "-" { -value } else { value })
            }
            ")" | "*" | "/" => Err(EvalError::Malformed {
                expected: "an operand",
                found: token.to_string(),
            }),
            literal => amount_from_str(literal, self.format)
                .map_err(|_| EvalError::InvalidAmount(literal.to_string())),
        }
    }
}

/**
 * Fold an arithmetic expression left to right.
 *
 * The expression may be wrapped in `%EVAL(...)`, in which case its closing
 * parenthesis must end the expression.
 */
pub fn eval_opes(expr: &str, format: &AmountFormat) -> Result<Decimal, EvalError> {
    let trimmed = expr.trim();
    let (body, wrapped) = match trimmed.strip_prefix(EVAL_PREFIX) {
        Some(body) => (body, true),
        None => (trimmed, false),
    };

    let mut folder = Folder::new(body, format);
    let (value, closed) = folder.fold_group(0)?;

    match (wrapped, closed) {
        (true, false) => return Err(EvalError::UnclosedParenthesis),
        (false, true) => return Err(EvalError::UnexpectedClose),
        _ => (),
    }
    if let Some(rest) = folder.remaining() {
        return Err(EvalError::TrailingInput(rest));
    }
    Ok(value)
}

/// Evaluate a rule to an amount rounded the way it is displayed.
pub fn eval_amount(rule: &str, ctx: &EvalContext) -> Result<Decimal, EvalError> {
    let substituted = substitute(rule, ctx)?;
    debug!("Rule {:?} substituted to {:?}", rule, substituted);

    match eval_opes(&substituted, ctx.format) {
        Ok(value) => Ok(ctx.format.round(&value)),
        Err(e) => {
            warn!("Unable to evaluate {:?} ({:?}): {}", rule, substituted, e);
            Err(e)
        }
    }
}

/// Evaluate a rule to its display string.
pub fn eval_rule(rule: &str, ctx: &EvalContext) -> Result<String, EvalError> {
    let amount = eval_amount(rule, ctx)?;
    Ok(amount_to_str(&amount, ctx.format))
}
