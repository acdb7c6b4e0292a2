//! Binary operator matrix
//!
//! Operators resolve on the runtime kinds of both operands. Only the pairs
//! listed in [`binary`] are legal; any other combination is an
//! `UnknownOperator` error.

use super::error::{InterpResult, RuntimeError};
use super::value::Value;
use crate::ast::BinOp;

/// Apply a binary operator to two evaluated operands
pub fn binary(op: BinOp, left: Value, right: Value) -> InterpResult<Value> {
    if left.is_void() || right.is_void() {
        return Err(RuntimeError::missing_value("binary operation"));
    }
    let unknown = || RuntimeError::unknown_operator(op, left.kind_name(), right.kind_name());

    match (&left, &right) {
        (Value::Int(a), Value::Int(b)) => int_int(op, *a, *b).ok_or_else(unknown)?,

        (Value::Int(n), Value::Str(s)) => match op {
            BinOp::Add => Ok(Value::Str(format!("{n}{s}"))),
            BinOp::Mul => Ok(Value::Str(s.repeat(repeat_count(s.len(), *n)?))),
            BinOp::Gt => Ok((*n > char_len(s)).into()),
            BinOp::Eq => Ok((*n == char_len(s)).into()),
            BinOp::Ne => Ok((*n != char_len(s)).into()),
            _ => Err(unknown()),
        },

        (Value::Str(s), Value::Int(n)) => match op {
            BinOp::Add => Ok(Value::Str(format!("{s}{n}"))),
            BinOp::Sub => {
                let keep = shortened(char_len(s), *n)?;
                Ok(Value::Str(s.chars().take(keep).collect()))
            }
            BinOp::Mul => Ok(Value::Str(s.repeat(repeat_count(s.len(), *n)?))),
            BinOp::Div => {
                if *n == 0 {
                    return Err(RuntimeError::arithmetic("division by zero"));
                }
                let keep = usize::try_from(char_len(s) / *n)
                    .map_err(|_| RuntimeError::argument("divisor must be positive"))?;
                Ok(Value::Str(s.chars().take(keep).collect()))
            }
            BinOp::Lt => Ok((char_len(s) < *n).into()),
            BinOp::Le => Ok((char_len(s) <= *n).into()),
            BinOp::Eq => Ok((char_len(s) == *n).into()),
            BinOp::Ne => Ok((char_len(s) != *n).into()),
            _ => Err(unknown()),
        },

        (Value::Array(items), Value::Int(n)) => {
            let len = items.len() as i64;
            match op {
                BinOp::Add => {
                    let mut items = items.clone();
                    items.push(Value::Int(*n));
                    Ok(Value::Array(items))
                }
                BinOp::Sub => {
                    let keep = shortened(len, *n)?;
                    Ok(Value::Array(items[..keep].to_vec()))
                }
                BinOp::Mul => Ok(Value::Array(repeat_items(items, *n)?)),
                BinOp::Div => Ok(Value::Array(chunk(items, *n)?)),
                BinOp::Lt => Ok((len < *n).into()),
                BinOp::Le => Ok((len <= *n).into()),
                BinOp::Eq => Ok((len == *n).into()),
                BinOp::Ne => Ok((len != *n).into()),
                _ => Err(unknown()),
            }
        }

        (Value::Int(_) | Value::Str(_), Value::Array(items)) if op == BinOp::Add => {
            let mut prepended = Vec::with_capacity(items.len() + 1);
            prepended.push(left.clone());
            prepended.extend(items.iter().cloned());
            Ok(Value::Array(prepended))
        }

        (Value::Array(items), Value::Str(_)) if op == BinOp::Add => {
            let mut items = items.clone();
            items.push(right.clone());
            Ok(Value::Array(items))
        }

        (Value::Array(a), Value::Array(b)) => match op {
            BinOp::Add => Ok(Value::Array(a.iter().chain(b).cloned().collect())),
            BinOp::Sub => {
                if a.ends_with(b) {
                    Ok(Value::Array(a[..a.len() - b.len()].to_vec()))
                } else {
                    Ok(left.clone())
                }
            }
            BinOp::Mul => Ok(Value::Array(multiply_lists(a, b)?)),
            BinOp::Div => Ok(Value::from(count_blocks(a, b))),
            BinOp::Lt => Ok((a.len() < b.len()).into()),
            BinOp::Gt => Ok((a.len() > b.len()).into()),
            BinOp::Eq => Ok((a == b).into()),
            BinOp::Ne => Ok((a != b).into()),
            _ => Err(unknown()),
        },

        (Value::Str(a), Value::Str(b)) => match op {
            BinOp::Add => Ok(Value::Str(format!("{a}{b}"))),
            BinOp::Sub => Ok(Value::Str(trim_end_repeated(a, b).to_string())),
            BinOp::Div => Ok(Value::from(count_occurrences(a, b))),
            BinOp::Gt => Ok((a > b).into()),
            BinOp::Ge => Ok((a >= b).into()),
            BinOp::Lt => Ok((a < b).into()),
            BinOp::Le => Ok((a <= b).into()),
            BinOp::Eq => Ok((a == b).into()),
            BinOp::Ne => Ok((a != b).into()),
            _ => Err(unknown()),
        },

        _ => Err(unknown()),
    }
}

/// Int × Int; `None` for operators outside the matrix
fn int_int(op: BinOp, a: i64, b: i64) -> Option<InterpResult<Value>> {
    let overflow = || RuntimeError::arithmetic(format!("integer overflow in {a} {op} {b}"));
    let result = match op {
        BinOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
        BinOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        BinOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
        BinOp::Div | BinOp::Mod if b == 0 => Err(RuntimeError::arithmetic("division by zero")),
        BinOp::Div => a.checked_div(b).map(Value::Int).ok_or_else(overflow),
        BinOp::Mod => a.checked_rem(b).map(Value::Int).ok_or_else(overflow),
        BinOp::Pow => power(a, b).ok_or_else(overflow),
        BinOp::And => Ok((a != 0 && b != 0).into()),
        BinOp::Or => Ok((a != 0 || b != 0).into()),
        BinOp::Gt => Ok((a > b).into()),
        BinOp::Ge => Ok((a >= b).into()),
        BinOp::Lt => Ok((a < b).into()),
        BinOp::Le => Ok((a <= b).into()),
        BinOp::Eq => Ok((a == b).into()),
        BinOp::Ne => Ok((a != b).into()),
    };
    Some(result)
}

/// Integer power, truncating negative exponents toward zero
fn power(base: i64, exp: i64) -> Option<Value> {
    match (base, exp) {
        (1, _) => Some(Value::Int(1)),
        (-1, _) => Some(Value::Int(if exp % 2 == 0 { 1 } else { -1 })),
        (0, 0) => Some(Value::Int(1)),
        (0, e) if e < 0 => None,
        (0, _) => Some(Value::Int(0)),
        (_, e) if e < 0 => Some(Value::Int(0)),
        _ => {
            let exp = u32::try_from(exp).ok()?;
            base.checked_pow(exp).map(Value::Int)
        }
    }
}

fn char_len(s: &str) -> i64 {
    s.chars().count() as i64
}

/// Upper bound on the size of a string or array built by an operator
const MAX_BUILT_LEN: usize = 1 << 24;

fn count(n: i64) -> InterpResult<usize> {
    usize::try_from(n)
        .map_err(|_| RuntimeError::argument(format!("repeat count must not be negative, got {n}")))
}

/// Repeat count for a unit of `unit_len`; 0 when the unit is empty
fn repeat_count(unit_len: usize, n: i64) -> InterpResult<usize> {
    let n = count(n)?;
    if unit_len == 0 {
        return Ok(0);
    }
    within_bound(unit_len.checked_mul(n))?;
    Ok(n)
}

fn within_bound(len: Option<usize>) -> InterpResult<usize> {
    match len {
        Some(len) if len <= MAX_BUILT_LEN => Ok(len),
        _ => Err(RuntimeError::arithmetic(format!(
            "result would exceed {MAX_BUILT_LEN} elements"
        ))),
    }
}

fn repeat_items(items: &[Value], n: i64) -> InterpResult<Vec<Value>> {
    let n = repeat_count(items.len(), n)?;
    let mut repeated = Vec::with_capacity(items.len() * n);
    for _ in 0..n {
        repeated.extend_from_slice(items);
    }
    Ok(repeated)
}

/// Length left after dropping `n` trailing items
fn shortened(len: i64, n: i64) -> InterpResult<usize> {
    if n < 0 || n > len {
        return Err(RuntimeError::argument(format!(
            "cannot drop {n} item(s) from length {len}"
        )));
    }
    Ok((len - n) as usize)
}

/// Split into exactly `parts` contiguous chunks of ceil(len / parts) items
fn chunk(items: &[Value], parts: i64) -> InterpResult<Vec<Value>> {
    if parts <= 0 {
        return Err(RuntimeError::argument(format!(
            "number of parts must be greater than zero, got {parts}"
        )));
    }
    let parts = within_bound(usize::try_from(parts).ok())?;
    let size = items.len().div_ceil(parts);
    let chunks = (0..parts)
        .map(|i| {
            let start = (i * size).min(items.len());
            let end = (start + size).min(items.len());
            Value::Array(items[start..end].to_vec())
        })
        .collect();
    Ok(chunks)
}

/// One inner array per element of `items`, repeated by the matching count
fn multiply_lists(items: &[Value], counts: &[Value]) -> InterpResult<Vec<Value>> {
    let counts = counts
        .iter()
        .map(|c| match c {
            Value::Int(n) => count(*n),
            _ => Err(RuntimeError::argument("right array must consist of Int only")),
        })
        .collect::<InterpResult<Vec<usize>>>()?;
    if items.len() != counts.len() {
        return Err(RuntimeError::argument(format!(
            "arrays must have the same length ({} and {})",
            items.len(),
            counts.len()
        )));
    }
    within_bound(
        counts
            .iter()
            .try_fold(0usize, |total, n| total.checked_add(*n)),
    )?;
    Ok(items
        .iter()
        .zip(counts)
        .map(|(item, n)| Value::Array(vec![item.clone(); n]))
        .collect())
}

/// Number of back-to-back copies of `block` making up `items`, else 0
fn count_blocks(items: &[Value], block: &[Value]) -> usize {
    if block.is_empty() || items.len() % block.len() != 0 {
        return 0;
    }
    if items.chunks(block.len()).all(|c| c == block) {
        items.len() / block.len()
    } else {
        0
    }
}

fn trim_end_repeated<'a>(mut source: &'a str, suffix: &str) -> &'a str {
    if suffix.is_empty() {
        return source;
    }
    while let Some(rest) = source.strip_suffix(suffix) {
        source = rest;
    }
    source
}

fn count_occurrences(source: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    source.matches(needle).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::error::ErrorKind;

    fn int(n: i64) -> Value {
        Value::Int(n)
    }

    fn arr(items: &[i64]) -> Value {
        Value::Array(items.iter().copied().map(Value::Int).collect())
    }

    fn s(text: &str) -> Value {
        Value::from(text)
    }

    fn kind_of(result: InterpResult<Value>) -> ErrorKind {
        result.unwrap_err().kind
    }

    #[test]
    fn test_int_arithmetic() {
        assert_eq!(binary(BinOp::Add, int(2), int(3)), Ok(int(5)));
        assert_eq!(binary(BinOp::Div, int(7), int(2)), Ok(int(3)));
        assert_eq!(binary(BinOp::Mod, int(7), int(2)), Ok(int(1)));
        assert_eq!(binary(BinOp::Pow, int(2), int(10)), Ok(int(1024)));
        assert_eq!(binary(BinOp::Pow, int(2), int(-1)), Ok(int(0)));
    }

    #[test]
    fn test_int_logic_and_comparison() {
        assert_eq!(binary(BinOp::And, int(2), int(0)), Ok(int(0)));
        assert_eq!(binary(BinOp::Or, int(0), int(5)), Ok(int(1)));
        assert_eq!(binary(BinOp::Ge, int(3), int(3)), Ok(int(1)));
        assert_eq!(binary(BinOp::Ne, int(3), int(3)), Ok(int(0)));
    }

    #[test]
    fn test_int_division_by_zero() {
        assert_eq!(kind_of(binary(BinOp::Div, int(1), int(0))), ErrorKind::Arithmetic);
        assert_eq!(kind_of(binary(BinOp::Mod, int(1), int(0))), ErrorKind::Arithmetic);
    }

    #[test]
    fn test_int_overflow() {
        assert_eq!(kind_of(binary(BinOp::Mul, int(i64::MAX), int(2))), ErrorKind::Arithmetic);
    }

    #[test]
    fn test_void_operand_is_missing_value() {
        assert_eq!(kind_of(binary(BinOp::Add, Value::Void, int(1))), ErrorKind::MissingValue);
        assert_eq!(kind_of(binary(BinOp::Add, s("a"), Value::Void)), ErrorKind::MissingValue);
    }

    #[test]
    fn test_int_string_pairs() {
        assert_eq!(binary(BinOp::Add, int(1), s("a")), Ok(s("1a")));
        assert_eq!(binary(BinOp::Mul, int(3), s("ab")), Ok(s("ababab")));
        assert_eq!(binary(BinOp::Gt, int(3), s("ab")), Ok(int(1)));
        assert_eq!(kind_of(binary(BinOp::Sub, int(1), s("a"))), ErrorKind::UnknownOperator);
    }

    #[test]
    fn test_string_int_pairs() {
        assert_eq!(binary(BinOp::Add, s("a"), int(1)), Ok(s("a1")));
        assert_eq!(binary(BinOp::Sub, s("hello"), int(2)), Ok(s("hel")));
        assert_eq!(binary(BinOp::Div, s("abcdef"), int(3)), Ok(s("ab")));
        assert_eq!(binary(BinOp::Le, s("abc"), int(3)), Ok(int(1)));
        assert_eq!(kind_of(binary(BinOp::Sub, s("ab"), int(3))), ErrorKind::ArgumentError);
        assert_eq!(kind_of(binary(BinOp::Gt, s("ab"), int(3))), ErrorKind::UnknownOperator);
    }

    #[test]
    fn test_array_int_pairs() {
        assert_eq!(binary(BinOp::Add, arr(&[1, 2]), int(3)), Ok(arr(&[1, 2, 3])));
        assert_eq!(binary(BinOp::Sub, arr(&[1, 2, 3]), int(2)), Ok(arr(&[1])));
        assert_eq!(binary(BinOp::Mul, arr(&[1, 2]), int(2)), Ok(arr(&[1, 2, 1, 2])));
        assert_eq!(binary(BinOp::Eq, arr(&[1, 2]), int(2)), Ok(int(1)));
    }

    #[test]
    fn test_huge_repeat_counts_are_errors() {
        let huge = int(i64::MAX);
        assert_eq!(kind_of(binary(BinOp::Mul, s("abc"), huge.clone())), ErrorKind::Arithmetic);
        assert_eq!(kind_of(binary(BinOp::Mul, huge.clone(), s("abc"))), ErrorKind::Arithmetic);
        assert_eq!(kind_of(binary(BinOp::Mul, arr(&[1, 2]), huge.clone())), ErrorKind::Arithmetic);
        assert_eq!(kind_of(binary(BinOp::Div, arr(&[1]), huge.clone())), ErrorKind::Arithmetic);
        assert_eq!(
            kind_of(binary(BinOp::Mul, arr(&[1, 2]), Value::Array(vec![int(1), huge]))),
            ErrorKind::Arithmetic
        );
    }

    #[test]
    fn test_repeating_empty_is_empty() {
        assert_eq!(binary(BinOp::Mul, s(""), int(i64::MAX)), Ok(s("")));
        assert_eq!(binary(BinOp::Mul, arr(&[]), int(i64::MAX)), Ok(arr(&[])));
        assert_eq!(binary(BinOp::Mul, arr(&[5]), int(0)), Ok(arr(&[])));
    }

    #[test]
    fn test_power_of_unit_bases_with_large_exponent() {
        let big = 5_000_000_000;
        assert_eq!(binary(BinOp::Pow, int(1), int(big)), Ok(int(1)));
        assert_eq!(binary(BinOp::Pow, int(0), int(big)), Ok(int(0)));
        assert_eq!(binary(BinOp::Pow, int(-1), int(big)), Ok(int(1)));
        assert_eq!(binary(BinOp::Pow, int(-1), int(big + 1)), Ok(int(-1)));
        assert_eq!(binary(BinOp::Pow, int(0), int(0)), Ok(int(1)));
        assert_eq!(kind_of(binary(BinOp::Pow, int(2), int(big))), ErrorKind::Arithmetic);
    }

    #[test]
    fn test_array_chunking() {
        assert_eq!(
            binary(BinOp::Div, arr(&[1, 2, 3, 4]), int(2)),
            Ok(Value::Array(vec![arr(&[1, 2]), arr(&[3, 4])]))
        );
        assert_eq!(
            binary(BinOp::Div, arr(&[1, 2, 3, 4, 5]), int(2)),
            Ok(Value::Array(vec![arr(&[1, 2, 3]), arr(&[4, 5])]))
        );
        assert_eq!(kind_of(binary(BinOp::Div, arr(&[1]), int(0))), ErrorKind::ArgumentError);
    }

    #[test]
    fn test_prepend_and_append_mixed() {
        assert_eq!(binary(BinOp::Add, int(0), arr(&[1])), Ok(arr(&[0, 1])));
        assert_eq!(
            binary(BinOp::Add, s("x"), arr(&[1])),
            Ok(Value::Array(vec![s("x"), int(1)]))
        );
        assert_eq!(
            binary(BinOp::Add, arr(&[1]), s("x")),
            Ok(Value::Array(vec![int(1), s("x")]))
        );
        assert_eq!(kind_of(binary(BinOp::Sub, int(0), arr(&[1]))), ErrorKind::UnknownOperator);
    }

    #[test]
    fn test_array_concat_then_remove_suffix() {
        let joined = binary(BinOp::Add, arr(&[1, 2, 3]), arr(&[4])).unwrap();
        assert_eq!(joined, arr(&[1, 2, 3, 4]));
        assert_eq!(binary(BinOp::Sub, joined, arr(&[4])), Ok(arr(&[1, 2, 3])));
    }

    #[test]
    fn test_array_minus_non_suffix_is_noop() {
        assert_eq!(binary(BinOp::Sub, arr(&[1, 2, 3]), arr(&[2])), Ok(arr(&[1, 2, 3])));
    }

    #[test]
    fn test_array_multiply_lists() {
        assert_eq!(
            binary(BinOp::Mul, arr(&[7, 8]), arr(&[2, 1])),
            Ok(Value::Array(vec![arr(&[7, 7]), arr(&[8])]))
        );
        assert_eq!(kind_of(binary(BinOp::Mul, arr(&[7]), arr(&[1, 2]))), ErrorKind::ArgumentError);
    }

    #[test]
    fn test_array_block_count() {
        assert_eq!(binary(BinOp::Div, arr(&[1, 2, 1, 2]), arr(&[1, 2])), Ok(int(2)));
        assert_eq!(binary(BinOp::Div, arr(&[1, 2, 1, 3]), arr(&[1, 2])), Ok(int(0)));
        assert_eq!(binary(BinOp::Div, arr(&[1, 2, 1]), arr(&[1, 2])), Ok(int(0)));
        assert_eq!(binary(BinOp::Div, arr(&[1]), arr(&[])), Ok(int(0)));
    }

    #[test]
    fn test_array_comparisons() {
        assert_eq!(binary(BinOp::Lt, arr(&[1]), arr(&[1, 2])), Ok(int(1)));
        assert_eq!(binary(BinOp::Eq, arr(&[1, 2]), arr(&[1, 2])), Ok(int(1)));
        assert_eq!(binary(BinOp::Ne, arr(&[1, 2]), arr(&[2, 1])), Ok(int(1)));
        assert_eq!(kind_of(binary(BinOp::Le, arr(&[1]), arr(&[1]))), ErrorKind::UnknownOperator);
    }

    #[test]
    fn test_string_pairs() {
        assert_eq!(binary(BinOp::Add, s("ab"), s("c")), Ok(s("abc")));
        assert_eq!(binary(BinOp::Sub, s("hixx"), s("x")), Ok(s("hi")));
        assert_eq!(binary(BinOp::Div, s("abcabc"), s("abc")), Ok(int(2)));
        assert_eq!(binary(BinOp::Lt, s("apple"), s("banana")), Ok(int(1)));
        assert_eq!(binary(BinOp::Eq, s("a"), s("a")), Ok(int(1)));
        assert_eq!(kind_of(binary(BinOp::Mul, s("a"), s("b"))), ErrorKind::UnknownOperator);
    }
}
