//! Index range expressions: `N`, `[N]`, or `[A-B]` (ascending,
//! inclusive). Every command line resolves its range at dispatch time,
//! so the parser stays a pure function from text to indices.

use crate::error::HarnessError;

pub fn parse_range(s: &str) -> Result<Vec<usize>, HarnessError> {
    if s.is_empty() {
        return Err(HarnessError::Parse("empty range expression".to_string()));
    }

    let bracketed = s.starts_with('[');
    if bracketed != s.ends_with(']') {
        return Err(HarnessError::Parse(format!("unbalanced brackets in '{s}'")));
    }

    if !bracketed {
        return Ok(vec![parse_index(s)?]);
    }

    let inner = s.get(1..s.len() - 1).unwrap_or_default();
    match inner.split_once('-') {
        None => Ok(vec![parse_index(inner)?]),
        Some((low, high)) => {
            let low = parse_index(low)?;
            let high = parse_index(high)?;
            if high < low {
                return Err(HarnessError::Parse(format!(
                    "descending range [{low}-{high}]"
                )));
            }
            Ok((low..=high).collect())
        }
    }
}

fn parse_index(token: &str) -> Result<usize, HarnessError> {
    token
        .parse::<usize>()
        .map_err(|_| HarnessError::Parse(format!("'{token}' is not a node index")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_and_bracketed_integers_are_singletons() {
        assert_eq!(parse_range("7").unwrap(), vec![7]);
        assert_eq!(parse_range("[7]").unwrap(), vec![7]);
        assert_eq!(parse_range("0").unwrap(), vec![0]);
    }

    #[test]
    fn ranges_are_ascending_and_inclusive() {
        assert_eq!(parse_range("[2-5]").unwrap(), vec![2, 3, 4, 5]);
        assert_eq!(parse_range("[3-3]").unwrap(), vec![3]);
    }

    #[test]
    fn descending_ranges_are_rejected() {
        assert!(matches!(
            parse_range("[5-2]"),
            Err(HarnessError::Parse(_))
        ));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(parse_range(""), Err(HarnessError::Parse(_))));
    }

    #[test]
    fn unbalanced_brackets_are_rejected() {
        assert!(parse_range("[3").is_err());
        assert!(parse_range("3]").is_err());
    }

    #[test]
    fn non_numeric_tokens_are_rejected() {
        assert!(parse_range("x").is_err());
        assert!(parse_range("[a-b]").is_err());
        assert!(parse_range("[1-z]").is_err());
    }
}
