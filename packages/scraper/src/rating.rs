//! Rating code normalization.
//!
//! The diary renders a rating as a `<span>` whose markup carries the
//! half-star code somewhere in its attributes (e.g. `rated-7`). The code is
//! the only run of one or two digits in the fragment.

use std::sync::LazyLock;

use film_walk_diary_models::Rating;
use regex::Regex;

static DIGIT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,2}").unwrap_or_else(|_| unreachable!()));

/// Why a rating fragment could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RatingError {
    /// More than one numeric run was found, so the code is ambiguous.
    #[error("ambiguous rating: found {found:?} in fragment")]
    Ambiguous {
        /// Every numeric run in the fragment.
        found: Vec<String>,
    },

    /// A single numeric run was found but it is not a valid code.
    #[error("rating code {value} out of range 1-10")]
    OutOfRange {
        /// The parsed value.
        value: u8,
    },
}

/// Extracts the rating code from a raw rating fragment.
///
/// Returns `Ok(None)` when the fragment has no digits (unrated).
///
/// # Errors
///
/// Returns [`RatingError::Ambiguous`] if more than one run of digits is
/// present, or [`RatingError::OutOfRange`] if the single run is not 1-10.
pub fn extract_rating(fragment: &str) -> Result<Option<Rating>, RatingError> {
    let found: Vec<&str> = DIGIT_RUN.find_iter(fragment).map(|m| m.as_str()).collect();

    match found.as_slice() {
        [] => Ok(None),
        [digits] => {
            // At most two ASCII digits, so this always fits in a u8.
            let value: u8 = digits.parse().unwrap_or(0);
            Rating::from_value(value)
                .map(Some)
                .map_err(|e| RatingError::OutOfRange { value: e.value })
        }
        _ => Err(RatingError::Ambiguous {
            found: found.iter().map(|s| (*s).to_owned()).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(fragment: &str) -> Option<u8> {
        extract_rating(fragment).unwrap().map(Rating::value)
    }

    #[test]
    fn empty_fragment_is_unrated() {
        assert_eq!(code(""), None);
    }

    #[test]
    fn span_without_digits_is_unrated() {
        assert_eq!(code(r#"<span class="rating"></span>"#), None);
    }

    #[test]
    fn single_digit() {
        assert_eq!(code("7"), Some(7));
    }

    #[test]
    fn two_digits() {
        assert_eq!(code("10"), Some(10));
    }

    #[test]
    fn digits_inside_markup() {
        assert_eq!(code(r#"<span class="rating rated-6">★★★</span>"#), Some(6));
        assert_eq!(code("rating=6"), Some(6));
    }

    #[test]
    fn multiple_runs_are_ambiguous() {
        assert_eq!(
            extract_rating("3 5"),
            Err(RatingError::Ambiguous {
                found: vec!["3".to_owned(), "5".to_owned()],
            })
        );
    }

    #[test]
    fn three_digit_number_is_ambiguous() {
        assert!(matches!(
            extract_rating("100"),
            Err(RatingError::Ambiguous { .. })
        ));
    }

    #[test]
    fn zero_is_out_of_range() {
        assert_eq!(
            extract_rating("rated-0"),
            Err(RatingError::OutOfRange { value: 0 })
        );
    }

    #[test]
    fn eleven_is_out_of_range() {
        assert_eq!(
            extract_rating("11"),
            Err(RatingError::OutOfRange { value: 11 })
        );
    }
}
