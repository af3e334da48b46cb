//! Formula rewriter: tile-relative `{+n}` markers to absolute rows.
//!
//! A pattern such as `=STDEV(C{+1}:C{+3})/C{+4}*100` resolves against a tile
//! start row; any reference written without a marker (`Analysis!$F$2`) is
//! fixed and left untouched.

use std::sync::LazyLock;

use regex::Regex;

use crate::spec::{EnumCellPattern, EnumCellValue, TemplateError};

const C_RELATIVE_MARKER_PATTERN: &str = r"([A-Z])\{\+(\d+)\}";

static RE_RELATIVE_MARKER: LazyLock<Result<Regex, String>> = LazyLock::new(|| {
    Regex::new(C_RELATIVE_MARKER_PATTERN).map_err(|err| err.to_string())
});

fn derive_marker_regex() -> Result<&'static Regex, TemplateError> {
    RE_RELATIVE_MARKER
        .as_ref()
        .map_err(|err| TemplateError::InvalidFormulaPattern {
            pattern: C_RELATIVE_MARKER_PATTERN.to_string(),
            reason: err.clone(),
        })
}

fn derive_pattern_error(pattern: &str, reason: impl Into<String>) -> TemplateError {
    TemplateError::InvalidFormulaPattern {
        pattern: pattern.to_string(),
        reason: reason.into(),
    }
}

/// Validate marker syntax and return the relative offsets in order of appearance.
pub fn derive_relative_offsets(pattern: &str) -> Result<Vec<usize>, TemplateError> {
    if !pattern.starts_with('=') {
        return Err(derive_pattern_error(pattern, "formula must start with '='"));
    }

    let re_marker = derive_marker_regex()?;
    let c_rest = re_marker.replace_all(pattern, "");
    if c_rest.contains('{') || c_rest.contains('}') {
        return Err(derive_pattern_error(
            pattern,
            "malformed relative marker; expected <COLUMN>{+n}",
        ));
    }

    re_marker
        .captures_iter(pattern)
        .map(|caps| {
            caps[2]
                .parse::<usize>()
                .map_err(|_| derive_pattern_error(pattern, "relative offset overflow"))
        })
        .collect()
}

/// Resolve every `{+n}` marker to `row_start + n`; `row_start` is a 1-based Excel row.
pub fn resolve_formula(pattern: &str, row_start: usize) -> Result<String, TemplateError> {
    if row_start < 1 {
        return Err(derive_pattern_error(pattern, "start row must be >= 1"));
    }
    let l_offsets = derive_relative_offsets(pattern)?;

    let re_marker = derive_marker_regex()?;
    let mut c_resolved = String::with_capacity(pattern.len() + 8);
    let mut n_pos_last = 0usize;
    for (caps, n_offset) in re_marker.captures_iter(pattern).zip(l_offsets) {
        let Some(m_marker) = caps.get(0) else {
            continue;
        };
        let n_row = row_start
            .checked_add(n_offset)
            .ok_or_else(|| derive_pattern_error(pattern, "resolved row overflow"))?;

        c_resolved.push_str(&pattern[n_pos_last..m_marker.start()]);
        c_resolved.push_str(&caps[1]);
        c_resolved.push_str(&n_row.to_string());
        n_pos_last = m_marker.end();
    }
    c_resolved.push_str(&pattern[n_pos_last..]);

    Ok(c_resolved)
}

/// Resolve one cell pattern; literals pass through unchanged.
pub fn resolve(
    pattern: &EnumCellPattern,
    row_start: usize,
) -> Result<EnumCellValue, TemplateError> {
    Ok(match pattern {
        EnumCellPattern::Empty => EnumCellValue::None,
        EnumCellPattern::Text(val) | EnumCellPattern::Label(val) => {
            EnumCellValue::String(val.clone())
        }
        EnumCellPattern::Number(val) => EnumCellValue::Number(*val),
        EnumCellPattern::Formula(val) => EnumCellValue::Formula(resolve_formula(val, row_start)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_rewrites_multiple_offsets() {
        assert_eq!(
            resolve_formula("=C{+4}*100/(100-$B{+7}-$B{+8})", 11).as_deref(),
            Ok("=C15*100/(100-$B18-$B19)")
        );
        assert_eq!(
            resolve_formula("=AVERAGE(G{+1}:G{+2})", 9).as_deref(),
            Ok("=AVERAGE(G10:G11)")
        );
    }

    #[test]
    fn test_fixed_references_are_not_rewritten() {
        assert_eq!(
            resolve_formula("=(D{+0}-E{+0})*Analysis!$F$2/C{+0}", 3).as_deref(),
            Ok("=(D3-E3)*Analysis!$F$2/C3")
        );
        assert_eq!(
            resolve_formula("='Standard Check'!B4", 40).as_deref(),
            Ok("='Standard Check'!B4")
        );
    }

    #[test]
    fn test_literals_pass_through() {
        assert_eq!(resolve(&EnumCellPattern::Empty, 5), Ok(EnumCellValue::None));
        assert_eq!(
            resolve(&EnumCellPattern::Text("B{+1}".to_string()), 5),
            Ok(EnumCellValue::String("B{+1}".to_string()))
        );
        assert_eq!(
            resolve(&EnumCellPattern::Number(0.9982), 5),
            Ok(EnumCellValue::Number(0.9982))
        );
    }

    #[test]
    fn test_offsets_are_listed_in_order() {
        assert_eq!(
            derive_relative_offsets("=ABS(G{+1}-G{+2})/G{+3}*100"),
            Ok(vec![1, 2, 3])
        );
        assert_eq!(derive_relative_offsets("=Analysis!$F$2"), Ok(vec![]));
    }

    #[test]
    fn test_invalid_patterns_are_rejected() {
        for c_bad in ["=B{1}", "=B{+}", "=B{+1", "={+1}", "=B{-1}", "B{+1}"] {
            assert!(
                matches!(
                    derive_relative_offsets(c_bad),
                    Err(TemplateError::InvalidFormulaPattern { .. })
                ),
                "{c_bad:?} should be rejected"
            );
        }
        assert!(matches!(
            resolve_formula("=B{+1}", 0),
            Err(TemplateError::InvalidFormulaPattern { .. })
        ));
    }
}
