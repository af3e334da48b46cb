//! Stateless helper utilities shared by the planners and the writer.

use std::collections::{BTreeMap, BTreeSet};

use crate::conf::{C_TEMPLATE_FILE_SUFFIX, N_LEN_EXCEL_SHEET_NAME_MAX, TUP_EXCEL_ILLEGAL};
use crate::spec::{EnumCellValue, SpecAutofitCellsPolicy, SpecSheetPlan, TemplateError};

////////////////////////////////////////////////////////////////////////////////
// #region CellReferences

/// Convert a zero-based column index to Excel letters (`0 -> A`, `26 -> AA`).
pub fn derive_column_letters(col: usize) -> String {
    let mut v_letters = Vec::new();
    let mut n_rest = col + 1;
    while n_rest > 0 {
        let n_rem = (n_rest - 1) % 26;
        v_letters.push(char::from(b'A' + n_rem as u8));
        n_rest = (n_rest - 1) / 26;
    }
    v_letters.iter().rev().collect()
}

/// Relative A1 reference for a 1-based row and zero-based column.
pub fn derive_cell_ref(row: usize, col: usize) -> String {
    format!("{}{row}", derive_column_letters(col))
}

/// Sheet prefix for cross-sheet references, quoted when required.
pub fn derive_sheet_ref_prefix(sheet_name: &str) -> String {
    let if_plain = !sheet_name.is_empty()
        && sheet_name
            .chars()
            .all(|chr| chr.is_ascii_alphanumeric() || chr == '_')
        && !sheet_name.starts_with(|chr: char| chr.is_ascii_digit());
    if if_plain {
        format!("{sheet_name}!")
    } else {
        format!("'{}'!", sheet_name.replace('\'', "''"))
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetNormalization

/// Replace invalid chars and trim to valid Excel sheet name.
pub fn sanitize_sheet_name(name: &str, replace_to: &str) -> String {
    let mut c_name = name.to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_name = c_name.replace(c_illegal, replace_to);
    }
    c_name = c_name.trim().trim_matches('\'').to_string();
    if c_name.is_empty() {
        c_name = "Sheet".to_string();
    }

    c_name.chars().take(N_LEN_EXCEL_SHEET_NAME_MAX).collect()
}

/// Create suffixed sheet name (`base_2`, `base_3`, ...), respecting length cap.
pub fn create_sheet_identifier(base_name: &str, part_idx_1based: usize) -> String {
    let c_sheet_name_suffix = format!("_{part_idx_1based}");
    let n_len_base_name_max = N_LEN_EXCEL_SHEET_NAME_MAX.saturating_sub(c_sheet_name_suffix.len());

    let c_sheet_name_base: String = base_name
        .chars()
        .take(usize::max(1, n_len_base_name_max))
        .collect();

    format!("{c_sheet_name_base}{c_sheet_name_suffix}")
}

/// Return `name` if unused (case-insensitive, as Excel compares), else the first free suffix.
pub fn derive_unique_sheet_name(
    name: &str,
    set_sheet_names_existing: &mut BTreeSet<String>,
) -> String {
    if set_sheet_names_existing.insert(name.to_lowercase()) {
        return name.to_string();
    }

    let mut n_idx = 2usize;
    loop {
        let candidate = create_sheet_identifier(name, n_idx);
        if set_sheet_names_existing.insert(candidate.to_lowercase()) {
            return candidate;
        }
        n_idx += 1;
    }
}

/// Download artifact name `{instrument}_data_template.xlsx`.
pub fn derive_template_file_name(instrument_name: &str) -> String {
    let mut c_stem = instrument_name.trim().to_string();
    for c_illegal in TUP_EXCEL_ILLEGAL {
        c_stem = c_stem.replace(c_illegal, "_");
    }
    if c_stem.is_empty() {
        c_stem = "instrument".to_string();
    }
    format!("{c_stem}{C_TEMPLATE_FILE_SUFFIX}")
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SampleCount

/// Validate an integer sample count (`>= 1`).
pub fn validate_sample_count(sample_count: i64) -> Result<usize, TemplateError> {
    if sample_count < 1 {
        return Err(TemplateError::InvalidSampleCount {
            value: sample_count.to_string(),
            reason: "must be >= 1".to_string(),
        });
    }
    usize::try_from(sample_count).map_err(|_| TemplateError::InvalidSampleCount {
        value: sample_count.to_string(),
        reason: "does not fit the platform word size".to_string(),
    })
}

/// Parse user input as a whole sample count; `"3"` and `"3.0"` are accepted.
pub fn parse_sample_count(text: &str) -> Result<usize, TemplateError> {
    let c_text = text.trim();
    if let Ok(n_value) = c_text.parse::<i64>() {
        return validate_sample_count(n_value);
    }

    let invalid = |reason: &str| TemplateError::InvalidSampleCount {
        value: text.to_string(),
        reason: reason.to_string(),
    };
    let n_value = c_text.parse::<f64>().map_err(|_| invalid("not a number"))?;
    if !n_value.is_finite() || n_value.fract() != 0.0 {
        return Err(invalid("not a whole number"));
    }
    if n_value < 1.0 {
        return Err(invalid("must be >= 1"));
    }
    if n_value > i64::MAX as f64 {
        return Err(invalid("too large"));
    }
    validate_sample_count(n_value as i64)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ColumnWidths

/// Display width estimate; non-ASCII glyphs count as 1.6 units.
pub fn estimate_unicode_string_width(s: &str) -> usize {
    let n_ascii = s.chars().filter(|chr| chr.is_ascii()).count();
    let n_non_ascii = s.chars().count().saturating_sub(n_ascii);
    n_ascii + (n_non_ascii as f64 * 1.6).round() as usize
}

/// Infer column widths from the text cells of a planned sheet.
///
/// Formula and numeric cells are ignored; their rendered width is unknown
/// until the spreadsheet evaluates them.
pub fn derive_column_widths(
    sheet: &SpecSheetPlan,
    policy_autofit: &SpecAutofitCellsPolicy,
) -> BTreeMap<usize, f64> {
    let mut dict_width_by_col: BTreeMap<usize, usize> = BTreeMap::new();
    for ((_, col), cell) in &sheet.cells {
        let n_width = match &cell.value {
            EnumCellValue::String(val) => estimate_unicode_string_width(val),
            _ => 0,
        };
        let n_width_recorded = dict_width_by_col.entry(*col).or_insert(0);
        *n_width_recorded = usize::max(*n_width_recorded, n_width);
    }

    let n_min = usize::max(1, policy_autofit.width_cell_min);
    let n_max = usize::min(255, usize::max(n_min, policy_autofit.width_cell_max));
    let n_pad = policy_autofit.width_cell_padding;

    dict_width_by_col
        .into_iter()
        .map(|(col, n_width)| {
            let n_width_final = usize::min(n_max, usize::max(n_min, n_width + n_pad));
            (col, n_width_final as f64)
        })
        .collect()
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::EnumFmtKey;

    #[test]
    fn test_derive_column_letters_handles_multi_letter_columns() {
        assert_eq!(derive_column_letters(0), "A");
        assert_eq!(derive_column_letters(7), "H");
        assert_eq!(derive_column_letters(25), "Z");
        assert_eq!(derive_column_letters(26), "AA");
        assert_eq!(derive_column_letters(701), "ZZ");
        assert_eq!(derive_column_letters(702), "AAA");
        assert_eq!(derive_cell_ref(12, 6), "G12");
    }

    #[test]
    fn test_sheet_ref_prefix_quotes_names_with_spaces() {
        assert_eq!(derive_sheet_ref_prefix("Analysis"), "Analysis!");
        assert_eq!(derive_sheet_ref_prefix("Standard Check"), "'Standard Check'!");
        assert_eq!(derive_sheet_ref_prefix("O'Brien"), "'O''Brien'!");
        assert_eq!(derive_sheet_ref_prefix("2024"), "'2024'!");
    }

    #[test]
    fn test_sanitize_and_unique_sheet_names() {
        assert_eq!(sanitize_sheet_name("Check [a/b]", "_"), "Check _a_b_");
        assert_eq!(sanitize_sheet_name("   ", "_"), "Sheet");

        let mut set_names = BTreeSet::new();
        assert_eq!(derive_unique_sheet_name("Summary", &mut set_names), "Summary");
        assert_eq!(derive_unique_sheet_name("summary", &mut set_names), "summary_2");
        assert_eq!(derive_unique_sheet_name("Summary", &mut set_names), "Summary_3");
    }

    #[test]
    fn test_template_file_name() {
        assert_eq!(
            derive_template_file_name("CHN Analyzer"),
            "CHN Analyzer_data_template.xlsx"
        );
        assert_eq!(derive_template_file_name("a/b"), "a_b_data_template.xlsx");
    }

    #[test]
    fn test_parse_sample_count_accepts_whole_numbers_only() {
        assert_eq!(parse_sample_count("3"), Ok(3));
        assert_eq!(parse_sample_count(" 5 "), Ok(5));
        assert_eq!(parse_sample_count("4.0"), Ok(4));

        for c_bad in ["0", "-2", "2.5", "abc", "", "NaN", "inf"] {
            assert!(
                matches!(
                    parse_sample_count(c_bad),
                    Err(TemplateError::InvalidSampleCount { .. })
                ),
                "{c_bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_column_widths_use_text_cells_and_clamp() {
        let mut sheet = SpecSheetPlan::new("S");
        sheet.set_cell(1, 0, EnumCellValue::String("ID".to_string()), EnumFmtKey::Header);
        sheet.set_cell(
            1,
            1,
            EnumCellValue::String("Carboxylic Acids (mmol/g)".to_string()),
            EnumFmtKey::Header,
        );
        sheet.set_cell(
            2,
            2,
            EnumCellValue::Formula("=AVERAGE(C1:C9)".to_string()),
            EnumFmtKey::Decimal,
        );
        sheet.set_cell(3, 3, EnumCellValue::String("x".repeat(80)), EnumFmtKey::Text);

        let dict_widths = derive_column_widths(&sheet, &SpecAutofitCellsPolicy::default());
        assert_eq!(dict_widths[&0], 10.0);
        assert_eq!(dict_widths[&1], 27.0);
        assert_eq!(dict_widths[&2], 10.0);
        assert_eq!(dict_widths[&3], 40.0);
    }
}
