//! Template constants and default preset factories.

use std::collections::BTreeMap;

use crate::spec::{EnumBorderStyle, EnumCellPattern, EnumHighlight, SpecCellFormat};

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: usize = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: usize = 16_384;
/// Excel sheet name maximum length.
pub const N_LEN_EXCEL_SHEET_NAME_MAX: usize = 31;
/// Characters not allowed in sheet names.
pub const TUP_EXCEL_ILLEGAL: [&str; 7] = ["*", ":", "?", "/", "\\", "[", "]"];

/// Name of the always-present per-sample sheet.
pub const C_SHEET_NAME_ANALYSIS: &str = "Analysis";
/// Suffix appended to the instrument name for the download artifact.
pub const C_TEMPLATE_FILE_SUFFIX: &str = "_data_template.xlsx";
/// First body row of auxiliary sheets (row 1 is the header).
pub const N_ROW_AUX_BODY_START: usize = 2;

/// Border style codes understood by the writer.
pub const N_BORDER_THIN: i64 = 1;
/// Medium solid border.
pub const N_BORDER_MEDIUM: i64 = 2;
/// Dashed border.
pub const N_BORDER_DASHED: i64 = 3;

/// Canonical format preset keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnumFmtKey {
    /// Generic text cell format.
    Text,
    /// Column header format.
    Header,
    /// Bold row label format.
    Label,
    /// Decimal number format for literals and formulas.
    Decimal,
}

/// Build default named format presets used by [`crate::writer::XlsxTemplateWriter`].
pub fn derive_default_template_formats() -> BTreeMap<EnumFmtKey, SpecCellFormat> {
    let cfg_base_fmt_spec = SpecCellFormat {
        font_name: Some("Calibri".to_string()),
        font_size: Some(11),
        align: Some("left".to_string()),
        valign: Some("vcenter".to_string()),
        ..Default::default()
    };

    let mut dict_fmt = BTreeMap::new();
    dict_fmt.insert(EnumFmtKey::Text, cfg_base_fmt_spec.clone());
    dict_fmt.insert(
        EnumFmtKey::Header,
        cfg_base_fmt_spec.with_(SpecCellFormat {
            bold: Some(true),
            align: Some("center".to_string()),
            text_wrap: Some(true),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        EnumFmtKey::Label,
        cfg_base_fmt_spec.with_(SpecCellFormat {
            bold: Some(true),
            ..Default::default()
        }),
    );
    dict_fmt.insert(
        EnumFmtKey::Decimal,
        cfg_base_fmt_spec.with_(SpecCellFormat {
            align: Some("right".to_string()),
            num_format: Some("0.0000".to_string()),
            ..Default::default()
        }),
    );

    dict_fmt
}

/// Base preset for a cell pattern outside header rows.
pub fn derive_pattern_fmt_key(pattern: &EnumCellPattern) -> EnumFmtKey {
    match pattern {
        EnumCellPattern::Label(_) => EnumFmtKey::Label,
        EnumCellPattern::Number(_) | EnumCellPattern::Formula(_) => EnumFmtKey::Decimal,
        EnumCellPattern::Empty | EnumCellPattern::Text(_) => EnumFmtKey::Text,
    }
}

/// Border patch overlaid on every cell covered by a region of `style`.
pub fn derive_decoration_format(style: EnumBorderStyle) -> SpecCellFormat {
    match style {
        EnumBorderStyle::HeaderBox => SpecCellFormat {
            top: Some(N_BORDER_THIN),
            bottom: Some(N_BORDER_THIN),
            left: Some(N_BORDER_THIN),
            right: Some(N_BORDER_THIN),
            ..Default::default()
        },
        EnumBorderStyle::BottomRule => SpecCellFormat {
            bottom: Some(N_BORDER_MEDIUM),
            ..Default::default()
        },
        EnumBorderStyle::DashedRule => SpecCellFormat {
            bottom: Some(N_BORDER_DASHED),
            ..Default::default()
        },
        EnumBorderStyle::RightRule => SpecCellFormat {
            right: Some(N_BORDER_THIN),
            ..Default::default()
        },
        EnumBorderStyle::CornerRule => SpecCellFormat {
            bottom: Some(N_BORDER_MEDIUM),
            right: Some(N_BORDER_THIN),
            ..Default::default()
        },
    }
}

/// Fill and font applied when a pass/fail rule matches.
pub fn derive_highlight_format(highlight: EnumHighlight) -> SpecCellFormat {
    match highlight {
        EnumHighlight::Pass => SpecCellFormat {
            bg_color: Some("#C6EFCE".to_string()),
            font_color: Some("#006100".to_string()),
            ..Default::default()
        },
        EnumHighlight::Fail => SpecCellFormat {
            bg_color: Some("#FFC7CE".to_string()),
            font_color: Some("#9C0006".to_string()),
            ..Default::default()
        },
    }
}
