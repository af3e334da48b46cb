//! Shared template specification models and the crate error type.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::conf::EnumFmtKey;

////////////////////////////////////////////////////////////////////////////////
// #region CellFormatSpecification

/// Cell format specification; `None` fields defer to the format underneath.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SpecCellFormat {
    /// Font family name.
    pub font_name: Option<String>,
    /// Font size in points.
    pub font_size: Option<i64>,
    /// Bold style.
    pub bold: Option<bool>,
    /// Italic style.
    pub italic: Option<bool>,

    /// Horizontal alignment.
    pub align: Option<String>,
    /// Vertical alignment.
    pub valign: Option<String>,
    /// Border style for all sides.
    pub border: Option<i64>,
    /// Text wrap.
    pub text_wrap: Option<bool>,

    /// Top border override.
    pub top: Option<i64>,
    /// Bottom border override.
    pub bottom: Option<i64>,
    /// Left border override.
    pub left: Option<i64>,
    /// Right border override.
    pub right: Option<i64>,

    /// Number format code.
    pub num_format: Option<String>,
    /// Background fill color.
    pub bg_color: Option<String>,
    /// Font color.
    pub font_color: Option<String>,
}

impl SpecCellFormat {
    /// Return a new format by overlaying `patch` onto `self`.
    pub fn with_(&self, patch: SpecCellFormat) -> SpecCellFormat {
        self.merge(&patch)
    }

    /// Merge two formats with right-side non-`None` overwrite semantics.
    pub fn merge(&self, other: &SpecCellFormat) -> SpecCellFormat {
        SpecCellFormat {
            font_name: other.font_name.clone().or_else(|| self.font_name.clone()),
            font_size: other.font_size.or(self.font_size),
            bold: other.bold.or(self.bold),
            italic: other.italic.or(self.italic),
            align: other.align.clone().or_else(|| self.align.clone()),
            valign: other.valign.clone().or_else(|| self.valign.clone()),
            border: other.border.or(self.border),
            text_wrap: other.text_wrap.or(self.text_wrap),
            top: other.top.or(self.top),
            bottom: other.bottom.or(self.bottom),
            left: other.left.or(self.left),
            right: other.right.or(self.right),
            num_format: other.num_format.clone().or_else(|| self.num_format.clone()),
            bg_color: other.bg_color.clone().or_else(|| self.bg_color.clone()),
            font_color: other.font_color.clone().or_else(|| self.font_color.clone()),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region TemplateSpecification

/// Semantic role of a row inside a block template.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnumRowRole {
    /// Per-tile copy of the column header row.
    Header,
    /// Raw replicate row, 1-based replicate number.
    Sample(usize),
    /// Replicate mean.
    Average,
    /// Replicate sample standard deviation.
    StdDev,
    /// Relative standard deviation in percent.
    Rsd,
    /// Relative percent difference between duplicates.
    Rpd,
    /// Instrument-specific row (moisture, ash, corrected basis, ...).
    Custom(String),
}

impl EnumRowRole {
    /// Whether this row holds a raw replicate.
    pub fn is_sample(&self) -> bool {
        matches!(self, Self::Sample(_))
    }
}

impl fmt::Display for EnumRowRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header => write!(f, "header"),
            Self::Sample(n_idx) => write!(f, "sample_row_{n_idx}"),
            Self::Average => write!(f, "average_row"),
            Self::StdDev => write!(f, "stdev_row"),
            Self::Rsd => write!(f, "rsd_row"),
            Self::Rpd => write!(f, "rpd_row"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// One cell of a row pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumCellPattern {
    /// Nothing written.
    Empty,
    /// Literal text.
    Text(String),
    /// Bold row label (`Average`, `Std Dev`, ...).
    Label(String),
    /// Numeric literal.
    Number(f64),
    /// Formula text; `{+n}` markers are tile-relative, everything else is fixed.
    Formula(String),
}

impl EnumCellPattern {
    /// Whether this cell carries a formula.
    pub fn is_formula(&self) -> bool {
        matches!(self, Self::Formula(_))
    }
}

/// Closed numeric acceptance interval `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpecAcceptanceRange {
    /// Inclusive lower bound.
    pub low: f64,
    /// Inclusive upper bound.
    pub high: f64,
}

/// Tile-level acceptance check: every `(role, col)` pair is highlighted.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecAcceptanceCheck {
    /// Rows to check.
    pub roles: Vec<EnumRowRole>,
    /// Zero-based columns to check.
    pub cols: Vec<usize>,
    /// Pass interval.
    pub range: SpecAcceptanceRange,
}

/// Parameterized pattern for one replicate group.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecBlockTemplate {
    /// Row patterns; `rows.len()` is the tile height.
    pub rows: Vec<Vec<EnumCellPattern>>,
    /// Row index by semantic role.
    pub named_rows: BTreeMap<EnumRowRole, usize>,
    /// Literal-only rows inserted between consecutive tiles.
    pub rows_separator: Vec<Vec<EnumCellPattern>>,
    /// Column receiving the `Sample {i}` label on replicate rows.
    pub col_label: usize,
    /// Columns holding computed statistics.
    pub cols_statistic: Vec<usize>,
    /// Pass/fail highlighting inside each tile.
    pub checks: Vec<SpecAcceptanceCheck>,
}

impl SpecBlockTemplate {
    /// Height of one tile.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns spanned by the tile.
    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// Distance between consecutive tile start rows.
    pub fn row_stride(&self) -> usize {
        self.row_count() + self.rows_separator.len()
    }

    /// Role declared for `n_idx_row`, if any.
    pub fn role_of(&self, n_idx_row: usize) -> Option<&EnumRowRole> {
        self.named_rows
            .iter()
            .find(|(_, n_idx)| **n_idx == n_idx_row)
            .map(|(role, _)| role)
    }

    /// Index of the last replicate row (the raw/summary boundary).
    pub fn row_sample_last(&self) -> Option<usize> {
        self.named_rows
            .iter()
            .filter(|(role, _)| role.is_sample())
            .map(|(_, n_idx)| *n_idx)
            .max()
    }
}

/// Source of one summary-sheet column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumSummarySource {
    /// The Analysis label cell of the tile's first replicate.
    SampleLabel,
    /// The Analysis cell at `(role, col)` of the tile.
    AnalysisCell {
        /// Row role inside the tile.
        role: EnumRowRole,
        /// Zero-based Analysis column.
        col: usize,
    },
}

/// One column of a per-sample summary sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecSummaryColumn {
    /// Header text.
    pub header: String,
    /// Referenced Analysis value.
    pub source: EnumSummarySource,
    /// Optional pass/fail interval for every data row.
    pub range: Option<SpecAcceptanceRange>,
}

/// Pass/fail check on one column of a check-sheet row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpecCellCheck {
    /// Zero-based column.
    pub col: usize,
    /// Pass interval.
    pub range: SpecAcceptanceRange,
}

/// One body row of a standard/validation check sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecCheckRow {
    /// Cell patterns, resolved against the first body row.
    pub cells: Vec<EnumCellPattern>,
    /// Checked cells of this row.
    pub checks: Vec<SpecCellCheck>,
}

/// Fixed-layout check sheet (standard checks, recovery validation).
#[derive(Debug, Clone, PartialEq)]
pub struct SpecCheckSheet {
    /// Header row text.
    pub columns: Vec<String>,
    /// Body rows.
    pub rows: Vec<SpecCheckRow>,
}

/// Auxiliary sheet layout kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumAuxSheetKind {
    /// One row per sample referencing Analysis tile rows.
    Summary(Vec<SpecSummaryColumn>),
    /// Fixed body independent of the sample count.
    Check(SpecCheckSheet),
}

/// Auxiliary sheet declared by an instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecAuxSheet {
    /// Sheet name.
    pub name: String,
    /// Layout recipe.
    pub kind: EnumAuxSheetKind,
}

/// Immutable instrument record held by the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecInstrument {
    /// Unique instrument name.
    pub name: String,
    /// Analysis column headers, in order.
    pub columns: Vec<String>,
    /// Replicate block recipe.
    pub block_template: SpecBlockTemplate,
    /// Secondary sheets.
    pub aux_sheets: Vec<SpecAuxSheet>,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region LayoutSpecification

/// Resolved cell content.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumCellValue {
    /// Missing/blank value.
    None,
    /// Text value.
    String(String),
    /// Numeric value.
    Number(f64),
    /// Absolute formula text (leading `=`).
    Formula(String),
}

/// One realized sheet row; `row` is the 1-based Excel row number.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecRealizedRow {
    /// Excel row number (1-based).
    pub row: usize,
    /// Role copied from the template, `None` for unnamed and separator rows.
    pub role: Option<EnumRowRole>,
    /// Resolved cells, one per column.
    pub cells: Vec<EnumCellValue>,
}

/// Materialized block instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecTile {
    /// 1-based sample number.
    pub sample_index: usize,
    /// First Excel row (1-based, inclusive).
    pub row_start: usize,
    /// Last Excel row (1-based, inclusive).
    pub row_end: usize,
    /// Absolute Excel row by role.
    pub rows_named: BTreeMap<EnumRowRole, usize>,
}

impl SpecTile {
    /// Whether `row` falls inside this tile.
    pub fn contains_row(&self, row: usize) -> bool {
        (self.row_start..=self.row_end).contains(&row)
    }

    /// Absolute row for `role`.
    pub fn row_of(&self, role: &EnumRowRole) -> Option<usize> {
        self.rows_named.get(role).copied()
    }
}

/// Tiler output for one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecTileRows {
    /// Tile placement.
    pub tile: SpecTile,
    /// Rows owned by the tile.
    pub rows: Vec<SpecRealizedRow>,
    /// Separator rows following the tile (empty after the last tile).
    pub rows_separator: Vec<SpecRealizedRow>,
}

/// Absolute row lookup table handed from the tiler to auxiliary sheets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecRowLayout {
    /// Tiles in sample order.
    pub tiles: Vec<SpecTile>,
    /// Excel rows occupied by separators.
    pub rows_separator: Vec<usize>,
}

impl SpecRowLayout {
    /// Build the lookup table from tiler output.
    pub fn from_tiles(l_tile_rows: &[SpecTileRows]) -> Self {
        Self {
            tiles: l_tile_rows.iter().map(|val| val.tile.clone()).collect(),
            rows_separator: l_tile_rows
                .iter()
                .flat_map(|val| val.rows_separator.iter().map(|row| row.row))
                .collect(),
        }
    }

    /// Absolute Analysis row of `role` in the tile of `sample_index` (1-based).
    pub fn lookup(&self, sample_index: usize, role: &EnumRowRole) -> Option<usize> {
        let tile = self.tiles.get(sample_index.checked_sub(1)?)?;
        tile.row_of(role)
    }

    /// Number of tiles.
    pub fn n_samples(&self) -> usize {
        self.tiles.len()
    }

    /// Last occupied Excel row.
    pub fn row_last(&self) -> usize {
        self.tiles.last().map_or(0, |tile| tile.row_end)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region DecorationSpecification

/// Rectangular range; rows are 1-based Excel rows, columns are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpecCellRange {
    /// First row (inclusive).
    pub row_first: usize,
    /// First column (inclusive).
    pub col_first: usize,
    /// Last row (inclusive).
    pub row_last: usize,
    /// Last column (inclusive).
    pub col_last: usize,
}

impl SpecCellRange {
    /// Single-cell range.
    pub fn cell(row: usize, col: usize) -> Self {
        Self {
            row_first: row,
            col_first: col,
            row_last: row,
            col_last: col,
        }
    }

    /// Single-row span `[col_first, col_last]`.
    pub fn row_span(row: usize, col_first: usize, col_last: usize) -> Self {
        Self {
            row_first: row,
            col_first,
            row_last: row,
            col_last,
        }
    }

    /// Whether `(row, col)` falls inside the range.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.row_first..=self.row_last).contains(&row)
            && (self.col_first..=self.col_last).contains(&col)
    }
}

/// Unconditional border styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnumBorderStyle {
    /// Full box around a header row.
    HeaderBox,
    /// Solid rule under the last row of a block.
    BottomRule,
    /// Dashed rule under the raw/summary boundary.
    DashedRule,
    /// Vertical rule on the right edge of a column.
    RightRule,
    /// Bottom plus right rule on the block corner cell.
    CornerRule,
}

/// Conditional rule evaluated by spreadsheet software.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnumConditionalRule {
    /// Value within `[low, high]`.
    Between {
        /// Inclusive lower bound.
        low: f64,
        /// Inclusive upper bound.
        high: f64,
    },
    /// Value outside `[low, high]`.
    NotBetween {
        /// Inclusive lower bound.
        low: f64,
        /// Inclusive upper bound.
        high: f64,
    },
}

/// Highlight applied when a conditional rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumHighlight {
    /// Green fill and text.
    Pass,
    /// Red fill and text.
    Fail,
}

/// Decoration payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnumDecorationKind {
    /// Border applied to every cell of the range.
    Border(EnumBorderStyle),
    /// Highlight applied when the rule matches.
    Conditional {
        /// Rule to evaluate.
        rule: EnumConditionalRule,
        /// Highlight on match.
        highlight: EnumHighlight,
    },
}

/// Range plus visual rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpecDecorationRegion {
    /// Covered cells.
    pub range: SpecCellRange,
    /// Visual rule.
    pub kind: EnumDecorationKind,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region SheetSpecification

/// One planned cell.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecSheetCell {
    /// Cell content.
    pub value: EnumCellValue,
    /// Base format preset.
    pub fmt_key: EnumFmtKey,
}

/// Fully planned sheet grid.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecSheetPlan {
    /// Sheet name.
    pub name: String,
    /// Cells keyed by `(row, col)`; row is 1-based, col is 0-based.
    pub cells: BTreeMap<(usize, usize), SpecSheetCell>,
    /// Borders and conditional rules, in application order.
    pub regions: Vec<SpecDecorationRegion>,
    /// Column width hints by zero-based column.
    pub widths: BTreeMap<usize, f64>,
    /// Number of leading rows to freeze.
    pub row_freeze: usize,
}

impl SpecSheetPlan {
    /// Empty sheet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: BTreeMap::new(),
            regions: Vec::new(),
            widths: BTreeMap::new(),
            row_freeze: 0,
        }
    }

    /// Place a value; blank values are not stored.
    pub fn set_cell(&mut self, row: usize, col: usize, value: EnumCellValue, fmt_key: EnumFmtKey) {
        if matches!(value, EnumCellValue::None) {
            return;
        }
        self.cells.insert((row, col), SpecSheetCell { value, fmt_key });
    }

    /// Value at `(row, col)`.
    pub fn value(&self, row: usize, col: usize) -> Option<&EnumCellValue> {
        self.cells.get(&(row, col)).map(|cell| &cell.value)
    }

    /// Text or formula content at `(row, col)`.
    pub fn text(&self, row: usize, col: usize) -> Option<&str> {
        match self.value(row, col)? {
            EnumCellValue::String(val) | EnumCellValue::Formula(val) => Some(val.as_str()),
            _ => None,
        }
    }

    /// Last row with content or decoration.
    pub fn row_last(&self) -> usize {
        let n_row_cells = self.cells.keys().map(|(row, _)| *row).max().unwrap_or(0);
        let n_row_regions = self
            .regions
            .iter()
            .map(|region| region.range.row_last)
            .max()
            .unwrap_or(0);
        usize::max(n_row_cells, n_row_regions)
    }

    /// All `(row, col, formula)` triples.
    pub fn formulas(&self) -> Vec<(usize, usize, &str)> {
        self.cells
            .iter()
            .filter_map(|((row, col), cell)| match &cell.value {
                EnumCellValue::Formula(val) => Some((*row, *col, val.as_str())),
                _ => None,
            })
            .collect()
    }
}

/// Complete workbook plan for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecWorkbookPlan {
    /// Instrument name.
    pub instrument: String,
    /// Requested number of samples.
    pub sample_count: usize,
    /// Sheets in workbook order; the first is always the Analysis sheet.
    pub sheets: Vec<SpecSheetPlan>,
    /// Analysis row layout used by the auxiliary sheets.
    pub layout: SpecRowLayout,
}

impl SpecWorkbookPlan {
    /// Sheet by name.
    pub fn sheet(&self, name: &str) -> Option<&SpecSheetPlan> {
        self.sheets.iter().find(|sheet| sheet.name == name)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WriteOptions

/// Header-driven column width inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecAutofitCellsPolicy {
    /// Minimum final width.
    pub width_cell_min: usize,
    /// Maximum final width.
    pub width_cell_max: usize,
    /// Width padding added after inference.
    pub width_cell_padding: usize,
}

impl Default for SpecAutofitCellsPolicy {
    fn default() -> Self {
        Self {
            width_cell_min: 10,
            width_cell_max: 40,
            width_cell_padding: 2,
        }
    }
}

/// Writer-wide options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecTemplateWriteOptions {
    /// Freeze each sheet's declared header rows.
    pub if_freeze_header: bool,
    /// Precede pass/fail rules with a stop-if-true blank rule.
    pub if_guard_blank_checks: bool,
    /// Document creation date `(year, month, day)` stamped into the workbook.
    pub date_created: (u16, u8, u8),
}

impl Default for SpecTemplateWriteOptions {
    fn default() -> Self {
        Self {
            if_freeze_header: true,
            if_guard_blank_checks: true,
            date_created: (2024, 1, 1),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ReportSpecification

/// Per-sheet write summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSheetReport {
    /// Actual unique sheet name in workbook.
    pub sheet_name: String,
    /// Last written row.
    pub n_rows: usize,
    /// Number of written cells, including border-only blanks.
    pub n_cells: usize,
    /// Number of conditional rules added.
    pub n_conditional_rules: usize,
}

/// Per-workbook write report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecTemplateReport {
    /// Sheets written so far.
    pub sheets: Vec<SpecSheetReport>,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

impl SpecTemplateReport {
    /// Add a warning message.
    pub fn warn(&mut self, msg: impl AsRef<str>) {
        self.warnings.push(msg.as_ref().to_string());
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Template generation failure; every variant aborts the whole request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// Requested instrument has no registry entry.
    #[error("Unknown instrument: {name:?}")]
    UnknownInstrument {
        /// Requested name.
        name: String,
    },
    /// Sample count is not a whole number >= 1, or does not fit a sheet.
    #[error("Invalid sample count {value:?}: {reason}")]
    InvalidSampleCount {
        /// Offending input as received.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
    /// Formula pattern cannot be resolved.
    #[error("Invalid formula pattern {pattern:?}: {reason}")]
    InvalidFormulaPattern {
        /// Pattern text.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },
    /// Instrument declaration violates a layout invariant.
    #[error("Invalid template for {instrument:?}: {reason}")]
    InvalidTemplate {
        /// Instrument name.
        instrument: String,
        /// Violated invariant.
        reason: String,
    },
    /// Row role absent from a tile.
    #[error("Row role {role} missing from tile {sample_index}")]
    MissingRowRole {
        /// Role name.
        role: String,
        /// 1-based sample number.
        sample_index: usize,
    },
    /// Two registry entries share a name.
    #[error("Duplicate instrument name: {name:?}")]
    DuplicateInstrument {
        /// Duplicated name.
        name: String,
    },
    /// Workbook could not be written or finalized.
    #[error("xlsx write error: {0}")]
    SerializationFailure(String),
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
