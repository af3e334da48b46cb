//! XLSX writer kernel that serializes planned template sheets.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use rust_xlsxwriter::{
    ConditionalFormatBlank, ConditionalFormatCell, ConditionalFormatCellRule, DocProperties,
    ExcelDateTime, Format, FormatAlign, FormatBorder, Formula, Workbook, Worksheet, XlsxError,
};
use tracing::{debug, info, warn};

use crate::conf::{
    EnumFmtKey, derive_decoration_format, derive_default_template_formats, derive_highlight_format,
};
use crate::spec::{
    EnumCellValue, EnumConditionalRule, EnumDecorationKind, SpecCellFormat, SpecCellRange,
    SpecSheetPlan, SpecSheetReport, SpecTemplateReport, SpecTemplateWriteOptions,
    SpecWorkbookPlan, TemplateError,
};
use crate::util::{derive_unique_sheet_name, sanitize_sheet_name};

/// Stateful workbook writer; one instance per generated template.
///
/// The workbook is buffered in memory until [`Self::close`] is called. After
/// close, further writes are rejected and the finalized bytes are reused.
pub struct XlsxTemplateWriter {
    workbook: Workbook,
    dict_fmt: BTreeMap<EnumFmtKey, SpecCellFormat>,
    write_options: SpecTemplateWriteOptions,
    set_sheet_names_existing: BTreeSet<String>,
    report: SpecTemplateReport,
    v_bytes: Option<Vec<u8>>,
}

impl XlsxTemplateWriter {
    /// Create writer with the default format presets.
    pub fn new(write_options: SpecTemplateWriteOptions) -> Self {
        Self::with_formats(derive_default_template_formats(), write_options)
    }

    /// Create writer with explicit format presets.
    pub fn with_formats(
        dict_fmt: BTreeMap<EnumFmtKey, SpecCellFormat>,
        write_options: SpecTemplateWriteOptions,
    ) -> Self {
        Self {
            workbook: Workbook::new(),
            dict_fmt,
            write_options,
            set_sheet_names_existing: BTreeSet::new(),
            report: SpecTemplateReport::default(),
            v_bytes: None,
        }
    }

    /// Return immutable snapshot of the write report.
    pub fn report(&self) -> SpecTemplateReport {
        self.report.clone()
    }

    /// Whether the workbook has been finalized.
    pub fn if_closed(&self) -> bool {
        self.v_bytes.is_some()
    }

    /// Finalize the workbook in memory. Idempotent.
    pub fn close(&mut self) -> Result<(), TemplateError> {
        if self.if_closed() {
            return Ok(());
        }

        let (n_year, n_month, n_day) = self.write_options.date_created;
        let dt_created =
            ExcelDateTime::from_ymd(n_year, n_month, n_day).map_err(derive_xlsx_error)?;
        let properties = DocProperties::new().set_creation_datetime(&dt_created);
        self.workbook.set_properties(&properties);

        let v_bytes = self.workbook.save_to_buffer().map_err(derive_xlsx_error)?;
        info!(
            n_sheets = self.report.sheets.len(),
            n_bytes = v_bytes.len(),
            "template workbook serialized"
        );
        self.v_bytes = Some(v_bytes);
        Ok(())
    }

    /// Close (if needed) and return the workbook bytes.
    pub fn save_to_buffer(&mut self) -> Result<Vec<u8>, TemplateError> {
        self.close()?;
        Ok(self.v_bytes.clone().unwrap_or_default())
    }

    /// Close (if needed) and write the workbook to `path_file_out`.
    pub fn save(&mut self, path_file_out: impl AsRef<Path>) -> Result<(), TemplateError> {
        let v_bytes = self.save_to_buffer()?;
        std::fs::write(path_file_out.as_ref(), v_bytes).map_err(|err| {
            TemplateError::SerializationFailure(format!(
                "Failed to write {}: {err}",
                path_file_out.as_ref().display()
            ))
        })
    }

    /// Write every sheet of `plan`, in order.
    pub fn write_workbook(&mut self, plan: &SpecWorkbookPlan) -> Result<(), TemplateError> {
        for sheet in &plan.sheets {
            self.write_sheet(sheet)?;
        }
        Ok(())
    }

    /// Write one planned sheet.
    pub fn write_sheet(&mut self, sheet: &SpecSheetPlan) -> Result<(), TemplateError> {
        if self.if_closed() {
            return Err(TemplateError::SerializationFailure(
                "Cannot write after close().".to_string(),
            ));
        }

        let sheet_name_unique = derive_unique_sheet_name(
            &sanitize_sheet_name(&sheet.name, "_"),
            &mut self.set_sheet_names_existing,
        );
        if sheet_name_unique != sheet.name {
            let c_msg = format!(
                "Sheet name {:?} was written as {sheet_name_unique:?}.",
                sheet.name
            );
            warn!("{c_msg}");
            self.report.warn(c_msg);
        }

        let worksheet = self.workbook.add_worksheet();
        worksheet
            .set_name(&sheet_name_unique)
            .map_err(derive_xlsx_error)?;

        let l_borders = sheet
            .regions
            .iter()
            .filter_map(|region| match region.kind {
                EnumDecorationKind::Border(style) => {
                    Some((region.range, derive_decoration_format(style)))
                }
                EnumDecorationKind::Conditional { .. } => None,
            })
            .collect::<Vec<_>>();

        let mut set_cells = sheet.cells.keys().copied().collect::<BTreeSet<_>>();
        for (range, _) in &l_borders {
            for row in range.row_first..=range.row_last {
                for col in range.col_first..=range.col_last {
                    set_cells.insert((row, col));
                }
            }
        }

        let fmt_text = self.dict_fmt.get(&EnumFmtKey::Text).cloned().unwrap_or_default();
        let mut dict_format_cache: HashMap<SpecCellFormat, Format> = HashMap::new();
        for (row, col) in &set_cells {
            let cell = sheet.cells.get(&(*row, *col));
            let mut fmt_cell = cell
                .and_then(|val| self.dict_fmt.get(&val.fmt_key))
                .unwrap_or(&fmt_text)
                .clone();
            for (range, fmt_border) in &l_borders {
                if range.contains(*row, *col) {
                    fmt_cell = fmt_cell.merge(fmt_border);
                }
            }
            let format = dict_format_cache
                .entry(fmt_cell)
                .or_insert_with_key(derive_rust_xlsx_format);
            let value = cell.map_or(&EnumCellValue::None, |val| &val.value);
            write_cell_with_format(worksheet, *row, *col, value, format)?;
        }

        let n_conditional_rules = write_conditional_rules(
            worksheet,
            sheet,
            self.write_options.if_guard_blank_checks,
        )?;

        for (col, n_width) in &sheet.widths {
            worksheet
                .set_column_width(cast_col_num(*col)?, *n_width)
                .map_err(derive_xlsx_error)?;
        }
        if self.write_options.if_freeze_header && sheet.row_freeze > 0 {
            worksheet
                .set_freeze_panes(cast_row_num(sheet.row_freeze)?, 0)
                .map_err(derive_xlsx_error)?;
        }

        debug!(
            sheet = %sheet_name_unique,
            n_cells = set_cells.len(),
            n_conditional_rules,
            "sheet written"
        );
        self.report.sheets.push(SpecSheetReport {
            sheet_name: sheet_name_unique,
            n_rows: sheet.row_last(),
            n_cells: set_cells.len(),
            n_conditional_rules,
        });
        Ok(())
    }
}

fn write_conditional_rules(
    worksheet: &mut Worksheet,
    sheet: &SpecSheetPlan,
    if_guard_blank_checks: bool,
) -> Result<usize, TemplateError> {
    let mut set_ranges_guarded: BTreeSet<SpecCellRange> = BTreeSet::new();
    let mut n_rules = 0usize;
    for region in &sheet.regions {
        let EnumDecorationKind::Conditional { rule, highlight } = region.kind else {
            continue;
        };
        let range = region.range;
        let (row_first, col_first, row_last, col_last) = (
            cast_row_idx(range.row_first)?,
            cast_col_num(range.col_first)?,
            cast_row_idx(range.row_last)?,
            cast_col_num(range.col_last)?,
        );

        // Unfilled cells evaluate as 0; stop before the pass/fail pair.
        if if_guard_blank_checks && set_ranges_guarded.insert(range) {
            let cf_blank = ConditionalFormatBlank::new()
                .set_format(Format::new())
                .set_stop_if_true(true);
            worksheet
                .add_conditional_format(row_first, col_first, row_last, col_last, &cf_blank)
                .map_err(derive_xlsx_error)?;
            n_rules += 1;
        }

        let rule_cell = match rule {
            EnumConditionalRule::Between { low, high } => {
                ConditionalFormatCellRule::Between(low, high)
            }
            EnumConditionalRule::NotBetween { low, high } => {
                ConditionalFormatCellRule::NotBetween(low, high)
            }
        };
        let cf_cell = ConditionalFormatCell::new()
            .set_rule(rule_cell)
            .set_format(derive_rust_xlsx_format(&derive_highlight_format(highlight)));
        worksheet
            .add_conditional_format(row_first, col_first, row_last, col_last, &cf_cell)
            .map_err(derive_xlsx_error)?;
        n_rules += 1;
    }
    Ok(n_rules)
}

fn write_cell_with_format(
    worksheet: &mut Worksheet,
    row: usize,
    col: usize,
    value: &EnumCellValue,
    format: &Format,
) -> Result<(), TemplateError> {
    let (row_idx, col_idx) = (cast_row_idx(row)?, cast_col_num(col)?);
    match value {
        EnumCellValue::None => {
            worksheet
                .write_blank(row_idx, col_idx, format)
                .map_err(derive_xlsx_error)?;
        }
        EnumCellValue::String(val) => {
            worksheet
                .write_string_with_format(row_idx, col_idx, val, format)
                .map_err(derive_xlsx_error)?;
        }
        EnumCellValue::Number(val) => {
            worksheet
                .write_number_with_format(row_idx, col_idx, *val, format)
                .map_err(derive_xlsx_error)?;
        }
        EnumCellValue::Formula(val) => {
            worksheet
                .write_formula_with_format(row_idx, col_idx, Formula::new(val), format)
                .map_err(derive_xlsx_error)?;
        }
    }
    Ok(())
}

fn derive_rust_xlsx_format(spec: &SpecCellFormat) -> Format {
    let mut format = Format::new();

    if let Some(val) = &spec.font_name {
        format = format.set_font_name(val.clone());
    }
    if let Some(val) = spec.font_size {
        format = format.set_font_size(val as f64);
    }
    if spec.bold.unwrap_or(false) {
        format = format.set_bold();
    }
    if spec.italic.unwrap_or(false) {
        format = format.set_italic();
    }

    if let Some(val) = &spec.align
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }
    if let Some(val) = &spec.valign
        && let Some(align) = derive_format_align(val)
    {
        format = format.set_align(align);
    }

    if let Some(val) = &spec.num_format {
        format = format.set_num_format(val.clone());
    }
    if let Some(val) = &spec.bg_color {
        format = format.set_background_color(val.as_str());
    }
    if let Some(val) = &spec.font_color {
        format = format.set_font_color(val.as_str());
    }

    if let Some(val) = spec.border {
        format = format.set_border(derive_format_border(val));
    }
    if let Some(val) = spec.top {
        format = format.set_border_top(derive_format_border(val));
    }
    if let Some(val) = spec.bottom {
        format = format.set_border_bottom(derive_format_border(val));
    }
    if let Some(val) = spec.left {
        format = format.set_border_left(derive_format_border(val));
    }
    if let Some(val) = spec.right {
        format = format.set_border_right(derive_format_border(val));
    }

    if spec.text_wrap.unwrap_or(false) {
        format = format.set_text_wrap();
    }

    format
}

fn derive_format_border(border: i64) -> FormatBorder {
    match border {
        1 => FormatBorder::Thin,
        2 => FormatBorder::Medium,
        3 => FormatBorder::Dashed,
        4 => FormatBorder::Dotted,
        5 => FormatBorder::Thick,
        6 => FormatBorder::Double,
        _ => FormatBorder::None,
    }
}

fn derive_format_align(align: &str) -> Option<FormatAlign> {
    let value = align.trim().to_ascii_lowercase();
    match value.as_str() {
        "general" => Some(FormatAlign::General),
        "left" => Some(FormatAlign::Left),
        "center" => Some(FormatAlign::Center),
        "right" => Some(FormatAlign::Right),
        "top" => Some(FormatAlign::Top),
        "bottom" => Some(FormatAlign::Bottom),
        "vcenter" | "vertical_center" => Some(FormatAlign::VerticalCenter),
        _ => None,
    }
}

fn cast_row_num(value: usize) -> Result<u32, TemplateError> {
    u32::try_from(value)
        .map_err(|_| TemplateError::SerializationFailure(format!("row index overflow: {value}")))
}

/// Zero-based serializer row for a 1-based plan row.
fn cast_row_idx(row: usize) -> Result<u32, TemplateError> {
    let n_idx = row.checked_sub(1).ok_or_else(|| {
        TemplateError::SerializationFailure("plan rows are 1-based; got row 0".to_string())
    })?;
    cast_row_num(n_idx)
}

fn cast_col_num(value: usize) -> Result<u16, TemplateError> {
    u16::try_from(value).map_err(|_| {
        TemplateError::SerializationFailure(format!("column index overflow: {value}"))
    })
}

fn derive_xlsx_error(err: XlsxError) -> TemplateError {
    TemplateError::SerializationFailure(err.to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use calamine::{Data, Reader, Xlsx, open_workbook_from_rs};
    use tempfile::tempdir;

    use super::*;
    use crate::assembler::assemble;
    use crate::spec::EnumBorderStyle;

    fn derive_workbook_bytes(instrument_name: &str, sample_count: i64) -> Vec<u8> {
        let plan = assemble(instrument_name, sample_count).expect("assemble");
        let mut writer = XlsxTemplateWriter::new(SpecTemplateWriteOptions::default());
        writer.write_workbook(&plan).expect("write");
        writer.save_to_buffer().expect("bytes")
    }

    #[test]
    fn test_written_workbook_reads_back() {
        let v_bytes = derive_workbook_bytes("Acids Titration", 2);
        let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(v_bytes)).expect("open");

        assert_eq!(
            workbook.sheet_names(),
            vec!["Analysis", "Summary", "Validation"]
        );

        let range = workbook.worksheet_range("Analysis").expect("range");
        assert_eq!(
            range.get_value((0, 6)),
            Some(&Data::String("Carboxylic Acids (mmol/g)".to_string()))
        );
        assert_eq!(
            range.get_value((9, 0)),
            Some(&Data::String("Sample 2".to_string()))
        );

        let formulas = workbook.worksheet_formula("Analysis").expect("formulas");
        assert_eq!(
            formulas.get_value((11, 6)).map(String::as_str),
            Some("AVERAGE(G10:G11)")
        );

        let formulas = workbook.worksheet_formula("Summary").expect("formulas");
        assert_eq!(
            formulas.get_value((2, 1)).map(String::as_str),
            Some("Analysis!G12")
        );
    }

    #[test]
    fn test_identical_requests_produce_identical_bytes() {
        assert_eq!(
            derive_workbook_bytes("CHN Analyzer", 3),
            derive_workbook_bytes("CHN Analyzer", 3)
        );
        assert_ne!(
            derive_workbook_bytes("CHN Analyzer", 3),
            derive_workbook_bytes("CHN Analyzer", 4)
        );
    }

    #[test]
    fn test_writes_after_close_are_rejected() {
        let plan = assemble("Viscometer", 1).expect("assemble");
        let mut writer = XlsxTemplateWriter::new(SpecTemplateWriteOptions::default());
        writer.write_workbook(&plan).expect("write");
        writer.close().expect("close");
        writer.close().expect("close is idempotent");

        assert!(writer.if_closed());
        assert!(matches!(
            writer.write_sheet(&plan.sheets[0]),
            Err(TemplateError::SerializationFailure(_))
        ));
    }

    #[test]
    fn test_report_counts_rules_and_renamed_sheets() {
        let plan = assemble("Carbonyl Titration", 2).expect("assemble");
        let mut writer = XlsxTemplateWriter::new(SpecTemplateWriteOptions::default());
        writer.write_workbook(&plan).expect("write");
        writer.write_sheet(&plan.sheets[1]).expect("write duplicate");

        let report = writer.report();
        assert_eq!(report.sheets.len(), 4);
        assert_eq!(report.sheets[3].sheet_name, "Summary_2");
        assert_eq!(report.warnings.len(), 1);
        // Two tiles, one RSD check each: blank guard plus pass/fail pair.
        assert_eq!(report.sheets[0].n_conditional_rules, 6);
        assert_eq!(report.sheets[0].n_rows, 15);
    }

    #[test]
    fn test_blank_guard_can_be_disabled() {
        let plan = assemble("Carbonyl Titration", 2).expect("assemble");
        let mut writer = XlsxTemplateWriter::new(SpecTemplateWriteOptions {
            if_guard_blank_checks: false,
            ..Default::default()
        });
        writer.write_sheet(&plan.sheets[0]).expect("write");
        assert_eq!(writer.report().sheets[0].n_conditional_rules, 4);
    }

    #[test]
    fn test_save_writes_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("Densimeter_data_template.xlsx");

        let plan = assemble("Densimeter", 2).expect("assemble");
        let mut writer = XlsxTemplateWriter::new(SpecTemplateWriteOptions::default());
        writer.write_workbook(&plan).expect("write");
        writer.save(&path).expect("save");

        let v_bytes = std::fs::read(&path).expect("read");
        assert_eq!(v_bytes, writer.save_to_buffer().expect("bytes"));
        assert!(v_bytes.starts_with(b"PK"));
    }

    #[test]
    fn test_overlapping_borders_are_merged() {
        let fmt_merged = derive_decoration_format(EnumBorderStyle::DashedRule)
            .merge(&derive_decoration_format(EnumBorderStyle::RightRule));
        assert_eq!(fmt_merged.bottom, Some(3));
        assert_eq!(fmt_merged.right, Some(1));
        assert!(matches!(derive_format_border(3), FormatBorder::Dashed));
        assert!(matches!(
            cast_row_idx(0),
            Err(TemplateError::SerializationFailure(_))
        ));
    }
}
