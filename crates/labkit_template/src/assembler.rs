//! Workbook assembler: registry lookup, tiling, decoration and aux sheets in one pass.

use tracing::info;

use crate::auxiliary;
use crate::conf::{C_SHEET_NAME_ANALYSIS, EnumFmtKey, derive_pattern_fmt_key};
use crate::decoration;
use crate::registry::registry;
use crate::spec::{
    EnumRowRole, SpecAutofitCellsPolicy, SpecInstrument, SpecRowLayout, SpecSheetPlan,
    SpecTemplateWriteOptions, SpecTileRows, SpecWorkbookPlan, TemplateError,
};
use crate::tiler;
use crate::util::{derive_column_widths, validate_sample_count};
use crate::writer::XlsxTemplateWriter;

fn plan_analysis_sheet(
    instrument: &SpecInstrument,
    l_tile_rows: &[SpecTileRows],
) -> SpecSheetPlan {
    let template = &instrument.block_template;
    let mut sheet = SpecSheetPlan::new(C_SHEET_NAME_ANALYSIS);

    for tile_rows in l_tile_rows {
        for row in &tile_rows.rows {
            let n_idx_row = row.row - tile_rows.tile.row_start;
            let if_header = row.role == Some(EnumRowRole::Header);
            for (col, value) in row.cells.iter().enumerate() {
                let fmt_key = if if_header {
                    EnumFmtKey::Header
                } else {
                    template
                        .rows
                        .get(n_idx_row)
                        .and_then(|l_cells| l_cells.get(col))
                        .map_or(EnumFmtKey::Text, derive_pattern_fmt_key)
                };
                sheet.set_cell(row.row, col, value.clone(), fmt_key);
            }
        }
        for row in &tile_rows.rows_separator {
            for (col, value) in row.cells.iter().enumerate() {
                sheet.set_cell(row.row, col, value.clone(), EnumFmtKey::Text);
            }
        }
        sheet
            .regions
            .extend(decoration::plan(template, &tile_rows.tile));
    }

    sheet.row_freeze = 1;
    sheet.widths = derive_column_widths(&sheet, &SpecAutofitCellsPolicy::default());
    sheet
}

/// Plan the complete workbook for an already-resolved instrument.
pub fn assemble_with(
    instrument: &SpecInstrument,
    sample_count: usize,
) -> Result<SpecWorkbookPlan, TemplateError> {
    let l_tile_rows = tiler::expand(&instrument.block_template, sample_count)?;
    let layout = SpecRowLayout::from_tiles(&l_tile_rows);

    let mut sheets = vec![plan_analysis_sheet(instrument, &l_tile_rows)];
    for aux in &instrument.aux_sheets {
        sheets.push(auxiliary::build(aux, instrument, &layout)?);
    }

    info!(
        instrument = %instrument.name,
        sample_count,
        n_sheets = sheets.len(),
        row_last = layout.row_last(),
        "template plan assembled"
    );
    Ok(SpecWorkbookPlan {
        instrument: instrument.name.clone(),
        sample_count,
        sheets,
        layout,
    })
}

/// Plan the workbook for `instrument_name` with `sample_count` samples.
///
/// Fails with `UnknownInstrument` before the sample count is looked at.
pub fn assemble(
    instrument_name: &str,
    sample_count: i64,
) -> Result<SpecWorkbookPlan, TemplateError> {
    let instrument = registry()?.lookup(instrument_name)?;
    let n_samples = validate_sample_count(sample_count)?;
    assemble_with(instrument, n_samples)
}

/// Plan and serialize a template with default write options.
pub fn generate_template_bytes(
    instrument_name: &str,
    sample_count: i64,
) -> Result<Vec<u8>, TemplateError> {
    let plan = assemble(instrument_name, sample_count)?;
    let mut writer = XlsxTemplateWriter::new(SpecTemplateWriteOptions::default());
    writer.write_workbook(&plan)?;
    writer.save_to_buffer()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::EnumCellValue;

    #[test]
    fn test_unknown_instrument_fails_before_sample_count() {
        assert_eq!(
            assemble("Nonexistent Instrument", 3).err(),
            Some(TemplateError::UnknownInstrument {
                name: "Nonexistent Instrument".to_string()
            })
        );
        assert!(matches!(
            assemble("Nonexistent Instrument", 0),
            Err(TemplateError::UnknownInstrument { .. })
        ));
        assert!(generate_template_bytes("Nonexistent Instrument", 3).is_err());
    }

    #[test]
    fn test_sample_count_below_one_is_rejected() {
        for n_count in [0, -2] {
            assert!(matches!(
                assemble("Densimeter", n_count),
                Err(TemplateError::InvalidSampleCount { .. })
            ));
        }
    }

    #[test]
    fn test_analysis_header_matches_declared_columns() {
        let registry = registry().expect("registry");
        for instrument in registry.instruments() {
            let plan = assemble(&instrument.name, 2).expect("assemble");
            let sheet = &plan.sheets[0];
            assert_eq!(sheet.name, "Analysis");

            let l_header = (0..instrument.columns.len())
                .map(|col| sheet.text(1, col).unwrap_or_default().to_string())
                .collect::<Vec<_>>();
            assert_eq!(l_header, instrument.columns, "{}", instrument.name);
            assert_eq!(sheet.value(1, instrument.columns.len()), None);
        }
    }

    #[test]
    fn test_acids_summary_points_at_average_rows() {
        let plan = assemble("Acids Titration", 2).expect("assemble");
        let summary = plan.sheet("Summary").expect("summary");
        let analysis = plan.sheet("Analysis").expect("analysis");

        assert_eq!(summary.text(2, 1), Some("=Analysis!G4"));
        assert_eq!(summary.text(3, 1), Some("=Analysis!G12"));
        assert_eq!(analysis.text(4, 0), Some("Average"));
        assert_eq!(analysis.text(12, 0), Some("Average"));
        assert_eq!(analysis.text(12, 6), Some("=AVERAGE(G10:G11)"));
    }

    #[test]
    fn test_single_sample_has_no_second_sample_anywhere() {
        let registry = registry().expect("registry");
        for instrument in registry.instruments() {
            let plan = assemble(&instrument.name, 1).expect("assemble");
            assert!(plan.layout.rows_separator.is_empty());
            assert_eq!(plan.layout.row_last(), instrument.block_template.row_count());
            for sheet in &plan.sheets {
                for cell in sheet.cells.values() {
                    if let EnumCellValue::String(val) = &cell.value {
                        assert_ne!(val, "Sample 2", "{}/{}", instrument.name, sheet.name);
                    }
                }
            }
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        assert_eq!(
            assemble("Karl Fischer Titrator", 4),
            assemble("Karl Fischer Titrator", 4)
        );
        assert_eq!(
            generate_template_bytes("Karl Fischer Titrator", 4).expect("bytes"),
            generate_template_bytes("Karl Fischer Titrator", 4).expect("bytes")
        );
    }

    #[test]
    fn test_sheet_order_follows_instrument_declaration() {
        let plan = assemble("CHN Analyzer", 3).expect("assemble");
        let l_names = plan
            .sheets
            .iter()
            .map(|sheet| sheet.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(l_names, vec!["Analysis", "Standard Check", "Summary"]);
        assert_eq!(plan.sample_count, 3);
        assert_eq!(plan.layout.n_samples(), 3);
    }
}
