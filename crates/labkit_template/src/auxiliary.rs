//! Auxiliary sheet builder: summary roll-ups and fixed check sheets.
//!
//! Summary rows address the Analysis sheet only through [`SpecRowLayout`], so
//! a reference to "sample *i*, RSD row" always lands on the row the tiler
//! actually placed.

use tracing::debug;

use crate::conf::{
    C_SHEET_NAME_ANALYSIS, EnumFmtKey, N_ROW_AUX_BODY_START, derive_pattern_fmt_key,
};
use crate::decoration::{plan_acceptance_rules, plan_table_borders};
use crate::formula::resolve;
use crate::spec::{
    EnumAuxSheetKind, EnumCellValue, EnumRowRole, EnumSummarySource, SpecAutofitCellsPolicy,
    SpecAuxSheet, SpecCellRange, SpecCheckSheet, SpecInstrument, SpecRowLayout, SpecSheetPlan,
    SpecSummaryColumn, TemplateError,
};
use crate::util::{derive_cell_ref, derive_column_widths, derive_sheet_ref_prefix};

const N_ROW_AUX_HEADER: usize = 1;

fn write_header_row(sheet: &mut SpecSheetPlan, columns: &[String]) {
    for (col, header) in columns.iter().enumerate() {
        sheet.set_cell(
            N_ROW_AUX_HEADER,
            col,
            EnumCellValue::String(header.clone()),
            EnumFmtKey::Header,
        );
    }
}

fn finish_sheet(sheet: &mut SpecSheetPlan) {
    sheet.row_freeze = N_ROW_AUX_HEADER;
    sheet.widths = derive_column_widths(sheet, &SpecAutofitCellsPolicy::default());
}

/// Absolute Analysis row for `role` of sample `sample_index`.
fn lookup_analysis_row(
    layout: &SpecRowLayout,
    sample_index: usize,
    role: &EnumRowRole,
) -> Result<usize, TemplateError> {
    layout
        .lookup(sample_index, role)
        .ok_or_else(|| TemplateError::MissingRowRole {
            role: role.to_string(),
            sample_index,
        })
}

fn build_summary(
    name: &str,
    l_columns: &[SpecSummaryColumn],
    instrument: &SpecInstrument,
    layout: &SpecRowLayout,
) -> Result<SpecSheetPlan, TemplateError> {
    let mut sheet = SpecSheetPlan::new(name);
    let l_headers = l_columns
        .iter()
        .map(|column| column.header.clone())
        .collect::<Vec<_>>();
    write_header_row(&mut sheet, &l_headers);

    let c_prefix = derive_sheet_ref_prefix(C_SHEET_NAME_ANALYSIS);
    let col_label = instrument.block_template.col_label;
    for sample_index in 1..=layout.n_samples() {
        let row = N_ROW_AUX_HEADER + sample_index;
        for (col, column) in l_columns.iter().enumerate() {
            let (row_ref, col_ref, fmt_key) = match &column.source {
                EnumSummarySource::SampleLabel => (
                    lookup_analysis_row(layout, sample_index, &EnumRowRole::Sample(1))?,
                    col_label,
                    EnumFmtKey::Text,
                ),
                EnumSummarySource::AnalysisCell { role, col } => (
                    lookup_analysis_row(layout, sample_index, role)?,
                    *col,
                    EnumFmtKey::Decimal,
                ),
            };
            let c_formula = format!("={c_prefix}{}", derive_cell_ref(row_ref, col_ref));
            sheet.set_cell(row, col, EnumCellValue::Formula(c_formula), fmt_key);
        }
    }

    let row_last = N_ROW_AUX_HEADER + layout.n_samples();
    sheet
        .regions
        .extend(plan_table_borders(N_ROW_AUX_HEADER, row_last, l_columns.len()));
    if row_last > N_ROW_AUX_HEADER {
        for (col, column) in l_columns.iter().enumerate() {
            let Some(acceptance) = &column.range else {
                continue;
            };
            let range = SpecCellRange {
                row_first: N_ROW_AUX_HEADER + 1,
                col_first: col,
                row_last,
                col_last: col,
            };
            sheet.regions.extend(plan_acceptance_rules(range, acceptance));
        }
    }

    finish_sheet(&mut sheet);
    Ok(sheet)
}

fn build_check(name: &str, check_sheet: &SpecCheckSheet) -> Result<SpecSheetPlan, TemplateError> {
    let mut sheet = SpecSheetPlan::new(name);
    write_header_row(&mut sheet, &check_sheet.columns);
    sheet.regions = plan_table_borders(
        N_ROW_AUX_HEADER,
        N_ROW_AUX_HEADER + check_sheet.rows.len(),
        check_sheet.columns.len(),
    );

    for (n_idx_row, row_check) in check_sheet.rows.iter().enumerate() {
        let row = N_ROW_AUX_BODY_START + n_idx_row;
        for (col, pattern) in row_check.cells.iter().enumerate() {
            sheet.set_cell(
                row,
                col,
                resolve(pattern, N_ROW_AUX_BODY_START)?,
                derive_pattern_fmt_key(pattern),
            );
        }
        for check in &row_check.checks {
            sheet.regions.extend(plan_acceptance_rules(
                SpecCellRange::cell(row, check.col),
                &check.range,
            ));
        }
    }

    finish_sheet(&mut sheet);
    Ok(sheet)
}

/// Build one auxiliary sheet against the Analysis row layout.
pub fn build(
    aux: &SpecAuxSheet,
    instrument: &SpecInstrument,
    layout: &SpecRowLayout,
) -> Result<SpecSheetPlan, TemplateError> {
    let sheet = match &aux.kind {
        EnumAuxSheetKind::Summary(l_columns) => {
            build_summary(&aux.name, l_columns, instrument, layout)?
        }
        EnumAuxSheetKind::Check(check_sheet) => build_check(&aux.name, check_sheet)?,
    };
    debug!(
        sheet = %sheet.name,
        n_cells = sheet.cells.len(),
        n_regions = sheet.regions.len(),
        "auxiliary sheet planned"
    );
    Ok(sheet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::registry;
    use crate::spec::{EnumConditionalRule, EnumDecorationKind};
    use crate::tiler::expand;

    fn derive_layout(instrument: &SpecInstrument, sample_count: usize) -> SpecRowLayout {
        SpecRowLayout::from_tiles(&expand(&instrument.block_template, sample_count).expect("expand"))
    }

    fn derive_aux<'a>(instrument: &'a SpecInstrument, name: &str) -> &'a SpecAuxSheet {
        instrument
            .aux_sheets
            .iter()
            .find(|aux| aux.name == name)
            .expect("aux sheet")
    }

    #[test]
    fn test_acids_summary_references_tiled_average_rows() {
        let instrument = registry()
            .expect("registry")
            .lookup("Acids Titration")
            .expect("instrument");
        let layout = derive_layout(instrument, 2);
        let sheet = build(derive_aux(instrument, "Summary"), instrument, &layout).expect("build");

        assert_eq!(sheet.text(1, 1), Some("Carboxylic Acids (mmol/g)"));
        assert_eq!(sheet.text(2, 0), Some("=Analysis!A2"));
        assert_eq!(sheet.text(2, 1), Some("=Analysis!G4"));
        assert_eq!(sheet.text(3, 0), Some("=Analysis!A10"));
        assert_eq!(sheet.text(3, 1), Some("=Analysis!G12"));
        assert_eq!(sheet.text(3, 4), Some("=Analysis!H14"));
        assert_eq!(sheet.value(4, 0), None);
        assert_eq!(sheet.row_freeze, 1);
    }

    #[test]
    fn test_summary_checks_cover_every_sample_row() {
        let instrument = registry()
            .expect("registry")
            .lookup("Carbonyl Titration")
            .expect("instrument");
        let layout = derive_layout(instrument, 5);
        let sheet = build(derive_aux(instrument, "Summary"), instrument, &layout).expect("build");

        let l_ranges = sheet
            .regions
            .iter()
            .filter_map(|region| match region.kind {
                EnumDecorationKind::Conditional { rule, .. } => Some((region.range, rule)),
                EnumDecorationKind::Border(_) => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(l_ranges.len(), 2);
        assert_eq!(
            l_ranges[0],
            (
                SpecCellRange {
                    row_first: 2,
                    col_first: 2,
                    row_last: 6,
                    col_last: 2
                },
                EnumConditionalRule::Between { low: 0.0, high: 5.0 }
            )
        );
        assert!(matches!(
            l_ranges[1].1,
            EnumConditionalRule::NotBetween { low, high } if low == 0.0 && high == 5.0
        ));
    }

    #[test]
    fn test_validation_sheet_resolves_body_from_row_two() {
        let instrument = registry()
            .expect("registry")
            .lookup("Acids Titration")
            .expect("instrument");
        let layout = derive_layout(instrument, 7);
        let sheet = build(derive_aux(instrument, "Validation"), instrument, &layout).expect("build");

        assert_eq!(sheet.text(2, 0), Some("Vanillic Acid (carboxylic)"));
        assert_eq!(sheet.value(2, 1), Some(&EnumCellValue::Number(5.947)));
        assert_eq!(sheet.text(2, 5), Some("=Analysis!$F$2"));
        assert_eq!(sheet.text(3, 5), Some("=Analysis!$F$2"));
        assert_eq!(sheet.text(3, 6), Some("=(D3-E3)*F3/C3"));
        assert_eq!(sheet.text(3, 7), Some("=G3/B3*100"));
    }

    #[test]
    fn test_check_sheet_is_independent_of_sample_count() {
        let instrument = registry()
            .expect("registry")
            .lookup("CHN Analyzer")
            .expect("instrument");
        let aux = derive_aux(instrument, "Standard Check");
        let sheet_one = build(aux, instrument, &derive_layout(instrument, 1)).expect("build");
        let sheet_many = build(aux, instrument, &derive_layout(instrument, 30)).expect("build");

        assert_eq!(sheet_one, sheet_many);
        assert_eq!(sheet_one.text(6, 2), Some("=AVERAGE(C3:C5)"));
    }

    #[test]
    fn test_missing_role_is_reported() {
        let instrument = registry()
            .expect("registry")
            .lookup("Carbonyl Titration")
            .expect("instrument");
        let aux = SpecAuxSheet {
            name: "Broken".to_string(),
            kind: EnumAuxSheetKind::Summary(vec![SpecSummaryColumn {
                header: "RPD (%)".to_string(),
                source: EnumSummarySource::AnalysisCell {
                    role: EnumRowRole::Rpd,
                    col: 5,
                },
                range: None,
            }]),
        };
        assert_eq!(
            build(&aux, instrument, &derive_layout(instrument, 2)).err(),
            Some(TemplateError::MissingRowRole {
                role: "rpd_row".to_string(),
                sample_index: 1
            })
        );
    }
}
