//! Row tiler: stamps one block template per sample down the Analysis sheet.

use std::collections::BTreeMap;

use tracing::debug;

use crate::conf::N_NROWS_EXCEL_MAX;
use crate::formula::resolve;
use crate::spec::{
    EnumCellPattern, EnumCellValue, SpecBlockTemplate, SpecRealizedRow, SpecTile, SpecTileRows,
    TemplateError,
};

/// First Excel row of tile `sample_index` (1-based).
pub fn derive_tile_start(template: &SpecBlockTemplate, sample_index: usize) -> Option<usize> {
    sample_index
        .checked_sub(1)?
        .checked_mul(template.row_stride())?
        .checked_add(1)
}

/// Last Excel row occupied by `sample_count` tiles.
pub fn derive_row_last(template: &SpecBlockTemplate, sample_count: usize) -> Option<usize> {
    derive_tile_start(template, sample_count)?.checked_add(template.row_count().checked_sub(1)?)
}

fn plan_rows(
    l_patterns: &[Vec<EnumCellPattern>],
    template: &SpecBlockTemplate,
    row_first: usize,
    row_start: usize,
    if_named: bool,
) -> Result<Vec<SpecRealizedRow>, TemplateError> {
    l_patterns
        .iter()
        .enumerate()
        .map(|(n_idx_row, l_cells)| {
            let cells = l_cells
                .iter()
                .map(|pattern| resolve(pattern, row_start))
                .collect::<Result<Vec<_>, _>>()?;
            let role = if if_named {
                template.role_of(n_idx_row).cloned()
            } else {
                None
            };
            Ok(SpecRealizedRow {
                row: row_first + n_idx_row,
                role,
                cells,
            })
        })
        .collect()
}

/// Expand `template` into `sample_count` non-overlapping tiles.
///
/// Tile *k* starts at `1 + (k - 1) * (row_count + separator rows)`; separator
/// rows follow every tile except the last. Replicate rows receive a
/// `Sample {k}` label in the template's label column.
pub fn expand(
    template: &SpecBlockTemplate,
    sample_count: usize,
) -> Result<Vec<SpecTileRows>, TemplateError> {
    if sample_count < 1 {
        return Err(TemplateError::InvalidSampleCount {
            value: sample_count.to_string(),
            reason: "must be >= 1".to_string(),
        });
    }
    let n_row_last = derive_row_last(template, sample_count)
        .filter(|row| *row <= N_NROWS_EXCEL_MAX)
        .ok_or_else(|| TemplateError::InvalidSampleCount {
            value: sample_count.to_string(),
            reason: format!("Analysis sheet would exceed {N_NROWS_EXCEL_MAX} rows"),
        })?;

    let mut l_tile_rows = Vec::with_capacity(sample_count);
    for sample_index in 1..=sample_count {
        // Bounded by n_row_last above.
        let row_start = 1 + (sample_index - 1) * template.row_stride();
        let row_end = row_start + template.row_count() - 1;

        let mut rows = plan_rows(&template.rows, template, row_start, row_start, true)?;
        for row in rows.iter_mut() {
            if !row.role.as_ref().is_some_and(|role| role.is_sample()) {
                continue;
            }
            if let Some(cell) = row.cells.get_mut(template.col_label)
                && matches!(cell, EnumCellValue::None)
            {
                *cell = EnumCellValue::String(format!("Sample {sample_index}"));
            }
        }

        let rows_separator = if sample_index < sample_count {
            plan_rows(
                &template.rows_separator,
                template,
                row_end + 1,
                row_start,
                false,
            )?
        } else {
            vec![]
        };

        let rows_named = template
            .named_rows
            .iter()
            .map(|(role, n_idx)| (role.clone(), row_start + n_idx))
            .collect::<BTreeMap<_, _>>();

        debug!(sample_index, row_start, row_end, "tile planned");
        l_tile_rows.push(SpecTileRows {
            tile: SpecTile {
                sample_index,
                row_start,
                row_end,
                rows_named,
            },
            rows,
            rows_separator,
        });
    }
    debug!(sample_count, row_last = n_row_last, "analysis rows tiled");

    Ok(l_tile_rows)
}
