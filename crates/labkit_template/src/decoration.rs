//! Decoration planner: borders and pass/fail highlighting per tile.
//!
//! Regions are a pure function of the tile placement and the template's named
//! rows; nothing is stored between tiles.

use std::collections::BTreeSet;

use crate::spec::{
    EnumBorderStyle, EnumConditionalRule, EnumDecorationKind, EnumHighlight, EnumRowRole,
    SpecAcceptanceRange, SpecBlockTemplate, SpecCellRange, SpecDecorationRegion, SpecTile,
};

fn derive_border_region(range: SpecCellRange, style: EnumBorderStyle) -> SpecDecorationRegion {
    SpecDecorationRegion {
        range,
        kind: EnumDecorationKind::Border(style),
    }
}

/// Complementary pass/fail pair on `range`: `between` highlights pass, `not between` fail.
pub fn plan_acceptance_rules(
    range: SpecCellRange,
    acceptance: &SpecAcceptanceRange,
) -> [SpecDecorationRegion; 2] {
    let SpecAcceptanceRange { low, high } = *acceptance;
    [
        SpecDecorationRegion {
            range,
            kind: EnumDecorationKind::Conditional {
                rule: EnumConditionalRule::Between { low, high },
                highlight: EnumHighlight::Pass,
            },
        },
        SpecDecorationRegion {
            range,
            kind: EnumDecorationKind::Conditional {
                rule: EnumConditionalRule::NotBetween { low, high },
                highlight: EnumHighlight::Fail,
            },
        },
    ]
}

/// Header box, bottom rule and closing right rule for a plain table.
pub fn plan_table_borders(
    row_header: usize,
    row_last: usize,
    n_cols: usize,
) -> Vec<SpecDecorationRegion> {
    let Some(col_last) = n_cols.checked_sub(1) else {
        return vec![];
    };
    let mut l_regions = vec![derive_border_region(
        SpecCellRange::row_span(row_header, 0, col_last),
        EnumBorderStyle::HeaderBox,
    )];
    if row_last > row_header {
        l_regions.push(derive_border_region(
            SpecCellRange {
                row_first: row_header + 1,
                col_first: col_last,
                row_last,
                col_last,
            },
            EnumBorderStyle::RightRule,
        ));
        l_regions.push(derive_border_region(
            SpecCellRange::row_span(row_last, 0, col_last),
            EnumBorderStyle::BottomRule,
        ));
        l_regions.push(derive_border_region(
            SpecCellRange::cell(row_last, col_last),
            EnumBorderStyle::CornerRule,
        ));
    }
    l_regions
}

/// Plan every border and conditional rule of one tile.
pub fn plan(template: &SpecBlockTemplate, tile: &SpecTile) -> Vec<SpecDecorationRegion> {
    let Some(col_last) = template.width().checked_sub(1) else {
        return vec![];
    };
    let mut l_regions = Vec::new();

    let row_header = tile.row_of(&EnumRowRole::Header);
    if let Some(row) = row_header {
        l_regions.push(derive_border_region(
            SpecCellRange::row_span(row, 0, col_last),
            EnumBorderStyle::HeaderBox,
        ));
    }

    if let Some(n_idx) = template.row_sample_last() {
        let row_boundary = tile.row_start + n_idx;
        if row_boundary < tile.row_end {
            l_regions.push(derive_border_region(
                SpecCellRange::row_span(row_boundary, 0, col_last),
                EnumBorderStyle::DashedRule,
            ));
        }
    }

    // Vertical rules bracket the statistic columns, body rows only.
    let row_body_first = row_header.map_or(tile.row_start, |row| row + 1);
    let mut set_cols_rule = BTreeSet::new();
    if let Some(col_before) = template
        .cols_statistic
        .iter()
        .min()
        .and_then(|col| col.checked_sub(1))
    {
        set_cols_rule.insert(col_before);
    }
    if let Some(col_stat_last) = template.cols_statistic.iter().max() {
        set_cols_rule.insert(*col_stat_last);
    }
    set_cols_rule.insert(col_last);
    if row_body_first <= tile.row_end {
        for col in set_cols_rule {
            l_regions.push(derive_border_region(
                SpecCellRange {
                    row_first: row_body_first,
                    col_first: col,
                    row_last: tile.row_end,
                    col_last: col,
                },
                EnumBorderStyle::RightRule,
            ));
        }
    }

    l_regions.push(derive_border_region(
        SpecCellRange::row_span(tile.row_end, 0, col_last),
        EnumBorderStyle::BottomRule,
    ));
    l_regions.push(derive_border_region(
        SpecCellRange::cell(tile.row_end, col_last),
        EnumBorderStyle::CornerRule,
    ));

    for check in &template.checks {
        for role in &check.roles {
            let Some(row) = tile.row_of(role) else {
                continue;
            };
            for col in &check.cols {
                l_regions.extend(plan_acceptance_rules(
                    SpecCellRange::cell(row, *col),
                    &check.range,
                ));
            }
        }
    }

    l_regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::registry;
    use crate::tiler::expand;

    fn derive_rule_pairs(
        l_regions: &[SpecDecorationRegion],
    ) -> (Vec<(SpecCellRange, f64, f64)>, Vec<(SpecCellRange, f64, f64)>) {
        let mut l_pass = vec![];
        let mut l_fail = vec![];
        for region in l_regions {
            match region.kind {
                EnumDecorationKind::Conditional {
                    rule: EnumConditionalRule::Between { low, high },
                    highlight,
                } => {
                    assert_eq!(highlight, EnumHighlight::Pass);
                    l_pass.push((region.range, low, high));
                }
                EnumDecorationKind::Conditional {
                    rule: EnumConditionalRule::NotBetween { low, high },
                    highlight,
                } => {
                    assert_eq!(highlight, EnumHighlight::Fail);
                    l_fail.push((region.range, low, high));
                }
                EnumDecorationKind::Border(_) => {}
            }
        }
        (l_pass, l_fail)
    }

    #[test]
    fn test_pass_and_fail_rules_are_complementary() {
        let registry = registry().expect("registry");
        for instrument in registry.instruments() {
            let template = &instrument.block_template;
            for tile_rows in expand(template, 4).expect("expand") {
                let l_regions = plan(template, &tile_rows.tile);
                let (l_pass, l_fail) = derive_rule_pairs(&l_regions);
                assert_eq!(l_pass, l_fail, "{}", instrument.name);
                assert!(!l_pass.is_empty(), "{} has no checks", instrument.name);
            }
        }
    }

    #[test]
    fn test_regions_stay_inside_their_tile() {
        let registry = registry().expect("registry");
        for instrument in registry.instruments() {
            let template = &instrument.block_template;
            for tile_rows in expand(template, 3).expect("expand") {
                for region in plan(template, &tile_rows.tile) {
                    assert!(tile_rows.tile.contains_row(region.range.row_first));
                    assert!(tile_rows.tile.contains_row(region.range.row_last));
                    assert!(region.range.col_last < template.width());
                }
            }
        }
    }

    #[test]
    fn test_acids_tile_borders_are_anchored_to_tile_start() {
        let registry = registry().expect("registry");
        let template = &registry
            .lookup("Acids Titration")
            .expect("instrument")
            .block_template;
        let l_tile_rows = expand(template, 2).expect("expand");
        let l_regions = plan(template, &l_tile_rows[1].tile);

        let derive_rows = |style: EnumBorderStyle| {
            l_regions
                .iter()
                .filter(|region| region.kind == EnumDecorationKind::Border(style))
                .map(|region| (region.range.row_first, region.range.col_first))
                .collect::<Vec<_>>()
        };
        assert_eq!(derive_rows(EnumBorderStyle::HeaderBox), vec![(9, 0)]);
        assert_eq!(derive_rows(EnumBorderStyle::DashedRule), vec![(11, 0)]);
        assert_eq!(derive_rows(EnumBorderStyle::BottomRule), vec![(15, 0)]);
        assert_eq!(derive_rows(EnumBorderStyle::CornerRule), vec![(15, 7)]);
        assert_eq!(
            derive_rows(EnumBorderStyle::RightRule),
            vec![(10, 5), (10, 7)]
        );
    }

    #[test]
    fn test_table_borders_for_header_only_table() {
        let l_regions = plan_table_borders(1, 1, 3);
        assert_eq!(l_regions.len(), 1);
        assert_eq!(
            l_regions[0].kind,
            EnumDecorationKind::Border(EnumBorderStyle::HeaderBox)
        );
        assert!(plan_table_borders(1, 4, 0).is_empty());
    }
}
