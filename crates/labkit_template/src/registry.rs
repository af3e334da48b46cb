//! Instrument registry and the static instrument table.
//!
//! The registry is built and validated once, on first use, and is read-only
//! afterwards. Every offset used by a template is declared here, next to the
//! template it belongs to.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use crate::conf::{C_SHEET_NAME_ANALYSIS, N_NCOLS_EXCEL_MAX};
use crate::formula::derive_relative_offsets;
use crate::spec::{
    EnumAuxSheetKind, EnumCellPattern, EnumRowRole, EnumSummarySource, SpecAcceptanceCheck,
    SpecAcceptanceRange, SpecAuxSheet, SpecBlockTemplate, SpecCellCheck, SpecCheckRow,
    SpecCheckSheet, SpecInstrument, SpecSummaryColumn, TemplateError,
};
use crate::util::{derive_column_letters, derive_sheet_ref_prefix};

////////////////////////////////////////////////////////////////////////////////
// #region Registry

/// Read-only instrument table keyed by name.
#[derive(Debug, Clone)]
pub struct InstrumentRegistry {
    l_instruments: Vec<SpecInstrument>,
    dict_idx_by_name: BTreeMap<String, usize>,
}

static REGISTRY_DEFAULT: LazyLock<Result<InstrumentRegistry, TemplateError>> =
    LazyLock::new(|| InstrumentRegistry::new(derive_default_instruments()));

/// Process-wide default registry.
pub fn registry() -> Result<&'static InstrumentRegistry, TemplateError> {
    REGISTRY_DEFAULT.as_ref().map_err(Clone::clone)
}

impl InstrumentRegistry {
    /// Validate and index `instruments`, preserving their order.
    pub fn new(instruments: Vec<SpecInstrument>) -> Result<Self, TemplateError> {
        let mut dict_idx_by_name = BTreeMap::new();
        for (n_idx, instrument) in instruments.iter().enumerate() {
            validate_instrument(instrument)?;
            if dict_idx_by_name
                .insert(instrument.name.clone(), n_idx)
                .is_some()
            {
                return Err(TemplateError::DuplicateInstrument {
                    name: instrument.name.clone(),
                });
            }
        }

        Ok(Self {
            l_instruments: instruments,
            dict_idx_by_name,
        })
    }

    /// Instrument by exact name.
    pub fn lookup(&self, name: &str) -> Result<&SpecInstrument, TemplateError> {
        self.dict_idx_by_name
            .get(name)
            .map(|n_idx| &self.l_instruments[*n_idx])
            .ok_or_else(|| TemplateError::UnknownInstrument {
                name: name.to_string(),
            })
    }

    /// Instrument names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.l_instruments
            .iter()
            .map(|instrument| instrument.name.as_str())
            .collect()
    }

    /// All instruments in declaration order.
    pub fn instruments(&self) -> &[SpecInstrument] {
        &self.l_instruments
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Validation

fn derive_template_error(instrument: &SpecInstrument, reason: impl Into<String>) -> TemplateError {
    TemplateError::InvalidTemplate {
        instrument: instrument.name.clone(),
        reason: reason.into(),
    }
}

fn validate_range(
    instrument: &SpecInstrument,
    range: &SpecAcceptanceRange,
    context: &str,
) -> Result<(), TemplateError> {
    if !range.low.is_finite() || !range.high.is_finite() || range.low > range.high {
        return Err(derive_template_error(
            instrument,
            format!("{context}: acceptance range [{}, {}] is invalid", range.low, range.high),
        ));
    }
    Ok(())
}

fn validate_pattern_row(
    instrument: &SpecInstrument,
    cells: &[EnumCellPattern],
    n_width: usize,
    n_rows_reachable: usize,
    context: &str,
) -> Result<(), TemplateError> {
    if cells.len() != n_width {
        return Err(derive_template_error(
            instrument,
            format!("{context}: expected {n_width} cells, got {}", cells.len()),
        ));
    }
    for cell in cells {
        let EnumCellPattern::Formula(pattern) = cell else {
            continue;
        };
        for n_offset in derive_relative_offsets(pattern)? {
            if n_offset >= n_rows_reachable {
                return Err(derive_template_error(
                    instrument,
                    format!(
                        "{context}: {pattern:?} references offset {n_offset} outside {n_rows_reachable} rows"
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Check every layout invariant of one instrument declaration.
pub fn validate_instrument(instrument: &SpecInstrument) -> Result<(), TemplateError> {
    let template = &instrument.block_template;
    let n_width = instrument.columns.len();
    let n_row_count = template.row_count();

    if instrument.name.trim().is_empty() {
        return Err(derive_template_error(instrument, "instrument name is empty"));
    }
    if n_width == 0 || n_width > N_NCOLS_EXCEL_MAX {
        return Err(derive_template_error(
            instrument,
            format!("column count {n_width} outside 1..={N_NCOLS_EXCEL_MAX}"),
        ));
    }
    if n_row_count == 0 {
        return Err(derive_template_error(instrument, "block template has no rows"));
    }

    for (n_idx_row, cells) in template.rows.iter().enumerate() {
        validate_pattern_row(
            instrument,
            cells,
            n_width,
            n_row_count,
            &format!("template row {n_idx_row}"),
        )?;
    }
    for (n_idx_row, cells) in template.rows_separator.iter().enumerate() {
        if cells.len() != n_width || cells.iter().any(EnumCellPattern::is_formula) {
            return Err(derive_template_error(
                instrument,
                format!("separator row {n_idx_row} must be {n_width} literal cells"),
            ));
        }
    }

    let mut set_rows_named = BTreeSet::new();
    for (role, n_idx_row) in &template.named_rows {
        if *n_idx_row >= n_row_count || !set_rows_named.insert(*n_idx_row) {
            return Err(derive_template_error(
                instrument,
                format!("named row {role} -> {n_idx_row} is out of range or shared"),
            ));
        }
    }
    if template.row_sample_last().is_none() {
        return Err(derive_template_error(instrument, "no sample rows declared"));
    }
    if template.col_label >= n_width
        || template.cols_statistic.iter().any(|col| *col >= n_width)
    {
        return Err(derive_template_error(instrument, "label/statistic column out of range"));
    }

    for check in &template.checks {
        validate_range(instrument, &check.range, "tile check")?;
        if let Some(role) = check
            .roles
            .iter()
            .find(|role| !template.named_rows.contains_key(*role))
        {
            return Err(derive_template_error(
                instrument,
                format!("tile check references undeclared row {role}"),
            ));
        }
        if check.cols.iter().any(|col| *col >= n_width) {
            return Err(derive_template_error(instrument, "tile check column out of range"));
        }
    }

    let mut set_sheet_names = BTreeSet::from([C_SHEET_NAME_ANALYSIS.to_lowercase()]);
    for aux in &instrument.aux_sheets {
        if !set_sheet_names.insert(aux.name.to_lowercase()) {
            return Err(derive_template_error(
                instrument,
                format!("duplicate sheet name {:?}", aux.name),
            ));
        }
        validate_aux_sheet(instrument, aux)?;
    }

    Ok(())
}

fn validate_aux_sheet(
    instrument: &SpecInstrument,
    aux: &SpecAuxSheet,
) -> Result<(), TemplateError> {
    let template = &instrument.block_template;
    match &aux.kind {
        EnumAuxSheetKind::Summary(l_columns) => {
            if l_columns.is_empty() {
                return Err(derive_template_error(
                    instrument,
                    format!("summary sheet {:?} has no columns", aux.name),
                ));
            }
            for column in l_columns {
                if let Some(range) = &column.range {
                    validate_range(instrument, range, &aux.name)?;
                }
                if let EnumSummarySource::AnalysisCell { role, col } = &column.source
                    && (!template.named_rows.contains_key(role)
                        || *col >= instrument.columns.len())
                {
                    return Err(derive_template_error(
                        instrument,
                        format!(
                            "{}: column {:?} references missing {role}",
                            aux.name, column.header
                        ),
                    ));
                }
            }
        }
        EnumAuxSheetKind::Check(sheet) => {
            let n_width = sheet.columns.len();
            if n_width == 0 || sheet.rows.is_empty() {
                return Err(derive_template_error(
                    instrument,
                    format!("check sheet {:?} is empty", aux.name),
                ));
            }
            for (n_idx_row, row) in sheet.rows.iter().enumerate() {
                let c_context = format!("{} row {n_idx_row}", aux.name);
                validate_pattern_row(
                    instrument,
                    &row.cells,
                    n_width,
                    sheet.rows.len(),
                    &c_context,
                )?;
                for check in &row.checks {
                    validate_range(instrument, &check.range, &c_context)?;
                    if check.col >= n_width {
                        return Err(derive_template_error(
                            instrument,
                            format!("{c_context}: check column out of range"),
                        ));
                    }
                }
            }
        }
    }
    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region TemplateBuilder

fn rel(col: usize, n_offset: usize) -> String {
    format!("{}{{+{n_offset}}}", derive_column_letters(col))
}

fn fx(formula: impl Into<String>) -> EnumCellPattern {
    EnumCellPattern::Formula(formula.into())
}

fn txt(text: &str) -> EnumCellPattern {
    EnumCellPattern::Text(text.to_string())
}

fn label(text: &str) -> EnumCellPattern {
    EnumCellPattern::Label(text.to_string())
}

fn range(low: f64, high: f64) -> SpecAcceptanceRange {
    SpecAcceptanceRange { low, high }
}

fn derive_header_row(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|val| val.to_string()).collect()
}

/// Row-by-row builder for a block template; row 0 is the header copy.
struct BlockTemplateBuilder {
    n_width: usize,
    rows: Vec<Vec<EnumCellPattern>>,
    named_rows: BTreeMap<EnumRowRole, usize>,
}

impl BlockTemplateBuilder {
    fn new(columns: &[String]) -> Self {
        let mut builder = Self {
            n_width: columns.len(),
            rows: vec![],
            named_rows: BTreeMap::new(),
        };
        let l_cells = columns.iter().map(|val| txt(val)).collect::<Vec<_>>();
        builder.rows.push(l_cells);
        builder.named_rows.insert(EnumRowRole::Header, 0);
        builder
    }

    fn offset_of(&self, role: &EnumRowRole) -> usize {
        self.named_rows.get(role).copied().unwrap_or_default()
    }

    fn push_row(&mut self, role: EnumRowRole, cells: Vec<(usize, EnumCellPattern)>) -> usize {
        let n_offset = self.rows.len();
        let mut l_cells = vec![EnumCellPattern::Empty; self.n_width];
        for (col, cell) in cells {
            if let Some(slot) = l_cells.get_mut(col) {
                *slot = cell;
            }
        }
        self.rows.push(l_cells);
        self.named_rows.insert(role, n_offset);
        n_offset
    }

    /// Replicate rows; `cells_of(offset)` yields the per-row formulas.
    fn push_replicates(
        &mut self,
        n_replicates: usize,
        cells_of: impl Fn(usize) -> Vec<(usize, EnumCellPattern)>,
    ) {
        for n_idx in 1..=n_replicates {
            let n_offset = self.rows.len();
            self.push_row(EnumRowRole::Sample(n_idx), cells_of(n_offset));
        }
    }

    /// Average and standard deviation over `cols`, RSD over `cols_rsd`.
    fn push_statistics(&mut self, cols: &[usize], cols_rsd: &[usize]) {
        let n_first = self.offset_of(&EnumRowRole::Sample(1));
        let n_last = self
            .named_rows
            .iter()
            .filter(|(role, _)| role.is_sample())
            .map(|(_, n_idx)| *n_idx)
            .max()
            .unwrap_or(n_first);

        let n_avg = self.rows.len();
        let n_sd = n_avg + 1;
        let mut l_avg = vec![(0, label("Average"))];
        let mut l_sd = vec![(0, label("Std Dev"))];
        let mut l_rsd = vec![(0, label("RSD (%)"))];
        for col in cols {
            let c_span = format!("{}:{}", rel(*col, n_first), rel(*col, n_last));
            l_avg.push((*col, fx(format!("=AVERAGE({c_span})"))));
            l_sd.push((*col, fx(format!("=STDEV({c_span})"))));
        }
        for col in cols_rsd {
            l_rsd.push((*col, fx(format!("={}/{}*100", rel(*col, n_sd), rel(*col, n_avg)))));
        }
        self.push_row(EnumRowRole::Average, l_avg);
        self.push_row(EnumRowRole::StdDev, l_sd);
        self.push_row(EnumRowRole::Rsd, l_rsd);
    }

    /// Relative percent difference between the first two replicates.
    fn push_rpd(&mut self, cols: &[usize]) {
        let n_s1 = self.offset_of(&EnumRowRole::Sample(1));
        let n_s2 = self.offset_of(&EnumRowRole::Sample(2));
        let n_avg = self.offset_of(&EnumRowRole::Average);
        let mut l_cells = vec![(0, label("RPD (%)"))];
        for col in cols {
            l_cells.push((
                *col,
                fx(format!(
                    "=ABS({}-{})/{}*100",
                    rel(*col, n_s1),
                    rel(*col, n_s2),
                    rel(*col, n_avg)
                )),
            ));
        }
        self.push_row(EnumRowRole::Rpd, l_cells);
    }

    fn build(
        self,
        n_rows_separator: usize,
        cols_statistic: Vec<usize>,
        checks: Vec<SpecAcceptanceCheck>,
    ) -> SpecBlockTemplate {
        SpecBlockTemplate {
            rows: self.rows,
            named_rows: self.named_rows,
            rows_separator: vec![vec![EnumCellPattern::Empty; self.n_width]; n_rows_separator],
            col_label: 0,
            cols_statistic,
            checks,
        }
    }
}

fn derive_check_row(
    cells: Vec<EnumCellPattern>,
    checks: &[(usize, SpecAcceptanceRange)],
) -> SpecCheckRow {
    SpecCheckRow {
        cells,
        checks: checks
            .iter()
            .map(|(col, range)| SpecCellCheck {
                col: *col,
                range: *range,
            })
            .collect(),
    }
}

fn derive_check_sheet(name: &str, columns: &[&str], rows: Vec<SpecCheckRow>) -> SpecAuxSheet {
    SpecAuxSheet {
        name: name.to_string(),
        kind: EnumAuxSheetKind::Check(SpecCheckSheet {
            columns: derive_header_row(columns),
            rows,
        }),
    }
}

fn derive_summary_column(
    header: &str,
    role: EnumRowRole,
    col: usize,
    range: Option<SpecAcceptanceRange>,
) -> SpecSummaryColumn {
    SpecSummaryColumn {
        header: header.to_string(),
        source: EnumSummarySource::AnalysisCell { role, col },
        range,
    }
}

fn derive_summary_label_column() -> SpecSummaryColumn {
    SpecSummaryColumn {
        header: "Sample ID".to_string(),
        source: EnumSummarySource::SampleLabel,
        range: None,
    }
}

/// Fixed reference into the first replicate row of tile 1, present for every sample count.
fn derive_first_replicate_ref(template: &SpecBlockTemplate, col: usize) -> String {
    let n_row = 1 + template
        .named_rows
        .get(&EnumRowRole::Sample(1))
        .copied()
        .unwrap_or_default();
    format!(
        "={}${}${n_row}",
        derive_sheet_ref_prefix(C_SHEET_NAME_ANALYSIS),
        derive_column_letters(col)
    )
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region InstrumentTable

/// Instruments shipped with the generator, in display order.
pub fn derive_default_instruments() -> Vec<SpecInstrument> {
    vec![
        derive_densimeter(),
        derive_chn_analyzer(),
        derive_karl_fischer(),
        derive_viscometer(),
        derive_acids_titration(),
        derive_carbonyl_titration(),
    ]
}

fn derive_densimeter() -> SpecInstrument {
    let columns = derive_header_row(&["Sample ID", "Density (g/mL)", "Temperature °C"]);
    let mut builder = BlockTemplateBuilder::new(&columns);
    builder.push_replicates(3, |_| vec![]);
    builder.push_statistics(&[1, 2], &[1]);
    let block_template = builder.build(
        1,
        vec![1, 2],
        vec![SpecAcceptanceCheck {
            roles: vec![EnumRowRole::Rsd],
            cols: vec![1],
            range: range(0.0, 0.1),
        }],
    );

    let rng_water = range(0.9981, 0.9983);
    let aux_standard = derive_check_sheet(
        "Standard Check",
        &[
            "Check",
            "Reference Density (g/mL)",
            "Measured Density (g/mL)",
            "Deviation (g/mL)",
            "Temperature °C",
        ],
        [("Water (Start)", 0), ("Water (End)", 1)]
            .into_iter()
            .map(|(c_name, n_offset)| {
                derive_check_row(
                    vec![
                        txt(c_name),
                        EnumCellPattern::Number(0.99820),
                        EnumCellPattern::Empty,
                        fx(format!("={}-{}", rel(2, n_offset), rel(1, n_offset))),
                        EnumCellPattern::Empty,
                    ],
                    &[(2, rng_water)],
                )
            })
            .collect(),
    );

    SpecInstrument {
        name: "Densimeter".to_string(),
        columns,
        block_template,
        aux_sheets: vec![aux_standard],
    }
}

fn derive_chn_analyzer() -> SpecInstrument {
    let columns = derive_header_row(&[
        "Sample ID",
        "Mass (mg)",
        "Carbon (%)",
        "Hydrogen (%)",
        "Nitrogen (%)",
    ]);
    let cols_element = [2, 3, 4];
    let mut builder = BlockTemplateBuilder::new(&columns);
    builder.push_replicates(3, |_| vec![]);
    builder.push_statistics(&cols_element, &cols_element);

    let role_moisture = EnumRowRole::Custom("moisture".to_string());
    let role_ash = EnumRowRole::Custom("ash".to_string());
    let n_avg = builder.offset_of(&EnumRowRole::Average);
    let n_moisture = builder.push_row(role_moisture, vec![(0, label("Moisture (%)"))]);
    let n_ash = builder.push_row(role_ash, vec![(0, label("Ash (%)"))]);
    let mut l_daf = vec![(0, label("Dry Ash-Free (%)"))];
    for col in cols_element {
        l_daf.push((
            col,
            fx(format!(
                "={}*100/(100-${}-${})",
                rel(col, n_avg),
                rel(1, n_moisture),
                rel(1, n_ash)
            )),
        ));
    }
    builder.push_row(EnumRowRole::Custom("dry_ash_free".to_string()), l_daf);

    let block_template = builder.build(
        1,
        cols_element.to_vec(),
        vec![SpecAcceptanceCheck {
            roles: vec![EnumRowRole::Rsd],
            cols: cols_element.to_vec(),
            range: range(0.0, 1.0),
        }],
    );

    let l_checks_acetanilide = [
        (2, range(70.79, 71.39)),
        (3, range(6.41, 7.01)),
        (4, range(10.06, 10.66)),
    ];
    let mut l_rows_standard = vec![derive_check_row(
        vec![
            txt("Acetanilide (Reference)"),
            EnumCellPattern::Empty,
            EnumCellPattern::Number(71.09),
            EnumCellPattern::Number(6.71),
            EnumCellPattern::Number(10.36),
        ],
        &[],
    )];
    for n_idx in 1..=3 {
        l_rows_standard.push(derive_check_row(
            vec![
                EnumCellPattern::Text(format!("Acetanilide Check {n_idx}")),
                EnumCellPattern::Empty,
                EnumCellPattern::Empty,
                EnumCellPattern::Empty,
                EnumCellPattern::Empty,
            ],
            &l_checks_acetanilide,
        ));
    }
    let mut l_cells_average = vec![label("Average"), EnumCellPattern::Empty];
    for col in cols_element {
        l_cells_average.push(fx(format!("=AVERAGE({}:{})", rel(col, 1), rel(col, 3))));
    }
    l_rows_standard.push(derive_check_row(l_cells_average, &l_checks_acetanilide));

    let aux_standard = derive_check_sheet(
        "Standard Check",
        &["Standard", "Mass (mg)", "Carbon (%)", "Hydrogen (%)", "Nitrogen (%)"],
        l_rows_standard,
    );
    let aux_summary = SpecAuxSheet {
        name: "Summary".to_string(),
        kind: EnumAuxSheetKind::Summary(vec![
            derive_summary_label_column(),
            derive_summary_column("Carbon (%)", EnumRowRole::Average, 2, None),
            derive_summary_column("Hydrogen (%)", EnumRowRole::Average, 3, None),
            derive_summary_column("Nitrogen (%)", EnumRowRole::Average, 4, None),
            derive_summary_column(
                "Carbon, Dry Ash-Free (%)",
                EnumRowRole::Custom("dry_ash_free".to_string()),
                2,
                None,
            ),
        ]),
    };

    SpecInstrument {
        name: "CHN Analyzer".to_string(),
        columns,
        block_template,
        aux_sheets: vec![aux_standard, aux_summary],
    }
}

fn derive_karl_fischer() -> SpecInstrument {
    let columns = derive_header_row(&[
        "Sample ID",
        "Sample Mass (g)",
        "Water (µg)",
        "Water (ppm)",
        "Water (%)",
    ]);
    let mut builder = BlockTemplateBuilder::new(&columns);
    builder.push_replicates(3, |n_offset| {
        vec![
            (3, fx(format!("={}/{}", rel(2, n_offset), rel(1, n_offset)))),
            (4, fx(format!("={}/10000", rel(3, n_offset)))),
        ]
    });
    builder.push_statistics(&[3, 4], &[3]);
    let block_template = builder.build(
        1,
        vec![3, 4],
        vec![SpecAcceptanceCheck {
            roles: vec![EnumRowRole::Rsd],
            cols: vec![3],
            range: range(0.0, 5.0),
        }],
    );

    let aux_standard = derive_check_sheet(
        "Standard Check",
        &[
            "Standard",
            "Certified (mg/g)",
            "Mass (g)",
            "Water (µg)",
            "Measured (mg/g)",
            "Recovery (%)",
        ],
        (0..3)
            .map(|n_offset| {
                derive_check_row(
                    vec![
                        EnumCellPattern::Text(format!("Water Standard 1.0 #{}", n_offset + 1)),
                        EnumCellPattern::Number(1.0),
                        EnumCellPattern::Empty,
                        EnumCellPattern::Empty,
                        fx(format!("={}/{}/1000", rel(3, n_offset), rel(2, n_offset))),
                        fx(format!("={}/{}*100", rel(4, n_offset), rel(1, n_offset))),
                    ],
                    &[(5, range(97.0, 103.0))],
                )
            })
            .collect(),
    );

    SpecInstrument {
        name: "Karl Fischer Titrator".to_string(),
        columns,
        block_template,
        aux_sheets: vec![aux_standard],
    }
}

fn derive_viscometer() -> SpecInstrument {
    let columns = derive_header_row(&[
        "Sample ID",
        "Temperature (°C)",
        "Spindle",
        "Speed (rpm)",
        "Torque (%)",
        "Viscosity (cP)",
    ]);
    let mut builder = BlockTemplateBuilder::new(&columns);
    builder.push_replicates(2, |_| vec![]);
    builder.push_statistics(&[1, 5], &[5]);
    let block_template = builder.build(
        1,
        vec![5],
        vec![
            SpecAcceptanceCheck {
                roles: vec![EnumRowRole::Sample(1), EnumRowRole::Sample(2)],
                cols: vec![4],
                range: range(10.0, 100.0),
            },
            SpecAcceptanceCheck {
                roles: vec![EnumRowRole::Rsd],
                cols: vec![5],
                range: range(0.0, 5.0),
            },
        ],
    );

    SpecInstrument {
        name: "Viscometer".to_string(),
        columns,
        block_template,
        aux_sheets: vec![],
    }
}

const TUP_TITRATION_VALIDATION_COLUMNS: [&str; 8] = [
    "Standard",
    "Theoretical (mmol/g)",
    "Mass (g)",
    "Endpoint (mL)",
    "Blank (mL)",
    "Titrant (N)",
    "Measured (mmol/g)",
    "Recovery (%)",
];

/// Recovery row on a titration validation sheet; titrant normality is taken from Analysis.
fn derive_recovery_row(
    c_standard: &str,
    n_theoretical: f64,
    c_titrant_ref: &str,
    n_offset: usize,
) -> SpecCheckRow {
    derive_check_row(
        vec![
            txt(c_standard),
            EnumCellPattern::Number(n_theoretical),
            EnumCellPattern::Empty,
            EnumCellPattern::Empty,
            EnumCellPattern::Empty,
            fx(c_titrant_ref),
            fx(format!(
                "=({}-{})*{}/{}",
                rel(3, n_offset),
                rel(4, n_offset),
                rel(5, n_offset),
                rel(2, n_offset)
            )),
            fx(format!("={}/{}*100", rel(6, n_offset), rel(1, n_offset))),
        ],
        &[(7, range(95.0, 105.0))],
    )
}

fn derive_acids_titration() -> SpecInstrument {
    let columns = derive_header_row(&[
        "Sample ID",
        "Sample Mass (g)",
        "Carboxylic Endpoint (mL)",
        "Phenolic Endpoint (mL)",
        "Blank (mL)",
        "Titrant (N)",
        "Carboxylic Acids (mmol/g)",
        "Phenolics (mmol/g)",
    ]);
    let cols_result = [6, 7];
    let mut builder = BlockTemplateBuilder::new(&columns);
    builder.push_replicates(2, |n_offset| {
        vec![
            (
                6,
                fx(format!(
                    "=({}-{})*{}/{}",
                    rel(2, n_offset),
                    rel(4, n_offset),
                    rel(5, n_offset),
                    rel(1, n_offset)
                )),
            ),
            (
                7,
                fx(format!(
                    "=({}-{})*{}/{}",
                    rel(3, n_offset),
                    rel(2, n_offset),
                    rel(5, n_offset),
                    rel(1, n_offset)
                )),
            ),
        ]
    });
    builder.push_statistics(&cols_result, &cols_result);
    builder.push_rpd(&cols_result);
    let block_template = builder.build(
        1,
        cols_result.to_vec(),
        vec![
            SpecAcceptanceCheck {
                roles: vec![EnumRowRole::Rsd],
                cols: cols_result.to_vec(),
                range: range(0.0, 5.0),
            },
            SpecAcceptanceCheck {
                roles: vec![EnumRowRole::Rpd],
                cols: cols_result.to_vec(),
                range: range(0.0, 10.0),
            },
        ],
    );

    let rng_rsd = Some(range(0.0, 5.0));
    let aux_summary = SpecAuxSheet {
        name: "Summary".to_string(),
        kind: EnumAuxSheetKind::Summary(vec![
            derive_summary_label_column(),
            derive_summary_column("Carboxylic Acids (mmol/g)", EnumRowRole::Average, 6, None),
            derive_summary_column("Carboxylic RSD (%)", EnumRowRole::Rsd, 6, rng_rsd),
            derive_summary_column("Phenolics (mmol/g)", EnumRowRole::Average, 7, None),
            derive_summary_column("Phenolics RSD (%)", EnumRowRole::Rsd, 7, rng_rsd),
        ]),
    };
    let c_titrant_ref = derive_first_replicate_ref(&block_template, 5);
    let aux_validation = derive_check_sheet(
        "Validation",
        &TUP_TITRATION_VALIDATION_COLUMNS,
        vec![
            derive_recovery_row("Vanillic Acid (carboxylic)", 5.947, &c_titrant_ref, 0),
            derive_recovery_row("p-Cresol (phenolic)", 9.247, &c_titrant_ref, 1),
        ],
    );

    SpecInstrument {
        name: "Acids Titration".to_string(),
        columns,
        block_template,
        aux_sheets: vec![aux_summary, aux_validation],
    }
}

fn derive_carbonyl_titration() -> SpecInstrument {
    let columns = derive_header_row(&[
        "Sample ID",
        "Sample Mass (g)",
        "Endpoint (mL)",
        "Blank (mL)",
        "Titrant (N)",
        "Carbonyl (mmol/g)",
    ]);
    let mut builder = BlockTemplateBuilder::new(&columns);
    builder.push_replicates(3, |n_offset| {
        vec![(
            5,
            fx(format!(
                "=({}-{})*{}/{}",
                rel(2, n_offset),
                rel(3, n_offset),
                rel(4, n_offset),
                rel(1, n_offset)
            )),
        )]
    });
    builder.push_statistics(&[5], &[5]);
    let block_template = builder.build(
        1,
        vec![5],
        vec![SpecAcceptanceCheck {
            roles: vec![EnumRowRole::Rsd],
            cols: vec![5],
            range: range(0.0, 5.0),
        }],
    );

    let aux_summary = SpecAuxSheet {
        name: "Summary".to_string(),
        kind: EnumAuxSheetKind::Summary(vec![
            derive_summary_label_column(),
            derive_summary_column("Carbonyl (mmol/g)", EnumRowRole::Average, 5, None),
            derive_summary_column("RSD (%)", EnumRowRole::Rsd, 5, Some(range(0.0, 5.0))),
        ]),
    };
    let c_titrant_ref = derive_first_replicate_ref(&block_template, 4);
    let aux_validation = derive_check_sheet(
        "Validation",
        &TUP_TITRATION_VALIDATION_COLUMNS,
        vec![derive_recovery_row(
            "4-Bromobenzaldehyde (4-BBA)",
            5.405,
            &c_titrant_ref,
            0,
        )],
    );

    SpecInstrument {
        name: "Carbonyl Titration".to_string(),
        columns,
        block_template,
        aux_sheets: vec![aux_summary, aux_validation],
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_is_valid() {
        let registry = registry().expect("default registry");
        assert_eq!(
            registry.names(),
            vec![
                "Densimeter",
                "CHN Analyzer",
                "Karl Fischer Titrator",
                "Viscometer",
                "Acids Titration",
                "Carbonyl Titration",
            ]
        );
    }

    #[test]
    fn test_lookup_unknown_instrument_fails() {
        let registry = registry().expect("default registry");
        assert_eq!(
            registry.lookup("Nonexistent Instrument").err(),
            Some(TemplateError::UnknownInstrument {
                name: "Nonexistent Instrument".to_string()
            })
        );
        assert!(registry.lookup("densimeter").is_err());
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let result = InstrumentRegistry::new(vec![derive_viscometer(), derive_viscometer()]);
        assert_eq!(
            result.err(),
            Some(TemplateError::DuplicateInstrument {
                name: "Viscometer".to_string()
            })
        );
    }

    #[test]
    fn test_acids_template_shape() {
        let instrument = derive_acids_titration();
        let template = &instrument.block_template;
        assert_eq!(template.row_count(), 7);
        assert_eq!(template.row_stride(), 8);
        assert_eq!(template.named_rows[&EnumRowRole::Average], 3);
        assert_eq!(template.named_rows[&EnumRowRole::Rpd], 6);
        assert_eq!(
            template.rows[1][6],
            EnumCellPattern::Formula("=(C{+1}-E{+1})*F{+1}/B{+1}".to_string())
        );
        assert_eq!(
            template.rows[5][7],
            EnumCellPattern::Formula("=H{+4}/H{+3}*100".to_string())
        );
    }

    #[test]
    fn test_chn_dry_basis_references_three_rows() {
        let instrument = derive_chn_analyzer();
        let template = &instrument.block_template;
        let n_daf = template.named_rows[&EnumRowRole::Custom("dry_ash_free".to_string())];
        assert_eq!(
            template.rows[n_daf][2],
            EnumCellPattern::Formula("=C{+4}*100/(100-$B{+7}-$B{+8})".to_string())
        );
    }

    #[test]
    fn test_validation_titrant_is_a_fixed_reference() {
        let instrument = derive_acids_titration();
        let Some(EnumAuxSheetKind::Check(sheet)) = instrument
            .aux_sheets
            .iter()
            .find(|aux| aux.name == "Validation")
            .map(|aux| &aux.kind)
        else {
            panic!("validation sheet");
        };
        assert_eq!(
            sheet.rows[0].cells[5],
            EnumCellPattern::Formula("=Analysis!$F$2".to_string())
        );
    }

    #[test]
    fn test_validation_rejects_out_of_tile_offsets() {
        let mut instrument = derive_viscometer();
        instrument.block_template.rows[3][5] = fx("=AVERAGE(F{+1}:F{+6})");
        assert!(matches!(
            validate_instrument(&instrument),
            Err(TemplateError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_formula_separator_rows() {
        let mut instrument = derive_viscometer();
        instrument.block_template.rows_separator[0][5] = fx("=F{+0}");
        assert!(matches!(
            validate_instrument(&instrument),
            Err(TemplateError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_inverted_ranges() {
        let mut instrument = derive_densimeter();
        instrument.block_template.checks[0].range = range(1.0, 0.0);
        assert!(matches!(
            validate_instrument(&instrument),
            Err(TemplateError::InvalidTemplate { .. })
        ));
    }
}
