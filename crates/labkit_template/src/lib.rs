//! `labkit_template` v1:
//! Lab-instrument spreadsheet template layout engine.
//!
//! Pipeline, leaves first:
//! - `conf`       : constants and default format/style presets
//! - `spec`       : specs/models/options and the error type
//! - `util`       : pure helper functions
//! - `registry`   : instrument table and its validation
//! - `formula`    : `{+n}` relative-row rewriter
//! - `tiler`      : per-sample tile placement on the Analysis sheet
//! - `decoration` : borders and pass/fail rules per tile
//! - `auxiliary`  : summary and check sheets
//! - `assembler`  : one-pass workbook planning
//! - `writer`     : `rust_xlsxwriter` serializer
pub mod assembler;
pub mod auxiliary;
pub mod conf;
pub mod decoration;
pub mod formula;
pub mod registry;
pub mod spec;
pub mod tiler;
pub mod util;
pub mod writer;

pub use assembler::{assemble, assemble_with, generate_template_bytes};
pub use conf::{
    C_SHEET_NAME_ANALYSIS, C_TEMPLATE_FILE_SUFFIX, EnumFmtKey, N_LEN_EXCEL_SHEET_NAME_MAX,
    N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX, TUP_EXCEL_ILLEGAL,
};
pub use registry::{InstrumentRegistry, registry};
pub use spec::{
    EnumAuxSheetKind, EnumBorderStyle, EnumCellPattern, EnumCellValue, EnumConditionalRule,
    EnumDecorationKind, EnumHighlight, EnumRowRole, EnumSummarySource, SpecAcceptanceCheck,
    SpecAcceptanceRange, SpecAutofitCellsPolicy, SpecAuxSheet, SpecBlockTemplate, SpecCellFormat,
    SpecCellRange, SpecDecorationRegion, SpecInstrument, SpecRowLayout, SpecSheetPlan,
    SpecSheetReport, SpecTemplateReport, SpecTemplateWriteOptions, SpecTile, SpecWorkbookPlan,
    TemplateError,
};
pub use util::{derive_template_file_name, parse_sample_count, validate_sample_count};
pub use writer::XlsxTemplateWriter;
