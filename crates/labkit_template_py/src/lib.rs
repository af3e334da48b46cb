use std::path::PathBuf;

use labkit_template::{
    SpecSheetReport, SpecTemplateReport, SpecTemplateWriteOptions, TemplateError,
    XlsxTemplateWriter, assemble, derive_template_file_name, generate_template_bytes, registry,
};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyBytes;

const N_BRIDGE_ABI_VERSION: u64 = 1;
const C_BRIDGE_CONTRACT_VERSION: &str = "labkit.template.v1";
const C_BRIDGE_TRANSPORT: &str = "rust_native";

#[pyclass(name = "SheetReport")]
#[derive(Debug, Clone)]
struct PySheetReport {
    #[pyo3(get)]
    sheet_name: String,
    #[pyo3(get)]
    n_rows: usize,
    #[pyo3(get)]
    n_cells: usize,
    #[pyo3(get)]
    n_conditional_rules: usize,
}

impl From<SpecSheetReport> for PySheetReport {
    fn from(sheet_report: SpecSheetReport) -> Self {
        Self {
            sheet_name: sheet_report.sheet_name,
            n_rows: sheet_report.n_rows,
            n_cells: sheet_report.n_cells,
            n_conditional_rules: sheet_report.n_conditional_rules,
        }
    }
}

#[pyclass(name = "TemplateReport")]
#[derive(Debug, Clone)]
struct PyTemplateReport {
    #[pyo3(get)]
    file_out: String,
    #[pyo3(get)]
    sheets: Vec<PySheetReport>,
    #[pyo3(get)]
    warnings: Vec<String>,
}

impl PyTemplateReport {
    fn new(file_out: String, report: SpecTemplateReport) -> Self {
        Self {
            file_out,
            sheets: report.sheets.into_iter().map(PySheetReport::from).collect(),
            warnings: report.warnings,
        }
    }
}

#[pymethods]
impl PyTemplateReport {
    #[getter]
    fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    #[pyo3(signature = (prefix = "[TEMPLATE]"))]
    fn format(&self, prefix: &str) -> String {
        let l_sheets = self
            .sheets
            .iter()
            .map(|sheet| format!("{}({} rows)", sheet.sheet_name, sheet.n_rows))
            .collect::<Vec<_>>();
        format!(
            "{prefix} file={} sheets=[{}] warnings={}",
            self.file_out,
            l_sheets.join(", "),
            self.warning_count()
        )
    }

    fn __str__(&self) -> String {
        self.format("[TEMPLATE]")
    }
}

fn map_template_error(exception: TemplateError) -> PyErr {
    match exception {
        TemplateError::UnknownInstrument { .. } | TemplateError::InvalidSampleCount { .. } => {
            PyValueError::new_err(exception.to_string())
        }
        _ => PyRuntimeError::new_err(exception.to_string()),
    }
}

/// Instrument names in display order.
#[pyfunction(name = "list_instruments")]
fn list_instruments_py() -> PyResult<Vec<String>> {
    let registry = registry().map_err(map_template_error)?;
    Ok(registry.names().into_iter().map(str::to_string).collect())
}

/// Analysis column headers of one instrument.
#[pyfunction(name = "instrument_columns")]
fn instrument_columns_py(instrument: &str) -> PyResult<Vec<String>> {
    let registry = registry().map_err(map_template_error)?;
    let spec_instrument = registry.lookup(instrument).map_err(map_template_error)?;
    Ok(spec_instrument.columns.clone())
}

#[pyfunction(name = "template_file_name")]
fn template_file_name_py(instrument: &str) -> String {
    derive_template_file_name(instrument)
}

/// Workbook bytes for a download response.
#[pyfunction(name = "generate_template")]
fn generate_template_py<'py>(
    py: Python<'py>,
    instrument: &str,
    sample_count: i64,
) -> PyResult<Bound<'py, PyBytes>> {
    let v_bytes = py
        .allow_threads(|| generate_template_bytes(instrument, sample_count))
        .map_err(map_template_error)?;
    Ok(PyBytes::new(py, &v_bytes))
}

/// Write the workbook to disk and return the write report.
#[pyfunction(name = "write_template")]
#[pyo3(signature = (instrument, sample_count, file_out = None, dir_out = "."))]
fn write_template_py(
    py: Python<'_>,
    instrument: &str,
    sample_count: i64,
    file_out: Option<String>,
    dir_out: &str,
) -> PyResult<PyTemplateReport> {
    let path_file_out = match file_out {
        Some(val) => PathBuf::from(val),
        None => PathBuf::from(dir_out).join(derive_template_file_name(instrument)),
    };

    let report = py
        .allow_threads(|| -> Result<SpecTemplateReport, TemplateError> {
            let plan = assemble(instrument, sample_count)?;
            let mut writer = XlsxTemplateWriter::new(SpecTemplateWriteOptions::default());
            writer.write_workbook(&plan)?;
            writer.save(&path_file_out)?;
            Ok(writer.report())
        })
        .map_err(map_template_error)?;

    Ok(PyTemplateReport::new(
        path_file_out.to_string_lossy().to_string(),
        report,
    ))
}

#[pymodule]
fn _labkit_template_rs(module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_class::<PySheetReport>()?;
    module.add_class::<PyTemplateReport>()?;
    module.add_function(wrap_pyfunction!(list_instruments_py, module)?)?;
    module.add_function(wrap_pyfunction!(instrument_columns_py, module)?)?;
    module.add_function(wrap_pyfunction!(template_file_name_py, module)?)?;
    module.add_function(wrap_pyfunction!(generate_template_py, module)?)?;
    module.add_function(wrap_pyfunction!(write_template_py, module)?)?;
    module.add("__bridge_abi__", N_BRIDGE_ABI_VERSION)?;
    module.add("__bridge_contract__", C_BRIDGE_CONTRACT_VERSION)?;
    module.add("__bridge_transport__", C_BRIDGE_TRANSPORT)?;
    Ok(())
}
