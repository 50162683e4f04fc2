use crate::core::pipeline::{PipelineOutput, Product};
use crate::core::zonal::ZonalTable;
use crate::types::{ObjectId, SlideResult};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// File name of the per-run diagnostics summary
pub const DIAGNOSTICS_FILE: &str = "diagnostics.json";

/// Per-product status written next to the tables
#[derive(Debug, Clone, Serialize)]
pub struct ProductDiagnostic {
    pub product: Product,
    pub unit: &'static str,
    pub succeeded: bool,
    pub error: Option<String>,
    pub rows: usize,
    pub empty_zones: usize,
    pub singular_pixels: usize,
}

#[derive(Debug, Clone, Serialize)]
struct RunDiagnostics {
    look_direction_deg: Option<f64>,
    products: Vec<ProductDiagnostic>,
}

/// Writes zonal tables as CSV (`object_id,value`, empty value for null)
pub struct TableWriter {
    output_dir: PathBuf,
}

impl TableWriter {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> SlideResult<Self> {
        std::fs::create_dir_all(output_dir.as_ref())?;
        Ok(Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        })
    }

    /// Serialize one table to any writer
    pub fn write_csv<W: Write>(table: &ZonalTable, writer: &mut W) -> SlideResult<()> {
        writeln!(writer, "object_id,value")?;
        for row in &table.rows {
            let value = row.value.map(|v| v.to_string()).unwrap_or_default();
            writeln!(writer, "{},{}", csv_id(&row.object_id), value)?;
        }
        Ok(())
    }

    /// Write one product table to `<product>.csv`
    pub fn write_table(&self, product: Product, table: &ZonalTable) -> SlideResult<PathBuf> {
        let path = self.output_dir.join(format!("{}.csv", product.name()));
        let mut writer = BufWriter::new(File::create(&path)?);
        Self::write_csv(table, &mut writer)?;
        writer.flush()?;
        log::info!("Wrote {} rows to {}", table.rows.len(), path.display());
        Ok(path)
    }

    /// Write every successful table plus a diagnostics summary
    pub fn write_output(&self, output: &PipelineOutput) -> SlideResult<Vec<PathBuf>> {
        let mut written = Vec::new();
        let mut products = Vec::new();
        for report in &output.reports {
            let (succeeded, error, rows) = match &report.outcome {
                Ok(table) => {
                    written.push(self.write_table(report.product, table)?);
                    (true, None, table.rows.len())
                }
                Err(reason) => {
                    log::warn!("Not writing failed product {}: {}", report.product, reason);
                    (false, Some(reason.clone()), 0)
                }
            };
            products.push(ProductDiagnostic {
                product: report.product,
                unit: report.product.unit(),
                succeeded,
                error,
                rows,
                empty_zones: report.empty_zones(),
                singular_pixels: report.singular_pixels,
            });
        }

        let diagnostics = RunDiagnostics {
            look_direction_deg: output.look_direction.map(|l| l.bearing_deg),
            products,
        };
        let path = self.output_dir.join(DIAGNOSTICS_FILE);
        let writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(writer, &diagnostics)?;
        written.push(path);
        Ok(written)
    }
}

/// Quote text identifiers when they would break a CSV field
fn csv_id(id: &ObjectId) -> String {
    match id {
        ObjectId::Int(v) => v.to_string(),
        ObjectId::Text(s) if s.contains([',', '"', '\n', '\r']) => format!("\"{}\"", s.replace('"', "\"\"")),
        ObjectId::Text(s) => s.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::zonal::ZonalRow;

    fn table() -> ZonalTable {
        ZonalTable {
            field: "geometric_coherence".to_string(),
            rows: vec![
                ZonalRow {
                    object_id: ObjectId::Int(1),
                    value: Some(0.25),
                    pixel_count: 4,
                },
                ZonalRow {
                    object_id: ObjectId::Text("a,b".to_string()),
                    value: None,
                    pixel_count: 0,
                },
            ],
        }
    }

    #[test]
    fn test_csv_layout_and_null_rows() {
        let mut buffer = Vec::new();
        TableWriter::write_csv(&table(), &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, "object_id,value\n1,0.25\n\"a,b\",\n");
    }

    #[test]
    fn test_write_table_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TableWriter::new(dir.path().join("out")).unwrap();
        let path = writer.write_table(Product::Coherence, &table()).unwrap();
        assert!(path.ends_with("geometric_coherence.csv"));
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.starts_with("object_id,value\n"));
    }
}
