//! Per-timestep results table.
//!
//! Columns are fixed by the first network pushed; every later row must come
//! from the same topology. Missing results are stored as nulls.

use std::collections::HashSet;
use std::fs::{self, File};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use dcgrid_core::{AssetKind, AssetOrigin, Network};
use polars::prelude::*;
#[cfg(feature = "parquet")]
use polars::prelude::ParquetWriter;

#[derive(Debug, Clone)]
pub struct ResultsTable {
    names: Vec<String>,
    columns: Vec<Vec<Option<f64>>>,
}

impl ResultsTable {
    /// Empty table with the column layout of `network`.
    pub fn for_network(network: &Network) -> Self {
        let mut names = Vec::new();
        for bus in network.buses() {
            names.push(format!("node {}: v_pu", bus.id.value()));
        }
        for line in network.lines() {
            let label = format!("line {} - {}", line.from_bus.value(), line.to_bus.value());
            for field in ["i_ka", "loading", "pl_kw"] {
                names.push(format!("{label}: {field}"));
            }
        }
        for asset in modelled_assets(network) {
            names.push(format!("{} {}: p_kw", asset.kind.table_section(), asset.name));
            if asset.kind == AssetKind::Battery {
                names.push(format!("storage {}: SOC", asset.name));
            }
        }
        for converter in network.converters() {
            for field in ["p_kw", "loading", "pl_kw"] {
                names.push(format!("{}: {field}", converter.name));
            }
        }
        let names = deduplicate(names);
        let columns = vec![Vec::new(); names.len()];
        Self { names, columns }
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append the results currently stored on `network` as one row.
    pub fn push_row(&mut self, network: &Network) -> Result<()> {
        let mut row: Vec<Option<f64>> = Vec::with_capacity(self.names.len());
        row.extend(network.buses().map(|b| b.voltage_pu.map(|v| v.value())));
        for line in network.lines() {
            let flow = line.flow;
            row.push(flow.map(|f| f.current.value() / 1000.0));
            row.push(flow.map(|f| f.loading_percent));
            row.push(flow.map(|f| f.loss.value()));
        }
        for asset in modelled_assets(network) {
            row.push(asset.result.map(|p| p.value()));
            if asset.kind == AssetKind::Battery {
                row.push(asset.storage.map(|s| s.soc_percent));
            }
        }
        for converter in network.converters() {
            let flow = converter.flow;
            row.push(flow.map(|f| f.power.value()));
            row.push(flow.map(|f| f.loading_percent));
            row.push(flow.map(|f| f.loss.value()));
        }

        if row.len() != self.names.len() {
            return Err(anyhow!(
                "network has {} result fields, table expects {}",
                row.len(),
                self.names.len()
            ));
        }
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.push(value);
        }
        Ok(())
    }

    /// Column `name` as a slice, one value per row
    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
    }

    pub fn to_frame(&self) -> Result<DataFrame> {
        let timestep: Vec<u32> = (0..self.len() as u32).collect();
        let mut series = Vec::with_capacity(self.names.len() + 1);
        series.push(Series::new("timestep", timestep));
        for (name, values) in self.names.iter().zip(&self.columns) {
            series.push(Series::new(name.as_str(), values.as_slice()));
        }
        DataFrame::new(series).context("building results frame")
    }

    /// Write the table as CSV or Parquet, chosen by the file extension.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut df = self.to_frame()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|s| s.to_lowercase())
        {
            #[cfg(feature = "parquet")]
            Some(ext) if ext == "parquet" => ParquetWriter::new(&mut file)
                .finish(&mut df)
                .map(|_| ())
                .context("writing Parquet file"),
            #[cfg(not(feature = "parquet"))]
            Some(ext) if ext == "parquet" => Err(anyhow!(
                "parquet support is disabled; rebuild with the 'parquet' feature"
            )),
            Some(ext) if ext == "csv" => CsvWriter::new(&mut file)
                .finish(&mut df)
                .context("writing CSV file"),
            _ => Err(anyhow!(
                "unsupported output extension for {}; use .csv or .parquet",
                path.display()
            )),
        }
    }
}

fn modelled_assets(network: &Network) -> impl Iterator<Item = &dcgrid_core::Asset> {
    network
        .assets()
        .filter(|a| a.origin == AssetOrigin::Modelled)
}

/// Parallel lines and equally named assets get a `#n` suffix.
fn deduplicate(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .map(|name| {
            let mut candidate = name.clone();
            let mut n = 2;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{name} #{n}");
                n += 1;
            }
            candidate
        })
        .collect()
}
