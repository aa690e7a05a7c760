//! Output formatting for `orgdeploy` commands.
//!
//! Supports two modes: human-readable tables (default) and JSON (--json).

use serde::Serialize;
use tabled::{Table, Tabled};

use crate::domain::{ResourceHandle, ResourceOrigin};
use crate::plan::ProvisioningStep;
use crate::provisioner::{ProvisioningReport, StepRecord};

/// Output mode for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

/// Print a vec of Tabled + Serialize items in the chosen mode.
pub fn print_items<T: Tabled + Serialize>(items: &[T], mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table => {
            if items.is_empty() {
                println!("(no results)");
            } else {
                let table = Table::new(items).to_string();
                println!("{table}");
            }
        }
        OutputMode::Json => {
            let json = serde_json::to_string_pretty(items)?;
            println!("{json}");
        }
    }
    Ok(())
}

/// Print a simple key-value pair.
pub fn print_kv(key: &str, value: &str) {
    println!("{key}: {value}");
}

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("\x1b[32m{msg}\x1b[0m");
}

/// Print an error message.
pub fn print_error(msg: &str) {
    eprintln!("\x1b[31m{msg}\x1b[0m");
}

#[derive(Debug, Tabled, Serialize)]
pub struct PlanRow {
    #[tabled(rename = "#")]
    pub index: usize,
    #[tabled(rename = "Kind")]
    pub kind: &'static str,
    #[tabled(rename = "Step")]
    pub label: String,
    #[tabled(rename = "Needs")]
    pub reads: String,
}

impl PlanRow {
    pub fn from_step(index: usize, step: &ProvisioningStep) -> Self {
        let kind = match step {
            ProvisioningStep::Deploy { .. } => "deploy",
            ProvisioningStep::Reference { .. } => "reference",
            ProvisioningStep::Invoke { .. } => "invoke",
        };
        let reads = step
            .reads()
            .iter()
            .map(|name| name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            index,
            kind,
            label: step.label(),
            reads: if reads.is_empty() { "-".to_string() } else { reads },
        }
    }
}

#[derive(Debug, Tabled, Serialize)]
pub struct ResourceRow {
    #[tabled(rename = "Resource")]
    pub name: String,
    #[tabled(rename = "Address")]
    pub address: String,
    #[tabled(rename = "Origin")]
    pub origin: String,
    #[tabled(rename = "Step")]
    pub step: usize,
}

impl From<&ResourceHandle> for ResourceRow {
    fn from(handle: &ResourceHandle) -> Self {
        Self {
            name: handle.name.to_string(),
            address: handle.address.to_string(),
            origin: match handle.origin {
                ResourceOrigin::Deployed => "deployed".to_string(),
                ResourceOrigin::Referenced => "referenced".to_string(),
            },
            step: handle.step,
        }
    }
}

#[derive(Debug, Tabled, Serialize)]
pub struct StepRow {
    #[tabled(rename = "#")]
    pub index: usize,
    #[tabled(rename = "Step")]
    pub label: String,
    #[tabled(rename = "Tx")]
    pub tx_hash: String,
    #[tabled(rename = "Block")]
    pub block: String,
    #[tabled(rename = "Gas")]
    pub gas_used: String,
}

impl From<&StepRecord> for StepRow {
    fn from(record: &StepRecord) -> Self {
        let dash = || "-".to_string();
        Self {
            index: record.index,
            label: record.label.clone(),
            tx_hash: record.tx_hash.map(|h| h.to_string()).unwrap_or_else(dash),
            block: record.block_number.map(|b| b.to_string()).unwrap_or_else(dash),
            gas_used: record.gas_used.map(|g| g.to_string()).unwrap_or_else(dash),
        }
    }
}

/// Print a finished run: JSON as a single document, tables as steps then resources.
pub fn print_report(report: &ProvisioningReport, mode: OutputMode) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputMode::Table => {
            let steps: Vec<StepRow> = report.steps.iter().map(StepRow::from).collect();
            print_items(&steps, mode)?;
            let resources: Vec<ResourceRow> =
                report.resources.iter().map(ResourceRow::from).collect();
            print_items(&resources, mode)?;
            print_kv("environment", report.environment.as_str());
            print_kv("operator", &report.operator.to_string());
            print_kv("gas used", &report.total_gas_used().to_string());
            print_kv(
                "organization",
                report
                    .organization_state
                    .map(|s| s.as_str())
                    .unwrap_or("absent"),
            );
        }
    }
    Ok(())
}
