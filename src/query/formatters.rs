use crate::chains::ChainRegistry;
use crate::repository::Approval;
use crate::revocation::BatchRevokeResult;
use alloy_primitives::U256;
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::json;

#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

pub fn format_approvals(approvals: &[Approval], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => format_approvals_table(approvals),
        OutputFormat::Json => {
            serde_json::to_string_pretty(approvals).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => format_approvals_csv(approvals),
    }
}

fn format_approvals_table(approvals: &[Approval]) -> String {
    if approvals.is_empty() {
        return "No approvals found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            "ID", "Chain", "Token", "Type", "Contract", "Spender", "Amount", "Status",
        ]);

    for approval in approvals {
        table.add_row(vec![
            Cell::new(approval.id),
            Cell::new(approval.chain),
            Cell::new(format!(
                "{} ({})",
                approval.token_name, approval.token_symbol
            )),
            Cell::new(approval.token_type),
            Cell::new(format!("{:#}", approval.contract_address)),
            Cell::new(format!("{:#}", approval.spender_address)),
            Cell::new(&approval.approved_amount),
            Cell::new(status(approval)),
        ]);
    }

    table.to_string()
}

fn format_approvals_csv(approvals: &[Approval]) -> String {
    let mut wtr = Writer::from_writer(vec![]);

    let _ = wtr.write_record([
        "id",
        "user_id",
        "chain",
        "wallet_address",
        "contract_address",
        "contract_url",
        "token_name",
        "token_symbol",
        "token_type",
        "spender_address",
        "approved_amount",
        "is_unlimited",
        "is_revoked",
        "created_at",
        "updated_at",
    ]);

    for approval in approvals {
        let _ = wtr.write_record([
            approval.id.to_string().as_str(),
            &approval.user_id.map(|id| id.to_string()).unwrap_or_default(),
            approval.chain.as_str(),
            &format!("{:?}", approval.wallet_address),
            &format!("{:?}", approval.contract_address),
            &approval
                .chain
                .address_url(&format!("{:?}", approval.contract_address)),
            &approval.token_name,
            &approval.token_symbol,
            approval.token_type.as_str(),
            &format!("{:?}", approval.spender_address),
            &approval.approved_amount,
            &approval.is_unlimited.to_string(),
            &approval.is_revoked.to_string(),
            &approval.created_at.to_rfc3339(),
            &approval.updated_at.to_rfc3339(),
        ]);
    }

    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

fn status(approval: &Approval) -> &'static str {
    match (approval.is_revoked, approval.is_unlimited) {
        (true, _) => "Revoked",
        (false, true) => "Active (unlimited)",
        (false, false) => "Active",
    }
}

pub fn format_batch(result: &BatchRevokeResult, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Metric", "Value"]);

            table.add_row(vec![Cell::new("Revoked"), Cell::new(result.success_count)]);
            table.add_row(vec![Cell::new("Requested"), Cell::new(result.total_count)]);
            if !result.failed_ids.is_empty() {
                let failed: Vec<String> =
                    result.failed_ids.iter().map(|id| id.to_string()).collect();
                table.add_row(vec![Cell::new("Failed"), Cell::new(failed.join(", "))]);
            }

            format!("{table}\n{}", result.message())
        }
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "successCount": result.success_count,
            "totalCount": result.total_count,
            "message": result.message(),
        }))
        .unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["success_count", "total_count"]);
            let _ = wtr.write_record([
                &result.success_count.to_string(),
                &result.total_count.to_string(),
            ]);
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

pub fn format_chains(registry: &ChainRegistry, format: &OutputFormat) -> String {
    let rows: Vec<_> = registry
        .endpoints()
        .map(|endpoint| {
            let info = endpoint.chain.info();
            (info, endpoint.api_url, endpoint.api_key.is_some())
        })
        .collect();

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Chain", "Name", "Chain ID", "Explorer API", "API Key"]);

            for (info, api_url, has_key) in &rows {
                table.add_row(vec![
                    Cell::new(info.chain),
                    Cell::new(info.name),
                    Cell::new(info.chain_id),
                    Cell::new(api_url),
                    Cell::new(if *has_key { "configured" } else { "missing" }),
                ]);
            }

            table.to_string()
        }
        OutputFormat::Json => {
            let chains: Vec<_> = rows
                .iter()
                .map(|(info, api_url, has_key)| {
                    json!({
                        "chain": info.chain.as_str(),
                        "name": info.name,
                        "chainId": info.chain_id,
                        "apiUrl": api_url,
                        "explorerUrl": info.explorer_url,
                        "hasApiKey": has_key,
                    })
                })
                .collect();
            serde_json::to_string_pretty(&chains).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["chain", "name", "chain_id", "api_url", "has_api_key"]);
            for (info, api_url, has_key) in &rows {
                let _ = wtr.write_record([
                    info.chain.as_str(),
                    info.name,
                    &info.chain_id.to_string(),
                    api_url,
                    &has_key.to_string(),
                ]);
            }
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

pub fn format_allowance(allowance: U256, format: &OutputFormat) -> String {
    let display = if allowance == U256::MAX {
        "Unlimited".to_string()
    } else {
        allowance.to_string()
    };

    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec!["Allowance", "Raw"]);
            table.add_row(vec![Cell::new(&display), Cell::new(allowance.to_string())]);
            table.to_string()
        }
        OutputFormat::Json => json!({
            "allowance": display,
            "raw": allowance.to_string(),
        })
        .to_string(),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["allowance", "raw"]);
            let _ = wtr.write_record([&display, &allowance.to_string()]);
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}
