use crate::query::formatters::{
    OutputFormat, format_allowance, format_approvals, format_batch, format_chains,
};
use crate::service::{ApprovalService, CreateApprovalRequest};
use anyhow::Result;

pub async fn cmd_list(
    service: &ApprovalService,
    wallet: &str,
    chain: &str,
    format: &OutputFormat,
) -> Result<()> {
    let approvals = service.list_approvals(wallet, chain).await?;
    let output = format_approvals(&approvals, format);
    println!("{output}");

    Ok(())
}

pub async fn cmd_show(service: &ApprovalService, id: i64, format: &OutputFormat) -> Result<()> {
    let approval = service
        .get_approval(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Approval {} not found", id))?;
    let output = format_approvals(std::slice::from_ref(&approval), format);
    println!("{output}");

    Ok(())
}

pub async fn cmd_records(
    service: &ApprovalService,
    user_id: Option<i64>,
    chain: Option<&str>,
    format: &OutputFormat,
) -> Result<()> {
    let approvals = service.stored_approvals(user_id, chain).await?;
    let output = format_approvals(&approvals, format);
    println!("{output}");

    Ok(())
}

pub async fn cmd_revoke(service: &ApprovalService, id: i64) -> Result<()> {
    if !service.revoke_approval(id).await? {
        return Err(anyhow::anyhow!("Approval {} not found", id));
    }
    println!("Approval {id} revoked successfully");

    Ok(())
}

pub async fn cmd_batch_revoke(
    service: &ApprovalService,
    ids: &[i64],
    format: &OutputFormat,
) -> Result<()> {
    let result = service.batch_revoke_approvals(ids).await?;
    let output = format_batch(&result, format);
    println!("{output}");

    Ok(())
}

pub async fn cmd_delete(service: &ApprovalService, id: i64) -> Result<()> {
    if !service.delete_approval(id).await? {
        return Err(anyhow::anyhow!("Approval {} not found", id));
    }
    println!("Approval {id} deleted");

    Ok(())
}

pub async fn cmd_add(
    service: &ApprovalService,
    request: CreateApprovalRequest,
    format: &OutputFormat,
) -> Result<()> {
    let approval = service.create_approval(request).await?;
    let output = format_approvals(std::slice::from_ref(&approval), format);
    println!("{output}");

    Ok(())
}

pub struct AllowanceQuery {
    pub wallet: String,
    pub contract: String,
    pub spender: String,
    pub chain: String,
}

pub async fn cmd_allowance(
    service: &ApprovalService,
    query: AllowanceQuery,
    format: &OutputFormat,
) -> Result<()> {
    let allowance = service
        .current_allowance(&query.wallet, &query.contract, &query.spender, &query.chain)
        .await?;
    let output = format_allowance(allowance, format);
    println!("{output}");

    Ok(())
}

pub fn cmd_chains(service: &ApprovalService, format: &OutputFormat) -> Result<()> {
    let output = format_chains(service.chains(), format);
    println!("{output}");

    Ok(())
}
