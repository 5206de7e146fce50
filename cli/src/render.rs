//! Plain-text rendering for command output.

use chrono::{DateTime, Utc};

use entitle_core::{Approval, Unlock};
use entitle_types::{
    Account, AccountSummary, AdminStats, ContentId, Influencer, ModelId, PurchaseKind,
    PurchaseRequest, WithdrawalRequest,
};

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn target(kind: &PurchaseKind) -> String {
    format!("{} {}", kind.tag(), kind.target_id())
}

fn list_or_none<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let joined = items.collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "none".to_string()
    } else {
        joined
    }
}

/// Left-aligned columns separated by two spaces. The last column is not
/// padded so lines carry no trailing whitespace.
fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|header| header.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let header: Vec<String> = headers.iter().map(ToString::to_string).collect();
    std::iter::once(&header)
        .chain(rows)
        .map(|row| table_line(row, &widths))
        .collect::<Vec<_>>()
        .join("\n")
}

fn table_line(cells: &[String], widths: &[usize]) -> String {
    let last = cells.len().saturating_sub(1);
    cells
        .iter()
        .zip(widths)
        .enumerate()
        .map(|(index, (cell, &width))| {
            if index == last {
                cell.clone()
            } else {
                format!("{cell:<width$}")
            }
        })
        .collect::<Vec<_>>()
        .join("  ")
}

pub fn purchase(request: &PurchaseRequest) -> String {
    let mut lines = vec![
        format!("purchase {} [{}]", request.id, request.status),
        format!("  account:   {}", request.account_id),
        format!("  buys:      {}", target(&request.kind)),
        format!("  amount:    {}", request.amount),
        format!(
            "  reference: {} from {}",
            request.transaction_reference, request.payer_number
        ),
    ];
    if let Some(code) = &request.referral_code {
        lines.push(format!("  referral:  {code}"));
    }
    lines.push(format!("  submitted: {}", timestamp(request.submitted_at)));
    if let Some(resolved_at) = request.resolved_at {
        lines.push(format!("  resolved:  {}", timestamp(resolved_at)));
    }
    lines.join("\n")
}

pub fn purchases(requests: &[PurchaseRequest]) -> String {
    if requests.is_empty() {
        return "no purchase requests".to_string();
    }
    let rows: Vec<Vec<String>> = requests
        .iter()
        .map(|request| {
            vec![
                request.id.to_string(),
                request.status.to_string(),
                request.account_id.to_string(),
                target(&request.kind),
                request.amount.to_string(),
                timestamp(request.submitted_at),
            ]
        })
        .collect();
    table(
        &["ID", "STATUS", "ACCOUNT", "BUYS", "AMOUNT", "SUBMITTED"],
        &rows,
    )
}

pub fn approval(approval: &Approval) -> String {
    let mut lines = vec![
        format!("purchase {} approved", approval.purchase.id),
        format!("  credits:      +{}", approval.credits),
    ];
    if let Some((tier, window)) = &approval.subscription {
        lines.push(format!(
            "  subscription: {tier} until {}",
            timestamp(window.end)
        ));
    }
    if let Some((beneficiary, amount)) = &approval.commission {
        lines.push(format!("  commission:   {amount} to {beneficiary}"));
    }
    lines.join("\n")
}

pub fn unlock(unlock: Unlock, kind: &str, id: &str) -> String {
    match unlock {
        Unlock::Granted => format!("unlocked {kind} {id}"),
        Unlock::AlreadyHeld => format!("{kind} {id} already unlocked"),
    }
}

pub fn account(summary: &AccountSummary) -> String {
    let account = &summary.account;
    let tier = match &account.subscription {
        Some(subscription) if account.tier.is_paid() => {
            format!("{} until {}", account.tier, timestamp(subscription.end))
        }
        _ => account.tier.to_string(),
    };

    let mut lines = vec![
        format!("account {} ({})", account.id, account.role),
        format!("  tier:        {tier}"),
        format!("  wallet:      {}", account.wallet_balance),
        format!(
            "  models:      {}",
            list_or_none(account.unlocked_model_ids.iter().map(ModelId::as_str))
        ),
        format!(
            "  content:     {}",
            list_or_none(account.unlocked_content_ids.iter().map(ContentId::as_str))
        ),
        format!(
            "  referral:    {} ({} referred)",
            account.referral_code, summary.referrals_count
        ),
    ];
    if let Some(referrer) = &account.referred_by {
        lines.push(format!("  referred by: {referrer}"));
    }
    lines.push(format!("  earnings:    {}", account.commission_earnings));
    lines.join("\n")
}

pub fn accounts(accounts: &[Account]) -> String {
    if accounts.is_empty() {
        return "no accounts".to_string();
    }
    let rows: Vec<Vec<String>> = accounts
        .iter()
        .map(|account| {
            vec![
                account.id.to_string(),
                account.role.to_string(),
                account.tier.to_string(),
                account.wallet_balance.to_string(),
                account.commission_earnings.to_string(),
                account.referral_code.clone(),
            ]
        })
        .collect();
    table(
        &["ID", "ROLE", "TIER", "WALLET", "EARNINGS", "CODE"],
        &rows,
    )
}

pub fn influencers(influencers: &[Influencer]) -> String {
    if influencers.is_empty() {
        return "no influencers".to_string();
    }
    let rows: Vec<Vec<String>> = influencers
        .iter()
        .map(|influencer| {
            vec![
                influencer.id.to_string(),
                influencer.name.clone(),
                influencer.code.clone(),
                format!("{}%", influencer.commission_rate_percent),
                if influencer.active { "yes" } else { "no" }.to_string(),
                influencer.cumulative_earnings.to_string(),
                influencer.cumulative_paid.to_string(),
            ]
        })
        .collect();
    table(
        &["ID", "NAME", "CODE", "RATE", "ACTIVE", "EARNED", "PAID"],
        &rows,
    )
}

pub fn withdrawal(request: &WithdrawalRequest) -> String {
    format!(
        "withdrawal {} [{}]: {} to {} via {} {}",
        request.id,
        request.status,
        request.amount,
        request.beneficiary,
        request.payout_method,
        request.payout_number
    )
}

pub fn withdrawals(requests: &[WithdrawalRequest]) -> String {
    if requests.is_empty() {
        return "no withdrawal requests".to_string();
    }
    let rows: Vec<Vec<String>> = requests
        .iter()
        .map(|request| {
            vec![
                request.id.to_string(),
                request.status.to_string(),
                request.beneficiary.to_string(),
                request.amount.to_string(),
                format!("{} {}", request.payout_method, request.payout_number),
                timestamp(request.requested_at),
            ]
        })
        .collect();
    table(
        &["ID", "STATUS", "BENEFICIARY", "AMOUNT", "PAYOUT", "REQUESTED"],
        &rows,
    )
}

pub fn stats(stats: &AdminStats) -> String {
    [
        format!("accounts:          {}", stats.total_accounts),
        format!("pending purchases: {}", stats.pending_purchases),
        format!("revenue:           {}", stats.total_revenue),
        format!(
            "commission:        {} ({} paid, {} owed)",
            stats.total_commission,
            stats.commission_paid,
            stats.commission_owed()
        ),
        format!("net income:        {}", stats.net_income()),
    ]
    .join("\n")
}
