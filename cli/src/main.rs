//! Entitle CLI - operator and admin entry point for the ledger.
//!
//! Every command opens the configured ledger database, performs one
//! operation, prints the result, and exits. Concurrent invocations are safe:
//! each process holds its own connection and waits at most the configured
//! busy timeout for another writer.
//!
//! ```text
//! main() -> EntitleConfig::load() -> Ledger::open() -> run(command) -> render
//! ```

mod render;

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use entitle_config::{EntitleConfig, StoreConfig};
use entitle_core::{Ledger, LedgerError, SystemClock, Unlock};
use entitle_types::{
    AccountId, Beneficiary, ContentId, CreditPackId, InfluencerId, ModelId, NewPurchase,
    PackageId, PayoutMethod, PurchaseId, PurchaseKind, PurchaseStatus, Role, WithdrawalId,
    WithdrawalStatus,
};

/// Entitlement & wallet ledger administration
#[derive(Parser, Debug)]
#[command(name = "entitle", version)]
struct Cli {
    /// Ledger database file (overrides the config file)
    #[arg(long, global = true, env = "ENTITLE_DB")]
    db: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create, inspect, and adjust accounts
    #[command(subcommand)]
    Account(AccountCommand),

    /// Record a payment claim as pending
    Submit(SubmitArgs),

    /// Approve a pending purchase request
    Approve { purchase: String },

    /// Reject a pending purchase request
    Reject { purchase: String },

    /// List purchase requests, most recent first
    List {
        #[arg(long)]
        status: Option<PurchaseStatus>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Unlock a model slot for an account
    UnlockModel { account: String, model: String },

    /// Buy a content item from the account's wallet
    UnlockContent {
        account: String,
        content: String,
        #[arg(long)]
        cost: i64,
    },

    /// Request a commission payout
    Withdraw(WithdrawArgs),

    /// Mark a pending withdrawal as paid
    ApproveWithdrawal { withdrawal: String },

    /// Reject a pending withdrawal
    RejectWithdrawal { withdrawal: String },

    /// List withdrawal requests
    Withdrawals {
        #[arg(long)]
        status: Option<WithdrawalStatus>,
    },

    /// Manage influencer referral codes
    #[command(subcommand)]
    Influencer(InfluencerCommand),

    /// Revenue and commission totals
    Stats,
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    /// Create the account if needed and show it
    Ensure {
        id: String,
        #[arg(long)]
        admin: bool,
    },
    /// Show an account summary
    Show { id: String },
    /// List all accounts
    List,
    /// Add credits to a wallet
    Credit { id: String, amount: i64 },
    /// Remove credits from a wallet
    Debit { id: String, amount: i64 },
}

#[derive(Args, Debug)]
struct SubmitArgs {
    #[arg(long)]
    account: String,
    /// Subscription package id
    #[arg(long, conflicts_with = "credits", required_unless_present = "credits")]
    package: Option<String>,
    /// Credit pack id
    #[arg(long)]
    credits: Option<String>,
    /// Amount transferred, in minor units
    #[arg(long)]
    amount: i64,
    /// Mobile-money transaction id
    #[arg(long)]
    reference: String,
    /// Number the transfer was sent from
    #[arg(long)]
    payer: String,
    #[arg(long)]
    referral_code: Option<String>,
}

#[derive(Args, Debug)]
struct WithdrawArgs {
    #[arg(long, conflicts_with = "influencer", required_unless_present = "influencer")]
    account: Option<String>,
    #[arg(long)]
    influencer: Option<String>,
    /// Defaults to all available earnings
    #[arg(long)]
    amount: Option<i64>,
    /// bkash or nagad
    #[arg(long)]
    method: PayoutMethod,
    /// Payout mobile number
    #[arg(long)]
    number: String,
}

#[derive(Subcommand, Debug)]
enum InfluencerCommand {
    /// Register a new influencer code
    Add {
        name: String,
        code: String,
        /// Commission rate, 0-100
        #[arg(long)]
        rate: u32,
    },
    List,
    Activate { id: String },
    Deactivate { id: String },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_entitle_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::debug!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No writable log file: stderr keeps stdout clean for --json consumers.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_entitle_log_file() -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in entitle_log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn entitle_log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.entitle/logs/entitle.log
    if let Some(config_dir) = entitle_config::config_dir() {
        candidates.push(config_dir.join("logs").join("entitle.log"));
    }

    // Fallback: ./.entitle/logs/entitle.log
    candidates.push(PathBuf::from(".entitle").join("logs").join("entitle.log"));

    candidates
}

fn load_config(db_override: Option<PathBuf>) -> Result<EntitleConfig> {
    let mut config = EntitleConfig::load()
        .context("loading configuration")?
        .unwrap_or_default();
    if let Some(path) = db_override {
        let busy_timeout_ms = u64::try_from(config.busy_timeout().as_millis()).unwrap_or(u64::MAX);
        config.store = Some(StoreConfig {
            path: Some(path.display().to_string()),
            busy_timeout_ms,
        });
    }
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            let retryable = err
                .downcast_ref::<LedgerError>()
                .is_some_and(LedgerError::is_retryable);
            // 75 = EX_TEMPFAIL
            if retryable {
                ExitCode::from(75)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.db)?;
    let ledger = Ledger::open(&config, Arc::new(SystemClock)).context("opening ledger")?;
    let out = Output { json: cli.json };

    match cli.command {
        Command::Account(command) => run_account(&ledger, &out, command)?,
        Command::Submit(args) => {
            let kind = match (args.package, args.credits) {
                (Some(package), _) => PurchaseKind::PackageSubscription {
                    package_id: PackageId::new(package),
                },
                (None, Some(pack)) => PurchaseKind::CreditTopUp {
                    credit_pack_id: CreditPackId::new(pack),
                },
                (None, None) => anyhow::bail!("one of --package or --credits is required"),
            };
            let request = ledger.submit_purchase(NewPurchase {
                account_id: AccountId::new(args.account),
                kind,
                amount: args.amount,
                transaction_reference: args.reference,
                payer_number: args.payer,
                referral_code: args.referral_code,
            })?;
            out.print(&request, || render::purchase(&request))?;
        }
        Command::Approve { purchase } => {
            let approval = ledger.approve_purchase(&PurchaseId::new(purchase))?;
            let json = serde_json::json!({
                "purchase": &approval.purchase,
                "credits": approval.credits,
                "subscription": approval.subscription.as_ref().map(|(tier, window)| {
                    serde_json::json!({ "tier": tier, "window": window })
                }),
                "commission": approval.commission.as_ref().map(|(beneficiary, amount)| {
                    serde_json::json!({ "beneficiary": beneficiary, "amount": amount })
                }),
            });
            out.print(&json, || render::approval(&approval))?;
        }
        Command::Reject { purchase } => {
            let id = PurchaseId::new(purchase);
            ledger.reject_purchase(&id)?;
            let request = ledger.purchase(&id)?;
            out.print(&request, || render::purchase(&request))?;
        }
        Command::List { status, limit } => {
            let requests = ledger
                .purchases(status)
                .take(limit)
                .collect::<Result<Vec<_>, _>>()?;
            out.print(&requests, || render::purchases(&requests))?;
        }
        Command::UnlockModel { account, model } => {
            let model = ModelId::new(model);
            let unlock = ledger.unlock_model(&AccountId::new(account), &model)?;
            let json = serde_json::json!({
                "model": &model,
                "newly_granted": unlock == Unlock::Granted,
            });
            out.print(&json, || render::unlock(unlock, "model", model.as_str()))?;
        }
        Command::UnlockContent {
            account,
            content,
            cost,
        } => {
            let content = ContentId::new(content);
            let unlock = ledger.unlock_content(&AccountId::new(account), &content, cost)?;
            let json = serde_json::json!({
                "content": &content,
                "newly_granted": unlock == Unlock::Granted,
            });
            out.print(&json, || render::unlock(unlock, "content", content.as_str()))?;
        }
        Command::Withdraw(args) => {
            let beneficiary = match (args.account, args.influencer) {
                (Some(account), _) => Beneficiary::Account(AccountId::new(account)),
                (None, Some(influencer)) => Beneficiary::Influencer(InfluencerId::new(influencer)),
                (None, None) => anyhow::bail!("one of --account or --influencer is required"),
            };
            let request =
                ledger.request_withdrawal(beneficiary, args.amount, args.method, &args.number)?;
            out.print(&request, || render::withdrawal(&request))?;
        }
        Command::ApproveWithdrawal { withdrawal } => {
            let id = WithdrawalId::new(withdrawal);
            ledger.approve_withdrawal(&id)?;
            out.print(&serde_json::json!({ "id": &id, "status": "paid" }), || {
                format!("withdrawal {id} paid")
            })?;
        }
        Command::RejectWithdrawal { withdrawal } => {
            let id = WithdrawalId::new(withdrawal);
            ledger.reject_withdrawal(&id)?;
            out.print(&serde_json::json!({ "id": &id, "status": "rejected" }), || {
                format!("withdrawal {id} rejected")
            })?;
        }
        Command::Withdrawals { status } => {
            let requests = ledger.list_withdrawals(status)?;
            out.print(&requests, || render::withdrawals(&requests))?;
        }
        Command::Influencer(command) => run_influencer(&ledger, &out, command)?,
        Command::Stats => {
            let stats = ledger.admin_stats()?;
            let json = serde_json::json!({
                "totals": stats,
                "commission_owed": stats.commission_owed(),
                "net_income": stats.net_income(),
            });
            out.print(&json, || render::stats(&stats))?;
        }
    }
    Ok(())
}

fn run_account(ledger: &Ledger, out: &Output, command: AccountCommand) -> Result<()> {
    match command {
        AccountCommand::Ensure { id, admin } => {
            let role = if admin { Role::Admin } else { Role::User };
            let id = AccountId::new(id);
            ledger.ensure_account(&id, role)?;
            let summary = ledger.account_summary(&id)?;
            out.print(&summary, || render::account(&summary))
        }
        AccountCommand::Show { id } => {
            let summary = ledger.account_summary(&AccountId::new(id))?;
            out.print(&summary, || render::account(&summary))
        }
        AccountCommand::List => {
            let accounts = ledger.list_accounts()?;
            out.print(&accounts, || render::accounts(&accounts))
        }
        AccountCommand::Credit { id, amount } => {
            let id = AccountId::new(id);
            let balance = ledger.credit(&id, amount)?;
            out.print(
                &serde_json::json!({ "account": &id, "wallet_balance": balance }),
                || format!("{id}: balance {balance}"),
            )
        }
        AccountCommand::Debit { id, amount } => {
            let id = AccountId::new(id);
            let balance = ledger.debit(&id, amount)?;
            out.print(
                &serde_json::json!({ "account": &id, "wallet_balance": balance }),
                || format!("{id}: balance {balance}"),
            )
        }
    }
}

fn run_influencer(ledger: &Ledger, out: &Output, command: InfluencerCommand) -> Result<()> {
    match command {
        InfluencerCommand::Add { name, code, rate } => {
            let influencer = ledger.create_influencer(&name, &code, rate)?;
            out.print(&influencer, || render::influencers(std::slice::from_ref(&influencer)))
        }
        InfluencerCommand::List => {
            let influencers = ledger.list_influencers()?;
            out.print(&influencers, || render::influencers(&influencers))
        }
        InfluencerCommand::Activate { id } => {
            ledger.set_influencer_active(&InfluencerId::new(id.as_str()), true)?;
            out.print(&serde_json::json!({ "id": &id, "active": true }), || {
                format!("influencer {id} activated")
            })
        }
        InfluencerCommand::Deactivate { id } => {
            ledger.set_influencer_active(&InfluencerId::new(id.as_str()), false)?;
            out.print(&serde_json::json!({ "id": &id, "active": false }), || {
                format!("influencer {id} deactivated")
            })
        }
    }
}

struct Output {
    json: bool,
}

impl Output {
    fn print<T: serde::Serialize + ?Sized>(
        &self,
        value: &T,
        text: impl FnOnce() -> String,
    ) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", text());
        }
        Ok(())
    }
}
